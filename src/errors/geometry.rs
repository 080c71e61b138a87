pub use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
/// Errors raised while validating crop configuration or planning a resampling grid
pub enum GeometryError {
    #[snafu(display("invalid argument: {}", message))]
    InvalidArgument { message: String },

    #[snafu(display("mask contains no nonzero voxels"))]
    EmptyMask,

    #[snafu(display("mask and image do not share a compatible physical space: {}", reason))]
    GeometryMismatch { reason: String },

    #[snafu(display("direction matrix is singular: {:?}", matrix))]
    SingularDirection { matrix: [[f64; 3]; 3] },

    #[snafu(display("spacing must be positive and finite: {:?}", spacing))]
    InvalidSpacing { spacing: [f64; 3] },

    #[snafu(display(
        "volume shape {:?} does not match grid size {:?}",
        shape,
        size
    ))]
    ShapeMismatch { shape: [usize; 3], size: [usize; 3] },
}
