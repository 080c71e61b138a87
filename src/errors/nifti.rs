pub use snafu::Snafu;
use std::path::PathBuf;

use crate::errors::GeometryError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum NiftiError {
    #[snafu(display("IO error on NIfTI file {}", path.display()))]
    IOError {
        #[snafu(source(from(std::io::Error, Box::new)))]
        source: Box<std::io::Error>,
        path: PathBuf,
    },

    #[snafu(display("invalid NIfTI header in {}: sizeof_hdr={}", path.display(), sizeof_hdr))]
    InvalidHeader { path: PathBuf, sizeof_hdr: i32 },

    #[snafu(display("invalid NIfTI magic in {}: {:?}", path.display(), magic))]
    InvalidMagic { path: PathBuf, magic: [u8; 4] },

    #[snafu(display("unsupported NIfTI data type: {}", datatype))]
    UnsupportedDataType { datatype: i16 },

    #[snafu(display("unsupported NIfTI dimensions: {:?}", dim))]
    UnsupportedDimensions { dim: [i16; 8] },

    #[snafu(display("volume size {:?} exceeds the NIfTI-1 limit of {} voxels per axis", size, i16::MAX))]
    DimensionTooLarge { size: [usize; 3] },

    #[snafu(display(
        "truncated NIfTI data in {}: expected {} bytes, found {}",
        path.display(),
        expected,
        actual
    ))]
    TruncatedData {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },

    #[snafu(display("voxel data of {} does not fit its header shape", path.display()))]
    InvalidShape {
        path: PathBuf,
        #[snafu(source(from(ndarray::ShapeError, Box::new)))]
        source: Box<ndarray::ShapeError>,
    },

    #[snafu(display("invalid geometry in {}: {}", path.display(), source))]
    InvalidGeometry {
        path: PathBuf,
        #[snafu(source(from(GeometryError, Box::new)))]
        source: Box<GeometryError>,
    },
}
