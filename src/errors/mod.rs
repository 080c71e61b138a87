pub mod geometry;
pub mod nifti;

pub use geometry::GeometryError;
pub use nifti::NiftiError;
