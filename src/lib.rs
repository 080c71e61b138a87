pub mod errors;
pub mod geometry;
pub mod load;
pub mod nifti;
pub mod output;
pub mod predict;
pub mod preprocess;
pub mod save;
pub mod transform;
pub mod volume;

pub use geometry::{Direction, GridSpec};
pub use load::load_volume;
pub use output::OutputPaths;
pub use predict::*;
pub use preprocess::*;
pub use save::NiftiSaver;
pub use transform::*;
pub use volume::Volume;
