pub mod analyze;
pub mod crop;
pub mod labels;
pub mod resample;

pub use analyze::*;
pub use crop::*;
pub use labels::*;
pub use resample::*;

pub trait Transform<T> {
    fn apply(&self, target: &T) -> T;
}
