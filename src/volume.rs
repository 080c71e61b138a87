use ndarray::Array3;
use snafu::ensure;

use crate::errors::geometry::{GeometryError, ShapeMismatchSnafu};
use crate::geometry::{Direction, GridSpec, Point3};

/// A 3D scalar volume with physical geometry. Array axis `j` is index axis `j` of the grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    data: Array3<f32>,
    grid: GridSpec,
}

impl Volume {
    pub fn new(
        data: Array3<f32>,
        origin: Point3,
        spacing: [f64; 3],
        direction: Direction,
    ) -> Result<Self, GeometryError> {
        let (nx, ny, nz) = data.dim();
        let grid = GridSpec::new(origin, spacing, [nx, ny, nz], direction)?;
        Ok(Volume { data, grid })
    }

    /// Wraps data sampled on `grid`. The array shape must equal the grid size.
    pub fn from_grid(data: Array3<f32>, grid: GridSpec) -> Result<Self, GeometryError> {
        let (nx, ny, nz) = data.dim();
        ensure!(
            [nx, ny, nz] == grid.size,
            ShapeMismatchSnafu {
                shape: [nx, ny, nz],
                size: grid.size,
            }
        );
        Ok(Volume { data, grid })
    }

    // Callers guarantee that the shape of `data` equals `grid.size`
    pub(crate) fn from_parts(data: Array3<f32>, grid: GridSpec) -> Self {
        debug_assert_eq!(data.shape(), &grid.size[..]);
        Volume { data, grid }
    }

    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    pub fn origin(&self) -> &Point3 {
        &self.grid.origin
    }

    pub fn spacing(&self) -> &[f64; 3] {
        &self.grid.spacing
    }

    pub fn direction(&self) -> &Direction {
        &self.grid.direction
    }

    pub fn size(&self) -> [usize; 3] {
        self.grid.size
    }

    pub fn into_data(self) -> Array3<f32> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_takes_size_from_data() {
        let volume = Volume::new(
            Array3::zeros((3, 4, 5)),
            [1.0, 2.0, 3.0],
            [1.0, 1.0, 2.0],
            Direction::identity(),
        )
        .unwrap();
        assert_eq!(volume.size(), [3, 4, 5]);
        assert_eq!(volume.origin(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_from_grid_shape_mismatch() {
        let grid = GridSpec::new([0.0; 3], [1.0; 3], [2, 2, 2], Direction::identity()).unwrap();
        let result = Volume::from_grid(Array3::zeros((2, 2, 3)), grid);
        assert!(matches!(result, Err(GeometryError::ShapeMismatch { .. })));
    }
}
