use std::fmt;

use crate::errors::GeometryError;
use crate::geometry::{add, sub, validate_spacing, Direction, PhysicalBox, Point3};

/// Spacing of every grid handed to the segmentation model
pub const ISOTROPIC_SPACING: [f64; 3] = [1.0, 1.0, 1.0];

/// Sampling grid: everything needed to place a voxel lattice in physical space.
///
/// Index `i` addresses the center of voxel `i`, so the physical position of a continuous
/// index is `origin + direction * (spacing * index)`. A grid of `n` voxels covers the
/// continuous index range `[-0.5, n - 0.5]` along each axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSpec {
    pub origin: Point3,
    pub spacing: [f64; 3],
    pub size: [usize; 3],
    pub direction: Direction,
}

impl GridSpec {
    pub fn new(
        origin: Point3,
        spacing: [f64; 3],
        size: [usize; 3],
        direction: Direction,
    ) -> Result<Self, GeometryError> {
        validate_spacing(&spacing)?;
        Ok(GridSpec {
            origin,
            spacing,
            size,
            direction,
        })
    }

    /// Builds a grid whose physical center coincides with `center`.
    pub fn centered_on(
        center: &Point3,
        size: [usize; 3],
        spacing: [f64; 3],
        direction: Direction,
    ) -> Result<Self, GeometryError> {
        validate_spacing(&spacing)?;
        let half_span: Point3 =
            std::array::from_fn(|axis| spacing[axis] * (size[axis] as f64 - 1.0) / 2.0);
        let origin = sub(center, &direction.apply(&half_span));
        Ok(GridSpec {
            origin,
            spacing,
            size,
            direction,
        })
    }

    pub fn index_to_physical(&self, index: &Point3) -> Point3 {
        let scaled: Point3 = std::array::from_fn(|axis| index[axis] * self.spacing[axis]);
        add(&self.origin, &self.direction.apply(&scaled))
    }

    pub fn physical_to_index(&self, point: &Point3) -> Point3 {
        let unscaled = self.direction.invert(&sub(point, &self.origin));
        std::array::from_fn(|axis| unscaled[axis] / self.spacing[axis])
    }

    /// Physical location of the midpoint of the voxel-center lattice
    pub fn physical_center(&self) -> Point3 {
        let index: Point3 = std::array::from_fn(|axis| (self.size[axis] as f64 - 1.0) / 2.0);
        self.index_to_physical(&index)
    }

    /// Face-to-face physical box covered by the grid's voxels
    pub fn physical_box(&self) -> PhysicalBox {
        let lower = [-0.5; 3];
        let upper: Point3 = std::array::from_fn(|axis| self.size[axis] as f64 - 0.5);
        PhysicalBox::new(self.index_to_physical(&lower), self.index_to_physical(&upper))
    }

    pub fn num_voxels(&self) -> usize {
        self.size.iter().product()
    }

    /// Whether the physical extent of `other` overlaps this grid at all.
    pub fn intersects(&self, other: &GridSpec) -> bool {
        let (self_min, self_max) = axis_aligned_bounds(self);
        let (other_min, other_max) = axis_aligned_bounds(other);
        (0..3).all(|axis| self_min[axis] <= other_max[axis] && other_min[axis] <= self_max[axis])
    }
}

// World-axis-aligned bounds over all eight corners of the grid
fn axis_aligned_bounds(grid: &GridSpec) -> (Point3, Point3) {
    let mut min = [f64::INFINITY; 3];
    let mut max = [f64::NEG_INFINITY; 3];
    for corner in 0..8 {
        let index: Point3 = std::array::from_fn(|axis| {
            if corner & (1 << axis) == 0 {
                -0.5
            } else {
                grid.size[axis] as f64 - 0.5
            }
        });
        let point = grid.index_to_physical(&index);
        for axis in 0..3 {
            min[axis] = min[axis].min(point[axis]);
            max[axis] = max[axis].max(point[axis]);
        }
    }
    (min, max)
}

impl fmt::Display for GridSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "size={}x{}x{} spacing={:?} origin=[{:.3}, {:.3}, {:.3}]",
            self.size[0],
            self.size[1],
            self.size[2],
            self.spacing,
            self.origin[0],
            self.origin[1],
            self.origin[2]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn assert_close(actual: &Point3, expected: &Point3) {
        for axis in 0..3 {
            assert!(
                (actual[axis] - expected[axis]).abs() < 1e-9,
                "{actual:?} != {expected:?}"
            );
        }
    }

    #[rstest]
    #[case([0.0, 0.0, 0.0], [1.0, 1.0, 1.0], [4, 4, 4], [1.5, 1.5, 1.5])]
    #[case([10.0, -5.0, 2.0], [2.0, 0.5, 1.0], [3, 5, 1], [12.0, -4.0, 2.0])]
    fn test_physical_center(
        #[case] origin: Point3,
        #[case] spacing: [f64; 3],
        #[case] size: [usize; 3],
        #[case] expected: Point3,
    ) {
        let grid = GridSpec::new(origin, spacing, size, Direction::identity()).unwrap();
        assert_close(&grid.physical_center(), &expected);
    }

    #[rstest]
    #[case([0.0, 0.0, 0.0], [192, 256, 192])]
    #[case([12.25, -7.5, 33.0], [32, 64, 96])]
    #[case([0.5, 0.5, 0.5], [1, 2, 3])]
    fn test_centered_on(#[case] center: Point3, #[case] size: [usize; 3]) {
        let direction =
            Direction::new([[-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, -1.0, 0.0]]).unwrap();
        let grid = GridSpec::centered_on(&center, size, ISOTROPIC_SPACING, direction).unwrap();
        assert_close(&grid.physical_center(), &center);
        assert_close(&grid.physical_box().center(), &center);
    }

    #[test]
    fn test_index_roundtrip() {
        let direction =
            Direction::new([[0.0, 1.0, 0.0], [-1.0, 0.0, 0.0], [0.0, 0.0, 1.0]]).unwrap();
        let grid = GridSpec::new([3.0, 4.0, 5.0], [0.8, 1.2, 3.0], [10, 10, 10], direction)
            .unwrap();
        let index = [1.25, 7.0, 2.5];
        let point = grid.index_to_physical(&index);
        assert_close(&grid.physical_to_index(&point), &index);
    }

    #[test]
    fn test_physical_box_covers_faces() {
        let grid = GridSpec::new([0.0, 0.0, 0.0], [2.0, 1.0, 1.0], [4, 3, 2], Direction::identity())
            .unwrap();
        let bbox = grid.physical_box();
        assert_close(&bbox.min, &[-1.0, -0.5, -0.5]);
        assert_close(&bbox.max, &[7.0, 2.5, 1.5]);
    }

    #[rstest]
    #[case([0.0, 0.0, 0.0], true)]
    #[case([9.0, 0.0, 0.0], true)]
    #[case([11.0, 0.0, 0.0], false)]
    #[case([0.0, -20.0, 0.0], false)]
    fn test_intersects(#[case] other_origin: Point3, #[case] expected: bool) {
        let grid = GridSpec::new([0.0; 3], [1.0; 3], [10, 10, 10], Direction::identity()).unwrap();
        let other = GridSpec::new(other_origin, [1.0; 3], [2, 2, 2], Direction::identity()).unwrap();
        assert_eq!(grid.intersects(&other), expected);
    }

    #[test]
    fn test_invalid_spacing() {
        let result = GridSpec::new([0.0; 3], [1.0, 0.0, 1.0], [1, 1, 1], Direction::identity());
        assert!(matches!(result, Err(GeometryError::InvalidSpacing { .. })));
    }
}
