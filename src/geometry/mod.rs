use snafu::{ensure, OptionExt};

use crate::errors::geometry::{
    GeometryError, InvalidArgumentSnafu, InvalidSpacingSnafu, SingularDirectionSnafu,
};

pub mod grid;
pub use grid::*;

/// A point or vector in physical (world) coordinates
pub type Point3 = [f64; 3];

/// Crop dimensions handed to the segmentation model must be multiples of this value
pub const CROP_MULTIPLE: usize = 32;

// Absorbs floating-point noise in physical extents before rounding up
const SNAP_TOLERANCE: f64 = 1e-6;
const DIRECTION_TOLERANCE: f64 = 1e-4;

pub fn add(a: &Point3, b: &Point3) -> Point3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

pub fn sub(a: &Point3, b: &Point3) -> Point3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

pub fn scale(a: &Point3, s: f64) -> Point3 {
    [a[0] * s, a[1] * s, a[2] * s]
}

pub fn midpoint(a: &Point3, b: &Point3) -> Point3 {
    scale(&add(a, b), 0.5)
}

/// Returns the smallest multiple of `multiple` that is greater than or equal to `value`.
pub fn snap_up(value: f64, multiple: usize) -> Result<usize, GeometryError> {
    ensure!(
        multiple > 0,
        InvalidArgumentSnafu {
            message: format!("snap multiple must be positive, got {multiple}"),
        }
    );
    ensure!(
        value.is_finite() && value >= 0.0,
        InvalidArgumentSnafu {
            message: format!("snap value must be finite and non-negative, got {value}"),
        }
    );
    let steps = ((value - SNAP_TOLERANCE).max(0.0) / multiple as f64).ceil();
    (steps < usize::MAX as f64)
        .then(|| steps as usize)
        .and_then(|steps| steps.checked_mul(multiple))
        .context(InvalidArgumentSnafu {
            message: format!("snapping {value} to a multiple of {multiple} overflows"),
        })
}

/// Checks that every component is a positive multiple of `multiple`.
pub fn is_multiple_of(vector: &[usize], multiple: usize) -> bool {
    multiple > 0 && vector.iter().all(|&v| v > 0 && v % multiple == 0)
}

pub(crate) fn validate_spacing(spacing: &[f64; 3]) -> Result<(), GeometryError> {
    ensure!(
        spacing.iter().all(|s| s.is_finite() && *s > 0.0),
        InvalidSpacingSnafu { spacing: *spacing }
    );
    Ok(())
}

/// Orientation of the index axes in physical space. Column `j` is the physical direction of
/// index axis `j`. The inverse is computed once at construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Direction {
    matrix: [[f64; 3]; 3],
    inverse: [[f64; 3]; 3],
}

impl Direction {
    pub fn new(matrix: [[f64; 3]; 3]) -> Result<Self, GeometryError> {
        let m = &matrix;
        let cofactor = |r0: usize, r1: usize, c0: usize, c1: usize| {
            m[r0][c0] * m[r1][c1] - m[r0][c1] * m[r1][c0]
        };
        let det = m[0][0] * cofactor(1, 2, 1, 2) - m[0][1] * cofactor(1, 2, 0, 2)
            + m[0][2] * cofactor(1, 2, 0, 1);
        ensure!(
            det.is_finite() && det.abs() > f64::EPSILON,
            SingularDirectionSnafu { matrix }
        );

        let inverse = [
            [
                cofactor(1, 2, 1, 2) / det,
                -cofactor(0, 2, 1, 2) / det,
                cofactor(0, 1, 1, 2) / det,
            ],
            [
                -cofactor(1, 2, 0, 2) / det,
                cofactor(0, 2, 0, 2) / det,
                -cofactor(0, 1, 0, 2) / det,
            ],
            [
                cofactor(1, 2, 0, 1) / det,
                -cofactor(0, 2, 0, 1) / det,
                cofactor(0, 1, 0, 1) / det,
            ],
        ];
        Ok(Direction { matrix, inverse })
    }

    pub fn identity() -> Self {
        let matrix = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        Direction {
            matrix,
            inverse: matrix,
        }
    }

    pub fn matrix(&self) -> &[[f64; 3]; 3] {
        &self.matrix
    }

    /// Computes `D * v`
    pub fn apply(&self, v: &Point3) -> Point3 {
        mat_vec(&self.matrix, v)
    }

    /// Computes `D^-1 * v`
    pub fn invert(&self, v: &Point3) -> Point3 {
        mat_vec(&self.inverse, v)
    }

    pub fn approx_eq(&self, other: &Direction) -> bool {
        self.matrix
            .iter()
            .flatten()
            .zip(other.matrix.iter().flatten())
            .all(|(a, b)| (a - b).abs() <= DIRECTION_TOLERANCE)
    }
}

impl Default for Direction {
    fn default() -> Self {
        Direction::identity()
    }
}

fn mat_vec(m: &[[f64; 3]; 3], v: &Point3) -> Point3 {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

/// Box spanned by two opposite physical corners. The corners are not sorted per coordinate,
/// since a flipped direction maps the lower index corner to a larger physical coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicalBox {
    pub min: Point3,
    pub max: Point3,
}

impl PhysicalBox {
    pub fn new(min: Point3, max: Point3) -> Self {
        PhysicalBox { min, max }
    }

    pub fn center(&self) -> Point3 {
        midpoint(&self.min, &self.max)
    }

    /// Side lengths of the box measured along the columns of `direction`.
    pub fn extent_along(&self, direction: &Direction) -> [f64; 3] {
        direction
            .invert(&sub(&self.max, &self.min))
            .map(|component| component.abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0.0, 32, 0)]
    #[case(1.0, 32, 32)]
    #[case(32.0, 32, 32)]
    #[case(32.5, 32, 64)]
    #[case(314.0, 32, 320)]
    #[case(256.0000000001, 32, 256)]
    #[case(191.2, 32, 192)]
    fn test_snap_up(#[case] value: f64, #[case] multiple: usize, #[case] expected: usize) {
        assert_eq!(snap_up(value, multiple).unwrap(), expected);
    }

    #[rstest]
    #[case(-1.0, 32)]
    #[case(10.0, 0)]
    #[case(f64::NAN, 32)]
    #[case(f64::INFINITY, 32)]
    #[case(1e30, 32)]
    #[case(usize::MAX as f64, 1)]
    fn test_snap_up_invalid(#[case] value: f64, #[case] multiple: usize) {
        assert!(matches!(
            snap_up(value, multiple),
            Err(GeometryError::InvalidArgument { .. })
        ));
    }

    #[rstest]
    #[case(0.0)]
    #[case(17.3)]
    #[case(192.0)]
    #[case(314.0)]
    #[case(1000.01)]
    fn test_snap_up_idempotent(#[case] value: f64) {
        let once = snap_up(value, CROP_MULTIPLE).unwrap();
        let twice = snap_up(once as f64, CROP_MULTIPLE).unwrap();
        assert_eq!(once, twice);
    }

    #[rstest]
    #[case(vec![192, 256, 192], true)]
    #[case(vec![224, 256, 192], true)]
    #[case(vec![200, 256, 192], false)]
    #[case(vec![0, 256, 192], false)]
    fn test_is_multiple_of(#[case] vector: Vec<usize>, #[case] expected: bool) {
        assert_eq!(is_multiple_of(&vector, CROP_MULTIPLE), expected);
    }

    #[test]
    fn test_direction_inverse() {
        let direction =
            Direction::new([[0.0, -1.0, 0.0], [2.0, 0.0, 0.0], [0.0, 0.0, -1.0]]).unwrap();
        let v = [1.5, -2.0, 3.0];
        let roundtrip = direction.invert(&direction.apply(&v));
        for (a, b) in roundtrip.iter().zip(v.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_singular_direction() {
        let result = Direction::new([[1.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]]);
        assert!(matches!(result, Err(GeometryError::SingularDirection { .. })));
    }

    #[test]
    fn test_box_center_and_extent() {
        let flip_x =
            Direction::new([[-1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]).unwrap();
        let bbox = PhysicalBox::new([10.0, -4.0, 0.0], [-10.0, 4.0, 6.0]);
        assert_eq!(bbox.center(), [0.0, 0.0, 3.0]);
        assert_eq!(bbox.extent_along(&flip_x), [20.0, 8.0, 6.0]);
    }
}
