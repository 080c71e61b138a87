use itertools::iproduct;
use ndarray::{Array3, Axis};
use std::fmt;

use crate::geometry::{GridSpec, Point3};
use crate::transform::Transform;
use crate::volume::Volume;

pub const DEFAULT_BACKGROUND: f32 = 0.0;

// Pole of the cubic B-spline prefilter
const BSPLINE_POLE: f64 = -0.267_949_192_431_122_7;
const BSPLINE_GAIN: f64 = 6.0;
const PREFILTER_TOLERANCE: f64 = 1e-10;

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Interpolation {
    #[default]
    #[value(name = "bspline")]
    BSpline,
    Linear,
    Nearest,
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let interpolation_str = match self {
            Interpolation::BSpline => "bspline",
            Interpolation::Linear => "linear",
            Interpolation::Nearest => "nearest",
        };
        write!(f, "{interpolation_str}")
    }
}

/// Resamples a volume onto `grid`. Points of the target grid that fall outside the source
/// volume are set to `default_value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Resample {
    pub grid: GridSpec,
    pub interpolation: Interpolation,
    pub default_value: f32,
}

impl Resample {
    pub fn new(grid: GridSpec, interpolation: Interpolation) -> Self {
        Resample {
            grid,
            interpolation,
            default_value: DEFAULT_BACKGROUND,
        }
    }

    pub fn with_default_value(self, default_value: f32) -> Self {
        Resample {
            default_value,
            ..self
        }
    }

    /// Affine map from target indices to continuous source indices, as `(matrix, offset)`
    fn index_map(&self, source: &GridSpec) -> ([[f64; 3]; 3], Point3) {
        let origin = self.grid.index_to_physical(&[0.0; 3]);
        let offset = source.physical_to_index(&origin);
        let mut matrix = [[0.0; 3]; 3];
        for axis in 0..3 {
            let mut step = [0.0; 3];
            step[axis] = 1.0;
            let moved = source.physical_to_index(&self.grid.index_to_physical(&step));
            for row in 0..3 {
                matrix[row][axis] = moved[row] - offset[row];
            }
        }
        (matrix, offset)
    }
}

impl Transform<Volume> for Resample {
    fn apply(&self, volume: &Volume) -> Volume {
        let source = volume.grid();
        let (matrix, offset) = self.index_map(source);
        let sampler = Sampler::new(volume.data(), self.interpolation);
        let [nx, ny, nz] = self.grid.size;

        let output = Array3::from_shape_fn((nx, ny, nz), |(i, j, k)| {
            let target = [i as f64, j as f64, k as f64];
            let index: Point3 = std::array::from_fn(|row| {
                offset[row]
                    + matrix[row][0] * target[0]
                    + matrix[row][1] * target[1]
                    + matrix[row][2] * target[2]
            });
            if is_inside(&index, &source.size) {
                sampler.sample(&index) as f32
            } else {
                self.default_value
            }
        });

        tracing::debug!(
            "Resampled {:?} to {} with {} interpolation",
            source.size,
            self.grid,
            self.interpolation
        );
        Volume::from_parts(output, self.grid)
    }
}

fn is_inside(index: &Point3, size: &[usize; 3]) -> bool {
    index
        .iter()
        .zip(size.iter())
        .all(|(&x, &n)| x >= -0.5 && x <= n as f64 - 0.5)
}

/// Maps any integer index onto `0..n` by reflecting about the end samples.
fn mirror(index: i64, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let period = 2 * (n as i64 - 1);
    let folded = index.rem_euclid(period);
    if folded >= n as i64 {
        (period - folded) as usize
    } else {
        folded as usize
    }
}

fn clamp_index(index: i64, n: usize) -> usize {
    index.clamp(0, n as i64 - 1) as usize
}

enum Sampler<'a> {
    Nearest(&'a Array3<f32>),
    Linear(&'a Array3<f32>),
    BSpline(Array3<f64>),
}

impl<'a> Sampler<'a> {
    fn new(data: &'a Array3<f32>, interpolation: Interpolation) -> Self {
        match interpolation {
            Interpolation::Nearest => Sampler::Nearest(data),
            Interpolation::Linear => Sampler::Linear(data),
            Interpolation::BSpline => Sampler::BSpline(bspline_coefficients(data)),
        }
    }

    fn sample(&self, index: &Point3) -> f64 {
        match self {
            Sampler::Nearest(data) => {
                let (nx, ny, nz) = data.dim();
                let dims = [nx, ny, nz];
                let [i, j, k]: [usize; 3] =
                    std::array::from_fn(|axis| clamp_index(index[axis].round() as i64, dims[axis]));
                data[[i, j, k]] as f64
            }
            Sampler::Linear(data) => {
                let (nx, ny, nz) = data.dim();
                let dims = [nx, ny, nz];
                let base: [i64; 3] = std::array::from_fn(|axis| index[axis].floor() as i64);
                let frac: Point3 = std::array::from_fn(|axis| index[axis] - base[axis] as f64);
                iproduct!(0..2i64, 0..2i64, 0..2i64)
                    .map(|(di, dj, dk)| {
                        let offsets = [di, dj, dk];
                        let weight: f64 = (0..3)
                            .map(|axis| {
                                if offsets[axis] == 0 {
                                    1.0 - frac[axis]
                                } else {
                                    frac[axis]
                                }
                            })
                            .product();
                        let [i, j, k]: [usize; 3] = std::array::from_fn(|axis| {
                            clamp_index(base[axis] + offsets[axis], dims[axis])
                        });
                        weight * data[[i, j, k]] as f64
                    })
                    .sum()
            }
            Sampler::BSpline(coefficients) => {
                let (nx, ny, nz) = coefficients.dim();
                let dims = [nx, ny, nz];
                let mut start = [0i64; 3];
                let mut weights = [[0.0; 4]; 3];
                for axis in 0..3 {
                    let floor = index[axis].floor();
                    start[axis] = floor as i64 - 1;
                    weights[axis] = bspline_weights(index[axis] - floor);
                }
                iproduct!(0..4usize, 0..4usize, 0..4usize)
                    .map(|(a, b, c)| {
                        let i = mirror(start[0] + a as i64, dims[0]);
                        let j = mirror(start[1] + b as i64, dims[1]);
                        let k = mirror(start[2] + c as i64, dims[2]);
                        weights[0][a] * weights[1][b] * weights[2][c] * coefficients[[i, j, k]]
                    })
                    .sum()
            }
        }
    }
}

/// Cubic B-spline weights of the four samples around a point at fractional offset `t`.
fn bspline_weights(t: f64) -> [f64; 4] {
    let t2 = t * t;
    let t3 = t2 * t;
    let one_minus = 1.0 - t;
    [
        one_minus * one_minus * one_minus / 6.0,
        (4.0 - 6.0 * t2 + 3.0 * t3) / 6.0,
        (1.0 + 3.0 * t + 3.0 * t2 - 3.0 * t3) / 6.0,
        t3 / 6.0,
    ]
}

/// Converts samples to interpolating cubic B-spline coefficients, one axis at a time.
fn bspline_coefficients(data: &Array3<f32>) -> Array3<f64> {
    let mut coefficients = data.mapv(|v| v as f64);
    let mut line = Vec::new();
    for axis in 0..3 {
        for mut lane in coefficients.lanes_mut(Axis(axis)) {
            line.clear();
            line.extend(lane.iter().copied());
            prefilter_line(&mut line);
            lane.iter_mut().zip(line.iter()).for_each(|(c, v)| *c = *v);
        }
    }
    coefficients
}

// Recursive filtering with mirror boundaries
fn prefilter_line(c: &mut [f64]) {
    let n = c.len();
    if n < 2 {
        return;
    }
    let z = BSPLINE_POLE;
    c.iter_mut().for_each(|v| *v *= BSPLINE_GAIN);

    c[0] = causal_initial(c, z);
    for k in 1..n {
        c[k] += z * c[k - 1];
    }
    c[n - 1] = (z / (z * z - 1.0)) * (z * c[n - 2] + c[n - 1]);
    for k in (0..n - 1).rev() {
        c[k] = z * (c[k + 1] - c[k]);
    }
}

fn causal_initial(c: &[f64], z: f64) -> f64 {
    let n = c.len();
    let horizon = (PREFILTER_TOLERANCE.ln() / z.abs().ln()).ceil() as usize;
    if horizon < n {
        let mut zn = z;
        let mut sum = c[0];
        for value in c.iter().take(horizon).skip(1) {
            sum += zn * value;
            zn *= z;
        }
        sum
    } else {
        let mut zn = z;
        let iz = 1.0 / z;
        let mut z2n = z.powi(n as i32 - 1);
        let mut sum = c[0] + z2n * c[n - 1];
        z2n *= z2n * iz;
        for value in c.iter().take(n - 1).skip(1) {
            sum += (zn + z2n) * value;
            zn *= z;
            z2n *= iz;
        }
        sum / (1.0 - zn * zn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Direction, ISOTROPIC_SPACING};
    use rstest::rstest;

    fn ramp_volume(size: [usize; 3], spacing: [f64; 3]) -> Volume {
        let data = Array3::from_shape_fn((size[0], size[1], size[2]), |(i, j, k)| {
            (i as f32) * 2.0 + (j as f32) * 0.5 - (k as f32) + ((i * j + k) % 5) as f32
        });
        Volume::new(data, [0.0; 3], spacing, Direction::identity()).unwrap()
    }

    #[rstest]
    #[case(Interpolation::BSpline, 1e-4)]
    #[case(Interpolation::Linear, 1e-6)]
    #[case(Interpolation::Nearest, 0.0)]
    fn test_identity_grid_reproduces_samples(
        #[case] interpolation: Interpolation,
        #[case] tolerance: f32,
    ) {
        let volume = ramp_volume([7, 6, 5], [1.0; 3]);
        let resample = Resample::new(*volume.grid(), interpolation);
        let output = resample.apply(&volume);
        assert_eq!(output.size(), volume.size());
        for (a, b) in output.data().iter().zip(volume.data().iter()) {
            assert!((a - b).abs() <= tolerance, "{a} != {b}");
        }
    }

    #[rstest]
    #[case(Interpolation::BSpline)]
    #[case(Interpolation::Linear)]
    #[case(Interpolation::Nearest)]
    fn test_constant_volume_stays_constant(#[case] interpolation: Interpolation) {
        let volume = Volume::new(
            Array3::from_elem((6, 6, 6), 3.5),
            [0.0; 3],
            [1.7, 1.3, 2.0],
            Direction::identity(),
        )
        .unwrap();
        let grid = GridSpec::centered_on(
            &volume.grid().physical_center(),
            [4, 4, 4],
            ISOTROPIC_SPACING,
            Direction::identity(),
        )
        .unwrap();
        let output = Resample::new(grid, interpolation).apply(&volume);
        for value in output.data().iter() {
            assert!((value - 3.5).abs() < 1e-4);
        }
    }

    #[test]
    fn test_outside_is_background() {
        let volume = Volume::new(
            Array3::from_elem((4, 4, 4), 1.0),
            [0.0; 3],
            [1.0; 3],
            Direction::identity(),
        )
        .unwrap();
        let grid = GridSpec::new([-2.0, 0.0, 0.0], [1.0; 3], [8, 1, 1], Direction::identity())
            .unwrap();
        let output = Resample::new(grid, Interpolation::Linear)
            .with_default_value(-1.0)
            .apply(&volume);
        let row: Vec<f32> = output.data().iter().copied().collect();
        assert_eq!(row, vec![-1.0, -1.0, 1.0, 1.0, 1.0, 1.0, -1.0, -1.0]);
    }

    #[test]
    fn test_linear_halfway() {
        let data = Array3::from_shape_fn((2, 1, 1), |(i, _, _)| i as f32 * 10.0);
        let volume = Volume::new(data, [0.0; 3], [2.0, 1.0, 1.0], Direction::identity()).unwrap();
        let grid = GridSpec::new([1.0, 0.0, 0.0], [1.0; 3], [1, 1, 1], Direction::identity())
            .unwrap();
        let output = Resample::new(grid, Interpolation::Linear).apply(&volume);
        assert!((output.data()[[0, 0, 0]] - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_follows_direction() {
        // Source flipped along x: physical x = 3 - i
        let flip = Direction::new([[-1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]).unwrap();
        let data = Array3::from_shape_fn((4, 1, 1), |(i, _, _)| i as f32);
        let volume = Volume::new(data, [3.0, 0.0, 0.0], [1.0; 3], flip).unwrap();
        let grid = GridSpec::new([0.0; 3], [1.0; 3], [4, 1, 1], Direction::identity()).unwrap();
        let output = Resample::new(grid, Interpolation::Nearest).apply(&volume);
        let row: Vec<f32> = output.data().iter().copied().collect();
        assert_eq!(row, vec![3.0, 2.0, 1.0, 0.0]);
    }

    #[rstest]
    #[case(-1, 4, 1)]
    #[case(0, 4, 0)]
    #[case(3, 4, 3)]
    #[case(4, 4, 2)]
    #[case(7, 4, 1)]
    #[case(5, 1, 0)]
    fn test_mirror(#[case] index: i64, #[case] n: usize, #[case] expected: usize) {
        assert_eq!(mirror(index, n), expected);
    }

    #[rstest]
    #[case(0.0)]
    #[case(0.25)]
    #[case(0.5)]
    #[case(0.9)]
    fn test_bspline_weights_partition_of_unity(#[case] t: f64) {
        let sum: f64 = bspline_weights(t).iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[rstest]
    #[case(vec![1.0, 4.0, -2.0, 8.0, 3.0])]
    #[case((0..40).map(|v| ((v * 7) % 11) as f64).collect())]
    fn test_prefilter_interpolates(#[case] samples: Vec<f64>) {
        let mut coefficients = samples.clone();
        prefilter_line(&mut coefficients);
        let n = samples.len();
        for (k, expected) in samples.iter().enumerate() {
            let w = bspline_weights(0.0);
            let value: f64 = (0..4)
                .map(|a| w[a] * coefficients[mirror(k as i64 - 1 + a as i64, n)])
                .sum();
            assert!((value - expected).abs() < 1e-6, "{value} != {expected}");
        }
    }
}
