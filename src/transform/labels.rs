use ndarray::Array3;
use snafu::ensure;
use std::collections::HashMap;

use crate::errors::geometry::{GeometryError, InvalidArgumentSnafu, ShapeMismatchSnafu};
use crate::transform::Transform;
use crate::volume::Volume;

/// Number of AntsCT tissue classes, numbered from 1
pub const ANTSCT_CLASSES: usize = 6;

/// SynthSeg label to AntsCT tissue class. Classes: 1 CSF, 2 cortical gray matter,
/// 3 white matter, 4 deep gray matter, 5 brainstem, 6 cerebellum.
const SYNTHSEG_TO_ANTSCT: [(i32, i32); 33] = [
    (0, 0),
    (2, 3),
    (3, 2),
    (4, 1),
    (5, 1),
    (7, 6),
    (8, 6),
    (10, 4),
    (11, 4),
    (12, 4),
    (13, 4),
    (14, 1),
    (15, 1),
    (16, 5),
    (17, 4),
    (18, 4),
    (24, 1),
    (26, 4),
    (28, 4),
    (41, 3),
    (42, 2),
    (43, 1),
    (44, 1),
    (46, 6),
    (47, 6),
    (49, 4),
    (50, 4),
    (51, 4),
    (52, 4),
    (53, 4),
    (54, 4),
    (58, 4),
    (60, 4),
];

/// Relabels a segmentation. Labels absent from the table map to `unmapped`.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelMap {
    table: HashMap<i32, i32>,
    unmapped: i32,
}

impl LabelMap {
    pub fn new(table: HashMap<i32, i32>, unmapped: i32) -> Self {
        LabelMap { table, unmapped }
    }

    pub fn antsct() -> Self {
        LabelMap::new(SYNTHSEG_TO_ANTSCT.into_iter().collect(), 0)
    }

    pub fn map_label(&self, label: i32) -> i32 {
        self.table.get(&label).copied().unwrap_or(self.unmapped)
    }
}

impl Transform<Volume> for LabelMap {
    fn apply(&self, volume: &Volume) -> Volume {
        let data = volume
            .data()
            .mapv(|value| self.map_label(value.round() as i32) as f32);
        Volume::from_parts(data, *volume.grid())
    }
}

/// Sums SynthSeg label posteriors into one probability map per AntsCT class.
///
/// Channel `k` is the posterior of the `k`-th label of the AntsCT table, which lists SynthSeg
/// labels in ascending order. Background is skipped and channels past the table are ignored.
pub fn antsct_posteriors(posteriors: &[Volume]) -> Result<Vec<Volume>, GeometryError> {
    ensure!(
        posteriors.len() >= SYNTHSEG_TO_ANTSCT.len(),
        InvalidArgumentSnafu {
            message: format!(
                "expected at least {} posterior channels, got {}",
                SYNTHSEG_TO_ANTSCT.len(),
                posteriors.len()
            ),
        }
    );
    let grid = *posteriors[0].grid();
    let [nx, ny, nz] = grid.size;
    let mut classes: Vec<Array3<f32>> = (0..ANTSCT_CLASSES)
        .map(|_| Array3::zeros((nx, ny, nz)))
        .collect();

    for (&(_, class), channel) in SYNTHSEG_TO_ANTSCT.iter().zip(posteriors) {
        ensure!(
            channel.size() == grid.size,
            ShapeMismatchSnafu {
                shape: channel.size(),
                size: grid.size,
            }
        );
        if class > 0 {
            classes[class as usize - 1] += channel.data();
        }
    }
    Ok(classes
        .into_iter()
        .map(|data| Volume::from_parts(data, grid))
        .collect())
}
