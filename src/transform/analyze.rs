use snafu::OptionExt;

use crate::errors::geometry::{EmptyMaskSnafu, GeometryError};
use crate::geometry::{GridSpec, PhysicalBox, Point3};
use crate::volume::Volume;

/// Tight bounding box of the nonzero voxels of a mask.
///
/// `min_index` and `max_index` are inclusive. The physical corners are the outer faces of the
/// extreme voxels, so a box around a single voxel has an extent of one voxel spacing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_index: [usize; 3],
    pub max_index: [usize; 3],
    pub min_physical: Point3,
    pub max_physical: Point3,
}

impl BoundingBox {
    pub fn from_index_bounds(min_index: [usize; 3], max_index: [usize; 3], grid: &GridSpec) -> Self {
        let physical = face_box(&min_index, &max_index, 0.0, grid);
        BoundingBox {
            min_index,
            max_index,
            min_physical: physical.min,
            max_physical: physical.max,
        }
    }

    pub fn extent_voxels(&self) -> [usize; 3] {
        std::array::from_fn(|axis| self.max_index[axis] - self.min_index[axis] + 1)
    }

    pub fn physical(&self) -> PhysicalBox {
        PhysicalBox::new(self.min_physical, self.max_physical)
    }

    /// Grows the box by `pad_voxels` voxels of the mask grid on every face.
    pub fn padded(&self, pad_voxels: u32, grid: &GridSpec) -> PhysicalBox {
        face_box(&self.min_index, &self.max_index, pad_voxels as f64, grid)
    }
}

fn face_box(min_index: &[usize; 3], max_index: &[usize; 3], pad: f64, grid: &GridSpec) -> PhysicalBox {
    let lower: Point3 = std::array::from_fn(|axis| min_index[axis] as f64 - 0.5 - pad);
    let upper: Point3 = std::array::from_fn(|axis| max_index[axis] as f64 + 0.5 + pad);
    PhysicalBox::new(grid.index_to_physical(&lower), grid.index_to_physical(&upper))
}

/// Computes the bounding box of all nonzero voxels of `mask`.
pub fn analyze(mask: &Volume) -> Result<BoundingBox, GeometryError> {
    let (min_index, max_index) = mask
        .data()
        .indexed_iter()
        .filter(|(_, &value)| value != 0.0)
        .fold(None, |bounds: Option<([usize; 3], [usize; 3])>, ((i, j, k), _)| {
            let index = [i, j, k];
            Some(match bounds {
                None => (index, index),
                Some((min, max)) => (
                    std::array::from_fn(|axis| min[axis].min(index[axis])),
                    std::array::from_fn(|axis| max[axis].max(index[axis])),
                ),
            })
        })
        .context(EmptyMaskSnafu)?;

    let bbox = BoundingBox::from_index_bounds(min_index, max_index, mask.grid());
    tracing::debug!(
        "Mask bounding box: index {:?}..={:?}, extent {:?} voxels",
        bbox.min_index,
        bbox.max_index,
        bbox.extent_voxels()
    );
    Ok(bbox)
}
