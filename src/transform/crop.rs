use snafu::ensure;
use std::fmt;

use crate::errors::geometry::{GeometryError, GeometryMismatchSnafu, InvalidArgumentSnafu};
use crate::geometry::{
    is_multiple_of, snap_up, GridSpec, PhysicalBox, Point3, CROP_MULTIPLE, ISOTROPIC_SPACING,
};
use crate::transform::analyze::analyze;
use crate::volume::Volume;

/// Crop size that fits most adult brains on an 11 GB GPU
pub const DEFAULT_CROP_SIZE: [usize; 3] = [192, 256, 192];
/// Alternative deployment default with more room along the first axis
pub const LARGE_CROP_SIZE: [usize; 3] = [224, 256, 192];
pub const DEFAULT_PAD_VOXELS: u32 = 32;

/// Where the segmentation model should run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Device {
    #[default]
    Gpu,
    Cpu,
}

impl Device {
    /// Applies an explicit user override on top of the planned device.
    pub fn resolve(self, force_cpu: bool) -> Device {
        if force_cpu {
            Device::Cpu
        } else {
            self
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let device_str = match self {
            Device::Gpu => "gpu",
            Device::Cpu => "cpu",
        };
        write!(f, "{device_str}")
    }
}

/// Requested crop box and mask padding. Sizes are validated on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRequest {
    requested_size: [usize; 3],
    pad_voxels: u32,
}

impl CropRequest {
    pub fn new(requested_size: [usize; 3], pad_voxels: u32) -> Result<Self, GeometryError> {
        ensure!(
            is_multiple_of(&requested_size, CROP_MULTIPLE),
            InvalidArgumentSnafu {
                message: format!(
                    "crop size {requested_size:?} must be positive multiples of {CROP_MULTIPLE}"
                ),
            }
        );
        Ok(CropRequest {
            requested_size,
            pad_voxels,
        })
    }

    pub fn requested_size(&self) -> [usize; 3] {
        self.requested_size
    }

    pub fn pad_voxels(&self) -> u32 {
        self.pad_voxels
    }
}

impl Default for CropRequest {
    fn default() -> Self {
        CropRequest {
            requested_size: DEFAULT_CROP_SIZE,
            pad_voxels: DEFAULT_PAD_VOXELS,
        }
    }
}

/// Resampling grid and device choice for one run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropPlan {
    pub grid: GridSpec,
    pub device: Device,
    /// Physical point the grid is centered on
    pub center: Point3,
}

impl CropPlan {
    pub fn new(
        image: &Volume,
        mask: Option<&Volume>,
        request: &CropRequest,
    ) -> Result<Self, GeometryError> {
        match mask {
            Some(mask) => CropPlan::around_mask(image, mask, request),
            None => CropPlan::centered(image, request),
        }
    }

    /// Crop of exactly the requested size about the center of the image.
    pub fn centered(image: &Volume, request: &CropRequest) -> Result<Self, GeometryError> {
        let center = image.grid().physical_center();
        let grid = GridSpec::centered_on(
            &center,
            request.requested_size,
            ISOTROPIC_SPACING,
            *image.direction(),
        )?;
        Ok(CropPlan {
            grid,
            device: Device::Gpu,
            center,
        })
    }

    /// Crop about the padded bounding box of `mask`, enlarged in steps of 32 voxels when the
    /// padded box does not fit the requested size. Any enlargement moves the plan to CPU.
    pub fn around_mask(
        image: &Volume,
        mask: &Volume,
        request: &CropRequest,
    ) -> Result<Self, GeometryError> {
        check_compatible(image.grid(), mask.grid())?;
        let bbox = analyze(mask)?;
        let padded = bbox.padded(request.pad_voxels, mask.grid());
        let final_size = fit_size(&padded, image, request)?;

        let enlarged = final_size
            .iter()
            .zip(request.requested_size.iter())
            .any(|(actual, requested)| actual > requested);
        let device = if enlarged {
            tracing::warn!(
                "Brain mask extent is larger than the requested crop {:?}, enlarging to {:?} and using CPU to avoid running out of memory",
                request.requested_size,
                final_size
            );
            Device::Cpu
        } else {
            Device::Gpu
        };

        let center = padded.center();
        let grid = GridSpec::centered_on(&center, final_size, ISOTROPIC_SPACING, *image.direction())?;
        Ok(CropPlan {
            grid,
            device,
            center,
        })
    }
}

// Smallest multiple-of-32 size per axis holding both the padded box and the requested size
fn fit_size(
    padded: &PhysicalBox,
    image: &Volume,
    request: &CropRequest,
) -> Result<[usize; 3], GeometryError> {
    let extent = padded.extent_along(image.direction());
    let mut size = [0; 3];
    for axis in 0..3 {
        let needed = (extent[axis] / ISOTROPIC_SPACING[axis]).max(request.requested_size[axis] as f64);
        size[axis] = snap_up(needed, CROP_MULTIPLE)?;
    }
    tracing::debug!("Padded mask extent {:?}, crop size {:?}", extent, size);
    Ok(size)
}

/// Checks that a mask can be combined with an image: both must share an orientation and their
/// physical extents must overlap.
pub fn check_compatible(image: &GridSpec, mask: &GridSpec) -> Result<(), GeometryError> {
    ensure!(
        image.direction.approx_eq(&mask.direction),
        GeometryMismatchSnafu {
            reason: format!(
                "direction {:?} differs from image direction {:?}",
                mask.direction.matrix(),
                image.direction.matrix()
            ),
        }
    );
    ensure!(
        image.intersects(mask),
        GeometryMismatchSnafu {
            reason: format!("mask extent ({mask}) does not overlap image extent ({image})"),
        }
    );
    Ok(())
}
