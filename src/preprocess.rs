use snafu::{ResultExt, Snafu};

use crate::errors::GeometryError;
use crate::transform::{CropPlan, CropRequest, Device, Interpolation, Resample, Transform};
use crate::volume::Volume;

#[derive(Debug, Snafu)]
pub enum PreprocessError {
    #[snafu(display("could not plan the crop: {}", source))]
    Plan {
        #[snafu(source(from(GeometryError, Box::new)))]
        source: Box<GeometryError>,
    },
}

/// What was done to an image before segmentation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreprocessingMetadata {
    pub plan: CropPlan,
    /// Planned device after any user override
    pub device: Device,
    pub interpolation: Interpolation,
}

impl PreprocessingMetadata {
    /// Crop size to pass to the segmentation model
    pub fn crop_size(&self) -> [usize; 3] {
        self.plan.grid.size
    }
}

// Responsible for bringing an image onto the grid the segmentation model expects
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Preprocessor {
    pub request: CropRequest,
    pub interpolation: Interpolation,
    pub force_cpu: bool,
}

impl Preprocessor {
    // Plans the crop and resamples the image onto the planned grid
    pub fn prepare_volume(
        &self,
        image: &Volume,
        mask: Option<&Volume>,
    ) -> Result<(Volume, PreprocessingMetadata), PreprocessError> {
        let plan = CropPlan::new(image, mask, &self.request).context(PlanSnafu)?;
        let device = plan.device.resolve(self.force_cpu);
        tracing::info!("Resampling to {} on {}", plan.grid, device);

        let resampled = Resample::new(plan.grid, self.interpolation).apply(image);
        Ok((
            resampled,
            PreprocessingMetadata {
                plan,
                device,
                interpolation: self.interpolation,
            },
        ))
    }
}
