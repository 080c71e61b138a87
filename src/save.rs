use flate2::write::GzEncoder;
use flate2::Compression;
use snafu::ResultExt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::errors::nifti::{IOSnafu, NiftiError};
use crate::nifti::{DataType, NiftiHeader};
use crate::volume::Volume;

/// Writes volumes as single-file NIfTI-1, gzip-compressed when the path ends in `.gz`
#[derive(Debug, Clone, Copy)]
pub struct NiftiSaver {
    datatype: DataType,
    compression: Compression,
}

impl NiftiSaver {
    pub fn new(datatype: DataType) -> Self {
        NiftiSaver {
            datatype,
            compression: Compression::default(),
        }
    }

    /// Saver for intensity images
    pub fn image() -> Self {
        NiftiSaver::new(DataType::F32)
    }

    /// Saver for label maps
    pub fn labels() -> Self {
        NiftiSaver::new(DataType::I16)
    }

    pub fn with_compression(self, compression: Compression) -> Self {
        NiftiSaver {
            compression,
            ..self
        }
    }

    fn encode(&self, volume: &Volume) -> Result<Vec<u8>, NiftiError> {
        let header = NiftiHeader::from_grid(volume.grid(), self.datatype)?;
        let mut bytes = header.to_bytes();
        bytes.reserve(volume.grid().num_voxels() * self.datatype.bytes_per_voxel());

        // Transposed iteration visits the first index fastest
        for &value in volume.data().t().iter() {
            match self.datatype {
                DataType::U8 => bytes.push(num::clamp(value.round(), 0.0, u8::MAX as f32) as u8),
                DataType::I8 => bytes.extend_from_slice(
                    &(num::clamp(value.round(), i8::MIN as f32, i8::MAX as f32) as i8).to_le_bytes(),
                ),
                DataType::I16 => bytes.extend_from_slice(
                    &(num::clamp(value.round(), i16::MIN as f32, i16::MAX as f32) as i16)
                        .to_le_bytes(),
                ),
                DataType::U16 => bytes.extend_from_slice(
                    &(num::clamp(value.round(), 0.0, u16::MAX as f32) as u16).to_le_bytes(),
                ),
                DataType::I32 => bytes.extend_from_slice(&(value.round() as i32).to_le_bytes()),
                DataType::U32 => bytes.extend_from_slice(&(value.round().max(0.0) as u32).to_le_bytes()),
                DataType::F32 => bytes.extend_from_slice(&value.to_le_bytes()),
                DataType::F64 => bytes.extend_from_slice(&(value as f64).to_le_bytes()),
            }
        }
        Ok(bytes)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P, volume: &Volume) -> Result<(), NiftiError> {
        let path = path.as_ref();
        let bytes = self.encode(volume)?;
        let file = File::create(path).context(IOSnafu { path })?;
        let writer = BufWriter::new(file);

        let is_gzip = path.extension().is_some_and(|ext| ext == "gz");
        if is_gzip {
            let mut encoder = GzEncoder::new(writer, self.compression);
            encoder.write_all(&bytes).context(IOSnafu { path })?;
            encoder
                .finish()
                .and_then(|mut writer| writer.flush())
                .context(IOSnafu { path })?;
        } else {
            let mut writer = writer;
            writer.write_all(&bytes).context(IOSnafu { path })?;
            writer.flush().context(IOSnafu { path })?;
        }
        tracing::info!("Saved {} ({})", path.display(), volume.grid());
        Ok(())
    }
}
