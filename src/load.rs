use flate2::read::MultiGzDecoder;
use ndarray::{Array3, ShapeBuilder};
use snafu::{ensure, ResultExt};
use std::io::Read;
use std::path::Path;

use crate::errors::nifti::{
    IOSnafu, InvalidGeometrySnafu, InvalidShapeSnafu, NiftiError, TruncatedDataSnafu,
};
use crate::geometry::GridSpec;
use crate::nifti::{DataType, NiftiHeader, HEADER_SIZE};
use crate::volume::Volume;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Reads the raw file, transparently decompressing gzip data.
fn read_bytes(path: &Path) -> Result<Vec<u8>, NiftiError> {
    let raw = std::fs::read(path).context(IOSnafu { path })?;
    if raw.starts_with(&GZIP_MAGIC) {
        let mut bytes = Vec::with_capacity(raw.len() * 4);
        MultiGzDecoder::new(raw.as_slice())
            .read_to_end(&mut bytes)
            .context(IOSnafu { path })?;
        Ok(bytes)
    } else {
        Ok(raw)
    }
}

fn decode_voxel(chunk: &[u8], datatype: DataType, big_endian: bool) -> f64 {
    fn ordered<const N: usize>(chunk: &[u8], big_endian: bool) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&chunk[..N]);
        if big_endian {
            out.reverse();
        }
        out
    }

    match datatype {
        DataType::U8 => chunk[0] as f64,
        DataType::I8 => chunk[0] as i8 as f64,
        DataType::I16 => i16::from_le_bytes(ordered(chunk, big_endian)) as f64,
        DataType::U16 => u16::from_le_bytes(ordered(chunk, big_endian)) as f64,
        DataType::I32 => i32::from_le_bytes(ordered(chunk, big_endian)) as f64,
        DataType::U32 => u32::from_le_bytes(ordered(chunk, big_endian)) as f64,
        DataType::F32 => f32::from_le_bytes(ordered(chunk, big_endian)) as f64,
        DataType::F64 => f64::from_le_bytes(ordered(chunk, big_endian)),
    }
}

/// Loads the first 3D volume of a NIfTI-1 file (`.nii` or `.nii.gz`) as `f32` voxels.
pub fn load_volume<P: AsRef<Path>>(path: P) -> Result<Volume, NiftiError> {
    let path = path.as_ref();
    let bytes = read_bytes(path)?;
    let header = NiftiHeader::parse(&bytes, path)?;
    let grid = header.grid(path)?;
    let volume = decode_volume(&bytes, &header, grid, 0, path)?;
    tracing::info!("Loaded {} ({})", path.display(), grid);
    Ok(volume)
}

/// Loads every 3D volume of a multi-volume file, such as a stack of label posteriors.
pub fn load_volumes<P: AsRef<Path>>(path: P) -> Result<Vec<Volume>, NiftiError> {
    let path = path.as_ref();
    let bytes = read_bytes(path)?;
    let header = NiftiHeader::parse(&bytes, path)?;
    let grid = header.grid(path)?;
    let volumes = (0..header.num_volumes()?)
        .map(|index| decode_volume(&bytes, &header, grid, index, path))
        .collect::<Result<Vec<_>, _>>()?;
    tracing::info!("Loaded {} volumes from {} ({})", volumes.len(), path.display(), grid);
    Ok(volumes)
}

// Decodes volume `index`, stored after `index` complete volumes
fn decode_volume(
    bytes: &[u8],
    header: &NiftiHeader,
    grid: GridSpec,
    index: usize,
    path: &Path,
) -> Result<Volume, NiftiError> {
    let width = header.datatype.bytes_per_voxel();
    let length = grid.num_voxels() * width;
    let start = (header.vox_offset.max(0.0) as usize).max(HEADER_SIZE) + index * length;
    let available = bytes.len().saturating_sub(start);
    ensure!(
        available >= length,
        TruncatedDataSnafu {
            path,
            expected: length,
            actual: available,
        }
    );

    let scaling = header.scaling();
    let voxels = bytes[start..start + length]
        .chunks_exact(width)
        .map(|chunk| {
            let value = decode_voxel(chunk, header.datatype, header.big_endian);
            match scaling {
                Some((slope, inter)) => (value * slope as f64 + inter as f64) as f32,
                None => value as f32,
            }
        })
        .collect::<Vec<_>>();

    // NIfTI stores the first index fastest
    let [nx, ny, nz] = grid.size;
    let data = Array3::from_shape_vec((nx, ny, nz).f(), voxels).context(InvalidShapeSnafu { path })?;
    Volume::from_grid(data, grid).context(InvalidGeometrySnafu { path })
}
