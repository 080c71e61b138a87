//! Minimal NIfTI-1 header support.
//!
//! Only single-file images (`n+1` magic) are handled. Geometry is taken from the sform when
//! present, then the qform, then `pixdim` alone. Coordinates stay in the world frame of the
//! file (RAS for conforming files).

use snafu::{ensure, ResultExt};
use std::path::Path;

use crate::errors::nifti::{
    DimensionTooLargeSnafu, InvalidGeometrySnafu, InvalidHeaderSnafu, InvalidMagicSnafu,
    NiftiError, TruncatedDataSnafu, UnsupportedDataTypeSnafu, UnsupportedDimensionsSnafu,
};
use crate::errors::GeometryError;
use crate::geometry::{Direction, GridSpec, Point3};

pub const HEADER_SIZE: usize = 348;
/// Header plus the four-byte extension flag
pub const VOX_OFFSET: usize = 352;
pub const MAGIC: [u8; 4] = *b"n+1\0";
const DESCRIPTION: &str = concat!("synthseg-preprocessing==", env!("CARGO_PKG_VERSION"));

// NIFTI_UNITS_MM | NIFTI_UNITS_SEC
const XYZT_UNITS: u8 = 2 | 8;
// NIFTI_XFORM_SCANNER_ANAT
const SFORM_SCANNER: i16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    U8,
    I8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl DataType {
    pub fn code(&self) -> i16 {
        match self {
            DataType::U8 => 2,
            DataType::I16 => 4,
            DataType::I32 => 8,
            DataType::F32 => 16,
            DataType::F64 => 64,
            DataType::I8 => 256,
            DataType::U16 => 512,
            DataType::U32 => 768,
        }
    }

    pub fn bytes_per_voxel(&self) -> usize {
        match self {
            DataType::U8 | DataType::I8 => 1,
            DataType::I16 | DataType::U16 => 2,
            DataType::I32 | DataType::U32 | DataType::F32 => 4,
            DataType::F64 => 8,
        }
    }
}

impl TryFrom<i16> for DataType {
    type Error = NiftiError;

    fn try_from(code: i16) -> Result<Self, Self::Error> {
        match code {
            2 => Ok(DataType::U8),
            4 => Ok(DataType::I16),
            8 => Ok(DataType::I32),
            16 => Ok(DataType::F32),
            64 => Ok(DataType::F64),
            256 => Ok(DataType::I8),
            512 => Ok(DataType::U16),
            768 => Ok(DataType::U32),
            _ => UnsupportedDataTypeSnafu { datatype: code }.fail(),
        }
    }
}

/// Endian-aware view over raw header bytes
struct Fields<'a> {
    bytes: &'a [u8],
    big_endian: bool,
}

impl Fields<'_> {
    fn take<const N: usize>(&self, offset: usize) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[offset..offset + N]);
        if self.big_endian {
            out.reverse();
        }
        out
    }

    fn i16(&self, offset: usize) -> i16 {
        i16::from_le_bytes(self.take(offset))
    }

    fn i32(&self, offset: usize) -> i32 {
        i32::from_le_bytes(self.take(offset))
    }

    fn f32(&self, offset: usize) -> f32 {
        f32::from_le_bytes(self.take(offset))
    }

    fn f32s<const N: usize>(&self, offset: usize) -> [f32; N] {
        std::array::from_fn(|i| self.f32(offset + 4 * i))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NiftiHeader {
    pub dim: [i16; 8],
    pub datatype: DataType,
    pub pixdim: [f32; 8],
    pub vox_offset: f32,
    pub scl_slope: f32,
    pub scl_inter: f32,
    pub qform_code: i16,
    pub sform_code: i16,
    pub quatern: [f32; 3],
    pub qoffset: [f32; 3],
    pub srow: [[f32; 4]; 3],
    pub big_endian: bool,
}

impl NiftiHeader {
    /// Parses the fixed 348-byte header at the start of `bytes`.
    pub fn parse(bytes: &[u8], path: &Path) -> Result<Self, NiftiError> {
        ensure!(
            bytes.len() >= HEADER_SIZE,
            TruncatedDataSnafu {
                path,
                expected: HEADER_SIZE,
                actual: bytes.len(),
            }
        );

        let mut fields = Fields {
            bytes,
            big_endian: false,
        };
        let sizeof_hdr = fields.i32(0);
        if sizeof_hdr != HEADER_SIZE as i32 {
            fields.big_endian = true;
            ensure!(
                fields.i32(0) == HEADER_SIZE as i32,
                InvalidHeaderSnafu { path, sizeof_hdr }
            );
        }

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[344..348]);
        ensure!(magic == MAGIC, InvalidMagicSnafu { path, magic });

        let dim: [i16; 8] = std::array::from_fn(|i| fields.i16(40 + 2 * i));
        ensure!((2..=7).contains(&dim[0]), UnsupportedDimensionsSnafu { dim });

        Ok(NiftiHeader {
            dim,
            datatype: DataType::try_from(fields.i16(70))?,
            pixdim: fields.f32s(76),
            vox_offset: fields.f32(108),
            scl_slope: fields.f32(112),
            scl_inter: fields.f32(116),
            qform_code: fields.i16(252),
            sform_code: fields.i16(254),
            quatern: fields.f32s(256),
            qoffset: fields.f32s(268),
            srow: [fields.f32s(280), fields.f32s(296), fields.f32s(312)],
            big_endian: fields.big_endian,
        })
    }

    /// Header describing a 3D image sampled on `grid`
    pub fn from_grid(grid: &GridSpec, datatype: DataType) -> Result<Self, NiftiError> {
        ensure!(
            grid.size.iter().all(|&n| n <= i16::MAX as usize),
            DimensionTooLargeSnafu { size: grid.size }
        );
        let mut pixdim = [0.0f32; 8];
        pixdim[0] = 1.0;
        for axis in 0..3 {
            pixdim[axis + 1] = grid.spacing[axis] as f32;
        }
        pixdim[4] = 1.0;

        let matrix = grid.direction.matrix();
        let srow = std::array::from_fn(|row| {
            [
                (matrix[row][0] * grid.spacing[0]) as f32,
                (matrix[row][1] * grid.spacing[1]) as f32,
                (matrix[row][2] * grid.spacing[2]) as f32,
                grid.origin[row] as f32,
            ]
        });

        Ok(NiftiHeader {
            dim: [
                3,
                grid.size[0] as i16,
                grid.size[1] as i16,
                grid.size[2] as i16,
                1,
                1,
                1,
                1,
            ],
            datatype,
            pixdim,
            vox_offset: VOX_OFFSET as f32,
            scl_slope: 1.0,
            scl_inter: 0.0,
            qform_code: 0,
            sform_code: SFORM_SCANNER,
            quatern: [0.0; 3],
            qoffset: [0.0; 3],
            srow,
            big_endian: false,
        })
    }

    pub fn shape(&self) -> Result<[usize; 3], NiftiError> {
        let ndim = self.dim[0] as usize;
        let shape: [i16; 3] = std::array::from_fn(|axis| if axis < ndim { self.dim[axis + 1] } else { 1 });
        ensure!(
            shape.iter().all(|&n| n > 0),
            UnsupportedDimensionsSnafu { dim: self.dim }
        );
        Ok(shape.map(|n| n as usize))
    }

    pub fn num_voxels(&self) -> Result<usize, NiftiError> {
        Ok(self.shape()?.iter().product())
    }

    /// Number of 3D volumes stored in the file, over all dimensions past the third
    pub fn num_volumes(&self) -> Result<usize, NiftiError> {
        let ndim = self.dim[0] as usize;
        let extra = self.dim.get(4..=ndim).unwrap_or(&[]);
        ensure!(
            extra.iter().all(|&n| n > 0),
            UnsupportedDimensionsSnafu { dim: self.dim }
        );
        Ok(extra.iter().map(|&n| n as usize).product())
    }

    /// Intensity scaling, ignoring the identity and the "unset" slope of zero
    pub fn scaling(&self) -> Option<(f32, f32)> {
        let slope = self.scl_slope;
        let inter = self.scl_inter;
        if slope == 0.0 || !slope.is_finite() || (slope == 1.0 && inter == 0.0) {
            None
        } else {
            Some((slope, if inter.is_finite() { inter } else { 0.0 }))
        }
    }

    pub fn grid(&self, path: &Path) -> Result<GridSpec, NiftiError> {
        let size = self.shape()?;
        let (origin, spacing, direction) = self.geometry().context(InvalidGeometrySnafu { path })?;
        GridSpec::new(origin, spacing, size, direction).context(InvalidGeometrySnafu { path })
    }

    fn geometry(&self) -> Result<(Point3, [f64; 3], Direction), GeometryError> {
        if self.sform_code > 0 {
            let spacing: [f64; 3] = std::array::from_fn(|col| {
                (0..3)
                    .map(|row| (self.srow[row][col] as f64).powi(2))
                    .sum::<f64>()
                    .sqrt()
            });
            crate::geometry::validate_spacing(&spacing)?;
            let matrix = std::array::from_fn(|row| {
                std::array::from_fn(|col| self.srow[row][col] as f64 / spacing[col])
            });
            let origin = std::array::from_fn(|row| self.srow[row][3] as f64);
            Ok((origin, spacing, Direction::new(matrix)?))
        } else if self.qform_code > 0 {
            let [b, c, d] = self.quatern.map(|q| q as f64);
            let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
            let qfac = if self.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
            let matrix = [
                [
                    a * a + b * b - c * c - d * d,
                    2.0 * (b * c - a * d),
                    qfac * 2.0 * (b * d + a * c),
                ],
                [
                    2.0 * (b * c + a * d),
                    a * a + c * c - b * b - d * d,
                    qfac * 2.0 * (c * d - a * b),
                ],
                [
                    2.0 * (b * d - a * c),
                    2.0 * (c * d + a * b),
                    qfac * (a * a + d * d - c * c - b * b),
                ],
            ];
            Ok((self.qoffset.map(|v| v as f64), self.pixdim_spacing(), Direction::new(matrix)?))
        } else {
            Ok(([0.0; 3], self.pixdim_spacing(), Direction::identity()))
        }
    }

    fn pixdim_spacing(&self) -> [f64; 3] {
        std::array::from_fn(|axis| (self.pixdim[axis + 1] as f64).abs())
    }

    /// Little-endian header bytes followed by an empty extension flag
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; VOX_OFFSET];
        let mut put = |offset: usize, value: &[u8]| {
            bytes[offset..offset + value.len()].copy_from_slice(value);
        };

        put(0, &(HEADER_SIZE as i32).to_le_bytes());
        for (i, d) in self.dim.iter().enumerate() {
            put(40 + 2 * i, &d.to_le_bytes());
        }
        put(70, &self.datatype.code().to_le_bytes());
        put(72, &((self.datatype.bytes_per_voxel() * 8) as i16).to_le_bytes());
        for (i, p) in self.pixdim.iter().enumerate() {
            put(76 + 4 * i, &p.to_le_bytes());
        }
        put(108, &self.vox_offset.to_le_bytes());
        put(112, &self.scl_slope.to_le_bytes());
        put(116, &self.scl_inter.to_le_bytes());
        put(123, &[XYZT_UNITS]);

        let description = DESCRIPTION.as_bytes();
        put(148, &description[..description.len().min(79)]);

        put(252, &self.qform_code.to_le_bytes());
        put(254, &self.sform_code.to_le_bytes());
        for (i, q) in self.quatern.iter().chain(self.qoffset.iter()).enumerate() {
            put(256 + 4 * i, &q.to_le_bytes());
        }
        for (row, values) in self.srow.iter().enumerate() {
            for (col, v) in values.iter().enumerate() {
                put(280 + 16 * row + 4 * col, &v.to_le_bytes());
            }
        }
        put(344, &MAGIC);
        bytes
    }
}
