use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub const INPUT_SUFFIX: &str = "SynthSegInput.nii.gz";
pub const SEGMENTATION_SUFFIX: &str = "SynthSeg.nii.gz";
pub const POSTERIORS_SUFFIX: &str = "Posteriors.nii.gz";
pub const QC_SUFFIX: &str = "QC.csv";
pub const VOLUMES_SUFFIX: &str = "Volumes.csv";
pub const ANTSCT_SUFFIX: &str = "SynthSegToAntsCT.nii.gz";
pub const ANTSCT_POSTERIORS_STEM: &str = "AntsctPosteriors";

/// Output file names derived from an output prefix. Suffixes are appended to the prefix
/// verbatim, so `out/sub01_` yields `out/sub01_SynthSeg.nii.gz`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    prefix: PathBuf,
}

impl OutputPaths {
    pub fn new<P: AsRef<Path>>(prefix: P) -> Self {
        OutputPaths {
            prefix: prefix.as_ref().to_path_buf(),
        }
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut path: OsString = self.prefix.clone().into_os_string();
        path.push(suffix);
        PathBuf::from(path)
    }

    /// Resampled (and cropped) image handed to the segmentation model
    pub fn input(&self) -> PathBuf {
        self.with_suffix(INPUT_SUFFIX)
    }

    /// Label image, in the space of [`OutputPaths::input`]
    pub fn segmentation(&self) -> PathBuf {
        self.with_suffix(SEGMENTATION_SUFFIX)
    }

    pub fn posteriors(&self) -> PathBuf {
        self.with_suffix(POSTERIORS_SUFFIX)
    }

    pub fn qc(&self) -> PathBuf {
        self.with_suffix(QC_SUFFIX)
    }

    pub fn volumes(&self) -> PathBuf {
        self.with_suffix(VOLUMES_SUFFIX)
    }

    pub fn antsct(&self) -> PathBuf {
        self.with_suffix(ANTSCT_SUFFIX)
    }

    /// Probability map of AntsCT tissue class `class`, numbered from 1
    pub fn antsct_posterior(&self, class: usize) -> PathBuf {
        self.with_suffix(&format!("{ANTSCT_POSTERIORS_STEM}{class}.nii.gz"))
    }

    /// Directory holding every output, created on demand. A prefix ending in a separator
    /// names the directory itself.
    pub fn directory(&self) -> Option<&Path> {
        let is_directory = self
            .prefix
            .as_os_str()
            .to_string_lossy()
            .ends_with(std::path::is_separator);
        if is_directory {
            return Some(&self.prefix);
        }
        self.prefix
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
    }

    pub fn create_directory(&self) -> std::io::Result<()> {
        match self.directory() {
            Some(dir) if !dir.is_dir() => std::fs::create_dir_all(dir),
            _ => Ok(()),
        }
    }
}
