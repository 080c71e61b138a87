use snafu::{ensure, ResultExt, Snafu};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Command, ExitStatus};

use crate::output::OutputPaths;
use crate::transform::Device;

pub const DEFAULT_PYTHON: &str = "python";
pub const DEFAULT_SYNTHSEG_SCRIPT: &str = "/opt/SynthSeg/scripts/commands/SynthSeg_predict.py";

#[derive(Debug, Snafu)]
pub enum PredictError {
    #[snafu(display("could not start {}: {}", program.display(), source))]
    Spawn {
        program: PathBuf,
        #[snafu(source(from(std::io::Error, Box::new)))]
        source: Box<std::io::Error>,
    },
    #[snafu(display("{} exited with {}", program.display(), status))]
    ExitStatus { program: PathBuf, status: ExitStatus },
}

/// Optional outputs and modes of the segmentation model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PredictorOptions {
    /// Write label posterior probabilities
    pub post: bool,
    /// Write QC measures
    pub qc: bool,
    /// Write label volumes
    pub vol: bool,
    /// Cortical parcellation
    pub parc: bool,
    /// Robust fitting for low-resolution or otherwise challenging data
    pub robust: bool,
}

/// Everything a predictor needs to segment one prepared input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub paths: OutputPaths,
    pub crop: [usize; 3],
    pub device: Device,
}

/// Runs the segmentation model on a prepared input. The call blocks until the model finishes.
pub trait Predict {
    fn predict(&self, invocation: &Invocation) -> Result<(), PredictError>;
}

/// SynthSeg run through its prediction script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthSeg {
    pub python: PathBuf,
    pub script: PathBuf,
    pub options: PredictorOptions,
}

impl Default for SynthSeg {
    fn default() -> Self {
        SynthSeg {
            python: PathBuf::from(DEFAULT_PYTHON),
            script: PathBuf::from(DEFAULT_SYNTHSEG_SCRIPT),
            options: PredictorOptions::default(),
        }
    }
}

impl SynthSeg {
    pub fn arguments(&self, invocation: &Invocation) -> Vec<OsString> {
        let paths = &invocation.paths;
        let mut args: Vec<OsString> = vec![
            "--i".into(),
            paths.input().into(),
            "--o".into(),
            paths.segmentation().into(),
            "--crop".into(),
        ];
        args.extend(invocation.crop.iter().map(|c| OsString::from(c.to_string())));

        if self.options.post {
            args.extend(["--post".into(), paths.posteriors().into()]);
        }
        if self.options.qc {
            args.extend(["--qc".into(), paths.qc().into()]);
        }
        if self.options.vol {
            args.extend(["--vol".into(), paths.volumes().into()]);
        }
        if self.options.parc {
            args.push("--parc".into());
        }
        if self.options.robust {
            args.push("--robust".into());
        }
        if invocation.device == Device::Cpu {
            args.push("--cpu".into());
        }
        args
    }
}

impl Predict for SynthSeg {
    fn predict(&self, invocation: &Invocation) -> Result<(), PredictError> {
        let args = self.arguments(invocation);
        tracing::info!(
            "Running synthseg on {} ({})",
            invocation.paths.input().display(),
            invocation.device
        );
        tracing::debug!("synthseg args: {:?}", args);

        let status = Command::new(&self.python)
            .arg(&self.script)
            .args(&args)
            .status()
            .context(SpawnSnafu {
                program: self.python.clone(),
            })?;
        ensure!(
            status.success(),
            ExitStatusSnafu {
                program: self.python.clone(),
                status,
            }
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn invocation(device: Device) -> Invocation {
        Invocation {
            paths: OutputPaths::new("out/s_"),
            crop: [192, 256, 192],
            device,
        }
    }

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.into_string().unwrap())
            .collect()
    }

    #[test]
    fn test_default_arguments() {
        let args = SynthSeg::default().arguments(&invocation(Device::Gpu));
        assert_eq!(
            strings(args),
            vec![
                "--i",
                "out/s_SynthSegInput.nii.gz",
                "--o",
                "out/s_SynthSeg.nii.gz",
                "--crop",
                "192",
                "256",
                "192",
            ]
        );
    }

    #[test]
    fn test_all_options_on_cpu() {
        let synthseg = SynthSeg {
            options: PredictorOptions {
                post: true,
                qc: true,
                vol: true,
                parc: true,
                robust: true,
            },
            ..SynthSeg::default()
        };
        let args = strings(synthseg.arguments(&invocation(Device::Cpu)));
        assert_eq!(
            args[8..],
            [
                "--post",
                "out/s_Posteriors.nii.gz",
                "--qc",
                "out/s_QC.csv",
                "--vol",
                "out/s_Volumes.csv",
                "--parc",
                "--robust",
                "--cpu",
            ]
        );
    }

    #[rstest]
    #[case(Device::Gpu, false)]
    #[case(Device::Cpu, true)]
    fn test_cpu_flag(#[case] device: Device, #[case] expected: bool) {
        let args = strings(SynthSeg::default().arguments(&invocation(device)));
        assert_eq!(args.iter().any(|a| a == "--cpu"), expected);
    }

    #[test]
    fn test_failed_command() {
        let synthseg = SynthSeg {
            python: PathBuf::from("false"),
            ..SynthSeg::default()
        };
        assert!(matches!(
            synthseg.predict(&invocation(Device::Gpu)),
            Err(PredictError::ExitStatus { .. })
        ));
    }

    #[test]
    fn test_missing_program() {
        let synthseg = SynthSeg {
            python: PathBuf::from("/nonexistent/python-for-synthseg"),
            ..SynthSeg::default()
        };
        assert!(matches!(
            synthseg.predict(&invocation(Device::Gpu)),
            Err(PredictError::Spawn { .. })
        ));
    }
}
