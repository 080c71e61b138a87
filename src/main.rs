use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::Parser;
use snafu::{Report, ResultExt, Snafu, Whatever};
use tracing::{error, Level};

use synthseg_preprocessing::errors::{GeometryError, NiftiError};
use synthseg_preprocessing::load::load_volumes;
use synthseg_preprocessing::predict::{
    Invocation, Predict, PredictError, PredictorOptions, SynthSeg, DEFAULT_PYTHON,
    DEFAULT_SYNTHSEG_SCRIPT,
};
use synthseg_preprocessing::preprocess::{PreprocessError, Preprocessor};
use synthseg_preprocessing::transform::{
    antsct_posteriors, CropRequest, Interpolation, LabelMap, Transform, DEFAULT_PAD_VOXELS,
};
use synthseg_preprocessing::{load_volume, NiftiSaver, OutputPaths};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Invalid crop configuration: {}", source))]
    InvalidCrop {
        #[snafu(source(from(GeometryError, Box::new)))]
        source: Box<GeometryError>,
    },

    #[snafu(display("Failed to create directory for output prefix: {}", path.display()))]
    CreateDir {
        path: PathBuf,
        #[snafu(source(from(std::io::Error, Box::new)))]
        source: Box<std::io::Error>,
    },

    #[snafu(display("Failed to read {}: {}", path.display(), source))]
    Load {
        path: PathBuf,
        #[snafu(source(from(NiftiError, Box::new)))]
        source: Box<NiftiError>,
    },

    #[snafu(display("Failed to preprocess {}: {}", path.display(), source))]
    Preprocess {
        path: PathBuf,
        #[snafu(source(from(PreprocessError, Box::new)))]
        source: Box<PreprocessError>,
    },

    #[snafu(display("Failed to write {}: {}", path.display(), source))]
    Save {
        path: PathBuf,
        #[snafu(source(from(NiftiError, Box::new)))]
        source: Box<NiftiError>,
    },

    #[snafu(display("Failed to convert posteriors in {}: {}", path.display(), source))]
    Posteriors {
        path: PathBuf,
        #[snafu(source(from(GeometryError, Box::new)))]
        source: Box<GeometryError>,
    },

    #[snafu(display("Segmentation of {} failed: {}", path.display(), source))]
    Segment {
        path: PathBuf,
        #[snafu(source(from(PredictError, Box::new)))]
        source: Box<PredictError>,
    },
}

#[derive(Parser, Debug)]
#[command(version = env!("CARGO_PKG_VERSION"), about = "Crop and resample a structural MRI for SynthSeg, then run the segmentation", long_about = None)]
struct Args {
    #[arg(help = "Input structural image (NIfTI)", long = "input", short = 'i')]
    input: PathBuf,

    #[arg(
        help = "Output prefix. Output file names are formed by appending suffixes to it",
        long = "output",
        short = 'o'
    )]
    output: PathBuf,

    #[arg(help = "Brain mask about which to crop", long = "mask", short = 'm')]
    mask: Option<PathBuf>,

    #[arg(
        help = "Padding around the mask bounding box, in voxels of the mask",
        long = "mask-pad",
        default_value_t = DEFAULT_PAD_VOXELS
    )]
    mask_pad: u32,

    #[arg(
        help = "Crop size (x,y,z), each a multiple of 32",
        long = "crop",
        short = 'c',
        default_value = "192,256,192",
        value_parser = clap::builder::ValueParser::new(|s: &str| {
            let parts: Vec<&str> = s.split(',').collect();
            if parts.len() == 3 {
                let mut size = [0usize; 3];
                for (value, part) in size.iter_mut().zip(parts) {
                    *value = part.trim().parse::<usize>().map_err(|_| clap::Error::raw(ErrorKind::InvalidValue, "Invalid crop dimension"))?;
                }
                Ok(size)
            } else {
                Err(clap::Error::raw(ErrorKind::InvalidValue, "Crop must be in the format x,y,z"))
            }
        })
    )]
    crop: [usize; 3],

    #[arg(
        help = "Interpolation used when resampling the input",
        long = "interpolation",
        value_parser = clap::value_parser!(Interpolation),
        default_value_t = Interpolation::default(),
    )]
    interpolation: Interpolation,

    #[arg(help = "Run the segmentation on the CPU", long = "cpu", default_value_t = false)]
    cpu: bool,

    #[arg(help = "Write posterior probabilities", long = "post", default_value_t = false)]
    post: bool,

    #[arg(help = "Write QC measures", long = "qc", default_value_t = false)]
    qc: bool,

    #[arg(help = "Write label volumes", long = "vol", default_value_t = false)]
    vol: bool,

    #[arg(help = "Perform cortical parcellation", long = "parc", default_value_t = false)]
    parc: bool,

    #[arg(
        help = "Use the robust model, for low resolution or clinical data",
        long = "robust",
        default_value_t = false
    )]
    robust: bool,

    #[arg(
        help = "Also write the segmentation and posteriors mapped to AntsCT tissue classes (implies --post)",
        long = "antsct",
        default_value_t = false
    )]
    antsct: bool,

    #[arg(
        help = "Python interpreter used to run SynthSeg",
        long = "python",
        default_value = DEFAULT_PYTHON
    )]
    python: PathBuf,

    #[arg(
        help = "SynthSeg prediction script",
        long = "synthseg-script",
        default_value = DEFAULT_SYNTHSEG_SCRIPT
    )]
    synthseg_script: PathBuf,

    #[arg(help = "Verbose logging", long = "verbose", short = 'v', default_value_t = false)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::ERROR
    };
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(level)
            .finish(),
    )
    .whatever_context("Could not set up global logging subscriber")
    .unwrap_or_else(|e: Whatever| {
        eprintln!("[ERROR] {}", Report::from_error(e));
    });

    run(args).unwrap_or_else(|e| {
        error!("{}", Report::from_error(e));
        std::process::exit(-1);
    });
}

fn run(args: Args) -> Result<(), Error> {
    // Validate the configuration before touching any file
    let request = CropRequest::new(args.crop, args.mask_pad).context(InvalidCropSnafu)?;
    let preprocessor = Preprocessor {
        request,
        interpolation: args.interpolation,
        force_cpu: args.cpu,
    };
    let synthseg = SynthSeg {
        python: args.python,
        script: args.synthseg_script,
        options: PredictorOptions {
            post: args.post || args.antsct,
            qc: args.qc,
            vol: args.vol,
            parc: args.parc,
            robust: args.robust,
        },
    };

    let paths = OutputPaths::new(&args.output);
    paths.create_directory().context(CreateDirSnafu {
        path: args.output.clone(),
    })?;

    let image = load_volume(&args.input).context(LoadSnafu { path: &args.input })?;
    let mask = args
        .mask
        .as_ref()
        .map(|path| load_volume(path).context(LoadSnafu { path }))
        .transpose()?;

    let (prepared, metadata) = preprocessor
        .prepare_volume(&image, mask.as_ref())
        .context(PreprocessSnafu { path: &args.input })?;
    let input_path = paths.input();
    NiftiSaver::image()
        .save(&input_path, &prepared)
        .context(SaveSnafu { path: &input_path })?;

    let invocation = Invocation {
        paths: paths.clone(),
        crop: metadata.crop_size(),
        device: metadata.device,
    };
    synthseg
        .predict(&invocation)
        .context(SegmentSnafu { path: &input_path })?;

    if args.antsct {
        let segmentation_path = paths.segmentation();
        let segmentation = load_volume(&segmentation_path).context(LoadSnafu {
            path: &segmentation_path,
        })?;
        let antsct_path = paths.antsct();
        NiftiSaver::labels()
            .save(&antsct_path, &LabelMap::antsct().apply(&segmentation))
            .context(SaveSnafu { path: &antsct_path })?;
        tracing::info!("Wrote AntsCT labels to {}", antsct_path.display());

        let posteriors_path = paths.posteriors();
        let posteriors = load_volumes(&posteriors_path).context(LoadSnafu {
            path: &posteriors_path,
        })?;
        let classes = antsct_posteriors(&posteriors).context(PosteriorsSnafu {
            path: &posteriors_path,
        })?;
        for (index, class) in classes.iter().enumerate() {
            let class_path = paths.antsct_posterior(index + 1);
            NiftiSaver::image()
                .save(&class_path, class)
                .context(SaveSnafu { path: &class_path })?;
        }
        tracing::info!("Wrote {} AntsCT posteriors", classes.len());
    }

    Ok(())
}
