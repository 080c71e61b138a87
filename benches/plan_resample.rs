use criterion::{
    black_box, measurement::Measurement, BenchmarkGroup, BenchmarkId, Criterion, Throughput,
};
use ndarray::{s, Array3};
use synthseg_preprocessing::{
    CropPlan, CropRequest, Direction, Interpolation, Resample, Transform, Volume,
};

const IMAGE_SIZE: usize = 96;
const CROP_SIZE: [usize; 3] = [64, 64, 64];

fn synthetic_image(size: usize) -> Volume {
    let data = Array3::from_shape_fn((size, size, size), |(i, j, k)| ((i + 2 * j + 3 * k) % 97) as f32);
    Volume::new(data, [0.0; 3], [1.0, 1.0, 1.2], Direction::identity()).unwrap()
}

fn synthetic_mask(image: &Volume, margin: usize) -> Volume {
    let [nx, ny, nz] = image.size();
    let mut data = Array3::<f32>::zeros((nx, ny, nz));
    data.slice_mut(s![margin..nx - margin, margin..ny - margin, margin..nz - margin])
        .fill(1.0);
    Volume::from_grid(data, *image.grid()).unwrap()
}

struct BenchDef {
    image: Volume,
    mask: Volume,
    id: &'static str,
    sample_size: usize,
}

impl BenchDef {
    fn new(id: &'static str, sample_size: usize, margin: usize) -> Self {
        let image = synthetic_image(IMAGE_SIZE);
        let mask = synthetic_mask(&image, margin);
        Self {
            image,
            mask,
            id,
            sample_size,
        }
    }

    fn bench_plan<M: Measurement>(&self, group: &mut BenchmarkGroup<M>) {
        let request = CropRequest::new(CROP_SIZE, 4).unwrap();
        group
            .sample_size(self.sample_size)
            .throughput(Throughput::Elements(self.mask.data().len() as u64))
            .bench_with_input(
                BenchmarkId::new(format!("plan-{}", self.id), IMAGE_SIZE),
                &(&self.image, &self.mask),
                |b, (image, mask)| {
                    b.iter(|| CropPlan::new(black_box(*image), Some(black_box(*mask)), &request))
                },
            );
    }

    fn bench_resample<M: Measurement>(
        &self,
        group: &mut BenchmarkGroup<M>,
        interpolation: Interpolation,
    ) {
        let request = CropRequest::new(CROP_SIZE, 4).unwrap();
        let plan = CropPlan::new(&self.image, Some(&self.mask), &request).unwrap();
        let resample = Resample::new(plan.grid, interpolation);
        group
            .sample_size(self.sample_size)
            .throughput(Throughput::Elements(plan.grid.num_voxels() as u64))
            .bench_with_input(
                BenchmarkId::new(format!("resample-{}-{}", self.id, interpolation), IMAGE_SIZE),
                &self.image,
                |b, image| b.iter(|| resample.apply(black_box(image))),
            );
    }
}

fn main() {
    let mut c = Criterion::default().configure_from_args();
    let mut group = c.benchmark_group("plan-resample");
    // Mask fits the requested crop
    let fitting = BenchDef::new("fitting", 50, 28);
    fitting.bench_plan(&mut group);
    // Mask needs an enlarged crop
    let enlarged = BenchDef::new("enlarged", 20, 4);
    enlarged.bench_plan(&mut group);

    for interpolation in [
        Interpolation::Nearest,
        Interpolation::Linear,
        Interpolation::BSpline,
    ] {
        fitting.bench_resample(&mut group, interpolation);
    }
    enlarged.bench_resample(&mut group, Interpolation::BSpline);
    group.finish();
}
