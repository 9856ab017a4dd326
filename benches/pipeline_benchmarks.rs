use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use cutout::{
    composite, encode_png, matting_cutout, naive_cutout, ImagePreprocessor, MaskPostprocessor,
    MattingParams, ModelKind, RawMaskTensor, SegmentationMask,
};
use image::{DynamicImage, ImageBuffer, Rgb};
use ndarray::Array4;

/// Deterministic photo-like input: gradient with a bright centred subject
fn test_image(width: u32, height: u32) -> DynamicImage {
    let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);
    let radius = width.min(height) as f32 / 3.0;
    DynamicImage::ImageRgb8(ImageBuffer::from_fn(width, height, |x, y| {
        let d = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
        if d < radius {
            Rgb([230, 180, 140])
        } else {
            Rgb([(x % 256) as u8, (y % 256) as u8, 60])
        }
    }))
}

/// Soft disc in a `[1, 1, size, size]` tensor, shaped like a segmentation output
fn raw_output(size: usize) -> RawMaskTensor {
    let centre = size as f32 / 2.0;
    let radius = size as f32 / 3.0;
    let grid = Array4::from_shape_fn((1, 1, size, size), |(_, _, y, x)| {
        let d = ((x as f32 - centre).powi(2) + (y as f32 - centre).powi(2)).sqrt();
        ((radius - d) / radius * 4.0).clamp(-1.0, 1.0)
    });
    RawMaskTensor::try_from(grid.into_dyn()).unwrap()
}

fn mask_for(width: u32, height: u32) -> SegmentationMask {
    MaskPostprocessor::postprocess(&raw_output(320), width, height, false).unwrap()
}

fn benchmark_preprocessing(c: &mut Criterion) {
    let mut group = c.benchmark_group("preprocessing");
    let image = test_image(1920, 1080);

    for kind in ModelKind::ALL {
        let config = &kind.descriptor().preprocessing;
        group.bench_with_input(BenchmarkId::from_parameter(kind), &image, |b, image| {
            b.iter(|| ImagePreprocessor::preprocess(black_box(image), config).unwrap());
        });
    }

    group.finish();
}

fn benchmark_postprocessing(c: &mut Criterion) {
    let mut group = c.benchmark_group("postprocessing");
    let raw = raw_output(1024);

    for smooth in [false, true] {
        let label = if smooth { "1920x1080_smoothed" } else { "1920x1080" };
        group.bench_function(label, |b| {
            b.iter(|| MaskPostprocessor::postprocess(black_box(&raw), 1920, 1080, smooth).unwrap());
        });
    }

    group.finish();
}

fn benchmark_compositing(c: &mut Criterion) {
    let mut group = c.benchmark_group("compositing");
    let image = test_image(1920, 1080);
    let rgb = image.to_rgb8();
    let rgba = image.to_rgba8();
    let mask = mask_for(1920, 1080);

    group.bench_function("composite", |b| {
        b.iter(|| composite(black_box(&rgb), black_box(&mask)).unwrap());
    });
    group.bench_function("naive_cutout", |b| {
        b.iter(|| naive_cutout(black_box(&rgba), black_box(&mask)).unwrap());
    });
    group.bench_function("composite_and_encode", |b| {
        b.iter(|| encode_png(composite(black_box(&rgb), black_box(&mask)).unwrap()).unwrap());
    });

    group.finish();
}

fn benchmark_matting(c: &mut Criterion) {
    let mut group = c.benchmark_group("alpha_matting");
    group.sample_size(20);
    let params = MattingParams::default();

    for (width, height) in [(640, 480), (1920, 1080)] {
        let rgb = test_image(width, height).to_rgb8();
        let mask = mask_for(width, height);
        group.bench_function(format!("{width}x{height}"), |b| {
            b.iter(|| matting_cutout(black_box(&rgb), black_box(&mask), &params).unwrap());
        });
    }

    group.finish();
}

criterion_group!(
    pipeline_benches,
    benchmark_preprocessing,
    benchmark_postprocessing,
    benchmark_compositing,
    benchmark_matting
);
criterion_main!(pipeline_benches);
