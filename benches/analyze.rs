use ai_image_forensics::{AnalysisConfig, analyze_image};
use criterion::{Criterion, criterion_group, criterion_main};
use image::{DynamicImage, Rgb, RgbImage};

fn synthetic_image(size: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(size, size, |x, y| {
        let v = ((x * 7 + y * 13) % 256) as u8;
        Rgb([v, v.wrapping_add(40), v.wrapping_add(90)])
    }))
}

fn bench_analyze(c: &mut Criterion) {
    let image = synthetic_image(256);
    let config = AnalysisConfig::default();

    c.bench_function("analyze_256", |b| {
        b.iter(|| analyze_image(&image, &config).unwrap())
    });

    let sequential = AnalysisConfig {
        parallel: false,
        ..AnalysisConfig::default()
    };
    c.bench_function("analyze_256_sequential", |b| {
        b.iter(|| analyze_image(&image, &sequential).unwrap())
    });
}

criterion_group!(benches, bench_analyze);
criterion_main!(benches);
