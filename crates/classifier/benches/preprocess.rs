use classifier::{softmax, PreprocessConfig, Preprocessor};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

fn encoded_photo(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let mut img = RgbImage::new(width, height);
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        *pixel = Rgb([(x % 256) as u8, (y % 256) as u8, ((x ^ y) % 256) as u8]);
    }
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, format).expect("encode benchmark image");
    buf.into_inner()
}

fn bench_preprocess(c: &mut Criterion) {
    let preprocessor =
        Preprocessor::new(&PreprocessConfig::default()).expect("default preprocessing config");
    let jpeg = encoded_photo(1280, 960, ImageFormat::Jpeg);
    let png = encoded_photo(640, 480, ImageFormat::Png);

    c.bench_function("preprocess_jpeg_1280x960", |b| {
        b.iter(|| preprocessor.run(black_box(&jpeg)))
    });
    c.bench_function("preprocess_png_640x480", |b| {
        b.iter(|| preprocessor.run(black_box(&png)))
    });
}

fn bench_softmax(c: &mut Criterion) {
    let scores = [5.0, 1.0, 1.0, 1.0, 1.0, 1.0];
    c.bench_function("softmax_6", |b| b.iter(|| softmax(black_box(&scores))));
}

criterion_group!(benches, bench_preprocess, bench_softmax);
criterion_main!(benches);
