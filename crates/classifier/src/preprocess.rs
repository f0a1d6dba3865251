//! Image preprocessing pipeline
//!
//! Reproduces the training-time transform chain exactly, in this order:
//! decode, resize shorter edge, center crop, scale to [0, 1], normalize.

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageReader, ImageResult, Limits, RgbImage};
use ndarray::Array4;
use std::io::Cursor;

use crate::config::PreprocessConfig;
use crate::{PredictError, StartupError};

/// Color channels fed to the model (RGB)
pub const CHANNELS: usize = 3;

/// Allocation ceiling for decoding a single image (bytes)
const MAX_DECODE_ALLOC: u64 = 256 * 1024 * 1024;

/// Immutable preprocessing transform
#[derive(Debug, Clone)]
pub struct Preprocessor {
    resize_shorter: u32,
    crop_size: u32,
    max_resized_pixels: u64,
    mean: [f32; CHANNELS],
    std: [f32; CHANNELS],
}

impl Preprocessor {
    /// Build the transform from validated constants
    pub fn new(config: &PreprocessConfig) -> Result<Self, StartupError> {
        config.validate()?;
        Ok(Self {
            resize_shorter: config.resize_shorter,
            crop_size: config.crop_size,
            max_resized_pixels: config.max_resized_pixels,
            mean: [config.mean[0], config.mean[1], config.mean[2]],
            std: [config.std[0], config.std[1], config.std[2]],
        })
    }

    /// Model input shape: `[batch, channels, height, width]`
    pub fn input_shape(&self) -> [usize; 4] {
        let side = self.crop_size as usize;
        [1, CHANNELS, side, side]
    }

    /// Transform encoded image bytes into a normalized input tensor
    pub fn run(&self, bytes: &[u8]) -> Result<Array4<f32>, PredictError> {
        let decoded = decode_bounded(bytes)
            .map_err(|e| PredictError::preprocess(format!("Failed to decode image: {}", e)))?;
        let rgb = decoded.to_rgb8();
        if rgb.width() == 0 || rgb.height() == 0 {
            return Err(PredictError::preprocess("Image has no pixels"));
        }

        let resized = self.resize(rgb)?;
        let cropped = self.center_crop(&resized)?;
        Ok(self.to_tensor(&cropped))
    }

    fn resize(&self, img: RgbImage) -> Result<RgbImage, PredictError> {
        let (width, height) = img.dimensions();
        let too_large = || {
            PredictError::preprocess(format!(
                "Image {}x{} is too elongated to resize within {} pixels",
                width, height, self.max_resized_pixels
            ))
        };

        let (new_width, new_height) =
            shorter_edge_dimensions(width, height, self.resize_shorter).ok_or_else(too_large)?;
        if u64::from(new_width) * u64::from(new_height) > self.max_resized_pixels {
            return Err(too_large());
        }

        if (new_width, new_height) == (width, height) {
            return Ok(img);
        }
        Ok(imageops::resize(&img, new_width, new_height, FilterType::Triangle))
    }

    fn center_crop(&self, img: &RgbImage) -> Result<RgbImage, PredictError> {
        let (width, height) = img.dimensions();
        let side = self.crop_size;
        if width < side || height < side {
            return Err(PredictError::preprocess(format!(
                "Image {}x{} is smaller than crop {}x{}",
                width, height, side, side
            )));
        }

        let left = crop_offset(width, side);
        let top = crop_offset(height, side);
        Ok(imageops::crop_imm(img, left, top, side, side).to_image())
    }

    fn to_tensor(&self, img: &RgbImage) -> Array4<f32> {
        let side = self.crop_size as usize;
        let mut tensor = Array4::<f32>::zeros((1, CHANNELS, side, side));
        for (x, y, pixel) in img.enumerate_pixels() {
            for channel in 0..CHANNELS {
                let scaled = f32::from(pixel[channel]) / 255.0;
                tensor[[0, channel, y as usize, x as usize]] =
                    (scaled - self.mean[channel]) / self.std[channel];
            }
        }
        tensor
    }
}

/// Decode with an allocation limit; oversized images fail instead of
/// exhausting memory
fn decode_bounded(bytes: &[u8]) -> ImageResult<DynamicImage> {
    let mut limits = Limits::default();
    limits.max_alloc = Some(MAX_DECODE_ALLOC);

    let mut reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    reader.limits(limits);
    reader.decode()
}

/// Dimensions after scaling the shorter edge to `target`, keeping aspect ratio.
///
/// `None` when the scaled long edge does not fit in `u32`.
fn shorter_edge_dimensions(width: u32, height: u32, target: u32) -> Option<(u32, u32)> {
    let scale_long = |long: u32, short: u32| {
        let scaled = (u64::from(target) * u64::from(long)) / u64::from(short);
        u32::try_from(scaled.max(1)).ok()
    };
    if width <= height {
        Some((target, scale_long(height, width)?))
    } else {
        Some((scale_long(width, height)?, target))
    }
}

/// Leading offset of a centered crop; half-pixel ties round to even
fn crop_offset(dim: u32, side: u32) -> u32 {
    let diff = dim - side;
    let half = diff / 2;
    if diff % 2 == 1 && half % 2 == 1 {
        half + 1
    } else {
        half
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};

    fn encode_png(img: &RgbImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn preprocessor() -> Preprocessor {
        Preprocessor::new(&PreprocessConfig::default()).unwrap()
    }

    #[test]
    fn test_shorter_edge_dimensions() {
        assert_eq!(shorter_edge_dimensions(640, 480, 256), Some((341, 256)));
        assert_eq!(shorter_edge_dimensions(480, 640, 256), Some((256, 341)));
        assert_eq!(shorter_edge_dimensions(300, 300, 256), Some((256, 256)));
        assert_eq!(shorter_edge_dimensions(256, 1000, 256), Some((256, 1000)));
    }

    #[test]
    fn test_long_edge_overflow_is_none() {
        // 256 * 20_000_000 does not fit in u32
        assert_eq!(shorter_edge_dimensions(1, 20_000_000, 256), None);
        assert_eq!(shorter_edge_dimensions(20_000_000, 1, 256), None);
    }

    #[test]
    fn test_elongated_image_rejected_before_resize() {
        // Resizing would need 256 x 12_800_000 pixels
        let img = RgbImage::from_pixel(1, 50_000, Rgb([90, 90, 90]));
        let err = preprocessor().run(&encode_png(&img)).unwrap_err();
        assert_eq!(err.kind, crate::ErrorKind::PreprocessFailure);
        assert!(err.message.contains("1x50000"), "{}", err.message);

        // 40:1 still fits the default budget
        let img = RgbImage::from_pixel(10, 400, Rgb([90, 90, 90]));
        let tensor = preprocessor().run(&encode_png(&img)).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
    }

    #[test]
    fn test_crop_offset_rounds_half_to_even() {
        assert_eq!(crop_offset(256, 224), 16);
        assert_eq!(crop_offset(257, 224), 16); // 16.5
        assert_eq!(crop_offset(259, 224), 18); // 17.5
        assert_eq!(crop_offset(224, 224), 0);
    }

    #[test]
    fn test_output_shape_is_fixed() {
        let pre = preprocessor();
        for (w, h) in [(640, 480), (100, 700), (224, 224), (31, 17)] {
            let img = RgbImage::from_pixel(w, h, Rgb([10, 20, 30]));
            let tensor = pre.run(&encode_png(&img)).unwrap();
            assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
        }
    }

    #[test]
    fn test_uniform_image_normalization() {
        let img = RgbImage::from_pixel(300, 400, Rgb([255, 128, 0]));
        let tensor = preprocessor().run(&encode_png(&img)).unwrap();

        let expected = [
            (1.0 - 0.5773) / 0.2559,
            (128.0 / 255.0 - 0.4623) / 0.2411,
            (0.0 - 0.3385) / 0.2455,
        ];
        for (channel, value) in expected.iter().enumerate() {
            // one intensity level of slack for resampling rounding
            let got = tensor[[0, channel, 112, 112]];
            assert!((got - value).abs() < 0.02, "channel {}: {} vs {}", channel, got, value);
        }
    }

    #[test]
    fn test_center_crop_keeps_center() {
        // 256x512: resize is a no-op, crop takes rows 144..368
        let mut img = RgbImage::from_pixel(256, 512, Rgb([0, 0, 0]));
        for y in 144..368 {
            for x in 16..240 {
                img.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        let tensor = preprocessor().run(&encode_png(&img)).unwrap();
        let white = (1.0 - 0.5773) / 0.2559;
        assert!((tensor[[0, 0, 0, 0]] - white).abs() < 1e-4);
        assert!((tensor[[0, 0, 223, 223]] - white).abs() < 1e-4);
    }

    #[test]
    fn test_deterministic() {
        let mut img = RgbImage::new(320, 240);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8]);
        }
        let bytes = encode_png(&img);
        let pre = preprocessor();
        assert_eq!(pre.run(&bytes).unwrap(), pre.run(&bytes).unwrap());
    }

    #[test]
    fn test_corrupt_bytes() {
        let err = preprocessor().run(&[0x41]).unwrap_err();
        assert_eq!(err.kind, crate::ErrorKind::PreprocessFailure);
        assert_eq!(err.stage, crate::Stage::Preprocess);
    }

    #[test]
    fn test_grayscale_input_expanded_to_rgb() {
        let gray = image::GrayImage::from_pixel(50, 50, image::Luma([200]));
        let mut buf = Cursor::new(Vec::new());
        gray.write_to(&mut buf, ImageFormat::Png).unwrap();
        let tensor = preprocessor().run(buf.get_ref()).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
    }
}
