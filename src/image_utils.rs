use image::{DynamicImage, GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use image::imageops::{self, FilterType};
use ndarray::{Array2, Array3};

/// Normalized per-call view of one decoded image: RGB planes in [0,1]
/// plus a BT.601 luma plane. Built once, read by every analyzer.
#[derive(Debug, Clone)]
pub struct ImageField {
    pub rgb: Array3<f32>,
    pub luma: Array2<f32>,
}

impl ImageField {
    pub fn from_rgb8(image: &RgbImage) -> Self {
        let rgb = rgb_to_float01(image);
        let luma = luma_from_rgb01(&rgb);
        Self { rgb, luma }
    }

    pub fn from_dynamic(image: &DynamicImage) -> Self {
        Self::from_rgb8(&image.to_rgb8())
    }

    pub fn width(&self) -> usize {
        self.luma.ncols()
    }

    pub fn height(&self) -> usize {
        self.luma.nrows()
    }
}

pub fn rgb_to_float01(image: &RgbImage) -> Array3<f32> {
    let (width, height) = image.dimensions();
    let mut arr = Array3::zeros((height as usize, width as usize, 3));

    for (x, y, pixel) in image.enumerate_pixels() {
        for c in 0..3 {
            arr[[y as usize, x as usize, c]] = pixel[c] as f32 / 255.0;
        }
    }

    arr
}

pub fn luma_from_rgb01(rgb01: &Array3<f32>) -> Array2<f32> {
    let (height, width, _) = rgb01.dim();
    let mut luma = Array2::zeros((height, width));

    for y in 0..height {
        for x in 0..width {
            luma[[y, x]] = 0.299 * rgb01[[y, x, 0]]
                + 0.587 * rgb01[[y, x, 1]]
                + 0.114 * rgb01[[y, x, 2]];
        }
    }

    luma
}

pub fn float01_to_rgb8(rgb01: &Array3<f32>) -> RgbImage {
    let (height, width, _) = rgb01.dim();

    // Rounding keeps the u8 -> float -> u8 round trip exact.
    RgbImage::from_fn(width as u32, height as u32, |x, y| {
        let px = |c: usize| (rgb01[[y as usize, x as usize, c]].clamp(0.0, 1.0) * 255.0).round() as u8;
        Rgb([px(0), px(1), px(2)])
    })
}

pub fn luma_to_gray8(luma: &Array2<f32>) -> GrayImage {
    let (height, width) = luma.dim();

    GrayImage::from_fn(width as u32, height as u32, |x, y| {
        Luma([(luma[[y as usize, x as usize]].clamp(0.0, 1.0) * 255.0).round() as u8])
    })
}

/// Min-max normalization into [0,1]. A degenerate field (range below
/// epsilon) maps to all zeros, never to NaN.
pub fn normalize01(arr: &Array2<f32>) -> Array2<f32> {
    let min = arr.iter().cloned().fold(f32::INFINITY, f32::min);
    let max = arr.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;

    if !range.is_finite() || range < 1e-8 {
        Array2::zeros(arr.dim())
    } else {
        arr.mapv(|v| (v - min) / range)
    }
}

pub fn resize_luma(luma: &Array2<f32>, width: usize, height: usize, filter: FilterType) -> Array2<f32> {
    let (src_h, src_w) = luma.dim();
    let buffer: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_fn(src_w as u32, src_h as u32, |x, y| {
            Luma([luma[[y as usize, x as usize]]])
        });

    let resized = imageops::resize(&buffer, width as u32, height as u32, filter);

    Array2::from_shape_fn((height, width), |(y, x)| resized.get_pixel(x as u32, y as u32)[0])
}

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float01_stays_in_unit_range() {
        let image = RgbImage::from_fn(8, 8, |x, y| Rgb([(x * 32) as u8, (y * 32) as u8, 255]));
        let arr = rgb_to_float01(&image);

        assert!(arr.iter().all(|&v| (0.0..=1.0).contains(&v)));
        assert_eq!(arr[[0, 0, 2]], 1.0);
    }

    #[test]
    fn luma_uses_bt601_weights() {
        let image = RgbImage::from_pixel(4, 4, Rgb([255, 0, 0]));
        let field = ImageField::from_rgb8(&image);

        assert!((field.luma[[2, 2]] - 0.299).abs() < 1e-6);
    }

    #[test]
    fn normalize01_constant_field_is_all_zeros() {
        let arr = Array2::from_elem((16, 16), 0.5f32);
        let norm = normalize01(&arr);

        assert!(norm.iter().all(|&v| v == 0.0));
        assert!(norm.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn normalize01_spans_unit_interval() {
        let mut arr = Array2::zeros((4, 4));
        arr[[0, 0]] = -2.0;
        arr[[3, 3]] = 6.0;
        let norm = normalize01(&arr);

        assert_eq!(norm[[0, 0]], 0.0);
        assert_eq!(norm[[3, 3]], 1.0);
        assert!((norm[[1, 1]] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn resize_preserves_constant_fields() {
        let arr = Array2::from_elem((10, 20), 0.25f32);
        let resized = resize_luma(&arr, 7, 5, FilterType::Triangle);

        assert_eq!(resized.dim(), (5, 7));
        assert!(resized.iter().all(|&v| (v - 0.25).abs() < 1e-3));
    }

    #[test]
    fn sigmoid_midpoint() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
        assert!(sigmoid(10.0) > 0.999);
        assert!(sigmoid(-10.0) < 0.001);
    }
}
