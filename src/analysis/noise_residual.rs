use imageproc::filter::median_filter;
use log::debug;
use ndarray::Array2;

use crate::{
    analysis::{ArtifactDetector, ArtifactScore, ramp},
    error::Result,
    image_utils::{self, ImageField},
};

/// Denoise-and-subtract residual statistics. Camera sensor noise is mostly
/// spatially uncorrelated; generated images tend to leave either a
/// structured residual or almost none at all.
pub struct NoiseResidualAnalyzer {
    denoise_radius: u32,
    corr_lo: f64,
    corr_hi: f64,
    smooth_lo: f64,
    smooth_hi: f64,
}

impl NoiseResidualAnalyzer {
    pub fn new() -> Self {
        Self {
            denoise_radius: 1,
            corr_lo: 0.10,
            corr_hi: 0.45,
            smooth_lo: 0.003,
            smooth_hi: 0.010,
        }
    }

    pub fn with_denoise_radius(mut self, radius: u32) -> Self {
        self.denoise_radius = radius;
        self
    }

    pub fn with_corr_window(mut self, lo: f64, hi: f64) -> Self {
        self.corr_lo = lo;
        self.corr_hi = hi;
        self
    }

    pub fn with_smooth_window(mut self, lo: f64, hi: f64) -> Self {
        self.smooth_lo = lo;
        self.smooth_hi = hi;
        self
    }

    /// Pearson correlation between the field and itself shifted one pixel
    /// horizontally. Zero-variance or near-empty fields read as 0.
    fn shifted_correlation(mag: &Array2<f32>) -> f64 {
        let (height, width) = mag.dim();
        if width < 2 {
            return 0.0;
        }
        let n = (height * (width - 1)) as f64;
        if n <= 10.0 {
            return 0.0;
        }

        let mut mean_a = 0.0;
        let mut mean_b = 0.0;
        for y in 0..height {
            for x in 0..width - 1 {
                mean_a += mag[[y, x]] as f64;
                mean_b += mag[[y, x + 1]] as f64;
            }
        }
        mean_a /= n;
        mean_b /= n;

        let mut cov = 0.0;
        let mut var_a = 0.0;
        let mut var_b = 0.0;
        for y in 0..height {
            for x in 0..width - 1 {
                let da = mag[[y, x]] as f64 - mean_a;
                let db = mag[[y, x + 1]] as f64 - mean_b;
                cov += da * db;
                var_a += da * da;
                var_b += db * db;
            }
        }

        let denom = (var_a * var_b).sqrt();
        if denom < 1e-12 {
            0.0
        } else {
            (cov / denom).clamp(-1.0, 1.0)
        }
    }
}

impl Default for NoiseResidualAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactDetector for NoiseResidualAnalyzer {
    fn name(&self) -> &'static str {
        "noise"
    }

    fn detect(&self, field: &ImageField) -> Result<ArtifactScore> {
        // The denoiser runs on the 8-bit image; the residual is taken in
        // float space against the normalized original.
        let rgb8 = image_utils::float01_to_rgb8(&field.rgb);
        let denoised8 = median_filter(&rgb8, self.denoise_radius, self.denoise_radius);
        let denoised = image_utils::rgb_to_float01(&denoised8);

        let (height, width, _) = field.rgb.dim();
        let mut mag = Array2::<f32>::zeros((height, width));
        for y in 0..height {
            for x in 0..width {
                let mut sum = 0.0f32;
                for c in 0..3 {
                    sum += (field.rgb[[y, x, c]] - denoised[[y, x, c]]).abs();
                }
                mag[[y, x]] = sum / 3.0;
            }
        }

        let count = (height * width) as f64;
        let mean = mag.iter().map(|&v| v as f64).sum::<f64>() / count;
        let var = mag
            .iter()
            .map(|&v| {
                let d = v as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / count;
        let std = var.sqrt();

        let corr = Self::shifted_correlation(&mag);

        let corr_score = ramp(corr, self.corr_lo, self.corr_hi);
        let smooth_score = ((self.smooth_hi - mean) / (self.smooth_hi - self.smooth_lo)).clamp(0.0, 1.0);
        let score = 0.6 * corr_score + 0.4 * smooth_score;

        debug!("noise: mean={mean:.5} std={std:.5} corr@1px={corr:.3} score={score:.3}");

        Ok(ArtifactScore::new(score)
            .with_metric("resid_mean", mean)
            .with_metric("resid_std", std)
            .with_metric("resid_corr_1px", corr)
            .with_heat(image_utils::normalize01(&mag)))
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};
    use rand::{Rng, SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn flat_image_reads_as_oversmooth() {
        let image = RgbImage::from_pixel(32, 32, Rgb([120, 120, 120]));
        let result = NoiseResidualAnalyzer::new()
            .detect(&ImageField::from_rgb8(&image))
            .unwrap();

        // Zero residual: no structure (corr term 0) but fully "over-smooth"
        // (smooth term saturates), so the score lands at the 0.4 weight.
        assert!((result.score - 0.4).abs() < 1e-9);
        assert_eq!(result.metric("resid_mean"), 0.0);
        assert_eq!(result.metric("resid_corr_1px"), 0.0);
        assert!(result.heat.as_ref().unwrap().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn heavy_sensor_noise_scores_low() {
        let mut rng = StdRng::seed_from_u64(11);
        let image = RgbImage::from_fn(64, 64, |_, _| {
            Rgb([rng.r#gen::<u8>(), rng.r#gen::<u8>(), rng.r#gen::<u8>()])
        });
        let result = NoiseResidualAnalyzer::new()
            .detect(&ImageField::from_rgb8(&image))
            .unwrap();

        // Large, uncorrelated residual: neither ramp should fire.
        assert!(result.score < 0.2, "score={}", result.score);
        assert!(result.metric("resid_mean") > 0.010);
    }

    #[test]
    fn smooth_gradient_triggers_smooth_term_only() {
        let image = RgbImage::from_fn(64, 64, |x, _| {
            let v = (x * 255 / 63) as u8;
            Rgb([v, v, v])
        });
        let result = NoiseResidualAnalyzer::new()
            .detect(&ImageField::from_rgb8(&image))
            .unwrap();

        assert!(result.metric("resid_mean") < 0.003);
        assert!((0.0..=0.5).contains(&result.score));
        assert!(result.score >= 0.4 - 1e-9);
    }

    #[test]
    fn correlation_guard_handles_tiny_fields() {
        let mag = Array2::from_elem((2, 3), 0.5f32);
        assert_eq!(NoiseResidualAnalyzer::shifted_correlation(&mag), 0.0);
    }

    #[test]
    fn score_always_in_unit_range() {
        let analyzer = NoiseResidualAnalyzer::new()
            .with_corr_window(-1.0, -0.5)
            .with_smooth_window(0.0, 1e-9);
        let image = RgbImage::from_pixel(16, 16, Rgb([7, 200, 33]));
        let result = analyzer.detect(&ImageField::from_rgb8(&image)).unwrap();

        assert!((0.0..=1.0).contains(&result.score));
    }
}
