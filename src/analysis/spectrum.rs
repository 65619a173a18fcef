use log::debug;
use ndarray::Array2;
use num_complex::Complex;
use rustfft::FftPlanner;

use crate::{
    analysis::{ArtifactDetector, ArtifactScore, ramp},
    error::Result,
    image_utils::ImageField,
};

/// Fits the radially averaged log-magnitude spectrum against the power-law
/// falloff of natural images. The residual of that fit, not the slope, is
/// what gets scored.
pub struct SpectrumAnalyzer {
    resid_lo: f64,
    resid_hi: f64,
}

impl SpectrumAnalyzer {
    pub fn new() -> Self {
        Self {
            resid_lo: 0.12,
            resid_hi: 0.30,
        }
    }

    pub fn with_residual_window(mut self, lo: f64, hi: f64) -> Self {
        self.resid_lo = lo;
        self.resid_hi = hi;
        self
    }

    fn hann(n: usize) -> Vec<f64> {
        if n < 2 {
            return vec![1.0; n];
        }
        (0..n)
            .map(|i| 0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / (n - 1) as f64).cos()))
            .collect()
    }

    fn log_magnitude(luma: &Array2<f32>) -> Array2<f64> {
        let (height, width) = luma.dim();
        let win_y = Self::hann(height);
        let win_x = Self::hann(width);

        let mut buffer: Vec<Complex<f64>> = Vec::with_capacity(height * width);
        for y in 0..height {
            for x in 0..width {
                buffer.push(Complex::new(luma[[y, x]] as f64 * win_y[y] * win_x[x], 0.0));
            }
        }

        let mut planner = FftPlanner::new();
        planner.plan_fft_forward(width).process(&mut buffer);

        let mut transposed: Vec<Complex<f64>> = vec![Complex::new(0.0, 0.0); height * width];
        for y in 0..height {
            for x in 0..width {
                transposed[x * height + y] = buffer[y * width + x];
            }
        }
        planner.plan_fft_forward(height).process(&mut transposed);

        Array2::from_shape_fn((height, width), |(y, x)| {
            (1.0 + transposed[x * height + y].norm()).ln()
        })
    }

    /// Mean log-magnitude per integer frequency radius, DC bin excluded.
    /// Radii beyond `min(h, w) / 2` collapse into the outermost bin.
    fn radial_profile(mag: &Array2<f64>) -> (Vec<f64>, Vec<f64>) {
        let (height, width) = mag.dim();
        let r_max = (height / 2).min(width / 2);
        let mut sums = vec![0.0f64; r_max + 1];
        let mut counts = vec![0u32; r_max + 1];

        for y in 0..height {
            for x in 0..width {
                let dy = y.min(height - y) as f64;
                let dx = x.min(width - x) as f64;
                let r = ((dy * dy + dx * dx).sqrt().round() as usize).min(r_max);
                sums[r] += mag[[y, x]];
                counts[r] += 1;
            }
        }

        let mut radii = Vec::with_capacity(r_max);
        let mut profile = Vec::with_capacity(r_max);
        for r in 1..=r_max {
            if counts[r] > 0 {
                radii.push(r as f64);
                profile.push(sums[r] / counts[r] as f64);
            }
        }

        (radii, profile)
    }

    fn fit_log_log(radii: &[f64], profile: &[f64]) -> (f64, f64, f64) {
        let lx: Vec<f64> = radii.iter().map(|&r| r.max(1.0).ln()).collect();
        let ly: Vec<f64> = profile.iter().map(|&p| p.max(1e-6).ln()).collect();
        let n = lx.len() as f64;

        let mean_x = lx.iter().sum::<f64>() / n;
        let mean_y = ly.iter().sum::<f64>() / n;

        let mut sxx = 0.0;
        let mut sxy = 0.0;
        for (&x, &y) in lx.iter().zip(ly.iter()) {
            sxx += (x - mean_x) * (x - mean_x);
            sxy += (x - mean_x) * (y - mean_y);
        }

        let slope = if sxx > 1e-12 { sxy / sxx } else { 0.0 };
        let intercept = mean_y - slope * mean_x;

        let resid_var = lx
            .iter()
            .zip(ly.iter())
            .map(|(&x, &y)| {
                let resid = y - (slope * x + intercept);
                resid * resid
            })
            .sum::<f64>()
            / n;

        (slope, intercept, resid_var.sqrt())
    }
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactDetector for SpectrumAnalyzer {
    fn name(&self) -> &'static str {
        "spectrum"
    }

    fn detect(&self, field: &ImageField) -> Result<ArtifactScore> {
        let mag = Self::log_magnitude(&field.luma);
        let (radii, profile) = Self::radial_profile(&mag);

        if radii.len() < 3 {
            return Ok(ArtifactScore::new(0.0)
                .with_metric("slope", 0.0)
                .with_metric("resid_std", 0.0));
        }

        let (slope, intercept, resid_std) = Self::fit_log_log(&radii, &profile);
        let score = ramp(resid_std, self.resid_lo, self.resid_hi);

        debug!("spectrum: slope={slope:.3} resid_std={resid_std:.4} score={score:.3}");

        Ok(ArtifactScore::new(score)
            .with_metric("slope", slope)
            .with_metric("intercept", intercept)
            .with_metric("resid_std", resid_std))
    }
}
