use imageproc::filter::laplacian_filter;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use log::debug;
use ndarray::Array2;

use crate::{
    analysis::{ArtifactDetector, ArtifactScore},
    error::Result,
    image_utils::{self, ImageField},
};

/// Laplacian-variance focus statistics. Both unusually flat and unusually
/// sharp images are flagged; the in-between band scores zero.
pub struct EdgeStatsAnalyzer {
    flat_ref: f64,
    sharp_ref: f64,
}

impl EdgeStatsAnalyzer {
    pub fn new() -> Self {
        Self {
            flat_ref: 60.0,
            sharp_ref: 900.0,
        }
    }

    pub fn with_references(mut self, flat_ref: f64, sharp_ref: f64) -> Self {
        self.flat_ref = flat_ref;
        self.sharp_ref = sharp_ref;
        self
    }
}

impl Default for EdgeStatsAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactDetector for EdgeStatsAnalyzer {
    fn name(&self) -> &'static str {
        "edges"
    }

    fn detect(&self, field: &ImageField) -> Result<ArtifactScore> {
        // Statistics run on the 8-bit luma so the reference constants stay
        // in 0-255 units.
        let gray8 = image_utils::luma_to_gray8(&field.luma);

        let lap = laplacian_filter(&gray8);
        let count = (lap.width() * lap.height()) as f64;
        let mean = lap.pixels().map(|p| p[0] as f64).sum::<f64>() / count;
        let lap_var = lap
            .pixels()
            .map(|p| {
                let d = p[0] as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / count;

        let gx = horizontal_sobel(&gray8);
        let gy = vertical_sobel(&gray8);
        let (height, width) = field.luma.dim();
        let mag = Array2::from_shape_fn((height, width), |(y, x)| {
            let h = gx.get_pixel(x as u32, y as u32)[0] as f64;
            let v = gy.get_pixel(x as u32, y as u32)[0] as f64;
            (h * h + v * v).sqrt() as f32
        });

        let low = ((self.flat_ref - lap_var) / self.flat_ref).clamp(0.0, 1.0);
        let high = ((lap_var - self.sharp_ref) / self.sharp_ref).clamp(0.0, 1.0);
        let score = 0.5 * low + 0.5 * high;

        debug!("edges: lap_var={lap_var:.1} score={score:.3}");

        Ok(ArtifactScore::new(score)
            .with_metric("lap_var", lap_var)
            .with_heat(image_utils::normalize01(&mag)))
    }
}
