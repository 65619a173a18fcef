use image::{Rgb, RgbImage};
use ndarray::Array2;

use crate::image_utils;

#[derive(Debug, Clone, Copy)]
pub enum ColorScheme {
    HeatMap,
    Grayscale,
    SingleColor(Rgb<u8>),
}

#[derive(Debug, Clone)]
pub struct VisualizationConfig {
    pub color_scheme: ColorScheme,
    pub overlay_opacity: f32,
}

impl Default for VisualizationConfig {
    fn default() -> Self {
        Self {
            color_scheme: ColorScheme::HeatMap,
            overlay_opacity: 0.45,
        }
    }
}

/// Renders a [0,1] heat field as a false-color image and blends it over
/// the analyzed image to make the spatial evidence readable.
pub struct HeatmapRenderer {
    config: VisualizationConfig,
}

impl HeatmapRenderer {
    pub fn new() -> Self {
        Self {
            config: VisualizationConfig::default(),
        }
    }

    pub fn with_config(config: VisualizationConfig) -> Self {
        Self { config }
    }

    pub fn render(&self, heat: &Array2<f32>) -> RgbImage {
        let heat = image_utils::normalize01(heat);
        let (height, width) = heat.dim();

        RgbImage::from_fn(width as u32, height as u32, |x, y| {
            self.intensity_to_color(heat[[y as usize, x as usize]])
        })
    }

    fn intensity_to_color(&self, intensity: f32) -> Rgb<u8> {
        let intensity = intensity.clamp(0.0, 1.0);

        match self.config.color_scheme {
            ColorScheme::HeatMap => {
                let (r, g, b) = if intensity < 0.25 {
                    let t = intensity / 0.25;
                    (0.0, t, 1.0)
                } else if intensity < 0.5 {
                    let t = (intensity - 0.25) / 0.25;
                    (0.0, 1.0, 1.0 - t)
                } else if intensity < 0.75 {
                    let t = (intensity - 0.5) / 0.25;
                    (t, 1.0, 0.0)
                } else {
                    let t = (intensity - 0.75) / 0.25;
                    (1.0, 1.0 - t, 0.0)
                };
                Rgb([(r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8])
            }
            ColorScheme::Grayscale => {
                let v = (intensity * 255.0) as u8;
                Rgb([v, v, v])
            }
            ColorScheme::SingleColor(base) => Rgb([
                (base[0] as f32 * intensity) as u8,
                (base[1] as f32 * intensity) as u8,
                (base[2] as f32 * intensity) as u8,
            ]),
        }
    }

    pub fn overlay(&self, original: &RgbImage, heat: &Array2<f32>) -> RgbImage {
        let rendered = self.render(heat);
        let (width, height) = original.dimensions();
        let alpha = self.config.overlay_opacity;
        let mut result = RgbImage::new(width, height);

        for y in 0..height {
            for x in 0..width {
                let orig = original.get_pixel(x, y);
                let color = rendered.get_pixel(
                    x.min(rendered.width() - 1),
                    y.min(rendered.height() - 1),
                );

                let blend = |o: u8, h: u8| ((1.0 - alpha) * o as f32 + alpha * h as f32) as u8;
                result.put_pixel(
                    x,
                    y,
                    Rgb([
                        blend(orig[0], color[0]),
                        blend(orig[1], color[1]),
                        blend(orig[2], color[2]),
                    ]),
                );
            }
        }

        result
    }
}

impl Default for HeatmapRenderer {
    fn default() -> Self {
        Self::new()
    }
}
