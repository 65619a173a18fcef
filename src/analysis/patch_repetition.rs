use image::imageops::FilterType;
use log::debug;
use ndarray::{Array2, s};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    analysis::{ArtifactDetector, ArtifactScore, ramp},
    error::{ForensicsError, Result},
    image_utils::{self, ImageField},
};

/// Searches for repeated texture by sampling patch pairs and measuring
/// cosine similarity. The sampled maximum is a Monte-Carlo lower bound on
/// the true maximum pairwise similarity: the sample never exhausts all
/// pairs, and reproducibility comes from the per-call fixed seed, not from
/// coverage.
pub struct PatchRepetitionAnalyzer {
    patch_size: usize,
    stride: usize,
    max_dimension: usize,
    pair_budget: usize,
    pairs_per_patch: usize,
    match_threshold: f64,
    sim_lo: f64,
    sim_hi: f64,
    coverage_ref: f64,
    seed: u64,
}

impl PatchRepetitionAnalyzer {
    pub fn new() -> Self {
        Self {
            patch_size: 24,
            stride: 12,
            max_dimension: 512,
            pair_budget: 3500,
            pairs_per_patch: 6,
            match_threshold: 0.92,
            sim_lo: 0.85,
            sim_hi: 0.97,
            coverage_ref: 0.12,
            seed: 0,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_patch_geometry(mut self, patch_size: usize, stride: usize) -> Self {
        self.patch_size = patch_size;
        self.stride = stride.max(1);
        self
    }

    pub fn with_pair_budget(mut self, budget: usize) -> Self {
        self.pair_budget = budget;
        self
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
        let mut dot = 0.0f64;
        let mut norm_a = 0.0f64;
        let mut norm_b = 0.0f64;
        for (&va, &vb) in a.iter().zip(b.iter()) {
            dot += va as f64 * vb as f64;
            norm_a += va as f64 * va as f64;
            norm_b += vb as f64 * vb as f64;
        }
        dot / ((norm_a.sqrt() + 1e-8) * (norm_b.sqrt() + 1e-8))
    }

    fn stamp(hot: &mut Array2<f32>, y: usize, x: usize, patch: usize) {
        let (height, width) = hot.dim();
        for yy in y..(y + patch).min(height) {
            for xx in x..(x + patch).min(width) {
                hot[[yy, xx]] += 1.0;
            }
        }
    }
}

impl Default for PatchRepetitionAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactDetector for PatchRepetitionAnalyzer {
    fn name(&self) -> &'static str {
        "repetition"
    }

    fn detect(&self, field: &ImageField) -> Result<ArtifactScore> {
        if self.patch_size < 4 {
            return Err(ForensicsError::InvalidParameter(
                "patch size must be at least 4".into(),
            ));
        }

        let (height, width) = field.luma.dim();
        let largest = height.max(width);

        let small = if largest > self.max_dimension {
            let scale = self.max_dimension as f32 / largest as f32;
            image_utils::resize_luma(
                &field.luma,
                ((width as f32 * scale) as usize).max(1),
                ((height as f32 * scale) as usize).max(1),
                FilterType::Triangle,
            )
        } else {
            field.luma.clone()
        };

        let (small_h, small_w) = small.dim();
        let patch = self.patch_size;

        let mut patches: Vec<Vec<f32>> = Vec::new();
        let mut coords: Vec<(usize, usize)> = Vec::new();
        if small_h >= patch && small_w >= patch {
            for y in (0..=small_h - patch).step_by(self.stride) {
                for x in (0..=small_w - patch).step_by(self.stride) {
                    let view = small.slice(s![y..y + patch, x..x + patch]);
                    let mean = view.iter().sum::<f32>() / (patch * patch) as f32;
                    patches.push(view.iter().map(|&v| v - mean).collect());
                    coords.push((y, x));
                }
            }
        }

        if patches.len() < 10 {
            return Ok(ArtifactScore::new(0.0)
                .with_metric("max_sim", 0.0)
                .with_heat(Array2::zeros((height, width))));
        }

        let n = patches.len();
        let draws = self.pair_budget.min(self.pairs_per_patch * n);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut max_sim = -1.0f64;
        let mut hot = Array2::<f32>::zeros((small_h, small_w));

        for _ in 0..draws {
            let i = rng.gen_range(0..n);
            let j = rng.gen_range(0..n);
            if i == j {
                // a discarded draw still consumes pair budget
                continue;
            }

            let sim = Self::cosine_similarity(&patches[i], &patches[j]);
            if sim > max_sim {
                max_sim = sim;
            }

            if sim > self.match_threshold {
                Self::stamp(&mut hot, coords[i].0, coords[i].1, patch);
                Self::stamp(&mut hot, coords[j].0, coords[j].1, patch);
            }
        }

        let hot = image_utils::normalize01(&hot);
        let heat = if (small_h, small_w) == (height, width) {
            hot
        } else {
            image_utils::resize_luma(&hot, width, height, FilterType::Triangle)
        };

        let max_sim = max_sim.clamp(-1.0, 1.0);
        let sim_score = ramp(max_sim, self.sim_lo, self.sim_hi);
        let coverage = heat.iter().map(|&v| v as f64).sum::<f64>() / (height * width) as f64;
        let coverage_score = (coverage / self.coverage_ref).clamp(0.0, 1.0);
        let score = 0.55 * sim_score + 0.45 * coverage_score;

        debug!("repetition: patches={n} draws={draws} max_sim={max_sim:.3} score={score:.3}");

        Ok(ArtifactScore::new(score)
            .with_metric("max_sim", max_sim)
            .with_heat(heat))
    }
}
