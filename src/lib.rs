use std::path::{Path, PathBuf};

use image::DynamicImage;
use log::debug;
use ndarray::Array2;
use rayon::prelude::*;

use crate::{
    analysis::{
        ArtifactDetector, ArtifactScore, edge_stats::EdgeStatsAnalyzer,
        noise_residual::NoiseResidualAnalyzer, patch_repetition::PatchRepetitionAnalyzer,
        spectrum::SpectrumAnalyzer,
    },
    calibration::{BatchRecord, CalibrationThresholds, Split, Verdict},
    error::Result,
    image_utils::ImageField,
    scoring::CombineWeights,
};

pub mod analysis;
pub mod calibration;
pub mod error;
pub mod image_utils;
pub mod report;
pub mod scoring;

#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub weights: CombineWeights,
    pub evidence_threshold: f64,
    pub sampling_seed: u64,
    pub parallel: bool,
    pub calibration_path: Option<PathBuf>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            weights: CombineWeights::default(),
            evidence_threshold: scoring::DEFAULT_EVIDENCE_THRESHOLD,
            sampling_seed: 0,
            parallel: true,
            calibration_path: None,
        }
    }
}

pub struct ForensicsAnalyzer {
    original: DynamicImage,
    config: AnalysisConfig,
}

impl ForensicsAnalyzer {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let original = image::open(path)?;

        Ok(Self {
            original,
            config: AnalysisConfig::default(),
        })
    }

    pub fn from_image(image: DynamicImage) -> Self {
        Self {
            original: image,
            config: AnalysisConfig::default(),
        }
    }

    pub fn with_config(mut self, config: AnalysisConfig) -> Self {
        self.config = config;
        self
    }

    pub fn analyze(&self) -> Result<AnalysisResult> {
        analyze_image(&self.original, &self.config)
    }
}

/// Full single-image inference: normalize, run the four artifact
/// detectors, combine, classify, explain, and compose the heat overlay.
pub fn analyze_image(image: &DynamicImage, config: &AnalysisConfig) -> Result<AnalysisResult> {
    let field = ImageField::from_dynamic(image);

    let spectrum = SpectrumAnalyzer::new();
    let noise = NoiseResidualAnalyzer::new();
    let repetition = PatchRepetitionAnalyzer::new().with_seed(config.sampling_seed);
    let edges = EdgeStatsAnalyzer::new();

    // The detectors are independent; running them on joined rayon tasks
    // changes throughput, never results.
    let (spectrum, noise, repetition, edges) = if config.parallel {
        let ((spectrum, noise), (repetition, edges)) = rayon::join(
            || rayon::join(|| spectrum.detect(&field), || noise.detect(&field)),
            || rayon::join(|| repetition.detect(&field), || edges.detect(&field)),
        );
        (spectrum?, noise?, repetition?, edges?)
    } else {
        (
            spectrum.detect(&field)?,
            noise.detect(&field)?,
            repetition.detect(&field)?,
            edges.detect(&field)?,
        )
    };

    let combined_score = config.weights.combine(
        spectrum.score,
        noise.score,
        repetition.score,
        edges.score,
    );
    let ai_likelihood = scoring::likelihood_from_combined(combined_score);

    let (thresholds, has_calibration) =
        calibration::resolve_thresholds(config.calibration_path.as_deref());
    let (verdict, confidence) = calibration::classify(ai_likelihood, &thresholds);

    let evidence = scoring::build_evidence(
        config.evidence_threshold,
        &spectrum,
        &noise,
        &repetition,
        &edges,
    );

    let heatmap = scoring::compose_heatmap(
        noise.heat.as_ref(),
        repetition.heat.as_ref(),
        edges.heat.as_ref(),
        (field.height(), field.width()),
    );

    debug!("analysis: combined={combined_score:.3} likelihood={ai_likelihood:.3} verdict={verdict}");

    Ok(AnalysisResult {
        verdict,
        confidence,
        ai_likelihood,
        combined_score,
        evidence,
        scores: ScoreBreakdown {
            spectrum,
            noise,
            repetition,
            edges,
            weights: config.weights,
        },
        heatmap,
        thresholds,
        has_calibration,
    })
}

#[derive(Debug, Clone)]
pub struct ScoreBreakdown {
    pub spectrum: ArtifactScore,
    pub noise: ArtifactScore,
    pub repetition: ArtifactScore,
    pub edges: ArtifactScore,
    pub weights: CombineWeights,
}

#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub verdict: Verdict,
    pub confidence: f64,
    pub ai_likelihood: f64,
    pub combined_score: f64,
    pub evidence: Vec<String>,
    pub scores: ScoreBreakdown,
    pub heatmap: Array2<f32>,
    pub thresholds: CalibrationThresholds,
    pub has_calibration: bool,
}

impl AnalysisResult {
    /// Blends the analyzed image with a false-color rendering of the
    /// composed heat field, at the same spatial dimensions as the input.
    pub fn render_overlay(&self, original: &image::RgbImage) -> image::RgbImage {
        report::visualization::HeatmapRenderer::new().overlay(original, &self.heatmap)
    }

    pub fn to_record(
        &self,
        image: impl Into<String>,
        split: Split,
        category: impl Into<String>,
    ) -> BatchRecord {
        BatchRecord {
            image: image.into(),
            split,
            category: category.into(),
            verdict: Some(self.verdict),
            confidence: self.confidence,
            ai_likelihood: self.ai_likelihood,
            evidence: self.evidence.clone(),
            error: None,
        }
    }
}

/// One decoded image queued for batch analysis.
pub struct BatchItem {
    pub image_id: String,
    pub split: Split,
    pub category: String,
    pub image: DynamicImage,
}

/// Analyzes a batch with image-level parallelism. A failing image becomes
/// an error-marked record; it never aborts the rest of the batch.
pub fn analyze_batch(items: &[BatchItem], config: &AnalysisConfig) -> Vec<BatchRecord> {
    items
        .par_iter()
        .map(|item| match analyze_image(&item.image, config) {
            Ok(result) => result.to_record(&item.image_id, item.split, &item.category),
            Err(err) => BatchRecord::error_marker(
                item.image_id.clone(),
                item.split,
                item.category.clone(),
                err.to_string(),
            ),
        })
        .collect()
}
