use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::{analysis::ArtifactScore, image_utils};

/// Fixed combination weights over the four analyzer scores. The defaults
/// sum to 1.0 and are hand-tuned; they are exposed for experimentation,
/// not derived from any fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CombineWeights {
    pub spectrum: f64,
    pub noise: f64,
    pub repetition: f64,
    pub edges: f64,
}

impl Default for CombineWeights {
    fn default() -> Self {
        Self {
            spectrum: 0.30,
            noise: 0.30,
            repetition: 0.25,
            edges: 0.15,
        }
    }
}

impl CombineWeights {
    pub fn sum(&self) -> f64 {
        self.spectrum + self.noise + self.repetition + self.edges
    }

    pub fn combine(&self, spectrum: f64, noise: f64, repetition: f64, edges: f64) -> f64 {
        (self.spectrum * spectrum + self.noise * noise + self.repetition * repetition + self.edges * edges)
            .clamp(0.0, 1.0)
    }
}

const SIGMOID_CENTER: f64 = 0.50;
const SIGMOID_STEEPNESS: f64 = 6.0;

/// Maps the combined score through a logistic curve centered on 0.5,
/// monotone in the input.
pub fn likelihood_from_combined(combined: f64) -> f64 {
    image_utils::sigmoid((combined - SIGMOID_CENTER) * SIGMOID_STEEPNESS).clamp(0.0, 1.0)
}

pub const DEFAULT_EVIDENCE_THRESHOLD: f64 = 0.55;

pub const NO_ARTIFACTS_MESSAGE: &str =
    "No strong forensic artifacts detected by current heuristics";

/// One explanation line per analyzer whose score clears the threshold, in
/// fixed analyzer order. Never returns an empty list.
pub fn build_evidence(
    threshold: f64,
    spectrum: &ArtifactScore,
    noise: &ArtifactScore,
    repetition: &ArtifactScore,
    edges: &ArtifactScore,
) -> Vec<String> {
    let mut evidence = Vec::new();

    if spectrum.score > threshold {
        evidence.push(format!(
            "Non-natural frequency spectrum (residual_std={:.3})",
            spectrum.metric("resid_std")
        ));
    }
    if noise.score > threshold {
        evidence.push(format!(
            "Suspicious noise residual (corr@1px={:.2}, resid_mean={:.4})",
            noise.metric("resid_corr_1px"),
            noise.metric("resid_mean")
        ));
    }
    if repetition.score > threshold {
        evidence.push(format!(
            "Patch self-similarity / repetition (max_sim={:.2})",
            repetition.metric("max_sim")
        ));
    }
    if edges.score > threshold {
        evidence.push(format!(
            "Edge statistics out of expected range (lap_var={:.1})",
            edges.metric("lap_var")
        ));
    }

    if evidence.is_empty() {
        evidence.push(NO_ARTIFACTS_MESSAGE.to_string());
    }

    evidence
}

const HEAT_WEIGHT_NOISE: f32 = 0.45;
const HEAT_WEIGHT_REPETITION: f32 = 0.40;
const HEAT_WEIGHT_EDGES: f32 = 0.15;

/// Blends the three spatial heat fields into one normalized overlay field.
/// The spectrum analyzer carries no spatial map and contributes nothing.
pub fn compose_heatmap(
    noise: Option<&Array2<f32>>,
    repetition: Option<&Array2<f32>>,
    edges: Option<&Array2<f32>>,
    dim: (usize, usize),
) -> Array2<f32> {
    let mut heat = Array2::<f32>::zeros(dim);

    for (weight, layer) in [
        (HEAT_WEIGHT_NOISE, noise),
        (HEAT_WEIGHT_REPETITION, repetition),
        (HEAT_WEIGHT_EDGES, edges),
    ] {
        if let Some(layer) = layer {
            if layer.dim() == dim {
                heat.zip_mut_with(layer, |acc, &v| *acc += weight * v);
            }
        }
    }

    image_utils::normalize01(&heat)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_sum_to_one() {
        assert!((CombineWeights::default().sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn combine_is_a_weighted_average() {
        let weights = CombineWeights::default();
        assert_eq!(weights.combine(0.0, 0.0, 0.0, 0.0), 0.0);
        assert!((weights.combine(1.0, 1.0, 1.0, 1.0) - 1.0).abs() < 1e-12);
        assert!((weights.combine(1.0, 0.0, 0.0, 0.0) - 0.30).abs() < 1e-12);
    }

    #[test]
    fn likelihood_is_centered_and_monotone() {
        assert!((likelihood_from_combined(0.5) - 0.5).abs() < 1e-12);
        assert!(likelihood_from_combined(0.8) > likelihood_from_combined(0.6));
        assert!(likelihood_from_combined(0.0) > 0.0);
        assert!(likelihood_from_combined(1.0) < 1.0);
    }

    #[test]
    fn evidence_follows_fixed_analyzer_order() {
        let hot = |metric: &str, value: f64| ArtifactScore::new(0.9).with_metric(metric, value);
        let evidence = build_evidence(
            DEFAULT_EVIDENCE_THRESHOLD,
            &hot("resid_std", 0.4),
            &hot("resid_corr_1px", 0.5).with_metric("resid_mean", 0.001),
            &hot("max_sim", 0.99),
            &hot("lap_var", 12.0),
        );

        assert_eq!(evidence.len(), 4);
        assert!(evidence[0].starts_with("Non-natural frequency spectrum"));
        assert!(evidence[1].starts_with("Suspicious noise residual"));
        assert!(evidence[2].starts_with("Patch self-similarity"));
        assert!(evidence[3].starts_with("Edge statistics"));
    }

    #[test]
    fn quiet_scores_emit_exactly_the_default_message() {
        let quiet = ArtifactScore::new(0.2);
        let evidence = build_evidence(
            DEFAULT_EVIDENCE_THRESHOLD,
            &quiet,
            &quiet,
            &quiet,
            &quiet,
        );

        assert_eq!(evidence, vec![NO_ARTIFACTS_MESSAGE.to_string()]);
    }

    #[test]
    fn threshold_is_exclusive() {
        let boundary = ArtifactScore::new(DEFAULT_EVIDENCE_THRESHOLD);
        let evidence = build_evidence(
            DEFAULT_EVIDENCE_THRESHOLD,
            &boundary,
            &boundary,
            &boundary,
            &boundary,
        );

        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0], NO_ARTIFACTS_MESSAGE);
    }

    #[test]
    fn compose_normalizes_the_blend() {
        let mut repetition = Array2::<f32>::zeros((8, 8));
        repetition[[2, 2]] = 1.0;
        let heat = compose_heatmap(None, Some(&repetition), None, (8, 8));

        assert_eq!(heat[[2, 2]], 1.0);
        assert_eq!(heat[[0, 0]], 0.0);
    }

    #[test]
    fn compose_without_layers_is_all_zeros() {
        let heat = compose_heatmap(None, None, None, (4, 6));
        assert_eq!(heat.dim(), (4, 6));
        assert!(heat.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn compose_respects_layer_weights() {
        let noise = Array2::from_elem((4, 4), 1.0f32);
        let mut edges = Array2::<f32>::zeros((4, 4));
        edges[[0, 0]] = 1.0;
        let heat = compose_heatmap(Some(&noise), None, Some(&edges), (4, 4));

        // 0.45 + 0.15 at the corner vs 0.45 elsewhere; min-max
        // normalization maps the uniform noise floor back to zero.
        assert_eq!(heat[[0, 0]], 1.0);
        assert_eq!(heat[[1, 1]], 0.0);
    }
}
