pub mod visualization;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::{AnalysisResult, analysis::ArtifactScore, scoring::CombineWeights};

#[derive(Serialize)]
pub struct JsonReport {
    pub verdict: String,
    pub confidence: f64,
    pub ai_likelihood: f64,
    pub evidence: Vec<String>,
    pub scores: ScoresSection,
}

#[derive(Serialize)]
pub struct ScoresSection {
    pub ai_likelihood: f64,
    pub combined_score: f64,
    pub weights: CombineWeights,
    pub thresholds_used: ThresholdsUsed,
    pub spectrum: AnalyzerSection,
    pub noise: AnalyzerSection,
    pub repetition: AnalyzerSection,
    pub edges: AnalyzerSection,
}

#[derive(Serialize)]
pub struct ThresholdsUsed {
    pub likely_real_max: f64,
    pub likely_ai_min: f64,
    pub has_calibration_file: bool,
}

#[derive(Serialize)]
pub struct AnalyzerSection {
    #[serde(flatten)]
    pub metrics: BTreeMap<String, f64>,
    pub score: f64,
}

impl From<&ArtifactScore> for AnalyzerSection {
    fn from(score: &ArtifactScore) -> Self {
        Self {
            metrics: score.metrics.clone(),
            score: score.score,
        }
    }
}

impl From<&AnalysisResult> for JsonReport {
    fn from(result: &AnalysisResult) -> Self {
        Self {
            verdict: result.verdict.to_string(),
            confidence: result.confidence,
            ai_likelihood: result.ai_likelihood,
            evidence: result.evidence.clone(),
            scores: ScoresSection {
                ai_likelihood: result.ai_likelihood,
                combined_score: result.combined_score,
                weights: result.scores.weights,
                thresholds_used: ThresholdsUsed {
                    likely_real_max: result.thresholds.likely_real_max,
                    likely_ai_min: result.thresholds.likely_ai_min,
                    has_calibration_file: result.has_calibration,
                },
                spectrum: AnalyzerSection::from(&result.scores.spectrum),
                noise: AnalyzerSection::from(&result.scores.noise),
                repetition: AnalyzerSection::from(&result.scores.repetition),
                edges: AnalyzerSection::from(&result.scores.edges),
            },
        }
    }
}

impl JsonReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use image::{DynamicImage, Rgb, RgbImage};

    use super::*;
    use crate::{AnalysisConfig, analyze_image};

    #[test]
    fn report_carries_every_required_field() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 64, Rgb([90, 90, 90])));
        let result = analyze_image(&image, &AnalysisConfig::default()).unwrap();
        let report = JsonReport::from(&result);

        let json = report.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert!(
            ["Likely Real", "Uncertain", "Likely AI-generated"]
                .contains(&value["verdict"].as_str().unwrap())
        );
        assert!(value["evidence"].as_array().is_some_and(|e| !e.is_empty()));
        assert!(value["scores"]["weights"]["spectrum"].is_number());
        assert!(value["scores"]["thresholds_used"]["likely_real_max"].is_number());
        assert_eq!(
            value["scores"]["thresholds_used"]["has_calibration_file"],
            serde_json::Value::Bool(false)
        );
        for analyzer in ["spectrum", "noise", "repetition", "edges"] {
            assert!(value["scores"][analyzer]["score"].is_number(), "{analyzer}");
        }
        assert!(value["scores"]["spectrum"]["resid_std"].is_number());
        assert!(value["scores"]["edges"]["lap_var"].is_number());
    }
}
