use std::fmt;
use std::path::{Path, PathBuf};

use log::{info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, OrderStatistics, Statistics};

use crate::error::Result;

pub const DEFAULT_LIKELY_REAL_MAX: f64 = 0.30;
pub const DEFAULT_LIKELY_AI_MIN: f64 = 0.70;

const THRESHOLD_MARGIN: f64 = 0.05;
const THRESHOLD_EPS: f64 = 1e-9;

/// Decision boundaries for the three-way verdict. `likely_real_max` is
/// strictly below `likely_ai_min` in every value this type hands out;
/// construction repairs any pair that violates that.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationThresholds {
    pub likely_real_max: f64,
    pub likely_ai_min: f64,
}

impl Default for CalibrationThresholds {
    fn default() -> Self {
        Self {
            likely_real_max: DEFAULT_LIKELY_REAL_MAX,
            likely_ai_min: DEFAULT_LIKELY_AI_MIN,
        }
    }
}

impl CalibrationThresholds {
    pub fn repaired(likely_real_max: f64, likely_ai_min: f64) -> Self {
        let (likely_real_max, likely_ai_min) =
            repair_thresholds(likely_real_max, likely_ai_min, THRESHOLD_MARGIN);
        Self {
            likely_real_max,
            likely_ai_min,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.likely_real_max < self.likely_ai_min - THRESHOLD_EPS
            && (0.0..=1.0).contains(&self.likely_real_max)
            && (0.0..=1.0).contains(&self.likely_ai_min)
    }

    pub fn uncertain_range(&self) -> [f64; 2] {
        [self.likely_real_max, self.likely_ai_min]
    }
}

/// Repairs an inverted or too-narrow threshold pair: recenter around the
/// midpoint with a fixed margin, hard-clamp to [0,1], and fall back to the
/// static defaults if the pair is still degenerate. Idempotent on valid
/// input.
pub fn repair_thresholds(mut likely_real_max: f64, mut likely_ai_min: f64, margin: f64) -> (f64, f64) {
    if likely_real_max >= likely_ai_min - THRESHOLD_EPS {
        let mid = 0.5 * (likely_real_max + likely_ai_min);
        likely_real_max = mid - margin;
        likely_ai_min = mid + margin;
    }

    likely_real_max = likely_real_max.clamp(0.0, 1.0);
    likely_ai_min = likely_ai_min.clamp(0.0, 1.0);

    if likely_real_max >= likely_ai_min - THRESHOLD_EPS {
        (DEFAULT_LIKELY_REAL_MAX, DEFAULT_LIKELY_AI_MIN)
    } else {
        (likely_real_max, likely_ai_min)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "Likely Real")]
    LikelyReal,
    #[serde(rename = "Uncertain")]
    Uncertain,
    #[serde(rename = "Likely AI-generated")]
    LikelyAi,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Verdict::LikelyReal => "Likely Real",
            Verdict::Uncertain => "Uncertain",
            Verdict::LikelyAi => "Likely AI-generated",
        };
        f.write_str(label)
    }
}

/// Maps a likelihood to a verdict and a confidence. Boundary values belong
/// to the decided branches; only the open interval between the thresholds
/// reads as uncertain.
pub fn classify(ai_likelihood: f64, thresholds: &CalibrationThresholds) -> (Verdict, f64) {
    let x = ai_likelihood;

    if x >= thresholds.likely_ai_min {
        (Verdict::LikelyAi, x.clamp(0.0, 1.0))
    } else if x <= thresholds.likely_real_max {
        (Verdict::LikelyReal, (1.0 - x).clamp(0.0, 1.0))
    } else {
        let confidence = 1.0 - (x - 0.5).abs() * 2.0;
        (Verdict::Uncertain, confidence.clamp(0.0, 1.0))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRecord {
    pub likely_real_max: f64,
    pub likely_ai_min: f64,
    pub uncertain_range: [f64; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitStats {
    pub count_real: usize,
    pub count_ai: usize,
    pub count_borderline: usize,
    pub real_mean: Option<f64>,
    pub ai_mean: Option<f64>,
    pub borderline_mean: Option<f64>,
    pub real_p10: Option<f64>,
    pub real_p90: Option<f64>,
    pub ai_p10: Option<f64>,
    pub ai_p90: Option<f64>,
}

/// On-disk calibration record. Written by the offline calibrator, read
/// (and cached) by the inference path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationFile {
    pub thresholds: ThresholdRecord,
    pub stats: SplitStats,
}

impl CalibrationFile {
    pub fn thresholds(&self) -> CalibrationThresholds {
        CalibrationThresholds::repaired(
            self.thresholds.likely_real_max,
            self.thresholds.likely_ai_min,
        )
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

pub fn load_calibration<P: AsRef<Path>>(path: P) -> Result<Option<CalibrationFile>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    Ok(Some(serde_json::from_str(&contents)?))
}

static CALIBRATION_CACHE: RwLock<Vec<(PathBuf, Option<CalibrationFile>)>> = RwLock::new(Vec::new());

/// Resolves the thresholds to use for one inference call. The calibration
/// file is read-only and process-wide, so the first successful load per
/// path is cached. Returns the thresholds plus whether calibration data
/// was actually present.
pub fn resolve_thresholds(path: Option<&Path>) -> (CalibrationThresholds, bool) {
    let Some(path) = path else {
        return (CalibrationThresholds::default(), false);
    };

    {
        let cache = CALIBRATION_CACHE.read();
        if let Some((_, cached)) = cache.iter().find(|(p, _)| p == path) {
            return match cached {
                Some(file) => (file.thresholds(), true),
                None => (CalibrationThresholds::default(), false),
            };
        }
    }

    let loaded = match load_calibration(path) {
        Ok(loaded) => loaded,
        Err(err) => {
            warn!("ignoring unreadable calibration file {}: {err}", path.display());
            None
        }
    };

    let resolved = match &loaded {
        Some(file) => (file.thresholds(), true),
        None => (CalibrationThresholds::default(), false),
    };

    let mut cache = CALIBRATION_CACHE.write();
    if !cache.iter().any(|(p, _)| p == path) {
        cache.push((path.to_path_buf(), loaded));
    }

    resolved
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Real,
    Ai,
    Borderline,
    Unknown,
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Split::Real => "real",
            Split::Ai => "ai",
            Split::Borderline => "borderline",
            Split::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Infers `(split, category)` from a dataset path shaped
/// `.../<split>/<category>/<file>`.
pub fn labels_from_path(path: &Path) -> (Split, String) {
    let parts: Vec<String> = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_lowercase())
        .collect();

    for (idx, part) in parts.iter().enumerate() {
        let split = match part.as_str() {
            "real" => Split::Real,
            "ai" => Split::Ai,
            "borderline" => Split::Borderline,
            _ => continue,
        };
        let category = parts
            .get(idx + 1)
            .cloned()
            .unwrap_or_else(|| "unknown".to_string());
        return (split, category);
    }

    (Split::Unknown, "unknown".to_string())
}

/// One image's outcome in a calibration batch. Failed images carry an
/// error marker instead of aborting the batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchRecord {
    pub image: String,
    pub split: Split,
    pub category: String,
    pub verdict: Option<Verdict>,
    pub confidence: f64,
    pub ai_likelihood: f64,
    pub evidence: Vec<String>,
    pub error: Option<String>,
}

impl BatchRecord {
    pub fn error_marker(image: String, split: Split, category: String, message: String) -> Self {
        Self {
            image,
            split,
            category,
            verdict: None,
            confidence: 0.0,
            ai_likelihood: 0.0,
            evidence: Vec::new(),
            error: Some(message),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Exemplar {
    pub image: String,
    pub ai_likelihood: f64,
    pub verdict: Option<Verdict>,
}

impl Exemplar {
    fn from_record(record: &BatchRecord) -> Self {
        Self {
            image: record.image.clone(),
            ai_likelihood: record.ai_likelihood,
            verdict: record.verdict,
        }
    }
}

/// Ranked exemplar lists for reporting; not consumed by inference.
#[derive(Debug, Clone, Serialize)]
pub struct TopExamples {
    pub real: Vec<Exemplar>,
    pub ai: Vec<Exemplar>,
    pub uncertain: Vec<Exemplar>,
}

#[derive(Debug, Clone)]
pub struct CalibrationReport {
    pub calibration: CalibrationFile,
    pub top_examples: TopExamples,
}

impl CalibrationReport {
    pub fn thresholds(&self) -> CalibrationThresholds {
        self.calibration.thresholds()
    }
}

/// Derives decision thresholds from the likelihood distribution of a
/// labeled batch: the 90th percentile of the real split and the 10th
/// percentile of the ai split, repaired into a valid pair.
pub struct Calibrator {
    margin: f64,
    exemplar_count: usize,
}

impl Calibrator {
    pub fn new() -> Self {
        Self {
            margin: THRESHOLD_MARGIN,
            exemplar_count: 3,
        }
    }

    pub fn with_margin(mut self, margin: f64) -> Self {
        self.margin = margin;
        self
    }

    pub fn calibrate(&self, records: &[BatchRecord]) -> CalibrationReport {
        let likelihoods = |split: Split| -> Vec<f64> {
            records
                .iter()
                .filter(|r| r.is_ok() && r.split == split)
                .map(|r| r.ai_likelihood)
                .collect()
        };

        let real = likelihoods(Split::Real);
        let ai = likelihoods(Split::Ai);
        let borderline = likelihoods(Split::Borderline);

        let raw_real_max = percentile(&real, 90, DEFAULT_LIKELY_REAL_MAX);
        let raw_ai_min = percentile(&ai, 10, DEFAULT_LIKELY_AI_MIN);
        let (likely_real_max, likely_ai_min) =
            repair_thresholds(raw_real_max, raw_ai_min, self.margin);

        info!(
            "calibration: real={} ai={} borderline={} -> thresholds ({likely_real_max:.3}, {likely_ai_min:.3})",
            real.len(),
            ai.len(),
            borderline.len()
        );

        let calibration = CalibrationFile {
            thresholds: ThresholdRecord {
                likely_real_max,
                likely_ai_min,
                uncertain_range: [likely_real_max, likely_ai_min],
            },
            stats: SplitStats {
                count_real: real.len(),
                count_ai: ai.len(),
                count_borderline: borderline.len(),
                real_mean: mean(&real),
                ai_mean: mean(&ai),
                borderline_mean: mean(&borderline),
                real_p10: optional_percentile(&real, 10),
                real_p90: optional_percentile(&real, 90),
                ai_p10: optional_percentile(&ai, 10),
                ai_p90: optional_percentile(&ai, 90),
            },
        };

        CalibrationReport {
            calibration,
            top_examples: self.top_examples(records),
        }
    }

    fn top_examples(&self, records: &[BatchRecord]) -> TopExamples {
        let ranked = |split: Option<Split>, key: fn(&BatchRecord) -> f64| -> Vec<Exemplar> {
            let mut subset: Vec<&BatchRecord> = records
                .iter()
                .filter(|r| r.is_ok() && split.is_none_or(|s| r.split == s))
                .collect();
            subset.sort_by(|a, b| key(a).total_cmp(&key(b)));
            subset
                .iter()
                .take(self.exemplar_count)
                .map(|r| Exemplar::from_record(r))
                .collect()
        };

        TopExamples {
            real: ranked(Some(Split::Real), |r| r.ai_likelihood),
            ai: ranked(Some(Split::Ai), |r| -r.ai_likelihood),
            uncertain: ranked(None, |r| (r.ai_likelihood - 0.5).abs()),
        }
    }
}

impl Default for Calibrator {
    fn default() -> Self {
        Self::new()
    }
}

fn percentile(values: &[f64], p: usize, fallback: f64) -> f64 {
    if values.is_empty() {
        return fallback;
    }
    let mut data = Data::new(values.to_vec());
    data.percentile(p)
}

fn optional_percentile(values: &[f64], p: usize) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(percentile(values, p, 0.0))
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(Statistics::mean(values))
    }
}
