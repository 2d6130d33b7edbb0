//! Turns a prediction vector into a confident label or the Unknown outcome.

use serde::Serialize;

use crate::error::PipelineError;
use crate::taxonomy::Taxonomy;
use crate::types::PolicyCfg;

pub const UNKNOWN_LABEL: &str = "Unknown";
pub const TOP_N: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassScore {
    #[serde(rename = "class")]
    pub label: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Confident { label: String },
    Unknown,
}

impl Outcome {
    pub fn label(&self) -> &str {
        match self {
            Outcome::Confident { label } => label,
            Outcome::Unknown => UNKNOWN_LABEL,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub outcome: Outcome,
    /// Top-class score in percent, unrounded.
    pub confidence: f64,
    pub top3: Option<Vec<ClassScore>>,
    pub all_predictions: Option<Vec<ClassScore>>,
}

/// Index of the first maximal entry. NaN never wins.
pub fn argmax(scores: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &s) in scores.iter().enumerate() {
        if s.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if s <= b => {}
            _ => best = Some((i, s)),
        }
    }
    best.map(|(i, _)| i)
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub fn percent(score: f32) -> f64 {
    f64::from(score) * 100.0
}

/// Every taxonomy entry with its rounded percentage, in taxonomy order.
/// Scores past the end of the taxonomy are dropped.
pub fn scored_classes(scores: &[f32], taxonomy: &Taxonomy) -> Vec<ClassScore> {
    scores
        .iter()
        .zip(taxonomy.classes())
        .map(|(&s, label)| ClassScore { label: label.clone(), confidence: round2(percent(s)) })
        .collect()
}

/// Stable descending sort by confidence, first `n` kept. NaN sorts last.
pub fn rank(mut scored: Vec<ClassScore>, n: usize) -> Vec<ClassScore> {
    fn key(c: &ClassScore) -> f64 {
        if c.confidence.is_nan() {
            f64::NEG_INFINITY
        } else {
            c.confidence
        }
    }
    scored.sort_by(|a, b| key(b).total_cmp(&key(a)));
    scored.truncate(n);
    scored
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionPolicy {
    pub threshold: f64,
    pub include_top3: bool,
    pub include_all_predictions: bool,
    pub rank_unknown: bool,
}

impl DecisionPolicy {
    pub fn from_cfg(cfg: &PolicyCfg) -> Self {
        Self {
            threshold: cfg.threshold,
            include_top3: cfg.include_top3,
            include_all_predictions: cfg.include_all_predictions,
            rank_unknown: cfg.rank_unknown,
        }
    }

    /// The threshold is compared against the confidence rounded to two
    /// decimals, the same value the response reports.
    pub fn decide(&self, scores: &[f32], taxonomy: &Taxonomy) -> Result<Decision, PipelineError> {
        let index = argmax(scores)
            .ok_or_else(|| PipelineError::Inference("prediction vector has no usable score".to_string()))?;
        let confidence = percent(scores[index]);

        let outcome = if round2(confidence) < self.threshold {
            Outcome::Unknown
        } else {
            let label = match taxonomy.label(index) {
                Some(label) => label.to_string(),
                None => {
                    tracing::warn!(
                        "class index {} outside taxonomy of {}, using {:?}",
                        index,
                        taxonomy.len(),
                        taxonomy.default_label()
                    );
                    taxonomy.default_label().to_string()
                }
            };
            Outcome::Confident { label }
        };

        let scored = scored_classes(scores, taxonomy);
        let top3 = self.include_top3.then(|| match outcome {
            Outcome::Unknown if !self.rank_unknown => Vec::new(),
            _ => rank(scored.clone(), TOP_N),
        });
        let all_predictions = self.include_all_predictions.then_some(scored);

        Ok(Decision { outcome, confidence, top3, all_predictions })
    }
}
