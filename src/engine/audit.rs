//! Neutrality audit and the bounded auto-tune policy.
//!
//! The metric is the member-weighted squared relative deviation of each
//! conference's mean rating from the global mean:
//!
//!   B = Σ_c (n_c / N) · ((mean_c − μ) / μ)²

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::EngineParams;
use crate::season::Season;

/// Recency lambda bounds for auto-tuning.
pub const MIN_RECENCY_LAMBDA: f64 = 0.01;
pub const MAX_RECENCY_LAMBDA: f64 = 0.10;
const LAMBDA_STEP: f64 = 0.9;
const INJECTION_STEP: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Excellent,
    Pass,
    Caution,
    Fail,
    /// Fewer than two populated conferences or no inter-conference game
    InsufficientData,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Excellent => "excellent",
            Classification::Pass => "pass",
            Classification::Caution => "caution",
            Classification::Fail => "fail",
            Classification::InsufficientData => "insufficient_data",
        }
    }
}

/// Band boundaries are inclusive upper bounds.
pub fn classify(metric: f64, params: &EngineParams) -> Classification {
    if metric <= params.bias_excellent {
        Classification::Excellent
    } else if metric <= params.bias_pass {
        Classification::Pass
    } else if metric <= params.bias_caution {
        Classification::Caution
    } else {
        Classification::Fail
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConferenceDeviation {
    pub conference: usize,
    pub members: usize,
    pub mean_rating: f64,
    /// mean_c − μ
    pub deviation: f64,
    pub min_rating: f64,
    pub max_rating: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NeutralityAudit {
    pub metric: f64,
    pub classification: Classification,
    pub global_mean: f64,
    pub conferences: Vec<ConferenceDeviation>,
}

impl NeutralityAudit {
    pub fn needs_tuning(&self, params: &EngineParams) -> bool {
        self.classification != Classification::InsufficientData && self.metric > params.auto_tune_threshold
    }
}

/// Per-conference rating statistics for a rating vector.
pub fn conference_deviations(season: &Season, ratings: &[f64]) -> (f64, Vec<ConferenceDeviation>) {
    let global_mean = if ratings.is_empty() {
        0.0
    } else {
        ratings.iter().sum::<f64>() / ratings.len() as f64
    };
    let conferences = season
        .conferences
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.members.is_empty())
        .map(|(ci, c)| {
            let values: Vec<f64> = c.members.iter().map(|&m| ratings[m]).collect();
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            ConferenceDeviation {
                conference: ci,
                members: values.len(),
                mean_rating: mean,
                deviation: mean - global_mean,
                min_rating: values.iter().copied().fold(f64::INFINITY, f64::min),
                max_rating: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            }
        })
        .collect();
    (global_mean, conferences)
}

/// Audit a final rating vector.
pub fn audit(
    season: &Season,
    ratings: &[f64],
    cross_conference_games: usize,
    params: &EngineParams,
) -> NeutralityAudit {
    let (global_mean, conferences) = conference_deviations(season, ratings);

    if conferences.len() < 2 || cross_conference_games == 0 || !(global_mean > 0.0) {
        debug!(
            "Neutrality audit has insufficient data: {} conferences, {} cross-conference games",
            conferences.len(),
            cross_conference_games
        );
        return NeutralityAudit {
            metric: 0.0,
            classification: Classification::InsufficientData,
            global_mean,
            conferences,
        };
    }

    let total: usize = conferences.iter().map(|c| c.members).sum();
    let metric: f64 = conferences
        .iter()
        .map(|c| {
            let rel = c.deviation / global_mean;
            (c.members as f64 / total as f64) * rel * rel
        })
        .sum();
    let classification = classify(metric, params);

    info!("Neutrality metric {:.4} ({})", metric, classification.as_str());

    NeutralityAudit {
        metric,
        classification,
        global_mean,
        conferences,
    }
}

/// What the controller should do after an audit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TuningStep {
    Done,
    Retry(EngineParams),
}

/// Pure auto-tune policy. `attempt` counts the retries already made.
///
/// Even attempts soften recency decay, odd attempts soften conference
/// injection. An adjustment that cannot move the parameters ends tuning.
pub fn next_tuning(audit: &NeutralityAudit, params: &EngineParams, attempt: usize) -> TuningStep {
    if !audit.needs_tuning(params) || attempt >= params.max_tune_retries {
        return TuningStep::Done;
    }

    let mut next = *params;
    if attempt % 2 == 0 {
        let scaled = params.recency_lambda * LAMBDA_STEP;
        // User values outside the tuning range are scaled but never pulled into it.
        next.recency_lambda = if (MIN_RECENCY_LAMBDA..=MAX_RECENCY_LAMBDA).contains(&params.recency_lambda) {
            scaled.clamp(MIN_RECENCY_LAMBDA, MAX_RECENCY_LAMBDA)
        } else {
            scaled
        };
    } else {
        next.injection_strength = params.injection_strength * INJECTION_STEP;
    }

    if next == *params {
        return TuningStep::Done;
    }
    info!(
        "Auto-tune retry {}: B={:.4}, recency_lambda {:.4} → {:.4}, injection_strength {:.4} → {:.4}",
        attempt + 1,
        audit.metric,
        params.recency_lambda,
        next.recency_lambda,
        params.injection_strength,
        next.injection_strength
    );
    TuningStep::Retry(next)
}
