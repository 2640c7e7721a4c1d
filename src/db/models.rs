use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One archived engine run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: i64,
    pub season: i32,
    /// Week number as text, or "final"
    pub week: String,
    pub generated_at: DateTime<Utc>,
    pub neutrality_metric: f64,
    /// "excellent" | "pass" | "caution" | "fail" | "insufficient_data"
    pub classification: String,
    pub outer_passes: i64,
    pub converged: bool,
    pub team_count: i64,
}

/// A team's rating as stored for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTeamRating {
    pub run_id: i64,
    pub team_id: String,
    pub name: String,
    pub conference: String,
    pub rank: i64,
    pub rating: f64,
    pub retrospective_rating: Option<f64>,
}
