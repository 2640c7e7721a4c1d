//! Rating report handed to presentation and storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::audit::{Classification, NeutralityAudit};
use super::bootstrap::{percentile, BootstrapSummary, ConfidenceBound, SampleFailure};
use super::solver::TwoLayerSolution;
use crate::config::EngineParams;
use crate::season::Season;

/// Week number, or the full-season sentinel serialised as `"final"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeekLabel {
    Week(u32),
    Final,
}

impl std::fmt::Display for WeekLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WeekLabel::Week(w) => write!(f, "{}", w),
            WeekLabel::Final => write!(f, "final"),
        }
    }
}

impl Serialize for WeekLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            WeekLabel::Week(w) => serializer.serialize_u32(*w),
            WeekLabel::Final => serializer.serialize_str("final"),
        }
    }
}

impl<'de> Deserialize<'de> for WeekLabel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Week(u32),
            Label(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Week(w) => Ok(WeekLabel::Week(w)),
            Raw::Label(s) if s == "final" => Ok(WeekLabel::Final),
            Raw::Label(s) => Err(serde::de::Error::custom(format!("unknown week label '{}'", s))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotableWin {
    pub game_id: String,
    pub opponent_id: String,
    pub opponent_name: String,
    pub opponent_rating: f64,
    pub week: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamRating {
    pub rank: usize,
    pub team_id: String,
    pub name: String,
    pub conference: String,
    pub rating: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrospective_rating: Option<f64>,
    pub wins: u32,
    pub losses: u32,
    pub ties: u32,
    pub notable_wins: Vec<NotableWin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<ConfidenceBound>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConferenceSummary {
    pub conference: String,
    /// Stationary mass of the conference layer
    pub strength: f64,
    pub mean_rating: f64,
    pub deviation: f64,
    pub member_count: usize,
    pub min_rating: f64,
    pub max_rating: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TuningStatus {
    /// First run was within threshold or could not be audited
    NotNeeded,
    /// A retry brought the metric within threshold
    Reached,
    /// Retries ran out above threshold
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeutralityReport {
    pub metric: f64,
    pub classification: Classification,
    pub tuning_status: TuningStatus,
    pub tuning_attempts: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceReport {
    pub outer_passes: usize,
    pub outer_converged: bool,
    pub outer_deltas: Vec<f64>,
    pub team_layer_iterations: usize,
    pub team_layer_converged: bool,
    pub conference_layer_iterations: usize,
    pub conference_layer_converged: bool,
}

impl From<&TwoLayerSolution> for ConvergenceReport {
    fn from(sol: &TwoLayerSolution) -> Self {
        Self {
            outer_passes: sol.outer.passes,
            outer_converged: sol.outer.converged,
            outer_deltas: sol.outer.deltas.clone(),
            team_layer_iterations: sol.team_layer.iterations,
            team_layer_converged: sol.team_layer.converged,
            conference_layer_iterations: sol.conference_layer.iterations,
            conference_layer_converged: sol.conference_layer.converged,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapReport {
    pub requested: usize,
    pub succeeded: usize,
    pub failures: Vec<SampleFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingReport {
    pub season: i32,
    pub week: WeekLabel,
    pub generated_at: DateTime<Utc>,
    pub games_used: usize,
    pub decisive_games: usize,
    pub params: EngineParams,
    pub teams: Vec<TeamRating>,
    pub conferences: Vec<ConferenceSummary>,
    pub neutrality: NeutralityReport,
    pub convergence: ConvergenceReport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap: Option<BootstrapReport>,
}

impl RatingReport {
    pub fn team(&self, id: &str) -> Option<&TeamRating> {
        self.teams.iter().find(|t| t.team_id == id)
    }
}

/// Everything the assembler needs from one engine run.
pub struct ReportInputs<'a> {
    pub season: &'a Season,
    pub games: &'a [usize],
    pub week: WeekLabel,
    pub params: &'a EngineParams,
    pub solution: &'a TwoLayerSolution,
    pub audit: &'a NeutralityAudit,
    pub tuning_status: TuningStatus,
    pub tuning_attempts: usize,
    pub retrospective: Option<&'a [f64]>,
    pub bootstrap: Option<&'a BootstrapSummary>,
}

/// Wins over opponents rated at or above `threshold`, strongest opponent first.
fn notable_wins(inputs: &ReportInputs<'_>, team: usize, threshold: f64) -> Vec<NotableWin> {
    let season = inputs.season;
    let ratings = &inputs.solution.ratings;
    let mut wins: Vec<NotableWin> = inputs
        .games
        .iter()
        .map(|&gi| &season.games[gi])
        .filter_map(|g| g.outcome().map(|o| (g, o)))
        .filter(|(_, o)| o.winner == team && ratings[o.loser] >= threshold)
        .map(|(g, o)| NotableWin {
            game_id: g.id.clone(),
            opponent_id: season.teams[o.loser].id.clone(),
            opponent_name: season.teams[o.loser].name.clone(),
            opponent_rating: ratings[o.loser],
            week: g.week,
        })
        .collect();
    wins.sort_by(|a, b| b.opponent_rating.total_cmp(&a.opponent_rating).then(a.week.cmp(&b.week)));
    wins.truncate(inputs.params.max_notable_wins);
    wins
}

pub fn build_report(inputs: &ReportInputs<'_>) -> RatingReport {
    let season = inputs.season;
    let sol = inputs.solution;

    let mut sorted = sol.ratings.clone();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let threshold = percentile(&sorted, inputs.params.notable_win_percentile).unwrap_or(f64::INFINITY);

    let mut records = vec![(0u32, 0u32, 0u32); season.team_count()];
    for &gi in inputs.games {
        let game = &season.games[gi];
        match game.outcome() {
            Some(o) => {
                records[o.winner].0 += 1;
                records[o.loser].1 += 1;
            }
            None => {
                records[game.home].2 += 1;
                records[game.away].2 += 1;
            }
        }
    }

    let mut order: Vec<usize> = (0..season.team_count()).collect();
    order.sort_by(|&a, &b| {
        sol.ratings[b]
            .total_cmp(&sol.ratings[a])
            .then_with(|| season.teams[a].id.cmp(&season.teams[b].id))
    });

    let teams = order
        .iter()
        .enumerate()
        .map(|(pos, &t)| {
            let (wins, losses, ties) = records[t];
            let team = &season.teams[t];
            TeamRating {
                rank: pos + 1,
                team_id: team.id.clone(),
                name: team.name.clone(),
                conference: team.conference.clone(),
                rating: sol.ratings[t],
                retrospective_rating: inputs.retrospective.map(|r| r[t]),
                wins,
                losses,
                ties,
                notable_wins: notable_wins(inputs, t, threshold),
                confidence: inputs.bootstrap.map(|b| b.bounds[t].clone()),
            }
        })
        .collect();

    let mut conferences: Vec<ConferenceSummary> = inputs
        .audit
        .conferences
        .iter()
        .map(|c| ConferenceSummary {
            conference: season.conferences[c.conference].name.clone(),
            strength: sol.conference_ratings.get(c.conference).copied().unwrap_or(0.0),
            mean_rating: c.mean_rating,
            deviation: c.deviation,
            member_count: c.members,
            min_rating: c.min_rating,
            max_rating: c.max_rating,
        })
        .collect();
    conferences.sort_by(|a, b| b.strength.total_cmp(&a.strength).then_with(|| a.conference.cmp(&b.conference)));

    RatingReport {
        season: season.season,
        week: inputs.week,
        generated_at: Utc::now(),
        games_used: inputs.games.len(),
        decisive_games: sol.decisive_games,
        params: *inputs.params,
        teams,
        conferences,
        neutrality: NeutralityReport {
            metric: inputs.audit.metric,
            classification: inputs.audit.classification,
            tuning_status: inputs.tuning_status,
            tuning_attempts: inputs.tuning_attempts,
        },
        convergence: ConvergenceReport::from(sol),
        bootstrap: inputs.bootstrap.map(|b| BootstrapReport {
            requested: b.requested,
            succeeded: b.succeeded,
            failures: b.failures.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn week_label_serialises_as_number_or_final() {
        assert_eq!(serde_json::to_string(&WeekLabel::Week(7)).unwrap(), "7");
        assert_eq!(serde_json::to_string(&WeekLabel::Final).unwrap(), "\"final\"");
        assert_eq!(serde_json::from_str::<WeekLabel>("12").unwrap(), WeekLabel::Week(12));
        assert_eq!(serde_json::from_str::<WeekLabel>("\"final\"").unwrap(), WeekLabel::Final);
        assert!(serde_json::from_str::<WeekLabel>("\"bowl\"").is_err());
        assert_eq!(WeekLabel::Final.to_string(), "final");
    }

    #[test]
    fn confidence_bound_is_tagged() {
        let json = serde_json::to_value(ConfidenceBound::Absent).unwrap();
        assert_eq!(json["status"], "absent");
        let json = serde_json::to_value(ConfidenceBound::Interval {
            low: 0.1,
            median: 0.2,
            high: 0.3,
            samples: 4,
        })
        .unwrap();
        assert_eq!(json["status"], "interval");
        assert_eq!(json["samples"], 4);
    }
}
