pub mod audit;
pub mod bootstrap;
pub mod graph;
pub mod pagerank;
pub mod report;
pub mod solver;
pub mod weights;

use std::collections::HashMap;
use tracing::{info, warn};

use crate::config::EngineParams;
use crate::error::EngineError;
use crate::season::{Season, SeasonSnapshot};
use audit::{Classification, NeutralityAudit, TuningStep};
use report::{build_report, RatingReport, ReportInputs, TuningStatus, WeekLabel};
use solver::{solve_two_layer, TwoLayerSolution};

/// Which slice of the season to rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Games up to and including this week; recency evaluated at it
    Week(u32),
    /// Every game; recency evaluated at the latest week played
    Final,
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub mode: Option<RunMode>,
    /// Hindsight variant alongside the primary rating (final mode only)
    pub retrospective: bool,
    /// Seed ratings keyed by team id
    pub initial_ratings: Option<HashMap<String, f64>>,
}

impl RunOptions {
    pub fn week(week: u32) -> Self {
        Self {
            mode: Some(RunMode::Week(week)),
            ..Self::default()
        }
    }

    pub fn final_season() -> Self {
        Self {
            mode: Some(RunMode::Final),
            ..Self::default()
        }
    }
}

struct TunedRun {
    params: EngineParams,
    solution: TwoLayerSolution,
    audit: NeutralityAudit,
}

pub struct RatingEngine {
    params: EngineParams,
}

impl RatingEngine {
    pub fn new(params: EngineParams) -> Self {
        Self { params }
    }

    /// Validate the snapshot, solve, audit (re-tuning within budget), and
    /// assemble the report.
    pub fn run(&self, snapshot: &SeasonSnapshot, options: &RunOptions) -> Result<RatingReport, EngineError> {
        let full = Season::from_snapshot(snapshot)?;
        let mode = options.mode.unwrap_or(RunMode::Final);
        let (season, eval_week, label) = match mode {
            RunMode::Week(week) => (full.through_week(week), week, WeekLabel::Week(week)),
            RunMode::Final => {
                let latest = full.latest_week();
                (full, latest, WeekLabel::Final)
            }
        };
        let games: Vec<usize> = (0..season.games.len()).collect();
        let initial = options
            .initial_ratings
            .as_ref()
            .map(|seed| seed_vector(&season, seed, self.params.rating_total));

        info!(
            "Rating season {} ({}): {} teams, {} games",
            season.season,
            label,
            season.team_count(),
            games.len()
        );

        let (tuned, attempts, status) = self.solve_with_tuning(&season, &games, eval_week, initial.as_deref())?;

        let mut audit = tuned.audit.clone();
        if status == TuningStatus::Exhausted {
            audit.classification = Classification::Fail;
        }

        let retrospective = if options.retrospective && mode == RunMode::Final {
            let hindsight = EngineParams {
                shrinkage_k: 0.0,
                recency_lambda: 0.0,
                ..tuned.params
            };
            let retro = solve_two_layer(&season, &games, eval_week, &hindsight, Some(&tuned.solution.ratings))?;
            info!("Retrospective solve finished in {} outer passes", retro.outer.passes);
            Some(retro.ratings)
        } else {
            if options.retrospective {
                warn!("Retrospective rating is only computed in final mode");
            }
            None
        };

        let bootstrap = if tuned.params.bootstrap_samples > 0 {
            Some(bootstrap::estimate(&season, &games, eval_week, &tuned.params))
        } else {
            None
        };

        Ok(build_report(&ReportInputs {
            season: &season,
            games: &games,
            week: label,
            params: &tuned.params,
            solution: &tuned.solution,
            audit: &audit,
            tuning_status: status,
            tuning_attempts: attempts,
            retrospective: retrospective.as_deref(),
            bootstrap: bootstrap.as_ref(),
        }))
    }

    /// Bounded auto-tune loop driven by `audit::next_tuning`. Keeps the run
    /// with the lowest neutrality metric.
    fn solve_with_tuning(
        &self,
        season: &Season,
        games: &[usize],
        eval_week: u32,
        initial: Option<&[f64]>,
    ) -> Result<(TunedRun, usize, TuningStatus), EngineError> {
        let mut params = self.params;
        let mut attempts = 0;

        let solution = solve_two_layer(season, games, eval_week, &params, initial)?;
        let audit = audit::audit(season, &solution.ratings, solution.cross_conference_games, &params);
        let mut step = audit::next_tuning(&audit, &params, attempts);
        let mut best = TunedRun {
            params,
            solution,
            audit,
        };

        while let TuningStep::Retry(next) = step {
            attempts += 1;
            params = next;
            let solution = solve_two_layer(season, games, eval_week, &params, initial)?;
            let audit = audit::audit(season, &solution.ratings, solution.cross_conference_games, &params);
            step = audit::next_tuning(&audit, &params, attempts);
            if audit.metric < best.audit.metric {
                best = TunedRun {
                    params,
                    solution,
                    audit,
                };
            }
        }

        let status = if !best.audit.needs_tuning(&self.params) {
            if attempts == 0 {
                TuningStatus::NotNeeded
            } else {
                TuningStatus::Reached
            }
        } else {
            warn!(
                "Neutrality metric {:.4} still above {:.4} after {} retries",
                best.audit.metric, self.params.auto_tune_threshold, attempts
            );
            TuningStatus::Exhausted
        };
        Ok((best, attempts, status))
    }
}

/// Initial rating vector from archived values; missing teams get the
/// uniform share before renormalisation.
pub fn seed_vector(season: &Season, seed: &HashMap<String, f64>, total: f64) -> Vec<f64> {
    let uniform = total / season.team_count().max(1) as f64;
    let raw: Vec<f64> = season
        .teams
        .iter()
        .map(|t| match seed.get(&t.id) {
            Some(&v) if v.is_finite() && v > 0.0 => v,
            _ => uniform,
        })
        .collect();
    pagerank::normalize(&raw, total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InputError;
    use crate::season::fixtures::{game, snapshot, team, two_conference_snapshot};
    use approx::assert_relative_eq;

    fn quiet() -> EngineParams {
        EngineParams {
            bootstrap_samples: 0,
            ..EngineParams::default()
        }
    }

    #[test]
    fn final_report_ranks_every_team() {
        let report = RatingEngine::new(quiet())
            .run(&two_conference_snapshot(), &RunOptions::final_season())
            .unwrap();
        assert_eq!(report.week, WeekLabel::Final);
        assert_eq!(report.teams.len(), 6);
        assert_eq!(report.teams[0].rank, 1);
        assert!(report.teams.windows(2).all(|w| w[0].rating >= w[1].rating));
        assert_relative_eq!(report.teams.iter().map(|t| t.rating).sum::<f64>(), 1.0, epsilon = 1e-9);
        assert_eq!(report.conferences.len(), 2);
        assert!(report.bootstrap.is_none());
        assert!(report.teams.iter().all(|t| t.confidence.is_none()));
        assert!(report.teams.iter().all(|t| t.notable_wins.len() <= 3));

        let a = report.team("a").unwrap();
        assert_eq!((a.wins, a.losses, a.ties), (3, 0, 0));
    }

    #[test]
    fn week_mode_ignores_later_games() {
        let report = RatingEngine::new(quiet())
            .run(&two_conference_snapshot(), &RunOptions::week(2))
            .unwrap();
        assert_eq!(report.week, WeekLabel::Week(2));
        assert_eq!(report.games_used, 6);
        let c = report.team("c").unwrap();
        assert_eq!((c.wins, c.losses), (0, 1));
    }

    #[test]
    fn retrospective_only_in_final_mode() {
        let engine = RatingEngine::new(quiet());
        let final_retro = engine
            .run(
                &two_conference_snapshot(),
                &RunOptions {
                    retrospective: true,
                    ..RunOptions::final_season()
                },
            )
            .unwrap();
        assert!(final_retro.teams.iter().all(|t| t.retrospective_rating.is_some()));
        let retro_sum: f64 = final_retro.teams.iter().filter_map(|t| t.retrospective_rating).sum();
        assert_relative_eq!(retro_sum, 1.0, epsilon = 1e-9);

        let weekly = engine
            .run(
                &two_conference_snapshot(),
                &RunOptions {
                    retrospective: true,
                    ..RunOptions::week(3)
                },
            )
            .unwrap();
        assert!(weekly.teams.iter().all(|t| t.retrospective_rating.is_none()));
    }

    #[test]
    fn notable_wins_are_against_top_opponents() {
        let report = RatingEngine::new(quiet())
            .run(&two_conference_snapshot(), &RunOptions::final_season())
            .unwrap();
        let mut ratings: Vec<f64> = report.teams.iter().map(|t| t.rating).collect();
        ratings.sort_by(|a, b| a.total_cmp(b));
        let threshold = bootstrap::percentile(&ratings, 75.0).unwrap();
        for team in &report.teams {
            for win in &team.notable_wins {
                assert!(win.opponent_rating >= threshold);
            }
            assert!(team
                .notable_wins
                .windows(2)
                .all(|w| w[0].opponent_rating >= w[1].opponent_rating));
        }
    }

    #[test]
    fn exhausted_tuning_is_reported_as_fail() {
        let params = EngineParams {
            auto_tune_threshold: 0.0,
            bias_excellent: 0.0,
            bias_pass: 0.0,
            bias_caution: 0.0,
            max_tune_retries: 2,
            ..quiet()
        };
        let report = RatingEngine::new(params)
            .run(&two_conference_snapshot(), &RunOptions::final_season())
            .unwrap();
        assert_eq!(report.neutrality.tuning_status, TuningStatus::Exhausted);
        assert_eq!(report.neutrality.tuning_attempts, 2);
        assert_eq!(report.neutrality.classification, Classification::Fail);
    }

    #[test]
    fn invalid_input_is_fatal() {
        let snap = snapshot(
            vec![team("a", "East"), team("b", "East")],
            vec![game("g1", "a", "ghost", 10, 0, 1)],
        );
        let err = RatingEngine::new(quiet())
            .run(&snap, &RunOptions::final_season())
            .unwrap_err();
        assert!(matches!(err, EngineError::Input(InputError::UnknownTeam { .. })));
    }

    #[test]
    fn seed_vector_fills_missing_teams() {
        let season = Season::from_snapshot(&two_conference_snapshot()).unwrap();
        let mut seed = HashMap::new();
        seed.insert("a".to_string(), 0.5);
        let v = seed_vector(&season, &seed, 1.0);
        assert_relative_eq!(v.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        assert!(v[0] > v[1]);
        assert_relative_eq!(v[1], v[5], epsilon = 1e-12);
    }
}
