//! Bootstrap confidence intervals.
//!
//! Each sample redraws the game list with replacement and re-runs the full
//! outer solve. Samples run on a bounded rayon pool; every sample owns its
//! RNG (seeded from the base seed plus the sample index) and its own copy of
//! the parameters, so the result is independent of scheduling.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::solver::solve_two_layer;
use crate::config::EngineParams;
use crate::error::SolveError;
use crate::season::Season;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConfidenceBound {
    Interval {
        low: f64,
        median: f64,
        high: f64,
        /// Samples in which the team appeared
        samples: usize,
    },
    /// The team never appeared in any successful resample
    Absent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleFailure {
    pub sample: usize,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapSummary {
    pub requested: usize,
    pub succeeded: usize,
    pub failures: Vec<SampleFailure>,
    /// Indexed like `season.teams`
    pub bounds: Vec<ConfidenceBound>,
}

struct SampleOutcome {
    ratings: Vec<f64>,
    present: Vec<bool>,
}

/// Linear-interpolated percentile of an ascending slice. `pct` is 0..=100.
pub fn percentile(sorted: &[f64], pct: f64) -> Option<f64> {
    match sorted.len() {
        0 => None,
        1 => Some(sorted[0]),
        len => {
            let rank = (pct.clamp(0.0, 100.0) / 100.0) * (len - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f64;
            Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
        }
    }
}

/// Draw `games.len()` entries from `games` with replacement.
pub fn resample(games: &[usize], rng: &mut StdRng) -> Vec<usize> {
    (0..games.len()).map(|_| games[rng.gen_range(0..games.len())]).collect()
}

fn pool_size(requested: usize) -> usize {
    if requested > 0 {
        return requested;
    }
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn with_bootstrap_pool<T>(threads: usize, action: impl FnOnce() -> T + Send) -> T
where
    T: Send,
{
    match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
        Ok(pool) => pool.install(action),
        Err(e) => {
            warn!("Failed to build bootstrap pool ({}), using the global pool", e);
            action()
        }
    }
}

fn run_sample(
    season: &Season,
    games: &[usize],
    eval_week: u32,
    params: &EngineParams,
    sample: usize,
) -> Result<SampleOutcome, String> {
    let mut rng = StdRng::seed_from_u64(params.bootstrap_seed.wrapping_add(sample as u64));
    let picks = resample(games, &mut rng);

    let mut present = vec![false; season.team_count()];
    for &gi in &picks {
        let game = &season.games[gi];
        present[game.home] = true;
        present[game.away] = true;
    }

    let solution = solve_two_layer(season, &picks, eval_week, params, None).map_err(|e| e.to_string())?;
    if solution.decisive_games == 0 {
        return Err(SolveError::NoDecisiveGames.to_string());
    }
    Ok(SampleOutcome {
        ratings: solution.ratings,
        present,
    })
}

/// Estimate per-team confidence bounds from `params.bootstrap_samples` resamples.
pub fn estimate(season: &Season, games: &[usize], eval_week: u32, params: &EngineParams) -> BootstrapSummary {
    let requested = params.bootstrap_samples;
    let n = season.team_count();

    let results: Vec<Result<SampleOutcome, String>> = if games.is_empty() {
        (0..requested).map(|_| Err("no games to resample".to_string())).collect()
    } else {
        with_bootstrap_pool(pool_size(params.bootstrap_threads), || {
            (0..requested)
                .into_par_iter()
                .map(|i| run_sample(season, games, eval_week, params, i))
                .collect()
        })
    };

    let mut per_team: Vec<Vec<f64>> = vec![Vec::new(); n];
    let mut failures = Vec::new();
    let mut succeeded = 0;
    for (sample, result) in results.into_iter().enumerate() {
        match result {
            Ok(outcome) => {
                succeeded += 1;
                for team in 0..n {
                    if outcome.present[team] {
                        per_team[team].push(outcome.ratings[team]);
                    }
                }
            }
            Err(error) => {
                warn!("Bootstrap sample {} failed: {}", sample, error);
                failures.push(SampleFailure { sample, error });
            }
        }
    }

    let bounds: Vec<ConfidenceBound> = per_team
        .into_iter()
        .map(|mut values| {
            values.sort_by(|a, b| a.total_cmp(b));
            match (
                percentile(&values, params.ci_low_percentile),
                percentile(&values, 50.0),
                percentile(&values, params.ci_high_percentile),
            ) {
                (Some(low), Some(median), Some(high)) => ConfidenceBound::Interval {
                    low,
                    median,
                    high,
                    samples: values.len(),
                },
                _ => ConfidenceBound::Absent,
            }
        })
        .collect();

    let absent = bounds.iter().filter(|b| **b == ConfidenceBound::Absent).count();
    info!(
        "Bootstrap: {}/{} samples succeeded, {} teams without an interval",
        succeeded, requested, absent
    );

    BootstrapSummary {
        requested,
        succeeded,
        failures,
        bounds,
    }
}
