//! Outer convergence controller.
//!
//! Edge weights depend on ratings and ratings depend on edge weights, so the
//! two-layer solve is repeated until the team ratings stop moving:
//!
//!   pass k: ratings(k-1), injection(k-1) → graphs → team + conference
//!           stationary vectors → ratings(k), injection(k)

use tracing::{debug, warn};

use super::graph::{build_graphs, ConferenceInjection};
use super::pagerank::{l1_distance, normalize, stationary, IterationSettings, Stationary, Transition};
use crate::config::EngineParams;
use crate::error::SolveError;
use crate::season::Season;

/// Convergence state of the last power iteration run on one layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerStatus {
    pub iterations: usize,
    pub converged: bool,
    pub residual: f64,
}

impl From<&Stationary> for LayerStatus {
    fn from(s: &Stationary) -> Self {
        Self {
            iterations: s.iterations,
            converged: s.converged,
            residual: s.residual,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OuterTrace {
    /// Two-layer solves performed
    pub passes: usize,
    pub converged: bool,
    /// Team-rating L1 change produced by each pass
    pub deltas: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TwoLayerSolution {
    pub ratings: Vec<f64>,
    pub conference_ratings: Vec<f64>,
    pub team_layer: LayerStatus,
    pub conference_layer: LayerStatus,
    pub outer: OuterTrace,
    pub decisive_games: usize,
    pub cross_conference_games: usize,
}

impl TwoLayerSolution {
    pub fn fully_converged(&self) -> bool {
        self.outer.converged && self.team_layer.converged && self.conference_layer.converged
    }
}

struct PassResult {
    team: Stationary,
    conference: Stationary,
    decisive_games: usize,
    cross_conference_games: usize,
}

pub fn iteration_settings(params: &EngineParams) -> IterationSettings {
    IterationSettings {
        damping: params.damping,
        tolerance: params.tolerance,
        max_iterations: params.max_iterations,
        total: params.rating_total,
    }
}

/// Run the outer loop over a game set.
///
/// `games` indexes into `season.games`. `initial` seeds the first pass; any
/// vector of the wrong length is ignored in favour of the uniform start.
pub fn solve_two_layer(
    season: &Season,
    games: &[usize],
    eval_week: u32,
    params: &EngineParams,
    initial: Option<&[f64]>,
) -> Result<TwoLayerSolution, SolveError> {
    let n = season.team_count();
    let settings = iteration_settings(params);

    let seeded = matches!(initial, Some(init) if init.len() == n);
    let mut ratings = match initial {
        Some(init) if seeded => normalize(init, params.rating_total),
        _ => vec![params.rating_total / n as f64; n],
    };

    let neutral = ConferenceInjection::neutral(season.conference_count());
    let seed_graphs = build_graphs(season, games, &ratings, eval_week, &neutral, params)?;
    if seed_graphs.decisive_games == 0 {
        warn!("No decisive games to rate; every team keeps the uniform share");
        return Ok(uniform_solution(season, params));
    }

    // The conference graph only carries inter-conference arcs, which injection
    // never scales, so a seeded run can recover the seed's injection up front.
    let mut injection = if seeded {
        let conference = stationary(&Transition::from_graph(&seed_graphs.conference), &settings, None, "conference")?;
        ConferenceInjection::from_strengths(&conference.values, params.injection_strength)
    } else {
        neutral
    };
    let mut previous: Option<(Transition, Transition)> = None;
    let mut last: Option<PassResult> = None;
    let mut deltas = Vec::new();
    let mut converged = false;

    for pass in 1..=params.max_outer_iterations {
        let graphs = build_graphs(season, games, &ratings, eval_week, &injection, params)?;
        let team_t = Transition::from_graph(&graphs.team);
        let conf_t = Transition::from_graph(&graphs.conference);

        if let Some((prev_team, prev_conf)) = &previous {
            if team_t.approx_eq(prev_team, params.tolerance) && conf_t.approx_eq(prev_conf, params.tolerance) {
                debug!("Outer pass {}: transitions unchanged, keeping previous fixed point", pass);
                converged = true;
                break;
            }
        }

        let team = stationary(&team_t, &settings, Some(&ratings), "team")?;
        let conference = stationary(&conf_t, &settings, None, "conference")?;
        if !team.converged {
            warn!(
                "Team layer hit the iteration cap ({}) with residual {:.3e}",
                team.iterations, team.residual
            );
        }
        if !conference.converged {
            warn!(
                "Conference layer hit the iteration cap ({}) with residual {:.3e}",
                conference.iterations, conference.residual
            );
        }

        let delta = l1_distance(&team.values, &ratings);
        deltas.push(delta);
        debug!(
            "Outer pass {}: L1 delta {:.3e}, team iterations {}, conference iterations {}",
            pass, delta, team.iterations, conference.iterations
        );

        ratings = team.values.clone();
        injection = ConferenceInjection::from_strengths(&conference.values, params.injection_strength);
        previous = Some((team_t, conf_t));
        last = Some(PassResult {
            team,
            conference,
            decisive_games: graphs.decisive_games,
            cross_conference_games: graphs.cross_conference_games,
        });

        if delta < params.outer_tolerance {
            converged = true;
            break;
        }
    }

    // Only reachable with max_outer_iterations == 0, which config validation rejects.
    let last = last.ok_or(SolveError::NoDecisiveGames)?;
    if !converged {
        warn!(
            "Outer loop stopped at the cap of {} passes without converging",
            params.max_outer_iterations
        );
    }

    Ok(TwoLayerSolution {
        team_layer: LayerStatus::from(&last.team),
        conference_layer: LayerStatus::from(&last.conference),
        outer: OuterTrace {
            passes: deltas.len(),
            converged,
            deltas,
        },
        ratings: last.team.values,
        conference_ratings: last.conference.values,
        decisive_games: last.decisive_games,
        cross_conference_games: last.cross_conference_games,
    })
}

/// Uniform ratings for a game set without a decisive result. The teleporting
/// walk on an arc-free graph has exactly this fixed point; the outer trace is
/// left unconverged so the report flags the run.
fn uniform_solution(season: &Season, params: &EngineParams) -> TwoLayerSolution {
    let n = season.team_count();
    let c = season.conference_count();
    let idle = LayerStatus {
        iterations: 0,
        converged: true,
        residual: 0.0,
    };
    TwoLayerSolution {
        ratings: vec![params.rating_total / n.max(1) as f64; n],
        conference_ratings: vec![params.rating_total / c.max(1) as f64; c],
        team_layer: idle,
        conference_layer: idle,
        outer: OuterTrace {
            passes: 0,
            converged: false,
            deltas: Vec::new(),
        },
        decisive_games: 0,
        cross_conference_games: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::season::fixtures::{game, season, team, two_conference_snapshot};
    use crate::season::Season;
    use approx::assert_relative_eq;

    fn all_games(s: &Season) -> Vec<usize> {
        (0..s.games.len()).collect()
    }

    fn patient() -> EngineParams {
        EngineParams {
            max_outer_iterations: 50,
            ..EngineParams::default()
        }
    }

    #[test]
    fn two_team_single_game_converges_in_one_pass() {
        let s = season(vec![team("a", "East"), team("b", "East")], vec![game("g1", "a", "b", 24, 14, 1)]);
        let sol = solve_two_layer(&s, &all_games(&s), 1, &EngineParams::default(), None).unwrap();

        assert_eq!(sol.outer.passes, 1);
        assert!(sol.outer.converged);
        assert!(sol.ratings[0] > sol.ratings[1]);
        assert_relative_eq!(sol.ratings.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn terminates_within_outer_cap() {
        let s = Season::from_snapshot(&two_conference_snapshot()).unwrap();
        for cap in 1..4 {
            let params = EngineParams {
                max_outer_iterations: cap,
                outer_tolerance: 1e-15,
                ..EngineParams::default()
            };
            let sol = solve_two_layer(&s, &all_games(&s), 4, &params, None).unwrap();
            assert!(sol.outer.passes <= cap);
            assert!(sol.team_layer.iterations <= params.max_iterations);
        }
    }

    #[test]
    fn ratings_and_strengths_are_normalised() {
        let s = Season::from_snapshot(&two_conference_snapshot()).unwrap();
        let sol = solve_two_layer(&s, &all_games(&s), 4, &patient(), None).unwrap();
        assert!(sol.fully_converged());
        assert_relative_eq!(sol.ratings.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(sol.conference_ratings.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        assert_eq!(sol.conference_ratings.len(), 2);
        // East won every decided cross-conference game
        assert!(sol.conference_ratings[0] > sol.conference_ratings[1]);
        assert_eq!(sol.decisive_games, 9);
    }

    #[test]
    fn warm_start_matches_cold_start() {
        let s = Season::from_snapshot(&two_conference_snapshot()).unwrap();
        let params = patient();
        let cold = solve_two_layer(&s, &all_games(&s), 4, &params, None).unwrap();
        let warm = solve_two_layer(&s, &all_games(&s), 4, &params, Some(&cold.ratings)).unwrap();
        assert!(warm.outer.passes <= cold.outer.passes);
        for (a, b) in cold.ratings.iter().zip(&warm.ratings) {
            assert_relative_eq!(*a, *b, epsilon = 1e-5);
        }
    }

    #[test]
    fn all_ties_fall_back_to_uniform() {
        let s = season(
            vec![team("a", "East"), team("b", "East"), team("c", "West")],
            vec![game("g1", "a", "b", 14, 14, 1)],
        );
        let sol = solve_two_layer(&s, &all_games(&s), 1, &EngineParams::default(), None).unwrap();
        assert_eq!(sol.decisive_games, 0);
        assert_eq!(sol.outer.passes, 0);
        assert!(!sol.outer.converged);
        assert!(!sol.fully_converged());
        for r in &sol.ratings {
            assert_relative_eq!(*r, 1.0 / 3.0, epsilon = 1e-12);
        }
        assert_eq!(sol.conference_ratings, vec![0.5, 0.5]);
    }

    #[test]
    fn warm_start_from_fixed_point_settles_immediately() {
        let s = Season::from_snapshot(&two_conference_snapshot()).unwrap();
        let params = patient();
        let cold = solve_two_layer(&s, &all_games(&s), 4, &params, None).unwrap();
        assert!(cold.outer.passes > 1);
        let warm = solve_two_layer(&s, &all_games(&s), 4, &params, Some(&cold.ratings)).unwrap();
        assert!(warm.outer.converged);
        assert!(warm.outer.passes < cold.outer.passes);
        assert!(warm.outer.deltas[0] < cold.outer.deltas[0]);
    }
}
