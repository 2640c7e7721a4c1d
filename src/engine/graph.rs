//! Team and conference credit graphs.
//!
//! Both graphs are weighted digraphs whose arcs run from loser to winner.
//! Parallel arcs are summed, so a graph holds at most one arc per ordered pair.

use std::collections::BTreeMap;
use tracing::debug;

use super::weights::{edge_for_game, WeightContext};
use crate::config::EngineParams;
use crate::error::SolveError;
use crate::season::Season;

/// Aggregated weighted digraph over `n` nodes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WeightedDigraph {
    n: usize,
    // Keyed (from, to); BTreeMap keeps iteration order deterministic.
    arcs: BTreeMap<(usize, usize), f64>,
}

impl WeightedDigraph {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            arcs: BTreeMap::new(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.n
    }

    pub fn arc_count(&self) -> usize {
        self.arcs.len()
    }

    pub fn add_arc(&mut self, from: usize, to: usize, weight: f64) {
        *self.arcs.entry((from, to)).or_insert(0.0) += weight;
    }

    pub fn weight(&self, from: usize, to: usize) -> f64 {
        self.arcs.get(&(from, to)).copied().unwrap_or(0.0)
    }

    /// Total outgoing weight of every node.
    pub fn out_weights(&self) -> Vec<f64> {
        let mut out = vec![0.0; self.n];
        for (&(from, _), &w) in &self.arcs {
            out[from] += w;
        }
        out
    }

    pub fn arcs(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.arcs.iter().map(|(&(from, to), &w)| (from, to, w))
    }
}

/// Per-conference factor applied to intra-conference edges.
#[derive(Debug, Clone, PartialEq)]
pub struct ConferenceInjection {
    factors: Vec<f64>,
}

impl ConferenceInjection {
    /// No injection: every factor is 1.
    pub fn neutral(conferences: usize) -> Self {
        Self {
            factors: vec![1.0; conferences],
        }
    }

    /// `(S_c / mean(S))^exponent`. Conferences with no strength keep factor 1.
    pub fn from_strengths(strengths: &[f64], exponent: f64) -> Self {
        if strengths.is_empty() {
            return Self::neutral(0);
        }
        let mean = strengths.iter().sum::<f64>() / strengths.len() as f64;
        if !(mean > 0.0) {
            return Self::neutral(strengths.len());
        }
        let factors = strengths
            .iter()
            .map(|&s| if s > 0.0 { (s / mean).powf(exponent) } else { 1.0 })
            .collect();
        Self { factors }
    }

    pub fn factor(&self, conference: usize) -> f64 {
        self.factors.get(conference).copied().unwrap_or(1.0)
    }
}

/// Both graphs built from one game set plus the counts the auditor needs.
#[derive(Debug, Clone)]
pub struct SeasonGraphs {
    pub team: WeightedDigraph,
    pub conference: WeightedDigraph,
    pub decisive_games: usize,
    pub cross_conference_games: usize,
}

/// Decisive games per team within the given game set.
pub fn games_played(season: &Season, games: &[usize]) -> Vec<u32> {
    let mut played = vec![0u32; season.team_count()];
    for &gi in games {
        if let Some(outcome) = season.games[gi].outcome() {
            played[outcome.winner] += 1;
            played[outcome.loser] += 1;
        }
    }
    played
}

/// Ratings rescaled so that the average team sits at 1.0.
pub fn scale_to_unit_mean(ratings: &[f64]) -> Vec<f64> {
    let total: f64 = ratings.iter().sum();
    if ratings.is_empty() || !(total > 0.0) {
        return vec![1.0; ratings.len()];
    }
    let n = ratings.len() as f64;
    ratings.iter().map(|r| r * n / total).collect()
}

/// Build the team and conference graphs for a game set.
///
/// `games` indexes into `season.games` and may repeat entries (bootstrap
/// resamples). Ties contribute nothing. Intra-conference edges are scaled by
/// the injection factor of their conference; the conference graph receives
/// only inter-conference games.
pub fn build_graphs(
    season: &Season,
    games: &[usize],
    ratings: &[f64],
    eval_week: u32,
    injection: &ConferenceInjection,
    params: &EngineParams,
) -> Result<SeasonGraphs, SolveError> {
    let scaled = scale_to_unit_mean(ratings);
    let played = games_played(season, games);
    let ctx = WeightContext {
        params,
        scaled_ratings: &scaled,
        games_played: &played,
        eval_week,
    };

    let mut team = WeightedDigraph::new(season.team_count());
    let mut conference = WeightedDigraph::new(season.conference_count());
    let mut decisive_games = 0;
    let mut cross_conference_games = 0;

    for &gi in games {
        let game = &season.games[gi];
        let Some(edge) = edge_for_game(game, &ctx) else {
            continue;
        };
        if !edge.weight.is_finite() || edge.weight < 0.0 {
            return Err(SolveError::NonFiniteWeight {
                game: game.id.clone(),
            });
        }
        decisive_games += 1;

        let from_conf = season.conference_of(edge.from);
        let to_conf = season.conference_of(edge.to);
        if from_conf == to_conf {
            team.add_arc(edge.from, edge.to, edge.weight * injection.factor(from_conf));
        } else {
            cross_conference_games += 1;
            team.add_arc(edge.from, edge.to, edge.weight);
            conference.add_arc(from_conf, to_conf, edge.weight);
        }
    }

    debug!(
        "Built graphs: {} team arcs, {} conference arcs from {} decisive games ({} cross-conference)",
        team.arc_count(),
        conference.arc_count(),
        decisive_games,
        cross_conference_games
    );

    Ok(SeasonGraphs {
        team,
        conference,
        decisive_games,
        cross_conference_games,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::season::fixtures::{game, season as build_season, team};
    use approx::assert_relative_eq;

    fn season() -> Season {
        build_season(
            vec![team("a", "East"), team("b", "East"), team("c", "West"), team("d", "West")],
            vec![
                game("g1", "a", "b", 21, 14, 1),
                game("g2", "a", "b", 28, 7, 1),
                game("g3", "c", "a", 10, 3, 1),
                game("g4", "d", "c", 14, 14, 1),
            ],
        )
    }

    #[test]
    fn aggregates_parallel_arcs_and_skips_ties() {
        let s = season();
        let all: Vec<usize> = (0..s.games.len()).collect();
        let params = EngineParams::default();
        let graphs = build_graphs(&s, &all, &[0.25; 4], 1, &ConferenceInjection::neutral(2), &params).unwrap();

        assert_eq!(graphs.decisive_games, 3);
        assert_eq!(graphs.cross_conference_games, 1);
        // b → a twice, a → c once
        assert_eq!(graphs.team.arc_count(), 2);
        assert!(graphs.team.weight(1, 0) > 0.0);
        assert!(graphs.team.weight(0, 2) > 0.0);
        assert_eq!(graphs.team.weight(0, 1), 0.0);
        // East (0) lost to West (1)
        assert_eq!(graphs.conference.arc_count(), 1);
        assert_relative_eq!(graphs.conference.weight(0, 1), graphs.team.weight(0, 2), epsilon = 1e-12);
    }

    #[test]
    fn injection_scales_only_intra_conference_arcs() {
        let s = season();
        let all: Vec<usize> = (0..s.games.len()).collect();
        let params = EngineParams::default();
        let plain = build_graphs(&s, &all, &[0.25; 4], 1, &ConferenceInjection::neutral(2), &params).unwrap();
        let injection = ConferenceInjection::from_strengths(&[0.8, 0.2], 0.5);
        let injected = build_graphs(&s, &all, &[0.25; 4], 1, &injection, &params).unwrap();

        let factor = (0.8f64 / 0.5).sqrt();
        assert_relative_eq!(injection.factor(0), factor, epsilon = 1e-12);
        assert_relative_eq!(injected.team.weight(1, 0), plain.team.weight(1, 0) * factor, epsilon = 1e-12);
        assert_relative_eq!(injected.team.weight(0, 2), plain.team.weight(0, 2), epsilon = 1e-12);
    }

    #[test]
    fn injection_ignores_degenerate_strengths() {
        let neutral = ConferenceInjection::from_strengths(&[0.0, 0.0], 0.5);
        assert_eq!(neutral.factor(0), 1.0);
        assert_eq!(neutral.factor(1), 1.0);
        assert_eq!(ConferenceInjection::from_strengths(&[], 0.5).factor(3), 1.0);
    }

    #[test]
    fn repeated_indices_count_twice() {
        let s = season();
        let params = EngineParams::default();
        let once = build_graphs(&s, &[0], &[0.25; 4], 1, &ConferenceInjection::neutral(2), &params).unwrap();
        let twice = build_graphs(&s, &[0, 0], &[0.25; 4], 1, &ConferenceInjection::neutral(2), &params).unwrap();
        assert_eq!(twice.decisive_games, 2);
        // Equal ratings give p = 0.5 either way, so the duplicate simply doubles the arc.
        assert_relative_eq!(twice.team.weight(1, 0), 2.0 * once.team.weight(1, 0), epsilon = 1e-12);
    }

    #[test]
    fn scaling_to_unit_mean() {
        let scaled = scale_to_unit_mean(&[0.1, 0.3, 0.6]);
        assert_relative_eq!(scaled.iter().sum::<f64>(), 3.0, epsilon = 1e-12);
        assert_relative_eq!(scaled[2], 1.8, epsilon = 1e-12);
        assert_eq!(scale_to_unit_mean(&[0.0, 0.0]), vec![1.0, 1.0]);
    }
}
