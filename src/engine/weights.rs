//! Edge weight model: one decisive game becomes one credit edge (loser → winner).
//!
//! The weight is the product of five factors:
//!   margin × venue × recency × postseason × (risk · surprise)
//!
//! Only the risk and surprise factors depend on the current ratings, through
//! the pre-game win probability `p` of the team that actually won. Weights are
//! raw; the solver row-normalises them, so a factor can only shift where a
//! loser's unit of rating mass lands, never the total.

use crate::config::EngineParams;
use crate::season::{IndexedGame, Venue};

/// Win probabilities are kept inside `[P_FLOOR, 1 - P_FLOOR]`.
pub const P_FLOOR: f64 = 0.01;

/// Every factor that went into one edge, kept for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeFactors {
    pub margin: f64,
    pub venue: f64,
    pub recency: f64,
    pub postseason: f64,
    pub win_prob: f64,
    pub risk: f64,
    pub surprise: f64,
}

impl EdgeFactors {
    pub fn weight(&self) -> f64 {
        self.margin * self.venue * self.recency * self.postseason * self.risk * self.surprise
    }
}

/// Directed credit edge in the team graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub from: usize,
    pub to: usize,
    pub weight: f64,
    pub factors: EdgeFactors,
}

/// Rating-dependent inputs for one outer pass.
pub struct WeightContext<'a> {
    pub params: &'a EngineParams,
    /// Ratings rescaled so the average team is 1.0
    pub scaled_ratings: &'a [f64],
    /// Decisive games per team in the current game set (shrinkage)
    pub games_played: &'a [u32],
    pub eval_week: u32,
}

/// `min(log2(margin + 1), cap)`
pub fn margin_factor(margin: u32, cap: f64) -> f64 {
    (margin as f64 + 1.0).log2().min(cap)
}

pub fn venue_factor(venue: Venue, params: &EngineParams) -> f64 {
    match venue {
        Venue::Home => params.venue_home,
        Venue::Away => params.venue_away,
        Venue::Neutral => params.venue_neutral,
    }
}

/// `exp(-lambda * weeks)`; games after the evaluation week count as current.
pub fn recency_factor(game_week: u32, eval_week: u32, lambda: f64) -> f64 {
    let weeks = eval_week.saturating_sub(game_week) as f64;
    (-lambda * weeks).exp()
}

pub fn postseason_factor(postseason: bool, bump: f64) -> f64 {
    if postseason {
        bump
    } else {
        1.0
    }
}

/// Blend a scaled rating toward the average-team prior (1.0):
/// `omega = games / (games + k)`.
pub fn shrunk_rating(scaled: f64, games: u32, k: f64) -> f64 {
    let g = games as f64;
    let omega = if g + k > 0.0 { g / (g + k) } else { 1.0 };
    omega * scaled + (1.0 - omega) * 1.0
}

/// Probability that the side with the rating advantage `gap` wins:
/// `1 / (1 + 10^(-gap / C))`, bounded away from 0 and 1.
pub fn win_probability(gap: f64, c: f64) -> f64 {
    let p = 1.0 / (1.0 + 10f64.powf(-gap / c));
    p.clamp(P_FLOOR, 1.0 - P_FLOOR)
}

/// Risk multiplier keyed on the winner's pre-game probability `p`.
///
/// Underdog branch (`p < 0.5`): `(1 - p) / 0.5`, falling toward 1 as `p` rises.
/// Favorite branch (`p >= 0.5`): `(p / 0.5)^B`, rising with `p`.
pub fn risk_multiplier(p: f64, b: f64) -> f64 {
    if p < 0.5 {
        (1.0 - p) / 0.5
    } else {
        (p / 0.5).powf(b)
    }
}

/// Factor applied to the credit edge. An upset is credited by the multiplier;
/// an expected win is penalised by it, so credit never exceeds 1 for a
/// favorite and never drops below 1 for an underdog.
pub fn risk_credit(p: f64, b: f64) -> f64 {
    let m = risk_multiplier(p, b);
    if p < 0.5 {
        m
    } else {
        1.0 / m
    }
}

/// Winner margin the rating gap predicts, in points.
pub fn predicted_margin(p: f64, margin_scale: f64) -> f64 {
    (2.0 * p - 1.0) * margin_scale
}

/// `min(1 + gamma * z, cap)` where `z` is the margin in excess of the
/// prediction, in units of `margin_scale`, floored at zero.
pub fn surprise_multiplier(margin: u32, p: f64, params: &EngineParams) -> f64 {
    let excess = margin as f64 - predicted_margin(p, params.margin_scale);
    let z = (excess / params.margin_scale).max(0.0);
    (1.0 + params.surprise_gamma * z).min(params.surprise_cap)
}

/// Build the credit edge for one game, or `None` for a tie.
pub fn edge_for_game(game: &IndexedGame, ctx: &WeightContext<'_>) -> Option<Edge> {
    let outcome = game.outcome()?;
    let params = ctx.params;

    let winner_rating = shrunk_rating(
        ctx.scaled_ratings[outcome.winner],
        ctx.games_played[outcome.winner],
        params.shrinkage_k,
    );
    let loser_rating = shrunk_rating(
        ctx.scaled_ratings[outcome.loser],
        ctx.games_played[outcome.loser],
        params.shrinkage_k,
    );
    let p = win_probability(winner_rating - loser_rating, params.win_prob_c);

    let factors = EdgeFactors {
        margin: margin_factor(outcome.margin, params.margin_cap),
        venue: venue_factor(outcome.venue, params),
        recency: recency_factor(game.week, ctx.eval_week, params.recency_lambda),
        postseason: postseason_factor(game.postseason, params.postseason_bump),
        win_prob: p,
        risk: risk_credit(p, params.risk_b),
        surprise: surprise_multiplier(outcome.margin, p, params),
    };

    Some(Edge {
        from: outcome.loser,
        to: outcome.winner,
        weight: factors.weight(),
        factors,
    })
}
