use thiserror::Error;

/// Rejections raised while validating a season snapshot. Any of these stops
/// the run before a report is produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("roster contains no eligible teams")]
    EmptyRoster,
    #[error("team '{0}' appears more than once in the roster")]
    DuplicateTeam(String),
    #[error("team '{team}' has an empty conference")]
    EmptyConference { team: String },
    #[error("game '{0}' appears more than once")]
    DuplicateGame(String),
    #[error("game '{game}' references unknown team '{team}'")]
    UnknownTeam { game: String, team: String },
    #[error("game '{game}' references ineligible team '{team}'")]
    IneligibleTeam { game: String, team: String },
    #[error("game '{game}' has a negative score")]
    NegativeScore { game: String },
    #[error("game '{game}' lists the same team as home and away")]
    SelfMatch { game: String },
    #[error("game '{game}' belongs to season {found}, expected {expected}")]
    SeasonMismatch { game: String, expected: i32, found: i32 },
}

/// Numerical failures inside a single solve.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolveError {
    #[error("game set contains no decisive (non-tied) games")]
    NoDecisiveGames,
    #[error("edge weight for game '{game}' is not finite")]
    NonFiniteWeight { game: String },
    #[error("{layer} rating vector is not finite")]
    NonFiniteRating { layer: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    Input(#[from] InputError),
    #[error("solve failed: {0}")]
    Solve(#[from] SolveError),
}
