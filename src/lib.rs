//! Conference-neutral team strength ratings.
//!
//! Game results become a weighted credit graph (loser → winner). A team-level
//! and a conference-level stationary distribution are solved together and
//! re-solved until the rating-dependent edge weights settle. The result is
//! audited for residual conference bias and optionally bootstrapped for
//! per-team confidence intervals.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod season;

pub use config::{Config, EngineParams};
pub use engine::report::RatingReport;
pub use engine::{RatingEngine, RunMode, RunOptions};
pub use error::{EngineError, InputError, SolveError};
pub use season::{Season, SeasonSnapshot};
