use clap::Parser;
use serde::{Deserialize, Serialize};

/// Conference-neutral team rating engine
#[derive(Parser, Debug, Clone)]
#[command(name = "conference-rank", version, about)]
pub struct Config {
    /// Season snapshot (roster + games) as JSON
    #[arg(long, env = "SEASON_INPUT")]
    pub input: String,

    /// Write the rating report here instead of stdout
    #[arg(long, env = "REPORT_OUTPUT")]
    pub output: Option<String>,

    /// Rate the season as of this week (games after it are ignored)
    #[arg(long, env = "RATING_WEEK", conflicts_with = "final_mode")]
    pub week: Option<u32>,

    /// Rate the full season ("final" report)
    #[arg(long = "final", env = "RATING_FINAL", default_value = "false")]
    pub final_mode: bool,

    /// Also compute the hindsight (retrospective) rating; final mode only
    #[arg(long, env = "RETROSPECTIVE", default_value = "false")]
    pub retrospective: bool,

    /// SQLite archive for produced reports
    #[arg(long, env = "DATABASE_PATH")]
    pub database: Option<String>,

    /// Seed the outer loop with the latest archived ratings for the season
    #[arg(long, env = "WARM_START", default_value = "false")]
    pub warm_start: bool,

    // ── Edge weight model ────────────────────────────────────────────────────

    /// Upper bound on the log2 margin factor
    #[arg(long, env = "MARGIN_CAP", default_value = "5.0")]
    pub margin_cap: f64,

    /// Venue factor when the winner played at home
    #[arg(long, env = "VENUE_HOME", default_value = "1.1")]
    pub venue_home: f64,

    /// Venue factor when the winner played away
    #[arg(long, env = "VENUE_AWAY", default_value = "0.9")]
    pub venue_away: f64,

    /// Venue factor for neutral-site games
    #[arg(long, env = "VENUE_NEUTRAL", default_value = "1.0")]
    pub venue_neutral: f64,

    /// Recency decay per week (exp(-lambda * weeks))
    #[arg(long, env = "RECENCY_LAMBDA", default_value = "0.05")]
    pub recency_lambda: f64,

    /// Shrinkage constant k: omega = games / (games + k)
    #[arg(long, env = "SHRINKAGE_K", default_value = "4.0")]
    pub shrinkage_k: f64,

    /// Logistic scale C for pre-game win probability
    #[arg(long, env = "WIN_PROB_C", default_value = "0.40")]
    pub win_prob_c: f64,

    /// Risk elasticity B for expected wins
    #[arg(long, env = "RISK_B", default_value = "1.0")]
    pub risk_b: f64,

    /// Surprise gain gamma
    #[arg(long, env = "SURPRISE_GAMMA", default_value = "0.75")]
    pub surprise_gamma: f64,

    /// Upper bound on the surprise multiplier
    #[arg(long, env = "SURPRISE_CAP", default_value = "3.0")]
    pub surprise_cap: f64,

    /// Points per unit of standardized margin surprise
    #[arg(long, env = "MARGIN_SCALE", default_value = "14.0")]
    pub margin_scale: f64,

    /// Multiplier applied to postseason games
    #[arg(long, env = "POSTSEASON_BUMP", default_value = "1.10")]
    pub postseason_bump: f64,

    /// Exponent on relative conference strength for intra-conference edges
    #[arg(long, env = "INJECTION_STRENGTH", default_value = "0.5")]
    pub injection_strength: f64,

    // ── Solvers ──────────────────────────────────────────────────────────────

    /// PageRank damping factor
    #[arg(long, env = "DAMPING", default_value = "0.85")]
    pub damping: f64,

    /// L1 tolerance for the power iteration
    #[arg(long, env = "TOLERANCE", default_value = "1e-9")]
    pub tolerance: f64,

    /// Power iteration cap
    #[arg(long, env = "MAX_ITERATIONS", default_value = "1000")]
    pub max_iterations: usize,

    /// L1 tolerance between outer passes
    #[arg(long, env = "OUTER_TOLERANCE", default_value = "1e-6")]
    pub outer_tolerance: f64,

    /// Outer pass cap
    #[arg(long, env = "MAX_OUTER_ITERATIONS", default_value = "6")]
    pub max_outer_iterations: usize,

    /// Total rating mass each rating vector is normalised to
    #[arg(long, env = "RATING_TOTAL", default_value = "1.0")]
    pub rating_total: f64,

    // ── Neutrality audit ─────────────────────────────────────────────────────

    /// Upper bound of the "excellent" band
    #[arg(long, env = "BIAS_EXCELLENT", default_value = "0.04")]
    pub bias_excellent: f64,

    /// Upper bound of the "pass" band
    #[arg(long, env = "BIAS_PASS", default_value = "0.06")]
    pub bias_pass: f64,

    /// Upper bound of the "caution" band
    #[arg(long, env = "BIAS_CAUTION", default_value = "0.08")]
    pub bias_caution: f64,

    /// Re-tune parameters when the neutrality metric exceeds this
    #[arg(long, env = "AUTO_TUNE_THRESHOLD", default_value = "0.06")]
    pub auto_tune_threshold: f64,

    /// Maximum number of re-tuning re-runs
    #[arg(long, env = "MAX_TUNE_RETRIES", default_value = "3")]
    pub max_tune_retries: usize,

    // ── Bootstrap ────────────────────────────────────────────────────────────

    /// Number of bootstrap resamples (0 disables)
    #[arg(long, env = "BOOTSTRAP_SAMPLES", default_value = "25")]
    pub bootstrap_samples: usize,

    /// Base RNG seed for resampling
    #[arg(long, env = "BOOTSTRAP_SEED", default_value = "42")]
    pub bootstrap_seed: u64,

    /// Worker threads for the bootstrap pool (0 = available cores)
    #[arg(long, env = "BOOTSTRAP_THREADS", default_value = "0")]
    pub bootstrap_threads: usize,

    /// Lower percentile of the confidence interval
    #[arg(long, env = "CI_LOW_PERCENTILE", default_value = "2.5")]
    pub ci_low_percentile: f64,

    /// Upper percentile of the confidence interval
    #[arg(long, env = "CI_HIGH_PERCENTILE", default_value = "97.5")]
    pub ci_high_percentile: f64,

    // ── Report ───────────────────────────────────────────────────────────────

    /// Opponent rating percentile that makes a win "notable"
    #[arg(long, env = "NOTABLE_WIN_PERCENTILE", default_value = "75.0")]
    pub notable_win_percentile: f64,

    /// Notable wins listed per team
    #[arg(long, env = "MAX_NOTABLE_WINS", default_value = "3")]
    pub max_notable_wins: usize,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.retrospective && self.week.is_some() {
            anyhow::bail!("--retrospective is only available in final mode");
        }
        if !self.final_mode && self.week.is_none() {
            anyhow::bail!("Either --week N or --final is required");
        }
        self.engine_params().validate()
    }

    /// Immutable parameter set handed to every engine call.
    pub fn engine_params(&self) -> EngineParams {
        EngineParams {
            margin_cap: self.margin_cap,
            venue_home: self.venue_home,
            venue_away: self.venue_away,
            venue_neutral: self.venue_neutral,
            recency_lambda: self.recency_lambda,
            shrinkage_k: self.shrinkage_k,
            win_prob_c: self.win_prob_c,
            risk_b: self.risk_b,
            surprise_gamma: self.surprise_gamma,
            surprise_cap: self.surprise_cap,
            margin_scale: self.margin_scale,
            postseason_bump: self.postseason_bump,
            injection_strength: self.injection_strength,
            damping: self.damping,
            tolerance: self.tolerance,
            max_iterations: self.max_iterations,
            outer_tolerance: self.outer_tolerance,
            max_outer_iterations: self.max_outer_iterations,
            rating_total: self.rating_total,
            bias_excellent: self.bias_excellent,
            bias_pass: self.bias_pass,
            bias_caution: self.bias_caution,
            auto_tune_threshold: self.auto_tune_threshold,
            max_tune_retries: self.max_tune_retries,
            bootstrap_samples: self.bootstrap_samples,
            bootstrap_seed: self.bootstrap_seed,
            bootstrap_threads: self.bootstrap_threads,
            ci_low_percentile: self.ci_low_percentile,
            ci_high_percentile: self.ci_high_percentile,
            notable_win_percentile: self.notable_win_percentile,
            max_notable_wins: self.max_notable_wins,
        }
    }
}

/// Every tunable of the engine as one plain value. Bootstrap samples and
/// auto-tune retries each carry their own copy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineParams {
    pub margin_cap: f64,
    pub venue_home: f64,
    pub venue_away: f64,
    pub venue_neutral: f64,
    pub recency_lambda: f64,
    pub shrinkage_k: f64,
    pub win_prob_c: f64,
    pub risk_b: f64,
    pub surprise_gamma: f64,
    pub surprise_cap: f64,
    pub margin_scale: f64,
    pub postseason_bump: f64,
    pub injection_strength: f64,
    pub damping: f64,
    pub tolerance: f64,
    pub max_iterations: usize,
    pub outer_tolerance: f64,
    pub max_outer_iterations: usize,
    pub rating_total: f64,
    pub bias_excellent: f64,
    pub bias_pass: f64,
    pub bias_caution: f64,
    pub auto_tune_threshold: f64,
    pub max_tune_retries: usize,
    pub bootstrap_samples: usize,
    pub bootstrap_seed: u64,
    pub bootstrap_threads: usize,
    pub ci_low_percentile: f64,
    pub ci_high_percentile: f64,
    pub notable_win_percentile: f64,
    pub max_notable_wins: usize,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            margin_cap: 5.0,
            venue_home: 1.1,
            venue_away: 0.9,
            venue_neutral: 1.0,
            recency_lambda: 0.05,
            shrinkage_k: 4.0,
            win_prob_c: 0.40,
            risk_b: 1.0,
            surprise_gamma: 0.75,
            surprise_cap: 3.0,
            margin_scale: 14.0,
            postseason_bump: 1.10,
            injection_strength: 0.5,
            damping: 0.85,
            tolerance: 1e-9,
            max_iterations: 1000,
            outer_tolerance: 1e-6,
            max_outer_iterations: 6,
            rating_total: 1.0,
            bias_excellent: 0.04,
            bias_pass: 0.06,
            bias_caution: 0.08,
            auto_tune_threshold: 0.06,
            max_tune_retries: 3,
            bootstrap_samples: 25,
            bootstrap_seed: 42,
            bootstrap_threads: 0,
            ci_low_percentile: 2.5,
            ci_high_percentile: 97.5,
            notable_win_percentile: 75.0,
            max_notable_wins: 3,
        }
    }
}

impl EngineParams {
    pub fn validate(&self) -> anyhow::Result<()> {
        let non_negative = [
            ("margin_cap", self.margin_cap),
            ("venue_home", self.venue_home),
            ("venue_away", self.venue_away),
            ("venue_neutral", self.venue_neutral),
            ("recency_lambda", self.recency_lambda),
            ("shrinkage_k", self.shrinkage_k),
            ("risk_b", self.risk_b),
            ("surprise_gamma", self.surprise_gamma),
            ("postseason_bump", self.postseason_bump),
            ("injection_strength", self.injection_strength),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                anyhow::bail!("{name} must be a finite non-negative number");
            }
        }
        if !(self.win_prob_c > 0.0) || !(self.margin_scale > 0.0) {
            anyhow::bail!("win_prob_c and margin_scale must be positive");
        }
        if !(self.surprise_cap >= 1.0) {
            anyhow::bail!("surprise_cap must be at least 1.0");
        }
        if !(0.0..1.0).contains(&self.damping) {
            anyhow::bail!("damping must be in [0.0, 1.0)");
        }
        if !(self.tolerance > 0.0) || !(self.outer_tolerance > 0.0) {
            anyhow::bail!("tolerances must be positive");
        }
        if self.max_iterations == 0 || self.max_outer_iterations == 0 {
            anyhow::bail!("iteration caps must be at least 1");
        }
        if !(self.rating_total > 0.0) || !self.rating_total.is_finite() {
            anyhow::bail!("rating_total must be positive");
        }
        if !(self.bias_excellent <= self.bias_pass && self.bias_pass <= self.bias_caution) {
            anyhow::bail!("bias bands must satisfy excellent <= pass <= caution");
        }
        if !(0.0..=100.0).contains(&self.ci_low_percentile)
            || !(0.0..=100.0).contains(&self.ci_high_percentile)
            || self.ci_low_percentile > self.ci_high_percentile
        {
            anyhow::bail!("confidence percentiles must satisfy 0 <= low <= high <= 100");
        }
        if !(0.0..=100.0).contains(&self.notable_win_percentile) {
            anyhow::bail!("notable_win_percentile must be between 0 and 100");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut full = vec!["conference-rank", "--input", "season.json"];
        full.extend_from_slice(args);
        Config::try_parse_from(full).expect("args should parse")
    }

    #[test]
    fn cli_defaults_match_engine_defaults() {
        let config = parse(&["--final"]);
        assert_eq!(config.engine_params(), EngineParams::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn every_parameter_is_overridable() {
        let config = parse(&["--week", "7", "--damping", "0.9", "--recency-lambda", "0.02", "--bootstrap-samples", "0"]);
        let params = config.engine_params();
        assert_eq!(params.damping, 0.9);
        assert_eq!(params.recency_lambda, 0.02);
        assert_eq!(params.bootstrap_samples, 0);
        assert_eq!(config.week, Some(7));
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(parse(&[]).validate().is_err());
        assert!(parse(&["--week", "3", "--retrospective"]).validate().is_err());
        assert!(parse(&["--final", "--damping", "1.0"]).validate().is_err());
        assert!(parse(&["--final", "--bias-pass", "0.01"]).validate().is_err());
        assert!(parse(&["--final", "--ci-low-percentile", "90", "--ci-high-percentile", "10"])
            .validate()
            .is_err());
    }
}
