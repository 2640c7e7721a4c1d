use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use tracing::{info, warn};

use conference_rank::db::Database;
use conference_rank::engine::{RatingEngine, RunMode, RunOptions};
use conference_rank::{Config, SeasonSnapshot};

fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();
    config.validate()?;

    let snapshot = SeasonSnapshot::load(&config.input)?;
    info!(
        "Loaded season {}: {} teams, {} games",
        snapshot.season,
        snapshot.teams.len(),
        snapshot.games.len()
    );

    // Open archive
    let db = match &config.database {
        Some(path) => {
            let db = Database::open(path)?;
            info!("Database opened: {}", path);
            Some(db)
        }
        None => None,
    };

    let mode = match config.week {
        Some(week) => RunMode::Week(week),
        None => RunMode::Final,
    };

    let mut options = RunOptions {
        mode: Some(mode),
        retrospective: config.retrospective,
        initial_ratings: None,
    };
    if config.warm_start {
        match &db {
            Some(db) => {
                let seed = db.latest_team_ratings(snapshot.season)?;
                if seed.is_empty() {
                    info!("No archived ratings for season {}, starting cold", snapshot.season);
                } else {
                    info!("Warm start from {} archived team ratings", seed.len());
                    options.initial_ratings = Some(seed);
                }
            }
            None => warn!("--warm-start needs --database; starting cold"),
        }
    }

    let engine = RatingEngine::new(config.engine_params());
    let report = engine.run(&snapshot, &options)?;

    info!(
        "Neutrality metric {:.4} ({}), {} outer passes",
        report.neutrality.metric,
        report.neutrality.classification.as_str(),
        report.convergence.outer_passes
    );
    for team in report.teams.iter().take(10) {
        info!("#{:<3} {:<28} {:<16} {:.5}", team.rank, team.name, team.conference, team.rating);
    }

    let json = serde_json::to_string_pretty(&report)?;
    match &config.output {
        Some(path) => {
            fs::write(path, &json).with_context(|| format!("Failed to write report to {}", path))?;
            info!("Report written to {}", path);
        }
        None => println!("{}", json),
    }

    if let Some(db) = &db {
        let run_id = db.store_report(&report)?;
        info!("Report archived as run {}", run_id);
    }

    Ok(())
}
