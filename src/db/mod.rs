use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::engine::report::RatingReport;

pub mod models;
use models::*;

/// Report archive over a single SQLite connection behind a mutex
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).with_context(|| format!("Failed to open database {}", path))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("database connection mutex poisoned"))
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    // ── Runs ──────────────────────────────────────────────────────────────────

    /// Archive a report: run row, per-team and per-conference rows, and the
    /// full JSON. Returns the run id.
    pub fn store_report(&self, report: &RatingReport) -> Result<i64> {
        let report_json = serde_json::to_string(report)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO rating_runs (
                season, week, generated_at, neutrality_metric, classification,
                outer_passes, converged, team_count, report_json
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
            params![
                report.season,
                report.week.to_string(),
                report.generated_at,
                report.neutrality.metric,
                report.neutrality.classification.as_str(),
                report.convergence.outer_passes as i64,
                report.convergence.outer_converged,
                report.teams.len() as i64,
                report_json,
            ],
        )?;
        let run_id = tx.last_insert_rowid();

        {
            let mut team_stmt = tx.prepare(
                "INSERT INTO team_ratings (
                    run_id, team_id, name, conference, rank, rating, retrospective_rating
                 ) VALUES (?1,?2,?3,?4,?5,?6,?7)",
            )?;
            for team in &report.teams {
                team_stmt.execute(params![
                    run_id,
                    team.team_id,
                    team.name,
                    team.conference,
                    team.rank as i64,
                    team.rating,
                    team.retrospective_rating,
                ])?;
            }

            let mut conf_stmt = tx.prepare(
                "INSERT INTO conference_ratings (
                    run_id, conference, strength, mean_rating, deviation, member_count
                 ) VALUES (?1,?2,?3,?4,?5,?6)",
            )?;
            for conf in &report.conferences {
                conf_stmt.execute(params![
                    run_id,
                    conf.conference,
                    conf.strength,
                    conf.mean_rating,
                    conf.deviation,
                    conf.member_count as i64,
                ])?;
            }
        }

        tx.commit()?;
        debug!("Archived run {} for season {} ({})", run_id, report.season, report.week);
        Ok(run_id)
    }

    /// List archived runs, newest first
    pub fn list_runs(&self, season: Option<i32>, limit: i64) -> Result<Vec<RunSummary>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, season, week, generated_at, neutrality_metric, classification,
                    outer_passes, converged, team_count
             FROM rating_runs
             WHERE (?1 IS NULL OR season = ?1)
             ORDER BY id DESC LIMIT ?2",
        )?;
        let runs = stmt
            .query_map(params![season, limit], map_run)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(runs)
    }

    /// Full report stored for a run
    pub fn load_report(&self, run_id: i64) -> Result<Option<RatingReport>> {
        let conn = self.lock()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT report_json FROM rating_runs WHERE id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(json) => Ok(Some(
                serde_json::from_str(&json).with_context(|| format!("Corrupt report JSON for run {}", run_id))?,
            )),
            None => Ok(None),
        }
    }

    // ── Team ratings ──────────────────────────────────────────────────────────

    /// Ratings of the newest run for a season, keyed by team id (warm start)
    pub fn latest_team_ratings(&self, season: i32) -> Result<HashMap<String, f64>> {
        let conn = self.lock()?;
        let run_id: Option<i64> = conn
            .query_row(
                "SELECT id FROM rating_runs WHERE season = ?1 ORDER BY id DESC LIMIT 1",
                params![season],
                |row| row.get(0),
            )
            .optional()?;
        let Some(run_id) = run_id else {
            return Ok(HashMap::new());
        };
        let mut stmt = conn.prepare("SELECT team_id, rating FROM team_ratings WHERE run_id = ?1")?;
        let ratings = stmt
            .query_map(params![run_id], |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)))?
            .collect::<rusqlite::Result<HashMap<_, _>>>()?;
        Ok(ratings)
    }

    /// One team's rating across every archived run of a season, oldest first
    pub fn team_history(&self, season: i32, team_id: &str) -> Result<Vec<StoredTeamRating>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT t.run_id, t.team_id, t.name, t.conference, t.rank, t.rating, t.retrospective_rating
             FROM team_ratings t JOIN rating_runs r ON r.id = t.run_id
             WHERE r.season = ?1 AND t.team_id = ?2
             ORDER BY t.run_id ASC",
        )?;
        let rows = stmt
            .query_map(params![season, team_id], map_team_rating)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

// ── SQL helpers ────────────────────────────────────────────────────────────────

fn map_run(row: &rusqlite::Row) -> rusqlite::Result<RunSummary> {
    Ok(RunSummary {
        id: row.get(0)?,
        season: row.get(1)?,
        week: row.get(2)?,
        generated_at: row.get(3)?,
        neutrality_metric: row.get(4)?,
        classification: row.get(5)?,
        outer_passes: row.get(6)?,
        converged: row.get(7)?,
        team_count: row.get(8)?,
    })
}

fn map_team_rating(row: &rusqlite::Row) -> rusqlite::Result<StoredTeamRating> {
    Ok(StoredTeamRating {
        run_id: row.get(0)?,
        team_id: row.get(1)?,
        name: row.get(2)?,
        conference: row.get(3)?,
        rank: row.get(4)?,
        rating: row.get(5)?,
        retrospective_rating: row.get(6)?,
    })
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS rating_runs (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    season            INTEGER NOT NULL,
    week              TEXT    NOT NULL,
    generated_at      TEXT    NOT NULL,
    neutrality_metric REAL    NOT NULL,
    classification    TEXT    NOT NULL,
    outer_passes      INTEGER NOT NULL,
    converged         INTEGER NOT NULL,
    team_count        INTEGER NOT NULL,
    report_json       TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS team_ratings (
    id                   INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id               INTEGER NOT NULL,
    team_id              TEXT    NOT NULL,
    name                 TEXT    NOT NULL,
    conference           TEXT    NOT NULL,
    rank                 INTEGER NOT NULL,
    rating               REAL    NOT NULL,
    retrospective_rating REAL,
    FOREIGN KEY (run_id) REFERENCES rating_runs(id)
);

CREATE TABLE IF NOT EXISTS conference_ratings (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id       INTEGER NOT NULL,
    conference   TEXT    NOT NULL,
    strength     REAL    NOT NULL,
    mean_rating  REAL    NOT NULL,
    deviation    REAL    NOT NULL,
    member_count INTEGER NOT NULL,
    FOREIGN KEY (run_id) REFERENCES rating_runs(id)
);

CREATE INDEX IF NOT EXISTS idx_rating_runs_season ON rating_runs(season);
CREATE INDEX IF NOT EXISTS idx_team_ratings_run ON team_ratings(run_id);
CREATE INDEX IF NOT EXISTS idx_team_ratings_team ON team_ratings(team_id);
"#;
