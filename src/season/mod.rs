use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::error::InputError;

pub mod models;
pub use models::*;

#[cfg(test)]
pub(crate) mod fixtures;

impl SeasonSnapshot {
    /// Read a snapshot from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read season file {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("Failed to parse season file {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Validated, index-resolved view of a season. Membership is fixed for the
/// lifetime of the value.
#[derive(Debug, Clone)]
pub struct Season {
    pub season: i32,
    pub teams: Vec<Team>,
    pub conferences: Vec<Conference>,
    team_conference: Vec<usize>,
    pub games: Vec<IndexedGame>,
}

impl Season {
    /// Validate a snapshot and resolve every team reference. Fails on the
    /// first malformed record; nothing is skipped silently.
    pub fn from_snapshot(snapshot: &SeasonSnapshot) -> Result<Self, InputError> {
        let mut seen_ids: HashSet<&str> = HashSet::new();
        let mut ineligible: HashSet<&str> = HashSet::new();
        let mut teams: Vec<Team> = Vec::new();

        for team in &snapshot.teams {
            if !seen_ids.insert(team.id.as_str()) {
                return Err(InputError::DuplicateTeam(team.id.clone()));
            }
            if team.conference.trim().is_empty() {
                return Err(InputError::EmptyConference {
                    team: team.id.clone(),
                });
            }
            if team.eligible {
                teams.push(team.clone());
            } else {
                ineligible.insert(team.id.as_str());
            }
        }
        if teams.is_empty() {
            return Err(InputError::EmptyRoster);
        }

        let index: HashMap<&str, usize> = teams
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.as_str(), i))
            .collect();

        // Sorted by name so conference indices are stable across runs.
        let mut by_name: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (i, team) in teams.iter().enumerate() {
            by_name.entry(team.conference.as_str()).or_default().push(i);
        }
        let mut team_conference = vec![0usize; teams.len()];
        let conferences: Vec<Conference> = by_name
            .into_iter()
            .enumerate()
            .map(|(ci, (name, members))| {
                for &m in &members {
                    team_conference[m] = ci;
                }
                Conference {
                    name: name.to_string(),
                    members,
                }
            })
            .collect();

        let resolve = |game: &Game, team: &str| -> Result<usize, InputError> {
            match index.get(team) {
                Some(&i) => Ok(i),
                None if ineligible.contains(team) => Err(InputError::IneligibleTeam {
                    game: game.id.clone(),
                    team: team.to_string(),
                }),
                None => Err(InputError::UnknownTeam {
                    game: game.id.clone(),
                    team: team.to_string(),
                }),
            }
        };

        let mut seen_games: HashSet<&str> = HashSet::new();
        let mut games = Vec::with_capacity(snapshot.games.len());
        for game in &snapshot.games {
            if !seen_games.insert(game.id.as_str()) {
                return Err(InputError::DuplicateGame(game.id.clone()));
            }
            if game.season != snapshot.season {
                return Err(InputError::SeasonMismatch {
                    game: game.id.clone(),
                    expected: snapshot.season,
                    found: game.season,
                });
            }
            let home = resolve(game, &game.home_team)?;
            let away = resolve(game, &game.away_team)?;
            if home == away {
                return Err(InputError::SelfMatch {
                    game: game.id.clone(),
                });
            }
            if game.home_score < 0 || game.away_score < 0 {
                return Err(InputError::NegativeScore {
                    game: game.id.clone(),
                });
            }
            games.push(IndexedGame {
                id: game.id.clone(),
                home,
                away,
                home_score: game.home_score as u32,
                away_score: game.away_score as u32,
                week: game.week,
                neutral_site: game.neutral_site,
                postseason: game.postseason,
                kickoff: game.kickoff,
            });
        }

        info!(
            "Season {} validated: {} teams, {} conferences, {} games",
            snapshot.season,
            teams.len(),
            conferences.len(),
            games.len()
        );

        Ok(Season {
            season: snapshot.season,
            teams,
            conferences,
            team_conference,
            games,
        })
    }

    pub fn team_count(&self) -> usize {
        self.teams.len()
    }

    pub fn conference_count(&self) -> usize {
        self.conferences.len()
    }

    /// Conference index of a roster team.
    pub fn conference_of(&self, team: usize) -> usize {
        self.team_conference[team]
    }

    /// Latest week among the games, used as the evaluation point in final mode.
    pub fn latest_week(&self) -> u32 {
        self.games.iter().map(|g| g.week).max().unwrap_or(0)
    }

    /// Copy of the season keeping only games played on or before `week`.
    pub fn through_week(&self, week: u32) -> Season {
        let games: Vec<IndexedGame> = self
            .games
            .iter()
            .filter(|g| g.week <= week)
            .cloned()
            .collect();
        debug!(
            "Restricted season {} to week {}: {} of {} games",
            self.season,
            week,
            games.len(),
            self.games.len()
        );
        Season {
            season: self.season,
            teams: self.teams.clone(),
            conferences: self.conferences.clone(),
            team_conference: self.team_conference.clone(),
            games,
        }
    }
}
