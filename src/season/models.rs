use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A roster entry as supplied by the classification feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: String,
    pub conference: String,
    /// Ineligible teams stay in the snapshot for reference but may not appear in games
    #[serde(default = "default_eligible")]
    pub eligible: bool,
}

fn default_eligible() -> bool {
    true
}

/// A completed game result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub id: String,
    pub home_team: String,
    pub away_team: String,
    pub home_score: i32,
    pub away_score: i32,
    pub week: u32,
    pub season: i32,
    #[serde(default)]
    pub neutral_site: bool,
    #[serde(default)]
    pub postseason: bool,
    pub kickoff: DateTime<Utc>,
}

/// One season's worth of already-classified input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonSnapshot {
    pub season: i32,
    pub teams: Vec<Team>,
    pub games: Vec<Game>,
}

/// Conference membership derived from the roster. Members are roster indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conference {
    pub name: String,
    pub members: Vec<usize>,
}

/// Where the winner of a game played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Venue {
    Home,
    Away,
    Neutral,
}

/// A validated game with team references resolved to roster indices.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedGame {
    pub id: String,
    pub home: usize,
    pub away: usize,
    pub home_score: u32,
    pub away_score: u32,
    pub week: u32,
    pub neutral_site: bool,
    pub postseason: bool,
    pub kickoff: DateTime<Utc>,
}

/// Winner/loser view of a decisive game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub winner: usize,
    pub loser: usize,
    pub margin: u32,
    pub venue: Venue,
}

impl IndexedGame {
    /// Returns `None` for a tie.
    pub fn outcome(&self) -> Option<Outcome> {
        let (winner, loser, margin, winner_home) = if self.home_score > self.away_score {
            (self.home, self.away, self.home_score - self.away_score, true)
        } else if self.away_score > self.home_score {
            (self.away, self.home, self.away_score - self.home_score, false)
        } else {
            return None;
        };
        let venue = if self.neutral_site {
            Venue::Neutral
        } else if winner_home {
            Venue::Home
        } else {
            Venue::Away
        };
        Some(Outcome {
            winner,
            loser,
            margin,
            venue,
        })
    }
}
