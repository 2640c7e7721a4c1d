//! Builders for small hand-made seasons used across the engine tests.

use chrono::{Duration, TimeZone, Utc};

use super::{Game, Season, SeasonSnapshot, Team};

pub fn team(id: &str, conference: &str) -> Team {
    Team {
        id: id.into(),
        name: id.to_uppercase(),
        conference: conference.into(),
        eligible: true,
    }
}

/// Regular-season home game in 2023.
pub fn game(id: &str, home: &str, away: &str, home_score: i32, away_score: i32, week: u32) -> Game {
    Game {
        id: id.into(),
        home_team: home.into(),
        away_team: away.into(),
        home_score,
        away_score,
        week,
        season: 2023,
        neutral_site: false,
        postseason: false,
        kickoff: Utc.with_ymd_and_hms(2023, 8, 26, 19, 0, 0).unwrap() + Duration::weeks(week as i64),
    }
}

pub fn snapshot(teams: Vec<Team>, games: Vec<Game>) -> SeasonSnapshot {
    SeasonSnapshot {
        season: 2023,
        teams,
        games,
    }
}

pub fn season(teams: Vec<Team>, games: Vec<Game>) -> Season {
    Season::from_snapshot(&snapshot(teams, games)).unwrap()
}

/// Two conferences of three teams. East sweeps its cross-conference games.
pub fn two_conference_snapshot() -> SeasonSnapshot {
    snapshot(
        vec![
            team("a", "East"),
            team("b", "East"),
            team("c", "East"),
            team("x", "West"),
            team("y", "West"),
            team("z", "West"),
        ],
        vec![
            game("g01", "a", "b", 24, 17, 1),
            game("g02", "b", "c", 31, 10, 1),
            game("g03", "x", "y", 20, 13, 1),
            game("g04", "y", "z", 27, 24, 1),
            game("g05", "a", "x", 35, 14, 2),
            game("g06", "y", "b", 10, 17, 2),
            game("g07", "c", "z", 21, 20, 3),
            game("g08", "a", "c", 28, 3, 3),
            game("g09", "z", "x", 17, 14, 4),
            game("g10", "b", "x", 14, 14, 4),
        ],
    )
}
