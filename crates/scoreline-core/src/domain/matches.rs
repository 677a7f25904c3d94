use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::MatchId;
use crate::error::CoreError;

// ============================================================================
// Tournament
// ============================================================================

/// Leaderboard partition.
///
/// Every match belongs to one seasonal tournament; `Global` is the aggregate
/// ranking across all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tournament {
    Global,
    Spring,
    Summer,
    Autumn,
    Winter,
}

impl Tournament {
    /// Every leaderboard partition, aggregate first.
    pub const ALL: [Tournament; 5] = [
        Tournament::Global,
        Tournament::Spring,
        Tournament::Summer,
        Tournament::Autumn,
        Tournament::Winter,
    ];

    /// Seasonal partitions a match can belong to.
    pub const SEASONS: [Tournament; 4] = [
        Tournament::Spring,
        Tournament::Summer,
        Tournament::Autumn,
        Tournament::Winter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tournament::Global => "GLOBAL",
            Tournament::Spring => "SPRING",
            Tournament::Summer => "SUMMER",
            Tournament::Autumn => "AUTUMN",
            Tournament::Winter => "WINTER",
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, Tournament::Global)
    }
}

impl fmt::Display for Tournament {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tournament {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GLOBAL" => Ok(Tournament::Global),
            "SPRING" => Ok(Tournament::Spring),
            "SUMMER" => Ok(Tournament::Summer),
            "AUTUMN" => Ok(Tournament::Autumn),
            "WINTER" => Ok(Tournament::Winter),
            _ => Err(CoreError::invalid_tournament(s)),
        }
    }
}

// ============================================================================
// Team / Status
// ============================================================================

/// Side of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Team {
    A,
    B,
}

impl Team {
    pub fn as_str(&self) -> &'static str {
        match self {
            Team::A => "A",
            Team::B => "B",
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Team {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" | "a" => Ok(Team::A),
            "B" | "b" => Ok(Team::B),
            _ => Err(CoreError::invalid_team(s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Upcoming,
    Live,
    Finished,
    Cancelled,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Upcoming => "upcoming",
            MatchStatus::Live => "live",
            MatchStatus::Finished => "finished",
            MatchStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "upcoming" => Ok(MatchStatus::Upcoming),
            "live" => Ok(MatchStatus::Live),
            "finished" => Ok(MatchStatus::Finished),
            "cancelled" => Ok(MatchStatus::Cancelled),
            _ => Err(CoreError::invalid_match_status(s)),
        }
    }
}

// ============================================================================
// Match
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub team_a: String,
    pub team_b: String,
    pub tournament: Tournament,
    pub status: MatchStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    /// Set once the match is finished.
    pub winner: Option<Team>,
    pub score_a: u32,
    pub score_b: u32,
}

impl Match {
    /// Create an upcoming match with no result.
    pub fn scheduled(
        id: MatchId,
        team_a: impl Into<String>,
        team_b: impl Into<String>,
        tournament: Tournament,
        start_time: OffsetDateTime,
    ) -> Self {
        Self {
            id,
            team_a: team_a.into(),
            team_b: team_b.into(),
            tournament,
            status: MatchStatus::Upcoming,
            start_time,
            winner: None,
            score_a: 0,
            score_b: 0,
        }
    }

    /// Record the final result and mark the match finished.
    pub fn finish(&mut self, winner: Team, score_a: u32, score_b: u32) {
        self.status = MatchStatus::Finished;
        self.winner = Some(winner);
        self.score_a = score_a;
        self.score_b = score_b;
    }

    pub fn is_finished(&self) -> bool {
        self.status == MatchStatus::Finished
    }

    pub fn is_live(&self) -> bool {
        self.status == MatchStatus::Live
    }

    /// Whether the match is expected to draw heavy read traffic: live, or
    /// upcoming and starting within the next hour.
    pub fn is_hot(&self, now: OffsetDateTime) -> bool {
        match self.status {
            MatchStatus::Live => true,
            MatchStatus::Upcoming => self.start_time - now <= time::Duration::HOUR,
            _ => false,
        }
    }
}
