//! Event types for the scoring pipeline.
//!
//! Every event kind carries its own payload struct, so handlers match on
//! [`EventPayload`] instead of downcasting:
//! - match lifecycle (`match.*`)
//! - prediction lifecycle and voting (`prediction.*`)
//! - scoring and leaderboard outcomes

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::{
    MatchId, MatchStatus, PredictionId, PredictionWithVotes, Team, Tournament, UserId,
};
use crate::error::CoreError;

// ============================================================================
// Event Type
// ============================================================================

/// Topic an event is published under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "match.created")]
    MatchCreated,
    #[serde(rename = "match.started")]
    MatchStarted,
    #[serde(rename = "match.updated")]
    MatchUpdated,
    #[serde(rename = "match.status_changed")]
    MatchStatusChanged,
    #[serde(rename = "match.finished")]
    MatchFinished,
    #[serde(rename = "match.cancelled")]
    MatchCancelled,
    #[serde(rename = "match.score_updated")]
    MatchScoreUpdated,
    #[serde(rename = "prediction.created")]
    PredictionCreated,
    #[serde(rename = "prediction.updated")]
    PredictionUpdated,
    #[serde(rename = "prediction.voted")]
    PredictionVoted,
    #[serde(rename = "prediction.unvoted")]
    PredictionUnvoted,
    #[serde(rename = "points.calculated")]
    PointsCalculated,
    #[serde(rename = "leaderboard.updated")]
    LeaderboardUpdated,
    #[serde(rename = "hot_predictions.updated")]
    HotPredictionsUpdated,
    #[serde(rename = "user.registered")]
    UserRegistered,
}

impl EventType {
    pub const ALL: [EventType; 15] = [
        EventType::MatchCreated,
        EventType::MatchStarted,
        EventType::MatchUpdated,
        EventType::MatchStatusChanged,
        EventType::MatchFinished,
        EventType::MatchCancelled,
        EventType::MatchScoreUpdated,
        EventType::PredictionCreated,
        EventType::PredictionUpdated,
        EventType::PredictionVoted,
        EventType::PredictionUnvoted,
        EventType::PointsCalculated,
        EventType::LeaderboardUpdated,
        EventType::HotPredictionsUpdated,
        EventType::UserRegistered,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::MatchCreated => "match.created",
            EventType::MatchStarted => "match.started",
            EventType::MatchUpdated => "match.updated",
            EventType::MatchStatusChanged => "match.status_changed",
            EventType::MatchFinished => "match.finished",
            EventType::MatchCancelled => "match.cancelled",
            EventType::MatchScoreUpdated => "match.score_updated",
            EventType::PredictionCreated => "prediction.created",
            EventType::PredictionUpdated => "prediction.updated",
            EventType::PredictionVoted => "prediction.voted",
            EventType::PredictionUnvoted => "prediction.unvoted",
            EventType::PointsCalculated => "points.calculated",
            EventType::LeaderboardUpdated => "leaderboard.updated",
            EventType::HotPredictionsUpdated => "hot_predictions.updated",
            EventType::UserRegistered => "user.registered",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CoreError::invalid_event_type(s))
    }
}

// ============================================================================
// Payloads
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchPayload {
    pub match_id: MatchId,
    pub tournament: Tournament,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchStatusChangedPayload {
    pub match_id: MatchId,
    pub from: MatchStatus,
    pub to: MatchStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchFinishedPayload {
    pub match_id: MatchId,
    pub tournament: Tournament,
    pub winner: Team,
    pub score_a: u32,
    pub score_b: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchScorePayload {
    pub match_id: MatchId,
    pub score_a: u32,
    pub score_b: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionPayload {
    pub prediction_id: PredictionId,
    pub match_id: MatchId,
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionVotedPayload {
    pub prediction_id: PredictionId,
    pub match_id: MatchId,
    /// Voter.
    pub user_id: UserId,
    /// Vote count after the change.
    pub vote_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionPoints {
    pub prediction_id: PredictionId,
    pub user_id: UserId,
    pub points: i64,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsCalculatedPayload {
    pub match_id: MatchId,
    pub tournament: Tournament,
    pub predictions: Vec<PredictionPoints>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardUpdatedPayload {
    pub tournament: Tournament,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotPredictionsUpdatedPayload {
    pub match_id: MatchId,
    pub hot_predictions: Vec<PredictionWithVotes>,
    pub total_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRegisteredPayload {
    pub user_id: UserId,
    pub username: String,
}

/// Payload of an event, one variant per [`EventType`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum EventPayload {
    #[serde(rename = "match.created")]
    MatchCreated(MatchPayload),
    #[serde(rename = "match.started")]
    MatchStarted(MatchPayload),
    #[serde(rename = "match.updated")]
    MatchUpdated(MatchPayload),
    #[serde(rename = "match.status_changed")]
    MatchStatusChanged(MatchStatusChangedPayload),
    #[serde(rename = "match.finished")]
    MatchFinished(MatchFinishedPayload),
    #[serde(rename = "match.cancelled")]
    MatchCancelled(MatchPayload),
    #[serde(rename = "match.score_updated")]
    MatchScoreUpdated(MatchScorePayload),
    #[serde(rename = "prediction.created")]
    PredictionCreated(PredictionPayload),
    #[serde(rename = "prediction.updated")]
    PredictionUpdated(PredictionPayload),
    #[serde(rename = "prediction.voted")]
    PredictionVoted(PredictionVotedPayload),
    #[serde(rename = "prediction.unvoted")]
    PredictionUnvoted(PredictionVotedPayload),
    #[serde(rename = "points.calculated")]
    PointsCalculated(PointsCalculatedPayload),
    #[serde(rename = "leaderboard.updated")]
    LeaderboardUpdated(LeaderboardUpdatedPayload),
    #[serde(rename = "hot_predictions.updated")]
    HotPredictionsUpdated(HotPredictionsUpdatedPayload),
    #[serde(rename = "user.registered")]
    UserRegistered(UserRegisteredPayload),
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::MatchCreated(_) => EventType::MatchCreated,
            EventPayload::MatchStarted(_) => EventType::MatchStarted,
            EventPayload::MatchUpdated(_) => EventType::MatchUpdated,
            EventPayload::MatchStatusChanged(_) => EventType::MatchStatusChanged,
            EventPayload::MatchFinished(_) => EventType::MatchFinished,
            EventPayload::MatchCancelled(_) => EventType::MatchCancelled,
            EventPayload::MatchScoreUpdated(_) => EventType::MatchScoreUpdated,
            EventPayload::PredictionCreated(_) => EventType::PredictionCreated,
            EventPayload::PredictionUpdated(_) => EventType::PredictionUpdated,
            EventPayload::PredictionVoted(_) => EventType::PredictionVoted,
            EventPayload::PredictionUnvoted(_) => EventType::PredictionUnvoted,
            EventPayload::PointsCalculated(_) => EventType::PointsCalculated,
            EventPayload::LeaderboardUpdated(_) => EventType::LeaderboardUpdated,
            EventPayload::HotPredictionsUpdated(_) => EventType::HotPredictionsUpdated,
            EventPayload::UserRegistered(_) => EventType::UserRegistered,
        }
    }
}

// ============================================================================
// Event
// ============================================================================

/// A published event. Events are values: they have no identity and live only
/// for one publish/dispatch cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(flatten)]
    pub payload: EventPayload,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl Event {
    /// Create an event stamped with the current time.
    pub fn new(payload: EventPayload) -> Self {
        Self {
            payload,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }

    /// Create a "match finished" event.
    pub fn match_finished(
        match_id: MatchId,
        tournament: Tournament,
        winner: Team,
        score_a: u32,
        score_b: u32,
    ) -> Self {
        Self::new(EventPayload::MatchFinished(MatchFinishedPayload {
            match_id,
            tournament,
            winner,
            score_a,
            score_b,
        }))
    }

    /// Create a "points calculated" event.
    pub fn points_calculated(
        match_id: MatchId,
        tournament: Tournament,
        predictions: Vec<PredictionPoints>,
    ) -> Self {
        Self::new(EventPayload::PointsCalculated(PointsCalculatedPayload {
            match_id,
            tournament,
            predictions,
        }))
    }

    /// Create a "prediction voted" event.
    pub fn prediction_voted(
        prediction_id: PredictionId,
        match_id: MatchId,
        user_id: UserId,
        vote_count: u32,
    ) -> Self {
        Self::new(EventPayload::PredictionVoted(PredictionVotedPayload {
            prediction_id,
            match_id,
            user_id,
            vote_count,
        }))
    }

    /// Create a "prediction unvoted" event.
    pub fn prediction_unvoted(
        prediction_id: PredictionId,
        match_id: MatchId,
        user_id: UserId,
        vote_count: u32,
    ) -> Self {
        Self::new(EventPayload::PredictionUnvoted(PredictionVotedPayload {
            prediction_id,
            match_id,
            user_id,
            vote_count,
        }))
    }

    /// Set the timestamp.
    pub fn at(mut self, timestamp: OffsetDateTime) -> Self {
        self.timestamp = timestamp;
        self
    }
}
