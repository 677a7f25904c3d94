//! Repository contracts.
//!
//! The pipeline only sees these traits; implementations are swappable
//! (`scoreline-db-memory` for tests and single-node runs, a database-backed
//! crate in production). Every implementation must be `Send + Sync`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use scoreline_core::{
    LeaderboardEntry, Match, MatchId, MatchPointsCalculation, MatchStatus, PredictionId,
    PredictionWithVotes, RuleId, ScoringRule, Tournament, User, UserId,
};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Filter for match listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchListFilter {
    pub tournament: Option<Tournament>,
    pub status: Option<MatchStatus>,
    /// 0 means no limit.
    pub limit: usize,
    pub offset: usize,
}

impl MatchListFilter {
    pub fn with_status(status: MatchStatus, limit: usize) -> Self {
        Self {
            status: Some(status),
            limit,
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait PredictionRepository: Send + Sync {
    /// All predictions for a match with their vote counts.
    async fn predictions_by_match(
        &self,
        match_id: MatchId,
    ) -> Result<Vec<PredictionWithVotes>, StorageError>;

    /// Store the result of a scoring pass for one prediction.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the prediction does not exist.
    async fn update_prediction_points(
        &self,
        id: PredictionId,
        points: i64,
        is_correct: bool,
    ) -> Result<(), StorageError>;
}

#[async_trait]
pub trait MatchRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the match does not exist.
    async fn get_by_id(&self, id: MatchId) -> Result<Match, StorageError>;

    /// Matches ordered by start time.
    async fn list(&self, filter: &MatchListFilter) -> Result<Vec<Match>, StorageError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the user does not exist.
    async fn get_by_id(&self, id: UserId) -> Result<User, StorageError>;

    /// Persist the full user record.
    async fn update(&self, user: &User) -> Result<(), StorageError>;

    /// Top `limit` users of a tournament ranked by points, highest first.
    async fn leaderboard(
        &self,
        tournament: Tournament,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>, StorageError>;
}

#[async_trait]
pub trait ScoringRuleRepository: Send + Sync {
    /// The rule currently marked active, if any.
    async fn active_rule(&self) -> Result<Option<ScoringRule>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no rule has this id.
    async fn rule_by_id(&self, id: RuleId) -> Result<ScoringRule, StorageError>;
}

/// Storage for per-match scoring results.
#[async_trait]
pub trait CalculationRepository: Send + Sync {
    /// Insert or replace the calculation for `calculation.match_id`.
    async fn upsert(&self, calculation: &MatchPointsCalculation) -> Result<(), StorageError>;

    async fn get_by_match(
        &self,
        match_id: MatchId,
    ) -> Result<Option<MatchPointsCalculation>, StorageError>;

    /// Points from `match_id` already added to each user's total.
    async fn settled_points(
        &self,
        match_id: MatchId,
    ) -> Result<BTreeMap<UserId, i64>, StorageError>;

    /// Record that `user_id`'s total now includes `points` from `match_id`.
    /// Called only after the user update succeeded.
    async fn record_settlement(
        &self,
        match_id: MatchId,
        user_id: UserId,
        points: i64,
    ) -> Result<(), StorageError>;
}
