//! Errors of the asynchronous scoring service.

use scoreline_core::{MatchId, PredictionId};
use scoreline_storage::StorageError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScoringError {
    /// The intake queue is at capacity. Nothing was enqueued.
    #[error("points calculation queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("match {0} is not finished")]
    MatchNotFinished(MatchId),

    #[error("scoring service is shutting down")]
    ShuttingDown,

    #[error("match {match_id}: {source}")]
    Match {
        match_id: MatchId,
        #[source]
        source: StorageError,
    },

    #[error("match {match_id}, prediction {prediction_id}: {source}")]
    Prediction {
        match_id: MatchId,
        prediction_id: PredictionId,
        #[source]
        source: StorageError,
    },
}

impl ScoringError {
    pub fn for_match(match_id: MatchId, source: StorageError) -> Self {
        Self::Match { match_id, source }
    }

    pub fn for_prediction(
        match_id: MatchId,
        prediction_id: PredictionId,
        source: StorageError,
    ) -> Self {
        Self::Prediction {
            match_id,
            prediction_id,
            source,
        }
    }

    /// Whether the caller can act on this error synchronously.
    pub fn is_capacity(&self) -> bool {
        matches!(self, Self::QueueFull { .. } | Self::ShuttingDown)
    }
}

pub type ScoringResult<T> = Result<T, ScoringError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_in_message() {
        let err = ScoringError::for_prediction(7, 42, StorageError::connection("reset"));
        assert_eq!(
            err.to_string(),
            "match 7, prediction 42: Connection error: reset"
        );
        assert!(!err.is_capacity());
        assert!(ScoringError::QueueFull { capacity: 1 }.is_capacity());
    }
}
