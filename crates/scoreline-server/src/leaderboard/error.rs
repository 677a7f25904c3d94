use scoreline_core::Tournament;
use scoreline_storage::StorageError;
use thiserror::Error;

use crate::cache::CacheError;

#[derive(Debug, Error)]
pub enum LeaderboardError {
    #[error("leaderboard storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("leaderboard cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("leaderboard {operation} for {tournament} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        tournament: Tournament,
        timeout_ms: u64,
    },

    #[error("{operation} failed for {failed:?}: {message}")]
    Partial {
        operation: &'static str,
        failed: Vec<Tournament>,
        message: String,
    },
}

impl LeaderboardError {
    pub fn timeout(operation: &'static str, tournament: Tournament, timeout: std::time::Duration) -> Self {
        Self::Timeout {
            operation,
            tournament,
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    /// Fold per-tournament failures into one error, or `Ok` if there were none.
    pub fn collect(
        operation: &'static str,
        failures: Vec<(Tournament, LeaderboardError)>,
    ) -> Result<(), Self> {
        if failures.is_empty() {
            return Ok(());
        }
        let message = failures
            .iter()
            .map(|(t, e)| format!("{t}: {e}"))
            .collect::<Vec<_>>()
            .join("; ");
        Err(Self::Partial {
            operation,
            failed: failures.into_iter().map(|(t, _)| t).collect(),
            message,
        })
    }
}

pub type LeaderboardResult<T> = Result<T, LeaderboardError>;
