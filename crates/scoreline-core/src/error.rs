use thiserror::Error;

use crate::scoring::RuleValidationError;

/// Core error types for Scoreline domain operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid tournament: {0}")]
    InvalidTournament(String),

    #[error("Invalid team: {0}")]
    InvalidTeam(String),

    #[error("Invalid match status: {0}")]
    InvalidMatchStatus(String),

    #[error("Invalid event type: {0}")]
    InvalidEventType(String),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    InvalidRule(#[from] RuleValidationError),
}

impl CoreError {
    /// Create a new InvalidTournament error
    pub fn invalid_tournament(value: impl Into<String>) -> Self {
        Self::InvalidTournament(value.into())
    }

    /// Create a new InvalidTeam error
    pub fn invalid_team(value: impl Into<String>) -> Self {
        Self::InvalidTeam(value.into())
    }

    /// Create a new InvalidMatchStatus error
    pub fn invalid_match_status(value: impl Into<String>) -> Self {
        Self::InvalidMatchStatus(value.into())
    }

    /// Create a new InvalidEventType error
    pub fn invalid_event_type(value: impl Into<String>) -> Self {
        Self::InvalidEventType(value.into())
    }

    /// Check if this error was caused by caller input
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidTournament(_)
                | Self::InvalidTeam(_)
                | Self::InvalidMatchStatus(_)
                | Self::InvalidEventType(_)
                | Self::InvalidRule(_)
        )
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = CoreError::invalid_tournament("WINTERFELL");
        assert_eq!(err.to_string(), "Invalid tournament: WINTERFELL");
        assert!(err.is_client_error());
    }

    #[test]
    fn test_json_error_is_not_client_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = CoreError::from(json_err);
        assert!(!err.is_client_error());
    }
}
