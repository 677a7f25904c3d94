pub mod clock;
pub mod domain;
pub mod error;
pub mod events;
pub mod scoring;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock, system_clock};
pub use domain::{
    LeaderboardEntry, Match, MatchId, MatchStatus, Prediction, PredictionId, PredictionWithVotes,
    RuleId, Team, Tournament, User, UserId,
};
pub use error::{CoreError, Result};
pub use scoring::{
    MatchPointsCalculation, PointsCalculationResult, PopularityBonus, PredictionAccuracy,
    RuleValidationError, RuleViolation, ScoreBreakdown, ScoringRule,
};
