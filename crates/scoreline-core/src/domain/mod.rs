//! Domain entities consumed by the scoring pipeline.
//!
//! These are plain values: persistence lives behind the repository traits in
//! `scoreline-storage`, so nothing here performs I/O.

pub mod matches;
pub mod prediction;
pub mod user;

pub use matches::{Match, MatchStatus, Team, Tournament};
pub use prediction::{FEATURED_VOTE_THRESHOLD, Prediction, PredictionWithVotes};
pub use user::{LeaderboardEntry, User};

pub type MatchId = u64;
pub type PredictionId = u64;
pub type UserId = u64;
pub type RuleId = u64;
