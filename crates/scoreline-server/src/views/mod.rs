//! Read models derived from the event flow and the match store.

pub mod hot_predictions;
pub mod match_cache;

pub use hot_predictions::{HotCacheStats, HotPredictionsService, VoteStatistics};
pub use match_cache::MatchCacheService;
