//! # scoreline-storage
//!
//! Repository contracts consumed by the Scoreline scoring pipeline.
//!
//! This crate defines the traits only - implementations live in separate
//! crates such as `scoreline-db-memory`.
//!
//! ## Example
//!
//! ```ignore
//! use scoreline_storage::{MatchRepository, StorageError};
//!
//! async fn finished(repo: &dyn MatchRepository, id: u64) -> Result<bool, StorageError> {
//!     Ok(repo.get_by_id(id).await?.is_finished())
//! }
//! ```

use std::sync::Arc;

pub mod error;
pub mod traits;

pub use error::StorageError;
pub use traits::{
    CalculationRepository, MatchListFilter, MatchRepository, PredictionRepository,
    ScoringRuleRepository, UserRepository,
};

/// Bundle of repository handles passed to the pipeline.
#[derive(Clone)]
pub struct Repositories {
    pub predictions: Arc<dyn PredictionRepository>,
    pub matches: Arc<dyn MatchRepository>,
    pub users: Arc<dyn UserRepository>,
    pub rules: Arc<dyn ScoringRuleRepository>,
    pub calculations: Arc<dyn CalculationRepository>,
}

impl std::fmt::Debug for Repositories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repositories").finish_non_exhaustive()
    }
}
