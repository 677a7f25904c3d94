//! In-memory repository backend for Scoreline.
//!
//! One [`InMemoryStore`] implements every repository trait from
//! `scoreline-storage` over `DashMap`s, so a single `Arc` can be handed to
//! the pipeline as all of its collaborators.
//!
//! # Example
//!
//! ```ignore
//! use scoreline_db_memory::InMemoryStore;
//!
//! let store = InMemoryStore::new_shared();
//! store.insert_match(finished_match);
//! store.insert_prediction(prediction, 12);
//! let repos = store.repositories();
//! ```

mod repos;
pub mod store;

pub use scoreline_storage::{Repositories, StorageError};
pub use store::InMemoryStore;

/// Creates a repository bundle backed by a fresh in-memory store.
pub fn create_repositories() -> Repositories {
    InMemoryStore::new_shared().repositories()
}
