//! Error types for the sync engine.

use pairsync_model::{ActionKind, RelationError, RepositoryError};
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Result type for relation-store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by relation stores.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Filesystem failure while reading or writing the persisted set.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// The persisted set could not be encoded or decoded.
    #[error("serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The persisted set violates the 1:1 correspondence invariant.
    #[error("invalid relation set: {0}")]
    Invalid(#[from] RelationError),

    /// The save was rejected (used by test stores to script failures).
    #[error("save failed: {0}")]
    SaveFailed(String),
}

/// Errors that abort a whole synchronization pass.
///
/// Entity-level failures never become an `EngineError`; they are isolated
/// into [`EntityError`] records on the pass summary so that one broken
/// entity cannot abort processing of unrelated entities.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Relation-store failure. Fatal: nothing may be mutated without
    /// durable bookkeeping, and a failed save means this pass's results
    /// are not committed.
    #[error("relation store failure: {0}")]
    RelationStore(#[from] StoreError),

    /// Enumerating one side's current versions failed. Fatal, but safe:
    /// nothing has been mutated yet.
    #[error("repository enumeration failed: {0}")]
    Enumeration(#[source] RepositoryError),

    /// A batch fetch needed before execution failed. Fatal, but safe:
    /// execution has not started and the relation store is untouched.
    #[error("entity fetch failed: {0}")]
    Fetch(#[source] RepositoryError),
}

/// A per-entity failure recorded on the pass summary.
///
/// The affected entity's relation is left untouched (unless the action was
/// a no-retry delete), so the next pass re-derives the same action.
#[derive(Error, Debug)]
#[error("{action:?} failed for entity {entity_id}: {source}")]
pub struct EntityError {
    /// The action that was being executed.
    pub action: ActionKind,
    /// Debug rendering of the affected entity's id.
    pub entity_id: String,
    /// The underlying repository failure.
    #[source]
    pub source: RepositoryError,
}

impl EntityError {
    pub(crate) fn new(
        action: ActionKind,
        entity_id: impl std::fmt::Debug,
        source: RepositoryError,
    ) -> Self {
        Self {
            action,
            entity_id: format!("{entity_id:?}"),
            source,
        }
    }
}
