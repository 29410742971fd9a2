//! Repository and mapper traits consumed by the engine.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use thiserror::Error;

/// Result type for repository operations.
pub type RepoResult<T> = Result<T, RepositoryError>;

/// Errors raised by entity repositories.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// The entity no longer exists. On update/delete this means "already
    /// changed externally" and is routed back into the state machine as an
    /// absence, not surfaced as a hard error.
    #[error("entity not found")]
    NotFound,

    /// Transient network/storage failure. Not retried within the pass; the
    /// affected relation is left untouched so the next pass re-derives the
    /// same action.
    #[error("transient i/o failure: {0}")]
    Transient(String),

    /// Non-transient repository failure.
    #[error("storage failure: {0}")]
    Storage(String),

    /// Content translation failed while building the write payload.
    #[error("mapping failed: {0}")]
    Mapping(#[from] MapError),
}

impl RepositoryError {
    /// Returns true if the same operation may succeed on a later pass.
    pub fn is_transient(&self) -> bool {
        matches!(self, RepositoryError::Transient(_))
    }
}

/// Error from the entity mapper, reported per entity without aborting the
/// rest of the pass.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct MapError {
    /// Human-readable description of the translation failure.
    pub message: String,
}

impl MapError {
    /// Creates a new mapping error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// One side's entity collection.
///
/// The engine only ever talks to the two stores through this trait. The id
/// returned by [`EntityRepository::update`] may differ from the id passed
/// in: some stores reassign identity on write, which is exactly the
/// discontinuity the interception pass compensates for.
pub trait EntityRepository {
    /// Entity identifier on this side.
    type Id: Clone + Eq + Hash + Debug;
    /// Opaque version token; equality against a stored token detects change.
    type Version: Clone + PartialEq + Debug;
    /// The entity representation this side works with.
    type Entity;

    /// Enumerates the current (id, version) pairs.
    ///
    /// The returned order must be stable across calls with no intervening
    /// changes; the duplicate reconciler's keep-the-first rule depends on a
    /// deterministic enumeration order.
    fn list_current_versions(&self) -> RepoResult<Vec<(Self::Id, Self::Version)>>;

    /// Fetches entities by id. Ids that no longer exist are simply absent
    /// from the result. Fetched entities must be given back via
    /// [`EntityRepository::release`] once the caller is done with them.
    fn fetch_by_ids(&self, ids: &[Self::Id]) -> RepoResult<HashMap<Self::Id, Self::Entity>>;

    /// Creates an entity. The repository constructs a blank entity and
    /// passes it to `initialize`, which fills it in (typically via the
    /// mapper). Returns the new entity's id and version.
    fn create(
        &self,
        initialize: &mut dyn FnMut(Self::Entity) -> Result<Self::Entity, MapError>,
    ) -> RepoResult<(Self::Id, Self::Version)>;

    /// Updates an entity in place via `modify`. Returns the (possibly new)
    /// id and the new version. Fails with [`RepositoryError::NotFound`] if
    /// the id no longer exists.
    fn update(
        &self,
        id: &Self::Id,
        modify: &mut dyn FnMut(Self::Entity) -> Result<Self::Entity, MapError>,
    ) -> RepoResult<(Self::Id, Self::Version)>;

    /// Deletes an entity. Returns false if the id was not found, which is
    /// treated as already-deleted rather than an error.
    fn delete(&self, id: &Self::Id) -> RepoResult<bool>;

    /// Cleanup hook for fetched entities. Default: no-op.
    fn release(&self, _entities: Vec<Self::Entity>) {}
}

impl<T: EntityRepository> EntityRepository for std::sync::Arc<T> {
    type Id = T::Id;
    type Version = T::Version;
    type Entity = T::Entity;

    fn list_current_versions(&self) -> RepoResult<Vec<(Self::Id, Self::Version)>> {
        (**self).list_current_versions()
    }

    fn fetch_by_ids(&self, ids: &[Self::Id]) -> RepoResult<HashMap<Self::Id, Self::Entity>> {
        (**self).fetch_by_ids(ids)
    }

    fn create(
        &self,
        initialize: &mut dyn FnMut(Self::Entity) -> Result<Self::Entity, MapError>,
    ) -> RepoResult<(Self::Id, Self::Version)> {
        (**self).create(initialize)
    }

    fn update(
        &self,
        id: &Self::Id,
        modify: &mut dyn FnMut(Self::Entity) -> Result<Self::Entity, MapError>,
    ) -> RepoResult<(Self::Id, Self::Version)> {
        (**self).update(id, modify)
    }

    fn delete(&self, id: &Self::Id) -> RepoResult<bool> {
        (**self).delete(id)
    }

    fn release(&self, entities: Vec<Self::Entity>) {
        (**self).release(entities)
    }
}

/// Translates entity content between the two sides.
///
/// Field-level mapping (dates, recurrence, attendees, categories) lives
/// behind this trait and is not the engine's concern; the engine only
/// decides *when* and *in which direction* to invoke it.
pub trait EntityMapper<A, B> {
    /// Maps an A-entity onto side B's representation. `existing` is the
    /// target-side entity to fill in: the current B-entity for updates,
    /// or the repository-constructed blank for creates. The synchronizer
    /// always supplies `Some`; mappers may reject `None`.
    fn map_a_to_b(&self, a: &A, existing: Option<B>) -> Result<B, MapError>;

    /// Maps a B-entity onto side A's representation. `existing` follows
    /// the same contract as [`EntityMapper::map_a_to_b`].
    fn map_b_to_a(&self, b: &B, existing: Option<A>) -> Result<A, MapError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(RepositoryError::Transient("connection reset".into()).is_transient());
        assert!(!RepositoryError::NotFound.is_transient());
        assert!(!RepositoryError::Storage("corrupt page".into()).is_transient());
        assert!(!RepositoryError::Mapping(MapError::new("bad date")).is_transient());
    }

    #[test]
    fn map_error_display() {
        let err = RepositoryError::Mapping(MapError::new("unparseable recurrence rule"));
        assert_eq!(err.to_string(), "mapping failed: unparseable recurrence rule");
    }
}
