//! Synchronization profile configuration.

use crate::conflict::ConflictStrategy;
use pairsync_model::EntityRelation;
use std::fmt;
use std::sync::Arc;

/// The synchronization policy for a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Changes flow in both directions; conflicts go to the resolver.
    TwoWay,
    /// A is authoritative; B is made an exact mirror of A.
    ReplicateAToB,
    /// B is authoritative; A is made an exact mirror of B.
    ReplicateBToA,
    /// A's changes flow into B; B-local edits are tolerated.
    MergeAToB,
    /// B's changes flow into A; A-local edits are tolerated.
    MergeBToA,
}

impl SyncMode {
    /// Returns true if this mode ever writes to side A.
    pub fn writes_to_a(&self) -> bool {
        matches!(
            self,
            SyncMode::TwoWay | SyncMode::ReplicateBToA | SyncMode::MergeBToA
        )
    }

    /// Returns true if this mode ever writes to side B.
    pub fn writes_to_b(&self) -> bool {
        matches!(
            self,
            SyncMode::TwoWay | SyncMode::ReplicateAToB | SyncMode::MergeAToB
        )
    }
}

/// Decides whether a failed delete should be retried on a later pass.
///
/// The deriver consults this when emitting delete actions: a retryable
/// delete keeps its relation on failure so the next pass re-derives it; a
/// no-retry delete drops the relation regardless of the outcome.
pub trait DeleteRetryPolicy<AId, AVersion, BId, BVersion> {
    /// Whether a delete of this relation's A-entity should be retryable.
    fn retry_delete_in_a(
        &self,
        _relation: &EntityRelation<AId, AVersion, BId, BVersion>,
    ) -> bool {
        true
    }

    /// Whether a delete of this relation's B-entity should be retryable.
    fn retry_delete_in_b(
        &self,
        _relation: &EntityRelation<AId, AVersion, BId, BVersion>,
    ) -> bool {
        true
    }
}

/// The default policy: every delete is retryable.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRetry;

impl<AId, AVersion, BId, BVersion> DeleteRetryPolicy<AId, AVersion, BId, BVersion> for AlwaysRetry {}

/// A policy that never retries failed deletes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverRetry;

impl<AId, AVersion, BId, BVersion> DeleteRetryPolicy<AId, AVersion, BId, BVersion> for NeverRetry {
    fn retry_delete_in_a(&self, _relation: &EntityRelation<AId, AVersion, BId, BVersion>) -> bool {
        false
    }

    fn retry_delete_in_b(&self, _relation: &EntityRelation<AId, AVersion, BId, BVersion>) -> bool {
        false
    }
}

/// Configuration for one synchronization profile.
#[derive(Clone)]
pub struct ProfileConfig<AId, AVersion, BId, BVersion> {
    /// The synchronization policy.
    pub mode: SyncMode,
    /// How conflicts are resolved when both sides changed.
    pub conflict_strategy: ConflictStrategy,
    /// Retry boundary for delete actions.
    pub delete_retry: Arc<dyn DeleteRetryPolicy<AId, AVersion, BId, BVersion> + Send + Sync>,
}

impl<AId, AVersion, BId, BVersion> ProfileConfig<AId, AVersion, BId, BVersion> {
    /// Creates a configuration with the given mode, automatic conflict
    /// resolution, and retryable deletes.
    pub fn new(mode: SyncMode) -> Self {
        Self {
            mode,
            conflict_strategy: ConflictStrategy::Automatic,
            delete_retry: Arc::new(AlwaysRetry),
        }
    }

    /// Sets the conflict strategy.
    pub fn with_conflict_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.conflict_strategy = strategy;
        self
    }

    /// Sets the delete-retry policy.
    pub fn with_delete_retry(
        mut self,
        policy: impl DeleteRetryPolicy<AId, AVersion, BId, BVersion> + Send + Sync + 'static,
    ) -> Self {
        self.delete_retry = Arc::new(policy);
        self
    }
}

impl<AId, AVersion, BId, BVersion> fmt::Debug for ProfileConfig<AId, AVersion, BId, BVersion> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfileConfig")
            .field("mode", &self.mode)
            .field("conflict_strategy", &self.conflict_strategy)
            .finish_non_exhaustive()
    }
}
