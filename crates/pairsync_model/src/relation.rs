//! Relation records linking A-entities to B-entities.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;
use thiserror::Error;

/// Errors raised when a relation set violates the 1:1 invariant.
#[derive(Error, Debug)]
pub enum RelationError {
    /// Two relations reference the same A-id.
    #[error("duplicate relation for A-id {0}")]
    DuplicateAId(String),

    /// Two relations reference the same B-id.
    #[error("duplicate relation for B-id {0}")]
    DuplicateBId(String),
}

/// The persisted correspondence between one A-entity and one B-entity.
///
/// `a_version` and `b_version` are the versions the engine last reconciled.
/// Comparing them against the live versions reported by the repositories is
/// how "changed since last pass" is detected; content is never diffed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRelation<AId, AVersion, BId, BVersion> {
    /// Identifier of the A-entity.
    pub a_id: AId,
    /// Last reconciled version of the A-entity.
    pub a_version: AVersion,
    /// Identifier of the B-entity.
    pub b_id: BId,
    /// Last reconciled version of the B-entity.
    pub b_version: BVersion,
}

impl<AId, AVersion, BId, BVersion> EntityRelation<AId, AVersion, BId, BVersion> {
    /// Creates a new relation record.
    pub fn new(a_id: AId, a_version: AVersion, b_id: BId, b_version: BVersion) -> Self {
        Self {
            a_id,
            a_version,
            b_id,
            b_version,
        }
    }
}

/// An in-memory set of relation records, kept in load order.
///
/// The set enforces the 1:1 correspondence invariant: at most one relation
/// per distinct A-id and at most one per distinct B-id.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationSet<AId, AVersion, BId, BVersion> {
    records: Vec<EntityRelation<AId, AVersion, BId, BVersion>>,
}

impl<AId, AVersion, BId, BVersion> RelationSet<AId, AVersion, BId, BVersion>
where
    AId: Clone + Eq + Hash + Debug,
    BId: Clone + Eq + Hash + Debug,
{
    /// Creates an empty relation set.
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Builds a relation set from records, validating the 1:1 invariant.
    pub fn from_records(
        records: Vec<EntityRelation<AId, AVersion, BId, BVersion>>,
    ) -> Result<Self, RelationError> {
        let mut a_seen = HashSet::with_capacity(records.len());
        let mut b_seen = HashSet::with_capacity(records.len());
        for record in &records {
            if !a_seen.insert(record.a_id.clone()) {
                return Err(RelationError::DuplicateAId(format!("{:?}", record.a_id)));
            }
            if !b_seen.insert(record.b_id.clone()) {
                return Err(RelationError::DuplicateBId(format!("{:?}", record.b_id)));
            }
        }
        Ok(Self { records })
    }

    /// Returns the records in order.
    pub fn records(&self) -> &[EntityRelation<AId, AVersion, BId, BVersion>] {
        &self.records
    }

    /// Consumes the set and returns the records.
    pub fn into_records(self) -> Vec<EntityRelation<AId, AVersion, BId, BVersion>> {
        self.records
    }

    /// Returns the number of relations.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the set holds no relations.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Looks up the relation for an A-id.
    pub fn by_a_id(&self, a_id: &AId) -> Option<&EntityRelation<AId, AVersion, BId, BVersion>> {
        self.records.iter().find(|r| &r.a_id == a_id)
    }

    /// Looks up the relation for a B-id.
    pub fn by_b_id(&self, b_id: &BId) -> Option<&EntityRelation<AId, AVersion, BId, BVersion>> {
        self.records.iter().find(|r| &r.b_id == b_id)
    }

    /// Inserts a relation, replacing any existing relation for the same
    /// A-id or B-id (both are removed first to preserve the invariant).
    pub fn upsert(&mut self, relation: EntityRelation<AId, AVersion, BId, BVersion>) {
        self.records
            .retain(|r| r.a_id != relation.a_id && r.b_id != relation.b_id);
        self.records.push(relation);
    }

    /// Removes the relation for an A-id, returning it if present.
    pub fn remove_by_a_id(
        &mut self,
        a_id: &AId,
    ) -> Option<EntityRelation<AId, AVersion, BId, BVersion>> {
        let pos = self.records.iter().position(|r| &r.a_id == a_id)?;
        Some(self.records.remove(pos))
    }

    /// Removes the relation for a B-id, returning it if present.
    pub fn remove_by_b_id(
        &mut self,
        b_id: &BId,
    ) -> Option<EntityRelation<AId, AVersion, BId, BVersion>> {
        let pos = self.records.iter().position(|r| &r.b_id == b_id)?;
        Some(self.records.remove(pos))
    }
}

impl<AId, AVersion, BId, BVersion> Default for RelationSet<AId, AVersion, BId, BVersion>
where
    AId: Clone + Eq + Hash + Debug,
    BId: Clone + Eq + Hash + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}
