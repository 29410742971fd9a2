//! Post-run duplicate detection and removal on side A.

use crate::error::EntityError;
use pairsync_model::{ActionKind, EntityRepository, Fingerprint, RelationSet};
use std::collections::HashMap;
use std::hash::Hash;
use tracing::{debug, warn};

/// Pass-scoped map from A-id to content fingerprint.
///
/// The tracker is constructed per pass and passed by parameter (never held
/// in shared state), populated as A-entities are observed or created and
/// pruned as they are deleted. Grouping preserves first-observation order,
/// so the reconciler's keep-the-first rule is deterministic for a stable
/// enumeration order.
#[derive(Debug, Default)]
pub struct DuplicateTracker<AId> {
    order: Vec<AId>,
    fingerprints: HashMap<AId, Fingerprint>,
}

impl<AId> DuplicateTracker<AId>
where
    AId: Clone + Eq + Hash,
{
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            fingerprints: HashMap::new(),
        }
    }

    /// Records (or refreshes) the fingerprint observed for an entity.
    pub fn observe(&mut self, id: AId, fingerprint: Fingerprint) {
        if !self.fingerprints.contains_key(&id) {
            self.order.push(id.clone());
        }
        self.fingerprints.insert(id, fingerprint);
    }

    /// Drops a deleted entity from tracking.
    pub fn forget(&mut self, id: &AId) {
        self.fingerprints.remove(id);
    }

    /// Number of tracked entities.
    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    /// Returns true if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }

    /// Groups tracked ids by fingerprint, in first-observation order, and
    /// returns the groups with more than one member.
    pub fn duplicate_groups(&self) -> Vec<Vec<AId>> {
        let mut group_order: Vec<Fingerprint> = Vec::new();
        let mut groups: HashMap<Fingerprint, Vec<AId>> = HashMap::new();
        for id in &self.order {
            let Some(fingerprint) = self.fingerprints.get(id) else {
                continue; // forgotten mid-pass
            };
            let members = groups.entry(*fingerprint).or_insert_with(|| {
                group_order.push(*fingerprint);
                Vec::new()
            });
            members.push(id.clone());
        }
        group_order
            .into_iter()
            .filter_map(|fingerprint| {
                let members = groups.remove(&fingerprint)?;
                (members.len() > 1).then_some(members)
            })
            .collect()
    }
}

/// The result of one reconciliation run.
#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    /// Number of duplicate A-entities removed.
    pub removed: usize,
    /// Per-entity failures; the affected duplicates are retried next pass.
    pub errors: Vec<EntityError>,
}

/// Removes content-identical duplicates from side A.
///
/// For every tracked group with more than one member, the members are
/// re-fetched and the first in observation order is kept. Every other
/// member whose re-fetched fingerprint is still exactly equal is deleted
/// from side A; if it has a relation, its B counterpart is deleted too and
/// the relation record is dropped from `relations`. Persisting the updated
/// relation set is the caller's responsibility.
///
/// This guards against duplicates introduced by races or repeated partial
/// runs that initial matching could not prevent, e.g. two passes both
/// creating before either's relation was committed.
pub fn reconcile_duplicates<RA, RB>(
    tracker: &DuplicateTracker<RA::Id>,
    a_repo: &RA,
    b_repo: &RB,
    relations: &mut RelationSet<RA::Id, RA::Version, RB::Id, RB::Version>,
    fingerprint: &dyn Fn(&RA::Entity) -> Option<Fingerprint>,
) -> ReconcileOutcome
where
    RA: EntityRepository,
    RB: EntityRepository,
{
    let mut outcome = ReconcileOutcome::default();

    for group in tracker.duplicate_groups() {
        let mut fetched = match a_repo.fetch_by_ids(&group) {
            Ok(fetched) => fetched,
            Err(error) => {
                warn!(?error, "duplicate group fetch failed; group skipped");
                outcome
                    .errors
                    .push(EntityError::new(ActionKind::DeleteInA, &group[0], error));
                continue;
            }
        };

        // The keeper is the first member that still exists.
        let Some(keeper_index) = group.iter().position(|id| fetched.contains_key(id)) else {
            continue;
        };
        let keeper_fingerprint = fingerprint(&fetched[&group[keeper_index]]);
        let Some(keeper_fingerprint) = keeper_fingerprint else {
            continue;
        };

        for id in &group[keeper_index + 1..] {
            let Some(entity) = fetched.get(id) else {
                continue;
            };
            // The entity may have been edited since it was observed; only
            // an exactly equal fingerprint is still a duplicate.
            if fingerprint(entity) != Some(keeper_fingerprint) {
                continue;
            }

            match a_repo.delete(id) {
                Ok(_) => {
                    debug!(a_id = ?id, "duplicate removed from side A");
                    outcome.removed += 1;
                    if let Some(relation) = relations.by_a_id(id).cloned() {
                        match b_repo.delete(&relation.b_id) {
                            Ok(_) => {
                                relations.remove_by_a_id(id);
                            }
                            Err(error) => {
                                outcome.errors.push(EntityError::new(
                                    ActionKind::DeleteInB,
                                    &relation.b_id,
                                    error,
                                ));
                            }
                        }
                    }
                }
                Err(error) => {
                    outcome
                        .errors
                        .push(EntityError::new(ActionKind::DeleteInA, id, error));
                }
            }
        }

        a_repo.release(fetched.drain().map(|(_, entity)| entity).collect());
    }

    outcome
}
