//! The per-pair state machine deriving one action per entity pair.

use crate::config::ProfileConfig;
use crate::config::SyncMode;
use pairsync_model::{EntityRelation, SyncAction, SyncDirection};
use std::fmt::Debug;
use std::hash::Hash;

/// Classifies each (relation, live A version, live B version) triple into
/// exactly one [`SyncAction`].
///
/// The deriver is a pure, synchronous computation: it performs no I/O and
/// holds no state across pairs. Initial-state construction (relations
/// produced by the initial matcher) and steady-state re-derivation
/// (relations loaded from the store) share the same transition logic; only
/// the origin of the relation differs.
#[derive(Debug)]
pub struct StateDeriver<'a, AId, AVersion, BId, BVersion> {
    config: &'a ProfileConfig<AId, AVersion, BId, BVersion>,
}

impl<'a, AId, AVersion, BId, BVersion> StateDeriver<'a, AId, AVersion, BId, BVersion>
where
    AId: Clone + Eq + Hash + Debug,
    AVersion: Clone + PartialEq + Debug,
    BId: Clone + Eq + Hash + Debug,
    BVersion: Clone + PartialEq + Debug,
{
    /// Creates a deriver for the given profile.
    pub fn new(config: &'a ProfileConfig<AId, AVersion, BId, BVersion>) -> Self {
        Self { config }
    }

    /// Derives the action for a pair with an existing relation.
    ///
    /// `live_a`/`live_b` are the versions currently reported by the
    /// repositories, or `None` if the entity is gone.
    pub fn derive(
        &self,
        relation: &EntityRelation<AId, AVersion, BId, BVersion>,
        live_a: Option<&AVersion>,
        live_b: Option<&BVersion>,
    ) -> SyncAction<AId, AVersion, BId, BVersion> {
        match (live_a, live_b) {
            (Some(a), Some(b)) => self.derive_both_present(relation, a, b),
            (None, Some(b)) => self.derive_a_absent(relation, b),
            (Some(a), None) => self.derive_b_absent(relation, a),
            (None, None) => SyncAction::Discard {
                relation: relation.clone(),
            },
        }
    }

    fn derive_both_present(
        &self,
        relation: &EntityRelation<AId, AVersion, BId, BVersion>,
        live_a: &AVersion,
        live_b: &BVersion,
    ) -> SyncAction<AId, AVersion, BId, BVersion> {
        let a_changed = *live_a != relation.a_version;
        let b_changed = *live_b != relation.b_version;

        match self.config.mode {
            SyncMode::TwoWay => match (a_changed, b_changed) {
                (false, false) => SyncAction::DoNothing {
                    relation: relation.clone(),
                },
                (true, false) => self.update_a_to_b(relation, live_a),
                (false, true) => self.update_b_to_a(relation, live_b),
                (true, true) => match self.config.conflict_strategy.fixed_direction() {
                    Some(SyncDirection::AToB) => self.update_a_to_b(relation, live_a),
                    Some(SyncDirection::BToA) => self.update_b_to_a(relation, live_b),
                    None => SyncAction::UpdateFromNewerToOlder {
                        relation: relation.clone(),
                        a_version: live_a.clone(),
                        b_version: live_b.clone(),
                    },
                },
            },
            // Replicate: any divergence is overwritten from the
            // authoritative side, including local edits on the mirror.
            SyncMode::ReplicateAToB => {
                if a_changed || b_changed {
                    self.update_a_to_b(relation, live_a)
                } else {
                    SyncAction::DoNothing {
                        relation: relation.clone(),
                    }
                }
            }
            SyncMode::ReplicateBToA => {
                if a_changed || b_changed {
                    self.update_b_to_a(relation, live_b)
                } else {
                    SyncAction::DoNothing {
                        relation: relation.clone(),
                    }
                }
            }
            // Merge: only source-side changes propagate; target-side local
            // edits are tolerated. A concurrent source change still wins.
            SyncMode::MergeAToB => {
                if a_changed {
                    self.update_a_to_b(relation, live_a)
                } else {
                    SyncAction::DoNothing {
                        relation: relation.clone(),
                    }
                }
            }
            SyncMode::MergeBToA => {
                if b_changed {
                    self.update_b_to_a(relation, live_b)
                } else {
                    SyncAction::DoNothing {
                        relation: relation.clone(),
                    }
                }
            }
        }
    }

    fn derive_a_absent(
        &self,
        relation: &EntityRelation<AId, AVersion, BId, BVersion>,
        live_b: &BVersion,
    ) -> SyncAction<AId, AVersion, BId, BVersion> {
        let b_changed = *live_b != relation.b_version;
        match self.config.mode {
            SyncMode::TwoWay => {
                if b_changed {
                    // The external edit on B outranks A's deletion: the
                    // entity is resurrected on side A.
                    SyncAction::CreateInA {
                        b_id: relation.b_id.clone(),
                        b_version: live_b.clone(),
                    }
                } else {
                    self.delete_in_b(relation)
                }
            }
            SyncMode::ReplicateAToB | SyncMode::MergeAToB => self.delete_in_b(relation),
            SyncMode::ReplicateBToA => SyncAction::RestoreInA {
                relation: relation.clone(),
            },
            SyncMode::MergeBToA => SyncAction::CreateInA {
                b_id: relation.b_id.clone(),
                b_version: live_b.clone(),
            },
        }
    }

    fn derive_b_absent(
        &self,
        relation: &EntityRelation<AId, AVersion, BId, BVersion>,
        live_a: &AVersion,
    ) -> SyncAction<AId, AVersion, BId, BVersion> {
        let a_changed = *live_a != relation.a_version;
        match self.config.mode {
            SyncMode::TwoWay => {
                if a_changed {
                    SyncAction::CreateInB {
                        a_id: relation.a_id.clone(),
                        a_version: live_a.clone(),
                    }
                } else {
                    self.delete_in_a(relation)
                }
            }
            SyncMode::ReplicateBToA | SyncMode::MergeBToA => self.delete_in_a(relation),
            SyncMode::ReplicateAToB => SyncAction::RestoreInB {
                relation: relation.clone(),
            },
            SyncMode::MergeAToB => SyncAction::CreateInB {
                a_id: relation.a_id.clone(),
                a_version: live_a.clone(),
            },
        }
    }

    fn update_a_to_b(
        &self,
        relation: &EntityRelation<AId, AVersion, BId, BVersion>,
        live_a: &AVersion,
    ) -> SyncAction<AId, AVersion, BId, BVersion> {
        SyncAction::UpdateAToB {
            relation: relation.clone(),
            a_version: live_a.clone(),
        }
    }

    fn update_b_to_a(
        &self,
        relation: &EntityRelation<AId, AVersion, BId, BVersion>,
        live_b: &BVersion,
    ) -> SyncAction<AId, AVersion, BId, BVersion> {
        SyncAction::UpdateBToA {
            relation: relation.clone(),
            b_version: live_b.clone(),
        }
    }

    fn delete_in_a(
        &self,
        relation: &EntityRelation<AId, AVersion, BId, BVersion>,
    ) -> SyncAction<AId, AVersion, BId, BVersion> {
        if self.config.delete_retry.retry_delete_in_a(relation) {
            SyncAction::DeleteInA {
                relation: relation.clone(),
            }
        } else {
            SyncAction::DeleteInAWithNoRetry {
                relation: relation.clone(),
            }
        }
    }

    fn delete_in_b(
        &self,
        relation: &EntityRelation<AId, AVersion, BId, BVersion>,
    ) -> SyncAction<AId, AVersion, BId, BVersion> {
        if self.config.delete_retry.retry_delete_in_b(relation) {
            SyncAction::DeleteInB {
                relation: relation.clone(),
            }
        } else {
            SyncAction::DeleteInBWithNoRetry {
                relation: relation.clone(),
            }
        }
    }

    /// Action for a pair the initial matcher just related.
    ///
    /// Two-way modes treat first contact as already-equal (the match
    /// predicate is exact content equality); one-way modes still push the
    /// authoritative side's content so opaque fields converge.
    pub fn matched_pair_action(
        &self,
        relation: EntityRelation<AId, AVersion, BId, BVersion>,
    ) -> SyncAction<AId, AVersion, BId, BVersion> {
        match self.config.mode {
            SyncMode::TwoWay => SyncAction::DoNothing { relation },
            SyncMode::ReplicateAToB | SyncMode::MergeAToB => {
                let a_version = relation.a_version.clone();
                SyncAction::UpdateAToB {
                    relation,
                    a_version,
                }
            }
            SyncMode::ReplicateBToA | SyncMode::MergeBToA => {
                let b_version = relation.b_version.clone();
                SyncAction::UpdateBToA {
                    relation,
                    b_version,
                }
            }
        }
    }

    /// Action for an unrelated, unmatched A-entity. `None` when the mode
    /// cannot create on side B; the stray entity is left alone.
    pub fn unmatched_a_action(
        &self,
        a_id: AId,
        a_version: AVersion,
    ) -> Option<SyncAction<AId, AVersion, BId, BVersion>> {
        self.config
            .mode
            .writes_to_b()
            .then(|| SyncAction::CreateInB { a_id, a_version })
    }

    /// Action for an unrelated, unmatched B-entity.
    pub fn unmatched_b_action(
        &self,
        b_id: BId,
        b_version: BVersion,
    ) -> Option<SyncAction<AId, AVersion, BId, BVersion>> {
        self.config
            .mode
            .writes_to_a()
            .then(|| SyncAction::CreateInA { b_id, b_version })
    }
}
