//! Synchronization actions produced by the state deriver.

use crate::relation::EntityRelation;

/// The direction an update flows in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    /// A's content overwrites B.
    AToB,
    /// B's content overwrites A.
    BToA,
}

/// One synchronization outcome for one entity pair in one pass.
///
/// Actions are ephemeral: they exist only within a pass, are rewritten by
/// the interception step, and are executed by the orchestrator. The set is
/// closed and matched exhaustively; adding a variant is a compile error at
/// every dispatch site.
///
/// Variants carry the relation record (or the partial identifiers) they
/// were derived from, plus the newly observed version(s) that triggered
/// the action.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncAction<AId, AVersion, BId, BVersion> {
    /// Both sides are unchanged since the last reconciled state.
    DoNothing {
        /// The up-to-date relation.
        relation: EntityRelation<AId, AVersion, BId, BVersion>,
    },

    /// A B-entity with no counterpart must be created on side A.
    CreateInA {
        /// Identifier of the source B-entity.
        b_id: BId,
        /// Live version of the source B-entity.
        b_version: BVersion,
    },

    /// An A-entity with no counterpart must be created on side B.
    CreateInB {
        /// Identifier of the source A-entity.
        a_id: AId,
        /// Live version of the source A-entity.
        a_version: AVersion,
    },

    /// A changed; its content overwrites B.
    UpdateAToB {
        /// The relation being updated.
        relation: EntityRelation<AId, AVersion, BId, BVersion>,
        /// Newly observed A version.
        a_version: AVersion,
    },

    /// B changed; its content overwrites A.
    UpdateBToA {
        /// The relation being updated.
        relation: EntityRelation<AId, AVersion, BId, BVersion>,
        /// Newly observed B version.
        b_version: BVersion,
    },

    /// Both sides changed; the winning direction is resolved at execution
    /// time from the entities' modification instants.
    UpdateFromNewerToOlder {
        /// The relation in conflict.
        relation: EntityRelation<AId, AVersion, BId, BVersion>,
        /// Newly observed A version.
        a_version: AVersion,
        /// Newly observed B version.
        b_version: BVersion,
    },

    /// The B-entity disappeared; delete the A-entity. Retried next pass if
    /// the delete fails transiently.
    DeleteInA {
        /// The stale relation.
        relation: EntityRelation<AId, AVersion, BId, BVersion>,
    },

    /// Like [`SyncAction::DeleteInA`], but the relation is dropped even if
    /// the delete fails (no retry on a later pass).
    DeleteInAWithNoRetry {
        /// The stale relation.
        relation: EntityRelation<AId, AVersion, BId, BVersion>,
    },

    /// The A-entity disappeared; delete the B-entity.
    DeleteInB {
        /// The stale relation.
        relation: EntityRelation<AId, AVersion, BId, BVersion>,
    },

    /// Like [`SyncAction::DeleteInB`], but without retry on failure.
    DeleteInBWithNoRetry {
        /// The stale relation.
        relation: EntityRelation<AId, AVersion, BId, BVersion>,
    },

    /// Replicate mode: the non-authoritative A-entity disappeared while the
    /// authoritative B-entity exists; recreate A from B, keeping the same
    /// relation identity.
    RestoreInA {
        /// The relation whose A side is being recreated.
        relation: EntityRelation<AId, AVersion, BId, BVersion>,
    },

    /// Replicate mode: recreate the missing B-entity from A.
    RestoreInB {
        /// The relation whose B side is being recreated.
        relation: EntityRelation<AId, AVersion, BId, BVersion>,
    },

    /// Both sides disappeared; drop the relation without any repository I/O.
    Discard {
        /// The obsolete relation.
        relation: EntityRelation<AId, AVersion, BId, BVersion>,
    },
}

/// Fieldless discriminant of a [`SyncAction`], used for summary counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// See [`SyncAction::DoNothing`].
    DoNothing,
    /// See [`SyncAction::CreateInA`].
    CreateInA,
    /// See [`SyncAction::CreateInB`].
    CreateInB,
    /// See [`SyncAction::UpdateAToB`].
    UpdateAToB,
    /// See [`SyncAction::UpdateBToA`].
    UpdateBToA,
    /// See [`SyncAction::UpdateFromNewerToOlder`].
    UpdateFromNewerToOlder,
    /// See [`SyncAction::DeleteInA`].
    DeleteInA,
    /// See [`SyncAction::DeleteInAWithNoRetry`].
    DeleteInAWithNoRetry,
    /// See [`SyncAction::DeleteInB`].
    DeleteInB,
    /// See [`SyncAction::DeleteInBWithNoRetry`].
    DeleteInBWithNoRetry,
    /// See [`SyncAction::RestoreInA`].
    RestoreInA,
    /// See [`SyncAction::RestoreInB`].
    RestoreInB,
    /// See [`SyncAction::Discard`].
    Discard,
}

impl<AId, AVersion, BId, BVersion> SyncAction<AId, AVersion, BId, BVersion> {
    /// Returns the fieldless discriminant of this action.
    pub fn kind(&self) -> ActionKind {
        match self {
            SyncAction::DoNothing { .. } => ActionKind::DoNothing,
            SyncAction::CreateInA { .. } => ActionKind::CreateInA,
            SyncAction::CreateInB { .. } => ActionKind::CreateInB,
            SyncAction::UpdateAToB { .. } => ActionKind::UpdateAToB,
            SyncAction::UpdateBToA { .. } => ActionKind::UpdateBToA,
            SyncAction::UpdateFromNewerToOlder { .. } => ActionKind::UpdateFromNewerToOlder,
            SyncAction::DeleteInA { .. } => ActionKind::DeleteInA,
            SyncAction::DeleteInAWithNoRetry { .. } => ActionKind::DeleteInAWithNoRetry,
            SyncAction::DeleteInB { .. } => ActionKind::DeleteInB,
            SyncAction::DeleteInBWithNoRetry { .. } => ActionKind::DeleteInBWithNoRetry,
            SyncAction::RestoreInA { .. } => ActionKind::RestoreInA,
            SyncAction::RestoreInB { .. } => ActionKind::RestoreInB,
            SyncAction::Discard { .. } => ActionKind::Discard,
        }
    }

    /// Returns true if executing this action writes to either repository.
    pub fn is_write(&self) -> bool {
        !matches!(
            self,
            SyncAction::DoNothing { .. } | SyncAction::Discard { .. }
        )
    }

    /// Returns true if executing this action removes an entity.
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            SyncAction::DeleteInA { .. }
                | SyncAction::DeleteInAWithNoRetry { .. }
                | SyncAction::DeleteInB { .. }
                | SyncAction::DeleteInBWithNoRetry { .. }
        )
    }

    /// Returns the relation this action was derived from, if it carries one.
    pub fn relation(&self) -> Option<&EntityRelation<AId, AVersion, BId, BVersion>> {
        match self {
            SyncAction::DoNothing { relation }
            | SyncAction::UpdateAToB { relation, .. }
            | SyncAction::UpdateBToA { relation, .. }
            | SyncAction::UpdateFromNewerToOlder { relation, .. }
            | SyncAction::DeleteInA { relation }
            | SyncAction::DeleteInAWithNoRetry { relation }
            | SyncAction::DeleteInB { relation }
            | SyncAction::DeleteInBWithNoRetry { relation }
            | SyncAction::RestoreInA { relation }
            | SyncAction::RestoreInB { relation }
            | SyncAction::Discard { relation } => Some(relation),
            SyncAction::CreateInA { .. } | SyncAction::CreateInB { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Action = SyncAction<u32, u64, String, String>;

    fn rel() -> EntityRelation<u32, u64, String, String> {
        EntityRelation::new(1, 1, "b".into(), "v1".into())
    }

    #[test]
    fn kind_matches_variant() {
        let action: Action = SyncAction::DeleteInB { relation: rel() };
        assert_eq!(action.kind(), ActionKind::DeleteInB);

        let action: Action = SyncAction::CreateInB {
            a_id: 3,
            a_version: 9,
        };
        assert_eq!(action.kind(), ActionKind::CreateInB);
    }

    #[test]
    fn write_and_destructive_predicates() {
        let nothing: Action = SyncAction::DoNothing { relation: rel() };
        assert!(!nothing.is_write());
        assert!(!nothing.is_destructive());

        let discard: Action = SyncAction::Discard { relation: rel() };
        assert!(!discard.is_write());

        let delete: Action = SyncAction::DeleteInAWithNoRetry { relation: rel() };
        assert!(delete.is_write());
        assert!(delete.is_destructive());

        let update: Action = SyncAction::UpdateAToB {
            relation: rel(),
            a_version: 2,
        };
        assert!(update.is_write());
        assert!(!update.is_destructive());
    }

    #[test]
    fn relation_accessor() {
        let create: Action = SyncAction::CreateInA {
            b_id: "b".into(),
            b_version: "v".into(),
        };
        assert!(create.relation().is_none());

        let restore: Action = SyncAction::RestoreInA { relation: rel() };
        assert_eq!(restore.relation().unwrap().a_id, 1);
    }
}
