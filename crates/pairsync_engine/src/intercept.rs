//! Post-derivation interception collapsing spurious delete+create pairs.

use pairsync_model::{EntityRelation, SyncAction};
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use tracing::debug;

/// Supplies the stable cross-system correlation key used to recognize
/// identity-discontinuous moves on side A.
///
/// The key is independent of either side's primary id: an A-entity can
/// change identity (a new local id) while carrying the same correlation
/// key. How the key is obtained for an existing relation is the caller's
/// concern (typically an application-maintained lookup), which is why the
/// extractor is supplied externally rather than derived from the relation
/// record itself.
pub trait CorrelationKeySource<AId, AVersion, BId, BVersion, A> {
    /// The correlation key recorded for an existing relation, if any.
    fn key_for_relation(
        &self,
        relation: &EntityRelation<AId, AVersion, BId, BVersion>,
    ) -> Option<String>;

    /// The correlation key carried by a live A-entity, if any.
    fn key_for_entity(&self, entity: &A) -> Option<String>;
}

/// Rewrites the derived action list to eliminate delete+create pairs that
/// are artifacts of identity discontinuity rather than real user intent.
///
/// When a `DeleteInB` (either retry variant) whose relation carries key K
/// coexists with a `CreateInB` whose new A-entity carries the same K, the
/// delete is rewritten to `Discard` and the create becomes an `UpdateAToB`
/// seeded with the deleted relation's B-id/B-version. The net effect is a
/// single update against the existing B-entity instead of delete-then-
/// recreate.
///
/// This is a pure rewrite over the full action list; it must run after all
/// actions for the pass have been derived, and its outcome is independent
/// of list order.
pub fn intercept_actions<AId, AVersion, BId, BVersion, A>(
    mut actions: Vec<SyncAction<AId, AVersion, BId, BVersion>>,
    a_entities: &HashMap<AId, A>,
    keys: &dyn CorrelationKeySource<AId, AVersion, BId, BVersion, A>,
) -> Vec<SyncAction<AId, AVersion, BId, BVersion>>
where
    AId: Clone + Eq + Hash + Debug,
    AVersion: Clone + PartialEq + Debug,
    BId: Clone + Eq + Hash + Debug,
    BVersion: Clone + PartialEq + Debug,
{
    // Index pending B-side deletes by correlation key.
    let mut deletes_by_key: HashMap<String, Vec<usize>> = HashMap::new();
    for (index, action) in actions.iter().enumerate() {
        if let SyncAction::DeleteInB { relation } | SyncAction::DeleteInBWithNoRetry { relation } =
            action
        {
            if let Some(key) = keys.key_for_relation(relation) {
                deletes_by_key.entry(key).or_default().push(index);
            }
        }
    }
    if deletes_by_key.is_empty() {
        return actions;
    }

    // Pair each create with the first unconsumed delete sharing its key.
    let mut rewrites: Vec<(usize, usize)> = Vec::new();
    for (create_index, action) in actions.iter().enumerate() {
        let SyncAction::CreateInB { a_id, .. } = action else {
            continue;
        };
        let Some(key) = a_entities.get(a_id).and_then(|a| keys.key_for_entity(a)) else {
            continue;
        };
        if let Some(indices) = deletes_by_key.get_mut(&key) {
            if !indices.is_empty() {
                rewrites.push((indices.remove(0), create_index));
            }
        }
    }

    for (delete_index, create_index) in rewrites {
        let old_relation = actions[delete_index]
            .relation()
            .cloned()
            .unwrap_or_else(|| unreachable!("delete actions always carry a relation"));
        let SyncAction::CreateInB { a_id, a_version } = actions[create_index].clone() else {
            unreachable!("rewrite target is a CreateInB");
        };

        debug!(
            a_id = ?a_id,
            b_id = ?old_relation.b_id,
            "collapsed delete+create into update"
        );

        actions[delete_index] = SyncAction::Discard {
            relation: old_relation.clone(),
        };
        actions[create_index] = SyncAction::UpdateAToB {
            relation: EntityRelation::new(
                a_id,
                a_version.clone(),
                old_relation.b_id,
                old_relation.b_version,
            ),
            a_version,
        };
    }

    actions
}
