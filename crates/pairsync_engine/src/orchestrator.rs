//! One synchronization pass, end to end.

use crate::config::ProfileConfig;
use crate::deriver::StateDeriver;
use crate::duplicates::{reconcile_duplicates, DuplicateTracker};
use crate::error::{EngineError, EngineResult, EntityError};
use crate::intercept::{intercept_actions, CorrelationKeySource};
use crate::matcher::{InitialMatcher, MatchCriteria};
use crate::store::RelationStore;
use chrono::{DateTime, Utc};
use pairsync_model::{
    ActionKind, EntityMapper, EntityRelation, EntityRepository, Fingerprint, RelationSet,
    RepositoryError, SyncAction, SyncDirection,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

type RelationOf<RA, RB> = EntityRelation<
    <RA as EntityRepository>::Id,
    <RA as EntityRepository>::Version,
    <RB as EntityRepository>::Id,
    <RB as EntityRepository>::Version,
>;

type ActionOf<RA, RB> = SyncAction<
    <RA as EntityRepository>::Id,
    <RA as EntityRepository>::Version,
    <RB as EntityRepository>::Id,
    <RB as EntityRepository>::Version,
>;

/// Report of one completed (or cancelled) pass.
#[derive(Debug, Default)]
pub struct PassSummary {
    counts: HashMap<ActionKind, usize>,
    /// Per-entity failures, isolated from the rest of the pass.
    pub errors: Vec<EntityError>,
    /// Duplicates removed by the reconciler.
    pub duplicates_removed: usize,
    /// True if the pass was cancelled between entities; remaining actions
    /// are simply re-derived next pass.
    pub cancelled: bool,
    /// Wall-clock duration of the pass.
    pub duration: Duration,
}

impl PassSummary {
    fn record(&mut self, kind: ActionKind) {
        *self.counts.entry(kind).or_insert(0) += 1;
    }

    /// Number of successfully executed actions of the given kind.
    pub fn count(&self, kind: ActionKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    /// All per-kind counters.
    pub fn counts(&self) -> &HashMap<ActionKind, usize> {
        &self.counts
    }

    /// True if the pass changed nothing: every executed action was
    /// `DoNothing`, no errors, no duplicates removed.
    pub fn is_quiescent(&self) -> bool {
        !self.cancelled
            && self.errors.is_empty()
            && self.duplicates_removed == 0
            && self
                .counts
                .keys()
                .all(|kind| matches!(kind, ActionKind::DoNothing))
    }
}

/// Working state threaded through one pass.
struct PassState<RA: EntityRepository, RB: EntityRepository> {
    relations: RelationSet<RA::Id, RA::Version, RB::Id, RB::Version>,
    a_entities: HashMap<RA::Id, RA::Entity>,
    b_entities: HashMap<RB::Id, RB::Entity>,
    a_live: HashMap<RA::Id, RA::Version>,
    b_live: HashMap<RB::Id, RB::Version>,
    tracker: DuplicateTracker<RA::Id>,
}

/// Drives one synchronization pass: enumerate, match, derive, intercept,
/// execute, persist, reconcile.
///
/// A pass is logically sequential, and the state machine and interception
/// are pure in-memory computations. Repository calls are the only I/O; a
/// failed or cancelled call leaves the affected entity's relation
/// un-mutated so the next pass re-derives it. Only one pass may run at a
/// time per profile.
pub struct Synchronizer<RA, RB, M, S>
where
    RA: EntityRepository,
    RB: EntityRepository,
{
    a_repo: RA,
    b_repo: RB,
    mapper: M,
    store: S,
    config: ProfileConfig<RA::Id, RA::Version, RB::Id, RB::Version>,
    match_criteria: Option<Box<dyn MatchCriteria<RA::Entity, RB::Entity> + Send + Sync>>,
    correlation_keys: Option<
        Box<
            dyn CorrelationKeySource<RA::Id, RA::Version, RB::Id, RB::Version, RA::Entity>
                + Send
                + Sync,
        >,
    >,
    a_modified: Box<dyn Fn(&RA::Entity) -> Option<DateTime<Utc>> + Send + Sync>,
    b_modified: Box<dyn Fn(&RB::Entity) -> Option<DateTime<Utc>> + Send + Sync>,
    a_fingerprint: Option<Box<dyn Fn(&RA::Entity) -> Option<Fingerprint> + Send + Sync>>,
    cancelled: AtomicBool,
}

impl<RA, RB, M, S> Synchronizer<RA, RB, M, S>
where
    RA: EntityRepository,
    RB: EntityRepository,
    M: EntityMapper<RA::Entity, RB::Entity>,
    S: RelationStore<RA::Id, RA::Version, RB::Id, RB::Version>,
{
    /// Creates a synchronizer with no initial matching, no correlation
    /// keys, no modification instants, and no duplicate reconciliation;
    /// opt into each with the builder methods.
    pub fn new(
        a_repo: RA,
        b_repo: RB,
        mapper: M,
        store: S,
        config: ProfileConfig<RA::Id, RA::Version, RB::Id, RB::Version>,
    ) -> Self {
        Self {
            a_repo,
            b_repo,
            mapper,
            store,
            config,
            match_criteria: None,
            correlation_keys: None,
            a_modified: Box::new(|_| None),
            b_modified: Box::new(|_| None),
            a_fingerprint: None,
            cancelled: AtomicBool::new(false),
        }
    }

    /// Enables content-aware initial matching for unrelated entities.
    pub fn with_match_criteria(
        mut self,
        criteria: impl MatchCriteria<RA::Entity, RB::Entity> + Send + Sync + 'static,
    ) -> Self {
        self.match_criteria = Some(Box::new(criteria));
        self
    }

    /// Enables the delete+create interception pass with the given
    /// correlation key source.
    pub fn with_correlation_keys(
        mut self,
        keys: impl CorrelationKeySource<RA::Id, RA::Version, RB::Id, RB::Version, RA::Entity>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.correlation_keys = Some(Box::new(keys));
        self
    }

    /// Supplies the modification-instant extractors used by automatic
    /// conflict resolution. Entities for which the extractor returns
    /// `None` are treated as never modified.
    pub fn with_modification_instants(
        mut self,
        a_modified: impl Fn(&RA::Entity) -> Option<DateTime<Utc>> + Send + Sync + 'static,
        b_modified: impl Fn(&RB::Entity) -> Option<DateTime<Utc>> + Send + Sync + 'static,
    ) -> Self {
        self.a_modified = Box::new(a_modified);
        self.b_modified = Box::new(b_modified);
        self
    }

    /// Enables post-run duplicate reconciliation over side A, using the
    /// given content fingerprinter.
    pub fn with_fingerprinter(
        mut self,
        fingerprint: impl Fn(&RA::Entity) -> Option<Fingerprint> + Send + Sync + 'static,
    ) -> Self {
        self.a_fingerprint = Some(Box::new(fingerprint));
        self
    }

    /// Requests cancellation of the pass currently running on another
    /// thread. The pass stops between entities; completed relation updates
    /// stay committed and the rest is re-derived next pass.
    ///
    /// [`run_pass`](Self::run_pass) clears the flag when it starts, so a
    /// call made while no pass is running has no effect on a later pass.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Runs one full pass and reports what it did.
    pub fn run_pass(&self) -> EngineResult<PassSummary> {
        let started = Instant::now();
        self.cancelled.store(false, Ordering::SeqCst);

        let relations = RelationSet::from_records(self.store.load()?)
            .map_err(|error| EngineError::RelationStore(error.into()))?;

        let a_list = self
            .a_repo
            .list_current_versions()
            .map_err(EngineError::Enumeration)?;
        let b_list = self
            .b_repo
            .list_current_versions()
            .map_err(EngineError::Enumeration)?;

        info!(
            a_entities = a_list.len(),
            b_entities = b_list.len(),
            relations = relations.len(),
            mode = ?self.config.mode,
            "pass started"
        );

        let mut state = PassState::<RA, RB> {
            a_live: a_list.iter().cloned().collect(),
            b_live: b_list.iter().cloned().collect(),
            relations,
            a_entities: HashMap::new(),
            b_entities: HashMap::new(),
            tracker: DuplicateTracker::new(),
        };

        let result = self.execute_pass(&mut state, &a_list, &b_list);

        // Fetched entities go back to their repositories whether the pass
        // completed or aborted.
        self.a_repo
            .release(std::mem::take(&mut state.a_entities).into_values().collect());
        self.b_repo
            .release(std::mem::take(&mut state.b_entities).into_values().collect());

        let mut summary = result?;
        summary.duration = started.elapsed();
        info!(
            errors = summary.errors.len(),
            duplicates_removed = summary.duplicates_removed,
            cancelled = summary.cancelled,
            "pass finished"
        );
        Ok(summary)
    }

    /// The fallible body of a pass, separated so `run_pass` can release
    /// fetched entities on every exit path.
    fn execute_pass(
        &self,
        state: &mut PassState<RA, RB>,
        a_list: &[(RA::Id, RA::Version)],
        b_list: &[(RB::Id, RB::Version)],
    ) -> EngineResult<PassSummary> {
        let mut summary = PassSummary::default();

        let actions = self.derive_actions(state, a_list, b_list)?;
        self.fetch_for_execution(state, &actions)?;

        let actions = match &self.correlation_keys {
            Some(keys) => intercept_actions(actions, &state.a_entities, keys.as_ref()),
            None => actions,
        };

        // Observe fetched A entities for duplicate detection, in the
        // repository's enumeration order so reconciliation is
        // deterministic.
        if let Some(fingerprint) = &self.a_fingerprint {
            for (a_id, _) in a_list {
                if let Some(found) = state.a_entities.get(a_id).and_then(|e| fingerprint(e)) {
                    state.tracker.observe(a_id.clone(), found);
                }
            }
        }

        // Prove the store is writable before anything irreversible
        // happens: a delete whose bookkeeping cannot be persisted must
        // not run.
        if actions.iter().any(|action| action.is_destructive()) {
            self.store.save(state.relations.records())?;
        }

        for action in actions {
            if self.cancelled.load(Ordering::SeqCst) {
                warn!("pass cancelled; remaining actions deferred to next pass");
                summary.cancelled = true;
                break;
            }
            let kind = action.kind();
            match self.execute_action(state, action) {
                Ok(true) => summary.record(kind),
                Ok(false) => debug!(?kind, "action skipped; entity vanished mid-pass"),
                Err(error) => {
                    warn!(%error, "entity-level failure isolated");
                    summary.errors.push(error);
                }
            }
        }

        // Durable bookkeeping: a failed save means this pass's results are
        // not committed, and the error is fatal.
        self.store.save(state.relations.records())?;

        if let (Some(fingerprint), false) = (&self.a_fingerprint, summary.cancelled) {
            let outcome = reconcile_duplicates(
                &state.tracker,
                &self.a_repo,
                &self.b_repo,
                &mut state.relations,
                fingerprint.as_ref(),
            );
            summary.duplicates_removed = outcome.removed;
            summary.errors.extend(outcome.errors);
            if outcome.removed > 0 {
                self.store.save(state.relations.records())?;
            }
        }

        Ok(summary)
    }

    /// Builds the initial action list: one action per existing relation,
    /// then initial matching and create logic for unrelated entities.
    fn derive_actions(
        &self,
        state: &mut PassState<RA, RB>,
        a_list: &[(RA::Id, RA::Version)],
        b_list: &[(RB::Id, RB::Version)],
    ) -> EngineResult<Vec<ActionOf<RA, RB>>> {
        let deriver = StateDeriver::new(&self.config);
        let mut actions = Vec::new();

        for relation in state.relations.records() {
            actions.push(deriver.derive(
                relation,
                state.a_live.get(&relation.a_id),
                state.b_live.get(&relation.b_id),
            ));
        }

        let related_a: HashSet<RA::Id> = state
            .relations
            .records()
            .iter()
            .map(|r| r.a_id.clone())
            .collect();
        let related_b: HashSet<RB::Id> = state
            .relations
            .records()
            .iter()
            .map(|r| r.b_id.clone())
            .collect();
        let unrelated_a: Vec<&(RA::Id, RA::Version)> = a_list
            .iter()
            .filter(|(id, _)| !related_a.contains(id))
            .collect();
        let unrelated_b: Vec<&(RB::Id, RB::Version)> = b_list
            .iter()
            .filter(|(id, _)| !related_b.contains(id))
            .collect();

        let (mut unmatched_a, mut unmatched_b): (Vec<RA::Id>, Vec<RB::Id>) = (
            unrelated_a.iter().map(|(id, _)| id.clone()).collect(),
            unrelated_b.iter().map(|(id, _)| id.clone()).collect(),
        );

        if let Some(criteria) = &self.match_criteria {
            if !unrelated_a.is_empty() && !unrelated_b.is_empty() {
                self.fetch_a(&unmatched_a, &mut state.a_entities)?;
                self.fetch_b(&unmatched_b, &mut state.b_entities)?;

                let a_refs: Vec<(RA::Id, &RA::Entity)> = unmatched_a
                    .iter()
                    .filter_map(|id| state.a_entities.get(id).map(|e| (id.clone(), e)))
                    .collect();
                let b_refs: Vec<(RB::Id, &RB::Entity)> = unmatched_b
                    .iter()
                    .filter_map(|id| state.b_entities.get(id).map(|e| (id.clone(), e)))
                    .collect();

                let matcher = InitialMatcher::new(&**criteria);
                let outcome = matcher.match_entities(&a_refs, &b_refs);

                for (a_id, b_id) in outcome.pairs {
                    let relation = EntityRelation::new(
                        a_id.clone(),
                        state.a_live[&a_id].clone(),
                        b_id.clone(),
                        state.b_live[&b_id].clone(),
                    );
                    actions.push(deriver.matched_pair_action(relation));
                }
                unmatched_a = outcome.unmatched_a;
                unmatched_b = outcome.unmatched_b;
            }
        }

        for a_id in unmatched_a {
            let a_version = state.a_live[&a_id].clone();
            if let Some(action) = deriver.unmatched_a_action(a_id, a_version) {
                actions.push(action);
            }
        }
        for b_id in unmatched_b {
            let b_version = state.b_live[&b_id].clone();
            if let Some(action) = deriver.unmatched_b_action(b_id, b_version) {
                actions.push(action);
            }
        }

        Ok(actions)
    }

    /// Fetches every entity the action list needs before execution starts,
    /// so the interception pass can see the new A-entities' correlation
    /// keys and execution never interleaves fetches with writes.
    fn fetch_for_execution(
        &self,
        state: &mut PassState<RA, RB>,
        actions: &[ActionOf<RA, RB>],
    ) -> EngineResult<()> {
        let mut need_a = Vec::new();
        let mut need_b = Vec::new();
        for action in actions {
            match action {
                SyncAction::CreateInB { a_id, .. } => need_a.push(a_id.clone()),
                SyncAction::CreateInA { b_id, .. } => need_b.push(b_id.clone()),
                SyncAction::UpdateAToB { relation, .. } => need_a.push(relation.a_id.clone()),
                SyncAction::UpdateBToA { relation, .. } => need_b.push(relation.b_id.clone()),
                SyncAction::UpdateFromNewerToOlder { relation, .. } => {
                    need_a.push(relation.a_id.clone());
                    need_b.push(relation.b_id.clone());
                }
                SyncAction::RestoreInA { relation } => need_b.push(relation.b_id.clone()),
                SyncAction::RestoreInB { relation } => need_a.push(relation.a_id.clone()),
                SyncAction::DoNothing { .. }
                | SyncAction::Discard { .. }
                | SyncAction::DeleteInA { .. }
                | SyncAction::DeleteInAWithNoRetry { .. }
                | SyncAction::DeleteInB { .. }
                | SyncAction::DeleteInBWithNoRetry { .. } => {}
            }
        }
        self.fetch_a(&need_a, &mut state.a_entities)?;
        self.fetch_b(&need_b, &mut state.b_entities)?;
        Ok(())
    }

    fn fetch_a(
        &self,
        ids: &[RA::Id],
        into: &mut HashMap<RA::Id, RA::Entity>,
    ) -> EngineResult<()> {
        let missing: Vec<RA::Id> = ids
            .iter()
            .filter(|id| !into.contains_key(*id))
            .cloned()
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        into.extend(
            self.a_repo
                .fetch_by_ids(&missing)
                .map_err(EngineError::Fetch)?,
        );
        Ok(())
    }

    fn fetch_b(
        &self,
        ids: &[RB::Id],
        into: &mut HashMap<RB::Id, RB::Entity>,
    ) -> EngineResult<()> {
        let missing: Vec<RB::Id> = ids
            .iter()
            .filter(|id| !into.contains_key(*id))
            .cloned()
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        into.extend(
            self.b_repo
                .fetch_by_ids(&missing)
                .map_err(EngineError::Fetch)?,
        );
        Ok(())
    }

    /// Executes one action. `Ok(true)` means applied; `Ok(false)` means
    /// skipped because a source entity vanished mid-pass (the next pass
    /// re-derives it); `Err` is an isolated per-entity failure.
    fn execute_action(
        &self,
        state: &mut PassState<RA, RB>,
        action: ActionOf<RA, RB>,
    ) -> Result<bool, EntityError> {
        match action {
            SyncAction::DoNothing { relation } => {
                // Covers first-contact matches: the freshly built relation
                // is committed even though no content moves.
                state.relations.upsert(relation);
                Ok(true)
            }
            SyncAction::Discard { relation } => {
                // Remove only the exact record the action carries. One of
                // its ids may have been re-paired by an earlier action in
                // this pass (an intercepted create upserts a new relation
                // for the same B-id), and that newer record must survive.
                if state
                    .relations
                    .by_a_id(&relation.a_id)
                    .is_some_and(|found| found.b_id == relation.b_id)
                {
                    state.relations.remove_by_a_id(&relation.a_id);
                }
                Ok(true)
            }
            SyncAction::CreateInB { a_id, a_version } => {
                self.exec_create_in_b(state, a_id, a_version)
            }
            SyncAction::CreateInA { b_id, b_version } => {
                self.exec_create_in_a(state, b_id, b_version)
            }
            SyncAction::UpdateAToB {
                relation,
                a_version,
            } => self.exec_update_a_to_b(state, relation, a_version),
            SyncAction::UpdateBToA {
                relation,
                b_version,
            } => self.exec_update_b_to_a(state, relation, b_version),
            SyncAction::UpdateFromNewerToOlder {
                relation,
                a_version,
                b_version,
            } => {
                let a_instant = state
                    .a_entities
                    .get(&relation.a_id)
                    .and_then(|a| (self.a_modified)(a));
                let b_instant = state
                    .b_entities
                    .get(&relation.b_id)
                    .and_then(|b| (self.b_modified)(b));
                match self.config.conflict_strategy.resolve(a_instant, b_instant) {
                    SyncDirection::AToB => self.exec_update_a_to_b(state, relation, a_version),
                    SyncDirection::BToA => self.exec_update_b_to_a(state, relation, b_version),
                }
            }
            SyncAction::DeleteInA { relation } => match self.a_repo.delete(&relation.a_id) {
                // NotFound means already deleted externally; the relation
                // is stale either way.
                Ok(_) | Err(RepositoryError::NotFound) => {
                    state.tracker.forget(&relation.a_id);
                    state.relations.remove_by_a_id(&relation.a_id);
                    Ok(true)
                }
                Err(error) => Err(EntityError::new(
                    ActionKind::DeleteInA,
                    &relation.a_id,
                    error,
                )),
            },
            SyncAction::DeleteInAWithNoRetry { relation } => {
                let result = self.a_repo.delete(&relation.a_id);
                // The relation is dropped whatever happened; this delete
                // is never re-derived.
                state.relations.remove_by_a_id(&relation.a_id);
                match result {
                    Ok(_) => {
                        state.tracker.forget(&relation.a_id);
                        Ok(true)
                    }
                    Err(error) => Err(EntityError::new(
                        ActionKind::DeleteInAWithNoRetry,
                        &relation.a_id,
                        error,
                    )),
                }
            }
            SyncAction::DeleteInB { relation } => match self.b_repo.delete(&relation.b_id) {
                Ok(_) | Err(RepositoryError::NotFound) => {
                    state.relations.remove_by_b_id(&relation.b_id);
                    Ok(true)
                }
                Err(error) => Err(EntityError::new(
                    ActionKind::DeleteInB,
                    &relation.b_id,
                    error,
                )),
            },
            SyncAction::DeleteInBWithNoRetry { relation } => {
                let result = self.b_repo.delete(&relation.b_id);
                state.relations.remove_by_b_id(&relation.b_id);
                match result {
                    Ok(_) => Ok(true),
                    Err(error) => Err(EntityError::new(
                        ActionKind::DeleteInBWithNoRetry,
                        &relation.b_id,
                        error,
                    )),
                }
            }
            SyncAction::RestoreInA { relation } => self.exec_restore_in_a(state, relation),
            SyncAction::RestoreInB { relation } => self.exec_restore_in_b(state, relation),
        }
    }

    fn exec_create_in_b(
        &self,
        state: &mut PassState<RA, RB>,
        a_id: RA::Id,
        a_version: RA::Version,
    ) -> Result<bool, EntityError> {
        let Some(a) = state.a_entities.get(&a_id) else {
            return Ok(false);
        };
        match self
            .b_repo
            .create(&mut |blank| self.mapper.map_a_to_b(a, Some(blank)))
        {
            Ok((b_id, b_version)) => {
                state
                    .relations
                    .upsert(EntityRelation::new(a_id, a_version, b_id, b_version));
                Ok(true)
            }
            Err(error) => Err(EntityError::new(ActionKind::CreateInB, &a_id, error)),
        }
    }

    fn exec_create_in_a(
        &self,
        state: &mut PassState<RA, RB>,
        b_id: RB::Id,
        b_version: RB::Version,
    ) -> Result<bool, EntityError> {
        let Some(b) = state.b_entities.get(&b_id) else {
            return Ok(false);
        };
        match self
            .a_repo
            .create(&mut |blank| self.mapper.map_b_to_a(b, Some(blank)))
        {
            Ok((a_id, a_version)) => {
                state.relations.upsert(EntityRelation::new(
                    a_id.clone(),
                    a_version,
                    b_id,
                    b_version,
                ));
                self.observe_created_a(state, &a_id);
                Ok(true)
            }
            Err(error) => Err(EntityError::new(ActionKind::CreateInA, &b_id, error)),
        }
    }

    fn exec_update_a_to_b(
        &self,
        state: &mut PassState<RA, RB>,
        relation: RelationOf<RA, RB>,
        a_version: RA::Version,
    ) -> Result<bool, EntityError> {
        let Some(a) = state.a_entities.get(&relation.a_id) else {
            return Ok(false);
        };
        match self
            .b_repo
            .update(&relation.b_id, &mut |b| self.mapper.map_a_to_b(a, Some(b)))
        {
            Ok((b_id, b_version)) => {
                state.relations.upsert(EntityRelation::new(
                    relation.a_id,
                    a_version,
                    b_id,
                    b_version,
                ));
                Ok(true)
            }
            Err(RepositoryError::NotFound) => {
                // B disappeared between enumeration and execution: treat as
                // absence and recreate instead of failing the entity.
                debug!(b_id = ?relation.b_id, "update target gone; recreating");
                state.relations.remove_by_b_id(&relation.b_id);
                self.exec_create_in_b(state, relation.a_id, a_version)
            }
            Err(error) => Err(EntityError::new(
                ActionKind::UpdateAToB,
                &relation.b_id,
                error,
            )),
        }
    }

    fn exec_update_b_to_a(
        &self,
        state: &mut PassState<RA, RB>,
        relation: RelationOf<RA, RB>,
        b_version: RB::Version,
    ) -> Result<bool, EntityError> {
        let Some(b) = state.b_entities.get(&relation.b_id) else {
            return Ok(false);
        };
        match self
            .a_repo
            .update(&relation.a_id, &mut |a| self.mapper.map_b_to_a(b, Some(a)))
        {
            Ok((a_id, a_version)) => {
                state.relations.upsert(EntityRelation::new(
                    a_id.clone(),
                    a_version,
                    relation.b_id,
                    b_version,
                ));
                self.observe_created_a(state, &a_id);
                Ok(true)
            }
            Err(RepositoryError::NotFound) => {
                debug!(a_id = ?relation.a_id, "update target gone; recreating");
                state.relations.remove_by_a_id(&relation.a_id);
                state.tracker.forget(&relation.a_id);
                self.exec_create_in_a(state, relation.b_id, b_version)
            }
            Err(error) => Err(EntityError::new(
                ActionKind::UpdateBToA,
                &relation.a_id,
                error,
            )),
        }
    }

    fn exec_restore_in_a(
        &self,
        state: &mut PassState<RA, RB>,
        relation: RelationOf<RA, RB>,
    ) -> Result<bool, EntityError> {
        let Some(b) = state.b_entities.get(&relation.b_id) else {
            return Ok(false);
        };
        match self
            .a_repo
            .create(&mut |blank| self.mapper.map_b_to_a(b, Some(blank)))
        {
            Ok((a_id, a_version)) => {
                // Same relation identity, new A side: the B pairing (and
                // any opaque metadata tied to it) survives the restore.
                let b_version = state
                    .b_live
                    .get(&relation.b_id)
                    .cloned()
                    .unwrap_or(relation.b_version);
                state.relations.upsert(EntityRelation::new(
                    a_id.clone(),
                    a_version,
                    relation.b_id,
                    b_version,
                ));
                self.observe_created_a(state, &a_id);
                Ok(true)
            }
            Err(error) => Err(EntityError::new(
                ActionKind::RestoreInA,
                &relation.b_id,
                error,
            )),
        }
    }

    fn exec_restore_in_b(
        &self,
        state: &mut PassState<RA, RB>,
        relation: RelationOf<RA, RB>,
    ) -> Result<bool, EntityError> {
        let Some(a) = state.a_entities.get(&relation.a_id) else {
            return Ok(false);
        };
        match self
            .b_repo
            .create(&mut |blank| self.mapper.map_a_to_b(a, Some(blank)))
        {
            Ok((b_id, b_version)) => {
                let a_version = state
                    .a_live
                    .get(&relation.a_id)
                    .cloned()
                    .unwrap_or(relation.a_version);
                state.relations.upsert(EntityRelation::new(
                    relation.a_id,
                    a_version,
                    b_id,
                    b_version,
                ));
                Ok(true)
            }
            Err(error) => Err(EntityError::new(
                ActionKind::RestoreInB,
                &relation.a_id,
                error,
            )),
        }
    }

    /// Fingerprints an entity just created on side A so the duplicate
    /// reconciler sees it. Best-effort: a failed fetch only costs this
    /// pass's duplicate coverage for that entity.
    fn observe_created_a(&self, state: &mut PassState<RA, RB>, a_id: &RA::Id) {
        let Some(fingerprint) = &self.a_fingerprint else {
            return;
        };
        match self.a_repo.fetch_by_ids(std::slice::from_ref(a_id)) {
            Ok(mut fetched) => {
                if let Some(entity) = fetched.remove(a_id) {
                    if let Some(found) = fingerprint(&entity) {
                        state.tracker.observe(a_id.clone(), found);
                    }
                    self.a_repo.release(vec![entity]);
                }
            }
            Err(error) => warn!(?error, "could not fingerprint created entity"),
        }
    }
}
