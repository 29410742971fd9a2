//! End-to-end pass tests over the in-memory testkit repositories.

use chrono::{DateTime, TimeZone, Utc};
use pairsync_engine::{
    ConflictStrategy, EngineError, EventMatchCriteria, MemoryRelationStore, ProfileConfig,
    SyncMode, Synchronizer,
};
use pairsync_model::ActionKind;
use pairsync_testkit::prelude::*;
use std::sync::Arc;

type Store = MemoryRelationStore<u64, u64, String, String>;
type Config = ProfileConfig<u64, u64, String, String>;
type EventSync =
    Synchronizer<Arc<LocalEventRepository>, Arc<RemoteEventRepository>, EventMapper, Arc<Store>>;

struct Fixture {
    local: Arc<LocalEventRepository>,
    remote: Arc<RemoteEventRepository>,
    store: Arc<Store>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            local: Arc::new(LocalEventRepository::new()),
            remote: Arc::new(RemoteEventRepository::new()),
            store: Arc::new(Store::new()),
        }
    }

    fn engine(&self, config: Config) -> EventSync {
        Synchronizer::new(
            Arc::clone(&self.local),
            Arc::clone(&self.remote),
            EventMapper::new(),
            Arc::clone(&self.store),
            config,
        )
        .with_modification_instants(|a: &LocalEvent| a.modified, |b: &RemoteEvent| b.modified)
    }

    fn two_way(&self) -> EventSync {
        self.engine(Config::new(SyncMode::TwoWay))
    }
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap()
}

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, hour, 0, 0).unwrap()
}

#[test]
fn first_contact_creates_in_both_directions() {
    let fixture = Fixture::new();
    fixture.local.insert(LocalEvent::new("Standup", start()));
    fixture.remote.insert(RemoteEvent::new("Retro", at(15)));

    let summary = fixture.two_way().run_pass().unwrap();

    assert_eq!(summary.count(ActionKind::CreateInB), 1);
    assert_eq!(summary.count(ActionKind::CreateInA), 1);
    assert!(summary.errors.is_empty());
    assert_eq!(fixture.local.len(), 2);
    assert_eq!(fixture.remote.len(), 2);
    assert_eq!(fixture.store.snapshot().len(), 2);
}

#[test]
fn second_pass_is_quiescent() {
    let fixture = Fixture::new();
    fixture.local.insert(LocalEvent::new("Standup", start()));
    fixture.remote.insert(RemoteEvent::new("Retro", at(15)));
    fixture.two_way().run_pass().unwrap();

    let local_writes = fixture.local.write_calls();
    let remote_writes = fixture.remote.write_calls();

    let summary = fixture.two_way().run_pass().unwrap();

    assert!(summary.is_quiescent());
    assert_eq!(summary.count(ActionKind::DoNothing), 2);
    assert_eq!(fixture.local.write_calls(), local_writes);
    assert_eq!(fixture.remote.write_calls(), remote_writes);
}

#[test]
fn edits_propagate_in_both_directions() {
    let fixture = Fixture::new();
    let a_id = fixture.local.insert(LocalEvent::new("Standup", start()));
    fixture.two_way().run_pass().unwrap();
    let b_id = fixture.store.snapshot()[0].b_id.clone();

    fixture.local.edit(a_id, |event| event.title = "Standup (moved)".into());
    fixture.two_way().run_pass().unwrap();
    assert_eq!(fixture.remote.get(&b_id).unwrap().title, "Standup (moved)");

    fixture.remote.edit(&b_id, |event| event.title = "Standup (final)".into());
    fixture.two_way().run_pass().unwrap();
    assert_eq!(fixture.local.get(a_id).unwrap().title, "Standup (final)");
}

#[test]
fn automatic_conflict_resolution_prefers_the_newer_side() {
    let fixture = Fixture::new();
    let a_id = fixture.local.insert(LocalEvent::new("Planning", start()));
    fixture.two_way().run_pass().unwrap();
    let b_id = fixture.store.snapshot()[0].b_id.clone();

    fixture.local.edit(a_id, |event| {
        event.title = "Planning (local)".into();
        event.modified = Some(at(10));
    });
    fixture.remote.edit(&b_id, |event| {
        event.title = "Planning (remote)".into();
        event.modified = Some(at(11));
    });

    let summary = fixture.two_way().run_pass().unwrap();

    assert_eq!(summary.count(ActionKind::UpdateFromNewerToOlder), 1);
    assert_eq!(fixture.local.get(a_id).unwrap().title, "Planning (remote)");
    assert_eq!(fixture.remote.get(&b_id).unwrap().title, "Planning (remote)");
}

#[test]
fn conflict_ties_and_unmodified_remote_go_to_side_a() {
    // Equal instants
    let fixture = Fixture::new();
    let a_id = fixture.local.insert(LocalEvent::new("Tie", start()));
    fixture.two_way().run_pass().unwrap();
    let b_id = fixture.store.snapshot()[0].b_id.clone();
    fixture.local.edit(a_id, |event| {
        event.title = "Tie (local)".into();
        event.modified = Some(at(10));
    });
    fixture.remote.edit(&b_id, |event| {
        event.title = "Tie (remote)".into();
        event.modified = Some(at(10));
    });
    fixture.two_way().run_pass().unwrap();
    assert_eq!(fixture.remote.get(&b_id).unwrap().title, "Tie (local)");

    // Remote changed but carries no modification instant
    let fixture = Fixture::new();
    let a_id = fixture.local.insert(LocalEvent::new("Silent", start()));
    fixture.two_way().run_pass().unwrap();
    let b_id = fixture.store.snapshot()[0].b_id.clone();
    fixture.local.edit(a_id, |event| {
        event.title = "Silent (local)".into();
        event.modified = Some(at(10));
    });
    fixture.remote.edit(&b_id, |event| event.title = "Silent (remote)".into());
    fixture.two_way().run_pass().unwrap();
    assert_eq!(fixture.remote.get(&b_id).unwrap().title, "Silent (local)");
}

#[test]
fn fixed_conflict_strategy_overrides_instants() {
    let fixture = Fixture::new();
    let a_id = fixture.local.insert(LocalEvent::new("Review", start()));
    fixture.two_way().run_pass().unwrap();
    let b_id = fixture.store.snapshot()[0].b_id.clone();

    fixture.local.edit(a_id, |event| {
        event.title = "Review (local)".into();
        event.modified = Some(at(12));
    });
    fixture.remote.edit(&b_id, |event| {
        event.title = "Review (remote)".into();
        event.modified = Some(at(10));
    });

    let config =
        Config::new(SyncMode::TwoWay).with_conflict_strategy(ConflictStrategy::BWins);
    fixture.engine(config).run_pass().unwrap();

    assert_eq!(fixture.local.get(a_id).unwrap().title, "Review (remote)");
}

#[test]
fn deletion_propagates_when_the_survivor_is_unchanged() {
    let fixture = Fixture::new();
    let a_id = fixture.local.insert(LocalEvent::new("Cancelled", start()));
    fixture.two_way().run_pass().unwrap();
    assert_eq!(fixture.remote.len(), 1);

    fixture.local.remove(a_id);
    let summary = fixture.two_way().run_pass().unwrap();

    assert_eq!(summary.count(ActionKind::DeleteInB), 1);
    assert!(fixture.remote.is_empty());
    assert!(fixture.store.snapshot().is_empty());
}

#[test]
fn edit_on_the_survivor_resurrects_a_deleted_entity() {
    let fixture = Fixture::new();
    let a_id = fixture.local.insert(LocalEvent::new("Offsite", start()));
    fixture.two_way().run_pass().unwrap();
    let b_id = fixture.store.snapshot()[0].b_id.clone();

    fixture.local.remove(a_id);
    fixture.remote.edit(&b_id, |event| event.title = "Offsite (updated)".into());
    let summary = fixture.two_way().run_pass().unwrap();

    assert_eq!(summary.count(ActionKind::CreateInA), 1);
    assert_eq!(fixture.local.len(), 1);
    let relation = &fixture.store.snapshot()[0];
    assert_eq!(relation.b_id, b_id);
    assert_eq!(
        fixture.local.get(relation.a_id).unwrap().title,
        "Offsite (updated)"
    );
}

#[test]
fn initial_matching_repairs_a_lost_relation_store() {
    let fixture = Fixture::new();
    fixture.local.insert(LocalEvent::new("Standup", start()));
    fixture.remote.insert(RemoteEvent::new("Standup", start()));

    let engine = fixture.two_way().with_match_criteria(EventMatchCriteria);
    let summary = engine.run_pass().unwrap();

    // Matched, not duplicated: no writes on either side
    assert_eq!(summary.count(ActionKind::DoNothing), 1);
    assert_eq!(fixture.local.write_calls(), 0);
    assert_eq!(fixture.remote.write_calls(), 0);
    assert_eq!(fixture.local.len(), 1);
    assert_eq!(fixture.remote.len(), 1);
    assert_eq!(fixture.store.snapshot().len(), 1);

    let second = fixture
        .two_way()
        .with_match_criteria(EventMatchCriteria)
        .run_pass()
        .unwrap();
    assert!(second.is_quiescent());
}

#[test]
fn unmatchable_entities_fall_through_to_creates() {
    let fixture = Fixture::new();
    fixture.local.insert(LocalEvent::new("Standup", at(9)));
    fixture.remote.insert(RemoteEvent::new("Standup", at(10)));

    let summary = fixture
        .two_way()
        .with_match_criteria(EventMatchCriteria)
        .run_pass()
        .unwrap();

    // Same title, different time: both sides get the other's copy
    assert_eq!(summary.count(ActionKind::CreateInB), 1);
    assert_eq!(summary.count(ActionKind::CreateInA), 1);
    assert_eq!(fixture.local.len(), 2);
    assert_eq!(fixture.remote.len(), 2);
}

#[test]
fn interception_rewrites_delete_create_into_an_update() {
    let fixture = Fixture::new();
    let a1 = fixture.local.insert(
        LocalEvent::new("Standup", start()).with_correlation_id("K"),
    );
    fixture.two_way().run_pass().unwrap();
    let b_id = fixture.store.snapshot()[0].b_id.clone();
    let remote_writes = fixture.remote.write_calls();

    // The application recreated the entity under a new local id
    fixture.local.remove(a1);
    let a2 = fixture.local.insert(
        LocalEvent::new("Standup (edited)", start()).with_correlation_id("K"),
    );

    let keys = StaticKeySource::new().with_relation_key(a1, "K");
    let summary = fixture
        .two_way()
        .with_correlation_keys(keys)
        .run_pass()
        .unwrap();

    assert_eq!(summary.count(ActionKind::Discard), 1);
    assert_eq!(summary.count(ActionKind::UpdateAToB), 1);
    assert_eq!(summary.count(ActionKind::DeleteInB), 0);
    assert_eq!(summary.count(ActionKind::CreateInB), 0);

    // The remote entity survived under its original uid, content updated
    assert_eq!(fixture.remote.len(), 1);
    assert_eq!(fixture.remote.get(&b_id).unwrap().title, "Standup (edited)");
    assert_eq!(fixture.remote.write_calls(), remote_writes + 1);

    let relation = &fixture.store.snapshot()[0];
    assert_eq!(relation.a_id, a2);
    assert_eq!(relation.b_id, b_id);
}

#[test]
fn duplicate_reconciliation_keeps_exactly_one_copy() {
    let fixture = Fixture::new();
    for _ in 0..3 {
        fixture.local.insert(LocalEvent::new("Gym", at(18)));
    }

    let summary = fixture
        .two_way()
        .with_fingerprinter(local_fingerprint)
        .run_pass()
        .unwrap();

    assert_eq!(summary.count(ActionKind::CreateInB), 3);
    assert_eq!(summary.duplicates_removed, 2);
    assert_eq!(fixture.local.len(), 1);
    assert_eq!(fixture.remote.len(), 1);
    assert_eq!(fixture.store.snapshot().len(), 1);
}

#[test]
fn transient_failures_are_isolated_and_retried_next_pass() {
    let fixture = Fixture::new();
    let a_id = fixture.local.insert(LocalEvent::new("Flaky", start()));
    fixture.two_way().run_pass().unwrap();
    let b_id = fixture.store.snapshot()[0].b_id.clone();
    let relation_before = fixture.store.snapshot()[0].clone();

    fixture.local.edit(a_id, |event| event.title = "Flaky (edited)".into());
    fixture.remote.fail_next_update();
    let summary = fixture.two_way().run_pass().unwrap();

    assert_eq!(summary.errors.len(), 1);
    assert_eq!(fixture.remote.get(&b_id).unwrap().title, "Flaky");
    // The relation is untouched, so the next pass re-derives the update
    assert_eq!(fixture.store.snapshot()[0], relation_before);

    let retry = fixture.two_way().run_pass().unwrap();
    assert!(retry.errors.is_empty());
    assert_eq!(retry.count(ActionKind::UpdateAToB), 1);
    assert_eq!(fixture.remote.get(&b_id).unwrap().title, "Flaky (edited)");
}

#[test]
fn interrupted_creates_converge_on_the_next_pass() {
    let fixture = Fixture::new();
    fixture.local.insert(LocalEvent::new("First", at(9)));
    fixture.local.insert(LocalEvent::new("Second", at(10)));

    fixture.remote.fail_next_create();
    let summary = fixture.two_way().run_pass().unwrap();
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(fixture.remote.len(), 1);
    assert_eq!(fixture.store.snapshot().len(), 1);

    let second = fixture.two_way().run_pass().unwrap();
    assert!(second.errors.is_empty());
    assert_eq!(fixture.remote.len(), 2);
    assert_eq!(fixture.store.snapshot().len(), 2);
}

#[test]
fn mapping_failures_only_affect_their_entity() {
    let fixture = Fixture::new();
    fixture.local.insert(LocalEvent::new("Good", at(9)));
    fixture.local.insert(LocalEvent::new("Bad", at(10)));

    let engine = Synchronizer::new(
        Arc::clone(&fixture.local),
        Arc::clone(&fixture.remote),
        EventMapper::new().with_poison_title("Bad"),
        Arc::clone(&fixture.store),
        Config::new(SyncMode::TwoWay),
    );
    let summary = engine.run_pass().unwrap();

    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.count(ActionKind::CreateInB), 1);
    assert_eq!(fixture.remote.len(), 1);
    assert_eq!(fixture.store.snapshot().len(), 1);
}

#[test]
fn relation_store_save_failure_is_fatal() {
    let fixture = Fixture::new();
    fixture.local.insert(LocalEvent::new("Standup", start()));
    fixture.store.fail_next_save();

    let error = fixture.two_way().run_pass().unwrap_err();
    assert!(matches!(error, EngineError::RelationStore(_)));
    assert!(fixture.store.snapshot().is_empty());
}

#[test]
fn fetched_entities_are_released_when_a_save_aborts_the_pass() {
    let fixture = Fixture::new();
    fixture.local.insert(LocalEvent::new("Standup", start()));
    fixture.store.fail_next_save();

    let error = fixture.two_way().run_pass().unwrap_err();

    assert!(matches!(error, EngineError::RelationStore(_)));
    assert_eq!(fixture.local.fetched_entities(), 1);
    assert_eq!(
        fixture.local.released_entities(),
        fixture.local.fetched_entities()
    );
}

#[test]
fn a_failed_remote_fetch_releases_the_local_side() {
    let fixture = Fixture::new();
    fixture.local.insert(LocalEvent::new("Local only", at(9)));
    fixture.remote.insert(RemoteEvent::new("Remote only", at(10)));
    fixture.remote.fail_next_fetch();

    let error = fixture.two_way().run_pass().unwrap_err();

    assert!(matches!(error, EngineError::Fetch(_)));
    assert_eq!(fixture.local.fetched_entities(), 1);
    assert_eq!(
        fixture.local.released_entities(),
        fixture.local.fetched_entities()
    );
}

#[test]
fn cancellation_stops_between_entities_and_later_passes_converge() {
    let fixture = Fixture::new();
    fixture.local.insert(LocalEvent::new("First", at(9)));
    fixture.local.insert(LocalEvent::new("Second", at(10)));

    // The first remote write requests cancellation, as a shutdown racing
    // a running pass would.
    let engine = Arc::new(fixture.two_way());
    let running = Arc::clone(&engine);
    fixture.remote.on_write(move || running.cancel());

    let summary = engine.run_pass().unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.count(ActionKind::CreateInB), 1);
    assert_eq!(fixture.remote.len(), 1);
    // The completed half is committed before the pass returns
    assert_eq!(fixture.store.snapshot().len(), 1);

    let second = fixture.two_way().run_pass().unwrap();
    assert!(!second.cancelled);
    assert_eq!(second.count(ActionKind::CreateInB), 1);
    assert_eq!(fixture.remote.len(), 2);
    assert_eq!(fixture.store.snapshot().len(), 2);
}

#[test]
fn enumeration_failure_aborts_the_pass_before_any_write() {
    let fixture = Fixture::new();
    fixture.local.insert(LocalEvent::new("Standup", start()));
    fixture.remote.fail_next_list();

    let error = fixture.two_way().run_pass().unwrap_err();
    assert!(matches!(error, EngineError::Enumeration(_)));
    assert_eq!(fixture.remote.write_calls(), 0);
    assert!(fixture.store.snapshot().is_empty());
}

#[test]
fn replicate_restores_a_deleted_mirror_entity() {
    let fixture = Fixture::new();
    fixture.local.insert(LocalEvent::new("Source", start()));
    fixture
        .engine(Config::new(SyncMode::ReplicateAToB))
        .run_pass()
        .unwrap();
    let b_id = fixture.store.snapshot()[0].b_id.clone();

    fixture.remote.remove(&b_id);
    let summary = fixture
        .engine(Config::new(SyncMode::ReplicateAToB))
        .run_pass()
        .unwrap();

    assert_eq!(summary.count(ActionKind::RestoreInB), 1);
    assert_eq!(fixture.remote.len(), 1);
    let relation = &fixture.store.snapshot()[0];
    assert_eq!(fixture.remote.get(&relation.b_id).unwrap().title, "Source");
}

#[test]
fn replicate_overwrites_mirror_side_edits() {
    let fixture = Fixture::new();
    fixture.local.insert(LocalEvent::new("Source", start()));
    fixture
        .engine(Config::new(SyncMode::ReplicateAToB))
        .run_pass()
        .unwrap();
    let b_id = fixture.store.snapshot()[0].b_id.clone();

    fixture.remote.edit(&b_id, |event| event.title = "Tampered".into());
    fixture
        .engine(Config::new(SyncMode::ReplicateAToB))
        .run_pass()
        .unwrap();

    assert_eq!(fixture.remote.get(&b_id).unwrap().title, "Source");
}

#[test]
fn merge_tolerates_target_side_edits() {
    let fixture = Fixture::new();
    fixture.local.insert(LocalEvent::new("Agenda", start()));
    fixture
        .engine(Config::new(SyncMode::MergeAToB))
        .run_pass()
        .unwrap();
    let b_id = fixture.store.snapshot()[0].b_id.clone();

    fixture.remote.edit(&b_id, |event| event.title = "Agenda (annotated)".into());
    let summary = fixture
        .engine(Config::new(SyncMode::MergeAToB))
        .run_pass()
        .unwrap();

    assert_eq!(summary.count(ActionKind::DoNothing), 1);
    assert_eq!(fixture.remote.get(&b_id).unwrap().title, "Agenda (annotated)");
}

#[test]
fn merge_does_not_create_from_the_target_side() {
    let fixture = Fixture::new();
    fixture.remote.insert(RemoteEvent::new("Remote only", start()));

    let summary = fixture
        .engine(Config::new(SyncMode::MergeAToB))
        .run_pass()
        .unwrap();

    assert_eq!(summary.count(ActionKind::CreateInA), 0);
    assert!(fixture.local.is_empty());
    assert!(fixture.store.snapshot().is_empty());
}
