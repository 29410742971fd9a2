//! Field mapping between the two event shapes, plus a correlation key
//! source backed by a static table.

use crate::events::{LocalEvent, RemoteEvent};
use pairsync_engine::CorrelationKeySource;
use pairsync_model::{EntityMapper, EntityRelation, MapError};
use std::collections::HashMap;

/// Maps event content between the local and remote shapes.
///
/// Ids are never mapped; the repositories own identity. A poison title can
/// be configured to exercise per-entity mapping failures.
#[derive(Debug, Default)]
pub struct EventMapper {
    poison_title: Option<String>,
}

impl EventMapper {
    /// Creates a mapper that translates every event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes mapping fail for events with exactly this title.
    pub fn with_poison_title(mut self, title: &str) -> Self {
        self.poison_title = Some(title.to_string());
        self
    }

    fn check_poison(&self, title: &str) -> Result<(), MapError> {
        if self.poison_title.as_deref() == Some(title) {
            return Err(MapError::new(format!("cannot translate {title:?}")));
        }
        Ok(())
    }
}

impl EntityMapper<LocalEvent, RemoteEvent> for EventMapper {
    fn map_a_to_b(
        &self,
        a: &LocalEvent,
        existing: Option<RemoteEvent>,
    ) -> Result<RemoteEvent, MapError> {
        self.check_poison(&a.title)?;
        let mut b = existing.ok_or_else(|| MapError::new("no target entity supplied"))?;
        b.title = a.title.clone();
        b.all_day = a.all_day;
        b.start = a.start;
        b.end = a.end;
        b.modified = a.modified;
        Ok(b)
    }

    fn map_b_to_a(
        &self,
        b: &RemoteEvent,
        existing: Option<LocalEvent>,
    ) -> Result<LocalEvent, MapError> {
        self.check_poison(&b.title)?;
        let mut a = existing.ok_or_else(|| MapError::new("no target entity supplied"))?;
        a.title = b.title.clone();
        a.all_day = b.all_day;
        a.start = b.start;
        a.end = b.end;
        a.modified = b.modified;
        Ok(a)
    }
}

/// Correlation key source with a fixed relation-side table.
///
/// Keys for live entities come from [`LocalEvent::correlation_id`]; keys
/// for existing relations come from the table handed in at construction,
/// standing in for whatever lookup the embedding application maintains.
#[derive(Debug, Default)]
pub struct StaticKeySource {
    by_a_id: HashMap<u64, String>,
}

impl StaticKeySource {
    /// Creates a source with no relation-side keys.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the key for the relation whose A-id is `a_id`.
    pub fn with_relation_key(mut self, a_id: u64, key: &str) -> Self {
        self.by_a_id.insert(a_id, key.to_string());
        self
    }
}

impl CorrelationKeySource<u64, u64, String, String, LocalEvent> for StaticKeySource {
    fn key_for_relation(
        &self,
        relation: &EntityRelation<u64, u64, String, String>,
    ) -> Option<String> {
        self.by_a_id.get(&relation.a_id).cloned()
    }

    fn key_for_entity(&self, entity: &LocalEvent) -> Option<String> {
        entity.correlation_id.clone()
    }
}
