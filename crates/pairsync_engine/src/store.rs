//! Persistence of relation records between passes.

use crate::error::{StoreError, StoreResult};
use pairsync_model::EntityRelation;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Persists the A↔B correspondence records between passes.
///
/// `save` replaces the persisted set atomically from the caller's
/// perspective: a crash mid-save must never leave a partial set visible to
/// the next pass. No validation of referenced entities happens here;
/// staleness is the state deriver's job.
///
/// Loss of the persisted set is fail-safe: entities are treated as
/// first-contact and re-paired by the content-aware initial matcher instead
/// of being duplicated.
pub trait RelationStore<AId, AVersion, BId, BVersion> {
    /// Loads the persisted relation records.
    fn load(&self) -> StoreResult<Vec<EntityRelation<AId, AVersion, BId, BVersion>>>;

    /// Replaces the persisted set with `records`.
    fn save(&self, records: &[EntityRelation<AId, AVersion, BId, BVersion>]) -> StoreResult<()>;
}

impl<AId, AVersion, BId, BVersion, T> RelationStore<AId, AVersion, BId, BVersion> for Arc<T>
where
    T: RelationStore<AId, AVersion, BId, BVersion>,
{
    fn load(&self) -> StoreResult<Vec<EntityRelation<AId, AVersion, BId, BVersion>>> {
        (**self).load()
    }

    fn save(&self, records: &[EntityRelation<AId, AVersion, BId, BVersion>]) -> StoreResult<()> {
        (**self).save(records)
    }
}

/// File-backed relation store persisting a JSON array of records.
///
/// Saves write to a sibling temp file and rename it over the target, so a
/// crash never exposes a partial write. Version tokens round-trip through
/// serde exactly.
#[derive(Debug)]
pub struct JsonFileRelationStore<AId, AVersion, BId, BVersion> {
    path: PathBuf,
    _types: PhantomData<fn() -> (AId, AVersion, BId, BVersion)>,
}

impl<AId, AVersion, BId, BVersion> JsonFileRelationStore<AId, AVersion, BId, BVersion> {
    /// Creates a store backed by the given file path. The file is created
    /// on first save; a missing file loads as the empty set.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _types: PhantomData,
        }
    }

    /// The backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<AId, AVersion, BId, BVersion> RelationStore<AId, AVersion, BId, BVersion>
    for JsonFileRelationStore<AId, AVersion, BId, BVersion>
where
    AId: Serialize + DeserializeOwned,
    AVersion: Serialize + DeserializeOwned,
    BId: Serialize + DeserializeOwned,
    BVersion: Serialize + DeserializeOwned,
{
    fn load(&self) -> StoreResult<Vec<EntityRelation<AId, AVersion, BId, BVersion>>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let bytes = fs::read(&self.path)?;
        let records = serde_json::from_slice(&bytes)?;
        Ok(records)
    }

    fn save(&self, records: &[EntityRelation<AId, AVersion, BId, BVersion>]) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(records)?;

        let mut tmp_path = self.path.clone();
        tmp_path.set_extension("tmp");
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        debug!(records = records.len(), path = %self.path.display(), "relation set saved");
        Ok(())
    }
}

/// In-memory relation store for tests, with scriptable save failures.
#[derive(Debug)]
pub struct MemoryRelationStore<AId, AVersion, BId, BVersion> {
    records: RwLock<Vec<EntityRelation<AId, AVersion, BId, BVersion>>>,
    fail_next_save: RwLock<bool>,
}

impl<AId, AVersion, BId, BVersion> MemoryRelationStore<AId, AVersion, BId, BVersion>
where
    AId: Clone,
    AVersion: Clone,
    BId: Clone,
    BVersion: Clone,
{
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            fail_next_save: RwLock::new(false),
        }
    }

    /// Creates a store pre-seeded with records.
    pub fn with_records(records: Vec<EntityRelation<AId, AVersion, BId, BVersion>>) -> Self {
        Self {
            records: RwLock::new(records),
            fail_next_save: RwLock::new(false),
        }
    }

    /// Makes the next `save` fail with [`StoreError::SaveFailed`].
    pub fn fail_next_save(&self) {
        *self.fail_next_save.write() = true;
    }

    /// Returns a snapshot of the stored records.
    pub fn snapshot(&self) -> Vec<EntityRelation<AId, AVersion, BId, BVersion>> {
        self.records.read().clone()
    }
}

impl<AId, AVersion, BId, BVersion> Default for MemoryRelationStore<AId, AVersion, BId, BVersion>
where
    AId: Clone,
    AVersion: Clone,
    BId: Clone,
    BVersion: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<AId, AVersion, BId, BVersion> RelationStore<AId, AVersion, BId, BVersion>
    for MemoryRelationStore<AId, AVersion, BId, BVersion>
where
    AId: Clone,
    AVersion: Clone,
    BId: Clone,
    BVersion: Clone,
{
    fn load(&self) -> StoreResult<Vec<EntityRelation<AId, AVersion, BId, BVersion>>> {
        Ok(self.records.read().clone())
    }

    fn save(&self, records: &[EntityRelation<AId, AVersion, BId, BVersion>]) -> StoreResult<()> {
        let mut fail = self.fail_next_save.write();
        if *fail {
            *fail = false;
            return Err(StoreError::SaveFailed("injected failure".into()));
        }
        *self.records.write() = records.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Record = EntityRelation<u32, u64, String, String>;

    fn rel(a: u32, b: &str) -> Record {
        EntityRelation::new(a, 3, b.to_string(), format!("etag-{b}"))
    }

    #[test]
    fn file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store: JsonFileRelationStore<u32, u64, String, String> =
            JsonFileRelationStore::new(dir.path().join("relations.json"));

        assert!(store.load().unwrap().is_empty());

        let records = vec![rel(1, "b1"), rel(2, "b2")];
        store.save(&records).unwrap();
        assert_eq!(store.load().unwrap(), records);

        // Replacement, not append
        store.save(&records[..1]).unwrap();
        assert_eq!(store.load().unwrap(), records[..1]);
    }

    #[test]
    fn file_store_preserves_version_tokens_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let store: JsonFileRelationStore<u32, u64, String, String> =
            JsonFileRelationStore::new(dir.path().join("relations.json"));

        let awkward = vec![EntityRelation::new(
            1u32,
            u64::MAX,
            "b/1".to_string(),
            "W/\"abc-123\"".to_string(),
        )];
        store.save(&awkward).unwrap();
        assert_eq!(store.load().unwrap(), awkward);
    }

    #[test]
    fn file_store_leaves_no_temp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relations.json");
        let store: JsonFileRelationStore<u32, u64, String, String> =
            JsonFileRelationStore::new(&path);
        store.save(&[rel(1, "b1")]).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("relations.json")]);
    }

    #[test]
    fn memory_store_failure_injection() {
        let store: MemoryRelationStore<u32, u64, String, String> = MemoryRelationStore::new();
        store.save(&[rel(1, "b1")]).unwrap();

        store.fail_next_save();
        let err = store.save(&[rel(2, "b2")]).unwrap_err();
        assert!(matches!(err, StoreError::SaveFailed(_)));
        // Failed save must not clobber the committed set
        assert_eq!(store.snapshot(), vec![rel(1, "b1")]);

        // Failure is one-shot
        store.save(&[rel(2, "b2")]).unwrap();
        assert_eq!(store.snapshot(), vec![rel(2, "b2")]);
    }
}
