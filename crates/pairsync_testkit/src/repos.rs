//! In-memory repositories with deterministic enumeration and scriptable
//! failures.

use crate::events::{LocalEvent, RemoteEvent};
use pairsync_model::{EntityRepository, MapError, RepoResult, RepositoryError};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

type WriteHook = Box<dyn Fn() + Send + Sync>;

/// One-shot failure switches, consumed on the first call of each kind.
#[derive(Debug, Default)]
struct Failures {
    list: bool,
    fetch: bool,
    create: bool,
    update: bool,
    delete: bool,
}

fn take(flag: &mut bool) -> bool {
    std::mem::take(flag)
}

fn injected() -> RepositoryError {
    RepositoryError::Transient("injected failure".into())
}

/// Side A repository: numeric ids, numeric bump-counter versions.
///
/// Enumeration iterates a `BTreeMap`, so the order is ascending by id and
/// stable across calls.
#[derive(Default)]
pub struct LocalEventRepository {
    events: RwLock<BTreeMap<u64, (LocalEvent, u64)>>,
    next_id: RwLock<u64>,
    failures: RwLock<Failures>,
    writes: RwLock<usize>,
    fetched: RwLock<usize>,
    released: RwLock<usize>,
    on_write: RwLock<Option<WriteHook>>,
}

impl fmt::Debug for LocalEventRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalEventRepository")
            .field("events", &self.events.read().len())
            .finish_non_exhaustive()
    }
}

impl LocalEventRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an event, assigning its id. Returns the assigned id.
    pub fn insert(&self, mut event: LocalEvent) -> u64 {
        let mut next = self.next_id.write();
        *next += 1;
        let id = *next;
        event.id = id;
        self.events.write().insert(id, (event, 1));
        id
    }

    /// Applies an out-of-band edit, bumping the version. Panics if the id
    /// is unknown; fixtures always edit events they inserted.
    pub fn edit(&self, id: u64, apply: impl FnOnce(&mut LocalEvent)) {
        let mut events = self.events.write();
        let (event, version) = events.get_mut(&id).unwrap();
        apply(event);
        *version += 1;
    }

    /// Removes an event out of band, as an external deletion would.
    pub fn remove(&self, id: u64) {
        self.events.write().remove(&id);
    }

    /// Returns a copy of the stored event, if present.
    pub fn get(&self, id: u64) -> Option<LocalEvent> {
        self.events.read().get(&id).map(|(event, _)| event.clone())
    }

    /// Number of stored events.
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Number of successful create/update/delete calls so far.
    pub fn write_calls(&self) -> usize {
        *self.writes.read()
    }

    /// Total entities handed out by `fetch_by_ids` so far.
    pub fn fetched_entities(&self) -> usize {
        *self.fetched.read()
    }

    /// Total entities given back through `release` so far.
    pub fn released_entities(&self) -> usize {
        *self.released.read()
    }

    /// Installs a hook invoked at the start of every successful
    /// create/update/delete call.
    pub fn on_write(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_write.write() = Some(Box::new(hook));
    }

    fn fire_write_hook(&self) {
        if let Some(hook) = self.on_write.read().as_ref() {
            hook();
        }
    }

    /// Makes the next `list_current_versions` fail transiently.
    pub fn fail_next_list(&self) {
        self.failures.write().list = true;
    }

    /// Makes the next `fetch_by_ids` fail transiently.
    pub fn fail_next_fetch(&self) {
        self.failures.write().fetch = true;
    }

    /// Makes the next `create` fail transiently.
    pub fn fail_next_create(&self) {
        self.failures.write().create = true;
    }

    /// Makes the next `update` fail transiently.
    pub fn fail_next_update(&self) {
        self.failures.write().update = true;
    }

    /// Makes the next `delete` fail transiently.
    pub fn fail_next_delete(&self) {
        self.failures.write().delete = true;
    }
}

impl EntityRepository for LocalEventRepository {
    type Id = u64;
    type Version = u64;
    type Entity = LocalEvent;

    fn list_current_versions(&self) -> RepoResult<Vec<(u64, u64)>> {
        if take(&mut self.failures.write().list) {
            return Err(injected());
        }
        Ok(self
            .events
            .read()
            .iter()
            .map(|(id, (_, version))| (*id, *version))
            .collect())
    }

    fn fetch_by_ids(&self, ids: &[u64]) -> RepoResult<HashMap<u64, LocalEvent>> {
        if take(&mut self.failures.write().fetch) {
            return Err(injected());
        }
        let events = self.events.read();
        let found: HashMap<u64, LocalEvent> = ids
            .iter()
            .filter_map(|id| events.get(id).map(|(event, _)| (*id, event.clone())))
            .collect();
        *self.fetched.write() += found.len();
        Ok(found)
    }

    fn create(
        &self,
        initialize: &mut dyn FnMut(LocalEvent) -> Result<LocalEvent, MapError>,
    ) -> RepoResult<(u64, u64)> {
        if take(&mut self.failures.write().create) {
            return Err(injected());
        }
        self.fire_write_hook();
        let mut next = self.next_id.write();
        *next += 1;
        let id = *next;
        let mut blank = LocalEvent::new("", chrono::DateTime::UNIX_EPOCH);
        blank.id = id;
        blank.end = None;
        let mut event = initialize(blank)?;
        event.id = id;
        self.events.write().insert(id, (event, 1));
        *self.writes.write() += 1;
        Ok((id, 1))
    }

    fn update(
        &self,
        id: &u64,
        modify: &mut dyn FnMut(LocalEvent) -> Result<LocalEvent, MapError>,
    ) -> RepoResult<(u64, u64)> {
        if take(&mut self.failures.write().update) {
            return Err(injected());
        }
        self.fire_write_hook();
        let mut events = self.events.write();
        let (current, version) = events.get(id).ok_or(RepositoryError::NotFound)?.clone();
        let mut updated = modify(current)?;
        updated.id = *id;
        let version = version + 1;
        events.insert(*id, (updated, version));
        *self.writes.write() += 1;
        Ok((*id, version))
    }

    fn delete(&self, id: &u64) -> RepoResult<bool> {
        if take(&mut self.failures.write().delete) {
            return Err(injected());
        }
        self.fire_write_hook();
        let existed = self.events.write().remove(id).is_some();
        *self.writes.write() += 1;
        Ok(existed)
    }

    fn release(&self, entities: Vec<LocalEvent>) {
        *self.released.write() += entities.len();
    }
}

/// Side B repository: string uids, string etag versions.
///
/// Enumeration iterates a `BTreeMap`, so the order is ascending by uid and
/// stable across calls.
#[derive(Default)]
pub struct RemoteEventRepository {
    events: RwLock<BTreeMap<String, (RemoteEvent, String)>>,
    next_uid: RwLock<u64>,
    next_etag: RwLock<u64>,
    failures: RwLock<Failures>,
    writes: RwLock<usize>,
    fetched: RwLock<usize>,
    released: RwLock<usize>,
    on_write: RwLock<Option<WriteHook>>,
}

impl fmt::Debug for RemoteEventRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteEventRepository")
            .field("events", &self.events.read().len())
            .finish_non_exhaustive()
    }
}

impl RemoteEventRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_uid(&self) -> String {
        let mut next = self.next_uid.write();
        *next += 1;
        format!("b-{next:04}")
    }

    fn fresh_etag(&self) -> String {
        let mut next = self.next_etag.write();
        *next += 1;
        format!("etag-{next}")
    }

    /// Seeds an event, assigning its uid. Returns the assigned uid.
    pub fn insert(&self, mut event: RemoteEvent) -> String {
        let uid = self.fresh_uid();
        event.uid = uid.clone();
        let etag = self.fresh_etag();
        self.events.write().insert(uid.clone(), (event, etag));
        uid
    }

    /// Applies an out-of-band edit, assigning a fresh etag. Panics if the
    /// uid is unknown.
    pub fn edit(&self, uid: &str, apply: impl FnOnce(&mut RemoteEvent)) {
        let etag = self.fresh_etag();
        let mut events = self.events.write();
        let (event, version) = events.get_mut(uid).unwrap();
        apply(event);
        *version = etag;
    }

    /// Removes an event out of band.
    pub fn remove(&self, uid: &str) {
        self.events.write().remove(uid);
    }

    /// Returns a copy of the stored event, if present.
    pub fn get(&self, uid: &str) -> Option<RemoteEvent> {
        self.events.read().get(uid).map(|(event, _)| event.clone())
    }

    /// Number of stored events.
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Number of successful create/update/delete calls so far.
    pub fn write_calls(&self) -> usize {
        *self.writes.read()
    }

    /// Total entities handed out by `fetch_by_ids` so far.
    pub fn fetched_entities(&self) -> usize {
        *self.fetched.read()
    }

    /// Total entities given back through `release` so far.
    pub fn released_entities(&self) -> usize {
        *self.released.read()
    }

    /// Installs a hook invoked at the start of every successful
    /// create/update/delete call.
    pub fn on_write(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_write.write() = Some(Box::new(hook));
    }

    fn fire_write_hook(&self) {
        if let Some(hook) = self.on_write.read().as_ref() {
            hook();
        }
    }

    /// Makes the next `list_current_versions` fail transiently.
    pub fn fail_next_list(&self) {
        self.failures.write().list = true;
    }

    /// Makes the next `fetch_by_ids` fail transiently.
    pub fn fail_next_fetch(&self) {
        self.failures.write().fetch = true;
    }

    /// Makes the next `create` fail transiently.
    pub fn fail_next_create(&self) {
        self.failures.write().create = true;
    }

    /// Makes the next `update` fail transiently.
    pub fn fail_next_update(&self) {
        self.failures.write().update = true;
    }

    /// Makes the next `delete` fail transiently.
    pub fn fail_next_delete(&self) {
        self.failures.write().delete = true;
    }
}

impl EntityRepository for RemoteEventRepository {
    type Id = String;
    type Version = String;
    type Entity = RemoteEvent;

    fn list_current_versions(&self) -> RepoResult<Vec<(String, String)>> {
        if take(&mut self.failures.write().list) {
            return Err(injected());
        }
        Ok(self
            .events
            .read()
            .iter()
            .map(|(uid, (_, etag))| (uid.clone(), etag.clone()))
            .collect())
    }

    fn fetch_by_ids(&self, ids: &[String]) -> RepoResult<HashMap<String, RemoteEvent>> {
        if take(&mut self.failures.write().fetch) {
            return Err(injected());
        }
        let events = self.events.read();
        let found: HashMap<String, RemoteEvent> = ids
            .iter()
            .filter_map(|uid| {
                events
                    .get(uid)
                    .map(|(event, _)| (uid.clone(), event.clone()))
            })
            .collect();
        *self.fetched.write() += found.len();
        Ok(found)
    }

    fn create(
        &self,
        initialize: &mut dyn FnMut(RemoteEvent) -> Result<RemoteEvent, MapError>,
    ) -> RepoResult<(String, String)> {
        if take(&mut self.failures.write().create) {
            return Err(injected());
        }
        self.fire_write_hook();
        let uid = self.fresh_uid();
        let mut blank = RemoteEvent::new("", chrono::DateTime::UNIX_EPOCH);
        blank.uid = uid.clone();
        blank.end = None;
        let mut event = initialize(blank)?;
        event.uid = uid.clone();
        let etag = self.fresh_etag();
        self.events.write().insert(uid.clone(), (event, etag.clone()));
        *self.writes.write() += 1;
        Ok((uid, etag))
    }

    fn update(
        &self,
        id: &String,
        modify: &mut dyn FnMut(RemoteEvent) -> Result<RemoteEvent, MapError>,
    ) -> RepoResult<(String, String)> {
        if take(&mut self.failures.write().update) {
            return Err(injected());
        }
        self.fire_write_hook();
        let current = {
            let events = self.events.read();
            events
                .get(id)
                .ok_or(RepositoryError::NotFound)?
                .0
                .clone()
        };
        let mut updated = modify(current)?;
        updated.uid = id.clone();
        let etag = self.fresh_etag();
        self.events
            .write()
            .insert(id.clone(), (updated, etag.clone()));
        *self.writes.write() += 1;
        Ok((id.clone(), etag))
    }

    fn delete(&self, id: &String) -> RepoResult<bool> {
        if take(&mut self.failures.write().delete) {
            return Err(injected());
        }
        self.fire_write_hook();
        let existed = self.events.write().remove(id).is_some();
        *self.writes.write() += 1;
        Ok(existed)
    }

    fn release(&self, entities: Vec<RemoteEvent>) {
        *self.released.write() += entities.len();
    }
}
