//! Per-kind entity cache with single-winner creation and dirty tracking.
//!
//! [`EntityCache`] is the registry of live [`EntityHandle`]s for one
//! [`EntityKind`]. It coordinates the in-memory map with the
//! [`BackingStore`]: misses are loaded or created under a per-key lock so
//! that concurrent lookups of the same unseen key converge on one instance,
//! and exactly one store create happens.

use std::sync::Arc;

use async_trait::async_trait;
use banstick_core::{Entity, EntityKind, SurrogateId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::backing_store::BackingStore;
use super::flush::FlushReport;
use super::handle::{DirtySnapshot, EntityHandle};
use super::observer::{CacheObserver, CompositeCacheObserver};
use super::preload::PreloadPage;
use super::record::{decode_fields, encode_fields};
use crate::error::CacheError;

/// Where a lookup found its entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityOrigin {
    /// Already in memory.
    Cached,
    /// Read from the backing store on a miss.
    Loaded,
    /// Constructed by the factory and persisted.
    Created,
}

/// Kind-erased view of an [`EntityCache`] used by the background tasks.
///
/// Used as `Arc<dyn ManagedCache>`.
#[async_trait]
pub trait ManagedCache: Send + Sync {
    fn kind(&self) -> EntityKind;

    /// Number of cached entities.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of cached entities with unflushed changes.
    fn dirty_count(&self) -> usize;

    /// Persists every dirty entity, isolating per-entity failures.
    async fn save_dirty(&self) -> FlushReport;

    /// Pulls the next page of records past `after` into the cache.
    async fn preload_page(&self, after: SurrogateId, limit: usize)
        -> Result<PreloadPage, CacheError>;
}

/// Concurrency-safe registry of live entities for one kind.
///
/// Entries are never evicted. Lookups that miss memory take a per-key lock
/// before touching the store; the lock is dropped from the lock table once
/// no task holds or waits on it.
pub struct EntityCache<E: Entity> {
    store: Arc<dyn BackingStore>,
    entries: DashMap<E::Key, Arc<EntityHandle<E>>>,
    key_locks: DashMap<E::Key, Arc<Mutex<()>>>,
    /// Held for a whole dirty-save cycle so two cycles never interleave
    /// their writes.
    flush_lock: Mutex<()>,
    observer: CompositeCacheObserver<E>,
}

impl<E: Entity> EntityCache<E> {
    #[must_use]
    pub fn new(store: Arc<dyn BackingStore>, observers: Vec<Arc<dyn CacheObserver<E>>>) -> Self {
        Self {
            store,
            entries: DashMap::new(),
            key_locks: DashMap::new(),
            flush_lock: Mutex::new(()),
            observer: CompositeCacheObserver::new(observers),
        }
    }

    /// Memory-only lookup. Does not notify observers.
    #[must_use]
    pub fn peek(&self, key: &E::Key) -> Option<Arc<EntityHandle<E>>> {
        self.entries.get(key).map(|entry| Arc::clone(entry.value()))
    }

    #[must_use]
    pub fn contains(&self, key: &E::Key) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns the cached entity for `key`, loading it from the store on a
    /// miss. Returns `None` if the store has no record either.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Store`] if the store read fails, or
    /// [`CacheError::Decode`] if the stored payload is corrupt.
    pub async fn get(&self, key: &E::Key) -> Result<Option<Arc<EntityHandle<E>>>, CacheError> {
        if let Some(handle) = self.cached(key) {
            return Ok(Some(handle));
        }

        let lock = self.key_lock(key);
        let result = {
            let _guard = lock.lock().await;
            match self.cached(key) {
                Some(handle) => Ok(Some(handle)),
                None => self.load(key).await,
            }
        };
        self.release_key_lock(key, lock);
        result
    }

    /// Returns the entity for a natural key, loading or creating it on a miss.
    ///
    /// # Errors
    ///
    /// See [`get_or_create_with_origin`](Self::get_or_create_with_origin).
    pub async fn get_or_create<F>(
        &self,
        key: &E::Key,
        factory: F,
    ) -> Result<Arc<EntityHandle<E>>, CacheError>
    where
        F: FnOnce() -> E + Send,
    {
        self.get_or_create_with_origin(key, factory)
            .await
            .map(|(handle, _)| handle)
    }

    /// Returns the entity for a natural key together with where it came from.
    ///
    /// On a miss the store is read first; only if it has no record is
    /// `factory` invoked and the result persisted with a fresh surrogate id.
    /// Concurrent calls for the same unseen key serialize on a per-key lock:
    /// one of them creates, the others observe its result.
    ///
    /// # Errors
    ///
    /// - [`CacheError::NaturalKeyRequired`] for surrogate-keyed kinds.
    /// - [`CacheError::KeyMismatch`] if `factory` builds a record with a
    ///   different key; nothing is persisted.
    /// - [`CacheError::Store`] / [`CacheError::Decode`] /
    ///   [`CacheError::Encode`] on store or codec failure.
    pub async fn get_or_create_with_origin<F>(
        &self,
        key: &E::Key,
        factory: F,
    ) -> Result<(Arc<EntityHandle<E>>, EntityOrigin), CacheError>
    where
        F: FnOnce() -> E + Send,
    {
        if E::KIND.keyed_by_surrogate() {
            return Err(CacheError::NaturalKeyRequired { kind: E::KIND });
        }
        if let Some(handle) = self.cached(key) {
            return Ok((handle, EntityOrigin::Cached));
        }

        let lock = self.key_lock(key);
        let result = {
            let _guard = lock.lock().await;
            self.resolve_or_create(key, factory).await
        };
        self.release_key_lock(key, lock);
        result
    }

    /// Persists a brand-new record and caches it.
    ///
    /// For surrogate-keyed kinds the store assigns the key. For naturally
    /// keyed kinds this goes through the same single-winner path as
    /// [`get_or_create`](Self::get_or_create).
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::DuplicateKey`] if a naturally keyed record with
    /// the same key already exists, or a store/codec error.
    pub async fn create(&self, fields: E) -> Result<Arc<EntityHandle<E>>, CacheError> {
        if E::KIND.keyed_by_surrogate() {
            return self.persist_new(fields).await;
        }

        let key = fields.key(SurrogateId::UNASSIGNED);
        let (handle, origin) = self.get_or_create_with_origin(&key, || fields).await?;
        if origin == EntityOrigin::Created {
            Ok(handle)
        } else {
            Err(CacheError::DuplicateKey {
                kind: E::KIND,
                key: key.to_string(),
            })
        }
    }

    /// Inserts a record pulled in by the preload task.
    ///
    /// An entry already present for the key wins and the preloaded copy is
    /// discarded. Returns `true` if the record was inserted.
    pub fn insert_from_preload(&self, id: SurrogateId, fields: E) -> bool {
        let key = fields.key(id);
        let handle = match self.entries.entry(key.clone()) {
            Entry::Occupied(_) => return false,
            Entry::Vacant(slot) => {
                let handle = Arc::new(EntityHandle::clean(id, key, fields));
                slot.insert(Arc::clone(&handle));
                handle
            }
        };
        self.observer.on_preload(&handle);
        true
    }

    /// Marks an entity as having unflushed changes.
    pub fn mark_dirty(&self, handle: &EntityHandle<E>) {
        handle.mark_dirty();
    }

    /// Snapshots every dirty entity without removing anything from the cache.
    ///
    /// Entities marked dirty after their snapshot was taken stay dirty after
    /// [`clear_dirty`](Self::clear_dirty) and are picked up next cycle.
    #[must_use]
    pub fn drain_dirty(&self) -> Vec<DirtySnapshot<E>> {
        let handles: Vec<Arc<EntityHandle<E>>> = self
            .entries
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        handles
            .iter()
            .filter_map(EntityHandle::dirty_snapshot)
            .collect()
    }

    /// Clears the dirty flag up to the snapshot's version.
    ///
    /// Returns `true` if the entity is now clean.
    pub fn clear_dirty(&self, snapshot: &DirtySnapshot<E>) -> bool {
        snapshot.handle().mark_stored(snapshot.version())
    }

    /// Cached entities whose fields satisfy `predicate`. Does not touch the store.
    pub fn matching(&self, predicate: impl Fn(&E) -> bool) -> Vec<Arc<EntityHandle<E>>> {
        let handles: Vec<Arc<EntityHandle<E>>> = self
            .entries
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        handles
            .into_iter()
            .filter(|handle| predicate(&handle.read()))
            .collect()
    }

    // --- Miss handling ---

    /// Memory lookup that notifies observers of the hit.
    fn cached(&self, key: &E::Key) -> Option<Arc<EntityHandle<E>>> {
        let handle = self.peek(key)?;
        self.observer.on_hit(&handle);
        Some(handle)
    }

    async fn resolve_or_create<F>(
        &self,
        key: &E::Key,
        factory: F,
    ) -> Result<(Arc<EntityHandle<E>>, EntityOrigin), CacheError>
    where
        F: FnOnce() -> E + Send,
    {
        if let Some(handle) = self.cached(key) {
            return Ok((handle, EntityOrigin::Cached));
        }
        if let Some(handle) = self.load(key).await? {
            return Ok((handle, EntityOrigin::Loaded));
        }

        let fields = factory();
        let actual = fields.key(SurrogateId::UNASSIGNED);
        if actual != *key {
            return Err(CacheError::KeyMismatch {
                kind: E::KIND,
                expected: key.to_string(),
                actual: actual.to_string(),
            });
        }
        let handle = self.persist_new(fields).await?;
        Ok((handle, EntityOrigin::Created))
    }

    async fn load(&self, key: &E::Key) -> Result<Option<Arc<EntityHandle<E>>>, CacheError> {
        let Some(record) = self
            .store
            .read_by_key(E::KIND, &key.to_string())
            .await
            .map_err(CacheError::store(E::KIND))?
        else {
            return Ok(None);
        };

        let fields: E = decode_fields(&record)?;
        let actual = fields.key(record.id);
        if actual != *key {
            return Err(CacheError::KeyMismatch {
                kind: E::KIND,
                expected: key.to_string(),
                actual: actual.to_string(),
            });
        }
        let handle = Arc::new(EntityHandle::clean(record.id, key.clone(), fields));
        let live = self.insert_or_existing(key.clone(), Arc::clone(&handle));
        if Arc::ptr_eq(&live, &handle) {
            self.observer.on_load(&live);
        }
        Ok(Some(live))
    }

    async fn persist_new(&self, fields: E) -> Result<Arc<EntityHandle<E>>, CacheError> {
        let natural_key = fields.natural_key();
        let payload = encode_fields::<E>(&fields.key(SurrogateId::UNASSIGNED), &fields)?;
        let record = self
            .store
            .create_and_assign_id(E::KIND, natural_key.as_deref(), payload)
            .await
            .map_err(CacheError::store(E::KIND))?;
        metrics::counter!("banstick_cache_store_creates_total", "kind" => E::KIND.as_str())
            .increment(1);

        let key = fields.key(record.id);
        debug!(kind = %E::KIND, id = %record.id, key = %key, "created record");
        let live = self.insert_or_existing(
            key.clone(),
            Arc::new(EntityHandle::clean(record.id, key, fields)),
        );
        self.observer.on_create(&live);
        Ok(live)
    }

    fn insert_or_existing(
        &self,
        key: E::Key,
        handle: Arc<EntityHandle<E>>,
    ) -> Arc<EntityHandle<E>> {
        Arc::clone(self.entries.entry(key).or_insert(handle).value())
    }

    fn key_lock(&self, key: &E::Key) -> Arc<Mutex<()>> {
        Arc::clone(self.key_locks.entry(key.clone()).or_default().value())
    }

    /// Drops the caller's lock reference and removes the lock from the table
    /// if nobody else holds or waits on it.
    fn release_key_lock(&self, key: &E::Key, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.key_locks
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[async_trait]
impl<E: Entity> ManagedCache for EntityCache<E> {
    fn kind(&self) -> EntityKind {
        E::KIND
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn dirty_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().is_dirty())
            .count()
    }

    async fn save_dirty(&self) -> FlushReport {
        let _flushing = self.flush_lock.lock().await;
        let batch = self.drain_dirty();
        let mut report = FlushReport::new(E::KIND);

        for snapshot in &batch {
            let outcome = match snapshot.to_record() {
                Ok(record) => self
                    .store
                    .upsert(E::KIND, &record)
                    .await
                    .map_err(CacheError::store(E::KIND)),
                Err(error) => Err(error),
            };
            match outcome {
                Ok(()) => {
                    self.clear_dirty(snapshot);
                    report.written += 1;
                }
                Err(error) => {
                    warn!(
                        kind = %E::KIND,
                        key = %snapshot.handle().key(),
                        error = %error,
                        "dirty save failed; record stays dirty for the next cycle"
                    );
                    report.failed += 1;
                }
            }
        }

        report.record_metrics();
        report
    }

    async fn preload_page(
        &self,
        after: SurrogateId,
        limit: usize,
    ) -> Result<PreloadPage, CacheError> {
        let records = self
            .store
            .read_range(E::KIND, after, limit)
            .await
            .map_err(CacheError::store(E::KIND))?;

        let mut page = PreloadPage {
            fetched: records.len(),
            inserted: 0,
            last: None,
        };
        for record in &records {
            page.last = Some(page.last.map_or(record.id, |last| last.max(record.id)));
            match decode_fields::<E>(record) {
                Ok(fields) if fields.key(record.id).to_string() != record.key => {
                    warn!(kind = %E::KIND, id = %record.id, key = %record.key, "skipping record whose fields disagree with its stored key");
                }
                Ok(fields) => {
                    if self.insert_from_preload(record.id, fields) {
                        page.inserted += 1;
                    }
                }
                Err(error) => {
                    warn!(kind = %E::KIND, id = %record.id, error = %error, "skipping undecodable record during preload");
                }
            }
        }

        metrics::counter!("banstick_cache_preloaded_total", "kind" => E::KIND.as_str())
            .increment(page.inserted as u64);
        Ok(page)
    }
}
