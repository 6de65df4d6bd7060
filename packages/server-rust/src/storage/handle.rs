//! Cached entity instances and their dirty state.
//!
//! An [`EntityHandle`] is the single in-memory instance of one durable
//! record. Dirty tracking follows the same shape as a last-update versus
//! last-stored comparison: every mutation bumps `version`, every successful
//! flush raises `stored_version` to the version it wrote, and the handle is
//! dirty while `version > stored_version`.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use banstick_core::{Entity, SurrogateId};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::record::{encode_fields, StoredRecord};
use crate::error::CacheError;

/// The one live in-memory instance of a durable record.
///
/// Shared as `Arc<EntityHandle<E>>`; identity comparisons between two lookups
/// of the same key can use [`Arc::ptr_eq`].
#[derive(Debug)]
pub struct EntityHandle<E: Entity> {
    id: SurrogateId,
    key: E::Key,
    fields: RwLock<E>,
    version: AtomicU64,
    stored_version: AtomicU64,
}

impl<E: Entity> EntityHandle<E> {
    /// Wraps fields that match what the store currently holds.
    pub(crate) fn clean(id: SurrogateId, key: E::Key, fields: E) -> Self {
        Self {
            id,
            key,
            fields: RwLock::new(fields),
            version: AtomicU64::new(0),
            stored_version: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn id(&self) -> SurrogateId {
        self.id
    }

    #[must_use]
    pub fn key(&self) -> &E::Key {
        &self.key
    }

    /// Shared read access to the fields.
    pub fn read(&self) -> RwLockReadGuard<'_, E> {
        self.fields.read()
    }

    /// Returns a copy of the current fields.
    #[must_use]
    pub fn snapshot(&self) -> E {
        self.fields.read().clone()
    }

    /// Exclusive write access. The handle is marked dirty when the guard drops.
    pub fn write(&self) -> EntityWriteGuard<'_, E> {
        EntityWriteGuard {
            fields: self.fields.write(),
            version: &self.version,
        }
    }

    /// Mutates the fields in place and marks the handle dirty.
    pub fn update<R>(&self, mutate: impl FnOnce(&mut E) -> R) -> R {
        let mut guard = self.write();
        mutate(&mut guard)
    }

    /// Marks the handle dirty without changing any field.
    ///
    /// Does not take the field lock, so it is safe to call while holding a
    /// guard from [`write`](Self::write).
    pub fn mark_dirty(&self) {
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.version.load(Ordering::Acquire) > self.stored_version.load(Ordering::Acquire)
    }

    /// Captures fields and version together if the handle is dirty.
    ///
    /// Taken under the read lock, so the copy and the version always match.
    pub(crate) fn dirty_snapshot(handle: &Arc<Self>) -> Option<DirtySnapshot<E>> {
        let fields = handle.fields.read();
        let version = handle.version.load(Ordering::Acquire);
        if version <= handle.stored_version.load(Ordering::Acquire) {
            return None;
        }
        Some(DirtySnapshot {
            handle: Arc::clone(handle),
            fields: fields.clone(),
            version,
        })
    }

    /// Records that `version` reached the store. Never lowers the stored
    /// version, so a mutation made after the snapshot stays dirty.
    ///
    /// Returns `true` if the handle is now clean.
    pub(crate) fn mark_stored(&self, version: u64) -> bool {
        self.stored_version.fetch_max(version, Ordering::AcqRel);
        !self.is_dirty()
    }
}

/// Write guard returned by [`EntityHandle::write`].
///
/// Bumps the handle's version on drop, while the lock is still held.
pub struct EntityWriteGuard<'a, E: Entity> {
    fields: RwLockWriteGuard<'a, E>,
    version: &'a AtomicU64,
}

impl<E: Entity> Deref for EntityWriteGuard<'_, E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.fields
    }
}

impl<E: Entity> DerefMut for EntityWriteGuard<'_, E> {
    fn deref_mut(&mut self) -> &mut E {
        &mut self.fields
    }
}

impl<E: Entity> Drop for EntityWriteGuard<'_, E> {
    fn drop(&mut self) {
        self.version.fetch_add(1, Ordering::AcqRel);
    }
}

/// A dirty handle's fields as they were when a flush cycle picked it up.
#[derive(Debug)]
pub struct DirtySnapshot<E: Entity> {
    handle: Arc<EntityHandle<E>>,
    fields: E,
    version: u64,
}

impl<E: Entity> DirtySnapshot<E> {
    #[must_use]
    pub fn handle(&self) -> &Arc<EntityHandle<E>> {
        &self.handle
    }

    #[must_use]
    pub fn fields(&self) -> &E {
        &self.fields
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Builds the row to upsert for this snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Encode`] if the fields cannot be serialized.
    pub fn to_record(&self) -> Result<StoredRecord, CacheError> {
        Ok(StoredRecord {
            id: self.handle.id(),
            key: self.handle.key().to_string(),
            payload: encode_fields(self.handle.key(), &self.fields)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use banstick_core::Ban;

    use super::*;

    fn handle() -> Arc<EntityHandle<Ban>> {
        Arc::new(EntityHandle::clean(
            SurrogateId(1),
            SurrogateId(1),
            Ban::admin(0, "x"),
        ))
    }

    #[test]
    fn loaded_handles_start_clean() {
        let h = handle();
        assert!(!h.is_dirty());
        assert!(EntityHandle::dirty_snapshot(&h).is_none());
    }

    #[test]
    fn write_guard_marks_dirty_on_drop() {
        let h = handle();
        {
            let mut fields = h.write();
            fields.admin = false;
            assert!(!h.is_dirty(), "version bumps only when the guard drops");
        }
        assert!(h.is_dirty());
        assert!(!h.read().admin);
    }

    #[test]
    fn mark_dirty_while_holding_write_guard() {
        let h = handle();
        let mut fields = h.write();
        fields.message = Some("edited".to_string());
        h.mark_dirty();
        drop(fields);

        assert!(h.is_dirty());
        let snap = EntityHandle::dirty_snapshot(&h).unwrap();
        assert_eq!(snap.fields().message.as_deref(), Some("edited"));
        assert!(h.mark_stored(snap.version()));
    }

    #[test]
    fn update_returns_closure_result() {
        let h = handle();
        let previous = h.update(|ban| std::mem::replace(&mut ban.ends, Some(5)));
        assert_eq!(previous, None);
        assert_eq!(h.snapshot().ends, Some(5));
        assert!(h.is_dirty());
    }

    #[test]
    fn mark_stored_clears_only_the_snapshotted_version() {
        let h = handle();
        h.update(|ban| ban.ends = Some(1));
        let snap = EntityHandle::dirty_snapshot(&h).unwrap();
        assert_eq!(snap.fields().ends, Some(1));

        // Mutation lands between snapshot and clear.
        h.update(|ban| ban.ends = Some(2));

        assert!(!h.mark_stored(snap.version()));
        assert!(h.is_dirty());

        let again = EntityHandle::dirty_snapshot(&h).unwrap();
        assert_eq!(again.fields().ends, Some(2));
        assert!(h.mark_stored(again.version()));
        assert!(!h.is_dirty());
    }

    #[test]
    fn stale_clear_never_lowers_stored_version() {
        let h = handle();
        h.mark_dirty();
        let first = EntityHandle::dirty_snapshot(&h).unwrap();
        h.mark_dirty();
        let second = EntityHandle::dirty_snapshot(&h).unwrap();

        assert!(h.mark_stored(second.version()));
        assert!(h.mark_stored(first.version()));
        assert!(!h.is_dirty());
    }

    #[test]
    fn snapshot_record_uses_handle_identity() {
        let h = handle();
        h.mark_dirty();
        let record = EntityHandle::dirty_snapshot(&h).unwrap().to_record().unwrap();
        assert_eq!(record.id, SurrogateId(1));
        assert_eq!(record.key, "1");
    }
}
