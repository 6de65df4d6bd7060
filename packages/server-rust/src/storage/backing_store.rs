//! Durable keyed storage consumed by the entity caches.
//!
//! Defines [`BackingStore`], the black-box persistence contract: read by key,
//! read a page of records past a surrogate-id cursor, upsert, and create with
//! a store-assigned id. The caches decide when to call it; implementations
//! only decide how to persist.

use async_trait::async_trait;
use banstick_core::{EntityKind, SurrogateId};

use super::record::StoredRecord;

/// Returned (inside `anyhow::Error`) when a create collides with an
/// existing natural key.
#[derive(Debug, thiserror::Error)]
#[error("duplicate {kind} key: {key}")]
pub struct DuplicateKey {
    pub kind: EntityKind,
    pub key: String,
}

/// Durable storage with one logical table per [`EntityKind`].
///
/// Each row is keyed by its natural key string and carries a separately
/// indexed surrogate id used only for cursoring.
///
/// Used as `Arc<dyn BackingStore>`.
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Verifies connectivity and prepares tables.
    ///
    /// A failure here is fatal: nothing is activated.
    async fn initialize(&self) -> anyhow::Result<()>;

    /// Loads a single record by key. Returns `None` if the key does not exist.
    async fn read_by_key(&self, kind: EntityKind, key: &str)
        -> anyhow::Result<Option<StoredRecord>>;

    /// Loads at most `limit` records with id strictly greater than `after`,
    /// ordered by id ascending.
    async fn read_range(
        &self,
        kind: EntityKind,
        after: SurrogateId,
        limit: usize,
    ) -> anyhow::Result<Vec<StoredRecord>>;

    /// Inserts or replaces the record stored under `record.key`.
    async fn upsert(&self, kind: EntityKind, record: &StoredRecord) -> anyhow::Result<()>;

    /// Persists a new record and assigns it the next surrogate id.
    ///
    /// `key` of `None` means the assigned id (in decimal) becomes the key.
    /// Fails with [`DuplicateKey`] if `key` is already taken.
    async fn create_and_assign_id(
        &self,
        kind: EntityKind,
        key: Option<&str>,
        payload: Vec<u8>,
    ) -> anyhow::Result<StoredRecord>;

    /// Releases connections and file handles.
    async fn close(&self) -> anyhow::Result<()>;
}
