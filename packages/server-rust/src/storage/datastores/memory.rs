//! In-memory [`BackingStore`] implementation.
//!
//! [`MemoryBackingStore`] keeps one table per kind: rows by key plus an
//! ordered id index for range reads. Nothing survives the process.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use async_trait::async_trait;
use banstick_core::{EntityKind, SurrogateId};
use parking_lot::RwLock;

use crate::storage::backing_store::{BackingStore, DuplicateKey};
use crate::storage::record::StoredRecord;

#[derive(Default)]
struct MemoryTable {
    rows: HashMap<String, StoredRecord>,
    ids: BTreeMap<SurrogateId, String>,
    last_id: SurrogateId,
}

/// Volatile store for tests and runs that need no durability.
#[derive(Default)]
pub struct MemoryBackingStore {
    tables: RwLock<HashMap<EntityKind, MemoryTable>>,
}

impl MemoryBackingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows stored for `kind`.
    #[must_use]
    pub fn len(&self, kind: EntityKind) -> usize {
        self.tables.read().get(&kind).map_or(0, |t| t.rows.len())
    }

    #[must_use]
    pub fn is_empty(&self, kind: EntityKind) -> bool {
        self.len(kind) == 0
    }
}

#[async_trait]
impl BackingStore for MemoryBackingStore {
    async fn initialize(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn read_by_key(
        &self,
        kind: EntityKind,
        key: &str,
    ) -> anyhow::Result<Option<StoredRecord>> {
        Ok(self
            .tables
            .read()
            .get(&kind)
            .and_then(|table| table.rows.get(key))
            .cloned())
    }

    async fn read_range(
        &self,
        kind: EntityKind,
        after: SurrogateId,
        limit: usize,
    ) -> anyhow::Result<Vec<StoredRecord>> {
        let tables = self.tables.read();
        let Some(table) = tables.get(&kind) else {
            return Ok(Vec::new());
        };
        Ok(table
            .ids
            .range((Bound::Excluded(after), Bound::Unbounded))
            .filter_map(|(_, key)| table.rows.get(key))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn upsert(&self, kind: EntityKind, record: &StoredRecord) -> anyhow::Result<()> {
        let mut tables = self.tables.write();
        let table = tables.entry(kind).or_default();
        if let Some(previous) = table.rows.insert(record.key.clone(), record.clone()) {
            if previous.id != record.id {
                table.ids.remove(&previous.id);
            }
        }
        table.ids.insert(record.id, record.key.clone());
        table.last_id = table.last_id.max(record.id);
        Ok(())
    }

    async fn create_and_assign_id(
        &self,
        kind: EntityKind,
        key: Option<&str>,
        payload: Vec<u8>,
    ) -> anyhow::Result<StoredRecord> {
        let mut tables = self.tables.write();
        let table = tables.entry(kind).or_default();
        let id = table.last_id.next();
        let key = key.map_or_else(|| id.to_string(), str::to_owned);
        if table.rows.contains_key(&key) {
            return Err(DuplicateKey { kind, key }.into());
        }

        let record = StoredRecord { id, key, payload };
        table.ids.insert(id, record.key.clone());
        table.rows.insert(record.key.clone(), record.clone());
        table.last_id = id;
        Ok(record)
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
