//! Embedded durable [`BackingStore`] on a single redb file.
//!
//! Each kind gets two tables: `<kind>_records` maps the surrogate id to the
//! MessagePack-encoded [`StoredRecord`], and `<kind>_keys` maps the key
//! string to its id. redb is synchronous, so every call runs on the
//! blocking pool.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use banstick_core::{EntityKind, SurrogateId};
use redb::{Database, ReadableTable, TableDefinition, TableError};

use crate::storage::backing_store::{BackingStore, DuplicateKey};
use crate::storage::record::StoredRecord;

type RecordsTable = TableDefinition<'static, u64, &'static [u8]>;
type KeysTable = TableDefinition<'static, &'static str, u64>;

fn records_table(kind: EntityKind) -> RecordsTable {
    TableDefinition::new(match kind {
        EntityKind::Player => "player_records",
        EntityKind::Ban => "ban_records",
        EntityKind::Session => "session_records",
        EntityKind::Share => "share_records",
        EntityKind::Ip => "ip_records",
        EntityKind::IpData => "ip_data_records",
    })
}

fn keys_table(kind: EntityKind) -> KeysTable {
    TableDefinition::new(match kind {
        EntityKind::Player => "player_keys",
        EntityKind::Ban => "ban_keys",
        EntityKind::Session => "session_keys",
        EntityKind::Share => "share_keys",
        EntityKind::Ip => "ip_keys",
        EntityKind::IpData => "ip_data_keys",
    })
}

fn decode(bytes: &[u8]) -> anyhow::Result<StoredRecord> {
    Ok(rmp_serde::from_slice(bytes)?)
}

/// redb-backed store. Cloning the inner handle is cheap; one file per store.
pub struct RedbBackingStore {
    db: Arc<Database>,
}

impl RedbBackingStore {
    /// Opens or creates the database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or is not a redb file.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        Ok(Self {
            db: Arc::new(Database::create(path)?),
        })
    }

    async fn blocking<T, F>(&self, work: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || work(&db)).await?
    }
}

#[async_trait]
impl BackingStore for RedbBackingStore {
    async fn initialize(&self) -> anyhow::Result<()> {
        self.blocking(|db| {
            let txn = db.begin_write()?;
            for kind in EntityKind::ALL {
                txn.open_table(records_table(kind))?;
                txn.open_table(keys_table(kind))?;
            }
            txn.commit()?;
            Ok(())
        })
        .await
    }

    async fn read_by_key(
        &self,
        kind: EntityKind,
        key: &str,
    ) -> anyhow::Result<Option<StoredRecord>> {
        let key = key.to_owned();
        self.blocking(move |db| {
            let txn = db.begin_read()?;
            let keys = match txn.open_table(keys_table(kind)) {
                Ok(table) => table,
                Err(TableError::TableDoesNotExist(_)) => return Ok(None),
                Err(error) => return Err(error.into()),
            };
            let Some(id) = keys.get(key.as_str())?.map(|guard| guard.value()) else {
                return Ok(None);
            };
            let records = txn.open_table(records_table(kind))?;
            let record = match records.get(id)? {
                Some(guard) => Some(decode(guard.value())?),
                None => None,
            };
            Ok(record)
        })
        .await
    }

    async fn read_range(
        &self,
        kind: EntityKind,
        after: SurrogateId,
        limit: usize,
    ) -> anyhow::Result<Vec<StoredRecord>> {
        self.blocking(move |db| {
            let txn = db.begin_read()?;
            let records = match txn.open_table(records_table(kind)) {
                Ok(table) => table,
                Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
                Err(error) => return Err(error.into()),
            };
            let mut page = Vec::with_capacity(limit.min(1024));
            for entry in records.range(after.get().saturating_add(1)..)?.take(limit) {
                let (_, value) = entry?;
                page.push(decode(value.value())?);
            }
            Ok(page)
        })
        .await
    }

    async fn upsert(&self, kind: EntityKind, record: &StoredRecord) -> anyhow::Result<()> {
        let bytes = rmp_serde::to_vec(record)?;
        let id = record.id.get();
        let key = record.key.clone();
        self.blocking(move |db| {
            let txn = db.begin_write()?;
            {
                let mut records = txn.open_table(records_table(kind))?;
                let mut keys = txn.open_table(keys_table(kind))?;
                records.insert(id, bytes.as_slice())?;
                keys.insert(key.as_str(), id)?;
            }
            txn.commit()?;
            Ok(())
        })
        .await
    }

    async fn create_and_assign_id(
        &self,
        kind: EntityKind,
        key: Option<&str>,
        payload: Vec<u8>,
    ) -> anyhow::Result<StoredRecord> {
        let key = key.map(str::to_owned);
        self.blocking(move |db| {
            let txn = db.begin_write()?;
            let record = {
                let mut records = txn.open_table(records_table(kind))?;
                let mut keys = txn.open_table(keys_table(kind))?;

                let last = records.last()?.map_or(0, |(id, _)| id.value());
                let id = SurrogateId(last).next();
                let key = key.unwrap_or_else(|| id.to_string());
                if keys.get(key.as_str())?.is_some() {
                    return Err(DuplicateKey { kind, key }.into());
                }

                let record = StoredRecord { id, key, payload };
                records.insert(id.get(), rmp_serde::to_vec(&record)?.as_slice())?;
                keys.insert(record.key.as_str(), id.get())?;
                record
            };
            txn.commit()?;
            Ok(record)
        })
        .await
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
