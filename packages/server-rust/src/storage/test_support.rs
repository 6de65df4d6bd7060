//! Fault-injecting, call-counting store wrapper shared by the storage tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use banstick_core::{EntityKind, SurrogateId};
use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};

use super::datastores::MemoryBackingStore;
use super::{BackingStore, StoredRecord};

/// Holds upserts until released, signalling when the first one arrives.
pub struct UpsertGate {
    entered: Notify,
    released: Semaphore,
}

impl Default for UpsertGate {
    fn default() -> Self {
        Self {
            entered: Notify::new(),
            released: Semaphore::new(0),
        }
    }
}

impl UpsertGate {
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.released.add_permits(1 << 16);
    }
}

/// [`MemoryBackingStore`] with call counters, artificial latency, and
/// switchable failures.
#[derive(Default)]
pub struct InstrumentedStore {
    inner: MemoryBackingStore,
    latency: Option<Duration>,
    fail_all: AtomicBool,
    failing_upsert_keys: Mutex<HashSet<String>>,
    gate: Mutex<Option<Arc<UpsertGate>>>,
    creates: AtomicUsize,
    upserts: AtomicUsize,
    key_reads: AtomicUsize,
    range_reads: AtomicUsize,
}

impl InstrumentedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn inner(&self) -> &MemoryBackingStore {
        &self.inner
    }

    pub fn fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    pub fn fail_upserts_for(&self, key: &str) {
        self.failing_upsert_keys.lock().insert(key.to_string());
    }

    pub fn clear_failures(&self) {
        self.fail_all(false);
        self.failing_upsert_keys.lock().clear();
    }

    pub fn gate_upserts(&self) -> Arc<UpsertGate> {
        let gate = Arc::new(UpsertGate::default());
        *self.gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn upserts(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub fn key_reads(&self) -> usize {
        self.key_reads.load(Ordering::SeqCst)
    }

    pub fn range_reads(&self) -> usize {
        self.range_reads.load(Ordering::SeqCst)
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.fail_all.load(Ordering::SeqCst) {
            anyhow::bail!("injected store failure");
        }
        Ok(())
    }
}

#[async_trait]
impl BackingStore for InstrumentedStore {
    async fn initialize(&self) -> anyhow::Result<()> {
        self.check()
    }

    async fn read_by_key(
        &self,
        kind: EntityKind,
        key: &str,
    ) -> anyhow::Result<Option<StoredRecord>> {
        self.key_reads.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        self.check()?;
        self.inner.read_by_key(kind, key).await
    }

    async fn read_range(
        &self,
        kind: EntityKind,
        after: SurrogateId,
        limit: usize,
    ) -> anyhow::Result<Vec<StoredRecord>> {
        self.range_reads.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.read_range(kind, after, limit).await
    }

    async fn upsert(&self, kind: EntityKind, record: &StoredRecord) -> anyhow::Result<()> {
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.released.acquire().await?.forget();
        }
        self.check()?;
        if self.failing_upsert_keys.lock().contains(&record.key) {
            anyhow::bail!("injected upsert failure for {}", record.key);
        }
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert(kind, record).await
    }

    async fn create_and_assign_id(
        &self,
        kind: EntityKind,
        key: Option<&str>,
        payload: Vec<u8>,
    ) -> anyhow::Result<StoredRecord> {
        self.delay().await;
        self.check()?;
        let record = self.inner.create_and_assign_id(kind, key, payload).await?;
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(record)
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.inner.close().await
    }
}
