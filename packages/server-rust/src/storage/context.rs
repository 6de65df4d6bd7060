//! Explicitly constructed owner of the store and the six entity caches.
//!
//! [`CacheContext`] is passed to whatever needs store access. It wires one
//! [`EntityCache`] per kind against a shared [`BackingStore`] and knows the
//! fixed order in which kinds are flushed.

use std::sync::Arc;

use banstick_core::{Ban, EntityKind, Ip, IpData, Player, Session, Share};
use tracing::{info, warn};

use super::backing_store::BackingStore;
use super::cache::{EntityCache, ManagedCache};
use super::flush::FlushReport;
use super::observer::CacheObserver;
use crate::schedule::DIRTY_SAVE_ORDER;

/// The backing store plus one cache per entity kind.
pub struct CacheContext {
    store: Arc<dyn BackingStore>,
    pub players: Arc<EntityCache<Player>>,
    pub bans: Arc<EntityCache<Ban>>,
    pub sessions: Arc<EntityCache<Session>>,
    pub shares: Arc<EntityCache<Share>>,
    pub ips: Arc<EntityCache<Ip>>,
    pub ip_data: Arc<EntityCache<IpData>>,
}

impl CacheContext {
    /// Builds empty caches over `store`. `ip_observers` are attached to the
    /// Ip cache.
    #[must_use]
    pub fn new(store: Arc<dyn BackingStore>, ip_observers: Vec<Arc<dyn CacheObserver<Ip>>>) -> Self {
        Self {
            players: Arc::new(EntityCache::new(Arc::clone(&store), Vec::new())),
            bans: Arc::new(EntityCache::new(Arc::clone(&store), Vec::new())),
            sessions: Arc::new(EntityCache::new(Arc::clone(&store), Vec::new())),
            shares: Arc::new(EntityCache::new(Arc::clone(&store), Vec::new())),
            ips: Arc::new(EntityCache::new(Arc::clone(&store), ip_observers)),
            ip_data: Arc::new(EntityCache::new(Arc::clone(&store), Vec::new())),
            store,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn BackingStore> {
        &self.store
    }

    /// Kind-erased view of one cache, for the background tasks.
    #[must_use]
    pub fn managed(&self, kind: EntityKind) -> Arc<dyn ManagedCache> {
        match kind {
            EntityKind::Player => self.players.clone(),
            EntityKind::Ban => self.bans.clone(),
            EntityKind::Session => self.sessions.clone(),
            EntityKind::Share => self.shares.clone(),
            EntityKind::Ip => self.ips.clone(),
            EntityKind::IpData => self.ip_data.clone(),
        }
    }

    /// Total dirty entities across every kind.
    #[must_use]
    pub fn dirty_count(&self) -> usize {
        EntityKind::ALL
            .iter()
            .map(|&kind| self.managed(kind).dirty_count())
            .sum()
    }

    /// Saves every dirty entity of every kind, one kind at a time in flush
    /// order. Failures are logged and left dirty.
    pub async fn flush_all(&self) -> Vec<FlushReport> {
        let mut reports = Vec::with_capacity(DIRTY_SAVE_ORDER.len());
        for kind in DIRTY_SAVE_ORDER {
            let report = self.managed(kind).save_dirty().await;
            if !report.is_complete() {
                warn!(kind = %kind, failed = report.failed, "final flush left dirty records behind");
            }
            reports.push(report);
        }
        let written: usize = reports.iter().map(|r| r.written).sum();
        info!(written, "flushed all dirty records");
        reports
    }
}
