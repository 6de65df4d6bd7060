//! Cache service: startup, gameplay-path lookups, and shutdown.
//!
//! [`CacheService::start`] checks the store, builds the [`CacheContext`],
//! and registers the staggered preload and dirty-save tasks with a
//! [`TaskRunner`]. [`CacheService::shutdown`] cancels them and performs the
//! final flush before closing the store.

pub mod config;

use std::net::IpAddr;
use std::sync::Arc;

use banstick_core::{
    now_millis, Ban, Ip, IpData, IpKey, Player, Session, Share, SurrogateId,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

pub use config::{CacheConfig, DirtySaveConfig, PreloadConfig, StoreConfig};

use crate::error::CacheError;
use crate::schedule::{TaskHandle, TaskPlan, TaskRole, TaskRunner};
use crate::storage::{
    BackingStore, CacheContext, CacheObserver, DirtySaveTask, EntityHandle, FlushReport,
    IpDataRefreshQueue, PreloadTask, RefreshRequest,
};

type Handle<E> = Arc<EntityHandle<E>>;

/// Running cache with its background tasks.
pub struct CacheService {
    context: Arc<CacheContext>,
    runner: Arc<dyn TaskRunner>,
    tasks: Mutex<Vec<TaskHandle>>,
    refresh_rx: Mutex<Option<mpsc::Receiver<RefreshRequest>>>,
}

impl CacheService {
    /// Initializes the store and activates the background tasks.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Startup`] if the store cannot be initialized;
    /// no task is scheduled in that case.
    pub async fn start(
        config: &CacheConfig,
        store: Arc<dyn BackingStore>,
        runner: Arc<dyn TaskRunner>,
    ) -> Result<Self, CacheError> {
        store.initialize().await.map_err(CacheError::Startup)?;

        let (refresh, refresh_rx) = IpDataRefreshQueue::new(config.refresh_queue_capacity);
        let ip_observers: Vec<Arc<dyn CacheObserver<Ip>>> = vec![Arc::new(refresh)];
        let context = Arc::new(CacheContext::new(store, ip_observers));

        let service = Self {
            context,
            runner,
            tasks: Mutex::new(Vec::new()),
            refresh_rx: Mutex::new(Some(refresh_rx)),
        };
        service.activate(&TaskPlan::from_config(config));
        Ok(service)
    }

    fn activate(&self, plan: &TaskPlan) {
        let mut tasks = self.tasks.lock();

        let mut preloading = false;
        for planned in plan.role(TaskRole::Preload) {
            let task = PreloadTask::new(self.context.managed(planned.kind), planned.batch_size);
            tasks.push(self.runner.schedule(
                Box::new(task),
                planned.initial_delay,
                planned.period,
            ));
            preloading = true;
        }
        if preloading {
            info!("Preload tasks started.");
        } else {
            info!("Preloading is disabled. Expect more lag on joins, lookups, and bans.");
        }

        for planned in plan.role(TaskRole::DirtySave) {
            let task = DirtySaveTask::new(self.context.managed(planned.kind));
            tasks.push(self.runner.schedule(
                Box::new(task),
                planned.initial_delay,
                planned.period,
            ));
        }
        info!("Dirty save tasks started.");
    }

    #[must_use]
    pub fn context(&self) -> &Arc<CacheContext> {
        &self.context
    }

    /// Takes the receiving end of the IP data refresh queue. Returns `None`
    /// after the first call.
    pub fn take_refresh_receiver(&self) -> Option<mpsc::Receiver<RefreshRequest>> {
        self.refresh_rx.lock().take()
    }

    // --- Players ---

    /// Looks up a player, registering them as first seen now if unknown.
    ///
    /// # Errors
    ///
    /// Propagates store and codec failures.
    pub async fn get_or_create_player(
        &self,
        uuid: Uuid,
        name: &str,
    ) -> Result<Handle<Player>, CacheError> {
        self.context
            .players
            .get_or_create(&uuid, || Player::new(uuid, name, now_millis()))
            .await
    }

    /// # Errors
    ///
    /// Propagates store and codec failures.
    pub async fn get_player(&self, uuid: Uuid) -> Result<Option<Handle<Player>>, CacheError> {
        self.context.players.get(&uuid).await
    }

    // --- Addresses ---

    /// Looks up a single address, recording it if unknown. Known addresses
    /// are queued for an IP data refresh.
    ///
    /// # Errors
    ///
    /// Propagates store and codec failures.
    pub async fn get_or_create_ip(&self, addr: IpAddr) -> Result<Handle<Ip>, CacheError> {
        let key = IpKey::host(addr);
        self.context
            .ips
            .get_or_create(&key, || Ip::new(key, now_millis()))
            .await
    }

    /// # Errors
    ///
    /// Propagates store and codec failures.
    pub async fn get_ip(&self, addr: IpAddr) -> Result<Option<Handle<Ip>>, CacheError> {
        self.context.ips.get(&IpKey::host(addr)).await
    }

    /// Cached addresses and ranges that contain `addr`. Only sees what is in
    /// memory, so results are complete once preload has finished.
    #[must_use]
    pub fn all_matching_ip(&self, addr: IpAddr) -> Vec<Handle<Ip>> {
        self.context.ips.matching(|ip| ip.contains(addr))
    }

    // --- Surrogate-keyed kinds ---

    /// # Errors
    ///
    /// Propagates store and codec failures.
    pub async fn create_ban(&self, ban: Ban) -> Result<Handle<Ban>, CacheError> {
        self.context.bans.create(ban).await
    }

    /// # Errors
    ///
    /// Propagates store and codec failures.
    pub async fn get_ban(&self, id: SurrogateId) -> Result<Option<Handle<Ban>>, CacheError> {
        self.context.bans.get(&id).await
    }

    /// Opens a session for `player` joining from `ip`, starting now.
    ///
    /// # Errors
    ///
    /// Propagates store and codec failures.
    pub async fn create_session(
        &self,
        player: SurrogateId,
        ip: SurrogateId,
    ) -> Result<Handle<Session>, CacheError> {
        self.context
            .sessions
            .create(Session::begin(player, ip, now_millis()))
            .await
    }

    /// # Errors
    ///
    /// Propagates store and codec failures.
    pub async fn get_session(
        &self,
        id: SurrogateId,
    ) -> Result<Option<Handle<Session>>, CacheError> {
        self.context.sessions.get(&id).await
    }

    /// # Errors
    ///
    /// Propagates store and codec failures.
    pub async fn create_share(&self, share: Share) -> Result<Handle<Share>, CacheError> {
        self.context.shares.create(share).await
    }

    /// # Errors
    ///
    /// Propagates store and codec failures.
    pub async fn get_share(&self, id: SurrogateId) -> Result<Option<Handle<Share>>, CacheError> {
        self.context.shares.get(&id).await
    }

    /// # Errors
    ///
    /// Propagates store and codec failures.
    pub async fn create_ip_data(&self, data: IpData) -> Result<Handle<IpData>, CacheError> {
        self.context.ip_data.create(data).await
    }

    /// # Errors
    ///
    /// Propagates store and codec failures.
    pub async fn get_ip_data(
        &self,
        id: SurrogateId,
    ) -> Result<Option<Handle<IpData>>, CacheError> {
        self.context.ip_data.get(&id).await
    }

    // --- Lifecycle ---

    /// Cancels the background tasks, waits for any cycle already running,
    /// flushes every kind in order, and closes the store. Runs to completion;
    /// failures are logged.
    pub async fn shutdown(&self) -> Vec<FlushReport> {
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for handle in &tasks {
            self.runner.cancel(handle).await;
        }
        info!(cancelled = tasks.len(), "background tasks cancelled");

        let reports = self.context.flush_all().await;
        if let Err(error) = self.context.store().close().await {
            warn!(error = %error, "backing store close failed");
        }
        reports
    }
}
