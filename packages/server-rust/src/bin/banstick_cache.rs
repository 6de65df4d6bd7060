//! Standalone cache process: opens a backing store, runs the background
//! tasks until interrupted, then flushes and exits.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use banstick_server::schedule::TokioTaskRunner;
use banstick_server::storage::datastores::MemoryBackingStore;
use banstick_server::storage::BackingStore;
use banstick_server::{CacheConfig, CacheService};
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StoreKind {
    Memory,
    #[cfg(feature = "redb")]
    Redb,
    #[cfg(feature = "postgres")]
    Postgres,
}

#[derive(Parser, Debug)]
#[command(name = "banstick-cache")]
#[command(about = "Write-back entity cache for BanStick")]
struct Cli {
    #[arg(long, value_enum, default_value = "memory", env = "BANSTICK_STORE")]
    store: StoreKind,

    /// redb file path or postgres connection URL.
    #[arg(long, default_value = "banstick.redb", env = "BANSTICK_STORE_URL")]
    url: String,

    #[arg(long, default_value_t = 5, env = "BANSTICK_POOL_SIZE")]
    pool_size: u32,

    #[arg(long, default_value_t = 750, env = "BANSTICK_DIRTY_SAVE_DELAY_SECS")]
    dirty_save_delay_secs: u64,

    #[arg(long, default_value_t = 750, env = "BANSTICK_DIRTY_SAVE_PERIOD_SECS")]
    dirty_save_period_secs: u64,

    #[arg(long, env = "BANSTICK_PRELOAD")]
    preload: bool,

    #[arg(long, default_value_t = 750, env = "BANSTICK_PRELOAD_DELAY_SECS")]
    preload_delay_secs: u64,

    #[arg(long, default_value_t = 750, env = "BANSTICK_PRELOAD_PERIOD_SECS")]
    preload_period_secs: u64,

    #[arg(long, default_value_t = 100, env = "BANSTICK_PRELOAD_BATCH")]
    preload_batch: usize,

    /// Emit logs as JSON lines.
    #[arg(long, env = "BANSTICK_LOG_JSON")]
    log_json: bool,
}

impl Cli {
    fn config(&self) -> CacheConfig {
        let mut config = CacheConfig::default();
        config.store.url.clone_from(&self.url);
        config.store.pool_size = self.pool_size;
        config.dirty_save.delay = Duration::from_secs(self.dirty_save_delay_secs);
        config.dirty_save.period = Duration::from_secs(self.dirty_save_period_secs);
        config.preload.enabled = self.preload;
        config.preload.delay = Duration::from_secs(self.preload_delay_secs);
        config.preload.period = Duration::from_secs(self.preload_period_secs);
        config.preload.batch_size = self.preload_batch;
        config
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn open_store(kind: StoreKind, config: &CacheConfig) -> anyhow::Result<Arc<dyn BackingStore>> {
    let store: Arc<dyn BackingStore> = match kind {
        StoreKind::Memory => Arc::new(MemoryBackingStore::new()),
        #[cfg(feature = "redb")]
        StoreKind::Redb => Arc::new(
            banstick_server::storage::datastores::RedbBackingStore::open(&config.store.url)
                .with_context(|| format!("opening redb file {}", config.store.url))?,
        ),
        #[cfg(feature = "postgres")]
        StoreKind::Postgres => Arc::new(
            banstick_server::storage::datastores::PostgresBackingStore::connect(&config.store)
                .await
                .context("connecting to postgres")?,
        ),
    };
    Ok(store)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = cli.config();
    let store = open_store(cli.store, &config).await?;
    let runner = Arc::new(TokioTaskRunner::new());
    let service = CacheService::start(&config, store, runner.clone()).await?;
    info!(store = ?cli.store, "cache started");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;

    info!("shutting down");
    let reports = service.shutdown().await;
    runner.shutdown().await;
    let written: usize = reports.iter().map(|r| r.written).sum();
    info!(written, "shutdown complete");
    Ok(())
}
