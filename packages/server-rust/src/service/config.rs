use std::time::Duration;

/// 15000 server ticks at 20 ticks per second.
const DEFAULT_INTERVAL: Duration = Duration::from_secs(750);

/// Timing of the per-kind dirty-save tasks.
#[derive(Debug, Clone)]
pub struct DirtySaveConfig {
    /// Delay before the first kind's first flush.
    pub delay: Duration,
    /// Interval between flushes of the same kind.
    pub period: Duration,
}

impl Default for DirtySaveConfig {
    fn default() -> Self {
        Self {
            delay: DEFAULT_INTERVAL,
            period: DEFAULT_INTERVAL,
        }
    }
}

/// Timing and page size of the per-kind preload tasks.
#[derive(Debug, Clone)]
pub struct PreloadConfig {
    pub enabled: bool,
    pub delay: Duration,
    pub period: Duration,
    /// Maximum records pulled per kind per cycle.
    pub batch_size: usize,
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            delay: DEFAULT_INTERVAL,
            period: DEFAULT_INTERVAL,
            batch_size: 100,
        }
    }
}

/// Connection settings for pooled backing stores.
///
/// For the redb store `url` is the database file path; the pool settings
/// only apply to the postgres store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub url: String,
    pub pool_size: u32,
    pub connection_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            pool_size: 5,
            connection_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(7200),
        }
    }
}

/// Top-level cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub dirty_save: DirtySaveConfig,
    pub preload: PreloadConfig,
    pub store: StoreConfig,
    /// Capacity of the IP data refresh channel.
    pub refresh_queue_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dirty_save: DirtySaveConfig::default(),
            preload: PreloadConfig::default(),
            store: StoreConfig::default(),
            refresh_queue_capacity: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = CacheConfig::default();
        assert_eq!(config.dirty_save.delay, Duration::from_secs(750));
        assert_eq!(config.dirty_save.period, Duration::from_secs(750));
        assert_eq!(config.preload.period, Duration::from_secs(750));
        assert!(!config.preload.enabled);
        assert_eq!(config.preload.batch_size, 100);
        assert_eq!(config.store.pool_size, 5);
        assert_eq!(config.store.max_lifetime, Duration::from_secs(7200));
        assert_eq!(config.refresh_queue_capacity, 1024);
    }
}
