//! `BanStick` server: write-back entity cache with periodic dirty-save and
//! cursor-driven preload over a pluggable backing store.

pub mod error;
pub mod schedule;
pub mod service;
pub mod storage;

pub use error::CacheError;
pub use service::{CacheConfig, CacheService};
pub use storage::{BackingStore, CacheContext, EntityCache, EntityHandle};

