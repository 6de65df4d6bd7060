//! Write-back entity storage.
//!
//! - [`BackingStore`]: durable keyed storage, treated as a black box
//! - [`EntityCache`]: per-kind registry of live [`EntityHandle`]s with
//!   single-winner creation and check-and-clear dirty tracking
//! - [`DirtySaveTask`] / [`PreloadTask`]: the periodic flush and warm-up jobs
//! - [`CacheContext`]: owns the store and all six caches
//!
//! [`CacheObserver`] lets callers react to entities entering a cache.

pub mod backing_store;
pub mod cache;
pub mod context;
pub mod datastores;
pub mod flush;
pub mod handle;
pub mod observer;
pub mod preload;
pub mod record;

#[cfg(test)]
pub(crate) mod test_support;

pub use backing_store::{BackingStore, DuplicateKey};
pub use cache::{EntityCache, EntityOrigin, ManagedCache};
pub use context::CacheContext;
pub use flush::{DirtySaveTask, FlushReport};
pub use handle::{DirtySnapshot, EntityHandle, EntityWriteGuard};
pub use observer::{CacheObserver, CompositeCacheObserver, IpDataRefreshQueue, RefreshRequest};
pub use preload::{PreloadCursor, PreloadPage, PreloadTask};
pub use record::StoredRecord;
