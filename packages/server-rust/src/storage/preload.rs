//! Cursor-driven preload task.
//!
//! [`PreloadTask`] warms one kind's cache in bounded pages, ordered by
//! surrogate id. The cursor only advances after a page was read, so a failed
//! read is retried from the same position next cycle. A page shorter than
//! the batch size means the store has nothing further and the task asks the
//! runner to stop scheduling it.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use banstick_core::SurrogateId;
use tracing::{debug, info, warn};

use super::cache::ManagedCache;
use crate::schedule::{PeriodicTask, TaskControl};

/// Result of reading one page into the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreloadPage {
    /// Records returned by the store.
    pub fetched: usize,
    /// Records actually inserted (the rest were already cached or undecodable).
    pub inserted: usize,
    /// Highest id among the returned records.
    pub last: Option<SurrogateId>,
}

/// Resume point of a preload, held in memory only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreloadCursor {
    /// Highest id already pulled into the cache.
    pub position: SurrogateId,
    pub exhausted: bool,
}

impl PreloadCursor {
    /// Sentinel reported by [`value`](Self::value) once preload is exhausted.
    pub const EXHAUSTED: i64 = -1;

    /// Position as a signed value, or `-1` once exhausted.
    #[must_use]
    pub fn value(&self) -> i64 {
        if self.exhausted {
            Self::EXHAUSTED
        } else {
            i64::try_from(self.position.get()).unwrap_or(i64::MAX)
        }
    }
}

impl fmt::Display for PreloadCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

/// Pulls one kind's records into its cache a page at a time.
pub struct PreloadTask {
    cache: Arc<dyn ManagedCache>,
    cursor: PreloadCursor,
    batch_size: usize,
}

impl PreloadTask {
    /// Creates a task starting from the beginning of the table.
    /// A zero batch size is treated as 1.
    #[must_use]
    pub fn new(cache: Arc<dyn ManagedCache>, batch_size: usize) -> Self {
        Self {
            cache,
            cursor: PreloadCursor::default(),
            batch_size: batch_size.max(1),
        }
    }

    #[must_use]
    pub fn cursor(&self) -> PreloadCursor {
        self.cursor
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Reads the next page and advances the cursor. Does nothing once exhausted.
    pub async fn run_once(&mut self) -> PreloadCursor {
        if self.cursor.exhausted {
            return self.cursor;
        }

        let kind = self.cache.kind();
        debug!(kind = %kind, cursor = %self.cursor, batch = self.batch_size, "preload");

        match self.cache.preload_page(self.cursor.position, self.batch_size).await {
            Ok(page) => {
                if let Some(last) = page.last {
                    self.cursor.position = self.cursor.position.max(last);
                }
                if page.fetched < self.batch_size {
                    self.cursor.exhausted = true;
                    info!(
                        kind = %kind,
                        last = %self.cursor.position,
                        cached = self.cache.len(),
                        "preload complete"
                    );
                } else {
                    debug!(kind = %kind, inserted = page.inserted, cursor = %self.cursor, "preload page done");
                }
            }
            Err(error) => {
                warn!(
                    kind = %kind,
                    cursor = %self.cursor,
                    error = %error,
                    "preload page failed; retrying from the same cursor next cycle"
                );
            }
        }
        self.cursor
    }
}

#[async_trait]
impl PeriodicTask for PreloadTask {
    fn name(&self) -> String {
        format!("{}-preload", self.cache.kind())
    }

    async fn run(&mut self) -> TaskControl {
        if self.run_once().await.exhausted {
            TaskControl::Stop
        } else {
            TaskControl::Continue
        }
    }
}
