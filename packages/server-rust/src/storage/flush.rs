//! Periodic dirty-save task.
//!
//! [`DirtySaveTask`] flushes one kind's pending mutations on each
//! invocation. Per-entity failures leave that entity dirty for the next
//! cycle; nothing is escalated.

use std::sync::Arc;

use async_trait::async_trait;
use banstick_core::EntityKind;
use tracing::debug;

use super::cache::ManagedCache;
use crate::schedule::{PeriodicTask, TaskControl};

/// Outcome of one dirty-save cycle for one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    pub kind: EntityKind,
    pub written: usize,
    pub failed: usize,
}

impl FlushReport {
    #[must_use]
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            written: 0,
            failed: 0,
        }
    }

    /// Whether every dirty entity picked up this cycle was written.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }

    pub(crate) fn record_metrics(&self) {
        let kind = self.kind.as_str();
        metrics::counter!("banstick_cache_flush_written_total", "kind" => kind)
            .increment(self.written as u64);
        metrics::counter!("banstick_cache_flush_failed_total", "kind" => kind)
            .increment(self.failed as u64);
    }
}

/// Flushes all dirty entities of one kind every time it runs.
pub struct DirtySaveTask {
    cache: Arc<dyn ManagedCache>,
}

impl DirtySaveTask {
    #[must_use]
    pub fn new(cache: Arc<dyn ManagedCache>) -> Self {
        Self { cache }
    }

    /// Runs one cycle.
    pub async fn run_once(&self) -> FlushReport {
        debug!(kind = %self.cache.kind(), "dirty save");
        let report = self.cache.save_dirty().await;
        if report.written > 0 || report.failed > 0 {
            debug!(
                kind = %report.kind,
                written = report.written,
                failed = report.failed,
                "dirty save finished"
            );
        }
        report
    }
}

#[async_trait]
impl PeriodicTask for DirtySaveTask {
    fn name(&self) -> String {
        format!("{}-dirty-save", self.cache.kind())
    }

    async fn run(&mut self) -> TaskControl {
        self.run_once().await;
        TaskControl::Continue
    }
}
