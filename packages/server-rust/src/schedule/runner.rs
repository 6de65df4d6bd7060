//! Tokio-backed [`TaskRunner`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{PeriodicTask, TaskControl, TaskHandle, TaskRunner};

struct RunningTask {
    token: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl RunningTask {
    async fn stop(self, name: &str) {
        self.token.cancel();
        if let Some(join) = self.join {
            if let Err(error) = join.await {
                warn!(task = %name, error = %error, "task ended abnormally");
            }
        }
    }
}

/// Runs every scheduled task on its own tokio task.
///
/// Must be used from within a tokio runtime. Dropping the runner does not
/// stop its tasks; call [`shutdown`](Self::shutdown).
#[derive(Default)]
pub struct TokioTaskRunner {
    next_id: AtomicU64,
    tasks: Arc<DashMap<u64, RunningTask>>,
    root: CancellationToken,
}

impl TokioTaskRunner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks that have not yet stopped or been cancelled.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.tasks.len()
    }

    /// Cancels every task, including ones scheduled afterwards, and waits
    /// for runs in progress to finish.
    pub async fn shutdown(&self) {
        self.root.cancel();
        let ids: Vec<u64> = self.tasks.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, task)) = self.tasks.remove(&id) {
                task.stop("shutdown").await;
            }
        }
    }
}

/// Upper bound for delays and periods; larger values would overflow `Instant`.
const MAX_WAIT: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

fn deadline_after(delay: Duration) -> Instant {
    Instant::now() + delay.min(MAX_WAIT)
}

#[async_trait]
impl TaskRunner for TokioTaskRunner {
    fn schedule(
        &self,
        mut task: Box<dyn PeriodicTask>,
        initial_delay: Duration,
        period: Duration,
    ) -> TaskHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name = task.name();
        let token = self.root.child_token();
        self.tasks.insert(
            id,
            RunningTask {
                token: token.clone(),
                join: None,
            },
        );

        let tasks = Arc::clone(&self.tasks);
        let task_name = name.clone();
        let period = period.clamp(Duration::from_millis(1), MAX_WAIT);
        let join = tokio::spawn(async move {
            let mut ticks = interval_at(deadline_after(initial_delay), period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => {
                        debug!(task = %task_name, "task cancelled");
                        break;
                    }
                    _ = ticks.tick() => {
                        if task.run().await == TaskControl::Stop {
                            info!(task = %task_name, "task finished");
                            break;
                        }
                    }
                }
            }
            tasks.remove(&id);
        });

        if let Some(mut running) = self.tasks.get_mut(&id) {
            running.join = Some(join);
        }
        TaskHandle { id, name }
    }

    async fn cancel(&self, handle: &TaskHandle) -> bool {
        let Some((_, task)) = self.tasks.remove(&handle.id) else {
            return false;
        };
        task.stop(&handle.name).await;
        true
    }
}
