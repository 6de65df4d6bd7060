//! Periodic background tasks.
//!
//! A [`PeriodicTask`] is one unit of recurring work (a dirty-save cycle for
//! one kind, a preload page for one kind). A [`TaskRunner`] owns the timing:
//! it fires each task after an initial delay and then once per period until
//! the task asks to stop or is cancelled.

pub mod runner;
pub mod stagger;

use std::time::Duration;

use async_trait::async_trait;

pub use runner::TokioTaskRunner;
pub use stagger::{stagger_offsets, PlannedTask, TaskPlan, TaskRole, DIRTY_SAVE_ORDER, PRELOAD_ORDER};

/// What a task wants after finishing a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskControl {
    /// Run again next period.
    Continue,
    /// Deregister; the task will not run again.
    Stop,
}

/// Recurring unit of work driven by a [`TaskRunner`].
///
/// Runs of one task never overlap: the next tick is not processed until
/// `run` returns.
#[async_trait]
pub trait PeriodicTask: Send + 'static {
    /// Identifier used in logs.
    fn name(&self) -> String;

    async fn run(&mut self) -> TaskControl;
}

/// Identifies a scheduled task for cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskHandle {
    pub id: u64,
    pub name: String,
}

/// Schedules [`PeriodicTask`]s at a fixed rate.
///
/// Used as `Arc<dyn TaskRunner>`.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    /// Starts `task`: first run after `initial_delay`, then every `period`.
    fn schedule(
        &self,
        task: Box<dyn PeriodicTask>,
        initial_delay: Duration,
        period: Duration,
    ) -> TaskHandle;

    /// Cancels a scheduled task and waits for a run already in progress to
    /// finish. Returns `false` if the task had already stopped.
    async fn cancel(&self, handle: &TaskHandle) -> bool;
}
