//! Phase offsets and the declarative task plan.
//!
//! Every kind shares one backing store, so same-period tasks are spread
//! evenly across the period instead of all firing at once.

use std::time::Duration;

use banstick_core::EntityKind;

use crate::service::config::CacheConfig;

/// Flush order for dirty-save tasks and for the shutdown flush.
pub const DIRTY_SAVE_ORDER: [EntityKind; 6] = [
    EntityKind::Player,
    EntityKind::Ban,
    EntityKind::Session,
    EntityKind::Share,
    EntityKind::IpData,
    EntityKind::Ip,
];

/// Activation order for preload tasks.
pub const PRELOAD_ORDER: [EntityKind; 6] = [
    EntityKind::Ip,
    EntityKind::IpData,
    EntityKind::Ban,
    EntityKind::Player,
    EntityKind::Session,
    EntityKind::Share,
];

/// Initial delays for `n` same-period tasks: `base + period * i / n`.
/// Saturates instead of overflowing for very large durations.
#[must_use]
pub fn stagger_offsets(base: Duration, period: Duration, n: usize) -> Vec<Duration> {
    let Ok(count) = u32::try_from(n) else {
        return vec![base; n];
    };
    (0..count)
        .map(|i| {
            let step = period
                .checked_mul(i)
                .map_or_else(|| (period / count).saturating_mul(i), |scaled| scaled / count);
            base.saturating_add(step)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRole {
    DirtySave,
    Preload,
}

/// One row of the task plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTask {
    pub kind: EntityKind,
    pub role: TaskRole,
    pub initial_delay: Duration,
    pub period: Duration,
    /// Page size; only meaningful for preload rows.
    pub batch_size: usize,
}

/// Every background task the service activates, with its timing.
#[derive(Debug, Clone, Default)]
pub struct TaskPlan {
    pub tasks: Vec<PlannedTask>,
}

impl TaskPlan {
    /// Builds the plan: staggered preload rows first (when enabled), then
    /// staggered dirty-save rows.
    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        let mut tasks = Vec::new();

        if config.preload.enabled {
            let preload = &config.preload;
            let offsets = stagger_offsets(preload.delay, preload.period, PRELOAD_ORDER.len());
            tasks.extend(PRELOAD_ORDER.iter().zip(offsets).map(|(&kind, initial_delay)| {
                PlannedTask {
                    kind,
                    role: TaskRole::Preload,
                    initial_delay,
                    period: preload.period,
                    batch_size: preload.batch_size,
                }
            }));
        }

        let save = &config.dirty_save;
        let offsets = stagger_offsets(save.delay, save.period, DIRTY_SAVE_ORDER.len());
        tasks.extend(DIRTY_SAVE_ORDER.iter().zip(offsets).map(|(&kind, initial_delay)| {
            PlannedTask {
                kind,
                role: TaskRole::DirtySave,
                initial_delay,
                period: save.period,
                batch_size: 0,
            }
        }));

        Self { tasks }
    }

    pub fn role(&self, role: TaskRole) -> impl Iterator<Item = &PlannedTask> {
        self.tasks.iter().filter(move |task| task.role == role)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn six_kinds_over_five_minutes() {
        let offsets = stagger_offsets(Duration::from_secs(300), Duration::from_secs(300), 6);
        let secs: Vec<u64> = offsets.iter().map(Duration::as_secs).collect();
        assert_eq!(secs, vec![300, 350, 400, 450, 500, 550]);
    }

    #[test]
    fn huge_durations_saturate() {
        let offsets = stagger_offsets(Duration::MAX, Duration::MAX, 6);
        assert!(offsets.iter().all(|&d| d == Duration::MAX));

        let offsets = stagger_offsets(Duration::ZERO, Duration::MAX, 4);
        assert_eq!(offsets[0], Duration::ZERO);
        assert!(offsets.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn no_tasks_no_offsets() {
        assert!(stagger_offsets(Duration::ZERO, Duration::from_secs(1), 0).is_empty());
    }

    #[test]
    fn orders_cover_every_kind_once() {
        for order in [DIRTY_SAVE_ORDER, PRELOAD_ORDER] {
            for kind in EntityKind::ALL {
                assert_eq!(order.iter().filter(|&&k| k == kind).count(), 1);
            }
        }
    }

    #[test]
    fn preload_rows_only_when_enabled() {
        let mut config = CacheConfig::default();
        let plan = TaskPlan::from_config(&config);
        assert_eq!(plan.role(TaskRole::Preload).count(), 0);
        assert_eq!(plan.role(TaskRole::DirtySave).count(), 6);

        config.preload.enabled = true;
        config.preload.batch_size = 25;
        let plan = TaskPlan::from_config(&config);
        let preload: Vec<_> = plan.role(TaskRole::Preload).collect();
        assert_eq!(preload.len(), 6);
        assert_eq!(preload[0].kind, EntityKind::Ip);
        assert!(preload.iter().all(|t| t.batch_size == 25));
        assert_eq!(
            plan.role(TaskRole::DirtySave).next().map(|t| t.kind),
            Some(EntityKind::Player)
        );
    }

    proptest! {
        #[test]
        fn offsets_are_evenly_spaced_within_one_period(
            base_ms in 0u64..1_000_000,
            period_ms in 1u64..10_000_000,
            n in 1usize..32,
        ) {
            let base = Duration::from_millis(base_ms);
            let period = Duration::from_millis(period_ms);
            let offsets = stagger_offsets(base, period, n);

            prop_assert_eq!(offsets.len(), n);
            prop_assert_eq!(offsets[0], base);
            prop_assert!(offsets.windows(2).all(|w| w[0] <= w[1]));
            prop_assert!(*offsets.last().unwrap() < base + period);
        }
    }
}
