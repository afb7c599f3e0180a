// ── Rate budget allocator ──
//
// Turns the device count into a cloud polling interval that keeps
// status polling inside the daily budget. The current value is
// published on a watch channel; the cloud poller reads it only when it
// schedules its next tick, so a recompute never interrupts a poll.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::info;

use crate::config::{BudgetConfig, PLATFORM_DAILY_QUOTA, SecondaryPeriods};

const SECONDS_PER_DAY: u64 = 86_400;

/// `max(min_interval, ceil(device_count * 86400 / daily_budget))`.
pub fn allocate_interval(device_count: usize, daily_budget: u32, min_interval: Duration) -> Duration {
    let budget = u64::from(daily_budget.max(1));
    let devices = u64::try_from(device_count).unwrap_or(u64::MAX);
    let raw = devices.saturating_mul(SECONDS_PER_DAY).div_ceil(budget);
    Duration::from_secs(raw).max(min_interval)
}

/// Interval state published to the cloud poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Allocation {
    pub device_count: usize,
    /// Straight from the formula (floored at the minimum interval).
    pub raw: Duration,
    /// What the poller actually uses: `raw` lifted to the policy baseline.
    pub scheduled: Duration,
}

/// Owns the device count and the derived interval.
pub struct RateBudget {
    config: BudgetConfig,
    tx: watch::Sender<Allocation>,
}

impl RateBudget {
    pub fn new(config: BudgetConfig) -> Self {
        let initial = compute(&config, 0);
        let (tx, _) = watch::channel(initial);
        Self { config, tx }
    }

    /// Recompute for a new device count. No-op when unchanged.
    pub fn set_device_count(&self, device_count: usize) {
        let next = compute(&self.config, device_count);
        let changed = self.tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            info!(
                devices = device_count,
                interval_secs = next.scheduled.as_secs(),
                "cloud polling interval recomputed"
            );
        }
    }

    pub fn current(&self) -> Allocation {
        *self.tx.borrow()
    }

    /// Interval the cloud poller should wait between regular cycles.
    pub fn interval(&self) -> Duration {
        self.current().scheduled
    }

    pub fn subscribe(&self) -> watch::Receiver<Allocation> {
        self.tx.subscribe()
    }

    /// Estimated cloud calls per day: status polls plus secondary refreshes.
    pub fn estimated_daily_calls(&self, periods: &SecondaryPeriods, discovery: bool) -> u64 {
        let alloc = self.current();
        let devices = u64::try_from(alloc.device_count).unwrap_or(u64::MAX);
        let per_day = |period: Duration| SECONDS_PER_DAY.div_ceil(period.as_secs().max(1));

        let status = devices.saturating_mul(per_day(alloc.scheduled));
        let secondary =
            devices.saturating_mul(per_day(periods.rfid_cards) + per_day(periods.firmware_version));
        let pairings = if discovery { per_day(periods.pairings) } else { 0 };
        status + secondary + pairings
    }

    /// Calls per day held back from status polling.
    pub fn reserved_headroom(&self) -> u32 {
        PLATFORM_DAILY_QUOTA.saturating_sub(self.config.daily_budget)
    }
}

fn compute(config: &BudgetConfig, device_count: usize) -> Allocation {
    let raw = allocate_interval(device_count, config.daily_budget, config.min_interval);
    let scheduled = config.policy_interval.map_or(raw, |baseline| raw.max(baseline));
    Allocation {
        device_count,
        raw,
        scheduled,
    }
}
