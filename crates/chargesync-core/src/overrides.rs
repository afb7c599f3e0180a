// ── Optimistic state cache ──
//
// Short-lived (device, field) -> value entries written after a
// successful command. Expiry is checked on every read, so an entry is
// never visible past its window even if the sweep task never runs.

use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::time::Instant;

use crate::model::{DeviceId, Field};

#[derive(Debug, Clone)]
struct Override {
    value: Value,
    expires_at: Instant,
}

/// An unexpired override, as reported to diagnostics and state views.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveOverride {
    pub field: Field,
    pub value: Value,
    pub remaining: Duration,
}

/// Expiring key-value store of unconfirmed writes.
pub struct OptimisticCache {
    window: Duration,
    entries: DashMap<(DeviceId, Field), Override>,
}

impl OptimisticCache {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: DashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Store `value` for one window, replacing any earlier override.
    pub fn set(&self, device: &DeviceId, field: Field, value: Value) {
        let expires_at = Instant::now() + self.window;
        self.entries
            .insert((device.clone(), field), Override { value, expires_at });
    }

    /// The override for `(device, field)` if it has not expired.
    /// An expired entry found here is dropped.
    pub fn get(&self, device: &DeviceId, field: Field) -> Option<Value> {
        let key = (device.clone(), field);
        let now = Instant::now();
        let hit = self
            .entries
            .get(&key)
            .map(|entry| (entry.expires_at > now).then(|| entry.value.clone()))?;

        if hit.is_none() {
            self.entries.remove_if(&key, |_, o| o.expires_at <= now);
        }
        hit
    }

    /// Unexpired overrides for one device.
    pub fn active_for(&self, device: &DeviceId) -> Vec<ActiveOverride> {
        let now = Instant::now();
        let mut active: Vec<ActiveOverride> = self
            .entries
            .iter()
            .filter(|e| &e.key().0 == device && e.expires_at > now)
            .map(|e| ActiveOverride {
                field: e.key().1,
                value: e.value.clone(),
                remaining: e.expires_at - now,
            })
            .collect();
        active.sort_by_key(|a| a.field);
        active
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, o| o.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    /// Drop every override of a removed device.
    pub fn purge_device(&self, device: &DeviceId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(id, _), _| id != device);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dev() -> DeviceId {
        DeviceId::from("ABC123")
    }

    #[tokio::test(start_paused = true)]
    async fn visible_inside_window_absent_after() {
        let cache = OptimisticCache::new(Duration::from_secs(20));
        cache.set(&dev(), Field::Intensity, json!(16));

        tokio::time::advance(Duration::from_secs(19)).await;
        assert_eq!(cache.get(&dev(), Field::Intensity), Some(json!(16)));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get(&dev(), Field::Intensity), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn set_restarts_the_window() {
        let cache = OptimisticCache::new(Duration::from_secs(20));
        cache.set(&dev(), Field::Locked, json!(true));
        tokio::time::advance(Duration::from_secs(15)).await;
        cache.set(&dev(), Field::Locked, json!(false));
        tokio::time::advance(Duration::from_secs(15)).await;

        assert_eq!(cache.get(&dev(), Field::Locked), Some(json!(false)));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_and_purge() {
        let cache = OptimisticCache::new(Duration::from_secs(20));
        let other = DeviceId::from("DEF456");
        cache.set(&dev(), Field::Intensity, json!(16));
        cache.set(&other, Field::Intensity, json!(10));

        assert_eq!(cache.purge_device(&dev()), 1);
        assert_eq!(cache.get(&dev(), Field::Intensity), None);
        assert_eq!(cache.active_for(&other).len(), 1);

        tokio::time::advance(Duration::from_secs(21)).await;
        assert_eq!(cache.sweep(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn purge_tolerates_concurrent_inserts() {
        let cache = OptimisticCache::new(Duration::from_secs(20));
        let gone = DeviceId::from("GONE");
        std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 0..2_000 {
                    cache.set(&DeviceId::from(format!("D{i}")), Field::Intensity, json!(i));
                }
            });
            scope.spawn(|| {
                for _ in 0..2_000 {
                    assert_eq!(cache.purge_device(&gone), 0);
                    cache.sweep();
                }
            });
        });
        assert_eq!(cache.len(), 2_000);
    }
}
