// ── Secondary resource cache ──
//
// Slow-changing cloud resources refreshed on their own long cadences.
// next-due is always last-fetched + period; a resource that was never
// fetched is due immediately.

use std::time::Duration;

use chargesync_api::{Pairing, RfidCard};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::SecondaryPeriods;
use crate::model::DeviceId;

/// Kind of slow-changing resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResourceKind {
    RfidCards,
    FirmwareVersion,
    /// Account-wide; stored without a device key.
    Pairings,
}

impl ResourceKind {
    pub fn period(self, periods: &SecondaryPeriods) -> Duration {
        match self {
            Self::RfidCards => periods.rfid_cards,
            Self::FirmwareVersion => periods.firmware_version,
            Self::Pairings => periods.pairings,
        }
    }
}

/// A fetched resource value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SecondaryValue {
    RfidCards(Vec<RfidCard>),
    FirmwareVersion(String),
    Pairings(Vec<Pairing>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: SecondaryValue,
    last_fetched: Instant,
    fetched_at: DateTime<Utc>,
}

/// Diagnostic view of one cached resource.
#[derive(Debug, Clone, Serialize)]
pub struct SecondaryStatus {
    pub kind: ResourceKind,
    pub fetched_at: DateTime<Utc>,
    pub due_in_secs: u64,
}

type Key = (Option<DeviceId>, ResourceKind);

pub struct SecondaryCache {
    periods: SecondaryPeriods,
    entries: DashMap<Key, Entry>,
}

impl SecondaryCache {
    pub fn new(periods: SecondaryPeriods) -> Self {
        Self {
            periods,
            entries: DashMap::new(),
        }
    }

    /// When `kind` is next due; `None` if it was never fetched.
    pub fn next_due(&self, device: Option<&DeviceId>, kind: ResourceKind) -> Option<Instant> {
        self.entries
            .get(&(device.cloned(), kind))
            .map(|e| e.last_fetched + kind.period(&self.periods))
    }

    pub fn is_due(&self, device: Option<&DeviceId>, kind: ResourceKind) -> bool {
        self.next_due(device, kind)
            .is_none_or(|due| Instant::now() >= due)
    }

    pub fn record(&self, device: Option<&DeviceId>, kind: ResourceKind, value: SecondaryValue) {
        self.entries.insert(
            (device.cloned(), kind),
            Entry {
                value,
                last_fetched: Instant::now(),
                fetched_at: Utc::now(),
            },
        );
    }

    pub fn get(&self, device: Option<&DeviceId>, kind: ResourceKind) -> Option<SecondaryValue> {
        self.entries
            .get(&(device.cloned(), kind))
            .map(|e| e.value.clone())
    }

    pub fn firmware_version(&self, device: &DeviceId) -> Option<String> {
        match self.get(Some(device), ResourceKind::FirmwareVersion)? {
            SecondaryValue::FirmwareVersion(v) => Some(v),
            _ => None,
        }
    }

    pub fn status_for(&self, device: Option<&DeviceId>) -> Vec<SecondaryStatus> {
        let now = Instant::now();
        let mut out: Vec<SecondaryStatus> = self
            .entries
            .iter()
            .filter(|e| e.key().0.as_ref() == device)
            .map(|e| {
                let kind = e.key().1;
                let due = e.last_fetched + kind.period(&self.periods);
                SecondaryStatus {
                    kind,
                    fetched_at: e.fetched_at,
                    due_in_secs: due.saturating_duration_since(now).as_secs(),
                }
            })
            .collect();
        out.sort_by_key(|s| s.kind.to_string());
        out
    }

    pub fn purge_device(&self, device: &DeviceId) {
        self.entries
            .retain(|(id, _), _| id.as_ref() != Some(device));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn never_fetched_is_due_immediately() {
        let cache = SecondaryCache::new(SecondaryPeriods::default());
        let dev = DeviceId::from("ABC123");
        assert!(cache.is_due(Some(&dev), ResourceKind::RfidCards));
        assert!(cache.next_due(Some(&dev), ResourceKind::RfidCards).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn next_due_is_last_fetched_plus_period() {
        let cache = SecondaryCache::new(SecondaryPeriods::default());
        let dev = DeviceId::from("ABC123");
        let start = Instant::now();
        cache.record(
            Some(&dev),
            ResourceKind::FirmwareVersion,
            SecondaryValue::FirmwareVersion("2.1.7".into()),
        );

        assert_eq!(
            cache.next_due(Some(&dev), ResourceKind::FirmwareVersion),
            Some(start + Duration::from_secs(12 * 3600))
        );
        assert!(!cache.is_due(Some(&dev), ResourceKind::FirmwareVersion));

        tokio::time::advance(Duration::from_secs(12 * 3600)).await;
        assert!(cache.is_due(Some(&dev), ResourceKind::FirmwareVersion));
        assert_eq!(cache.firmware_version(&dev).as_deref(), Some("2.1.7"));
    }

    #[tokio::test(start_paused = true)]
    async fn account_resources_survive_device_purge() {
        let cache = SecondaryCache::new(SecondaryPeriods::default());
        let dev = DeviceId::from("ABC123");
        cache.record(None, ResourceKind::Pairings, SecondaryValue::Pairings(Vec::new()));
        cache.record(Some(&dev), ResourceKind::RfidCards, SecondaryValue::RfidCards(Vec::new()));

        cache.purge_device(&dev);
        assert!(cache.get(Some(&dev), ResourceKind::RfidCards).is_none());
        assert!(cache.get(None, ResourceKind::Pairings).is_some());
    }
}
