// ── Per-device state store ──
//
// Holds the registered devices, each device's cloud and local views,
// the secondary resource cache and address overrides. Cloud views are
// written only by the cloud poller, local views only by that device's
// local poller; everything else reads.

mod collection;
mod view;

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{Map, Value};
use tokio::sync::watch;

use self::collection::DeviceCollection;
use crate::config::SecondaryPeriods;
use crate::model::{Device, DeviceId};
use crate::secondary::SecondaryCache;

pub use view::SourceView;

pub struct DataStore {
    devices: DeviceCollection,
    cloud: DashMap<DeviceId, SourceView>,
    local: DashMap<DeviceId, SourceView>,
    /// Addresses set explicitly (static config or the address resolver).
    addresses: DashMap<DeviceId, String>,
    secondary: SecondaryCache,
    version: watch::Sender<u64>,
}

impl DataStore {
    pub fn new(periods: SecondaryPeriods) -> Self {
        let (version, _) = watch::channel(0u64);
        Self {
            devices: DeviceCollection::new(),
            cloud: DashMap::new(),
            local: DashMap::new(),
            addresses: DashMap::new(),
            secondary: SecondaryCache::new(periods),
            version,
        }
    }

    // ── Devices ──────────────────────────────────────────────────────

    /// Insert or update a device. Returns `true` if it was new.
    pub(crate) fn upsert_device(&self, device: Device) -> bool {
        let is_new = self.devices.upsert(device);
        self.bump_version();
        is_new
    }

    /// Remove a device and everything stored about it.
    pub(crate) fn remove_device(&self, id: &DeviceId) -> Option<Arc<Device>> {
        let removed = self.devices.remove(id)?;
        self.cloud.remove(id);
        self.local.remove(id);
        self.addresses.remove(id);
        self.secondary.purge_device(id);
        self.bump_version();
        Some(removed)
    }

    pub fn device(&self, id: &DeviceId) -> Option<Arc<Device>> {
        self.devices.get(id)
    }

    pub fn contains(&self, id: &DeviceId) -> bool {
        self.devices.contains(id)
    }

    pub fn devices(&self) -> Arc<Vec<Arc<Device>>> {
        self.devices.snapshot()
    }

    pub fn subscribe_devices(&self) -> watch::Receiver<Arc<Vec<Arc<Device>>>> {
        self.devices.subscribe()
    }

    pub fn device_ids(&self) -> Vec<DeviceId> {
        self.devices.ids()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    // ── Cloud view (cloud poller only) ───────────────────────────────

    /// Replace the cloud view of `id`. Results for devices removed while
    /// the request was in flight are discarded; returns whether applied.
    pub(crate) fn apply_cloud(&self, id: &DeviceId, raw: &Map<String, Value>) -> bool {
        self.apply(&self.cloud, id, SourceView::from_cloud(raw))
    }

    pub(crate) fn mark_cloud_stale(&self, id: &DeviceId) {
        if !self.devices.contains(id) {
            return;
        }
        Self::mark_stale(&self.cloud, id);
        self.bump_version();
    }

    pub fn cloud_view(&self, id: &DeviceId) -> Option<SourceView> {
        self.cloud.get(id).map(|v| v.clone())
    }

    // ── Local view (local poller only) ───────────────────────────────

    pub(crate) fn apply_local(&self, id: &DeviceId, raw: &Map<String, Value>) -> bool {
        self.apply(&self.local, id, SourceView::from_local(raw))
    }

    /// Flag the local view stale, creating an empty one if the device
    /// has never answered locally.
    pub(crate) fn mark_local_stale(&self, id: &DeviceId) {
        if !self.devices.contains(id) {
            return;
        }
        Self::mark_stale(&self.local, id);
        self.bump_version();
    }

    pub fn local_view(&self, id: &DeviceId) -> Option<SourceView> {
        self.local.get(id).map(|v| v.clone())
    }

    // ── Addresses ────────────────────────────────────────────────────

    pub(crate) fn set_address(&self, id: &DeviceId, addr: String) -> bool {
        let changed = self.addresses.get(id).is_none_or(|a| *a != addr);
        if changed {
            self.addresses.insert(id.clone(), addr);
            self.bump_version();
        }
        changed
    }

    /// Effective LAN address: explicit address, then what the charger
    /// itself reported, then the cloud status, then the pairing.
    pub fn resolve_address(&self, id: &DeviceId) -> Option<String> {
        if let Some(addr) = self.addresses.get(id) {
            return Some(addr.clone());
        }
        if let Some(addr) = self.local.get(id).and_then(|v| v.reported_addr.clone()) {
            return Some(addr);
        }
        if let Some(addr) = self.cloud.get(id).and_then(|v| v.reported_addr.clone()) {
            return Some(addr);
        }
        self.devices.get(id).and_then(|d| d.pairing_addr.clone())
    }

    // ── Secondary resources ──────────────────────────────────────────

    pub fn secondary(&self) -> &SecondaryCache {
        &self.secondary
    }

    // ── Change notification ──────────────────────────────────────────

    /// Monotonic counter bumped on every view or device change.
    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn apply(&self, map: &DashMap<DeviceId, SourceView>, id: &DeviceId, view: SourceView) -> bool {
        if !self.devices.contains(id) {
            return false;
        }
        map.insert(id.clone(), view);
        // A removal that raced the insert must still win.
        if !self.devices.contains(id) {
            map.remove(id);
            return false;
        }
        self.bump_version();
        true
    }

    fn mark_stale(map: &DashMap<DeviceId, SourceView>, id: &DeviceId) {
        map.entry(id.clone())
            .and_modify(|v| v.stale = true)
            .or_insert_with(|| SourceView {
                stale: true,
                ..SourceView::default()
            });
    }

    fn bump_version(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => Map::new(),
        }
    }

    fn store_with(id: &str) -> (DataStore, DeviceId) {
        let store = DataStore::new(SecondaryPeriods::default());
        let mut device = Device::new(id);
        device.pairing_addr = Some("10.0.0.9".into());
        store.upsert_device(device);
        (store, DeviceId::from(id))
    }

    #[test]
    fn views_for_unknown_devices_are_discarded() {
        let store = DataStore::new(SecondaryPeriods::default());
        let ghost = DeviceId::from("GHOST");
        assert!(!store.apply_cloud(&ghost, &object(json!({ "intensity": 16 }))));
        assert!(store.cloud_view(&ghost).is_none());
    }

    #[test]
    fn stale_flag_keeps_values() {
        let (store, id) = store_with("A");
        store.apply_local(&id, &object(json!({ "Intensity": 16 })));
        store.mark_local_stale(&id);

        let view = store.local_view(&id).unwrap();
        assert!(view.stale);
        assert_eq!(view.get(crate::model::Field::Intensity), Some(&json!(16)));

        store.apply_local(&id, &object(json!({ "Intensity": 12 })));
        assert!(!store.local_view(&id).unwrap().stale);
    }

    #[test]
    fn address_resolution_order() {
        let (store, id) = store_with("A");
        assert_eq!(store.resolve_address(&id).as_deref(), Some("10.0.0.9"));

        store.apply_cloud(&id, &object(json!({ "ip": "10.0.0.8" })));
        assert_eq!(store.resolve_address(&id).as_deref(), Some("10.0.0.8"));

        store.apply_local(&id, &object(json!({ "IP": "10.0.0.7" })));
        assert_eq!(store.resolve_address(&id).as_deref(), Some("10.0.0.7"));

        assert!(store.set_address(&id, "10.0.0.6".into()));
        assert!(!store.set_address(&id, "10.0.0.6".into()));
        assert_eq!(store.resolve_address(&id).as_deref(), Some("10.0.0.6"));
    }

    #[test]
    fn remove_purges_everything() {
        let (store, id) = store_with("A");
        store.apply_cloud(&id, &object(json!({ "intensity": 16 })));
        store.apply_local(&id, &object(json!({ "Intensity": 16 })));
        store.set_address(&id, "10.0.0.6".into());
        let before = store.version();

        assert!(store.remove_device(&id).is_some());
        assert!(store.cloud_view(&id).is_none());
        assert!(store.local_view(&id).is_none());
        assert!(store.resolve_address(&id).is_none());
        assert!(store.device_ids().is_empty());
        assert!(store.version() > before);
    }
}
