// ── Reactive device collection ──
//
// Concurrent storage with O(1) lookups and push-based change
// notification via `watch` channels.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

use crate::model::{Device, DeviceId};

/// Registered devices, keyed by id.
///
/// Every mutation rebuilds the sorted snapshot that subscribers receive.
pub(crate) struct DeviceCollection {
    by_id: DashMap<DeviceId, Arc<Device>>,
    snapshot: watch::Sender<Arc<Vec<Arc<Device>>>>,
}

impl DeviceCollection {
    pub(crate) fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            by_id: DashMap::new(),
            snapshot,
        }
    }

    /// Insert or update a device. Returns `true` if the id was new.
    pub(crate) fn upsert(&self, device: Device) -> bool {
        let is_new = self
            .by_id
            .insert(device.id.clone(), Arc::new(device))
            .is_none();
        self.rebuild_snapshot();
        is_new
    }

    /// Remove a device. Returns it if it existed.
    pub(crate) fn remove(&self, id: &DeviceId) -> Option<Arc<Device>> {
        let removed = self.by_id.remove(id).map(|(_, v)| v);
        if removed.is_some() {
            self.rebuild_snapshot();
        }
        removed
    }

    pub(crate) fn get(&self, id: &DeviceId) -> Option<Arc<Device>> {
        self.by_id.get(id).map(|r| Arc::clone(r.value()))
    }

    pub(crate) fn contains(&self, id: &DeviceId) -> bool {
        self.by_id.contains_key(id)
    }

    /// Current snapshot, sorted by id (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<Device>>> {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<Device>>>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn ids(&self) -> Vec<DeviceId> {
        self.snapshot().iter().map(|d| d.id.clone()).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_id.len()
    }

    fn rebuild_snapshot(&self) {
        let mut values: Vec<Arc<Device>> =
            self.by_id.iter().map(|r| Arc::clone(r.value())).collect();
        values.sort_by(|a, b| a.id.cmp(&b.id));
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn upsert_reports_new_ids_only() {
        let col = DeviceCollection::new();
        assert!(col.upsert(Device::new("A")));
        assert!(!col.upsert(Device::new("A").with_label("Garage")));
        assert_eq!(col.get(&DeviceId::from("A")).unwrap().label, "Garage");
    }

    #[test]
    fn snapshot_is_sorted_and_tracks_removal() {
        let col = DeviceCollection::new();
        col.upsert(Device::new("B"));
        col.upsert(Device::new("A"));
        assert_eq!(col.ids(), vec![DeviceId::from("A"), DeviceId::from("B")]);

        assert!(col.remove(&DeviceId::from("A")).is_some());
        assert!(col.remove(&DeviceId::from("A")).is_none());
        assert_eq!(col.len(), 1);
        assert_eq!(col.snapshot().len(), 1);
    }
}
