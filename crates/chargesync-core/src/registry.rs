// ── Device registry ──
//
// Owns the set of registered devices and their local poller tasks.
// Every membership change goes through here so the store, the
// optimistic cache, the poller tasks and the rate budget stay in step.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chargesync_api::Pairing;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backoff::BackoffSnapshot;
use crate::budget::RateBudget;
use crate::config::LocalConfig;
use crate::model::{Device, DeviceId};
use crate::overrides::OptimisticCache;
use crate::poller::local::{LocalPoller, LocalRequest};
use crate::store::DataStore;
use crate::transport::LocalApi;

struct LocalHandle {
    tx: mpsc::UnboundedSender<LocalRequest>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    health: watch::Receiver<BackoffSnapshot>,
}

pub(crate) struct Registry {
    store: Arc<DataStore>,
    overrides: Arc<OptimisticCache>,
    budget: Arc<RateBudget>,
    local_api: Arc<dyn LocalApi>,
    local_config: LocalConfig,
    cancel: CancellationToken,
    pollers: Mutex<HashMap<DeviceId, LocalHandle>>,
}

impl Registry {
    pub(crate) fn new(
        store: Arc<DataStore>,
        overrides: Arc<OptimisticCache>,
        budget: Arc<RateBudget>,
        local_api: Arc<dyn LocalApi>,
        local_config: LocalConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            overrides,
            budget,
            local_api,
            local_config,
            cancel,
            pollers: Mutex::new(HashMap::new()),
        }
    }

    /// Register `device` and start its local poller. An already-known
    /// device only has its metadata refreshed. Returns `true` if new.
    pub(crate) async fn add(&self, device: Device, address: Option<String>) -> bool {
        let id = device.id.clone();
        let is_new = self.store.upsert_device(device);
        let addr_changed = address.is_some_and(|addr| self.store.set_address(&id, addr));

        let mut pollers = self.pollers.lock().await;
        if let Some(handle) = pollers.get(&id) {
            if addr_changed {
                let _ = handle.tx.send(LocalRequest::AddressChanged);
            }
            return is_new;
        }

        let cancel = self.cancel.child_token();
        let (poller, health) = LocalPoller::new(
            id.clone(),
            Arc::clone(&self.local_api),
            Arc::clone(&self.store),
            self.local_config.clone(),
            cancel.clone(),
        );
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(poller.run(rx));
        pollers.insert(
            id.clone(),
            LocalHandle {
                tx,
                cancel,
                task,
                health,
            },
        );
        let count = pollers.len();
        drop(pollers);

        self.budget.set_device_count(count);
        info!(device = %id, devices = count, "device registered");
        is_new
    }

    /// Deregister a device. Its poller is cancelled but not awaited; a
    /// response already in flight is discarded by the store.
    pub(crate) async fn remove(&self, id: &DeviceId) -> bool {
        let mut pollers = self.pollers.lock().await;
        let handle = pollers.remove(id);
        let count = pollers.len();
        drop(pollers);

        if let Some(handle) = &handle {
            handle.cancel.cancel();
        }
        let removed = self.store.remove_device(id).is_some();
        let purged = self.overrides.purge_device(id);

        if handle.is_some() || removed {
            self.budget.set_device_count(count);
            info!(device = %id, devices = count, purged_overrides = purged, "device removed");
            true
        } else {
            false
        }
    }

    /// Bring the registry in line with the account's pairings.
    /// Returns `(added, removed)`.
    pub(crate) async fn reconcile(&self, pairings: &[Pairing]) -> (usize, usize) {
        let incoming: Vec<Device> = pairings
            .iter()
            .filter(|p| !p.device_id.trim().is_empty())
            .map(Device::from)
            .collect();
        let keep: HashSet<DeviceId> = incoming.iter().map(|d| d.id.clone()).collect();

        let mut added = 0;
        for device in incoming {
            if self.add(device, None).await {
                added += 1;
            }
        }

        let mut removed = 0;
        for id in self.store.device_ids() {
            if !keep.contains(&id) && self.remove(&id).await {
                removed += 1;
            }
        }

        if added > 0 || removed > 0 {
            info!(added, removed, "device list reconciled with pairings");
        } else {
            debug!(devices = keep.len(), "pairings unchanged");
        }
        (added, removed)
    }

    /// Change the LAN address of a device and have its poller reconnect.
    pub(crate) async fn set_address(&self, id: &DeviceId, addr: String) -> bool {
        if !self.store.set_address(id, addr) {
            return false;
        }
        self.request(id, LocalRequest::AddressChanged).await;
        true
    }

    /// Forward a request to a device's local poller.
    pub(crate) async fn request(&self, id: &DeviceId, req: LocalRequest) -> bool {
        let pollers = self.pollers.lock().await;
        pollers.get(id).is_some_and(|h| h.tx.send(req).is_ok())
    }

    pub(crate) async fn local_health(&self, id: &DeviceId) -> Option<BackoffSnapshot> {
        let pollers = self.pollers.lock().await;
        pollers.get(id).map(|h| h.health.borrow().clone())
    }

    /// Cancel every local poller and wait for the tasks to finish.
    pub(crate) async fn shutdown(&self) {
        let handles: Vec<LocalHandle> = self.pollers.lock().await.drain().map(|(_, h)| h).collect();
        for handle in &handles {
            handle.cancel.cancel();
        }
        for handle in handles {
            let _ = handle.task.await;
        }
    }
}
