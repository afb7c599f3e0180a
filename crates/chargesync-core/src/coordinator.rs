// ── Coordinator ──
//
// Owns the store, the pollers and the dispatcher, and is the only type
// consumers talk to. Writes go through a command channel to a single
// processor task; reads resolve straight from the store.

use std::sync::Arc;
use std::time::Duration;

use chargesync_api::{CloudClient, LocalClient, TransportConfig};
use secrecy::ExposeSecret;
use serde_json::Value;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::budget::RateBudget;
use crate::config::CoordinatorConfig;
use crate::diagnostics::{DeviceDiagnostics, Diagnostics, OverrideInfo, QuotaUsage};
use crate::dispatch::{CommandEnvelope, Dispatcher, WriteOutcome};
use crate::error::CoreError;
use crate::merge::{self, DeviceState, ResolvedValue};
use crate::model::{Device, DeviceId, Field};
use crate::overrides::OptimisticCache;
use crate::poller::CycleReport;
use crate::poller::cloud::{CloudPoller, CloudRequest, CloudStatus};
use crate::poller::local::LocalRequest;
use crate::registry::Registry;
use crate::store::DataStore;
use crate::transport::{CloudApi, LocalApi};

const COMMAND_CHANNEL_SIZE: usize = 64;

/// Entry point for consumers.
///
/// Cheaply cloneable via `Arc<CoordinatorInner>`. Call
/// [`start()`](Self::start) to run the first cloud cycle and spawn the
/// background tasks.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    config: CoordinatorConfig,
    store: Arc<DataStore>,
    overrides: Arc<OptimisticCache>,
    budget: Arc<RateBudget>,
    registry: Arc<Registry>,
    cloud: Arc<dyn CloudApi>,
    dispatcher: Dispatcher,
    cloud_tx: mpsc::UnboundedSender<CloudRequest>,
    cloud_rx: Mutex<Option<mpsc::UnboundedReceiver<CloudRequest>>>,
    cloud_status: Mutex<Option<CloudStatus>>,
    command_tx: mpsc::Sender<CommandEnvelope>,
    command_rx: Mutex<Option<mpsc::Receiver<CommandEnvelope>>>,
    running: watch::Sender<bool>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Coordinator {
    /// Build with the production HTTP clients.
    pub fn new(config: CoordinatorConfig) -> Result<Self, CoreError> {
        if config.api_key.expose_secret().trim().is_empty() {
            return Err(CoreError::Config {
                message: "API key is empty".into(),
            });
        }

        let base_url = config
            .base_url
            .as_ref()
            .map_or(chargesync_api::cloud::DEFAULT_BASE_URL, url::Url::as_str);
        let cloud = CloudClient::from_api_key(
            base_url,
            &config.api_key,
            &TransportConfig {
                timeout: config.cloud_timeout,
            },
        )?;
        let local = LocalClient::new(&TransportConfig {
            timeout: config.local.timeout,
        })?;

        Ok(Self::with_transports(config, Arc::new(cloud), Arc::new(local)))
    }

    /// Build over arbitrary transports.
    pub fn with_transports(
        config: CoordinatorConfig,
        cloud: Arc<dyn CloudApi>,
        local: Arc<dyn LocalApi>,
    ) -> Self {
        let store = Arc::new(DataStore::new(config.secondary.clone()));
        let overrides = Arc::new(OptimisticCache::new(config.writes.override_window));
        let budget = Arc::new(RateBudget::new(config.budget.clone()));
        let cancel = CancellationToken::new();
        let registry = Arc::new(Registry::new(
            Arc::clone(&store),
            Arc::clone(&overrides),
            Arc::clone(&budget),
            Arc::clone(&local),
            config.local.clone(),
            cancel.clone(),
        ));
        let (cloud_tx, cloud_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (running, _) = watch::channel(false);

        let dispatcher = Dispatcher {
            store: Arc::clone(&store),
            overrides: Arc::clone(&overrides),
            registry: Arc::clone(&registry),
            cloud: Arc::clone(&cloud),
            local,
            cloud_tx: cloud_tx.clone(),
            writes: config.writes.clone(),
            write_retry_delay: config.local.write_retry_delay,
        };

        Self {
            inner: Arc::new(CoordinatorInner {
                config,
                store,
                overrides,
                budget,
                registry,
                cloud,
                dispatcher,
                cloud_tx,
                cloud_rx: Mutex::new(Some(cloud_rx)),
                cloud_status: Mutex::new(None),
                command_tx,
                command_rx: Mutex::new(Some(command_rx)),
                running,
                cancel,
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<DataStore> {
        &self.inner.store
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Register the configured devices, run the first cloud cycle and
    /// spawn the background tasks.
    ///
    /// Fails only if the cloud rejects the API key; any other failure
    /// of the first cycle leaves stale views that later cycles repair.
    pub async fn start(&self) -> Result<(), CoreError> {
        if self.inner.cancel.is_cancelled() {
            return Err(CoreError::CoordinatorStopped);
        }
        let mut handles = self.inner.task_handles.lock().await;
        let Some(cloud_rx) = self.inner.cloud_rx.lock().await.take() else {
            debug!("coordinator already started");
            return Ok(());
        };

        let config = &self.inner.config;
        for entry in &config.devices {
            let mut device = Device::new(entry.id.clone());
            if let Some(label) = &entry.label {
                device = device.with_label(label.clone());
            }
            self.inner.registry.add(device, entry.address.clone()).await;
        }

        let (mut poller, status) = CloudPoller::new(
            Arc::clone(&self.inner.cloud),
            Arc::clone(&self.inner.store),
            Arc::clone(&self.inner.budget),
            Arc::clone(&self.inner.registry),
            config.cloud_backoff.clone(),
            config.discovery_enabled(),
            self.inner.cancel.clone(),
        );
        *self.inner.cloud_status.lock().await = Some(status);

        match poller.cycle().await {
            Ok(report) => info!(
                devices = self.inner.store.device_count(),
                updated = report.updated,
                "initial cloud refresh complete"
            ),
            Err(e) if e.is_auth() => {
                self.inner.cancel.cancel();
                self.inner.registry.shutdown().await;
                return Err(e);
            }
            Err(e) => warn!(error = %e, "initial cloud refresh failed, continuing"),
        }

        handles.push(tokio::spawn(poller.run(cloud_rx)));

        if let Some(rx) = self.inner.command_rx.lock().await.take() {
            handles.push(tokio::spawn(command_processor_task(self.clone(), rx)));
        }

        handles.push(tokio::spawn(sweep_task(
            Arc::clone(&self.inner.overrides),
            self.inner.cancel.clone(),
        )));

        self.inner.running.send_replace(true);
        info!(
            devices = self.inner.store.device_count(),
            interval_secs = self.inner.budget.interval().as_secs(),
            "coordinator started"
        );
        Ok(())
    }

    /// Cancel every background task and wait for them to finish.
    pub async fn shutdown(&self) {
        self.inner.running.send_replace(false);
        self.inner.cancel.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        drop(handles);

        self.inner.registry.shutdown().await;
        debug!("coordinator stopped");
    }

    pub fn is_running(&self) -> bool {
        *self.inner.running.borrow()
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn list_devices(&self) -> Arc<Vec<Arc<Device>>> {
        self.inner.store.devices()
    }

    /// Current value of `field`, or `None` if no source has it.
    pub fn get(&self, device: &DeviceId, field: Field) -> Option<Value> {
        self.read(device, field).map(|r| r.value)
    }

    /// Like [`get()`](Self::get), with the layer that supplied the value.
    pub fn read(&self, device: &DeviceId, field: Field) -> Option<ResolvedValue> {
        merge::resolve(&self.inner.store, &self.inner.overrides, device, field)
    }

    pub fn state(&self, device: &DeviceId) -> Result<DeviceState, CoreError> {
        merge::device_state(&self.inner.store, &self.inner.overrides, device).ok_or_else(|| {
            CoreError::DeviceNotFound {
                device: device.clone(),
            }
        })
    }

    /// Notified on every store change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.store.subscribe()
    }

    /// Current cloud polling interval.
    pub fn interval(&self) -> Duration {
        self.inner.budget.interval()
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Write `value` to `field`. The written value is visible to reads
    /// for the optimistic window once this returns `Ok`.
    pub async fn execute(
        &self,
        device: &DeviceId,
        field: Field,
        value: Value,
    ) -> Result<WriteOutcome, CoreError> {
        if !self.is_running() {
            return Err(CoreError::CoordinatorStopped);
        }

        let (tx, rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(CommandEnvelope {
                device: device.clone(),
                field,
                value,
                response_tx: tx,
            })
            .await
            .map_err(|_| CoreError::CoordinatorStopped)?;

        rx.await.map_err(|_| CoreError::CoordinatorStopped)?
    }

    // ── Device lifecycle ─────────────────────────────────────────────

    /// Register a device outside discovery. Returns `true` if it was new.
    pub async fn add_device(&self, device: Device, address: Option<String>) -> bool {
        self.inner.registry.add(device, address).await
    }

    pub async fn remove_device(&self, device: &DeviceId) -> bool {
        self.inner.registry.remove(device).await
    }

    /// Hook for an external address resolver. A changed address makes
    /// the device's local poller reconnect at once.
    pub async fn update_address(&self, device: &DeviceId, addr: impl Into<String>) -> Result<bool, CoreError> {
        if !self.inner.store.contains(device) {
            return Err(CoreError::DeviceNotFound {
                device: device.clone(),
            });
        }
        let changed = self.inner.registry.set_address(device, addr.into()).await;
        if changed {
            info!(device = %device, "LAN address updated");
        }
        Ok(changed)
    }

    // ── Manual refresh ───────────────────────────────────────────────

    /// Poll one device's local endpoint now.
    pub async fn refresh_local(&self, device: &DeviceId) -> Result<(), CoreError> {
        let (tx, rx) = oneshot::channel();
        if !self.inner.registry.request(device, LocalRequest::Poll(tx)).await {
            return Err(CoreError::DeviceNotFound {
                device: device.clone(),
            });
        }
        rx.await.map_err(|_| CoreError::CoordinatorStopped)?
    }

    /// Run a full cloud cycle now. Uses quota like a regular cycle.
    pub async fn refresh_cloud(&self) -> Result<CycleReport, CoreError> {
        if !self.is_running() {
            return Err(CoreError::CoordinatorStopped);
        }
        let (tx, rx) = oneshot::channel();
        self.inner
            .cloud_tx
            .send(CloudRequest::Cycle(tx))
            .map_err(|_| CoreError::CoordinatorStopped)?;
        rx.await.map_err(|_| CoreError::CoordinatorStopped)?
    }

    // ── Diagnostics ──────────────────────────────────────────────────

    pub async fn diagnostics(&self) -> Diagnostics {
        let inner = &self.inner;
        let (cloud, auth_error) = match &*inner.cloud_status.lock().await {
            Some(status) => (
                status.health.borrow().clone(),
                status.auth_error.borrow().clone(),
            ),
            None => Default::default(),
        };

        let alloc = inner.budget.current();
        let quota = QuotaUsage {
            devices: alloc.device_count,
            daily_budget: inner.config.budget.daily_budget,
            raw_interval_secs: alloc.raw.as_secs(),
            interval_secs: alloc.scheduled.as_secs(),
            estimated_daily_calls: inner
                .budget
                .estimated_daily_calls(&inner.config.secondary, inner.config.discovery_enabled()),
            reserved_headroom: inner.budget.reserved_headroom(),
        };

        let mut devices = Vec::new();
        for device in inner.store.devices().iter() {
            let id = &device.id;
            let cloud_view = inner.store.cloud_view(id).unwrap_or_default();
            let local_view = inner.store.local_view(id).unwrap_or_default();
            devices.push(DeviceDiagnostics {
                id: id.clone(),
                label: device.label.clone(),
                address: inner.store.resolve_address(id),
                cloud_stale: cloud_view.stale,
                local_stale: local_view.stale,
                cloud_updated_at: cloud_view.updated_at,
                local_updated_at: local_view.updated_at,
                local: inner.registry.local_health(id).await,
                overrides: inner
                    .overrides
                    .active_for(id)
                    .into_iter()
                    .map(|o| OverrideInfo {
                        field: o.field,
                        value: o.value,
                        remaining_secs: o.remaining.as_secs(),
                    })
                    .collect(),
                secondary: inner.store.secondary().status_for(Some(id)),
            });
        }

        Diagnostics {
            rate_limit: inner.cloud.rate_limit().map(|s| (*s).clone()),
            cloud,
            auth_error,
            quota,
            devices,
        }
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Run writes one at a time, in arrival order.
async fn command_processor_task(coordinator: Coordinator, mut rx: mpsc::Receiver<CommandEnvelope>) {
    let cancel = coordinator.inner.cancel.clone();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            envelope = rx.recv() => {
                let Some(envelope) = envelope else { break };
                let result = coordinator
                    .inner
                    .dispatcher
                    .execute(&envelope.device, envelope.field, &envelope.value)
                    .await;
                let _ = envelope.response_tx.send(result);
            }
        }
    }
}

/// Drop expired overrides once per window.
async fn sweep_task(overrides: Arc<OptimisticCache>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(overrides.window());
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let removed = overrides.sweep();
                if removed > 0 {
                    debug!(removed, "expired overrides swept");
                }
            }
        }
    }
}
