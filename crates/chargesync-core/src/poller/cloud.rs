// ── Cloud poller ──
//
// A single task walks every registered device once per budgeted
// interval, one aggregate status call per device, then refreshes any
// secondary resources that have fallen due. Retries inside a cycle go
// through the backoff machine; a rate-limit that exhausts it ends the
// whole cycle so the remaining devices do not burn further quota.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::sleep_or_cancel;
use crate::backoff::{BackoffPolicy, BackoffSnapshot, BackoffState, Verdict};
use crate::budget::RateBudget;
use crate::error::{CoreError, ErrorClass};
use crate::model::DeviceId;
use crate::registry::Registry;
use crate::secondary::{ResourceKind, SecondaryValue};
use crate::store::DataStore;
use crate::transport::CloudApi;

/// Out-of-band requests to the cloud poller.
#[derive(Debug)]
pub(crate) enum CloudRequest {
    /// Skip the next regular tick once.
    SuppressNextTick,
    /// Re-poll one device after a delay.
    RefreshAfter { device: DeviceId, delay: Duration },
    /// Re-poll one device now.
    RefreshDevice(DeviceId),
    /// Run a full cycle now and report the outcome.
    Cycle(oneshot::Sender<Result<CycleReport, CoreError>>),
}

/// Outcome of one cloud cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub updated: usize,
    pub failed: usize,
    pub added: usize,
    pub removed: usize,
    /// Set when the cycle was cut short by the quota.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limited_secs: Option<u64>,
}

/// Shared observable state of the cloud poller.
#[derive(Clone)]
pub(crate) struct CloudStatus {
    pub(crate) health: watch::Receiver<BackoffSnapshot>,
    pub(crate) auth_error: watch::Receiver<Option<String>>,
}

pub(crate) struct CloudPoller {
    api: Arc<dyn CloudApi>,
    store: Arc<DataStore>,
    budget: Arc<RateBudget>,
    registry: Arc<Registry>,
    discovery: bool,
    backoff: BackoffState,
    health: watch::Sender<BackoffSnapshot>,
    auth_error: watch::Sender<Option<String>>,
    cancel: CancellationToken,
}

impl CloudPoller {
    pub(crate) fn new(
        api: Arc<dyn CloudApi>,
        store: Arc<DataStore>,
        budget: Arc<RateBudget>,
        registry: Arc<Registry>,
        policy: BackoffPolicy,
        discovery: bool,
        cancel: CancellationToken,
    ) -> (Self, CloudStatus) {
        let (health, health_rx) = watch::channel(BackoffSnapshot::default());
        let (auth_error, auth_rx) = watch::channel(None);
        let poller = Self {
            api,
            store,
            budget,
            registry,
            discovery,
            backoff: BackoffState::new(policy),
            health,
            auth_error,
            cancel,
        };
        let status = CloudStatus {
            health: health_rx,
            auth_error: auth_rx,
        };
        (poller, status)
    }

    /// Scheduling loop. The first cycle is expected to have run already,
    /// so the first regular tick is one interval away.
    pub(crate) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<CloudRequest>) {
        let cancel = self.cancel.clone();
        let mut alloc_rx = self.budget.subscribe();
        alloc_rx.mark_unchanged();

        let mut last_cycle = Instant::now();
        // Extra wait demanded by the server after a rate limit.
        let mut hold = Duration::ZERO;
        let mut deadline = last_cycle + self.budget.interval();
        let mut suppress = false;
        let mut pending: HashMap<DeviceId, Instant> = HashMap::new();

        debug!(interval_secs = self.budget.interval().as_secs(), "cloud poller started");

        loop {
            let next_pending = pending.values().min().copied();

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                req = rx.recv() => {
                    let Some(req) = req else { break };
                    match req {
                        CloudRequest::SuppressNextTick => suppress = true,
                        CloudRequest::RefreshAfter { device, delay } => {
                            pending.insert(device, Instant::now() + delay);
                        }
                        CloudRequest::RefreshDevice(device) => {
                            pending.remove(&device);
                            self.refresh_device(&device).await;
                        }
                        CloudRequest::Cycle(reply) => {
                            let result = self.cycle().await;
                            hold = Self::hold_for(&result);
                            last_cycle = Instant::now();
                            deadline = self.schedule(last_cycle, hold);
                            let _ = reply.send(result);
                        }
                    }
                }
                Ok(()) = alloc_rx.changed() => {
                    // Takes effect from the next tick; a cycle in progress
                    // is never interrupted.
                    deadline = self.schedule(last_cycle, hold);
                }
                () = tokio::time::sleep_until(next_pending.unwrap_or(deadline)), if next_pending.is_some() => {
                    let now = Instant::now();
                    let due: Vec<DeviceId> = pending
                        .iter()
                        .filter(|(_, at)| **at <= now)
                        .map(|(id, _)| id.clone())
                        .collect();
                    for device in due {
                        pending.remove(&device);
                        self.refresh_device(&device).await;
                    }
                }
                () = tokio::time::sleep_until(deadline) => {
                    if suppress {
                        suppress = false;
                        debug!("regular cloud tick skipped for a pending confirmation");
                        hold = Duration::ZERO;
                    } else {
                        let result = self.cycle().await;
                        hold = Self::hold_for(&result);
                    }
                    last_cycle = Instant::now();
                    deadline = self.schedule(last_cycle, hold);
                }
            }
        }

        debug!("cloud poller stopped");
    }

    /// Run one cycle and publish its outcome.
    pub(crate) async fn cycle(&mut self) -> Result<CycleReport, CoreError> {
        let result = self.run_cycle().await;
        match &result {
            Ok(report) => {
                self.auth_error.send_if_modified(|current| current.take().is_some());
                debug!(
                    updated = report.updated,
                    failed = report.failed,
                    "cloud cycle complete"
                );
            }
            Err(CoreError::Auth { message }) => {
                error!(error = %message, "cloud credentials rejected, polling continues without cloud data");
                self.auth_error.send_replace(Some(message.clone()));
            }
            Err(e) => debug!(error = %e, "cloud cycle aborted"),
        }
        self.publish();
        result
    }

    fn schedule(&mut self, from: Instant, hold: Duration) -> Instant {
        let wait = self.budget.interval().max(hold);
        let deadline = from + wait;
        if self.backoff.is_exhausted() {
            self.backoff.defer_until(deadline);
            self.publish();
        }
        deadline
    }

    fn hold_for(result: &Result<CycleReport, CoreError>) -> Duration {
        match result {
            Ok(report) => Duration::from_secs(report.rate_limited_secs.unwrap_or(0)),
            Err(_) => Duration::ZERO,
        }
    }

    async fn run_cycle(&mut self) -> Result<CycleReport, CoreError> {
        let mut report = CycleReport::default();

        if self.discovery && self.store.secondary().is_due(None, ResourceKind::Pairings) {
            self.backoff.rearm();
            let api = Arc::clone(&self.api);
            match self.attempt("pairings", None, || api.pairings()).await {
                Ok(pairings) => {
                    let (added, removed) = self.registry.reconcile(&pairings).await;
                    report.added = added;
                    report.removed = removed;
                    self.store.secondary().record(
                        None,
                        ResourceKind::Pairings,
                        SecondaryValue::Pairings(pairings),
                    );
                }
                Err(e @ (CoreError::Auth { .. } | CoreError::CoordinatorStopped)) => return Err(e),
                Err(CoreError::RateLimited { retry_after_secs }) => {
                    let ids = self.store.device_ids();
                    self.stop_for_quota(&ids, &mut report, retry_after_secs);
                    return Ok(report);
                }
                Err(e) => warn!(error = %e, "pairing listing failed, keeping current devices"),
            }
        }

        let ids = self.store.device_ids();
        for (idx, id) in ids.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(CoreError::CoordinatorStopped);
            }

            self.backoff.rearm();
            let api = Arc::clone(&self.api);
            match self.attempt("status", Some(id), || api.status(id)).await {
                Ok(raw) => {
                    if self.store.apply_cloud(id, &raw) {
                        report.updated += 1;
                    }
                }
                Err(e @ (CoreError::Auth { .. } | CoreError::CoordinatorStopped)) => return Err(e),
                Err(CoreError::RateLimited { retry_after_secs }) => {
                    let rest: Vec<DeviceId> = ids.iter().skip(idx).cloned().collect();
                    self.stop_for_quota(&rest, &mut report, retry_after_secs);
                    return Ok(report);
                }
                Err(e) => {
                    warn!(device = %id, error = %e, "cloud status failed, keeping last values");
                    self.store.mark_cloud_stale(id);
                    report.failed += 1;
                    continue;
                }
            }

            if let Some(retry_after_secs) = self.refresh_secondaries(id).await? {
                let rest: Vec<DeviceId> = ids.iter().skip(idx + 1).cloned().collect();
                self.stop_for_quota(&rest, &mut report, retry_after_secs);
                return Ok(report);
            }
        }

        Ok(report)
    }

    /// Fetch due secondary resources for one device, one attempt each.
    /// Returns the server's retry hint if the quota ran out.
    async fn refresh_secondaries(&mut self, id: &DeviceId) -> Result<Option<u64>, CoreError> {
        for kind in [ResourceKind::RfidCards, ResourceKind::FirmwareVersion] {
            if !self.store.secondary().is_due(Some(id), kind) {
                continue;
            }

            let fetched = match kind {
                ResourceKind::RfidCards => self
                    .api
                    .rfid_cards(id)
                    .await
                    .map(SecondaryValue::RfidCards),
                ResourceKind::FirmwareVersion => self
                    .api
                    .firmware_version(id)
                    .await
                    .map(SecondaryValue::FirmwareVersion),
                ResourceKind::Pairings => continue,
            };

            match fetched.map_err(CoreError::from) {
                Ok(value) => {
                    if self.store.contains(id) {
                        self.store.secondary().record(Some(id), kind, value);
                        debug!(device = %id, resource = %kind, "secondary resource refreshed");
                    }
                }
                Err(e @ CoreError::Auth { .. }) => return Err(e),
                Err(CoreError::RateLimited { retry_after_secs }) => {
                    self.backoff.rearm();
                    let _ = self.backoff.record_failure(
                        ErrorClass::RateLimit,
                        Some(Duration::from_secs(retry_after_secs)),
                    );
                    return Ok(Some(retry_after_secs));
                }
                Err(e) => {
                    warn!(device = %id, resource = %kind, error = %e, "secondary refresh failed");
                }
            }
        }
        Ok(None)
    }

    /// Out-of-band status refresh of one device.
    async fn refresh_device(&mut self, id: &DeviceId) {
        if !self.store.contains(id) {
            return;
        }

        self.backoff.rearm();
        let api = Arc::clone(&self.api);
        match self.attempt("status", Some(id), || api.status(id)).await {
            Ok(raw) => {
                self.store.apply_cloud(id, &raw);
                debug!(device = %id, "cloud status refreshed");
            }
            Err(CoreError::Auth { message }) => {
                error!(error = %message, "cloud credentials rejected");
                self.auth_error.send_replace(Some(message));
            }
            Err(CoreError::CoordinatorStopped) => {}
            Err(e) => {
                warn!(device = %id, error = %e, "cloud refresh failed");
                self.store.mark_cloud_stale(id);
            }
        }
        self.publish();
    }

    /// Call `op` with retries until it succeeds or the backoff gives up.
    async fn attempt<T, F, Fut>(
        &mut self,
        what: &'static str,
        device: Option<&DeviceId>,
        mut op: F,
    ) -> Result<T, CoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, chargesync_api::Error>>,
    {
        loop {
            let err = match op().await {
                Ok(value) => {
                    self.backoff.record_success();
                    self.publish();
                    return Ok(value);
                }
                Err(e) => CoreError::from(e),
            };

            if err.is_auth() {
                return Err(err);
            }

            let class = err.class().unwrap_or(ErrorClass::Transport);
            match self.backoff.record_failure(class, err.retry_after()) {
                Verdict::RetryAfter(delay) => {
                    debug!(
                        request = what,
                        device = ?device.map(DeviceId::as_str),
                        attempt = self.backoff.failures(),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "cloud request failed, backing off"
                    );
                    self.publish();
                    if !sleep_or_cancel(delay, &self.cancel).await {
                        return Err(CoreError::CoordinatorStopped);
                    }
                }
                Verdict::GiveUp => {
                    warn!(
                        request = what,
                        device = ?device.map(DeviceId::as_str),
                        attempts = self.backoff.failures(),
                        class = %class,
                        "cloud request gave up for this cycle"
                    );
                    self.publish();
                    return Err(err);
                }
            }
        }
    }

    fn stop_for_quota(&self, devices: &[DeviceId], report: &mut CycleReport, retry_after_secs: u64) {
        for id in devices {
            self.store.mark_cloud_stale(id);
        }
        report.failed += devices.len();
        report.rate_limited_secs = Some(retry_after_secs);
        info!(
            skipped = devices.len(),
            retry_after_secs,
            "cloud quota exhausted, ending cycle early"
        );
    }

    fn publish(&self) {
        self.health.send_replace(self.backoff.snapshot());
    }
}
