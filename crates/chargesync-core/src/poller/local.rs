// ── Local poller (one per device) ──
//
// Polls the charger's realtime endpoint on a fixed cadence. Within a
// cycle it retries with backoff; every failed attempt flags the local
// view stale so reads fall back to the cloud, and the next success
// clears the flag.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::sleep_or_cancel;
use crate::backoff::{BackoffSnapshot, BackoffState, Verdict};
use crate::config::LocalConfig;
use crate::error::{CoreError, ErrorClass};
use crate::model::DeviceId;
use crate::store::DataStore;
use crate::transport::LocalApi;

/// Out-of-band requests to a local poller.
#[derive(Debug)]
pub(crate) enum LocalRequest {
    /// Poll now.
    Refresh,
    /// Poll once after a delay. A newer request replaces a pending one.
    RefreshAfter(Duration),
    /// The address changed; reconnect and poll now.
    AddressChanged,
    /// Poll now and report the outcome.
    Poll(oneshot::Sender<Result<(), CoreError>>),
}

pub(crate) struct LocalPoller {
    device: DeviceId,
    api: Arc<dyn LocalApi>,
    store: Arc<DataStore>,
    config: LocalConfig,
    backoff: BackoffState,
    health: watch::Sender<BackoffSnapshot>,
    /// Consecutive failed attempts across cycles, for the recovery log.
    failure_streak: u32,
    last_addr: Option<String>,
    cancel: CancellationToken,
}

impl LocalPoller {
    pub(crate) fn new(
        device: DeviceId,
        api: Arc<dyn LocalApi>,
        store: Arc<DataStore>,
        config: LocalConfig,
        cancel: CancellationToken,
    ) -> (Self, watch::Receiver<BackoffSnapshot>) {
        let (health, health_rx) = watch::channel(BackoffSnapshot::default());
        let poller = Self {
            device,
            api,
            store,
            backoff: BackoffState::new(config.backoff.clone()),
            config,
            health,
            failure_streak: 0,
            last_addr: None,
            cancel,
        };
        (poller, health_rx)
    }

    pub(crate) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<LocalRequest>) {
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut delayed: Option<Instant> = None;
        let cancel = self.cancel.clone();

        debug!(device = %self.device, "local poller started");

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                req = rx.recv() => {
                    let Some(req) = req else { break };
                    match req {
                        LocalRequest::Refresh => {
                            let _ = self.poll_cycle().await;
                        }
                        LocalRequest::RefreshAfter(delay) => {
                            delayed = Some(Instant::now() + delay);
                            continue;
                        }
                        LocalRequest::AddressChanged => {
                            self.backoff.rearm();
                            let _ = self.poll_cycle().await;
                        }
                        LocalRequest::Poll(reply) => {
                            let result = self.poll_cycle().await;
                            let _ = reply.send(result);
                        }
                    }
                    interval.reset();
                }
                () = tokio::time::sleep_until(delayed.unwrap_or_else(Instant::now)), if delayed.is_some() => {
                    delayed = None;
                    debug!(device = %self.device, "delayed local re-poll");
                    let _ = self.poll_cycle().await;
                    interval.reset();
                }
                _ = interval.tick() => {
                    let _ = self.poll_cycle().await;
                }
            }
        }

        debug!(device = %self.device, "local poller stopped");
    }

    /// One poll cycle: up to `max_attempts` requests with backoff between.
    pub(crate) async fn poll_cycle(&mut self) -> Result<(), CoreError> {
        let Some(addr) = self.store.resolve_address(&self.device) else {
            debug!(device = %self.device, "no LAN address known, skipping local poll");
            return Err(CoreError::local(&self.device, "no LAN address known"));
        };

        if self.last_addr.as_deref() != Some(addr.as_str()) {
            if let Some(old) = &self.last_addr {
                info!(device = %self.device, from = %old, to = %addr, "LAN address changed, reconnecting");
            }
            self.last_addr = Some(addr.clone());
        }

        self.backoff.rearm();
        loop {
            match self.api.realtime(&addr).await {
                Ok(raw) => {
                    if !self.store.apply_local(&self.device, &raw) {
                        debug!(device = %self.device, "device removed, discarding local result");
                        return Ok(());
                    }
                    if self.failure_streak > 0 {
                        info!(
                            device = %self.device,
                            failures = self.failure_streak,
                            "local API recovered after {} failure(s)",
                            self.failure_streak
                        );
                    }
                    self.failure_streak = 0;
                    self.backoff.record_success();
                    self.publish();
                    return Ok(());
                }
                Err(e) => {
                    self.failure_streak = self.failure_streak.saturating_add(1);
                    self.store.mark_local_stale(&self.device);

                    match self.backoff.record_failure(ErrorClass::LocalUnavailable, None) {
                        Verdict::RetryAfter(delay) => {
                            debug!(
                                device = %self.device,
                                attempt = self.backoff.failures(),
                                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                                error = %e,
                                "local poll failed, retrying"
                            );
                            self.publish();
                            if !sleep_or_cancel(delay, &self.cancel).await {
                                return Err(CoreError::CoordinatorStopped);
                            }
                        }
                        Verdict::GiveUp => {
                            warn!(
                                device = %self.device,
                                attempts = self.backoff.failures(),
                                error = %e,
                                "local poll failed, waiting for next cycle"
                            );
                            self.publish();
                            return Err(CoreError::local(&self.device, e));
                        }
                    }
                }
            }
        }
    }

    fn publish(&self) {
        self.health.send_replace(self.backoff.snapshot());
    }
}
