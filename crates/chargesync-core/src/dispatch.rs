// ── Command dispatch ──
//
// Every write flows through `Dispatcher::execute`: validate, route by
// the field table, write, then record the optimistic override and
// decide which poller to nudge. Failed writes never leave an override.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::WriteConfig;
use crate::error::CoreError;
use crate::model::field::wire_value;
use crate::model::{CloudWrite, DeviceId, Field, Route};
use crate::overrides::OptimisticCache;
use crate::poller::cloud::CloudRequest;
use crate::poller::local::LocalRequest;
use crate::registry::Registry;
use crate::store::DataStore;
use crate::transport::{CloudApi, LocalApi};

/// A write intent sent through the command channel.
pub(crate) struct CommandEnvelope {
    pub device: DeviceId,
    pub field: Field,
    pub value: Value,
    pub response_tx: oneshot::Sender<Result<WriteOutcome, CoreError>>,
}

/// Result of a successful write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteOutcome {
    pub device: DeviceId,
    pub field: Field,
    /// The value as written, after validation.
    pub value: Value,
    /// Transport that carried the write.
    pub route: Route,
    #[serde(rename = "override_expires_in_secs", serialize_with = "as_secs")]
    pub override_expires_in: Duration,
}

fn as_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}

/// Where a write goes.
enum Target {
    Local { addr: String, keyword: &'static str },
    Cloud(CloudWrite),
}

pub(crate) struct Dispatcher {
    pub(crate) store: Arc<DataStore>,
    pub(crate) overrides: Arc<OptimisticCache>,
    pub(crate) registry: Arc<Registry>,
    pub(crate) cloud: Arc<dyn CloudApi>,
    pub(crate) local: Arc<dyn LocalApi>,
    pub(crate) cloud_tx: mpsc::UnboundedSender<CloudRequest>,
    pub(crate) writes: WriteConfig,
    /// Delay before re-polling a device whose local write failed.
    pub(crate) write_retry_delay: Duration,
}

impl Dispatcher {
    pub(crate) async fn execute(
        &self,
        device: &DeviceId,
        field: Field,
        input: &Value,
    ) -> Result<WriteOutcome, CoreError> {
        if !self.store.contains(device) {
            return Err(CoreError::DeviceNotFound {
                device: device.clone(),
            });
        }

        let value = field.coerce(input)?;
        let target = self.target(device, field)?;

        let route = match target {
            Target::Local { addr, keyword } => {
                let wire = wire_value(&value);
                debug!(device = %device, %field, keyword, value = %wire, "local write");
                if let Err(e) = self.local.write(&addr, keyword, &wire).await {
                    warn!(device = %device, %field, error = %e, "local write failed");
                    self.registry
                        .request(device, LocalRequest::RefreshAfter(self.write_retry_delay))
                        .await;
                    return Err(CoreError::local(device, e));
                }
                Route::Local
            }
            Target::Cloud(write) => {
                let endpoint = write.endpoint(&value);
                let wire = match write {
                    CloudWrite::Endpoint(_) => wire_value(&value),
                    CloudWrite::Toggle { .. } => String::from("1"),
                };
                debug!(device = %device, %field, endpoint, value = %wire, "cloud write");
                if let Err(e) = self.cloud.send_command(device, endpoint, &wire).await {
                    let err = CoreError::from(e);
                    warn!(device = %device, %field, error = %err, "cloud write failed");
                    return Err(err);
                }
                Route::Cloud
            }
        };

        // Removal drops the store entry before purging overrides, so
        // checking after the set catches a removal during the write.
        self.overrides.set(device, field, value.clone());
        if !self.store.contains(device) {
            self.overrides.purge_device(device);
            debug!(device = %device, %field, "device removed during write, result discarded");
            return Err(CoreError::DeviceNotFound {
                device: device.clone(),
            });
        }
        self.follow_up(device, field, route).await;

        info!(device = %device, %field, value = %value, via = %route, "write accepted");
        Ok(WriteOutcome {
            device: device.clone(),
            field,
            value,
            route,
            override_expires_in: self.overrides.window(),
        })
    }

    /// Pick the transport. Local-capable fields go to the charger when an
    /// address is known and fall back to their cloud endpoint otherwise.
    fn target(&self, device: &DeviceId, field: Field) -> Result<Target, CoreError> {
        let spec = field.spec();
        if spec.route == Route::Local {
            if let (Some(keyword), Some(addr)) = (spec.local_key, self.store.resolve_address(device)) {
                return Ok(Target::Local { addr, keyword });
            }
            return match spec.cloud_write {
                Some(write) => {
                    debug!(device = %device, %field, "no LAN address, writing through the cloud");
                    Ok(Target::Cloud(write))
                }
                None => Err(CoreError::local(device, "no LAN address known")),
            };
        }

        spec.cloud_write
            .map(Target::Cloud)
            .ok_or_else(|| CoreError::ReadOnlyField {
                field: field.to_string(),
            })
    }

    /// Schedule confirmation of a successful write.
    async fn follow_up(&self, device: &DeviceId, field: Field, route: Route) {
        if route == Route::Local {
            // The local poller confirms cheaply; no cloud call.
            self.registry.request(device, LocalRequest::Refresh).await;
            return;
        }

        let requests = if self.writes.slow_confirm_fields.contains(&field) {
            vec![
                CloudRequest::SuppressNextTick,
                CloudRequest::RefreshAfter {
                    device: device.clone(),
                    delay: self.writes.slow_confirm_delay,
                },
            ]
        } else if field.spec().route == Route::Local {
            // Local-capable field that went through the cloud: the next
            // regular tick confirms it.
            return;
        } else {
            vec![CloudRequest::RefreshDevice(device.clone())]
        };
        for req in requests {
            if self.cloud_tx.send(req).is_err() {
                debug!(device = %device, %field, ?route, "cloud poller gone, skipping confirmation");
            }
        }
    }
}
