// ── Diagnostics surface ──
//
// Read-only snapshot of quota usage, poller health and per-device
// freshness, for display by the host.

use chargesync_api::RateLimitSnapshot;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::backoff::BackoffSnapshot;
use crate::model::{DeviceId, Field};
use crate::secondary::SecondaryStatus;

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    /// Last quota headers seen on a cloud response.
    pub rate_limit: Option<RateLimitSnapshot>,
    pub cloud: BackoffSnapshot,
    /// Set while the cloud rejects the API key.
    pub auth_error: Option<String>,
    pub quota: QuotaUsage,
    pub devices: Vec<DeviceDiagnostics>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaUsage {
    pub devices: usize,
    pub daily_budget: u32,
    pub raw_interval_secs: u64,
    pub interval_secs: u64,
    pub estimated_daily_calls: u64,
    pub reserved_headroom: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceDiagnostics {
    pub id: DeviceId,
    pub label: String,
    pub address: Option<String>,
    pub cloud_stale: bool,
    pub local_stale: bool,
    pub cloud_updated_at: Option<DateTime<Utc>>,
    pub local_updated_at: Option<DateTime<Utc>>,
    /// `None` once the device's poller has been torn down.
    pub local: Option<BackoffSnapshot>,
    pub overrides: Vec<OverrideInfo>,
    pub secondary: Vec<SecondaryStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverrideInfo {
    pub field: Field,
    pub value: Value,
    pub remaining_secs: u64,
}
