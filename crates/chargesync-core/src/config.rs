// ── Runtime coordinator configuration ──
//
// These types describe how to reach the cloud and how hard to poll it.
// They carry the API key and tuning knobs, but never touch disk.
// The host builds a `CoordinatorConfig` and hands it in.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::backoff::BackoffPolicy;
use crate::model::{DeviceId, Field};

/// Hard daily call quota enforced by the cloud platform.
pub const PLATFORM_DAILY_QUOTA: u32 = 1000;

/// Cloud quota budget used by the rate allocator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetConfig {
    /// Calls per day available to status polling. The remainder of the
    /// platform quota is headroom for writes and secondary refreshes.
    pub daily_budget: u32,
    /// The allocator never returns an interval below this.
    pub min_interval: Duration,
    /// Policy baseline applied on top of the raw allocation. `None` uses
    /// the raw value as-is.
    pub policy_interval: Option<Duration>,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            daily_budget: 850,
            min_interval: Duration::from_secs(90),
            policy_interval: Some(Duration::from_secs(120)),
        }
    }
}

/// Refresh cadences of the slow-changing cloud resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondaryPeriods {
    pub rfid_cards: Duration,
    pub firmware_version: Duration,
    pub pairings: Duration,
}

impl Default for SecondaryPeriods {
    fn default() -> Self {
        Self {
            rfid_cards: Duration::from_secs(6 * 3600),
            firmware_version: Duration::from_secs(12 * 3600),
            pairings: Duration::from_secs(3600),
        }
    }
}

/// A device declared up front instead of discovered from pairings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticDevice {
    pub id: DeviceId,
    pub label: Option<String>,
    pub address: Option<String>,
}

/// Local-path tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalConfig {
    pub poll_interval: Duration,
    pub timeout: Duration,
    pub backoff: BackoffPolicy,
    /// Delay before the single re-poll scheduled after a failed local write.
    pub write_retry_delay: Duration,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            timeout: Duration::from_secs(10),
            backoff: BackoffPolicy::local(),
            write_retry_delay: Duration::from_secs(5),
        }
    }
}

/// Write-path tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteConfig {
    /// How long a successful write shadows the polled value.
    pub override_window: Duration,
    /// Fields whose cloud confirmation lags; their writes suppress the
    /// next regular cloud tick and schedule one delayed refresh instead.
    pub slow_confirm_fields: Vec<Field>,
    pub slow_confirm_delay: Duration,
}

impl Default for WriteConfig {
    fn default() -> Self {
        Self {
            override_window: Duration::from_secs(20),
            slow_confirm_fields: vec![Field::Dynamic, Field::Locked, Field::LogoLed, Field::RfidReader],
            slow_confirm_delay: Duration::from_secs(8),
        }
    }
}

/// Everything the coordinator needs to run.
///
/// Built by the host, passed to `Coordinator`. Core never reads config files.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub api_key: SecretString,
    /// Cloud API base URL; `None` uses the production endpoint.
    pub base_url: Option<Url>,
    pub cloud_timeout: Duration,
    pub cloud_backoff: BackoffPolicy,
    /// When non-empty, these devices are used and pairing discovery is off.
    pub devices: Vec<StaticDevice>,
    pub budget: BudgetConfig,
    pub secondary: SecondaryPeriods,
    pub local: LocalConfig,
    pub writes: WriteConfig,
}

impl CoordinatorConfig {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            base_url: None,
            cloud_timeout: Duration::from_secs(30),
            cloud_backoff: BackoffPolicy::cloud(),
            devices: Vec::new(),
            budget: BudgetConfig::default(),
            secondary: SecondaryPeriods::default(),
            local: LocalConfig::default(),
            writes: WriteConfig::default(),
        }
    }

    /// Pairing discovery runs only without a static device list.
    pub fn discovery_enabled(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn is_slow_confirm(&self, field: Field) -> bool {
        self.writes.slow_confirm_fields.contains(&field)
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::new(SecretString::from(String::new()))
    }
}
