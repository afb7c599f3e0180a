// ── Device identity ──

use std::fmt;
use std::str::FromStr;

use chargesync_api::Pairing;
use serde::{Deserialize, Serialize};

/// Cloud-assigned charger identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DeviceId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.trim().to_owned())
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

/// A registered charger.
///
/// Created from a cloud pairing (or a static config entry). Only the
/// pairing-reported address changes afterwards; the effective LAN
/// address is resolved by the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Device {
    pub id: DeviceId,
    pub label: String,
    pub model: Option<String>,
    /// Address reported in the pairing listing, lowest-priority source.
    pub pairing_addr: Option<String>,
}

impl Device {
    pub fn new(id: impl Into<DeviceId>) -> Self {
        let id = id.into();
        Self {
            label: id.to_string(),
            id,
            model: None,
            pairing_addr: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

impl From<&Pairing> for Device {
    fn from(p: &Pairing) -> Self {
        Self {
            id: DeviceId::from(p.device_id.as_str()),
            label: p.label().to_owned(),
            model: p.model.clone(),
            pairing_addr: p.ip.clone().filter(|ip| !ip.is_empty()),
        }
    }
}
