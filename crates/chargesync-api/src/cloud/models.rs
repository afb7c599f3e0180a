// ── Cloud API wire types ──
//
// The cloud API is loosely typed: most payloads carry more fields than
// we model, so unknown keys are kept in `extra` rather than rejected.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One charger paired to the account (`GET /pairings/me`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pairing {
    pub device_id: String,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// LAN address as last seen by the cloud, if reported.
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Pairing {
    /// Human label: the user-assigned tag, else the device id.
    pub fn label(&self) -> &str {
        self.tag
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.device_id)
    }
}

/// A registered RFID card (`GET /device/rfid`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RfidCard {
    pub code: String,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Firmware version payload (`GET /version`).
///
/// Older gateways answer with a bare string, newer ones with an object.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FirmwareVersion {
    Plain(String),
    Detailed {
        version: String,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
}

impl FirmwareVersion {
    pub fn version(&self) -> &str {
        match self {
            Self::Plain(v) | Self::Detailed { version: v, .. } => v,
        }
    }
}
