// ── Per-source device views ──
//
// A view is what one source last said about one device, normalized
// through the field table. Raw payload keys that map to no field are
// dropped here.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::model::{Field, Route};

/// Cloud status keys that may carry the charger's LAN address.
const CLOUD_ADDR_KEYS: &[&str] = &["ip", "wifi_ip"];
/// Local realtime keys that may carry the charger's LAN address.
const LOCAL_ADDR_KEYS: &[&str] = &["_static_ip", "IP"];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceView {
    pub values: BTreeMap<Field, Value>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Set when the last scheduled refresh of this view failed. The
    /// values are kept.
    pub stale: bool,
    /// LAN address this source reported for the device, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reported_addr: Option<String>,
}

impl SourceView {
    /// Build from a cloud status payload. Keys are matched lowercased.
    pub(crate) fn from_cloud(raw: &Map<String, Value>) -> Self {
        let lowered: Map<String, Value> = raw
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
            .collect();

        let values = Field::all()
            .filter_map(|field| {
                let spec = field.spec();
                spec.cloud_keys
                    .iter()
                    .find_map(|key| lowered.get(*key).filter(|v| !v.is_null()))
                    .and_then(|v| spec.kind.normalize(v))
                    .map(|v| (field, v))
            })
            .collect();

        Self {
            values,
            updated_at: Some(Utc::now()),
            stale: false,
            reported_addr: first_string(&lowered, CLOUD_ADDR_KEYS),
        }
    }

    /// Build from a local realtime payload. Only local-capable fields
    /// are taken.
    pub(crate) fn from_local(raw: &Map<String, Value>) -> Self {
        let values = Field::all()
            .filter(|f| f.spec().route == Route::Local)
            .filter_map(|field| {
                let spec = field.spec();
                spec.local_key
                    .and_then(|key| raw.get(key))
                    .and_then(|v| spec.kind.normalize(v))
                    .map(|v| (field, v))
            })
            .collect();

        Self {
            values,
            updated_at: Some(Utc::now()),
            stale: false,
            reported_addr: first_string(raw, LOCAL_ADDR_KEYS),
        }
    }

    pub fn get(&self, field: Field) -> Option<&Value> {
        self.values.get(&field)
    }
}

fn first_string(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| {
        map.get(*k)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
    })
}
