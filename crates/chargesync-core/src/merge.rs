// ── Data merge layer ──
//
// Read resolution is fixed: optimistic override, then the local view
// (local-capable fields only, and only while fresh), then the cloud
// view. Reads have no side effects beyond dropping expired overrides.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::model::{Device, DeviceId, Field, Route};
use crate::overrides::OptimisticCache;
use crate::store::DataStore;

/// Which layer supplied a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ValueSource {
    Override,
    Local,
    Cloud,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedValue {
    pub value: Value,
    pub source: ValueSource,
}

/// Merged view of one device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceState {
    pub device: Device,
    pub address: Option<String>,
    pub values: BTreeMap<Field, ResolvedValue>,
    pub cloud_stale: bool,
    pub local_stale: bool,
    pub cloud_updated_at: Option<DateTime<Utc>>,
    pub local_updated_at: Option<DateTime<Utc>>,
}

/// Resolve one field.
pub(crate) fn resolve(
    store: &DataStore,
    overrides: &OptimisticCache,
    device: &DeviceId,
    field: Field,
) -> Option<ResolvedValue> {
    if let Some(value) = overrides.get(device, field) {
        return Some(ResolvedValue {
            value,
            source: ValueSource::Override,
        });
    }

    if field.spec().route == Route::Local {
        let local = store
            .local_view(device)
            .filter(|v| !v.stale)
            .and_then(|v| v.values.get(&field).cloned());
        if let Some(value) = local {
            return Some(ResolvedValue {
                value,
                source: ValueSource::Local,
            });
        }
    }

    // Firmware is a secondary cloud resource, not part of the status.
    if field == Field::FirmwareVersion {
        return store
            .secondary()
            .firmware_version(device)
            .map(|v| ResolvedValue {
                value: Value::String(v),
                source: ValueSource::Cloud,
            });
    }

    store
        .cloud_view(device)
        .and_then(|v| v.values.get(&field).cloned())
        .map(|value| ResolvedValue {
            value,
            source: ValueSource::Cloud,
        })
}

/// Resolve every field of one device.
pub(crate) fn device_state(
    store: &DataStore,
    overrides: &OptimisticCache,
    id: &DeviceId,
) -> Option<DeviceState> {
    let device = store.device(id)?;
    let cloud = store.cloud_view(id).unwrap_or_default();
    let local = store.local_view(id).unwrap_or_default();

    let values = Field::all()
        .filter_map(|field| resolve(store, overrides, id, field).map(|v| (field, v)))
        .collect();

    Some(DeviceState {
        device: (*device).clone(),
        address: store.resolve_address(id),
        values,
        cloud_stale: cloud.stale,
        local_stale: local.stale,
        cloud_updated_at: cloud.updated_at,
        local_updated_at: local.updated_at,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use serde_json::{Map, json};

    use super::*;
    use crate::config::SecondaryPeriods;
    use crate::secondary::{ResourceKind, SecondaryValue};

    fn object(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => Map::new(),
        }
    }

    fn setup() -> (DataStore, OptimisticCache, DeviceId) {
        let store = DataStore::new(SecondaryPeriods::default());
        store.upsert_device(Device::new("ABC123"));
        (store, OptimisticCache::new(Duration::from_secs(20)), DeviceId::from("ABC123"))
    }

    #[tokio::test(start_paused = true)]
    async fn resolution_order() {
        let (store, overrides, id) = setup();
        store.apply_cloud(&id, &object(json!({ "intensity": 10, "logo_led": 1 })));
        assert_eq!(
            resolve(&store, &overrides, &id, Field::Intensity).unwrap().source,
            ValueSource::Cloud
        );

        store.apply_local(&id, &object(json!({ "Intensity": 12 })));
        let local = resolve(&store, &overrides, &id, Field::Intensity).unwrap();
        assert_eq!(local.value, json!(12));
        assert_eq!(local.source, ValueSource::Local);

        overrides.set(&id, Field::Intensity, json!(16));
        let over = resolve(&store, &overrides, &id, Field::Intensity).unwrap();
        assert_eq!(over.value, json!(16));
        assert_eq!(over.source, ValueSource::Override);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_local_falls_through_to_cloud() {
        let (store, overrides, id) = setup();
        store.apply_cloud(&id, &object(json!({ "intensity": 10 })));
        store.apply_local(&id, &object(json!({ "Intensity": 12 })));
        store.mark_local_stale(&id);

        let v = resolve(&store, &overrides, &id, Field::Intensity).unwrap();
        assert_eq!(v.value, json!(10));
        assert_eq!(v.source, ValueSource::Cloud);
    }

    #[tokio::test(start_paused = true)]
    async fn cloud_only_fields_ignore_local_view() {
        let (store, overrides, id) = setup();
        store.apply_cloud(&id, &object(json!({ "logo_led": 0 })));
        let v = resolve(&store, &overrides, &id, Field::LogoLed).unwrap();
        assert_eq!(v.value, json!(false));
        assert!(resolve(&store, &overrides, &id, Field::MaxPower).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn firmware_comes_from_secondary_cache() {
        let (store, overrides, id) = setup();
        assert!(resolve(&store, &overrides, &id, Field::FirmwareVersion).is_none());
        store.secondary().record(
            Some(&id),
            ResourceKind::FirmwareVersion,
            SecondaryValue::FirmwareVersion("2.1.7".into()),
        );
        let v = resolve(&store, &overrides, &id, Field::FirmwareVersion).unwrap();
        assert_eq!(v.value, json!("2.1.7"));
    }

    #[tokio::test(start_paused = true)]
    async fn device_state_reports_staleness() {
        let (store, overrides, id) = setup();
        store.apply_cloud(&id, &object(json!({ "intensity": 10, "connected": true })));
        store.mark_cloud_stale(&id);

        let state = device_state(&store, &overrides, &id).unwrap();
        assert!(state.cloud_stale);
        assert!(!state.local_stale);
        assert_eq!(state.values.len(), 2);
        assert!(device_state(&store, &overrides, &DeviceId::from("NOPE")).is_none());
    }
}
