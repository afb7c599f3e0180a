#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chargesync_api::{Error as ApiError, Pairing, RateLimitSnapshot, RfidCard};
use chargesync_core::{
    Coordinator, CoordinatorConfig, CoreError, DeviceId, Field, Health, LocalApi, CloudApi,
    Route, StaticDevice, ValueSource,
};
use pretty_assertions::assert_eq;
use serde_json::{Map, Value, json};

// ── Fakes ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fail {
    None,
    RateLimited,
    Timeout,
    Auth,
}

impl Fail {
    fn error(self) -> Option<ApiError> {
        match self {
            Self::None => None,
            Self::RateLimited => Some(ApiError::RateLimited {
                retry_after_secs: 0,
                snapshot: None,
            }),
            Self::Timeout => Some(ApiError::Timeout { timeout_secs: 10 }),
            Self::Auth => Some(ApiError::InvalidApiKey),
        }
    }
}

struct FakeCloud {
    status: Mutex<HashMap<String, Map<String, Value>>>,
    pairings: Mutex<Vec<Pairing>>,
    status_fail: Mutex<Fail>,
    command_fail: Mutex<Fail>,
    calls: Mutex<Vec<String>>,
}

impl FakeCloud {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            status: Mutex::new(HashMap::new()),
            pairings: Mutex::new(Vec::new()),
            status_fail: Mutex::new(Fail::None),
            command_fail: Mutex::new(Fail::None),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn set_status(&self, device: &str, value: Value) {
        self.status.lock().unwrap().insert(device.into(), object(value));
    }

    fn set_pairings(&self, ids: &[&str]) {
        *self.pairings.lock().unwrap() = ids
            .iter()
            .map(|id| Pairing {
                device_id: (*id).into(),
                tag: None,
                model: None,
                ip: None,
                extra: Map::new(),
            })
            .collect();
    }

    fn fail_status(&self, fail: Fail) {
        *self.status_fail.lock().unwrap() = fail;
    }

    fn fail_commands(&self, fail: Fail) {
        *self.command_fail.lock().unwrap() = fail;
    }

    fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn commands(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with("command:"))
            .cloned()
            .collect()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl CloudApi for FakeCloud {
    async fn pairings(&self) -> Result<Vec<Pairing>, ApiError> {
        self.record("pairings".into());
        Ok(self.pairings.lock().unwrap().clone())
    }

    async fn status(&self, device: &DeviceId) -> Result<Map<String, Value>, ApiError> {
        self.record(format!("status:{device}"));
        if let Some(e) = self.status_fail.lock().unwrap().error() {
            return Err(e);
        }
        Ok(self
            .status
            .lock()
            .unwrap()
            .get(device.as_str())
            .cloned()
            .unwrap_or_default())
    }

    async fn rfid_cards(&self, device: &DeviceId) -> Result<Vec<RfidCard>, ApiError> {
        self.record(format!("rfid:{device}"));
        Ok(Vec::new())
    }

    async fn firmware_version(&self, device: &DeviceId) -> Result<String, ApiError> {
        self.record(format!("version:{device}"));
        Ok("2.1.7".into())
    }

    async fn send_command(&self, device: &DeviceId, endpoint: &str, value: &str) -> Result<(), ApiError> {
        self.record(format!("command:{device}:{endpoint}={value}"));
        match self.command_fail.lock().unwrap().error() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn rate_limit(&self) -> Option<Arc<RateLimitSnapshot>> {
        None
    }
}

/// Answers every realtime request with a fixed payload. Writes are
/// recorded but do not change what the charger reports.
struct FakeLocal {
    realtime: Mutex<Map<String, Value>>,
    /// Number of upcoming realtime calls that time out.
    fail_next: Mutex<usize>,
    down: Mutex<bool>,
    /// How long each write takes to answer.
    write_delay: Mutex<Duration>,
    calls: Mutex<usize>,
    writes: Mutex<Vec<String>>,
}

impl FakeLocal {
    fn new(realtime: Value) -> Arc<Self> {
        Arc::new(Self {
            realtime: Mutex::new(object(realtime)),
            fail_next: Mutex::new(0),
            down: Mutex::new(false),
            write_delay: Mutex::new(Duration::ZERO),
            calls: Mutex::new(0),
            writes: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl LocalApi for FakeLocal {
    async fn realtime(&self, _addr: &str) -> Result<Map<String, Value>, ApiError> {
        *self.calls.lock().unwrap() += 1;
        let mut fail_next = self.fail_next.lock().unwrap();
        if *self.down.lock().unwrap() || *fail_next > 0 {
            *fail_next = fail_next.saturating_sub(1);
            return Err(ApiError::Timeout { timeout_secs: 10 });
        }
        Ok(self.realtime.lock().unwrap().clone())
    }

    async fn write(&self, addr: &str, keyword: &str, value: &str) -> Result<(), ApiError> {
        let delay = *self.write_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if *self.down.lock().unwrap() {
            return Err(ApiError::Timeout { timeout_secs: 10 });
        }
        self.writes.lock().unwrap().push(format!("{addr}:{keyword}={value}"));
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(m) => m,
        _ => Map::new(),
    }
}

fn static_config(devices: &[(&str, Option<&str>)]) -> CoordinatorConfig {
    let mut config = CoordinatorConfig::new("test-key".to_owned().into());
    config.devices = devices
        .iter()
        .map(|(id, addr)| StaticDevice {
            id: DeviceId::from(*id),
            label: None,
            address: addr.map(str::to_owned),
        })
        .collect();
    config
}

async fn setup(
    devices: &[(&str, Option<&str>)],
    cloud: &Arc<FakeCloud>,
    local: &Arc<FakeLocal>,
) -> Coordinator {
    let coordinator =
        Coordinator::with_transports(static_config(devices), cloud.clone(), local.clone());
    coordinator.start().await.unwrap();
    coordinator
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

fn id(s: &str) -> DeviceId {
    DeviceId::from(s)
}

// ── Budget ──────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn three_devices_poll_every_305_seconds() {
    let cloud = FakeCloud::new();
    let local = FakeLocal::new(json!({}));
    let coordinator = setup(&[("A", None), ("B", None), ("C", None)], &cloud, &local).await;

    assert_eq!(coordinator.interval(), Duration::from_secs(305));
    assert_eq!(cloud.count("status:"), 3);

    // Nothing more until the interval has elapsed.
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(cloud.count("status:"), 3);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(cloud.count("status:"), 6);

    let diag = coordinator.diagnostics().await;
    assert_eq!(diag.quota.devices, 3);
    assert_eq!(diag.quota.interval_secs, 305);
    assert!(diag.quota.estimated_daily_calls < 1000);

    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn adding_a_device_recomputes_the_interval() {
    let cloud = FakeCloud::new();
    let local = FakeLocal::new(json!({}));
    let coordinator = setup(&[("A", None), ("B", None)], &cloud, &local).await;
    assert_eq!(coordinator.interval(), Duration::from_secs(204));

    assert!(coordinator.add_device(chargesync_core::Device::new("C"), None).await);
    assert_eq!(coordinator.interval(), Duration::from_secs(305));

    assert!(coordinator.remove_device(&id("C")).await);
    assert_eq!(coordinator.interval(), Duration::from_secs(204));

    coordinator.shutdown().await;
}

// ── Optimistic writes ───────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn local_write_is_visible_for_the_override_window() {
    let cloud = FakeCloud::new();
    cloud.set_status("A", json!({ "intensity": 10 }));
    let local = FakeLocal::new(json!({ "Intensity": 10 }));
    let coordinator = setup(&[("A", Some("10.0.0.2"))], &cloud, &local).await;
    settle().await;

    let outcome = coordinator
        .execute(&id("A"), Field::Intensity, json!(16))
        .await
        .unwrap();
    assert_eq!(outcome.route, Route::Local);
    assert_eq!(local.writes.lock().unwrap().as_slice(), ["10.0.0.2:Intensity=16".to_owned()]);

    let read = coordinator.read(&id("A"), Field::Intensity).unwrap();
    assert_eq!(read.value, json!(16));
    assert_eq!(read.source, ValueSource::Override);

    // The charger still reports 10; the override masks it.
    tokio::time::sleep(Duration::from_secs(19)).await;
    assert_eq!(coordinator.get(&id("A"), Field::Intensity), Some(json!(16)));

    tokio::time::sleep(Duration::from_secs(2)).await;
    let read = coordinator.read(&id("A"), Field::Intensity).unwrap();
    assert_eq!(read.value, json!(10));
    assert_eq!(read.source, ValueSource::Local);

    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_cloud_write_leaves_no_override() {
    let cloud = FakeCloud::new();
    cloud.set_status("A", json!({ "logo_led": 0 }));
    let local = FakeLocal::new(json!({}));
    let coordinator = setup(&[("A", None)], &cloud, &local).await;

    cloud.fail_commands(Fail::Timeout);
    let err = coordinator
        .execute(&id("A"), Field::LogoLed, json!(true))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Transport { timeout: true, .. }));

    let read = coordinator.read(&id("A"), Field::LogoLed).unwrap();
    assert_eq!(read.value, json!(false));
    assert_eq!(read.source, ValueSource::Cloud);

    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_local_write_schedules_one_repoll() {
    let cloud = FakeCloud::new();
    cloud.set_status("A", json!({ "intensity": 10 }));
    let local = FakeLocal::new(json!({ "Intensity": 10 }));
    let coordinator = setup(&[("A", Some("10.0.0.2"))], &cloud, &local).await;
    settle().await;
    let polls = local.calls();

    *local.down.lock().unwrap() = true;
    let err = coordinator
        .execute(&id("A"), Field::Intensity, json!(16))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::LocalUnavailable { .. }));

    let read = coordinator.read(&id("A"), Field::Intensity).unwrap();
    assert_eq!(read.value, json!(10));
    assert_ne!(read.source, ValueSource::Override);

    tokio::time::sleep(Duration::from_millis(4_900)).await;
    assert_eq!(local.calls(), polls);

    // First attempt of the re-poll; its retry waits 1.5 s.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(local.calls(), polls + 1);

    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn slow_confirm_write_defers_one_refresh() {
    let cloud = FakeCloud::new();
    cloud.set_status("A", json!({ "logo_led": 0 }));
    let local = FakeLocal::new(json!({}));
    let coordinator = setup(&[("A", None)], &cloud, &local).await;
    assert_eq!(cloud.count("status:"), 1);

    coordinator
        .execute(&id("A"), Field::LogoLed, json!("on"))
        .await
        .unwrap();
    assert_eq!(cloud.commands(), vec!["command:A:logo_led=1".to_owned()]);

    tokio::time::sleep(Duration::from_secs(7)).await;
    assert_eq!(cloud.count("status:"), 1);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(cloud.count("status:"), 2);

    // The regular tick at 120 s is skipped once.
    tokio::time::sleep(Duration::from_secs(115)).await;
    assert_eq!(cloud.count("status:"), 2);
    tokio::time::sleep(Duration::from_secs(125)).await;
    assert_eq!(cloud.count("status:"), 3);

    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn local_field_without_address_writes_through_cloud() {
    let cloud = FakeCloud::new();
    let local = FakeLocal::new(json!({}));
    let coordinator = setup(&[("A", None)], &cloud, &local).await;
    let polls = cloud.count("status:");

    let outcome = coordinator
        .execute(&id("A"), Field::Paused, json!(true))
        .await
        .unwrap();
    assert_eq!(outcome.route, Route::Cloud);
    assert_eq!(cloud.commands(), vec!["command:A:pausecharge=1".to_owned()]);

    // No forced cloud refresh for a local-capable field.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(cloud.count("status:"), polls);

    let err = coordinator
        .execute(&id("A"), Field::ContractedPower, json!(4600))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::LocalUnavailable { .. }));

    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn invalid_writes_never_reach_a_transport() {
    let cloud = FakeCloud::new();
    let local = FakeLocal::new(json!({}));
    let coordinator = setup(&[("A", Some("10.0.0.2"))], &cloud, &local).await;

    let err = coordinator
        .execute(&id("A"), Field::Intensity, json!(100))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation { .. }));

    let err = coordinator
        .execute(&id("A"), Field::ChargePower, json!(1))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ReadOnlyField { .. }));

    let err = coordinator
        .execute(&id("NOPE"), Field::Intensity, json!(16))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::DeviceNotFound { .. }));

    assert!(local.writes.lock().unwrap().is_empty());
    assert!(cloud.commands().is_empty());
    coordinator.shutdown().await;
}

// ── Failure handling ────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn rate_limit_exhausts_until_next_interval() {
    let cloud = FakeCloud::new();
    cloud.set_status("A", json!({ "intensity": 10 }));
    let local = FakeLocal::new(json!({}));
    let coordinator = setup(&[("A", None)], &cloud, &local).await;
    assert_eq!(coordinator.interval(), Duration::from_secs(120));

    cloud.fail_status(Fail::RateLimited);

    // Cycle at 120 s: attempts at 120, 122 and 126, then give up.
    tokio::time::sleep(Duration::from_secs(130)).await;
    assert_eq!(cloud.count("status:"), 4);
    let diag = coordinator.diagnostics().await;
    assert_eq!(diag.cloud.health, Health::Exhausted);
    assert!(diag.devices[0].cloud_stale);
    assert_eq!(coordinator.get(&id("A"), Field::Intensity), Some(json!(10)));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(cloud.count("status:"), 4);

    cloud.fail_status(Fail::None);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(cloud.count("status:"), 5);
    let diag = coordinator.diagnostics().await;
    assert_eq!(diag.cloud.health, Health::Healthy);
    assert!(!diag.devices[0].cloud_stale);

    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn one_failing_device_does_not_block_others() {
    let cloud = FakeCloud::new();
    let local = FakeLocal::new(json!({}));
    let coordinator = setup(&[("A", None), ("B", None)], &cloud, &local).await;

    cloud.fail_status(Fail::Timeout);
    let report = coordinator.refresh_cloud().await.unwrap();
    assert_eq!(report.failed, 2);
    assert_eq!(report.rate_limited_secs, None);
    // Three attempts for each device.
    assert_eq!(cloud.count("status:"), 2 + 6);

    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn auth_failure_on_start_is_fatal() {
    let cloud = FakeCloud::new();
    cloud.fail_status(Fail::Auth);
    let local = FakeLocal::new(json!({}));
    let coordinator =
        Coordinator::with_transports(static_config(&[("A", None)]), cloud.clone(), local);

    let err = coordinator.start().await.unwrap_err();
    assert!(err.is_auth());
    // No retries on an auth failure.
    assert_eq!(cloud.count("status:"), 1);
    assert!(!coordinator.is_running());
}

#[tokio::test(start_paused = true)]
async fn auth_failure_while_running_is_reported_and_clears() {
    let cloud = FakeCloud::new();
    cloud.set_status("A", json!({ "intensity": 10 }));
    cloud.set_status("B", json!({ "intensity": 32 }));
    let local = FakeLocal::new(json!({}));
    let coordinator = setup(&[("A", None), ("B", None)], &cloud, &local).await;
    let interval = coordinator.interval();
    assert_eq!(coordinator.diagnostics().await.auth_error, None);

    cloud.fail_status(Fail::Auth);
    tokio::time::sleep(interval + Duration::from_secs(1)).await;
    assert!(coordinator.is_running());
    assert!(coordinator.diagnostics().await.auth_error.is_some());

    // Last known cloud values stay readable.
    let read = coordinator.read(&id("B"), Field::Intensity).unwrap();
    assert_eq!(read.value, json!(32));
    assert_eq!(read.source, ValueSource::Cloud);
    assert_eq!(coordinator.get(&id("A"), Field::Intensity), Some(json!(10)));

    cloud.fail_status(Fail::None);
    tokio::time::sleep(interval).await;
    assert_eq!(coordinator.diagnostics().await.auth_error, None);

    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn local_outage_falls_back_to_cloud_and_recovers() {
    let cloud = FakeCloud::new();
    cloud.set_status("A", json!({ "intensity": 10 }));
    let local = FakeLocal::new(json!({ "Intensity": 12 }));
    let coordinator = setup(&[("A", Some("10.0.0.2"))], &cloud, &local).await;
    settle().await;
    assert_eq!(
        coordinator.read(&id("A"), Field::Intensity).unwrap().source,
        ValueSource::Local
    );

    *local.down.lock().unwrap() = true;
    coordinator.refresh_local(&id("A")).await.unwrap_err();
    let read = coordinator.read(&id("A"), Field::Intensity).unwrap();
    assert_eq!(read.value, json!(10));
    assert_eq!(read.source, ValueSource::Cloud);
    assert!(coordinator.state(&id("A")).unwrap().local_stale);

    *local.down.lock().unwrap() = false;
    coordinator.refresh_local(&id("A")).await.unwrap();
    assert_eq!(
        coordinator.read(&id("A"), Field::Intensity).unwrap().source,
        ValueSource::Local
    );

    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn two_local_timeouts_then_success() {
    let cloud = FakeCloud::new();
    let local = FakeLocal::new(json!({ "Intensity": 12 }));
    *local.fail_next.lock().unwrap() = 2;
    let coordinator = setup(&[("A", Some("10.0.0.2"))], &cloud, &local).await;

    // First attempt fails at once; the retry waits 1.5 s.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(coordinator.state(&id("A")).unwrap().local_stale);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(local.calls(), 3);
    assert!(!coordinator.state(&id("A")).unwrap().local_stale);
    assert_eq!(coordinator.get(&id("A"), Field::Intensity), Some(json!(12)));

    coordinator.shutdown().await;
}

// ── Device lifecycle ────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn removing_a_device_purges_its_state() {
    let cloud = FakeCloud::new();
    cloud.set_status("A", json!({ "intensity": 10 }));
    let local = FakeLocal::new(json!({ "Intensity": 10 }));
    let coordinator = setup(&[("A", Some("10.0.0.2"))], &cloud, &local).await;

    coordinator
        .execute(&id("A"), Field::Intensity, json!(16))
        .await
        .unwrap();
    assert!(coordinator.remove_device(&id("A")).await);

    assert_eq!(coordinator.get(&id("A"), Field::Intensity), None);
    assert!(matches!(
        coordinator.state(&id("A")),
        Err(CoreError::DeviceNotFound { .. })
    ));
    assert!(coordinator.list_devices().is_empty());
    assert!(coordinator.diagnostics().await.devices.is_empty());
    assert!(!coordinator.remove_device(&id("A")).await);

    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn write_in_flight_during_removal_is_discarded() {
    let cloud = FakeCloud::new();
    let local = FakeLocal::new(json!({ "Intensity": 10 }));
    let coordinator = setup(&[("A", Some("10.0.0.2"))], &cloud, &local).await;
    settle().await;
    *local.write_delay.lock().unwrap() = Duration::from_secs(1);

    let writer = coordinator.clone();
    let write = tokio::spawn(async move {
        writer.execute(&id("A"), Field::Intensity, json!(16)).await
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(coordinator.remove_device(&id("A")).await);

    let err = write.await.unwrap().unwrap_err();
    assert!(matches!(err, CoreError::DeviceNotFound { .. }));
    assert_eq!(coordinator.get(&id("A"), Field::Intensity), None);
    assert!(coordinator.list_devices().is_empty());

    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn discovery_follows_pairings() {
    let cloud = FakeCloud::new();
    cloud.set_pairings(&["A", "B"]);
    let local = FakeLocal::new(json!({}));
    let coordinator = Coordinator::with_transports(
        CoordinatorConfig::new("test-key".to_owned().into()),
        cloud.clone(),
        local.clone(),
    );
    coordinator.start().await.unwrap();

    let ids: Vec<String> = coordinator
        .list_devices()
        .iter()
        .map(|d| d.id.to_string())
        .collect();
    assert_eq!(ids, vec!["A".to_owned(), "B".to_owned()]);
    assert_eq!(coordinator.get(&id("A"), Field::FirmwareVersion), Some(json!("2.1.7")));

    // Pairings are re-listed hourly.
    cloud.set_pairings(&["B"]);
    tokio::time::sleep(Duration::from_secs(3700)).await;
    let ids: Vec<String> = coordinator
        .list_devices()
        .iter()
        .map(|d| d.id.to_string())
        .collect();
    assert_eq!(ids, vec!["B".to_owned()]);
    assert_eq!(cloud.count("pairings"), 2);

    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn address_update_reconnects_local_poller() {
    let cloud = FakeCloud::new();
    let local = FakeLocal::new(json!({ "Intensity": 12 }));
    let coordinator = setup(&[("A", None)], &cloud, &local).await;
    settle().await;
    assert_eq!(local.calls(), 0);

    assert!(coordinator.update_address(&id("A"), "10.0.0.3").await.unwrap());
    settle().await;
    assert_eq!(local.calls(), 1);
    assert_eq!(coordinator.state(&id("A")).unwrap().address.as_deref(), Some("10.0.0.3"));

    assert!(!coordinator.update_address(&id("A"), "10.0.0.3").await.unwrap());
    assert!(coordinator.update_address(&id("Z"), "10.0.0.4").await.is_err());

    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn execute_after_shutdown_is_rejected() {
    let cloud = FakeCloud::new();
    let local = FakeLocal::new(json!({}));
    let coordinator = setup(&[("A", None)], &cloud, &local).await;
    coordinator.shutdown().await;

    let err = coordinator
        .execute(&id("A"), Field::LogoLed, json!(true))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::CoordinatorStopped));
}
