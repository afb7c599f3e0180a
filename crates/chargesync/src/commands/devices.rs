//! `chargesync devices`

use serde::Serialize;
use serde_json::Value;
use tabled::Tabled;

use chargesync_core::{Coordinator, DeviceState, Field};

use crate::cli::{DevicesArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct DeviceSummary {
    id: String,
    label: String,
    model: Option<String>,
    address: Option<String>,
    charge_state: Option<Value>,
    intensity: Option<Value>,
    cloud_stale: bool,
    local_stale: bool,
}

impl From<&DeviceState> for DeviceSummary {
    fn from(s: &DeviceState) -> Self {
        let value = |f: Field| s.values.get(&f).map(|r| r.value.clone());
        Self {
            id: s.device.id.to_string(),
            label: s.device.label.clone(),
            model: s.device.model.clone(),
            address: s.address.clone(),
            charge_state: value(Field::ChargeState),
            intensity: value(Field::Intensity),
            cloud_stale: s.cloud_stale,
            local_stale: s.local_stale,
        }
    }
}

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "State")]
    charge_state: String,
    #[tabled(rename = "Amps")]
    intensity: String,
    #[tabled(rename = "Cloud")]
    cloud: String,
    #[tabled(rename = "LAN")]
    local: String,
}

pub async fn handle(
    args: DevicesArgs,
    coordinator: &Coordinator,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    super::start(coordinator).await?;

    let devices = coordinator.list_devices();
    if args.local {
        for device in devices.iter() {
            super::poll_local(coordinator, &device.id).await;
        }
    }

    let summaries: Vec<DeviceSummary> = devices
        .iter()
        .filter_map(|d| coordinator.state(&d.id).ok())
        .map(|s| DeviceSummary::from(&s))
        .collect();

    let color = output::should_color(&global.color);
    let dash = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".into());
    let cell = |v: &Option<Value>| v.as_ref().map_or_else(|| "-".into(), output::cell);

    let out = output::render_list(
        &global.output,
        &summaries,
        |s| DeviceRow {
            id: s.id.clone(),
            label: s.label.clone(),
            model: dash(&s.model),
            address: dash(&s.address),
            charge_state: cell(&s.charge_state),
            intensity: cell(&s.intensity),
            cloud: output::freshness(s.cloud_stale, color),
            local: output::freshness(s.local_stale, color),
        },
        |s| s.id.clone(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}
