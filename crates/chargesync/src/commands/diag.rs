//! `chargesync diag`

use std::fmt::Write as _;
use std::time::Duration;

use tabled::Tabled;

use chargesync_core::{BackoffSnapshot, Coordinator, DeviceDiagnostics, Diagnostics};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Cloud")]
    cloud: String,
    #[tabled(rename = "LAN")]
    local: String,
    #[tabled(rename = "LAN poller")]
    poller: String,
    #[tabled(rename = "Overrides")]
    overrides: String,
    #[tabled(rename = "Secondary")]
    secondary: String,
}

pub async fn handle(coordinator: &Coordinator, global: &GlobalOpts) -> Result<(), CliError> {
    super::start(coordinator).await?;
    let diag = coordinator.diagnostics().await;

    let color = output::should_color(&global.color);
    let out = output::render_single(&global.output, &diag, |d| detail(d, color), plain);
    output::print_output(&out, global.quiet);
    Ok(())
}

fn detail(d: &Diagnostics, color: bool) -> String {
    let mut out = String::new();
    let q = &d.quota;
    let _ = writeln!(
        out,
        "Cloud poller:   {}",
        backoff_summary(&d.cloud, color)
    );
    if let Some(ref auth) = d.auth_error {
        let _ = writeln!(out, "Auth error:     {auth}");
    }
    let _ = writeln!(
        out,
        "Interval:       {} (raw {}) for {} device(s)",
        human(q.interval_secs),
        human(q.raw_interval_secs),
        q.devices
    );
    let _ = writeln!(
        out,
        "Daily calls:    ~{} estimated, budget {}, {} held in reserve",
        q.estimated_daily_calls, q.daily_budget, q.reserved_headroom
    );
    if let Some(ref rl) = d.rate_limit {
        let known = |v: Option<u64>| v.map_or_else(|| "?".into(), |n| n.to_string());
        let _ = writeln!(
            out,
            "Cloud quota:    {} of {} left, resets in {}",
            known(rl.remaining),
            known(rl.limit),
            rl.reset_secs.map_or_else(|| "?".into(), human)
        );
    }

    let rows: Vec<DeviceRow> = d.devices.iter().map(|dev| device_row(dev, color)).collect();
    if !rows.is_empty() {
        out.push_str(&output::render_table(&rows));
    }
    out
}

fn device_row(d: &DeviceDiagnostics, color: bool) -> DeviceRow {
    DeviceRow {
        id: d.id.to_string(),
        address: d.address.clone().unwrap_or_else(|| "-".into()),
        cloud: output::freshness(d.cloud_stale, color),
        local: output::freshness(d.local_stale, color),
        poller: d
            .local
            .as_ref()
            .map_or_else(|| "stopped".into(), |s| backoff_summary(s, color)),
        overrides: d
            .overrides
            .iter()
            .map(|o| format!("{}={} ({}s)", o.field, output::cell(&o.value), o.remaining_secs))
            .collect::<Vec<_>>()
            .join(", "),
        secondary: d
            .secondary
            .iter()
            .map(|s| format!("{} due in {}", s.kind, human(s.due_in_secs)))
            .collect::<Vec<_>>()
            .join(", "),
    }
}

fn backoff_summary(s: &BackoffSnapshot, color: bool) -> String {
    let mut out = output::health_label(s.health, color);
    if let Some(class) = s.last_error {
        let _ = write!(out, ", last error {class}");
    }
    if let Some(retry) = s.retry_in {
        let _ = write!(out, ", retry in {}", human(retry.as_secs()));
    }
    out
}

fn human(secs: u64) -> String {
    humantime::format_duration(Duration::from_secs(secs)).to_string()
}

fn plain(d: &Diagnostics) -> String {
    let mut out = format!(
        "cloud={}\ninterval_secs={}\nestimated_daily_calls={}",
        d.cloud.health, d.quota.interval_secs, d.quota.estimated_daily_calls
    );
    for dev in &d.devices {
        let _ = write!(
            out,
            "\n{} cloud_stale={} local_stale={}",
            dev.id, dev.cloud_stale, dev.local_stale
        );
    }
    out
}
