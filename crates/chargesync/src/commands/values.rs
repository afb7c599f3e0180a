//! `chargesync get`, `state` and `set`.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tabled::Tabled;

use chargesync_core::{Coordinator, DeviceId, DeviceState, Field, Route, ValueSource, WriteOutcome};

use crate::cli::{GetArgs, GlobalOpts, SetArgs, StateArgs};
use crate::error::CliError;
use crate::output;

// ── get ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct Reading {
    device: DeviceId,
    field: Field,
    value: Option<Value>,
    source: Option<ValueSource>,
}

pub async fn get(args: GetArgs, coordinator: &Coordinator, global: &GlobalOpts) -> Result<(), CliError> {
    let device = DeviceId::from(args.device.as_str());
    let field = Field::parse(&args.field)?;

    super::start(coordinator).await?;
    super::require_device(coordinator, &device)?;
    if !args.cloud_only && field.spec().route == Route::Local {
        super::poll_local(coordinator, &device).await;
    }

    let resolved = coordinator.read(&device, field);
    let reading = Reading {
        device,
        field,
        value: resolved.as_ref().map(|r| r.value.clone()),
        source: resolved.map(|r| r.source),
    };

    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        &reading,
        |r| match (&r.value, r.source) {
            (Some(v), Some(source)) => format!(
                "{} = {} ({})",
                r.field,
                output::cell(v),
                output::source_label(source, color)
            ),
            _ => format!("{} has no value yet", r.field),
        },
        |r| r.value.as_ref().map_or_else(String::new, output::cell),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── state ────────────────────────────────────────────────────────────

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Field")]
    field: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Source")]
    source: String,
}

pub async fn state(
    args: StateArgs,
    coordinator: &Coordinator,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let device = DeviceId::from(args.device.as_str());

    super::start(coordinator).await?;
    super::require_device(coordinator, &device)?;
    if !args.cloud_only {
        super::poll_local(coordinator, &device).await;
    }

    let state = coordinator.state(&device)?;
    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        &state,
        |s| state_detail(s, color),
        |s| {
            s.values
                .iter()
                .map(|(field, r)| format!("{field}={}", output::cell(&r.value)))
                .collect::<Vec<_>>()
                .join("\n")
        },
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

fn state_detail(s: &DeviceState, color: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} ({})", s.device.label, s.device.id);
    if let Some(ref model) = s.device.model {
        let _ = writeln!(out, "Model:    {model}");
    }
    let _ = writeln!(
        out,
        "Address:  {}",
        s.address.as_deref().unwrap_or("unresolved")
    );
    let _ = writeln!(
        out,
        "Cloud:    {} (updated {})",
        output::freshness(s.cloud_stale, color),
        updated(s.cloud_updated_at)
    );
    let _ = writeln!(
        out,
        "LAN:      {} (updated {})",
        output::freshness(s.local_stale, color),
        updated(s.local_updated_at)
    );

    let rows: Vec<FieldRow> = s
        .values
        .iter()
        .map(|(field, r)| FieldRow {
            field: field.to_string(),
            value: output::cell(&r.value),
            source: output::source_label(r.source, color),
        })
        .collect();
    out.push_str(&output::render_table(&rows));
    out
}

fn updated(at: Option<DateTime<Utc>>) -> String {
    at.map_or_else(
        || "never".into(),
        |t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

// ── set ──────────────────────────────────────────────────────────────

/// Interpret a command-line value: JSON literals as such, anything else
/// as a string (so `on`, `yes` reach the boolean coercion).
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()))
}

pub async fn set(args: SetArgs, coordinator: &Coordinator, global: &GlobalOpts) -> Result<(), CliError> {
    let device = DeviceId::from(args.device.as_str());
    let field = Field::parse(&args.field)?;
    let value = parse_value(&args.value);
    // Reject bad input before the first cloud call.
    field.coerce(&value)?;

    super::start(coordinator).await?;
    let outcome = coordinator.execute(&device, field, value).await?;

    let slow = coordinator.config().is_slow_confirm(field);
    let out = output::render_single(
        &global.output,
        &outcome,
        |o| set_detail(o, slow),
        |o| output::cell(&o.value),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

fn set_detail(o: &WriteOutcome, slow: bool) -> String {
    let mut out = format!(
        "{} = {} on {} via {} (shown for {}s until confirmed)",
        o.field,
        output::cell(&o.value),
        o.device,
        o.route,
        o.override_expires_in.as_secs()
    );
    if slow {
        out.push_str("\nThe cloud reports this field late; the next status poll is delayed.");
    }
    out
}
