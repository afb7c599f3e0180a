//! `chargesync watch`: stream value changes until Ctrl-C.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use chargesync_core::{Coordinator, DeviceId, Field, ValueSource};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

#[derive(Debug, Clone, PartialEq, Serialize)]
struct Change {
    at: DateTime<Utc>,
    device: DeviceId,
    field: Field,
    value: Value,
    source: ValueSource,
}

type Seen = HashMap<(DeviceId, Field), (Value, ValueSource)>;

pub async fn handle(
    args: WatchArgs,
    coordinator: &Coordinator,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let device = args.device.as_deref().map(DeviceId::from);
    let fields = args
        .fields
        .iter()
        .map(|f| Field::parse(f))
        .collect::<Result<Vec<_>, _>>()?;

    let mut rx = coordinator.subscribe();
    super::start(coordinator).await?;
    if let Some(ref id) = device {
        super::require_device(coordinator, id)?;
    }
    info!(interval_secs = coordinator.interval().as_secs(), "watching for changes");

    let color = output::should_color(&global.color);
    let mut seen = Seen::new();
    emit(&diff(coordinator, device.as_ref(), &fields, &mut seen), global, color);

    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);
    loop {
        tokio::select! {
            biased;
            _ = &mut interrupt => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let changes = diff(coordinator, device.as_ref(), &fields, &mut seen);
                emit(&changes, global, color);
            }
        }
    }
    Ok(())
}

/// Values that differ from what was last printed. Updates `seen`.
fn diff(
    coordinator: &Coordinator,
    only: Option<&DeviceId>,
    fields: &[Field],
    seen: &mut Seen,
) -> Vec<Change> {
    let now = Utc::now();
    let mut changes = Vec::new();
    for device in coordinator.list_devices().iter() {
        if only.is_some_and(|id| *id != device.id) {
            continue;
        }
        let Ok(state) = coordinator.state(&device.id) else {
            continue;
        };
        for (field, resolved) in state.values {
            if !fields.is_empty() && !fields.contains(&field) {
                continue;
            }
            let current = (resolved.value, resolved.source);
            let key = (device.id.clone(), field);
            if seen.get(&key) == Some(&current) {
                continue;
            }
            changes.push(Change {
                at: now,
                device: device.id.clone(),
                field,
                value: current.0.clone(),
                source: current.1,
            });
            seen.insert(key, current);
        }
    }
    changes
}

fn emit(changes: &[Change], global: &GlobalOpts, color: bool) {
    if changes.is_empty() {
        return;
    }
    let lines: Vec<String> = changes
        .iter()
        .map(|c| match global.output {
            OutputFormat::Table | OutputFormat::Plain => format!(
                "{} {} {} = {} ({})",
                c.at.format("%H:%M:%S"),
                c.device,
                c.field,
                output::cell(&c.value),
                output::source_label(c.source, color)
            ),
            OutputFormat::Json | OutputFormat::JsonCompact | OutputFormat::Yaml => {
                output::render_json_compact(c)
            }
        })
        .collect();
    output::print_output(&lines.join("\n"), global.quiet);
}
