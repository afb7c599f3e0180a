//! `chargesync fields`: the static field table.

use serde::Serialize;
use tabled::Tabled;

use chargesync_core::model::field::{CURRENT_MAX_A, CURRENT_MIN_A};
use chargesync_core::{CloudWrite, Field, Route, ValueKind};

use crate::cli::GlobalOpts;
use crate::output;

#[derive(Debug, Serialize)]
struct FieldInfo {
    field: Field,
    route: Route,
    local_key: Option<&'static str>,
    cloud_write: Option<String>,
    writable: bool,
    accepts: String,
}

impl From<Field> for FieldInfo {
    fn from(field: Field) -> Self {
        let spec = field.spec();
        Self {
            field,
            route: spec.route,
            local_key: spec.local_key,
            cloud_write: spec.cloud_write.map(|w| match w {
                CloudWrite::Endpoint(e) => e.to_owned(),
                CloudWrite::Toggle { on, off } => format!("{on} / {off}"),
            }),
            writable: spec.writable,
            accepts: accepts(spec.kind),
        }
    }
}

fn accepts(kind: ValueKind) -> String {
    match kind {
        ValueKind::Bool => "true/false, on/off, yes/no, 1/0".into(),
        ValueKind::Amps => format!("amps {CURRENT_MIN_A}..={CURRENT_MAX_A}"),
        ValueKind::Int { min, max } => format!("integer {min}..={max}"),
        ValueKind::Quantity => "number >= 0".into(),
        ValueKind::Text => "text".into(),
    }
}

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Field")]
    field: String,
    #[tabled(rename = "Route")]
    route: String,
    #[tabled(rename = "LAN key")]
    local_key: String,
    #[tabled(rename = "Cloud write")]
    cloud_write: String,
    #[tabled(rename = "Writable")]
    writable: String,
    #[tabled(rename = "Accepts")]
    accepts: String,
}

pub fn handle(global: &GlobalOpts) {
    let infos: Vec<FieldInfo> = Field::all().map(FieldInfo::from).collect();
    let out = output::render_list(
        &global.output,
        &infos,
        |f| FieldRow {
            field: f.field.to_string(),
            route: f.route.to_string(),
            local_key: f.local_key.unwrap_or("-").to_owned(),
            cloud_write: f.cloud_write.clone().unwrap_or_else(|| "-".into()),
            writable: if f.writable { "yes".into() } else { "no".into() },
            accepts: if f.writable { f.accepts.clone() } else { "-".into() },
        },
        |f| f.field.to_string(),
    );
    output::print_output(&out, global.quiet);
}
