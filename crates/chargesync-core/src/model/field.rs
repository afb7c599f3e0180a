// ── Field classification table ──
//
// Every consumer-visible field is classified once, statically: which
// transport owns it, what it is called on each API, how it is written,
// and what values it accepts. The dispatcher and the merge layer are
// lookups into this table.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use strum::IntoEnumIterator;

use crate::error::CoreError;

/// Allowed charging current range, amps.
pub const CURRENT_MIN_A: i64 = 6;
pub const CURRENT_MAX_A: i64 = 80;

/// A consumer-visible charger field.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Field {
    Intensity,
    MinIntensity,
    MaxIntensity,
    Dynamic,
    DynamicPowerMode,
    Locked,
    Paused,
    ContractedPower,
    ChargeState,
    ChargePower,
    ChargeEnergy,
    ChargeTime,
    HousePower,
    SolarPower,
    SlaveError,
    LogoLed,
    RfidReader,
    MaxPower,
    InstallationMaxPower,
    Connected,
    FirmwareVersion,
}

/// Which transport owns a field's reads and preferred writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Route {
    /// Readable from the charger's LAN endpoint; cloud is the fallback.
    Local,
    /// Only the cloud knows this field.
    Cloud,
}

/// Accepted value shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Bool,
    /// Whole amps within the charger's current range.
    Amps,
    /// Whole number within an inclusive range.
    Int { min: i64, max: i64 },
    /// Non-negative power or energy figure.
    Quantity,
    Text,
}

/// How a field is written through the cloud.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudWrite {
    /// `POST device/<endpoint>?value=`
    Endpoint(&'static str),
    /// Two value-less command endpoints, chosen by the boolean value.
    Toggle {
        on: &'static str,
        off: &'static str,
    },
}

impl CloudWrite {
    /// Endpoint for writing `value` (already coerced).
    pub fn endpoint(&self, value: &Value) -> &'static str {
        match self {
            Self::Endpoint(e) => e,
            Self::Toggle { on, off } => {
                if value.as_bool().unwrap_or(false) {
                    on
                } else {
                    off
                }
            }
        }
    }
}

/// Static description of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub field: Field,
    pub route: Route,
    /// Keyword on the local realtime/write API.
    pub local_key: Option<&'static str>,
    /// Lowercased keys that may carry this field in the cloud status.
    pub cloud_keys: &'static [&'static str],
    pub cloud_write: Option<CloudWrite>,
    pub writable: bool,
    pub kind: ValueKind,
}

const fn local(
    field: Field,
    key: &'static str,
    cloud_keys: &'static [&'static str],
    cloud_write: Option<CloudWrite>,
    writable: bool,
    kind: ValueKind,
) -> FieldSpec {
    FieldSpec {
        field,
        route: Route::Local,
        local_key: Some(key),
        cloud_keys,
        cloud_write,
        writable,
        kind,
    }
}

const fn cloud(
    field: Field,
    cloud_keys: &'static [&'static str],
    cloud_write: Option<CloudWrite>,
    kind: ValueKind,
) -> FieldSpec {
    FieldSpec {
        field,
        route: Route::Cloud,
        local_key: None,
        cloud_keys,
        writable: cloud_write.is_some(),
        cloud_write,
        kind,
    }
}

impl Field {
    /// Look up the static classification of this field.
    #[allow(clippy::too_many_lines)]
    pub const fn spec(self) -> FieldSpec {
        use CloudWrite::{Endpoint, Toggle};
        use ValueKind::{Amps, Bool, Int, Quantity, Text};

        match self {
            Self::Intensity => local(
                self,
                "Intensity",
                &["intensity", "currentintensity", "current_int", "current_intensity", "car_intensity"],
                Some(Endpoint("intensity")),
                true,
                Amps,
            ),
            Self::MinIntensity => local(
                self,
                "MinIntensity",
                &["mincarint", "min_intensity", "mincarintensity", "min_car_int"],
                Some(Endpoint("min_car_intensity")),
                true,
                Amps,
            ),
            Self::MaxIntensity => local(
                self,
                "MaxIntensity",
                &["maxcarint", "max_intensity", "maxcarintensity", "max_car_int"],
                Some(Endpoint("max_car_intensity")),
                true,
                Amps,
            ),
            Self::Dynamic => local(self, "Dynamic", &["dynamic"], Some(Endpoint("dynamic")), true, Bool),
            Self::DynamicPowerMode => local(
                self,
                "DynamicPowerMode",
                &["dynamicpowermode", "dynamic_power_mode"],
                Some(Endpoint("dynamic_power_mode")),
                true,
                Int { min: 0, max: 7 },
            ),
            Self::Locked => local(self, "Locked", &["locked"], Some(Endpoint("locked")), true, Bool),
            Self::Paused => local(
                self,
                "Paused",
                &["paused"],
                Some(Toggle {
                    on: "pausecharge",
                    off: "startcharge",
                }),
                true,
                Bool,
            ),
            Self::ContractedPower => local(
                self,
                "ContractedPower",
                &["contractedpower", "contracted_power"],
                None,
                true,
                Quantity,
            ),
            Self::ChargeState => local(
                self,
                "ChargeState",
                &["chargestate", "charge_state"],
                None,
                false,
                Int { min: 0, max: i64::MAX },
            ),
            Self::ChargePower => local(self, "ChargePower", &["chargepower", "charge_power"], None, false, Quantity),
            Self::ChargeEnergy => local(self, "ChargeEnergy", &["chargeenergy", "charge_energy"], None, false, Quantity),
            Self::ChargeTime => local(self, "ChargeTime", &["chargetime", "charge_time"], None, false, Quantity),
            Self::HousePower => local(self, "HousePower", &["housepower", "house_power"], None, false, Quantity),
            Self::SolarPower => local(self, "FVPower", &["fvpower", "fv_power"], None, false, Quantity),
            Self::SlaveError => local(
                self,
                "SlaveError",
                &["slaveerror", "slave_error"],
                None,
                false,
                Int { min: 0, max: i64::MAX },
            ),
            Self::LogoLed => cloud(self, &["logo_led", "logoled"], Some(Endpoint("logo_led")), Bool),
            Self::RfidReader => cloud(self, &["set_rfid", "rfid_enabled", "rfid"], Some(Endpoint("set_rfid")), Bool),
            Self::MaxPower => cloud(self, &["maxpower", "max_power"], Some(Endpoint("maxpower")), Quantity),
            Self::InstallationMaxPower => cloud(self, &["maxpowerinstallation"], None, Quantity),
            Self::Connected => cloud(self, &["connected"], None, Bool),
            Self::FirmwareVersion => cloud(self, &[], None, Text),
        }
    }

    /// Parse a field name, case-insensitively.
    pub fn parse(name: &str) -> Result<Self, CoreError> {
        name.trim()
            .parse::<Self>()
            .map_err(|_| CoreError::UnknownField {
                name: name.to_owned(),
            })
    }

    pub fn all() -> impl Iterator<Item = Self> {
        Self::iter()
    }

    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Validate and normalize a value a consumer wants to write.
    pub fn coerce(self, input: &Value) -> Result<Value, CoreError> {
        let spec = self.spec();
        if !spec.writable {
            return Err(CoreError::ReadOnlyField {
                field: self.to_string(),
            });
        }
        spec.kind.coerce(input).map_err(|message| CoreError::Validation {
            field: self.to_string(),
            message,
        })
    }
}

// ── Value handling ──────────────────────────────────────────────────

impl ValueKind {
    /// Normalize a value read from either API. Returns `None` for values
    /// that cannot represent this kind.
    pub fn normalize(self, raw: &Value) -> Option<Value> {
        match self {
            Self::Bool => parse_bool(raw).map(Value::Bool),
            Self::Amps | Self::Int { .. } => as_integer(raw).map(Value::from),
            Self::Quantity => as_number(raw).map(Value::Number),
            Self::Text => match raw {
                Value::String(s) => Some(Value::String(s.clone())),
                Value::Number(n) => Some(Value::String(n.to_string())),
                _ => None,
            },
        }
    }

    /// Strict validation for writes.
    pub fn coerce(self, input: &Value) -> Result<Value, String> {
        match self {
            Self::Bool => parse_bool(input)
                .map(Value::Bool)
                .ok_or_else(|| format!("expected a boolean, got {input}")),
            Self::Amps => int_in_range(input, CURRENT_MIN_A, CURRENT_MAX_A),
            Self::Int { min, max } => int_in_range(input, min, max),
            Self::Quantity => {
                let n = as_number(input).ok_or_else(|| format!("expected a number, got {input}"))?;
                if n.as_f64().is_some_and(|f| f >= 0.0) {
                    Ok(Value::Number(n))
                } else {
                    Err(format!("must not be negative, got {n}"))
                }
            }
            Self::Text => Err("text fields cannot be written".into()),
        }
    }
}

/// Render a coerced value for a query string. Booleans go out as `1`/`0`.
pub fn wire_value(value: &Value) -> String {
    match value {
        Value::Bool(b) => String::from(if *b { "1" } else { "0" }),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn int_in_range(input: &Value, min: i64, max: i64) -> Result<Value, String> {
    let n = as_integer(input).ok_or_else(|| format!("expected a whole number, got {input}"))?;
    if (min..=max).contains(&n) {
        Ok(Value::from(n))
    } else {
        Err(format!("{n} is outside {min}..={max}"))
    }
}

fn parse_bool(raw: &Value) -> Option<bool> {
    match raw {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "on" | "yes" => Some(true),
            "false" | "0" | "off" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn as_number(raw: &Value) -> Option<Number> {
    match raw {
        Value::Number(n) => Some(n.clone()),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .map(Number::from)
                .or_else(|| s.parse::<f64>().ok().and_then(Number::from_f64))
        }
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
fn as_integer(raw: &Value) -> Option<i64> {
    let n = as_number(raw)?;
    n.as_i64().or_else(|| {
        n.as_f64()
            .filter(|f| f.fract() == 0.0 && f.is_finite())
            .map(|f| f as i64)
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn every_field_has_a_source() {
        for field in Field::all() {
            let spec = field.spec();
            assert_eq!(spec.field, field);
            match spec.route {
                Route::Local => assert!(spec.local_key.is_some(), "{field} lacks a local key"),
                Route::Cloud => assert!(spec.local_key.is_none()),
            }
            if spec.writable && spec.route == Route::Cloud {
                assert!(spec.cloud_write.is_some(), "{field} has no write path");
            }
        }
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(Field::parse("Logo_LED").unwrap(), Field::LogoLed);
        assert_eq!(Field::parse("solar_power").unwrap(), Field::SolarPower);
        assert!(matches!(
            Field::parse("colour"),
            Err(CoreError::UnknownField { .. })
        ));
    }

    #[test]
    fn intensity_is_range_checked() {
        assert_eq!(Field::Intensity.coerce(&json!("16")).unwrap(), json!(16));
        assert_eq!(Field::Intensity.coerce(&json!(32.0)).unwrap(), json!(32));
        assert!(Field::Intensity.coerce(&json!(5)).is_err());
        assert!(Field::Intensity.coerce(&json!(81)).is_err());
        assert!(Field::Intensity.coerce(&json!(16.5)).is_err());
    }

    #[test]
    fn booleans_accept_common_spellings() {
        for on in [json!(true), json!(1), json!("on"), json!("YES")] {
            assert_eq!(Field::Locked.coerce(&on).unwrap(), json!(true));
        }
        for off in [json!(false), json!(0), json!("off"), json!("no")] {
            assert_eq!(Field::Locked.coerce(&off).unwrap(), json!(false));
        }
        assert!(Field::Locked.coerce(&json!("maybe")).is_err());
    }

    #[test]
    fn read_only_fields_reject_writes() {
        assert!(matches!(
            Field::ChargePower.coerce(&json!(1000)),
            Err(CoreError::ReadOnlyField { .. })
        ));
        assert!(matches!(
            Field::FirmwareVersion.coerce(&json!("2.0")),
            Err(CoreError::ReadOnlyField { .. })
        ));
    }

    #[test]
    fn dynamic_power_mode_bounds() {
        assert!(Field::DynamicPowerMode.coerce(&json!(7)).is_ok());
        assert!(Field::DynamicPowerMode.coerce(&json!(8)).is_err());
    }

    #[test]
    fn pause_toggle_picks_endpoint() {
        let write = Field::Paused.spec().cloud_write.unwrap();
        assert_eq!(write.endpoint(&json!(true)), "pausecharge");
        assert_eq!(write.endpoint(&json!(false)), "startcharge");
    }

    #[test]
    fn wire_values() {
        assert_eq!(wire_value(&json!(true)), "1");
        assert_eq!(wire_value(&json!(false)), "0");
        assert_eq!(wire_value(&json!(16)), "16");
        assert_eq!(wire_value(&json!(7400.5)), "7400.5");
    }

    #[test]
    fn normalize_cloud_values() {
        assert_eq!(ValueKind::Bool.normalize(&json!(1)), Some(json!(true)));
        assert_eq!(ValueKind::Amps.normalize(&json!("16")), Some(json!(16)));
        assert_eq!(ValueKind::Quantity.normalize(&json!(null)), None);
    }
}
