// ── Domain model ──

pub mod device;
pub mod field;

pub use device::{Device, DeviceId};
pub use field::{CloudWrite, Field, FieldSpec, Route, ValueKind};
