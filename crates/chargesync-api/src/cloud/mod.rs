// Cloud API surface: client and wire types.

mod client;
pub mod models;

pub use client::{CloudClient, DEFAULT_BASE_URL};
pub use models::{FirmwareVersion, Pairing, RfidCard};
