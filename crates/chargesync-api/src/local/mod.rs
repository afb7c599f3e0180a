// Local (LAN) API surface exposed by the charger itself.

mod client;

pub use client::LocalClient;
