// chargesync-api: async clients for the V2C cloud API and the charger's local HTTP API

pub mod cloud;
pub mod error;
pub mod local;
pub mod ratelimit;
pub mod transport;

pub use cloud::{CloudClient, Pairing, RfidCard};
pub use error::Error;
pub use local::LocalClient;
pub use ratelimit::RateLimitSnapshot;
pub use transport::TransportConfig;
