// ── Transport seams ──
//
// The pollers and the dispatcher talk to the two APIs only through
// these traits. Production wires in `chargesync_api` clients; tests
// substitute in-memory fakes.

use std::sync::Arc;

use async_trait::async_trait;
use chargesync_api::{CloudClient, Error, LocalClient, Pairing, RateLimitSnapshot, RfidCard};
use serde_json::{Map, Value};

use crate::model::DeviceId;

/// The quota-limited cloud API.
#[async_trait]
pub trait CloudApi: Send + Sync {
    async fn pairings(&self) -> Result<Vec<Pairing>, Error>;

    /// Aggregate status of one device, in one call.
    async fn status(&self, device: &DeviceId) -> Result<Map<String, Value>, Error>;

    async fn rfid_cards(&self, device: &DeviceId) -> Result<Vec<RfidCard>, Error>;

    async fn firmware_version(&self, device: &DeviceId) -> Result<String, Error>;

    async fn send_command(&self, device: &DeviceId, endpoint: &str, value: &str)
    -> Result<(), Error>;

    /// Latest quota headers observed, for diagnostics only.
    fn rate_limit(&self) -> Option<Arc<RateLimitSnapshot>>;
}

/// A charger's LAN API.
#[async_trait]
pub trait LocalApi: Send + Sync {
    async fn realtime(&self, addr: &str) -> Result<Map<String, Value>, Error>;

    async fn write(&self, addr: &str, keyword: &str, value: &str) -> Result<(), Error>;
}

#[async_trait]
impl CloudApi for CloudClient {
    async fn pairings(&self) -> Result<Vec<Pairing>, Error> {
        self.list_pairings().await
    }

    async fn status(&self, device: &DeviceId) -> Result<Map<String, Value>, Error> {
        self.reported(device.as_str()).await
    }

    async fn rfid_cards(&self, device: &DeviceId) -> Result<Vec<RfidCard>, Error> {
        CloudClient::rfid_cards(self, device.as_str()).await
    }

    async fn firmware_version(&self, device: &DeviceId) -> Result<String, Error> {
        CloudClient::firmware_version(self, device.as_str()).await
    }

    async fn send_command(
        &self,
        device: &DeviceId,
        endpoint: &str,
        value: &str,
    ) -> Result<(), Error> {
        CloudClient::send_command(self, endpoint, device.as_str(), value).await
    }

    fn rate_limit(&self) -> Option<Arc<RateLimitSnapshot>> {
        self.last_rate_limit()
    }
}

#[async_trait]
impl LocalApi for LocalClient {
    async fn realtime(&self, addr: &str) -> Result<Map<String, Value>, Error> {
        LocalClient::realtime(self, addr).await
    }

    async fn write(&self, addr: &str, keyword: &str, value: &str) -> Result<(), Error> {
        LocalClient::write(self, addr, keyword, value).await
    }
}
