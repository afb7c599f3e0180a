// Async HTTP client for the V2C cloud API.
//
// Base path: /kong/v2c_service/
// Auth: `apikey` header
//
// Every response's quota headers are captured into `last_rate_limit`
// before the body is looked at.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use super::models::{FirmwareVersion, Pairing, RfidCard};
use crate::Error;
use crate::ratelimit::{self, RateLimitSnapshot};
use crate::transport::TransportConfig;

/// Production cloud endpoint.
pub const DEFAULT_BASE_URL: &str = "https://v2c.cloud/kong/v2c_service";

/// Async client for the V2C cloud API.
///
/// One instance serves every device on the account; each call names its
/// device through the `deviceId` query parameter.
pub struct CloudClient {
    http: reqwest::Client,
    base_url: Url,
    timeout_secs: u64,
    last_rate_limit: ArcSwapOption<RateLimitSnapshot>,
}

impl CloudClient {
    // ── Constructors ─────────────────────────────────────────────────

    /// Build from an API key and transport config.
    ///
    /// Injects `apikey` as a sensitive default header on every request.
    pub fn from_api_key(
        base_url: &str,
        api_key: &SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        let mut key_value =
            HeaderValue::from_str(api_key.expose_secret()).map_err(|_| Error::InvalidApiKey)?;
        key_value.set_sensitive(true);
        headers.insert("apikey", key_value);

        let http = transport.build_client_with_headers(headers)?;
        let mut client = Self::with_client(base_url, http)?;
        client.timeout_secs = transport.timeout.as_secs();
        Ok(client)
    }

    /// Wrap an existing `reqwest::Client` (caller manages auth headers).
    pub fn with_client(base_url: &str, http: reqwest::Client) -> Result<Self, Error> {
        Ok(Self {
            http,
            base_url: normalize_base_url(base_url)?,
            timeout_secs: TransportConfig::default().timeout.as_secs(),
            last_rate_limit: ArcSwapOption::empty(),
        })
    }

    /// The most recent quota headers seen on any response.
    pub fn last_rate_limit(&self) -> Option<Arc<RateLimitSnapshot>> {
        self.last_rate_limit.load_full()
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// List the chargers paired to this account.
    pub async fn list_pairings(&self) -> Result<Vec<Pairing>, Error> {
        self.get("pairings/me", &[]).await
    }

    /// Fetch the aggregate reported status of one device.
    pub async fn reported(&self, device_id: &str) -> Result<Map<String, Value>, Error> {
        let value: Value = self
            .get("device/reported", &[("deviceId", device_id)])
            .await?;
        into_object(value)
    }

    /// Fetch the RFID cards registered on one device.
    pub async fn rfid_cards(&self, device_id: &str) -> Result<Vec<RfidCard>, Error> {
        self.get("device/rfid", &[("deviceId", device_id)]).await
    }

    /// Fetch the firmware version of one device.
    pub async fn firmware_version(&self, device_id: &str) -> Result<String, Error> {
        let version: FirmwareVersion = self.get("version", &[("deviceId", device_id)]).await?;
        Ok(version.version().to_owned())
    }

    /// Issue a write through one of the `device/<endpoint>` command routes.
    ///
    /// The response body is ignored; only the status matters.
    pub async fn send_command(
        &self,
        endpoint: &str,
        device_id: &str,
        value: &str,
    ) -> Result<(), Error> {
        let url = self.url(&format!("device/{endpoint}"))?;
        debug!(%url, device_id, value, "POST");

        let resp = self
            .http
            .post(url)
            .query(&[("deviceId", device_id), ("value", value)])
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        self.record_rate_limit(resp.headers());

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(self.parse_error(status, resp).await)
        }
    }

    // ── HTTP plumbing ────────────────────────────────────────────────

    fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path)?)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!(%url, ?params, "GET");

        let resp = self
            .http
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        self.record_rate_limit(resp.headers());
        self.handle_response(resp).await
    }

    fn record_rate_limit(&self, headers: &HeaderMap) {
        if let Some(snapshot) = RateLimitSnapshot::from_headers(headers) {
            self.last_rate_limit.store(Some(Arc::new(snapshot)));
        }
    }

    fn map_send_error(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else {
            Error::Transport(err)
        }
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, Error> {
        let status = resp.status();
        if status.is_success() {
            let body = resp.text().await?;
            serde_json::from_str(&body).map_err(|e| {
                let preview: String = body.chars().take(200).collect();
                Error::Deserialization {
                    message: format!("{e} (body preview: {preview:?})"),
                    body,
                }
            })
        } else {
            Err(self.parse_error(status, resp).await)
        }
    }

    async fn parse_error(&self, status: StatusCode, resp: reqwest::Response) -> Error {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => return Error::InvalidApiKey,
            StatusCode::TOO_MANY_REQUESTS => {
                let headers = resp.headers();
                return Error::RateLimited {
                    retry_after_secs: ratelimit::retry_after_secs(headers).unwrap_or(0),
                    snapshot: RateLimitSnapshot::from_headers(headers),
                };
            }
            _ => {}
        }

        let raw = resp.text().await.unwrap_or_default();
        Error::Cloud {
            status: status.as_u16(),
            message: if raw.trim().is_empty() {
                status.to_string()
            } else {
                raw
            },
        }
    }
}

/// Ensure the base URL ends with `/` so relative joins keep its path.
fn normalize_base_url(raw: &str) -> Result<Url, Error> {
    let mut url = Url::parse(raw)?;
    let path = url.path().trim_end_matches('/').to_owned();
    url.set_path(&format!("{path}/"));
    Ok(url)
}

/// The status endpoint returns a flat object, occasionally JSON-encoded
/// a second time inside a string.
fn into_object(value: Value) -> Result<Map<String, Value>, Error> {
    match value {
        Value::Object(map) => Ok(map),
        Value::String(inner) => match serde_json::from_str::<Value>(&inner) {
            Ok(Value::Object(map)) => Ok(map),
            _ => Err(Error::Deserialization {
                message: "reported status is not a JSON object".into(),
                body: inner,
            }),
        },
        other => Err(Error::Deserialization {
            message: "reported status is not a JSON object".into(),
            body: other.to_string(),
        }),
    }
}
