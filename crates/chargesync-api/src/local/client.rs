// Async HTTP client for a charger's local API.
//
// Reads: GET http://<addr>/RealTimeData
// Writes: GET http://<addr>/write/<Keyword>=<Value>
//
// No authentication. The address is passed per call because it can
// change under a running poller.

use reqwest::StatusCode;
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use crate::Error;
use crate::transport::TransportConfig;

/// Async client for the local realtime/write endpoints.
///
/// Holds no per-device state; one instance is shared by every poller.
#[derive(Clone)]
pub struct LocalClient {
    http: reqwest::Client,
    timeout_secs: u64,
}

impl LocalClient {
    pub fn new(transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
            timeout_secs: transport.timeout.as_secs(),
        })
    }

    /// Wrap an existing `reqwest::Client`.
    pub fn with_client(http: reqwest::Client) -> Self {
        Self {
            http,
            timeout_secs: TransportConfig::local().timeout.as_secs(),
        }
    }

    /// Fetch the flat realtime telemetry map.
    ///
    /// Firmware appends stray `%` characters to the payload; those and
    /// surrounding whitespace are stripped before parsing.
    pub async fn realtime(&self, addr: &str) -> Result<Map<String, Value>, Error> {
        let url = Url::parse(&format!("http://{addr}/RealTimeData"))?;
        debug!(%url, "GET");

        let resp = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| self.map_send_error(e))?;
        if !status.is_success() {
            return Err(local_error(status, body));
        }

        let payload = body.trim().trim_end_matches('%').trim();
        if payload.is_empty() {
            return Err(Error::EmptyPayload {
                endpoint: url.to_string(),
            });
        }

        match serde_json::from_str::<Value>(payload) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(Error::Deserialization {
                message: "realtime payload is not a JSON object".into(),
                body,
            }),
            Err(e) => Err(Error::Deserialization {
                message: e.to_string(),
                body,
            }),
        }
    }

    /// Write a single keyword/value pair.
    ///
    /// Any status below 400 counts as accepted.
    pub async fn write(&self, addr: &str, keyword: &str, value: &str) -> Result<(), Error> {
        let url = Url::parse(&format!(
            "http://{addr}/write/{}={}",
            urlencoding::encode(keyword.trim()),
            urlencoding::encode(value),
        ))?;
        debug!(%url, "GET");

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let status = resp.status();
        if status.as_u16() >= 400 {
            let body = resp.text().await.unwrap_or_default();
            return Err(local_error(status, body));
        }
        Ok(())
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
}

fn local_error(status: StatusCode, body: String) -> Error {
    Error::Local {
        status: status.as_u16(),
        message: if body.trim().is_empty() {
            status.to_string()
        } else {
            body
        },
    }
}
