#![allow(clippy::unwrap_used)]
// Integration tests for `LocalClient` using wiremock.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use chargesync_api::{Error, LocalClient, TransportConfig};

async fn setup() -> (MockServer, LocalClient, String) {
    let server = MockServer::start().await;
    let client = LocalClient::with_client(reqwest::Client::new());
    let addr = server.address().to_string();
    (server, client, addr)
}

#[tokio::test]
async fn test_realtime_strips_trailing_percent() {
    let (server, client, addr) = setup().await;

    Mock::given(method("GET"))
        .and(path("/RealTimeData"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("{\"ChargeState\":2,\"Intensity\":16,\"IP\":\"192.168.1.40\"}%%\n"),
        )
        .mount(&server)
        .await;

    let data = client.realtime(&addr).await.unwrap();
    assert_eq!(data.get("Intensity"), Some(&json!(16)));
    assert_eq!(data.get("ChargeState"), Some(&json!(2)));
}

#[tokio::test]
async fn test_realtime_empty_payload() {
    let (server, client, addr) = setup().await;

    Mock::given(method("GET"))
        .and(path("/RealTimeData"))
        .respond_with(ResponseTemplate::new(200).set_body_string("  %"))
        .mount(&server)
        .await;

    let result = client.realtime(&addr).await;
    assert!(
        matches!(result, Err(Error::EmptyPayload { .. })),
        "expected EmptyPayload, got: {result:?}"
    );
}

#[tokio::test]
async fn test_realtime_rejects_non_object() {
    let (server, client, addr) = setup().await;

    Mock::given(method("GET"))
        .and(path("/RealTimeData"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[1,2,3]"))
        .mount(&server)
        .await;

    let result = client.realtime(&addr).await;
    assert!(matches!(result, Err(Error::Deserialization { .. })));
}

#[tokio::test]
async fn test_write_keyword() {
    let (server, client, addr) = setup().await;

    Mock::given(method("GET"))
        .and(path("/write/Intensity=16"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client.write(&addr, "Intensity", "16").await.unwrap();
}

#[tokio::test]
async fn test_write_rejected() {
    let (server, client, addr) = setup().await;

    Mock::given(method("GET"))
        .and(path("/write/Locked=1"))
        .respond_with(ResponseTemplate::new(400).set_body_string("unknown keyword"))
        .mount(&server)
        .await;

    match client.write(&addr, "Locked", "1").await {
        Err(Error::Local { status, message }) => {
            assert_eq!(status, 400);
            assert_eq!(message, "unknown keyword");
        }
        other => panic!("expected Local error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_realtime_timeout() {
    let server = MockServer::start().await;
    let client = LocalClient::new(&TransportConfig {
        timeout: Duration::from_millis(200),
    })
    .unwrap();

    Mock::given(method("GET"))
        .and(path("/RealTimeData"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(2))
                .set_body_string("{}"),
        )
        .mount(&server)
        .await;

    let result = client.realtime(&server.address().to_string()).await;
    assert!(
        matches!(result, Err(Error::Timeout { .. })),
        "expected Timeout, got: {result:?}"
    );
}
