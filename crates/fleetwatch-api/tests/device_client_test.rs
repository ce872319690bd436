#![allow(clippy::unwrap_used)]
// Integration tests for `DeviceClient` using wiremock.

use std::time::Duration;

use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use fleetwatch_api::{DeviceClient, Error, FormatError, PollTarget, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, DeviceClient) {
    let server = MockServer::start().await;
    let client = DeviceClient::new(
        PollTarget {
            port: server.address().port(),
            path: "/live".into(),
            sequence_key: "seq".into(),
        },
        &TransportConfig {
            connect_timeout: Duration::from_secs(2),
            timeout: Duration::from_millis(500),
        },
    )
    .unwrap();
    (server, client)
}

fn host(server: &MockServer) -> String {
    server.address().ip().to_string()
}

// ── Success ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_poll_sends_sequence_and_decodes_body() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/live"))
        .and(query_param("seq", "17"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("display({seq: '18', load: \"0.42\", online: true});"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let telemetry = client.poll(&host(&server), "17").await.unwrap();

    assert_eq!(telemetry.sequence(), "18");
    assert_eq!(telemetry.properties()["load"], "0.42");
    assert_eq!(telemetry.properties()["online"], "true");
}

// ── Failures ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_poll_reports_http_status() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/live"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let result = client.poll(&host(&server), "0").await;
    assert!(
        matches!(result, Err(Error::Status { status: 503 })),
        "expected Status error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_poll_rejects_json_body() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/live"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"seq": "1"}"#))
        .mount(&server)
        .await;

    let err = client.poll(&host(&server), "0").await.unwrap_err();
    assert!(err.is_format());
    assert!(matches!(err, Error::Format(FormatError::MissingEnvelope)));
}

#[tokio::test]
async fn test_poll_requires_sequence_key() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/live"))
        .respond_with(ResponseTemplate::new(200).set_body_string("display({load: 1})"))
        .mount(&server)
        .await;

    let err = client.poll(&host(&server), "0").await.unwrap_err();
    assert!(matches!(
        err,
        Error::Format(FormatError::MissingSequenceKey { .. })
    ));
}

#[tokio::test]
async fn test_poll_times_out() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/live"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("display({seq: 1})")
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let err = client.poll(&host(&server), "0").await.unwrap_err();
    assert!(err.is_transient(), "expected a timeout, got: {err:?}");
}
