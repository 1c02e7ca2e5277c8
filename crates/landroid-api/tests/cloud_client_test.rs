#![allow(clippy::unwrap_used)]
// Integration tests for `CloudClient` using wiremock.

use pretty_assertions::assert_eq;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use landroid_api::{CloudClient, CloudEndpoints, Error, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, CloudClient) {
    let server = MockServer::start().await;
    let base = Url::parse(&server.uri()).unwrap();
    let endpoints = CloudEndpoints {
        api_base: base.join("/api/v2/").unwrap(),
        token_url: base.join("/oauth/token").unwrap(),
        client_id: "client-1".into(),
        mqtt_prefix: "WX".into(),
    };
    let client = CloudClient::new(endpoints, &TransportConfig::default()).unwrap();
    (server, client)
}

fn secret(value: &str) -> SecretString {
    SecretString::from(value.to_owned())
}

fn token_body() -> serde_json::Value {
    json!({
        "access_token": "hdr.claims.sig",
        "refresh_token": "refresh-1",
        "expires_in": 3600,
        "token_type": "Bearer"
    })
}

// ── Token exchange ──────────────────────────────────────────────────

#[tokio::test]
async fn test_login_success() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(header("content-type", "application/json"))
        .and(body_partial_json(json!({
            "client_id": "client-1",
            "username": "user@example.com",
            "password": "hunter2",
            "scope": "*",
            "grant_type": "password"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
        .expect(1)
        .mount(&server)
        .await;

    let session = client
        .login("user@example.com", &secret("hunter2"))
        .await
        .unwrap();

    assert_eq!(session.access_token.expose_secret(), "hdr.claims.sig");
    assert_eq!(session.refresh_token.expose_secret(), "refresh-1");
    assert_eq!(session.expires_in, 3600);
}

#[tokio::test]
async fn test_login_failure_carries_payload() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "The user credentials were incorrect."
        })))
        .mount(&server)
        .await;

    let err = client
        .login("user@example.com", &secret("wrong"))
        .await
        .unwrap_err();

    match &err {
        Error::Authentication {
            status, message, ..
        } => {
            assert_eq!(*status, 401);
            assert_eq!(message, "The user credentials were incorrect.");
        }
        other => panic!("expected Authentication error, got: {other:?}"),
    }
    assert_eq!(err.auth_payload().unwrap()["error"], "invalid_grant");
}

#[tokio::test]
async fn test_login_failure_without_json_body() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .mount(&server)
        .await;

    let err = client.login("u", &secret("p")).await.unwrap_err();
    assert!(matches!(err, Error::Authentication { status: 502, .. }));
    assert!(err.auth_payload().is_none());
}

#[tokio::test]
async fn test_refresh_uses_refresh_grant() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_partial_json(json!({
            "client_id": "client-1",
            "refresh_token": "refresh-1",
            "grant_type": "refresh_token",
            "scope": landroid_api::auth::REFRESH_SCOPE
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "h2.c2.s2",
            "refresh_token": "refresh-2",
            "expires_in": 7200
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = client.refresh(&secret("refresh-1")).await.unwrap();
    assert_eq!(session.refresh_token.expose_secret(), "refresh-2");
    assert_eq!(session.expires_in, 7200);
}

// ── REST ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_list_devices() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v2/product-items"))
        .and(query_param("status", "1"))
        .and(query_param("gps_status", "1"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "serial_number": "ABC123",
                "name": "Front",
                "uuid": "u-1",
                "mqtt_endpoint": "iot.eu-west-1.worxlandroid.com",
                "mqtt_topics": { "command_in": "in", "command_out": "out" }
            },
            {
                "serial_number": "DEF456",
                "name": "Back",
                "mqtt_topics": { "command_in": "in2", "command_out": "out2" }
            }
        ])))
        .mount(&server)
        .await;

    let devices = client.list_devices(&secret("tok")).await.unwrap();
    let serials: Vec<_> = devices.iter().map(|d| d.serial_number.as_str()).collect();
    assert_eq!(serials, vec!["ABC123", "DEF456"]);
    assert_eq!(devices[0].mqtt_topics.command_in, "in");
    assert!(devices[1].mqtt_endpoint.is_none());
}

#[tokio::test]
async fn test_list_devices_unauthorized() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v2/product-items"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client.list_devices(&secret("stale")).await.unwrap_err();
    assert!(err.is_unauthorized(), "got: {err:?}");
}

#[tokio::test]
async fn test_list_devices_server_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v2/product-items"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = client.list_devices(&secret("tok")).await.unwrap_err();
    assert!(matches!(err, Error::Api { status: 503, .. }));
    assert!(!err.is_unauthorized());
}

#[tokio::test]
async fn test_list_devices_bad_body() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v2/product-items"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = client.list_devices(&secret("tok")).await.unwrap_err();
    match err {
        Error::Deserialization { body, .. } => assert_eq!(body, "not json"),
        other => panic!("expected Deserialization error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_current_user() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v2/users/me"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 4711,
            "email": "user@example.com"
        })))
        .mount(&server)
        .await;

    let user = client.current_user(&secret("tok")).await.unwrap();
    assert_eq!(user.id, "4711");
    assert_eq!(user.extra["email"], "user@example.com");
}
