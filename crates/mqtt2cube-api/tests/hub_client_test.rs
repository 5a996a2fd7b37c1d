// Integration tests for `HubClient` using wiremock.

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mqtt2cube_api::models::EventEndpoint;
use mqtt2cube_api::{DiscoveryEndpoint, Error, HubClient};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, HubClient) {
    let server = MockServer::start().await;
    let client = HubClient::from_reqwest(
        &format!("{}/open-api/v1/rest", server.uri()),
        reqwest::Client::new(),
    )
    .unwrap();
    (server, client)
}

fn token() -> SecretString {
    SecretString::from("tok-123".to_owned())
}

fn endpoint() -> DiscoveryEndpoint {
    DiscoveryEndpoint {
        third_serial_number: "A4CF12F0E1D2".into(),
        name: "Kitchen".into(),
        manufacturer: "Tasmota".into(),
        model: "Sonoff Basic".into(),
        firmware_version: "13.1.0".into(),
        display_category: "switch".into(),
        capabilities: json!([{ "capability": "power", "permission": "readWrite" }]),
        state: json!({ "power": { "powerState": "off" } }),
        tags: json!({ "deviceInfo": { "deviceId": "A4CF12F0E1D2" } }),
        service_address: "http://ihost:8325/api/v1/open/device/A4CF12F0E1D2".into(),
    }
}

// ── Token tests ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_request_access_token() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/open-api/v1/rest/bridge/access_token"))
        .and(query_param("app_name", "mqtt2cube-tasmota"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": 0,
            "data": { "token": "fresh-token" },
            "message": "success"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let token = client.request_access_token("mqtt2cube-tasmota").await.unwrap();
    assert_eq!(secrecy::ExposeSecret::expose_secret(&token), "fresh-token");
}

#[tokio::test]
async fn test_access_token_refused_is_authentication() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/open-api/v1/rest/bridge/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": 401,
            "data": {},
            "message": "link button not pressed"
        })))
        .mount(&server)
        .await;

    let err = client.request_access_token("app").await.unwrap_err();
    assert!(err.is_auth_expired());
}

// ── Directory tests ─────────────────────────────────────────────────

#[tokio::test]
async fn test_list_devices_sends_bearer() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/open-api/v1/rest/devices"))
        .and(header("authorization", "Bearer tok-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": 0,
            "data": { "device_list": [
                {
                    "serial_number": "hub-1",
                    "name": "Kitchen",
                    "online": true,
                    "tags": { "deviceInfo": { "deviceId": "A4CF12F0E1D2" } }
                },
                { "serial_number": "hub-2", "name": "Zigbee bulb" }
            ]},
            "message": "success"
        })))
        .mount(&server)
        .await;

    let devices = client.list_devices(&token()).await.unwrap();

    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].serial_number, "hub-1");
    assert!(devices[0].matches_mac("A4CF12F0E1D2"));
    assert!(!devices[1].matches_mac("A4CF12F0E1D2"));
}

#[tokio::test]
async fn test_list_devices_expired_token() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/open-api/v1/rest/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": 401,
            "data": {},
            "message": "invalid token"
        })))
        .mount(&server)
        .await;

    let err = client.list_devices(&token()).await.unwrap_err();
    assert!(matches!(err, Error::Authentication { .. }));
}

#[tokio::test]
async fn test_http_401_is_authentication() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/open-api/v1/rest/devices"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client.list_devices(&token()).await.unwrap_err();
    assert!(err.is_auth_expired());
}

#[tokio::test]
async fn test_delete_unknown_device_is_not_found() {
    let (server, client) = setup().await;

    Mock::given(method("DELETE"))
        .and(path("/open-api/v1/rest/devices/hub-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": 110000,
            "data": {},
            "message": "device not found"
        })))
        .mount(&server)
        .await;

    let err = client.delete_device("hub-9", &token()).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.hub_error_code(), Some(110_000));
}

#[tokio::test]
async fn test_malformed_body_is_deserialization_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/open-api/v1/rest/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&server)
        .await;

    let err = client.list_devices(&token()).await.unwrap_err();
    match err {
        Error::Deserialization { body, .. } => assert!(body.contains("gateway")),
        other => panic!("expected deserialization error, got {other:?}"),
    }
}

// ── Event tests ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_discover_devices_posts_discovery_request() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/open-api/v1/rest/thirdparty/event"))
        .and(body_partial_json(json!({
            "event": {
                "header": { "name": "DiscoveryRequest", "version": "1" },
                "payload": { "endpoints": [ { "third_serial_number": "A4CF12F0E1D2", "manufacturer": "Tasmota" } ] }
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "header": { "name": "Response", "message_id": "m", "version": "1" },
            "payload": { "endpoints": [ { "serial_number": "hub-1", "third_serial_number": "A4CF12F0E1D2" } ] }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let resp = client.discover_devices(vec![endpoint()], &token()).await.unwrap();
    assert!(!resp.is_error());
    assert_eq!(resp.payload.endpoints[0].serial_number, "hub-1");
}

#[tokio::test]
async fn test_discover_invalid_parameters() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/open-api/v1/rest/thirdparty/event"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "header": { "name": "ErrorResponse", "message_id": "m", "version": "1" },
            "payload": { "type": "INVALID_PARAMETERS", "description": "capabilities invalid" }
        })))
        .mount(&server)
        .await;

    let err = client
        .discover_devices(vec![endpoint()], &token())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidParameters { .. }));
}

#[tokio::test]
async fn test_report_online_revoked_token() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/open-api/v1/rest/thirdparty/event"))
        .and(body_partial_json(json!({
            "event": {
                "header": { "name": "DeviceOnlineChangeReport" },
                "endpoint": { "serial_number": "hub-1", "third_serial_number": "A4CF12F0E1D2" },
                "payload": { "online": false }
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "header": { "name": "ErrorResponse", "message_id": "m", "version": "1" },
            "payload": { "type": "AUTH_FAILURE", "description": "headers.Authorization is invalid" }
        })))
        .mount(&server)
        .await;

    let err = client
        .report_online(
            EventEndpoint {
                serial_number: "hub-1".into(),
                third_serial_number: "A4CF12F0E1D2".into(),
            },
            false,
            &token(),
        )
        .await
        .unwrap_err();
    assert!(err.is_auth_expired());
}

#[tokio::test]
async fn test_report_state_success() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/open-api/v1/rest/thirdparty/event"))
        .and(body_partial_json(json!({
            "event": {
                "header": { "name": "DeviceStatesChangeReport" },
                "payload": { "state": { "power": { "powerState": "on" } } }
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "header": { "name": "Response", "message_id": "m", "version": "1" },
            "payload": {}
        })))
        .expect(1)
        .mount(&server)
        .await;

    client
        .report_state(
            EventEndpoint {
                serial_number: "hub-1".into(),
                third_serial_number: "A4CF12F0E1D2".into(),
            },
            json!({ "power": { "powerState": "on" } }),
            &token(),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unreachable_hub_is_transient() {
    // Nothing listens on this port.
    let client =
        HubClient::from_reqwest("http://127.0.0.1:9/open-api/v1/rest", reqwest::Client::new())
            .unwrap();

    let err = client.list_devices(&token()).await.unwrap_err();
    assert!(err.is_transient());
}
