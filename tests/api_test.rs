mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::config_with_gateways;
use payment_router::config::Config;
use payment_router::{build_state, create_app};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn app(config: Config) -> Router {
    let state = build_state(Arc::new(config)).unwrap();
    create_app(state)
}

async fn send(app: &Router, method: &str, uri: &str, body: impl Into<Body>) -> (StatusCode, Vec<u8>) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(body.into())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

async fn send_json(app: &Router, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
    let (status, bytes) = send(app, method, uri, body.to_string()).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_deposit_success_and_lookup() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/deposit")
        .with_status(200)
        .with_body(r#"{"status":"success"}"#)
        .create_async()
        .await;
    let app = app(config_with_gateways(&[("gateway-a", &server.url(), "json")], false));

    let (status, body) = send_json(
        &app,
        "POST",
        "/deposit",
        json!({"account_id": "acct-1", "amount": 100}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let id = body["transaction_id"].as_str().unwrap().to_string();

    let (status, tx) = send_json(&app, "GET", &format!("/transactions/{id}"), Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tx["status"], "SUCCESS");
    assert_eq!(tx["type"], "DEPOSIT");
}

#[tokio::test]
async fn test_gateway_failure_returns_bad_request() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/withdrawal")
        .with_status(500)
        .create_async()
        .await;
    let app = app(config_with_gateways(&[("gateway-a", &server.url(), "json")], false));

    let (status, body) = send_json(
        &app,
        "POST",
        "/withdrawal",
        json!({"account_id": "acct-1", "amount": "10.00"}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    let id = body["transaction_id"].as_str().unwrap().to_string();

    let (_, tx) = send_json(&app, "GET", &format!("/transactions/{id}"), Value::Null).await;
    assert_eq!(tx["status"], "FAILED");
}

#[tokio::test]
async fn test_invalid_requests_are_rejected() {
    let app = app(config_with_gateways(&[("gateway-a", "http://127.0.0.1:1", "json")], false));

    let (status, bytes) = send(&app, "POST", "/deposit", "{not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], false);
    assert!(body.get("transaction_id").is_none());

    let (status, body) = send_json(
        &app,
        "POST",
        "/deposit",
        json!({"account_id": "acct-1", "amount": -3}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_unknown_transaction_is_404() {
    let app = app(config_with_gateways(&[("gateway-a", "http://127.0.0.1:1", "json")], false));

    let (status, _) = send(
        &app,
        "GET",
        &format!("/transactions/{}", uuid::Uuid::new_v4()),
        Body::empty(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_callback_routes() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/deposit")
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;
    let app = app(config_with_gateways(&[("gateway-a", &server.url(), "json")], false));

    let (_, created) = send_json(
        &app,
        "POST",
        "/deposit",
        json!({"account_id": "acct-1", "amount": 5}),
    )
    .await;
    let id = created["transaction_id"].as_str().unwrap().to_string();

    let callback = |status: &str, gateway_ref: &str| {
        json!({
            "transaction_id": id,
            "status": status,
            "gateway_ref": gateway_ref,
            "amount": 5,
            "currency": "USD",
            "timestamp": "2024-05-01T10:00:00Z"
        })
    };

    let (status, body) = send_json(&app, "POST", "/callbacks/gateway-a", callback("success", "r-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");

    let (status, body) = send_json(&app, "POST", "/callbacks/gateway-a", callback("failed", "r-2")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status"], "error");

    let mut incomplete = callback("success", "r-3");
    incomplete["currency"] = json!("");
    let (status, body) = send_json(&app, "POST", "/callbacks/gateway-a", incomplete).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "invalid transaction: missing currency");

    let (status, _) = send_json(&app, "POST", "/callbacks/nowhere", callback("success", "r-1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_reports_gateways() {
    let app = app(config_with_gateways(
        &[
            ("gateway-a", "http://127.0.0.1:1", "json"),
            ("gateway-b", "http://127.0.0.1:1", "soap"),
        ],
        false,
    ));

    let (status, body) = send_json(&app, "GET", "/health", Value::Null).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["dependencies"]["gateway-a"]["circuit"], "closed");
    assert_eq!(body["dependencies"]["gateway-b"]["status"], "healthy");
}

#[tokio::test]
async fn test_simulators_are_only_mounted_when_enabled() {
    let disabled = app(config_with_gateways(&[("gateway-a", "http://127.0.0.1:1", "json")], false));
    let (status, _) = send(&disabled, "POST", "/simulator/json/deposit", "{}").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let enabled = app(config_with_gateways(&[("gateway-a", "http://127.0.0.1:1", "json")], true));
    let (status, body) = send_json(&enabled, "POST", "/simulator/json/deposit", json!({"account": "a"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
}

/// Full stack over real sockets: the service routes to its own simulators.
#[tokio::test]
async fn test_end_to_end_against_simulators() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let config = config_with_gateways(
        &[
            ("gateway-a", &format!("http://{addr}/simulator/json"), "json"),
            ("gateway-b", &format!("http://{addr}/simulator/soap"), "soap"),
        ],
        true,
    );
    let app = app(config);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = reqwest::Client::new();
    let base = format!("http://{addr}");

    for path in ["deposit", "withdrawal", "deposit", "withdrawal"] {
        let response = client
            .post(format!("{base}/{path}"))
            .header("x-request-id", "e2e-1")
            .json(&json!({"account_id": "acct-e2e", "amount": 42.00}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(response.headers()["x-request-id"], "e2e-1");
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["success"], true, "{body}");
    }

    // soap gateway callbacks speak XML
    let created: Value = client
        .post(format!("{base}/deposit"))
        .json(&json!({"account_id": "acct-e2e", "amount": 1}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = created["transaction_id"].as_str().unwrap();

    let response = client
        .post(format!("{base}/callbacks/gateway-b"))
        .header("content-type", "application/xml")
        .body(format!(
            "<CallbackRequest><TransactionID>{id}</TransactionID><Status>SUCCESS</Status>\
             <GatewayRef>e2e-ref</GatewayRef><Amount>1</Amount><Currency>USD</Currency></CallbackRequest>"
        ))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let xml = response.text().await.unwrap();
    assert!(xml.starts_with("<CallbackResponse><Status>success</Status>"), "{xml}");
}
