//! End-to-end tests for the webhook HTTP surface.
//!
//! Drives the full router (webhook + status endpoints) in-process with
//! `tower::ServiceExt::oneshot`; Mollie is backed by a wiremock server.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use reversal_webhook::handlers::{status_router, AppState};
use reversal_webhook::reversal::{
    reversal_webhook_router, DummyGateway, EventStore, FileEventStore, Gateways,
    InMemoryEventStore, ProviderGateway, ProviderKind, RemoteGateway, ReversalDispatcher,
    ReversalWebhookConfig, ReversalWebhookState, Signature, SignatureVerifier, UnconfiguredGateway,
};

const WEBHOOK_PATH: &str = "/api/webhooks/transaction-action-requested";
const API_URL: &str = "https://shop.example.com/graphql/";

struct TestApp {
    router: Router,
    store: Arc<InMemoryEventStore>,
    dummy: Arc<DummyGateway>,
    stats: Arc<AppState>,
}

fn build_app<S: EventStore>(
    config: ReversalWebhookConfig,
    store: Arc<S>,
    mollie: Arc<dyn ProviderGateway>,
    dummy: Arc<DummyGateway>,
) -> (Router, Arc<AppState>) {
    let stats = Arc::new(AppState::new());
    let gateways = Gateways::new(
        mollie,
        Arc::new(UnconfiguredGateway::new(ProviderKind::Adyen)),
        dummy,
    );
    let dispatcher = ReversalDispatcher::new(
        store,
        gateways,
        SignatureVerifier::new(config.webhook_secret.clone()),
        config.provider_timeout,
    );
    let state = Arc::new(ReversalWebhookState::new(config, dispatcher, stats.clone()));
    let router = reversal_webhook_router(state).merge(status_router(stats.clone()));
    (router, stats)
}

fn test_app(config: ReversalWebhookConfig, mollie: Arc<dyn ProviderGateway>) -> TestApp {
    let store = Arc::new(InMemoryEventStore::new());
    let dummy = Arc::new(DummyGateway::new());
    let (router, stats) = build_app(config, store.clone(), mollie, dummy.clone());
    TestApp {
        router,
        store,
        dummy,
        stats,
    }
}

async fn mollie_mock(status: u16) -> (MockServer, Arc<dyn ProviderGateway>) {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/refunds"))
        .respond_with(ResponseTemplate::new(status))
        .mount(&server)
        .await;
    let gateway = RemoteGateway::new(
        "mollie",
        format!("{}/refunds", server.uri()),
        Duration::from_millis(500),
    )
    .unwrap();
    (server, Arc::new(gateway))
}

fn payload(transaction_id: &str, kind: &str, action: &str) -> String {
    json!({
        "transaction": {
            "id": transaction_id,
            "type": kind,
            "reference": format!("tr_{transaction_id}"),
            "authorizedAmount": { "currency": "EUR", "amount": 25.0 }
        },
        "action": { "amount": 10.5, "actionType": action }
    })
    .to_string()
}

fn webhook(body: impl Into<String>, signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(WEBHOOK_PATH)
        .header("content-type", "application/json")
        .header("saleor-api-url", API_URL);
    if let Some(signature) = signature {
        builder = builder.header("saleor-signature", signature);
    }
    builder.body(Body::from(body.into())).unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_mollie_refund_is_executed_and_recorded() {
    let (server, mollie) = mollie_mock(200).await;
    let app = test_app(ReversalWebhookConfig::test_config(), mollie);

    let (status, body) = send(&app.router, webhook(payload("T1", "mollie", "REFUND"), Some("sig-1"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));
    assert_eq!(
        app.store.get_processed("T1").await.unwrap(),
        vec![Signature::new("sig-1")]
    );

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let forwarded: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(forwarded["reversal"]["id"], "tr_T1");
    assert_eq!(forwarded["reversal"]["currency"], "EUR");
    assert_eq!(forwarded["api"]["apiUrl"], API_URL);
}

#[tokio::test]
async fn test_redelivery_is_acknowledged_without_second_refund() {
    let (server, mollie) = mollie_mock(200).await;
    let app = test_app(ReversalWebhookConfig::test_config(), mollie);

    for _ in 0..3 {
        let (status, _) = send(&app.router, webhook(payload("T1", "mollie", "REFUND"), Some("sig-1"))).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(&app.router, webhook(payload("T1", "mollie", "REFUND"), Some("sig-1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true, "message": "Event already processed" }));

    assert_eq!(server.received_requests().await.unwrap().len(), 1);
    assert_eq!(app.stats.reversals_executed(), 1);
    assert_eq!(app.stats.replays_acknowledged(), 3);
}

#[tokio::test]
async fn test_second_signature_for_same_transaction_is_executed() {
    let (server, mollie) = mollie_mock(200).await;
    let app = test_app(ReversalWebhookConfig::test_config(), mollie);

    send(&app.router, webhook(payload("T1", "mollie", "REFUND"), Some("sig-1"))).await;
    let (status, _) = send(&app.router, webhook(payload("T1", "mollie", "REFUND"), Some("sig-2"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
    assert_eq!(
        app.store.get_processed("T1").await.unwrap(),
        vec![Signature::new("sig-1"), Signature::new("sig-2")]
    );
}

#[tokio::test]
async fn test_provider_failure_returns_500_and_allows_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/refunds"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/refunds"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    let mollie = RemoteGateway::new(
        "mollie",
        format!("{}/refunds", server.uri()),
        Duration::from_millis(500),
    )
    .unwrap();
    let app = test_app(ReversalWebhookConfig::test_config(), Arc::new(mollie));

    let (status, body) = send(&app.router, webhook(payload("T1", "mollie", "REFUND"), Some("sig-1"))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body,
        json!({ "success": false, "message": "Error while processing event" })
    );
    assert!(app.store.get_processed("T1").await.unwrap().is_empty());

    let (status, _) = send(&app.router, webhook(payload("T1", "mollie", "REFUND"), Some("sig-1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        app.store.get_processed("T1").await.unwrap(),
        vec![Signature::new("sig-1")]
    );
    assert_eq!(app.stats.events_failed(), 1);
}

#[tokio::test]
async fn test_provider_timeout_returns_500() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;
    let mollie = RemoteGateway::new("mollie", server.uri(), Duration::from_millis(200)).unwrap();
    let mut config = ReversalWebhookConfig::test_config();
    config.provider_timeout = Duration::from_millis(200);
    let app = test_app(config, Arc::new(mollie));

    let (status, _) = send(&app.router, webhook(payload("T1", "mollie", "REFUND"), Some("sig-1"))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(app.store.get_processed("T1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_signature_is_rejected() {
    let (server, mollie) = mollie_mock(200).await;
    let app = test_app(ReversalWebhookConfig::test_config(), mollie);

    let (status, body) = send(&app.router, webhook(payload("T1", "mollie", "REFUND"), None)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "success": false, "message": "Missing signature" }));
    assert!(server.received_requests().await.unwrap().is_empty());
    assert_eq!(app.stats.events_rejected(), 1);
}

#[tokio::test]
async fn test_missing_transaction_data_is_rejected() {
    let (server, mollie) = mollie_mock(200).await;
    let app = test_app(ReversalWebhookConfig::test_config(), mollie);

    let zero_amount = json!({
        "transaction": { "id": "T1", "type": "mollie", "reference": "tr_T1" },
        "action": { "amount": 0, "actionType": "REFUND" }
    });
    let no_transaction = json!({ "action": { "amount": 10, "actionType": "REFUND" } });

    for body in [zero_amount, no_transaction] {
        let (status, body) = send(&app.router, webhook(body.to_string(), Some("sig-1"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            json!({ "success": false, "message": "Missing transaction data" })
        );
    }
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_json_is_rejected() {
    let (_server, mollie) = mollie_mock(200).await;
    let app = test_app(ReversalWebhookConfig::test_config(), mollie);

    let (status, body) = send(&app.router, webhook("{not json", Some("sig-1"))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "success": false, "message": "Invalid payload" }));
}

#[tokio::test]
async fn test_hmac_signature_is_checked_when_secret_configured() {
    let (server, mollie) = mollie_mock(200).await;
    let mut config = ReversalWebhookConfig::test_config();
    config.webhook_secret = Some("whsec_test".to_string());
    let app = test_app(config, mollie);

    let body = payload("T1", "mollie", "REFUND");
    let (status, response) = send(&app.router, webhook(body.clone(), Some("deadbeef"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response, json!({ "success": false, "message": "Invalid signature" }));
    assert!(server.received_requests().await.unwrap().is_empty());

    let signature = SignatureVerifier::new(Some("whsec_test".to_string()))
        .sign(body.as_bytes())
        .unwrap();
    let (status, _) = send(&app.router, webhook(body, Some(&signature))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_void_is_acknowledged_without_provider_call() {
    let (server, mollie) = mollie_mock(200).await;
    let app = test_app(ReversalWebhookConfig::test_config(), mollie);

    let (status, body) = send(&app.router, webhook(payload("T1", "mollie", "VOID"), Some("sig-1"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(server.received_requests().await.unwrap().is_empty());
    assert_eq!(
        app.store.get_processed("T1").await.unwrap(),
        vec![Signature::new("sig-1")]
    );
}

#[tokio::test]
async fn test_unknown_provider_is_acknowledged() {
    let (server, mollie) = mollie_mock(200).await;
    let app = test_app(ReversalWebhookConfig::test_config(), mollie);

    let (status, body) = send(&app.router, webhook(payload("T1", "stripe", "REFUND"), Some("sig-1"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "success": true, "message": "Unsupported transaction action" })
    );
    assert!(server.received_requests().await.unwrap().is_empty());
    assert_eq!(app.dummy.call_count(), 0);
}

#[tokio::test]
async fn test_dummy_refund_is_keyed_by_transaction_id() {
    let (_server, mollie) = mollie_mock(200).await;
    let app = test_app(ReversalWebhookConfig::test_config(), mollie);

    let (status, _) = send(&app.router, webhook(payload("T9", "dummy", "REFUND"), Some("sig-1"))).await;

    assert_eq!(status, StatusCode::OK);
    let received = app.dummy.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].reversal.id, "T9");
    assert_eq!(received[0].api.api_url.as_deref(), Some(API_URL));
}

#[tokio::test]
async fn test_unconfigured_provider_returns_500() {
    let app = test_app(
        ReversalWebhookConfig::test_config(),
        Arc::new(UnconfiguredGateway::new(ProviderKind::Mollie)),
    );

    let (status, _) = send(&app.router, webhook(payload("T1", "mollie", "REFUND"), Some("sig-1"))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(app.store.get_processed("T1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_redeliveries_refund_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "reversal": { "id": "tr_T1" } })))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(100)))
        .mount(&server)
        .await;
    let mollie = RemoteGateway::new("mollie", server.uri(), Duration::from_secs(2)).unwrap();
    let app = test_app(ReversalWebhookConfig::test_config(), Arc::new(mollie));

    let deliveries = (0..8).map(|_| {
        let router = app.router.clone();
        async move { send(&router, webhook(payload("T1", "mollie", "REFUND"), Some("sig-1"))).await }
    });
    let results = futures::future::join_all(deliveries).await;

    assert!(results.iter().all(|(status, _)| *status == StatusCode::OK));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
    assert_eq!(
        app.store.get_processed("T1").await.unwrap(),
        vec![Signature::new("sig-1")]
    );
}

#[tokio::test]
async fn test_sender_hang_up_does_not_abandon_refund() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(150)))
        .mount(&server)
        .await;
    let mollie = RemoteGateway::new("mollie", server.uri(), Duration::from_secs(2)).unwrap();
    let app = test_app(ReversalWebhookConfig::test_config(), Arc::new(mollie));

    let hung_up = tokio::time::timeout(
        Duration::from_millis(30),
        app.router
            .clone()
            .oneshot(webhook(payload("T1", "mollie", "REFUND"), Some("sig-1"))),
    )
    .await;
    assert!(hung_up.is_err());

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(
        app.store.get_processed("T1").await.unwrap(),
        vec![Signature::new("sig-1")]
    );

    let (status, body) = send(&app.router, webhook(payload("T1", "mollie", "REFUND"), Some("sig-1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Event already processed");
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_file_ledger_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = dir.path().join("ledger.json");
    let (server, mollie) = mollie_mock(200).await;

    {
        let store = Arc::new(FileEventStore::open(&ledger).await.unwrap());
        let (router, _) = build_app(
            ReversalWebhookConfig::test_config(),
            store,
            mollie.clone(),
            Arc::new(DummyGateway::new()),
        );
        let (status, _) = send(&router, webhook(payload("T1", "mollie", "REFUND"), Some("sig-1"))).await;
        assert_eq!(status, StatusCode::OK);
    }

    let store = Arc::new(FileEventStore::open(&ledger).await.unwrap());
    let (router, _) = build_app(
        ReversalWebhookConfig::test_config(),
        store,
        mollie,
        Arc::new(DummyGateway::new()),
    );
    let (status, body) = send(&router, webhook(payload("T1", "mollie", "REFUND"), Some("sig-1"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Event already processed");
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_status_endpoint_reports_counters() {
    let (_server, mollie) = mollie_mock(200).await;
    let app = test_app(ReversalWebhookConfig::test_config(), mollie);

    send(&app.router, webhook(payload("T1", "mollie", "REFUND"), Some("sig-1"))).await;
    send(&app.router, webhook(payload("T1", "mollie", "REFUND"), Some("sig-1"))).await;
    send(&app.router, webhook(payload("T2", "mollie", "REFUND"), None)).await;

    let request = Request::builder().uri("/status").body(Body::empty()).unwrap();
    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "reversal-webhook");
    assert_eq!(body["events_received"], 3);
    assert_eq!(body["reversals_executed"], 1);
    assert_eq!(body["replays_acknowledged"], 1);
    assert_eq!(body["events_rejected"], 1);
    assert_eq!(body["status"], "running");
}

#[tokio::test]
async fn test_health_and_readiness() {
    let (_server, mollie) = mollie_mock(200).await;
    let app = test_app(ReversalWebhookConfig::test_config(), mollie);

    for uri in ["/health", "/ready"] {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let (status, body) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }
}
