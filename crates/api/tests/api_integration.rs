//! Integration tests for the API server.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use chrono::Utc;
use common::{BuyerId, OrderId, ProductId, SessionId};
use domain::{Money, NewOrder, OrderStatus, Product};
use downloads::TokenIssuer;
use jsonwebtoken::{EncodingKey, Header, encode};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::{InMemoryOrderStore, InMemoryProductStore, OrderStore};
use payments::{InMemoryPaymentProvider, WebhookVerifier};
use secrecy::SecretString;
use tower::ServiceExt;

use api::config::Config;
use api::{AppState, Backends};

const AUTH_SECRET: &str = "test-auth-secret";
const WEBHOOK_SECRET: &str = "whsec_test";
const DOWNLOAD_SECRET: &str = "test-download-secret";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    app: axum::Router,
    orders: InMemoryOrderStore,
    products: InMemoryProductStore,
    _storage_dir: tempfile::TempDir,
}

fn config(overrides: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = [
        ("AUTH_JWT_SECRET", AUTH_SECRET),
        ("PAYMENT_WEBHOOK_SECRET", WEBHOOK_SECRET),
        ("DOWNLOAD_TOKEN_SECRET", DOWNLOAD_SECRET),
        ("CLIENT_URL", "http://localhost:5173"),
        ("APP_ENV", "test"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (k, v) in overrides {
        vars.insert(k.to_string(), v.to_string());
    }
    Config::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

async fn setup_with(overrides: &[(&str, &str)]) -> TestApp {
    let storage_dir = tempfile::tempdir().unwrap();
    std::fs::write(storage_dir.path().join("hello.txt"), "hello").unwrap();

    let orders = InMemoryOrderStore::new();
    let products = InMemoryProductStore::new();
    products
        .upsert(Product::new(
            "prod-1",
            "Hello file",
            Money::from_cents(999),
            "hello.txt",
        ))
        .await;

    let backends = Backends {
        orders: Arc::new(orders.clone()),
        products: Arc::new(products.clone()),
        storage: Arc::new(downloads::LocalAssetStorage::new(storage_dir.path()).unwrap()),
        provider: Some(Arc::new(InMemoryPaymentProvider::new())),
    };
    let state = Arc::new(AppState::new(&config(overrides), backends));

    TestApp {
        app: api::create_app(state, get_metrics_handle()),
        orders,
        products,
        _storage_dir: storage_dir,
    }
}

async fn setup() -> TestApp {
    setup_with(&[]).await
}

fn bearer(buyer: &str) -> String {
    let claims = serde_json::json!({
        "sub": buyer,
        "exp": Utc::now().timestamp() + 3600,
    });
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(AUTH_SECRET.as_bytes()),
    )
    .unwrap();
    format!("Bearer {token}")
}

fn get(uri: &str, buyer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(buyer) = buyer {
        builder = builder.header(header::AUTHORIZATION, bearer(buyer));
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(uri: &str, buyer: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(buyer) = buyer {
        builder = builder.header(header::AUTHORIZATION, bearer(buyer));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn webhook(event_type: &str, session_id: &str, signature: Option<String>) -> Request<Body> {
    let payload = serde_json::json!({
        "id": "evt_test",
        "type": event_type,
        "data": { "object": { "id": session_id } }
    });
    webhook_payload(payload, signature)
}

fn webhook_payload(payload: serde_json::Value, signature: Option<String>) -> Request<Body> {
    let payload = payload.to_string();
    let signature = signature.unwrap_or_else(|| {
        WebhookVerifier::new(SecretString::new(WEBHOOK_SECRET.to_string()))
            .sign(payload.as_bytes(), Utc::now().timestamp())
            .unwrap()
    });

    Request::builder()
        .method("POST")
        .uri("/webhooks/payment")
        .header(header::CONTENT_TYPE, "application/json")
        .header("Stripe-Signature", signature)
        .body(Body::from(payload))
        .unwrap()
}

async fn send(app: &axum::Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

async fn create_order(t: &TestApp, session: &str, buyer: &str) -> OrderId {
    t.orders
        .create_pending_order(NewOrder {
            buyer_id: BuyerId::from(buyer),
            product_id: ProductId::from("prod-1"),
            session_id: SessionId::from(session),
            amount: Money::from_cents(999),
            currency: "usd".to_string(),
            product_title: "Hello file".to_string(),
        })
        .await
        .unwrap()
        .id
}

async fn create_paid_order(t: &TestApp, session: &str, buyer: &str) -> OrderId {
    let order_id = create_order(t, session, buyer).await;
    let response = send(&t.app, webhook("checkout.session.completed", session, None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    order_id
}

async fn order_status(t: &TestApp, order_id: OrderId) -> OrderStatus {
    t.orders.get_order(order_id).await.unwrap().unwrap().status
}

async fn issue_token(t: &TestApp, order_id: OrderId, buyer: &str) -> String {
    let response = send(&t.app, get(&format!("/downloads/{order_id}"), Some(buyer))).await;
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["token"]
        .as_str()
        .unwrap()
        .to_string()
}

// -- Health & metrics --

#[tokio::test]
async fn test_health_check() {
    let t = setup().await;

    let response = send(&t.app, get("/health", None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["environment"], "test");
    assert!(json["timestamp"].as_str().is_some());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let t = setup().await;

    let response = send(&t.app, get("/metrics", None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

// -- Checkout --

#[tokio::test]
async fn test_checkout_requires_authentication() {
    let t = setup().await;

    let response = send(
        &t.app,
        post_json("/checkout/session", None, serde_json::json!({ "productId": "prod-1" })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(body_json(response).await["error"].is_string());
}

#[tokio::test]
async fn test_checkout_creates_pending_order() {
    let t = setup().await;

    let response = send(
        &t.app,
        post_json(
            "/checkout/session",
            Some("buyer-1"),
            serde_json::json!({ "productId": "prod-1" }),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["url"].as_str().unwrap().starts_with("https://"));
    let order_id = OrderId::parse(json["orderId"].as_str().unwrap()).unwrap();
    let order = t.orders.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.buyer_id, BuyerId::from("buyer-1"));
    assert_eq!(order.amount, Money::from_cents(999));
}

#[tokio::test]
async fn test_checkout_validation_and_not_found() {
    let t = setup().await;

    let missing = send(
        &t.app,
        post_json("/checkout/session", Some("buyer-1"), serde_json::json!({})),
    )
    .await;
    let blank = send(
        &t.app,
        post_json(
            "/checkout/session",
            Some("buyer-1"),
            serde_json::json!({ "productId": "  " }),
        ),
    )
    .await;
    let unknown = send(
        &t.app,
        post_json(
            "/checkout/session",
            Some("buyer-1"),
            serde_json::json!({ "productId": "prod-404" }),
        ),
    )
    .await;

    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    assert_eq!(blank.status(), StatusCode::BAD_REQUEST);
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    assert_eq!(t.orders.order_count().await, 0);
}

#[tokio::test]
async fn test_checkout_without_client_url_is_misconfigured() {
    let t = setup_with(&[("CLIENT_URL", "")]).await;

    let response = send(
        &t.app,
        post_json(
            "/checkout/session",
            Some("buyer-1"),
            serde_json::json!({ "productId": "prod-1" }),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

// -- Webhooks --

#[tokio::test]
async fn test_completed_event_marks_order_paid() {
    let t = setup().await;
    let order_id = create_order(&t, "sess_1", "B1").await;
    assert_eq!(order_status(&t, order_id).await, OrderStatus::Pending);

    let response = send(&t.app, webhook("checkout.session.completed", "sess_1", None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["received"], true);
    assert_eq!(order_status(&t, order_id).await, OrderStatus::Paid);
}

#[tokio::test]
async fn test_duplicate_delivery_is_absorbed() {
    let t = setup().await;
    let order_id = create_order(&t, "sess_1", "B1").await;

    for _ in 0..3 {
        let response = send(&t.app, webhook("checkout.session.completed", "sess_1", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let order = t.orders.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.version, 2);
}

#[tokio::test]
async fn test_completed_but_unpaid_session_waits_for_async_payment() {
    let t = setup().await;
    let order_id = create_order(&t, "sess_1", "B1").await;

    let completed = serde_json::json!({
        "id": "evt_completed",
        "type": "checkout.session.completed",
        "data": { "object": { "id": "sess_1", "payment_status": "unpaid" } }
    });
    let response = send(&t.app, webhook_payload(completed, None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(order_status(&t, order_id).await, OrderStatus::Pending);

    let response = send(
        &t.app,
        webhook("checkout.session.async_payment_succeeded", "sess_1", None),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(order_status(&t, order_id).await, OrderStatus::Paid);
}

#[tokio::test]
async fn test_completed_with_paid_status_marks_order_paid() {
    let t = setup().await;
    let order_id = create_order(&t, "sess_1", "B1").await;

    let completed = serde_json::json!({
        "id": "evt_completed",
        "type": "checkout.session.completed",
        "data": { "object": { "id": "sess_1", "payment_status": "paid" } }
    });
    let response = send(&t.app, webhook_payload(completed, None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(order_status(&t, order_id).await, OrderStatus::Paid);
}

#[tokio::test]
async fn test_webhook_signature_failures() {
    let t = setup().await;
    let order_id = create_order(&t, "sess_1", "B1").await;

    let forged = format!("t={},v1={}", Utc::now().timestamp(), "ab".repeat(32));
    let bad = send(
        &t.app,
        webhook("checkout.session.completed", "sess_1", Some(forged)),
    )
    .await;
    let garbage = send(
        &t.app,
        webhook(
            "checkout.session.completed",
            "sess_1",
            Some("garbage".to_string()),
        ),
    )
    .await;
    let unsigned = send(
        &t.app,
        Request::builder()
            .method("POST")
            .uri("/webhooks/payment")
            .body(Body::from("{}"))
            .unwrap(),
    )
    .await;

    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    assert_eq!(garbage.status(), StatusCode::BAD_REQUEST);
    assert_eq!(unsigned.status(), StatusCode::BAD_REQUEST);
    assert_eq!(order_status(&t, order_id).await, OrderStatus::Pending);
}

#[tokio::test]
async fn test_webhook_without_secret_fails_closed() {
    let t = setup_with(&[("PAYMENT_WEBHOOK_SECRET", "")]).await;
    let order_id = create_order(&t, "sess_1", "B1").await;

    let response = send(&t.app, webhook("checkout.session.completed", "sess_1", None)).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(order_status(&t, order_id).await, OrderStatus::Pending);
}

#[tokio::test]
async fn test_webhook_for_unknown_session_is_acknowledged() {
    let t = setup().await;

    let response = send(&t.app, webhook("checkout.session.completed", "sess_ghost", None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(t.orders.order_count().await, 0);
}

#[tokio::test]
async fn test_unrelated_event_is_acknowledged() {
    let t = setup().await;
    let order_id = create_order(&t, "sess_1", "B1").await;

    let response = send(&t.app, webhook("customer.created", "sess_1", None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(order_status(&t, order_id).await, OrderStatus::Pending);
}

#[tokio::test]
async fn test_late_expiry_keeps_paid_under_forward_only() {
    let t = setup().await;
    let order_id = create_paid_order(&t, "sess_1", "B1").await;

    let response = send(&t.app, webhook("checkout.session.expired", "sess_1", None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(order_status(&t, order_id).await, OrderStatus::Paid);
}

#[tokio::test]
async fn test_late_expiry_overwrites_paid_under_last_write_wins() {
    let t = setup_with(&[("ORDER_TRANSITION_POLICY", "last_write_wins")]).await;
    let order_id = create_paid_order(&t, "sess_1", "B1").await;

    let response = send(&t.app, webhook("checkout.session.expired", "sess_1", None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(order_status(&t, order_id).await, OrderStatus::Failed);
}

// -- Download tokens --

#[tokio::test]
async fn test_token_requires_owner() {
    let t = setup().await;
    let order_id = create_paid_order(&t, "sess_1", "B1").await;

    let response = send(&t.app, get(&format!("/downloads/{order_id}"), Some("B2"))).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let json = body_json(response).await;
    assert!(json.get("token").is_none());
    assert_eq!(json["error"], "Not authorized to access this order");
}

#[tokio::test]
async fn test_token_requires_paid_order() {
    let t = setup().await;
    let order_id = create_order(&t, "sess_1", "B1").await;

    let response = send(&t.app, get(&format!("/downloads/{order_id}"), Some("B1"))).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"], "Order not yet paid");
}

#[tokio::test]
async fn test_token_request_errors() {
    let t = setup().await;

    let malformed = send(&t.app, get("/downloads/not-a-uuid", Some("B1"))).await;
    let unknown = send(
        &t.app,
        get(&format!("/downloads/{}", OrderId::new()), Some("B1")),
    )
    .await;
    let anonymous = send(
        &t.app,
        get(&format!("/downloads/{}", OrderId::new()), None),
    )
    .await;

    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_downloads_without_secret_are_misconfigured() {
    let t = setup_with(&[("DOWNLOAD_TOKEN_SECRET", "")]).await;
    let order_id = create_paid_order(&t, "sess_1", "B1").await;

    let response = send(&t.app, get(&format!("/downloads/{order_id}"), Some("B1"))).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_json(response).await.get("token").is_none());
}

// -- Redemption --

#[tokio::test]
async fn test_redeem_streams_asset() {
    let t = setup().await;
    let order_id = create_paid_order(&t, "sess_1", "B1").await;
    let token = issue_token(&t, order_id, "B1").await;

    let response = send(&t.app, get(&format!("/downloads/file/{token}"), Some("B1"))).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"hello.txt\""
    );
    assert_eq!(body_bytes(response).await, b"hello");
}

#[tokio::test]
async fn test_redeem_by_other_buyer_is_forbidden() {
    let t = setup().await;
    let order_id = create_paid_order(&t, "sess_1", "B1").await;
    let token = issue_token(&t, order_id, "B1").await;

    let response = send(&t.app, get(&format!("/downloads/file/{token}"), Some("B2"))).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_redeem_rechecks_order_status() {
    let t = setup_with(&[("ORDER_TRANSITION_POLICY", "last_write_wins")]).await;
    let order_id = create_paid_order(&t, "sess_1", "B1").await;
    let token = issue_token(&t, order_id, "B1").await;

    let expired = send(&t.app, webhook("checkout.session.expired", "sess_1", None)).await;
    assert_eq!(expired.status(), StatusCode::OK);

    let response = send(&t.app, get(&format!("/downloads/file/{token}"), Some("B1"))).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_redeem_rejects_bad_and_expired_tokens() {
    let t = setup().await;
    let order_id = create_paid_order(&t, "sess_1", "B1").await;
    let issuer = TokenIssuer::new(
        &SecretString::new(DOWNLOAD_SECRET.to_string()),
        Duration::from_secs(900),
    );
    let expired = issuer
        .mint_at(
            order_id,
            ProductId::from("prod-1"),
            "hello.txt",
            Utc::now().timestamp() - 901,
        )
        .unwrap();
    let foreign = TokenIssuer::new(
        &SecretString::new("someone-else".to_string()),
        Duration::from_secs(900),
    )
    .mint(order_id, ProductId::from("prod-1"), "hello.txt")
    .unwrap();

    for token in [expired.as_str(), foreign.as_str(), "garbage"] {
        let response = send(&t.app, get(&format!("/downloads/file/{token}"), Some("B1"))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "token {token}");
        assert_eq!(
            body_json(response).await["error"],
            "Invalid or expired download token"
        );
    }
}

#[tokio::test]
async fn test_redeem_asset_key_outside_root_is_integrity_error() {
    let t = setup().await;
    t.products
        .upsert(Product::new(
            "prod-1",
            "Hello file",
            Money::from_cents(999),
            "../../etc/passwd",
        ))
        .await;
    let order_id = create_paid_order(&t, "sess_1", "B1").await;
    let token = issue_token(&t, order_id, "B1").await;

    let response = send(&t.app, get(&format!("/downloads/file/{token}"), Some("B1"))).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert!(!json["error"].as_str().unwrap().contains("passwd"));
}

#[tokio::test]
async fn test_redeem_missing_file_is_not_found() {
    let t = setup().await;
    t.products
        .upsert(Product::new(
            "prod-1",
            "Hello file",
            Money::from_cents(999),
            "missing.txt",
        ))
        .await;
    let order_id = create_paid_order(&t, "sess_1", "B1").await;
    let token = issue_token(&t, order_id, "B1").await;

    let response = send(&t.app, get(&format!("/downloads/file/{token}"), Some("B1"))).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "Requested asset not found");
}

#[tokio::test]
async fn test_full_purchase_flow() {
    let t = setup().await;

    let checkout = send(
        &t.app,
        post_json(
            "/checkout/session",
            Some("buyer-1"),
            serde_json::json!({ "productId": "prod-1" }),
        ),
    )
    .await;
    assert_eq!(checkout.status(), StatusCode::OK);
    let order_id = OrderId::parse(body_json(checkout).await["orderId"].as_str().unwrap()).unwrap();
    let order = t.orders.get_order(order_id).await.unwrap().unwrap();

    let paid = send(
        &t.app,
        webhook("checkout.session.completed", order.session_id.as_str(), None),
    )
    .await;
    assert_eq!(paid.status(), StatusCode::OK);

    let token = issue_token(&t, order_id, "buyer-1").await;
    let response = send(
        &t.app,
        get(&format!("/downloads/file/{token}"), Some("buyer-1")),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"hello");
}
