//! Test utilities and fixtures for MotorCards integration tests

#![allow(dead_code)]

use axum::Router;
use rusqlite::Connection;
use uuid::Uuid;

// Re-export the main library crate
pub use motorcards::config::GatewayConfig;
pub use motorcards::db::{init_db, queries, AppState};
pub use motorcards::id::gen_notification_token;
pub use motorcards::models::*;
pub use motorcards::notify::NotifyService;
pub use motorcards::payments::{
    sign_token, GatewayClient, PaymentStatusSnapshot, DEFAULT_API_VERSION,
};

pub const TEST_RECEIVER_ID: &str = "rcv_test_80021";
pub const TEST_GATEWAY_SECRET: &str = "gwsec_test123secret456";
pub const TEST_UNIT_PRICE: i64 = 2500;

/// Gateway config pointing at a closed port; tests that must not reach the
/// gateway use this, tests that should use `stub_gateway` instead.
pub fn test_gateway_config(api_url: &str) -> GatewayConfig {
    GatewayConfig {
        api_url: api_url.to_string(),
        receiver_id: TEST_RECEIVER_ID.to_string(),
        secret: TEST_GATEWAY_SECRET.to_string(),
        skip_signature: false,
    }
}

/// Create an in-memory test database with schema initialized
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

/// Create an AppState for testing.
///
/// Backed by a throwaway file in the OS temp dir rather than `:memory:` so
/// every pooled connection sees the same data - required by the concurrency
/// tests. Files are cleaned up by the OS temp policy.
pub fn create_test_app_state_with_gateway(gateway_api_url: &str) -> AppState {
    let db_path = std::env::temp_dir().join(format!(
        "motorcards_test_{}.db",
        Uuid::new_v4().as_simple()
    ));
    let pool = motorcards::db::create_pool(db_path.to_str().unwrap()).unwrap();
    {
        let conn = pool.get().unwrap();
        init_db(&conn).unwrap();
    }

    let gateway_config = test_gateway_config(gateway_api_url);

    AppState {
        db: pool,
        base_url: "http://localhost:3000".to_string(),
        result_page_url: "http://localhost:3000/result".to_string(),
        currency: "CLP".to_string(),
        unit_price: TEST_UNIT_PRICE,
        payment_expiry_minutes: 60,
        gateway: GatewayClient::new(&gateway_config),
        gateway_config,
        notifier: NotifyService::new(None, None, None),
    }
}

/// AppState whose gateway is unreachable (closed port).
pub fn create_test_app_state() -> AppState {
    create_test_app_state_with_gateway("http://127.0.0.1:1/api")
}

/// Create a test order with the given quantity at the test unit price.
pub fn create_test_order(conn: &Connection, quantity: i64) -> Order {
    let input = CreateOrder {
        buyer_name: "Ana Contreras".to_string(),
        buyer_email: "ana@example.com".to_string(),
        buyer_phone: "+56 9 5555 5555".to_string(),
        buyer_tax_id: None,
        quantity,
    };
    queries::create_order(conn, &input, TEST_UNIT_PRICE, "CLP").expect("Failed to create test order")
}

/// Create an active payment record for an order, returning it with its
/// freshly generated notification token.
pub fn create_test_payment_record(conn: &Connection, order_id: &str) -> PaymentRecord {
    let input = CreatePaymentRecord {
        order_id: order_id.to_string(),
        gateway_payment_id: format!("gwp_{}", Uuid::new_v4().as_simple()),
        notification_token: gen_notification_token(),
        expires_at: chrono::Utc::now().timestamp() + 3600,
    };
    queries::create_payment_record(conn, &input).expect("Failed to create test payment record")
}

/// Build a gateway status snapshot as `fetch_payment_status` would.
pub fn snapshot(status: &str) -> PaymentStatusSnapshot {
    PaymentStatusSnapshot {
        status: status.to_string(),
        status_detail: Some(format!("{} (test)", status)),
        payer_email: Some("ana@example.com".to_string()),
        payer_name: Some("Ana Contreras".to_string()),
        paid_at: Some(1_700_000_000),
        expires_at: None,
        raw_payload: format!(r#"{{"status":"{}"}}"#, status),
    }
}

/// Signature the gateway would send for a token under the default version.
pub fn sign(token: &str) -> String {
    sign_token(token, DEFAULT_API_VERSION, TEST_RECEIVER_ID, TEST_GATEWAY_SECRET)
        .expect("Failed to sign token")
}

/// Full application router (public + webhooks) without rate limiting.
pub fn test_app(state: AppState) -> Router {
    Router::new()
        .merge(motorcards::handlers::public::router_unlimited())
        .merge(motorcards::handlers::webhooks::router())
        .with_state(state)
}

// ============ Stub gateway ============

/// In-process stand-in for the payment gateway API.
///
/// `POST /payments` echoes the notification token and hands back a payment
/// id; `GET /payments/{id}` reports the configured status. Listens on an
/// ephemeral port so tests can run in parallel.
pub struct StubGateway {
    pub api_url: String,
}

pub async fn stub_gateway(status: &'static str) -> StubGateway {
    use axum::extract::Form;
    use axum::routing::{get, post};
    use std::collections::HashMap;

    async fn create_payment(
        Form(fields): Form<HashMap<String, String>>,
    ) -> axum::Json<serde_json::Value> {
        let token = fields
            .get("notification_token")
            .cloned()
            .unwrap_or_default();
        axum::Json(serde_json::json!({
            "payment_id": format!("gwp_stub_{}", Uuid::new_v4().as_simple()),
            "payment_url": "https://gateway.test/checkout/stub",
            "notification_token": token,
        }))
    }

    let app = Router::new()
        .route("/api/payments", post(create_payment))
        .route(
            "/api/payments/{id}",
            get(move || async move {
                axum::Json(serde_json::json!({
                    "status": status,
                    "status_detail": "stub",
                    "payer_email": "ana@example.com",
                    "payer_name": "Ana Contreras",
                    "paid_at": 1_700_000_000,
                }))
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind stub gateway");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    StubGateway {
        api_url: format!("http://{}/api", addr),
    }
}
