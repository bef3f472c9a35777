//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, Response},
};
use hmac::{Hmac, Mac};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, params};
use rust_decimal::Decimal;
use serde_json::Value;
use sha2::Sha256;

pub use scriptshop::db::{AppState, DbPool, queries};
pub use scriptshop::events::{DomainEvent, EventBus};
pub use scriptshop::models::*;
use scriptshop::payments::{PaymentSettings, SvgQrRenderer, funding};
use scriptshop::uploads::SlipStore;

pub const TEST_PROMPTPAY_ID: &str = "0812345678";
pub const TEST_WEBHOOK_SECRET: &str = "whsec_scriptshop_test";
pub const MULTIPART_BOUNDARY: &str = "scriptshop-test-boundary";

/// Single-connection in-memory pool. One connection keeps every caller on the
/// same database.
pub fn memory_pool() -> DbPool {
    let manager = SqliteConnectionManager::memory();
    Pool::builder().max_size(1).build(manager).unwrap()
}

pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    scriptshop::db::init_db(&conn).unwrap();
    conn
}

pub fn test_payment_settings() -> PaymentSettings {
    PaymentSettings {
        promptpay_id: TEST_PROMPTPAY_ID.to_string(),
        intent_ttl_secs: 15 * 60,
        salt_enabled: true,
        max_amount_minor: 100_000 * 100,
        webhook_secret: None,
    }
}

fn build_state(db: DbPool, audit: DbPool, upload_dir: &Path) -> AppState {
    scriptshop::db::init_db(&db.get().unwrap()).unwrap();
    scriptshop::db::init_audit_db(&audit.get().unwrap()).unwrap();
    AppState {
        db,
        audit,
        audit_log_enabled: true,
        payments: test_payment_settings(),
        slips: SlipStore::new(upload_dir, 1024 * 1024),
        session_ttl_secs: 3600,
        events: EventBus::default(),
        qr: Arc::new(SvgQrRenderer::default()),
    }
}

/// In-memory state for HTTP tests that never store a slip.
pub fn create_test_app_state() -> AppState {
    let upload_dir = std::env::temp_dir().join("scriptshop-tests-unused");
    build_state(memory_pool(), memory_pool(), &upload_dir)
}

/// File-backed state rooted in `dir`, with the same pool setup as production.
/// Needed for multi-connection concurrency tests and slip uploads.
pub fn create_file_backed_state(dir: &Path) -> AppState {
    let db = scriptshop::db::create_pool(dir.join("scriptshop.db")).unwrap();
    let audit = scriptshop::db::create_pool(dir.join("audit.db")).unwrap();
    build_state(db, audit, &dir.join("slips"))
}

pub fn app(state: AppState) -> Router {
    scriptshop::handlers::router(state)
}

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

// ============ Fixtures ============

pub fn create_test_user(conn: &Connection, discord_id: &str) -> User {
    queries::upsert_user_from_discord(
        conn,
        &DiscordProfile {
            discord_id: discord_id.to_string(),
            username: format!("player-{}", discord_id),
            avatar: None,
        },
    )
    .unwrap()
}

pub fn create_test_admin(
    conn: &Connection,
    discord_id: &str,
    role: Role,
    permissions: &[Permission],
) -> User {
    let user = create_test_user(conn, discord_id);
    let update = UpdateUserRoles {
        role,
        permissions: permissions.to_vec(),
    };
    queries::update_user_roles(conn, &user.id, role, &update.normalized_permissions()).unwrap();
    queries::get_user_by_id(conn, &user.id).unwrap().unwrap()
}

pub fn create_test_script(conn: &Connection, name: &str, resource_name: &str, price: i64) -> Script {
    queries::create_script(
        conn,
        &CreateScript {
            name: name.to_string(),
            resource_name: resource_name.to_string(),
            price,
            description: None,
        },
    )
    .unwrap()
}

pub fn create_session_token(conn: &Connection, user_id: &str) -> String {
    queries::create_session(conn, user_id, 3600).unwrap()
}

pub fn set_balance(conn: &Connection, user_id: &str, points: i64) {
    conn.execute(
        "UPDATE users SET points = ?1 WHERE id = ?2",
        params![points, user_id],
    )
    .unwrap();
}

pub fn balance_of(conn: &Connection, user_id: &str) -> i64 {
    queries::get_user_points(conn, user_id).unwrap().unwrap()
}

pub fn point_entry_count(conn: &Connection, user_id: &str) -> i64 {
    conn.query_row(
        "SELECT COUNT(*) FROM point_entries WHERE user_id = ?1",
        params![user_id],
        |row| row.get(0),
    )
    .unwrap()
}

pub fn create_test_qr_intent(conn: &Connection, user_id: &str, amount: &str, now: i64) -> FundingIntent {
    funding::create_intent(
        conn,
        &test_payment_settings(),
        &EventBus::default(),
        &funding::IntentRequest {
            user_id,
            amount: dec(amount),
            method: FundingMethod::Qr,
            evidence_url: None,
        },
        now,
    )
    .unwrap()
}

pub fn create_test_slip_intent(conn: &Connection, user_id: &str, amount: &str) -> FundingIntent {
    funding::create_intent(
        conn,
        &test_payment_settings(),
        &EventBus::default(),
        &funding::IntentRequest {
            user_id,
            amount: dec(amount),
            method: FundingMethod::Slip,
            evidence_url: Some("/uploads/slips/slip-test.png"),
        },
        now(),
    )
    .unwrap()
}

pub fn add_to_cart(conn: &Connection, user_id: &str, script_id: &str) {
    assert!(queries::add_cart_item(conn, user_id, script_id).unwrap());
}

// ============ HTTP helpers ============

pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn read_json(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).expect("Response should be valid JSON")
}

pub fn sign_webhook(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// A multipart/form-data body with an `amount` text field and an optional
/// `slip` file field.
pub fn multipart_body(amount: Option<&str>, slip: Option<(&str, &str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(amount) = amount {
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"amount\"\r\n\r\n{amount}\r\n",
                b = MULTIPART_BOUNDARY
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, content_type, bytes)) = slip {
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"slip\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n",
                b = MULTIPART_BOUNDARY
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());
    body
}

pub fn multipart_request(uri: &str, token: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Authorization", format!("Bearer {}", token))
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={}", MULTIPART_BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}
