//! End-to-end scenarios driving `ingress` -> `matcher` -> `outbox` (and
//! the merchant-facing API) against a tempfile-backed SQLite database,
//! with `wiremock` standing in for the merchant's callback endpoint.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use rusqlite::params;
use serde_json::{json, Value};
use tempfile::tempdir;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use stablegate::api::{self, AppState};
use stablegate::config::OutboxSettings;
use stablegate::db::{self, SqlitePool};
use stablegate::outbox::Dispatcher;
use stablegate::provider::{ChainTipProvider, ProviderError};

/// A chain tip that advances by one block every time it's read, so a
/// dispatcher poll loop driven against it sees confirmation depth grow
/// across successive `process_confirmation_check` calls instead of
/// staying pinned at the funding transfer's own block.
struct AdvancingTip {
    start_block: u64,
    reads: AtomicU64,
}

impl AdvancingTip {
    fn new(start_block: u64) -> Self {
        Self { start_block, reads: AtomicU64::new(0) }
    }
}

#[async_trait]
impl ChainTipProvider for AdvancingTip {
    async fn chain_tip(&self, _chain: &str) -> Result<u64, ProviderError> {
        let read = self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.start_block + read)
    }
}

const PROVIDER_SECRET: &str = "provider-test-secret";

fn fast_outbox_settings() -> OutboxSettings {
    OutboxSettings {
        poll_interval_seconds: 1,
        batch_size: 20,
        max_attempts: 5,
        backoff_base_seconds: 1,
        backoff_cap_seconds: 5,
        claim_ttl_seconds: 30,
    }
}

/// Seeds a merchant row directly: merchant provisioning is operator
/// tooling, not a merchant-facing API operation, so there is no `db::`
/// function for it.
fn seed_merchant(pool: &SqlitePool, webhook_secret: &str) -> Uuid {
    let id = Uuid::new_v4();
    pool.get()
        .unwrap()
        .execute(
            "INSERT INTO merchants (id, name, webhook_secret) VALUES (?1, ?2, ?3)",
            params![id.to_string(), "acme", webhook_secret],
        )
        .unwrap();
    id
}

async fn spawn_api(pool: SqlitePool) -> String {
    let state = AppState { db_pool: pool, provider_webhook_secret: PROVIDER_SECRET.to_string() };
    let router = api::create_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn sign_provider_body(body: &str) -> (u64, String) {
    stablegate::signing::sign_now(PROVIDER_SECRET, body).unwrap()
}

async fn post_provider_webhook(client: &reqwest::Client, base: &str, body: Value) -> reqwest::Response {
    let body_str = body.to_string();
    let (timestamp, signature) = sign_provider_body(&body_str);
    client
        .post(format!("{base}/webhooks/provider"))
        .header(stablegate::signing::TIMESTAMP_HEADER, timestamp.to_string())
        .header(stablegate::signing::SIGNATURE_HEADER, signature)
        .body(body_str)
        .send()
        .await
        .unwrap()
}

fn provider_envelope(chain: &str, to: &str, amount: &str, tx_hash: &str, log_index: i64, block_number: u64) -> Value {
    json!({
        "chain": chain,
        "tx_hash": tx_hash,
        "log_index": log_index,
        "token": "USDT",
        "to": to,
        "amount": amount,
        "block_number": block_number,
        "event_id": format!("evt-{tx_hash}-{log_index}"),
    })
}

#[tokio::test]
async fn create_invoice_rejects_duplicate_merchant_order_id() {
    let temp_dir = tempdir().unwrap();
    let pool = db::init_db(temp_dir.path().join("s1.db")).unwrap();
    let merchant_id = seed_merchant(&pool, "secret");
    let base = spawn_api(pool).await;
    let client = reqwest::Client::new();

    let body = json!({
        "merchant_id": merchant_id,
        "merchant_order_id": "order-1",
        "fiat_amount_cents": 5_000,
        "allowed_options": [{"token": "USDT", "chain": "arbitrum"}],
        "callback_url": "https://merchant.example/callback",
        "expiry": (Utc::now() + ChronoDuration::hours(1)).to_rfc3339(),
    });

    let first = client.post(format!("{base}/api/invoices")).json(&body).send().await.unwrap();
    assert_eq!(first.status(), 200);

    let second = client.post(format!("{base}/api/invoices")).json(&body).send().await.unwrap();
    assert_eq!(second.status(), 409);
}

#[tokio::test]
async fn create_intent_rejects_an_option_not_on_the_invoice() {
    let temp_dir = tempdir().unwrap();
    let pool = db::init_db(temp_dir.path().join("s2.db")).unwrap();
    let merchant_id = seed_merchant(&pool, "secret");
    let base = spawn_api(pool).await;
    let client = reqwest::Client::new();

    let invoice_body = json!({
        "merchant_id": merchant_id,
        "merchant_order_id": "order-2",
        "fiat_amount_cents": 5_000,
        "allowed_options": [{"token": "USDT", "chain": "arbitrum"}],
        "callback_url": "https://merchant.example/callback",
        "expiry": (Utc::now() + ChronoDuration::hours(1)).to_rfc3339(),
    });
    let invoice: Value = client.post(format!("{base}/api/invoices")).json(&invoice_body).send().await.unwrap().json().await.unwrap();
    let invoice_id = invoice["id"].as_str().unwrap();

    let intent_body = json!({
        "token": "USDC",
        "chain": "arbitrum",
        "deposit_address": "0xabc",
        "target_atomic": "5000000",
    });
    let resp = client.post(format!("{base}/api/invoices/{invoice_id}/intents")).json(&intent_body).send().await.unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn idempotency_key_replays_the_cached_response_and_rejects_body_mismatch() {
    let temp_dir = tempdir().unwrap();
    let pool = db::init_db(temp_dir.path().join("s_idem.db")).unwrap();
    let merchant_id = seed_merchant(&pool, "secret");
    let base = spawn_api(pool).await;
    let client = reqwest::Client::new();

    let body = json!({
        "merchant_id": merchant_id,
        "merchant_order_id": "order-idem",
        "fiat_amount_cents": 1_234,
        "allowed_options": [{"token": "USDT", "chain": "arbitrum"}],
        "callback_url": "https://merchant.example/callback",
        "expiry": (Utc::now() + ChronoDuration::hours(1)).to_rfc3339(),
    });

    let first = client
        .post(format!("{base}/api/invoices"))
        .header("Idempotency-Key", "key-1")
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), 200);
    let first_json: Value = first.json().await.unwrap();

    let replay = client
        .post(format!("{base}/api/invoices"))
        .header("Idempotency-Key", "key-1")
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(replay.status(), 200);
    let replay_json: Value = replay.json().await.unwrap();
    assert_eq!(first_json, replay_json, "replayed response must match the original exactly");

    let mut different_body = body.clone();
    different_body["merchant_order_id"] = json!("order-idem-different");
    let conflicting = client
        .post(format!("{base}/api/invoices"))
        .header("Idempotency-Key", "key-1")
        .json(&different_body)
        .send()
        .await
        .unwrap();
    assert_eq!(conflicting.status(), 409);
}

#[tokio::test]
async fn provider_webhook_rejects_an_invalid_signature() {
    let temp_dir = tempdir().unwrap();
    let pool = db::init_db(temp_dir.path().join("s3.db")).unwrap();
    let base = spawn_api(pool).await;
    let client = reqwest::Client::new();

    let envelope = provider_envelope("arbitrum", "0xabc", "1000000", "0xdeadbeef", 0, 100);
    let resp = client
        .post(format!("{base}/webhooks/provider"))
        .header(stablegate::signing::TIMESTAMP_HEADER, "1700000000")
        .header(stablegate::signing::SIGNATURE_HEADER, "v1=0000")
        .json(&envelope)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn exact_payment_confirms_and_delivers_callback_to_the_merchant() {
    let temp_dir = tempdir().unwrap();
    let pool = db::init_db(temp_dir.path().join("s4.db")).unwrap();
    let mock_server = MockServer::start().await;
    let merchant_id = seed_merchant(&pool, "merchant-secret");

    Mock::given(method("POST")).and(path("/callback")).respond_with(ResponseTemplate::new(200)).mount(&mock_server).await;

    let base = spawn_api(pool.clone()).await;
    let client = reqwest::Client::new();

    let invoice_body = json!({
        "merchant_id": merchant_id,
        "merchant_order_id": "order-4",
        "fiat_amount_cents": 10_000,
        "allowed_options": [{"token": "USDT", "chain": "arbitrum"}],
        "callback_url": format!("{}/callback", mock_server.uri()),
        "expiry": (Utc::now() + ChronoDuration::hours(1)).to_rfc3339(),
    });
    let invoice: Value = client.post(format!("{base}/api/invoices")).json(&invoice_body).send().await.unwrap().json().await.unwrap();
    let invoice_id = invoice["id"].as_str().unwrap();

    let intent_body = json!({"token": "USDT", "chain": "arbitrum", "deposit_address": "0xintent4", "target_atomic": "1000000"});
    let intent: Value = client
        .post(format!("{base}/api/invoices/{invoice_id}/intents"))
        .json(&intent_body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(intent["status"], "AWAITING_FUNDS");

    // required_confirmations = 2. The funding transfer lands at block 100
    // and the stub chain tip starts at the same block, so the first poll
    // sees zero confirmation depth and has to reschedule before the tip
    // advances far enough to confirm.
    let envelope = provider_envelope("arbitrum", "0xintent4", "1000000", "0xtx4", 0, 100);
    let resp = post_provider_webhook(&client, &base, envelope).await;
    assert_eq!(resp.status(), 200);

    let status: Value = client.get(format!("{base}/api/invoices/{invoice_id}/status")).send().await.unwrap().json().await.unwrap();
    assert_eq!(status["invoice"]["status"], "PAID");
    assert_eq!(status["intents"][0]["status"], "FUNDED");

    let chain_tip = Arc::new(AdvancingTip::new(100));
    let dispatcher = Arc::new(Dispatcher::new(pool.clone(), fast_outbox_settings(), 2, chain_tip));
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let dispatcher_rx = shutdown_tx.subscribe();
    let handle = tokio::spawn(dispatcher.run(dispatcher_rx));

    // Several poll cycles: the chain tip needs to climb past the
    // confirmation threshold, then a further cycle delivers the
    // resulting InvoiceStatusChanged.
    tokio::time::sleep(Duration::from_millis(4_000)).await;
    let _ = shutdown_tx.send(());
    let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;

    let status: Value = client.get(format!("{base}/api/invoices/{invoice_id}/status")).send().await.unwrap().json().await.unwrap();
    assert_eq!(status["invoice"]["status"], "CONFIRMED");

    let received = mock_server.received_requests().await.unwrap();
    assert!(received.iter().any(|r| {
        let body: Value = serde_json::from_slice(&r.body).unwrap_or(Value::Null);
        body["status"] == "CONFIRMED" && body["deliveryId"].is_string()
    }));
}

#[tokio::test]
async fn partial_then_completing_payment_moves_through_underpaid_to_paid() {
    let temp_dir = tempdir().unwrap();
    let pool = db::init_db(temp_dir.path().join("s5.db")).unwrap();
    let merchant_id = seed_merchant(&pool, "secret");
    let base = spawn_api(pool).await;
    let client = reqwest::Client::new();

    let invoice_body = json!({
        "merchant_id": merchant_id,
        "merchant_order_id": "order-5",
        "fiat_amount_cents": 10_000,
        "allowed_options": [{"token": "USDT", "chain": "arbitrum"}],
        "callback_url": "https://merchant.example/callback",
        "expiry": (Utc::now() + ChronoDuration::hours(1)).to_rfc3339(),
    });
    let invoice: Value = client.post(format!("{base}/api/invoices")).json(&invoice_body).send().await.unwrap().json().await.unwrap();
    let invoice_id = invoice["id"].as_str().unwrap();

    let intent_body = json!({"token": "USDT", "chain": "arbitrum", "deposit_address": "0xintent5", "target_atomic": "1000000"});
    client.post(format!("{base}/api/invoices/{invoice_id}/intents")).json(&intent_body).send().await.unwrap();

    let first = provider_envelope("arbitrum", "0xintent5", "400000", "0xtx5a", 0, 100);
    post_provider_webhook(&client, &base, first).await;

    let status: Value = client.get(format!("{base}/api/invoices/{invoice_id}/status")).send().await.unwrap().json().await.unwrap();
    assert_eq!(status["invoice"]["status"], "UNDERPAID");

    let second = provider_envelope("arbitrum", "0xintent5", "600000", "0xtx5b", 0, 101);
    post_provider_webhook(&client, &base, second).await;

    let status: Value = client.get(format!("{base}/api/invoices/{invoice_id}/status")).send().await.unwrap().json().await.unwrap();
    assert_eq!(status["invoice"]["status"], "PAID");
    assert_eq!(status["intents"][0]["credited_atomic"], "1000000");
}

#[tokio::test]
async fn overpayment_is_reported_alongside_the_paid_transition() {
    let temp_dir = tempdir().unwrap();
    let pool = db::init_db(temp_dir.path().join("s6.db")).unwrap();
    let merchant_id = seed_merchant(&pool, "secret");
    let base = spawn_api(pool.clone()).await;
    let client = reqwest::Client::new();

    let invoice_body = json!({
        "merchant_id": merchant_id,
        "merchant_order_id": "order-6",
        "fiat_amount_cents": 10_000,
        "allowed_options": [{"token": "USDT", "chain": "arbitrum"}],
        "callback_url": "https://merchant.example/callback",
        "expiry": (Utc::now() + ChronoDuration::hours(1)).to_rfc3339(),
    });
    let invoice: Value = client.post(format!("{base}/api/invoices")).json(&invoice_body).send().await.unwrap().json().await.unwrap();
    let invoice_id = invoice["id"].as_str().unwrap();

    let intent_body = json!({"token": "USDT", "chain": "arbitrum", "deposit_address": "0xintent6", "target_atomic": "1000000"});
    client.post(format!("{base}/api/invoices/{invoice_id}/intents")).json(&intent_body).send().await.unwrap();

    let overpaying = provider_envelope("arbitrum", "0xintent6", "1500000", "0xtx6", 0, 100);
    post_provider_webhook(&client, &base, overpaying).await;

    let status: Value = client.get(format!("{base}/api/invoices/{invoice_id}/status")).send().await.unwrap().json().await.unwrap();
    assert_eq!(status["invoice"]["status"], "PAID");
    assert_eq!(status["intents"][0]["status"], "OVERFUNDED");

    let outbox: Vec<Value> = client.get(format!("{base}/admin/outbox")).send().await.unwrap().json().await.unwrap();
    assert!(outbox.iter().any(|r| r["kind"] == "OVERPAYMENT"));
}

#[tokio::test]
async fn a_transfer_seen_before_its_intent_is_rebound_and_credited_on_intent_creation() {
    let temp_dir = tempdir().unwrap();
    let pool = db::init_db(temp_dir.path().join("s7.db")).unwrap();
    let merchant_id = seed_merchant(&pool, "secret");
    let base = spawn_api(pool).await;
    let client = reqwest::Client::new();

    // Transfer arrives at an address no intent has claimed yet.
    let early = provider_envelope("arbitrum", "0xintent7", "1000000", "0xtx7", 0, 100);
    let resp = post_provider_webhook(&client, &base, early).await;
    assert_eq!(resp.status(), 200);

    let invoice_body = json!({
        "merchant_id": merchant_id,
        "merchant_order_id": "order-7",
        "fiat_amount_cents": 10_000,
        "allowed_options": [{"token": "USDT", "chain": "arbitrum"}],
        "callback_url": "https://merchant.example/callback",
        "expiry": (Utc::now() + ChronoDuration::hours(1)).to_rfc3339(),
    });
    let invoice: Value = client.post(format!("{base}/api/invoices")).json(&invoice_body).send().await.unwrap().json().await.unwrap();
    let invoice_id = invoice["id"].as_str().unwrap();

    let intent_body = json!({"token": "USDT", "chain": "arbitrum", "deposit_address": "0xintent7", "target_atomic": "1000000"});
    client.post(format!("{base}/api/invoices/{invoice_id}/intents")).json(&intent_body).send().await.unwrap();

    let status: Value = client.get(format!("{base}/api/invoices/{invoice_id}/status")).send().await.unwrap().json().await.unwrap();
    assert_eq!(status["invoice"]["status"], "PAID");
    assert_eq!(status["intents"][0]["credited_atomic"], "1000000");
}

#[tokio::test]
async fn admin_cancel_moves_a_pending_invoice_to_cancelled_and_is_a_no_op_once_terminal() {
    let temp_dir = tempdir().unwrap();
    let pool = db::init_db(temp_dir.path().join("s8.db")).unwrap();
    let merchant_id = seed_merchant(&pool, "secret");
    let base = spawn_api(pool).await;
    let client = reqwest::Client::new();

    let invoice_body = json!({
        "merchant_id": merchant_id,
        "merchant_order_id": "order-8",
        "fiat_amount_cents": 10_000,
        "allowed_options": [{"token": "USDT", "chain": "arbitrum"}],
        "callback_url": "https://merchant.example/callback",
        "expiry": (Utc::now() + ChronoDuration::hours(1)).to_rfc3339(),
    });
    let invoice: Value = client.post(format!("{base}/api/invoices")).json(&invoice_body).send().await.unwrap().json().await.unwrap();
    let invoice_id = invoice["id"].as_str().unwrap();

    let cancelled = client.post(format!("{base}/admin/invoices/{invoice_id}/cancel")).send().await.unwrap();
    assert_eq!(cancelled.status(), 200);
    let cancelled_json: Value = cancelled.json().await.unwrap();
    assert_eq!(cancelled_json["status"], "CANCELLED");

    let second_cancel = client.post(format!("{base}/admin/invoices/{invoice_id}/cancel")).send().await.unwrap();
    assert_eq!(second_cancel.status(), 409);
}
