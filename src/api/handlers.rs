use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{
    parse_atomic, CreateIntentRequest, CreateInvoiceRequest, IntentResponse, InvoiceResponse, InvoiceStatusResponse,
    OutboxSummary,
};
use crate::api::AppState;
use crate::db;
use crate::domain::intent::{IntentStatus, PaymentIntent};
use crate::domain::invoice::{Invoice, InvoiceStatus};
use crate::idempotency;
use crate::ingress;
use crate::matcher;
use crate::money::{AtomicAmount, FiatCents};
use crate::signing;

/// Looks up a cached response for `(scope, key)`, returning a conflict if
/// the key was reused with a different request body.
async fn find_cached_response<T: serde::de::DeserializeOwned>(
    state: &AppState,
    scope: &str,
    key: &str,
    fingerprint: &str,
) -> Result<Option<T>, ApiError> {
    let pool = state.db_pool.clone();
    let key = key.to_string();
    let scope = scope.to_string();
    let existing = tokio::task::spawn_blocking(move || db::find_idempotency_record(&pool.get()?, &scope, &key))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(crate::error::GatewayError::from)?;

    let Some(record) = existing else { return Ok(None) };

    if record.fingerprint != fingerprint {
        return Err(ApiError::Conflict(format!("Idempotency-Key reused with a different request body in scope {scope}")));
    }

    let cached = serde_json::from_str(&record.response_body).map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Some(cached))
}

async fn store_cached_response<T: serde::Serialize>(
    state: &AppState,
    scope: &str,
    key: &str,
    fingerprint: &str,
    response: &T,
) -> Result<(), ApiError> {
    let body = serde_json::to_string(response).map_err(|e| ApiError::Internal(e.to_string()))?;
    let pool = state.db_pool.clone();
    let key = key.to_string();
    let scope = scope.to_string();
    let fingerprint = fingerprint.to_string();
    tokio::task::spawn_blocking(move || db::store_idempotency_record(&pool.get()?, &scope, &key, &fingerprint, &body, 200))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(crate::error::GatewayError::from)?;
    Ok(())
}

#[utoipa::path(post, path = "/api/invoices", request_body = CreateInvoiceRequest, responses((status = 201, body = InvoiceResponse)))]
pub async fn create_invoice(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Json<InvoiceResponse>, ApiError> {
    let body_str = std::str::from_utf8(&body).map_err(|e| ApiError::Validation(e.to_string()))?;
    let req: CreateInvoiceRequest = serde_json::from_str(body_str).map_err(|e| ApiError::Validation(e.to_string()))?;
    let idempotency_key = headers.get(idempotency::IDEMPOTENCY_KEY_HEADER).and_then(|v| v.to_str().ok()).map(str::to_string);
    let fingerprint = idempotency::fingerprint(body_str);

    if let Some(key) = &idempotency_key {
        if let Some(cached) = find_cached_response::<InvoiceResponse>(&state, "create_invoice", key, &fingerprint).await? {
            return Ok(Json(cached));
        }
    }

    let fiat_amount = FiatCents::new(req.fiat_amount_cents).map_err(|e| ApiError::Validation(e.to_string()))?;

    let pool = state.db_pool.clone();
    let merchant_id = req.merchant_id;
    let order_id = req.merchant_order_id.clone();
    let existing = tokio::task::spawn_blocking(move || db::find_invoice_by_merchant_order_id(&pool.get()?, merchant_id, &order_id))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(crate::error::GatewayError::from)?;

    if existing.is_some() {
        return Err(ApiError::Conflict(format!(
            "invoice already exists for merchant {} order {}",
            req.merchant_id, req.merchant_order_id
        )));
    }

    let now = Utc::now();
    let invoice = Invoice {
        id: Uuid::new_v4(),
        merchant_id: req.merchant_id,
        merchant_order_id: req.merchant_order_id,
        fiat_amount,
        allowed_options: req.allowed_options,
        callback_url: req.callback_url,
        status: InvoiceStatus::Pending,
        expiry: req.expiry,
        created_at: now,
        updated_at: now,
    };

    let pool = state.db_pool.clone();
    let to_insert = invoice.clone();
    tokio::task::spawn_blocking(move || db::insert_invoice(&pool.get()?, &to_insert))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(crate::error::GatewayError::from)?;

    let response = InvoiceResponse::from(invoice);
    if let Some(key) = &idempotency_key {
        store_cached_response(&state, "create_invoice", key, &fingerprint, &response).await?;
    }

    Ok(Json(response))
}

#[utoipa::path(get, path = "/api/invoices/{id}", responses((status = 200, body = InvoiceResponse)))]
pub async fn get_invoice(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<InvoiceResponse>, ApiError> {
    let pool = state.db_pool.clone();
    let invoice = tokio::task::spawn_blocking(move || db::get_invoice_by_id(&pool.get()?, id))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(crate::error::GatewayError::from)?
        .ok_or_else(|| ApiError::NotFound(format!("invoice {id} not found")))?;

    Ok(Json(invoice.into()))
}

#[utoipa::path(get, path = "/api/invoices/{id}/status", responses((status = 200, body = InvoiceStatusResponse)))]
pub async fn get_invoice_status(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<InvoiceStatusResponse>, ApiError> {
    let pool = state.db_pool.clone();
    let invoice = tokio::task::spawn_blocking(move || db::get_invoice_by_id(&pool.get()?, id))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(crate::error::GatewayError::from)?
        .ok_or_else(|| ApiError::NotFound(format!("invoice {id} not found")))?;

    let pool = state.db_pool.clone();
    let intents = tokio::task::spawn_blocking(move || db::list_intents_for_invoice(&pool.get()?, id))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(crate::error::GatewayError::from)?;

    Ok(Json(InvoiceStatusResponse {
        invoice: invoice.into(),
        intents: intents.into_iter().map(IntentResponse::from).collect(),
    }))
}

#[utoipa::path(post, path = "/api/invoices/{id}/intents", request_body = CreateIntentRequest, responses((status = 201, body = IntentResponse)))]
pub async fn create_intent(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<IntentResponse>, ApiError> {
    let body_str = std::str::from_utf8(&body).map_err(|e| ApiError::Validation(e.to_string()))?;
    let req: CreateIntentRequest = serde_json::from_str(body_str).map_err(|e| ApiError::Validation(e.to_string()))?;
    let idempotency_key = headers.get(idempotency::IDEMPOTENCY_KEY_HEADER).and_then(|v| v.to_str().ok()).map(str::to_string);
    let fingerprint = idempotency::fingerprint(body_str);
    let scope = format!("create_intent:{invoice_id}");

    if let Some(key) = &idempotency_key {
        if let Some(cached) = find_cached_response::<IntentResponse>(&state, &scope, key, &fingerprint).await? {
            return Ok(Json(cached));
        }
    }

    let target_atomic: AtomicAmount = parse_atomic(&req.target_atomic).map_err(ApiError::Validation)?;

    let pool = state.db_pool.clone();
    let invoice = tokio::task::spawn_blocking(move || db::get_invoice_by_id(&pool.get()?, invoice_id))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(crate::error::GatewayError::from)?
        .ok_or_else(|| ApiError::NotFound(format!("invoice {invoice_id} not found")))?;

    if !invoice.is_mutable() {
        return Err(ApiError::Conflict(format!("invoice {invoice_id} is already terminal")));
    }

    let allowed = invoice.allowed_options.iter().any(|o| o.token == req.token && o.chain == req.chain);
    if !allowed {
        return Err(ApiError::Validation(format!("({}, {}) is not an allowed option for this invoice", req.token, req.chain)));
    }

    let now = Utc::now();
    let intent = PaymentIntent {
        id: Uuid::new_v4(),
        invoice_id,
        token: req.token.clone(),
        chain: req.chain.clone(),
        deposit_address: req.deposit_address.clone(),
        target_atomic,
        credited_atomic: AtomicAmount::ZERO,
        status: IntentStatus::AwaitingFunds,
        created_at: now,
        updated_at: now,
    };

    let pool = state.db_pool.clone();
    let to_insert = intent.clone();
    tokio::task::spawn_blocking(move || db::insert_intent(&pool.get()?, &to_insert))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(crate::error::GatewayError::from)?;

    // Pick up any transfer that arrived at this address before the intent existed.
    let pool = state.db_pool.clone();
    let chain = intent.chain.clone();
    let token = intent.token.clone();
    let address = intent.deposit_address.clone();
    let intent_id = intent.id;
    tokio::task::spawn_blocking(move || matcher::rebind_and_credit_backlog(&mut pool.get()?, &chain, &token, &address, intent_id))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(ApiError::from)?;

    let response = IntentResponse::from(intent);
    if let Some(key) = &idempotency_key {
        store_cached_response(&state, &scope, key, &fingerprint, &response).await?;
    }

    Ok(Json(response))
}

#[utoipa::path(post, path = "/admin/invoices/{id}/cancel", responses((status = 200, body = InvoiceResponse)))]
pub async fn cancel_invoice(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<InvoiceResponse>, ApiError> {
    let pool = state.db_pool.clone();
    let invoice = tokio::task::spawn_blocking(move || db::get_invoice_by_id(&pool.get()?, id))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(crate::error::GatewayError::from)?
        .ok_or_else(|| ApiError::NotFound(format!("invoice {id} not found")))?;

    if !invoice.is_mutable() {
        return Err(ApiError::Conflict(format!("invoice {id} is already terminal")));
    }

    let pool = state.db_pool.clone();
    tokio::task::spawn_blocking(move || db::update_invoice_status(&pool.get()?, id, InvoiceStatus::Cancelled, Utc::now()))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(crate::error::GatewayError::from)?;

    let mut cancelled = invoice;
    cancelled.status = InvoiceStatus::Cancelled;
    Ok(Json(cancelled.into()))
}

#[utoipa::path(post, path = "/webhooks/provider", responses((status = 202, description = "accepted")))]
pub async fn receive_provider_webhook(State(state): State<AppState>, headers: HeaderMap, body: String) -> Result<Json<serde_json::Value>, ApiError> {
    let timestamp: u64 = headers
        .get(signing::TIMESTAMP_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| ApiError::Validation("missing or malformed timestamp header".into()))?;

    let signature = headers
        .get(signing::SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Validation("missing signature header".into()))?
        .to_string();

    let secret = state.provider_webhook_secret.clone();
    let event = ingress::verify_and_normalize(&secret, timestamp, &body, &signature)?;

    let pool = state.db_pool.clone();
    tokio::task::spawn_blocking(move || matcher::process_transfer_event(&mut pool.get()?, &event))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(ApiError::from)?;

    Ok(Json(json!({ "status": "accepted" })))
}

#[utoipa::path(get, path = "/admin/outbox", responses((status = 200, body = [OutboxSummary])))]
pub async fn list_outbox(State(state): State<AppState>) -> Result<Json<Vec<OutboxSummary>>, ApiError> {
    let pool = state.db_pool.clone();
    let rows = tokio::task::spawn_blocking(move || db::list_outbox_records(&pool.get()?, 100))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(crate::error::GatewayError::from)?;

    Ok(Json(
        rows.into_iter()
            .map(|r| OutboxSummary { id: r.id, invoice_id: r.invoice_id, kind: r.kind.type_name().to_string(), attempt_count: r.attempt_count })
            .collect(),
    ))
}
