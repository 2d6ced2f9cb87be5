//! Request/response DTOs for the merchant- and operator-facing REST API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::invoice::{AllowedOption, Invoice, InvoiceStatus};
use crate::domain::intent::{IntentStatus, PaymentIntent};
use crate::money::AtomicAmount;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateInvoiceRequest {
    pub merchant_id: Uuid,
    pub merchant_order_id: String,
    pub fiat_amount_cents: i64,
    pub allowed_options: Vec<AllowedOption>,
    pub callback_url: String,
    pub expiry: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InvoiceResponse {
    pub id: Uuid,
    pub merchant_order_id: String,
    pub fiat_amount_cents: i64,
    pub allowed_options: Vec<AllowedOption>,
    pub status: InvoiceStatus,
    pub expiry: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Invoice> for InvoiceResponse {
    fn from(invoice: Invoice) -> Self {
        InvoiceResponse {
            id: invoice.id,
            merchant_order_id: invoice.merchant_order_id,
            fiat_amount_cents: invoice.fiat_amount.0,
            allowed_options: invoice.allowed_options,
            status: invoice.status,
            expiry: invoice.expiry,
            created_at: invoice.created_at,
            updated_at: invoice.updated_at,
        }
    }
}

/// Deposit address is assumed pre-allocated by an out-of-scope custody
/// system and supplied here; this gateway never derives addresses itself.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateIntentRequest {
    pub token: String,
    pub chain: String,
    pub deposit_address: String,
    pub target_atomic: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IntentResponse {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub token: String,
    pub chain: String,
    pub deposit_address: String,
    pub target_atomic: String,
    pub credited_atomic: String,
    pub status: IntentStatus,
}

impl From<PaymentIntent> for IntentResponse {
    fn from(intent: PaymentIntent) -> Self {
        IntentResponse {
            id: intent.id,
            invoice_id: intent.invoice_id,
            token: intent.token,
            chain: intent.chain,
            deposit_address: intent.deposit_address,
            target_atomic: intent.target_atomic.to_string(),
            credited_atomic: intent.credited_atomic.to_string(),
            status: intent.status,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InvoiceStatusResponse {
    pub invoice: InvoiceResponse,
    pub intents: Vec<IntentResponse>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OutboxSummary {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub kind: String,
    pub attempt_count: i64,
}

pub fn parse_atomic(s: &str) -> Result<AtomicAmount, String> {
    s.parse::<AtomicAmount>().map_err(|e| e.to_string())
}
