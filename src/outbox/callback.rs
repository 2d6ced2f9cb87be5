//! Builds the merchant-facing callback body: a fixed wire shape kept
//! stable across internal refactors of [`OutboxKind`], rather than
//! serializing the internal tagged enum directly.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::invoice::InvoiceStatus;
use crate::domain::outbox_record::OutboxKind;
use crate::money::AtomicAmount;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MerchantCallback {
    pub delivery_id: Uuid,
    pub invoice_id: Uuid,
    pub merchant_order_id: String,
    pub status: String,
    pub paid_amount_atomic: String,
    pub token: String,
    pub chain: String,
    pub tx_hashes: Vec<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Everything about the intent/transfers [`build`] needs beyond what the
/// outbox row and its invoice already carry.
pub struct FundingContext {
    pub token: String,
    pub chain: String,
    pub paid_amount_atomic: AtomicAmount,
    pub tx_hashes: Vec<String>,
}

/// Maps an [`OutboxKind`] to the wire-level status string. Panics on the
/// self-rescheduling and observability-only kinds, which the dispatcher
/// never passes to this function — see `OutboxKind::is_self_rescheduling`
/// and `OutboxKind::is_observability_only`.
fn wire_status(kind: &OutboxKind) -> &'static str {
    match kind {
        OutboxKind::InvoiceStatusChanged { new_status, .. } => match new_status {
            InvoiceStatus::Pending => "PENDING",
            InvoiceStatus::Underpaid => "UNDERPAID",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::Confirmed => "CONFIRMED",
            InvoiceStatus::Expired | InvoiceStatus::ExpiredWithPartial => "EXPIRED",
            InvoiceStatus::Cancelled => "CANCELLED",
        },
        OutboxKind::Overpayment { .. } | OutboxKind::OverpaymentAfterTerminal { .. } => "OVERPAID",
        OutboxKind::LateFunds { .. } => "LATE_FUNDS",
        OutboxKind::PaidAwaitingConfirmation { .. } | OutboxKind::ChargebackSuspected { .. } => {
            unreachable!("self-rescheduling and observability-only kinds are never built for delivery")
        },
    }
}

pub fn build(delivery_id: Uuid, invoice_id: Uuid, merchant_order_id: &str, kind: &OutboxKind, funding: FundingContext, occurred_at: DateTime<Utc>) -> MerchantCallback {
    MerchantCallback {
        delivery_id,
        invoice_id,
        merchant_order_id: merchant_order_id.to_string(),
        status: wire_status(kind).to_string(),
        paid_amount_atomic: funding.paid_amount_atomic.to_string(),
        token: funding.token,
        chain: funding.chain,
        tx_hashes: funding.tx_hashes,
        occurred_at,
    }
}
