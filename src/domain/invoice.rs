use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::money::FiatCents;

/// Invoice lifecycle. `Confirmed`, `Expired`, `Cancelled`, and
/// `ExpiredWithPartial` are terminal — no transition is defined out of
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Pending,
    Underpaid,
    Paid,
    Confirmed,
    Expired,
    /// A partially-funded, non-terminal intent existed when the invoice
    /// expired. This status is
    /// observable, distinct from a plain `Expired`.
    ExpiredWithPartial,
    Cancelled,
}

impl InvoiceStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            InvoiceStatus::Confirmed | InvoiceStatus::Expired | InvoiceStatus::ExpiredWithPartial | InvoiceStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AllowedOption {
    pub token: String,
    pub chain: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub merchant_id: Uuid,
    pub merchant_order_id: String,
    pub fiat_amount: FiatCents,
    pub allowed_options: Vec<AllowedOption>,
    pub callback_url: String,
    pub status: InvoiceStatus,
    pub expiry: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Whether any state change may still be applied. Mirrors Invariant 3
    /// once terminal, nothing further is persisted.
    pub fn is_mutable(&self) -> bool {
        !self.status.is_terminal()
    }
}
