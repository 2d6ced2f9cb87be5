use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::money::AtomicAmount;

/// Intent lifecycle. `Confirmed`, `Expired`, and
/// `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentStatus {
    AwaitingFunds,
    PartiallyFunded,
    Funded,
    Overfunded,
    Expired,
    Cancelled,
    Confirmed,
}

impl IntentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, IntentStatus::Expired | IntentStatus::Cancelled | IntentStatus::Confirmed)
    }

    /// Whether this status represents funds having reached or exceeded
    /// the intent's target (Funded or Overfunded).
    pub fn is_payable(self) -> bool {
        matches!(self, IntentStatus::Funded | IntentStatus::Overfunded | IntentStatus::Confirmed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub token: String,
    pub chain: String,
    pub deposit_address: String,
    pub target_atomic: AtomicAmount,
    pub credited_atomic: AtomicAmount,
    pub status: IntentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
