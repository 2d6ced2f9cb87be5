use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::invoice::InvoiceStatus;
use crate::money::AtomicAmount;

/// Side-effect kinds the credit/confirmation/expiry rules can emit.
/// Co-committed with the state change that produced them, in the same
/// database transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxKind {
    InvoiceStatusChanged {
        invoice_id: Uuid,
        new_status: InvoiceStatus,
    },
    /// Credited sum exceeded an intent's target while the invoice was
    /// still non-terminal.
    Overpayment {
        invoice_id: Uuid,
        intent_id: Uuid,
        surplus_atomic: AtomicAmount,
    },
    /// A transfer arrived for an intent with no matching invoice funding
    /// path before the invoice reached a terminal state... used when the
    /// invoice was already terminal at credit time.
    LateFunds {
        invoice_id: Uuid,
        intent_id: Uuid,
        transfer_id: Uuid,
    },
    /// Same as `LateFunds`, but specifically an overpay observed after
    /// the invoice already reached a terminal state.
    OverpaymentAfterTerminal {
        invoice_id: Uuid,
        intent_id: Uuid,
        transfer_id: Uuid,
        amount_atomic: AtomicAmount,
    },
    /// Intent reached `Funded`/`Overfunded`; schedule confirmation
    /// polling before emitting `InvoiceStatusChanged(Confirmed)`.
    PaidAwaitingConfirmation {
        invoice_id: Uuid,
        intent_id: Uuid,
    },
    /// Observability only: a previously-confirmed invoice's funding
    /// transfer dropped below threshold due to a reorg. The merchant has
    /// already been notified of CONFIRMED and that is not retracted.
    ChargebackSuspected {
        invoice_id: Uuid,
        intent_id: Uuid,
        transfer_id: Uuid,
    },
}

impl OutboxKind {
    pub fn invoice_id(&self) -> Uuid {
        match self {
            OutboxKind::InvoiceStatusChanged { invoice_id, .. }
            | OutboxKind::Overpayment { invoice_id, .. }
            | OutboxKind::LateFunds { invoice_id, .. }
            | OutboxKind::OverpaymentAfterTerminal { invoice_id, .. }
            | OutboxKind::PaidAwaitingConfirmation { invoice_id, .. }
            | OutboxKind::ChargebackSuspected { invoice_id, .. } => *invoice_id,
        }
    }

    /// The intent this record is about, when it concerns one specific
    /// intent rather than the invoice as a whole.
    pub fn intent_id(&self) -> Option<Uuid> {
        match self {
            OutboxKind::InvoiceStatusChanged { .. } => None,
            OutboxKind::Overpayment { intent_id, .. }
            | OutboxKind::LateFunds { intent_id, .. }
            | OutboxKind::OverpaymentAfterTerminal { intent_id, .. }
            | OutboxKind::PaidAwaitingConfirmation { intent_id, .. }
            | OutboxKind::ChargebackSuspected { intent_id, .. } => Some(*intent_id),
        }
    }

    /// The event-type string persisted to the `outbox.kind` column and
    /// used for per-merchant suppression of informational callbacks.
    pub fn type_name(&self) -> &'static str {
        match self {
            OutboxKind::InvoiceStatusChanged { .. } => "INVOICE_STATUS_CHANGED",
            OutboxKind::Overpayment { .. } => "OVERPAYMENT",
            OutboxKind::LateFunds { .. } => "LATE_FUNDS",
            OutboxKind::OverpaymentAfterTerminal { .. } => "OVERPAYMENT_AFTER_TERMINAL",
            OutboxKind::PaidAwaitingConfirmation { .. } => "PAID_AWAITING_CONFIRMATION",
            OutboxKind::ChargebackSuspected { .. } => "CHARGEBACK_SUSPECTED",
        }
    }

    /// Whether this kind is purely an operator/observability signal and
    /// never dispatched to the merchant, regardless of suppression
    /// settings.
    pub fn is_observability_only(&self) -> bool {
        matches!(self, OutboxKind::ChargebackSuspected { .. })
    }

    /// Whether this kind self-reschedules rather than being a one-shot
    /// delivery (the confirmation-polling task).
    pub fn is_self_rescheduling(&self) -> bool {
        matches!(self, OutboxKind::PaidAwaitingConfirmation { .. })
    }
}
