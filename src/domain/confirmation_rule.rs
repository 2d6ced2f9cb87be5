//! Advances a `Paid` intent/invoice to `Confirmed` once every funding
//! transfer has cleared the chain's required confirmation depth, and
//! detects post-confirmation reorg regressions.

use uuid::Uuid;

use crate::domain::invoice::InvoiceStatus;
use crate::domain::outbox_record::OutboxKind;
use crate::domain::transfer::effective_confirmations;

pub struct FundingTransfer {
    pub id: Uuid,
    pub block_number: u64,
}

/// Outcome of one confirmation check against the current chain tip.
pub enum ConfirmationOutcome {
    /// Not every funding transfer has reached `required_confirmations`
    /// yet; reschedule the check.
    StillWaiting,
    /// Every funding transfer cleared the threshold; invoice/intent may
    /// advance to `Confirmed`.
    Confirmed { outbox_records: Vec<OutboxKind> },
    /// A previously `Confirmed` invoice's funding transfer regressed
    /// below threshold because of a reorg. The `Confirmed` notification
    /// already sent to the merchant is not retracted; this is reported
    /// purely for operator visibility.
    RegressedAfterConfirm { outbox_records: Vec<OutboxKind> },
}

/// Checks whether `funding_transfers` have all cleared
/// `required_confirmations` at `current_block`.
///
/// `already_confirmed` distinguishes a first-time confirmation check
/// (invoice currently `Paid`) from a post-confirmation audit (invoice
/// already `Confirmed`), which only emits `ChargebackSuspected` and never
/// regresses the persisted status.
pub fn check_confirmations(
    invoice_id: Uuid,
    intent_id: Uuid,
    funding_transfers: &[FundingTransfer],
    current_block: u64,
    required_confirmations: u64,
    already_confirmed: bool,
) -> ConfirmationOutcome {
    let all_cleared = funding_transfers
        .iter()
        .all(|t| effective_confirmations(current_block, t.block_number) >= required_confirmations);

    if already_confirmed {
        if all_cleared {
            return ConfirmationOutcome::StillWaiting;
        }
        let suspect = funding_transfers
            .iter()
            .find(|t| effective_confirmations(current_block, t.block_number) < required_confirmations)
            .expect("all_cleared is false, so at least one transfer is below threshold");
        return ConfirmationOutcome::RegressedAfterConfirm {
            outbox_records: vec![OutboxKind::ChargebackSuspected {
                invoice_id,
                intent_id,
                transfer_id: suspect.id,
            }],
        };
    }

    if !all_cleared {
        return ConfirmationOutcome::StillWaiting;
    }

    ConfirmationOutcome::Confirmed {
        outbox_records: vec![OutboxKind::InvoiceStatusChanged {
            invoice_id,
            new_status: InvoiceStatus::Confirmed,
        }],
    }
}
