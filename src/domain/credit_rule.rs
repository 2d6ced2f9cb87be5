//! The credit rule: how a single confirmed-enough transfer updates an
//! intent and its parent invoice. Pure — no I/O, no clock reads beyond
//! what the caller passes in.

use uuid::Uuid;

use crate::domain::intent::{IntentStatus, PaymentIntent};
use crate::domain::invoice::{Invoice, InvoiceStatus};
use crate::domain::outbox_record::OutboxKind;
use crate::domain::transfer::Transfer;

/// Result of folding one transfer into one intent.
pub struct CreditOutcome {
    pub new_intent_status: IntentStatus,
    pub new_credited_atomic: crate::money::AtomicAmount,
    pub new_invoice_status: InvoiceStatus,
    pub outbox_records: Vec<OutboxKind>,
}

/// Applies `transfer` to `intent`, folding it into the running credited
/// total and deriving the resulting intent/invoice statuses.
///
/// If `invoice` is already terminal, the credit is recorded for audit
/// purposes only: no status changes, and the transfer is reported as
/// `LateFunds` (or `OverpaymentAfterTerminal` if it would have pushed the
/// intent over target) rather than folded into `credited_atomic`
/// once an invoice is terminal.
pub fn apply_credit(intent: &PaymentIntent, invoice: &Invoice, transfer: &Transfer) -> CreditOutcome {
    if !invoice.is_mutable() {
        let kind = if intent.credited_atomic.checked_add(transfer.amount).map(|sum| sum > intent.target_atomic).unwrap_or(true) {
            OutboxKind::OverpaymentAfterTerminal {
                invoice_id: invoice.id,
                intent_id: intent.id,
                transfer_id: transfer.id,
                amount_atomic: transfer.amount,
            }
        } else {
            OutboxKind::LateFunds {
                invoice_id: invoice.id,
                intent_id: intent.id,
                transfer_id: transfer.id,
            }
        };
        return CreditOutcome {
            new_intent_status: intent.status,
            new_credited_atomic: intent.credited_atomic,
            new_invoice_status: invoice.status,
            outbox_records: vec![kind],
        };
    }

    let new_credited = intent
        .credited_atomic
        .checked_add(transfer.amount)
        .unwrap_or(intent.credited_atomic);

    let mut records = Vec::new();

    let new_intent_status = if new_credited == intent.target_atomic {
        IntentStatus::Funded
    } else if new_credited > intent.target_atomic {
        let surplus = new_credited.checked_sub(intent.target_atomic).unwrap_or(crate::money::AtomicAmount::ZERO);
        records.push(OutboxKind::Overpayment {
            invoice_id: invoice.id,
            intent_id: intent.id,
            surplus_atomic: surplus,
        });
        IntentStatus::Overfunded
    } else if new_credited.is_zero() {
        IntentStatus::AwaitingFunds
    } else {
        IntentStatus::PartiallyFunded
    };

    let new_invoice_status = match new_intent_status {
        IntentStatus::Funded | IntentStatus::Overfunded => InvoiceStatus::Paid,
        IntentStatus::PartiallyFunded => InvoiceStatus::Underpaid,
        IntentStatus::AwaitingFunds => invoice.status,
        _ => invoice.status,
    };

    if new_invoice_status != invoice.status {
        records.push(OutboxKind::InvoiceStatusChanged {
            invoice_id: invoice.id,
            new_status: new_invoice_status,
        });
    }

    if matches!(new_intent_status, IntentStatus::Funded | IntentStatus::Overfunded) {
        records.push(OutboxKind::PaidAwaitingConfirmation {
            invoice_id: invoice.id,
            intent_id: intent.id,
        });
    }

    CreditOutcome {
        new_intent_status,
        new_credited_atomic: new_credited,
        new_invoice_status,
        outbox_records: records,
    }
}

/// Attributes an unmatched transfer (one credited to an address with no
/// known intent at ingress time) once a new intent claims that address.
/// Returns the intent id the transfer should be rebound to: the most
/// recently created intent for the `(chain, deposit_address)` pair wins.
pub fn rebind_target(candidate_intent_ids: &[(Uuid, chrono::DateTime<chrono::Utc>)]) -> Option<Uuid> {
    candidate_intent_ids.iter().max_by_key(|(_, created_at)| *created_at).map(|(id, _)| *id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::intent::IntentStatus;
    use chrono::Utc;

    fn sample_intent(target: u64, credited: u64, status: IntentStatus) -> PaymentIntent {
        PaymentIntent {
            id: Uuid::new_v4(),
            invoice_id: Uuid::new_v4(),
            token: "USDT".into(),
            chain: "arbitrum".into(),
            deposit_address: "0xabc".into(),
            target_atomic: crate::money::AtomicAmount::from(target),
            credited_atomic: crate::money::AtomicAmount::from(credited),
            status,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn sample_invoice(status: InvoiceStatus) -> Invoice {
        Invoice {
            id: Uuid::new_v4(),
            merchant_id: Uuid::new_v4(),
            merchant_order_id: "order-1".into(),
            fiat_amount: crate::money::FiatCents::new(1000).unwrap(),
            allowed_options: vec![],
            callback_url: "https://merchant.example/cb".into(),
            status,
            expiry: Utc::now() + chrono::Duration::hours(1),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn sample_transfer(amount: u64) -> Transfer {
        Transfer {
            id: Uuid::new_v4(),
            chain: "arbitrum".into(),
            tx_hash: "0xdead".into(),
            log_index: 0,
            token: "USDT".into(),
            to_address: "0xabc".into(),
            amount: crate::money::AtomicAmount::from(amount),
            block_number: 100,
            first_seen_at: Utc::now(),
            last_seen_at: Utc::now(),
        }
    }

    #[test]
    fn partial_payment_moves_invoice_to_underpaid() {
        let intent = sample_intent(1_000, 0, IntentStatus::AwaitingFunds);
        let invoice = sample_invoice(InvoiceStatus::Pending);
        let transfer = sample_transfer(400);

        let outcome = apply_credit(&intent, &invoice, &transfer);
        assert_eq!(outcome.new_intent_status, IntentStatus::PartiallyFunded);
        assert_eq!(outcome.new_invoice_status, InvoiceStatus::Underpaid);
        assert!(outcome.outbox_records.iter().any(|r| r.type_name() == "INVOICE_STATUS_CHANGED"));
    }

    #[test]
    fn exact_payment_moves_invoice_to_paid_and_schedules_confirmation() {
        let intent = sample_intent(1_000, 0, IntentStatus::AwaitingFunds);
        let invoice = sample_invoice(InvoiceStatus::Pending);
        let transfer = sample_transfer(1_000);

        let outcome = apply_credit(&intent, &invoice, &transfer);
        assert_eq!(outcome.new_intent_status, IntentStatus::Funded);
        assert_eq!(outcome.new_invoice_status, InvoiceStatus::Paid);
        assert!(outcome.outbox_records.iter().any(|r| r.type_name() == "PAID_AWAITING_CONFIRMATION"));
    }

    #[test]
    fn overpayment_emits_overpayment_record_with_surplus() {
        let intent = sample_intent(1_000, 0, IntentStatus::AwaitingFunds);
        let invoice = sample_invoice(InvoiceStatus::Pending);
        let transfer = sample_transfer(1_200);

        let outcome = apply_credit(&intent, &invoice, &transfer);
        assert_eq!(outcome.new_intent_status, IntentStatus::Overfunded);
        let surplus = outcome.outbox_records.iter().find_map(|r| match r {
            OutboxKind::Overpayment { surplus_atomic, .. } => Some(*surplus_atomic),
            _ => None,
        });
        assert_eq!(surplus, Some(crate::money::AtomicAmount::from(200u64)));
    }

    #[test]
    fn funds_arriving_after_terminal_invoice_are_reported_as_late_funds_only() {
        let intent = sample_intent(1_000, 1_000, IntentStatus::Confirmed);
        let invoice = sample_invoice(InvoiceStatus::Confirmed);
        let transfer = sample_transfer(100);

        let outcome = apply_credit(&intent, &invoice, &transfer);
        assert_eq!(outcome.new_invoice_status, InvoiceStatus::Confirmed);
        assert_eq!(outcome.new_credited_atomic, crate::money::AtomicAmount::from(1_000u64));
        assert!(matches!(outcome.outbox_records.as_slice(), [OutboxKind::LateFunds { .. }]));
    }

    #[test]
    fn overpayment_after_terminal_is_distinguished_from_late_funds() {
        let intent = sample_intent(1_000, 1_000, IntentStatus::Confirmed);
        let invoice = sample_invoice(InvoiceStatus::Confirmed);
        let transfer = sample_transfer(50_000);

        let outcome = apply_credit(&intent, &invoice, &transfer);
        assert!(matches!(outcome.outbox_records.as_slice(), [OutboxKind::OverpaymentAfterTerminal { .. }]));
    }

    #[test]
    fn rebind_target_picks_most_recently_created_intent() {
        let older = (Uuid::new_v4(), Utc::now() - chrono::Duration::minutes(10));
        let newer = (Uuid::new_v4(), Utc::now());
        let winner = rebind_target(&[older, newer]);
        assert_eq!(winner, Some(newer.0));
    }
}
