//! Property tests over the pure domain rules: no database, no I/O.

use chrono::{Duration, Utc};
use proptest::prelude::*;
use uuid::Uuid;

use stablegate::domain::confirmation_rule::{check_confirmations, ConfirmationOutcome, FundingTransfer};
use stablegate::domain::credit_rule::apply_credit;
use stablegate::domain::expiry_rule::expire;
use stablegate::domain::intent::{IntentStatus, PaymentIntent};
use stablegate::domain::invoice::{Invoice, InvoiceStatus};
use stablegate::domain::transfer::{effective_confirmations, Transfer};
use stablegate::money::{AtomicAmount, FiatCents};

fn an_invoice(status: InvoiceStatus) -> Invoice {
    Invoice {
        id: Uuid::new_v4(),
        merchant_id: Uuid::new_v4(),
        merchant_order_id: "order-1".into(),
        fiat_amount: FiatCents::new(1_000).unwrap(),
        allowed_options: vec![],
        callback_url: "https://merchant.example/cb".into(),
        status,
        expiry: Utc::now() + Duration::hours(1),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn an_intent(target: u64, credited: u64, status: IntentStatus) -> PaymentIntent {
    PaymentIntent {
        id: Uuid::new_v4(),
        invoice_id: Uuid::new_v4(),
        token: "USDT".into(),
        chain: "arbitrum".into(),
        deposit_address: "0xabc".into(),
        target_atomic: AtomicAmount::from(target),
        credited_atomic: AtomicAmount::from(credited),
        status,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn a_transfer(amount: u64) -> Transfer {
    Transfer {
        id: Uuid::new_v4(),
        chain: "arbitrum".into(),
        tx_hash: "0xdead".into(),
        log_index: 0,
        token: "USDT".into(),
        to_address: "0xabc".into(),
        amount: AtomicAmount::from(amount),
        block_number: 100,
        first_seen_at: Utc::now(),
        last_seen_at: Utc::now(),
    }
}

proptest! {
    /// effective_confirmations is never negative and only grows with the
    /// chain tip, regardless of how current_block and transfer_block relate.
    #[test]
    fn effective_confirmations_never_underflows(current in 0u64..10_000_000, transfer_block in 0u64..10_000_000) {
        let confirmations = effective_confirmations(current, transfer_block);
        if current + 1 >= transfer_block {
            prop_assert_eq!(confirmations, current + 1 - transfer_block);
        } else {
            prop_assert_eq!(confirmations, 0);
        }
    }

    /// Credited total after folding one transfer into a mutable invoice is
    /// never less than what it started with: credit only ever accumulates.
    #[test]
    fn credit_rule_never_decreases_credited_total(target in 1u64..1_000_000, credited in 0u64..1_000_000, amount in 1u64..1_000_000) {
        prop_assume!(credited <= target);
        let intent = an_intent(target, credited, IntentStatus::AwaitingFunds);
        let invoice = an_invoice(InvoiceStatus::Pending);
        let transfer = a_transfer(amount);

        let outcome = apply_credit(&intent, &invoice, &transfer);
        prop_assert!(outcome.new_credited_atomic >= intent.credited_atomic);
    }

    /// Every invoice-status change the credit rule produces is accompanied
    /// by a matching outbox record in the same outcome.
    #[test]
    fn credit_rule_always_announces_an_invoice_status_change(target in 1u64..1_000_000, amount in 1u64..1_000_000) {
        let intent = an_intent(target, 0, IntentStatus::AwaitingFunds);
        let invoice = an_invoice(InvoiceStatus::Pending);
        let transfer = a_transfer(amount);

        let outcome = apply_credit(&intent, &invoice, &transfer);
        if outcome.new_invoice_status != invoice.status {
            prop_assert!(outcome
                .outbox_records
                .iter()
                .any(|r| r.type_name() == "INVOICE_STATUS_CHANGED"));
        }
    }

    /// Once an invoice is terminal, crediting it never changes its status
    /// or its intent's credited total, no matter the transfer size.
    #[test]
    fn terminal_invoices_never_change_status_or_credited_total_on_credit(amount in 1u64..10_000_000) {
        let intent = an_intent(1_000, 1_000, IntentStatus::Confirmed);
        let invoice = an_invoice(InvoiceStatus::Confirmed);
        let transfer = a_transfer(amount);

        let outcome = apply_credit(&intent, &invoice, &transfer);
        prop_assert_eq!(outcome.new_invoice_status, InvoiceStatus::Confirmed);
        prop_assert_eq!(outcome.new_credited_atomic, intent.credited_atomic);
        prop_assert_eq!(outcome.outbox_records.len(), 1);
    }

    /// Expiry is idempotent: applying it twice in a row (the second time
    /// against the already-updated invoice) never moves status further.
    #[test]
    fn expiry_is_idempotent(initial in prop_oneof![
        Just(InvoiceStatus::Pending),
        Just(InvoiceStatus::Underpaid),
        Just(InvoiceStatus::Paid),
        Just(InvoiceStatus::Cancelled),
    ], has_partial in any::<bool>()) {
        let past = Utc::now() - Duration::minutes(1);
        let invoice = Invoice { expiry: past, ..an_invoice(initial) };

        let first = expire(&invoice, Utc::now(), has_partial);
        let advanced = Invoice { status: first.new_status, ..invoice };
        let second = expire(&advanced, Utc::now(), has_partial);

        prop_assert_eq!(second.new_status, first.new_status);
        prop_assert!(second.outbox_records.is_empty());
    }

    /// Expiry never touches an invoice whose expiry hasn't passed yet.
    #[test]
    fn expiry_is_a_no_op_before_the_deadline(initial in prop_oneof![
        Just(InvoiceStatus::Pending),
        Just(InvoiceStatus::Underpaid),
    ], has_partial in any::<bool>(), minutes_remaining in 1i64..10_000) {
        let future = Utc::now() + Duration::minutes(minutes_remaining);
        let invoice = Invoice { expiry: future, ..an_invoice(initial) };

        let outcome = expire(&invoice, Utc::now(), has_partial);
        prop_assert_eq!(outcome.new_status, initial);
        prop_assert!(outcome.outbox_records.is_empty());
    }

    /// Confirmation checks never flip straight from `StillWaiting` (not
    /// already confirmed) to `RegressedAfterConfirm` — regression is only
    /// reachable when `already_confirmed` is true.
    #[test]
    fn regression_is_unreachable_without_prior_confirmation(block_number in 0u64..1000, current_block in 0u64..1000, required in 1u64..50) {
        let transfers = vec![FundingTransfer { id: Uuid::new_v4(), block_number }];
        let outcome = check_confirmations(Uuid::new_v4(), Uuid::new_v4(), &transfers, current_block, required, false);
        prop_assert!(!matches!(outcome, ConfirmationOutcome::RegressedAfterConfirm { .. }));
    }
}
