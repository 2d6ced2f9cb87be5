//! Expiry: what happens when an invoice's `expiry` timestamp passes
//! without reaching `Paid`.

use crate::domain::invoice::{Invoice, InvoiceStatus};
use crate::domain::outbox_record::OutboxKind;

pub struct ExpiryOutcome {
    pub new_status: InvoiceStatus,
    pub outbox_records: Vec<OutboxKind>,
}

/// Applies expiry to `invoice` as observed at `now`, given whether any
/// intent under it currently holds a nonzero partial credit.
///
/// `Pending`/`Underpaid` invoices past `expiry` move to `Expired` or
/// `ExpiredWithPartial` (making the distinction observable: the
/// two are distinguished so a merchant can tell "nothing arrived" apart
/// from "a partial credit needs manual handling"). Every other status is
/// left untouched — expiry is a no-op once an invoice reached `Paid` or
/// is already terminal.
pub fn expire(invoice: &Invoice, now: chrono::DateTime<chrono::Utc>, has_partial_credit: bool) -> ExpiryOutcome {
    if now < invoice.expiry {
        return ExpiryOutcome { new_status: invoice.status, outbox_records: vec![] };
    }

    let new_status = match invoice.status {
        InvoiceStatus::Pending if !has_partial_credit => InvoiceStatus::Expired,
        InvoiceStatus::Pending | InvoiceStatus::Underpaid => InvoiceStatus::ExpiredWithPartial,
        other => other,
    };

    if new_status == invoice.status {
        return ExpiryOutcome { new_status, outbox_records: vec![] };
    }

    ExpiryOutcome {
        new_status,
        outbox_records: vec![OutboxKind::InvoiceStatusChanged { invoice_id: invoice.id, new_status }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::FiatCents;
    use chrono::Utc;
    use uuid::Uuid;

    fn sample_invoice(status: InvoiceStatus, expiry: chrono::DateTime<chrono::Utc>) -> Invoice {
        Invoice {
            id: Uuid::new_v4(),
            merchant_id: Uuid::new_v4(),
            merchant_order_id: "order-1".into(),
            fiat_amount: FiatCents::new(1000).unwrap(),
            allowed_options: vec![],
            callback_url: "https://merchant.example/cb".into(),
            status,
            expiry,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn not_yet_expired_invoices_are_untouched() {
        let invoice = sample_invoice(InvoiceStatus::Pending, Utc::now() + chrono::Duration::hours(1));
        let outcome = expire(&invoice, Utc::now(), false);
        assert_eq!(outcome.new_status, InvoiceStatus::Pending);
        assert!(outcome.outbox_records.is_empty());
    }

    #[test]
    fn pending_without_partial_credit_expires_plainly() {
        let invoice = sample_invoice(InvoiceStatus::Pending, Utc::now() - chrono::Duration::minutes(1));
        let outcome = expire(&invoice, Utc::now(), false);
        assert_eq!(outcome.new_status, InvoiceStatus::Expired);
    }

    #[test]
    fn underpaid_with_partial_credit_expires_with_partial_marker() {
        let invoice = sample_invoice(InvoiceStatus::Underpaid, Utc::now() - chrono::Duration::minutes(1));
        let outcome = expire(&invoice, Utc::now(), true);
        assert_eq!(outcome.new_status, InvoiceStatus::ExpiredWithPartial);
    }

    #[test]
    fn paid_invoices_are_not_expired() {
        let invoice = sample_invoice(InvoiceStatus::Paid, Utc::now() - chrono::Duration::minutes(1));
        let outcome = expire(&invoice, Utc::now(), false);
        assert_eq!(outcome.new_status, InvoiceStatus::Paid);
        assert!(outcome.outbox_records.is_empty());
    }

    #[test]
    fn already_terminal_invoices_are_idempotent_no_ops() {
        let invoice = sample_invoice(InvoiceStatus::Cancelled, Utc::now() - chrono::Duration::minutes(1));
        let outcome = expire(&invoice, Utc::now(), false);
        assert_eq!(outcome.new_status, InvoiceStatus::Cancelled);
        assert!(outcome.outbox_records.is_empty());
    }
}
