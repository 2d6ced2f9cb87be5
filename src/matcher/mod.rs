//! Folds one normalized transfer event into whatever intent claims its
//! deposit address, all inside a single `BEGIN IMMEDIATE` transaction so
//! two concurrently-processed events for the same intent can never
//! interleave.

use log::info;
use rusqlite::{Connection, TransactionBehavior};
use uuid::Uuid;

use crate::db;
use crate::domain;
use crate::domain::transfer::NormalizedTransferEvent;
use crate::error::GatewayResult;

/// Outcome of matching one transfer. `Unmatched` means no intent
/// currently claims the transfer's deposit address; it is recorded for
/// later rebinding rather than dropped.
pub enum MatchOutcome {
    Duplicate,
    Unmatched,
    Credited { intent_id: Uuid, invoice_id: Uuid, outbox_ids: Vec<Uuid> },
}

/// Processes one [`NormalizedTransferEvent`] end to end: insert, match,
/// credit, and commit the resulting outbox records — or roll back
/// entirely if any step fails.
pub fn process_transfer_event(conn: &mut Connection, event: &NormalizedTransferEvent) -> GatewayResult<MatchOutcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let intent = db::find_intent_by_deposit_address(&tx, &event.chain, &event.token, &event.to)?;

    let Some(intent) = intent else {
        let inserted = db::insert_transfer(&tx, event, None)?;
        tx.commit()?;
        return Ok(if inserted.is_some() { MatchOutcome::Unmatched } else { MatchOutcome::Duplicate });
    };

    let inserted = db::insert_transfer(&tx, event, Some(intent.id))?;
    let Some(transfer) = inserted else {
        tx.commit()?;
        return Ok(MatchOutcome::Duplicate);
    };

    let invoice = db::get_invoice_by_id(&tx, intent.invoice_id)?
        .ok_or_else(|| crate::error::GatewayError::Invariant(format!("intent {} has no invoice", intent.id)))?;

    let outcome = domain::apply_credit(&intent, &invoice, &transfer);

    let funded_delta = outcome.new_credited_atomic.checked_sub(intent.credited_atomic).unwrap_or(crate::money::AtomicAmount::ZERO);
    db::insert_intent_fund(&tx, intent.id, transfer.id, funded_delta)?;

    db::update_intent_credit(&tx, intent.id, outcome.new_intent_status, outcome.new_credited_atomic, chrono::Utc::now())?;
    if outcome.new_invoice_status != invoice.status {
        db::update_invoice_status(&tx, invoice.id, outcome.new_invoice_status, chrono::Utc::now())?;
    }

    let mut outbox_ids = Vec::new();
    for record in &outcome.outbox_records {
        outbox_ids.push(db::insert_outbox_record(&tx, record)?);
    }

    tx.commit()?;

    info!(
        target: "audit",
        intent_id = intent.id.to_string(), transfer_id = transfer.id.to_string();
        "Matcher: transfer credited to intent"
    );

    Ok(MatchOutcome::Credited { intent_id: intent.id, invoice_id: invoice.id, outbox_ids })
}

/// Binds any previously unmatched transfers at `(chain, token,
/// deposit_address)` to a newly created intent and re-runs the credit
/// rule over each of them in order, inside one transaction.
pub fn rebind_and_credit_backlog(conn: &mut Connection, chain: &str, token: &str, deposit_address: &str, intent_id: Uuid) -> GatewayResult<Vec<Uuid>> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let transfers = db::bind_unmatched_transfers_to_intent(&tx, chain, token, deposit_address, intent_id)?;
    let mut outbox_ids = Vec::new();

    for transfer in transfers {
        let intent = db::get_intent_by_id(&tx, intent_id)?
            .ok_or_else(|| crate::error::GatewayError::Invariant(format!("intent {intent_id} vanished mid-rebind")))?;
        let invoice = db::get_invoice_by_id(&tx, intent.invoice_id)?
            .ok_or_else(|| crate::error::GatewayError::Invariant(format!("intent {intent_id} has no invoice")))?;

        let outcome = domain::apply_credit(&intent, &invoice, &transfer);
        let funded_delta = outcome.new_credited_atomic.checked_sub(intent.credited_atomic).unwrap_or(crate::money::AtomicAmount::ZERO);
        db::insert_intent_fund(&tx, intent.id, transfer.id, funded_delta)?;

        db::update_intent_credit(&tx, intent.id, outcome.new_intent_status, outcome.new_credited_atomic, chrono::Utc::now())?;
        if outcome.new_invoice_status != invoice.status {
            db::update_invoice_status(&tx, invoice.id, outcome.new_invoice_status, chrono::Utc::now())?;
        }
        for record in &outcome.outbox_records {
            outbox_ids.push(db::insert_outbox_record(&tx, record)?);
        }
    }

    tx.commit()?;
    Ok(outbox_ids)
}
