use chrono::{DateTime, Utc};
use log::{debug, info};
use rusqlite::{named_params, Connection};
use uuid::Uuid;

use crate::db::error::{GatewayDbError, GatewayDbResult};
use crate::db::parse_sqlite_datetime;
use crate::domain::intent::{IntentStatus, PaymentIntent};
use crate::money::AtomicAmount;

fn status_to_str(status: IntentStatus) -> &'static str {
    match status {
        IntentStatus::AwaitingFunds => "AWAITING_FUNDS",
        IntentStatus::PartiallyFunded => "PARTIALLY_FUNDED",
        IntentStatus::Funded => "FUNDED",
        IntentStatus::Overfunded => "OVERFUNDED",
        IntentStatus::Expired => "EXPIRED",
        IntentStatus::Cancelled => "CANCELLED",
        IntentStatus::Confirmed => "CONFIRMED",
    }
}

fn status_from_str(s: &str) -> GatewayDbResult<IntentStatus> {
    Ok(match s {
        "AWAITING_FUNDS" => IntentStatus::AwaitingFunds,
        "PARTIALLY_FUNDED" => IntentStatus::PartiallyFunded,
        "FUNDED" => IntentStatus::Funded,
        "OVERFUNDED" => IntentStatus::Overfunded,
        "EXPIRED" => IntentStatus::Expired,
        "CANCELLED" => IntentStatus::Cancelled,
        "CONFIRMED" => IntentStatus::Confirmed,
        other => return Err(GatewayDbError::Unexpected(format!("unknown intent status {other}"))),
    })
}

type IntentRowTuple = (String, String, String, String, String, String, String, String, String, String);

fn row_to_tuple(row: &rusqlite::Row) -> rusqlite::Result<IntentRowTuple> {
    Ok((
        row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?,
        row.get(5)?, row.get(6)?, row.get(7)?, row.get(8)?, row.get(9)?,
    ))
}

fn assemble(t: IntentRowTuple) -> GatewayDbResult<PaymentIntent> {
    Ok(PaymentIntent {
        id: Uuid::parse_str(&t.0).map_err(|e| GatewayDbError::Unexpected(e.to_string()))?,
        invoice_id: Uuid::parse_str(&t.1).map_err(|e| GatewayDbError::Unexpected(e.to_string()))?,
        token: t.2,
        chain: t.3,
        deposit_address: t.4,
        target_atomic: t.5.parse::<AtomicAmount>().map_err(|e| GatewayDbError::Unexpected(e.to_string()))?,
        credited_atomic: t.6.parse::<AtomicAmount>().map_err(|e| GatewayDbError::Unexpected(e.to_string()))?,
        status: status_from_str(&t.7)?,
        created_at: parse_sqlite_datetime(&t.8),
        updated_at: parse_sqlite_datetime(&t.9),
    })
}

const SELECT_COLUMNS: &str = r#"
    id, invoice_id, token, chain, deposit_address, target_atomic, credited_atomic,
    status, created_at, updated_at
"#;

pub fn insert_intent(conn: &Connection, intent: &PaymentIntent) -> GatewayDbResult<()> {
    info!(target: "audit", intent_id = intent.id.to_string(), invoice_id = intent.invoice_id.to_string(); "DB: Creating payment intent");

    conn.execute(
        r#"
        INSERT INTO payment_intents (
            id, invoice_id, token, chain, deposit_address, target_atomic, credited_atomic,
            status, created_at, updated_at
        ) VALUES (
            :id, :invoice_id, :token, :chain, :deposit_address, :target_atomic, :credited_atomic,
            :status, :created_at, :updated_at
        )
        "#,
        named_params! {
            ":id": intent.id.to_string(),
            ":invoice_id": intent.invoice_id.to_string(),
            ":token": intent.token,
            ":chain": intent.chain,
            ":deposit_address": intent.deposit_address,
            ":target_atomic": intent.target_atomic.to_string(),
            ":credited_atomic": intent.credited_atomic.to_string(),
            ":status": status_to_str(intent.status),
            ":created_at": intent.created_at.naive_utc().to_string(),
            ":updated_at": intent.updated_at.naive_utc().to_string(),
        },
    )?;
    Ok(())
}

pub fn get_intent_by_id(conn: &Connection, id: Uuid) -> GatewayDbResult<Option<PaymentIntent>> {
    debug!(intent_id = id.to_string(); "DB: Fetching intent by id");
    let query = format!("SELECT {SELECT_COLUMNS} FROM payment_intents WHERE id = :id");
    let mut stmt = conn.prepare_cached(&query)?;
    match stmt.query_row(named_params! { ":id": id.to_string() }, row_to_tuple) {
        Ok(tuple) => Ok(Some(assemble(tuple)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_intents_for_invoice(conn: &Connection, invoice_id: Uuid) -> GatewayDbResult<Vec<PaymentIntent>> {
    let query = format!("SELECT {SELECT_COLUMNS} FROM payment_intents WHERE invoice_id = :invoice_id ORDER BY created_at ASC");
    let mut stmt = conn.prepare_cached(&query)?;
    let rows = stmt.query_map(named_params! { ":invoice_id": invoice_id.to_string() }, row_to_tuple)?;
    let mut intents = Vec::new();
    for row in rows {
        intents.push(assemble(row?)?);
    }
    Ok(intents)
}

/// Finds the most recently created, non-terminal intent claiming
/// `(chain, token, deposit_address)`. Used both by the matcher (to route
/// an incoming transfer) and by the rebind step for previously unmatched
/// transfers. `token` is part of the matching key: two intents can share
/// a deposit address across different tokens (e.g. a merchant reusing an
/// address for both USDT and USDC), and a transfer must only match the
/// intent for its own token.
pub fn find_intent_by_deposit_address(conn: &Connection, chain: &str, token: &str, deposit_address: &str) -> GatewayDbResult<Option<PaymentIntent>> {
    let query = format!(
        "SELECT {SELECT_COLUMNS} FROM payment_intents \
         WHERE chain = :chain AND token = :token AND deposit_address = :addr \
           AND status NOT IN ('EXPIRED', 'CANCELLED') \
         ORDER BY created_at DESC LIMIT 1"
    );
    let mut stmt = conn.prepare_cached(&query)?;
    match stmt.query_row(named_params! { ":chain": chain, ":token": token, ":addr": deposit_address }, row_to_tuple) {
        Ok(tuple) => Ok(Some(assemble(tuple)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn update_intent_credit(
    conn: &Connection,
    id: Uuid,
    new_status: IntentStatus,
    new_credited_atomic: AtomicAmount,
    now: DateTime<Utc>,
) -> GatewayDbResult<()> {
    let changed = conn.execute(
        r#"
        UPDATE payment_intents
        SET status = :status, credited_atomic = :credited, updated_at = :updated_at
        WHERE id = :id
        "#,
        named_params! {
            ":status": status_to_str(new_status),
            ":credited": new_credited_atomic.to_string(),
            ":updated_at": now.naive_utc().to_string(),
            ":id": id.to_string(),
        },
    )?;
    if changed == 0 {
        return Err(GatewayDbError::NotFound(format!("intent {id}")));
    }
    Ok(())
}
