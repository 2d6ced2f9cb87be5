use log::{debug, info};
use rusqlite::{named_params, Connection};
use uuid::Uuid;

use crate::db::error::{GatewayDbError, GatewayDbResult};
use crate::db::parse_sqlite_datetime;
use crate::domain::transfer::{NormalizedTransferEvent, Transfer};
use crate::money::AtomicAmount;

type TransferRowTuple = (String, String, String, i64, String, String, String, i64, String, String);

fn row_to_tuple(row: &rusqlite::Row) -> rusqlite::Result<TransferRowTuple> {
    Ok((
        row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?,
        row.get(5)?, row.get(6)?, row.get(7)?, row.get(8)?, row.get(9)?,
    ))
}

fn assemble(t: TransferRowTuple) -> GatewayDbResult<Transfer> {
    Ok(Transfer {
        id: Uuid::parse_str(&t.0).map_err(|e| GatewayDbError::Unexpected(e.to_string()))?,
        chain: t.1,
        tx_hash: t.2,
        log_index: t.3,
        token: t.4,
        to_address: t.5,
        amount: t.6.parse::<AtomicAmount>().map_err(|e| GatewayDbError::Unexpected(e.to_string()))?,
        block_number: t.7 as u64,
        first_seen_at: parse_sqlite_datetime(&t.8),
        last_seen_at: parse_sqlite_datetime(&t.9),
    })
}

const SELECT_COLUMNS: &str = "id, chain, tx_hash, log_index, token, to_address, amount, block_number, first_seen_at, last_seen_at";

/// Inserts a normalized transfer event. On a `(chain, tx_hash, log_index)`
/// conflict (the provider redelivered a webhook we already processed)
/// this is a silent no-op, making ingress idempotent under provider retries.
///
/// When `intent_id` is `None` the transfer is also recorded in
/// `unmatched_transfers`, to be rebound once a matching intent appears.
pub fn insert_transfer(
    conn: &Connection,
    event: &NormalizedTransferEvent,
    intent_id: Option<Uuid>,
) -> GatewayDbResult<Option<Transfer>> {
    let id = Uuid::new_v4();
    let now = chrono::Utc::now().naive_utc().to_string();

    let inserted = conn.execute(
        r#"
        INSERT INTO transfers (
            id, chain, tx_hash, log_index, token, to_address, amount, block_number,
            intent_id, first_seen_at, last_seen_at
        ) VALUES (
            :id, :chain, :tx_hash, :log_index, :token, :to_address, :amount, :block_number,
            :intent_id, :now, :now
        )
        ON CONFLICT (chain, tx_hash, log_index) DO NOTHING
        "#,
        named_params! {
            ":id": id.to_string(),
            ":chain": event.chain,
            ":tx_hash": event.tx_hash,
            ":log_index": event.log_index,
            ":token": event.token,
            ":to_address": event.to,
            ":amount": event.amount.to_string(),
            ":block_number": event.block_number as i64,
            ":intent_id": intent_id.map(|i| i.to_string()),
            ":now": now,
        },
    )?;

    if inserted == 0 {
        debug!(tx_hash = event.tx_hash, log_index = event.log_index; "DB: Duplicate transfer ignored");
        return Ok(None);
    }

    info!(
        target: "audit",
        transfer_id = id.to_string(), chain = event.chain, tx_hash = event.tx_hash;
        "DB: Transfer recorded"
    );

    if intent_id.is_none() {
        conn.execute(
            r#"INSERT INTO unmatched_transfers (transfer_id, chain, to_address) VALUES (:id, :chain, :addr)"#,
            named_params! { ":id": id.to_string(), ":chain": event.chain, ":addr": event.to },
        )?;
    }

    let query = format!("SELECT {SELECT_COLUMNS} FROM transfers WHERE id = :id");
    let mut stmt = conn.prepare_cached(&query)?;
    let tuple = stmt.query_row(named_params! { ":id": id.to_string() }, row_to_tuple)?;
    Ok(Some(assemble(tuple)?))
}

pub fn list_funding_transfers_for_intent(conn: &Connection, intent_id: Uuid) -> GatewayDbResult<Vec<Transfer>> {
    let query = format!("SELECT {SELECT_COLUMNS} FROM transfers WHERE intent_id = :intent_id ORDER BY first_seen_at ASC");
    let mut stmt = conn.prepare_cached(&query)?;
    let rows = stmt.query_map(named_params! { ":intent_id": intent_id.to_string() }, row_to_tuple)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(assemble(row?)?);
    }
    Ok(out)
}

pub fn list_unmatched_transfers_for_address(conn: &Connection, chain: &str, token: &str, to_address: &str) -> GatewayDbResult<Vec<Transfer>> {
    let query = format!(
        "SELECT {SELECT_COLUMNS} FROM transfers t \
         JOIN unmatched_transfers u ON u.transfer_id = t.id \
         WHERE u.chain = :chain AND t.token = :token AND u.to_address = :addr"
    );
    let mut stmt = conn.prepare_cached(&query)?;
    let rows = stmt.query_map(named_params! { ":chain": chain, ":token": token, ":addr": to_address }, row_to_tuple)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(assemble(row?)?);
    }
    Ok(out)
}

/// Rebinds every unmatched transfer at `(chain, token, deposit_address)`
/// to a newly created `intent_id`, removing them from
/// `unmatched_transfers`. Called once, right after an intent is created,
/// inside the same transaction.
pub fn bind_unmatched_transfers_to_intent(conn: &Connection, chain: &str, token: &str, deposit_address: &str, intent_id: Uuid) -> GatewayDbResult<Vec<Transfer>> {
    let transfers = list_unmatched_transfers_for_address(conn, chain, token, deposit_address)?;
    if transfers.is_empty() {
        return Ok(transfers);
    }

    for transfer in &transfers {
        conn.execute(
            "UPDATE transfers SET intent_id = :intent_id WHERE id = :id",
            named_params! { ":intent_id": intent_id.to_string(), ":id": transfer.id.to_string() },
        )?;
        conn.execute(
            "DELETE FROM unmatched_transfers WHERE transfer_id = :id",
            named_params! { ":id": transfer.id.to_string() },
        )?;
    }

    info!(target: "audit", intent_id = intent_id.to_string(), count = transfers.len(); "DB: Rebound unmatched transfers to new intent");
    Ok(transfers)
}
