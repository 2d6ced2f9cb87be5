//! Database layer for the payment gateway, backed by SQLite via
//! `rusqlite`, pooled with `r2d2` so it can be driven from async code
//! through `tokio::task::spawn_blocking`.
//!
//! # Migrations
//!
//! Schema migrations live under `migrations/` at the workspace root and
//! are embedded into the binary at compile time, then applied on
//! [`init_db`].

use std::path::Path;

use include_dir::{include_dir, Dir};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite_migration::Migrations;

mod error;
pub use error::{GatewayDbError, GatewayDbResult};

mod merchants;
pub use merchants::{get_merchant_by_id, Merchant};

mod invoices;
pub use invoices::{
    find_invoice_by_merchant_order_id, get_invoice_by_id, insert_invoice, list_expired_candidate_invoices,
    update_invoice_status,
};

mod intents;
pub use intents::{
    find_intent_by_deposit_address, get_intent_by_id, insert_intent, list_intents_for_invoice,
    update_intent_credit,
};

mod transfers;
pub use transfers::{
    bind_unmatched_transfers_to_intent, insert_transfer, list_funding_transfers_for_intent,
    list_unmatched_transfers_for_address,
};

mod intent_funds;
pub use intent_funds::insert_intent_fund;

mod outbox;
pub use outbox::{
    claim_due_outbox_records, insert_outbox_record, list_outbox_records, mark_outbox_delivered,
    mark_outbox_permanently_failed, release_outbox_claim, reschedule_outbox_record, OutboxRow,
};

mod idempotency;
pub use idempotency::{find_idempotency_record, store_idempotency_record, IdempotencyRecord};

mod locks;
pub use locks::{acquire_lease, release_lease};

static MIGRATIONS_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/migrations");

pub type SqlitePool = r2d2::Pool<SqliteConnectionManager>;

/// Parses a `datetime('now')`-formatted SQLite column as UTC. Falls back
/// to the Unix epoch on malformed input rather than panicking, since this
/// is only ever used on our own previously-written rows.
pub(crate) fn parse_sqlite_datetime(s: &str) -> chrono::DateTime<chrono::Utc> {
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .map(|naive| naive.and_utc())
        .unwrap_or_else(|_| chrono::DateTime::UNIX_EPOCH)
}

/// Opens (creating if necessary) the SQLite database at `db_path`,
/// builds a connection pool, and applies all pending migrations.
pub fn init_db<P: AsRef<Path>>(db_path: P) -> GatewayDbResult<SqlitePool> {
    let path = db_path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let manager = SqliteConnectionManager::file(path).with_init(|conn| {
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
    });
    let pool = r2d2::Pool::builder().max_size(8).build(manager)?;

    let migrations = Migrations::from_directory(&MIGRATIONS_DIR)?;
    let mut conn = pool.get()?;
    migrations.to_latest(&mut conn)?;

    Ok(pool)
}
