use rusqlite::{named_params, Connection};
use uuid::Uuid;

use crate::db::error::GatewayDbResult;
use crate::money::AtomicAmount;

/// Records that `transfer_id` was credited to `intent_id`. The table's
/// `UNIQUE(transfer_id)` constraint is what enforces that a transfer
/// funds at most one intent; `transfers.intent_id` is only a
/// denormalized pointer for the read paths that already join off it.
pub fn insert_intent_fund(conn: &Connection, intent_id: Uuid, transfer_id: Uuid, credited_atomic: AtomicAmount) -> GatewayDbResult<()> {
    conn.execute(
        r#"
        INSERT INTO intent_funds (intent_id, transfer_id, credited_atomic)
        VALUES (:intent_id, :transfer_id, :credited_atomic)
        "#,
        named_params! {
            ":intent_id": intent_id.to_string(),
            ":transfer_id": transfer_id.to_string(),
            ":credited_atomic": credited_atomic.to_string(),
        },
    )?;
    Ok(())
}
