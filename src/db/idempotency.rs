use log::debug;
use rusqlite::{named_params, Connection};

use crate::db::error::GatewayDbResult;

#[derive(Debug, Clone)]
pub struct IdempotencyRecord {
    pub fingerprint: String,
    pub response_body: String,
    pub response_status: u16,
}

/// Looks up a previously stored response for `(scope, idempotency_key)`.
/// The caller compares `fingerprint` against the current request's own
/// fingerprint to detect key reuse with a different body.
pub fn find_idempotency_record(conn: &Connection, scope: &str, idempotency_key: &str) -> GatewayDbResult<Option<IdempotencyRecord>> {
    let mut stmt = conn.prepare_cached(
        r#"
        SELECT fingerprint, response_body, response_status
        FROM idempotency_records
        WHERE scope = :scope AND idempotency_key = :key
        "#,
    )?;

    match stmt.query_row(named_params! { ":scope": scope, ":key": idempotency_key }, |row| {
        Ok(IdempotencyRecord {
            fingerprint: row.get(0)?,
            response_body: row.get(1)?,
            response_status: row.get::<_, i64>(2)? as u16,
        })
    }) {
        Ok(record) => Ok(Some(record)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn store_idempotency_record(
    conn: &Connection,
    scope: &str,
    idempotency_key: &str,
    fingerprint: &str,
    response_body: &str,
    response_status: u16,
) -> GatewayDbResult<()> {
    debug!(scope = scope, idempotency_key = idempotency_key; "DB: Storing idempotency record");

    conn.execute(
        r#"
        INSERT INTO idempotency_records (scope, idempotency_key, fingerprint, response_body, response_status)
        VALUES (:scope, :key, :fingerprint, :body, :status)
        ON CONFLICT (scope, idempotency_key) DO NOTHING
        "#,
        named_params! {
            ":scope": scope,
            ":key": idempotency_key,
            ":fingerprint": fingerprint,
            ":body": response_body,
            ":status": response_status as i64,
        },
    )?;
    Ok(())
}
