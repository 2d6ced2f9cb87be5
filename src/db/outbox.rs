use chrono::{DateTime, Utc};
use log::{debug, info};
use rusqlite::{named_params, Connection};
use uuid::Uuid;

use crate::db::error::GatewayDbResult;
use crate::db::parse_sqlite_datetime;
use crate::domain::outbox_record::OutboxKind;

#[derive(Debug, Clone)]
pub struct OutboxRow {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub delivery_id: Uuid,
    pub kind: OutboxKind,
    pub attempt_count: i64,
    pub claim_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Inserts an outbox record. Always called in the same transaction that
/// persisted the state change it announces. `delivery_id` is generated
/// once here and reused across every delivery attempt for this row, so
/// the merchant sees the same `Idempotency-Key` on every retry of the
/// same event.
pub fn insert_outbox_record(conn: &Connection, kind: &OutboxKind) -> GatewayDbResult<Uuid> {
    let id = Uuid::new_v4();
    let delivery_id = Uuid::new_v4();
    let payload = serde_json::to_string(kind)?;

    conn.execute(
        r#"
        INSERT INTO outbox (id, invoice_id, delivery_id, kind, payload, status, next_attempt_at)
        VALUES (:id, :invoice_id, :delivery_id, :kind, :payload, 'pending', datetime('now'))
        "#,
        named_params! {
            ":id": id.to_string(),
            ":invoice_id": kind.invoice_id().to_string(),
            ":delivery_id": delivery_id.to_string(),
            ":kind": kind.type_name(),
            ":payload": payload,
        },
    )?;

    debug!(outbox_id = id.to_string(), kind = kind.type_name(); "DB: Outbox record enqueued");
    Ok(id)
}

/// Atomically claims up to `limit` due outbox records for this worker
/// instance, stamping them with `claim_token`/`claim_deadline` so a crash
/// mid-delivery is recoverable by [`release_outbox_claim`]'s deadline
/// sweep rather than by a second worker racing the first.
///
/// At most one due record per invoice is claimed per call: the
/// correlated subquery restricts each invoice to its single earliest-due
/// eligible row (`created_at ASC, id ASC` as the tie-break, since
/// `outbox.id` is a random UUID rather than an ordered key), so a second
/// record for the same invoice is never claimed until the first has been
/// resolved. This keeps delivery monotonic per invoice.
pub fn claim_due_outbox_records(conn: &mut Connection, claim_token: &str, claim_ttl_seconds: i64, limit: i64) -> GatewayDbResult<Vec<OutboxRow>> {
    let tx = conn.transaction()?;

    let ids: Vec<String> = {
        let mut stmt = tx.prepare_cached(
            r#"
            SELECT o.id FROM outbox o
            WHERE (
                (o.status = 'pending' AND o.next_attempt_at <= datetime('now'))
                OR (o.status = 'claimed' AND o.claim_deadline <= datetime('now'))
            )
            AND o.id = (
                SELECT o2.id FROM outbox o2
                WHERE o2.invoice_id = o.invoice_id
                  AND (
                      (o2.status = 'pending' AND o2.next_attempt_at <= datetime('now'))
                      OR (o2.status = 'claimed' AND o2.claim_deadline <= datetime('now'))
                  )
                ORDER BY o2.created_at ASC, o2.id ASC
                LIMIT 1
            )
            ORDER BY o.next_attempt_at ASC
            LIMIT :limit
            "#,
        )?;
        let rows = stmt.query_map(named_params! { ":limit": limit }, |row| row.get::<_, String>(0))?;
        rows.collect::<Result<Vec<_>, _>>()?
    };

    if ids.is_empty() {
        tx.commit()?;
        return Ok(vec![]);
    }

    for id in &ids {
        tx.execute(
            r#"
            UPDATE outbox
            SET status = 'claimed', claim_token = :token,
                claim_deadline = datetime('now', :ttl)
            WHERE id = :id
            "#,
            named_params! { ":token": claim_token, ":ttl": format!("+{claim_ttl_seconds} seconds"), ":id": id },
        )?;
    }

    let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let query = format!(
        "SELECT id, invoice_id, delivery_id, kind, payload, attempt_count, claim_token, created_at FROM outbox WHERE id IN ({placeholders})"
    );
    let mut stmt = tx.prepare(&query)?;
    let params: Vec<&dyn rusqlite::ToSql> = ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();
    let rows = stmt.query_map(params.as_slice(), |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(4)?,
            row.get::<_, i64>(5)?,
            row.get::<_, Option<String>>(6)?,
            row.get::<_, String>(7)?,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (id, invoice_id, delivery_id, payload, attempt_count, claim_token, created_at) = row?;
        out.push(OutboxRow {
            id: Uuid::parse_str(&id).unwrap_or_default(),
            invoice_id: Uuid::parse_str(&invoice_id).unwrap_or_default(),
            delivery_id: Uuid::parse_str(&delivery_id).unwrap_or_default(),
            kind: serde_json::from_str(&payload)?,
            attempt_count,
            claim_token,
            created_at: parse_sqlite_datetime(&created_at),
        });
    }
    drop(stmt);
    tx.commit()?;

    if !out.is_empty() {
        debug!(count = out.len(), claim_token = claim_token; "DB: Claimed outbox batch");
    }
    Ok(out)
}

pub fn mark_outbox_delivered(conn: &Connection, id: Uuid) -> GatewayDbResult<()> {
    conn.execute(
        r#"UPDATE outbox SET status = 'delivered', claim_token = NULL, claim_deadline = NULL, updated_at = datetime('now') WHERE id = :id"#,
        named_params! { ":id": id.to_string() },
    )?;
    info!(outbox_id = id.to_string(); "DB: Outbox record delivered");
    Ok(())
}

pub fn mark_outbox_permanently_failed(conn: &Connection, id: Uuid, error: &str) -> GatewayDbResult<()> {
    conn.execute(
        r#"
        UPDATE outbox
        SET status = 'failed', claim_token = NULL, claim_deadline = NULL,
            last_error = :error, updated_at = datetime('now')
        WHERE id = :id
        "#,
        named_params! { ":id": id.to_string(), ":error": error },
    )?;
    Ok(())
}

/// Releases a claim back to `pending`, scheduling the next attempt at
/// `next_attempt_at` (the exponential-backoff time computed by the
/// dispatcher).
pub fn reschedule_outbox_record(conn: &Connection, id: Uuid, next_attempt_at: DateTime<Utc>, error: &str) -> GatewayDbResult<()> {
    conn.execute(
        r#"
        UPDATE outbox
        SET status = 'pending', claim_token = NULL, claim_deadline = NULL,
            attempt_count = attempt_count + 1, next_attempt_at = :next_attempt_at,
            last_error = :error, updated_at = datetime('now')
        WHERE id = :id
        "#,
        named_params! {
            ":id": id.to_string(),
            ":next_attempt_at": next_attempt_at.naive_utc().to_string(),
            ":error": error,
        },
    )?;
    Ok(())
}

/// Read-only listing for operator tooling; does not claim anything.
pub fn list_outbox_records(conn: &Connection, limit: i64) -> GatewayDbResult<Vec<OutboxRow>> {
    let mut stmt = conn.prepare_cached(
        r#"
        SELECT id, invoice_id, delivery_id, kind, payload, attempt_count, claim_token, created_at
        FROM outbox
        ORDER BY created_at DESC
        LIMIT :limit
        "#,
    )?;

    let rows = stmt.query_map(named_params! { ":limit": limit }, |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(4)?,
            row.get::<_, i64>(5)?,
            row.get::<_, Option<String>>(6)?,
            row.get::<_, String>(7)?,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (id, invoice_id, delivery_id, payload, attempt_count, claim_token, created_at) = row?;
        out.push(OutboxRow {
            id: Uuid::parse_str(&id).unwrap_or_default(),
            invoice_id: Uuid::parse_str(&invoice_id).unwrap_or_default(),
            delivery_id: Uuid::parse_str(&delivery_id).unwrap_or_default(),
            kind: serde_json::from_str(&payload)?,
            attempt_count,
            claim_token,
            created_at: parse_sqlite_datetime(&created_at),
        });
    }
    Ok(out)
}

/// Releases a claim without advancing `attempt_count` or scheduling a
/// retry — used when the worker is shutting down mid-batch and wants to
/// hand the record back immediately.
pub fn release_outbox_claim(conn: &Connection, id: Uuid) -> GatewayDbResult<()> {
    conn.execute(
        r#"UPDATE outbox SET status = 'pending', claim_token = NULL, claim_deadline = NULL WHERE id = :id"#,
        named_params! { ":id": id.to_string() },
    )?;
    Ok(())
}
