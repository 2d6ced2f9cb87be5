use chrono::{DateTime, Utc};
use log::{debug, info};
use rusqlite::{named_params, Connection};
use uuid::Uuid;

use crate::db::error::{GatewayDbError, GatewayDbResult};
use crate::db::parse_sqlite_datetime;
use crate::domain::invoice::{AllowedOption, Invoice, InvoiceStatus};
use crate::money::FiatCents;

fn status_to_str(status: InvoiceStatus) -> &'static str {
    match status {
        InvoiceStatus::Pending => "PENDING",
        InvoiceStatus::Underpaid => "UNDERPAID",
        InvoiceStatus::Paid => "PAID",
        InvoiceStatus::Confirmed => "CONFIRMED",
        InvoiceStatus::Expired => "EXPIRED",
        InvoiceStatus::ExpiredWithPartial => "EXPIRED_WITH_PARTIAL",
        InvoiceStatus::Cancelled => "CANCELLED",
    }
}

fn status_from_str(s: &str) -> GatewayDbResult<InvoiceStatus> {
    Ok(match s {
        "PENDING" => InvoiceStatus::Pending,
        "UNDERPAID" => InvoiceStatus::Underpaid,
        "PAID" => InvoiceStatus::Paid,
        "CONFIRMED" => InvoiceStatus::Confirmed,
        "EXPIRED" => InvoiceStatus::Expired,
        "EXPIRED_WITH_PARTIAL" => InvoiceStatus::ExpiredWithPartial,
        "CANCELLED" => InvoiceStatus::Cancelled,
        other => return Err(GatewayDbError::Unexpected(format!("unknown invoice status {other}"))),
    })
}

fn row_to_invoice(row: &rusqlite::Row) -> rusqlite::Result<(String, String, String, i64, String, String, String, String, String, String)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
    ))
}

fn assemble(
    id: String,
    merchant_id: String,
    merchant_order_id: String,
    fiat_amount_cents: i64,
    allowed_options: String,
    callback_url: String,
    status: String,
    expiry: String,
    created_at: String,
    updated_at: String,
) -> GatewayDbResult<Invoice> {
    Ok(Invoice {
        id: Uuid::parse_str(&id).map_err(|e| GatewayDbError::Unexpected(e.to_string()))?,
        merchant_id: Uuid::parse_str(&merchant_id).map_err(|e| GatewayDbError::Unexpected(e.to_string()))?,
        merchant_order_id,
        fiat_amount: FiatCents::new(fiat_amount_cents).map_err(|e| GatewayDbError::Unexpected(e.to_string()))?,
        allowed_options: serde_json::from_str::<Vec<AllowedOption>>(&allowed_options)?,
        callback_url,
        status: status_from_str(&status)?,
        expiry: parse_sqlite_datetime(&expiry),
        created_at: parse_sqlite_datetime(&created_at),
        updated_at: parse_sqlite_datetime(&updated_at),
    })
}

pub fn insert_invoice(conn: &Connection, invoice: &Invoice) -> GatewayDbResult<()> {
    info!(
        target: "audit",
        invoice_id = invoice.id.to_string(), merchant_id = invoice.merchant_id.to_string();
        "DB: Creating new invoice"
    );

    conn.execute(
        r#"
        INSERT INTO invoices (
            id, merchant_id, merchant_order_id, fiat_amount_cents, allowed_options,
            callback_url, status, expiry, created_at, updated_at
        ) VALUES (
            :id, :merchant_id, :merchant_order_id, :fiat_amount_cents, :allowed_options,
            :callback_url, :status, :expiry, :created_at, :updated_at
        )
        "#,
        named_params! {
            ":id": invoice.id.to_string(),
            ":merchant_id": invoice.merchant_id.to_string(),
            ":merchant_order_id": invoice.merchant_order_id,
            ":fiat_amount_cents": invoice.fiat_amount.0,
            ":allowed_options": serde_json::to_string(&invoice.allowed_options)?,
            ":callback_url": invoice.callback_url,
            ":status": status_to_str(invoice.status),
            ":expiry": invoice.expiry.naive_utc().to_string(),
            ":created_at": invoice.created_at.naive_utc().to_string(),
            ":updated_at": invoice.updated_at.naive_utc().to_string(),
        },
    )?;

    Ok(())
}

pub fn get_invoice_by_id(conn: &Connection, id: Uuid) -> GatewayDbResult<Option<Invoice>> {
    debug!(invoice_id = id.to_string(); "DB: Fetching invoice by id");

    let mut stmt = conn.prepare_cached(
        r#"
        SELECT id, merchant_id, merchant_order_id, fiat_amount_cents, allowed_options,
               callback_url, status, expiry, created_at, updated_at
        FROM invoices WHERE id = :id
        "#,
    )?;

    match stmt.query_row(named_params! { ":id": id.to_string() }, row_to_invoice) {
        Ok(tuple) => Ok(Some(assemble(
            tuple.0, tuple.1, tuple.2, tuple.3, tuple.4, tuple.5, tuple.6, tuple.7, tuple.8, tuple.9,
        )?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn find_invoice_by_merchant_order_id(
    conn: &Connection,
    merchant_id: Uuid,
    merchant_order_id: &str,
) -> GatewayDbResult<Option<Invoice>> {
    let mut stmt = conn.prepare_cached(
        r#"
        SELECT id, merchant_id, merchant_order_id, fiat_amount_cents, allowed_options,
               callback_url, status, expiry, created_at, updated_at
        FROM invoices WHERE merchant_id = :merchant_id AND merchant_order_id = :order_id
        "#,
    )?;

    match stmt.query_row(
        named_params! { ":merchant_id": merchant_id.to_string(), ":order_id": merchant_order_id },
        row_to_invoice,
    ) {
        Ok(tuple) => Ok(Some(assemble(
            tuple.0, tuple.1, tuple.2, tuple.3, tuple.4, tuple.5, tuple.6, tuple.7, tuple.8, tuple.9,
        )?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Updates an invoice's status. Callers are expected to have already
/// checked `Invoice::is_mutable` — this does not re-derive the state
/// machine, it only persists a transition already decided by
/// [`crate::domain`].
pub fn update_invoice_status(conn: &Connection, id: Uuid, new_status: InvoiceStatus, now: DateTime<Utc>) -> GatewayDbResult<()> {
    info!(target: "audit", invoice_id = id.to_string(), new_status = status_to_str(new_status); "DB: Invoice status changed");

    let changed = conn.execute(
        r#"UPDATE invoices SET status = :status, updated_at = :updated_at WHERE id = :id"#,
        named_params! {
            ":status": status_to_str(new_status),
            ":updated_at": now.naive_utc().to_string(),
            ":id": id.to_string(),
        },
    )?;

    if changed == 0 {
        return Err(GatewayDbError::NotFound(format!("invoice {id}")));
    }
    Ok(())
}

/// Invoices still in a non-terminal status whose `expiry` has passed,
/// for the sweeper to evaluate.
pub fn list_expired_candidate_invoices(conn: &Connection, now: DateTime<Utc>, limit: i64) -> GatewayDbResult<Vec<Invoice>> {
    let mut stmt = conn.prepare_cached(
        r#"
        SELECT id, merchant_id, merchant_order_id, fiat_amount_cents, allowed_options,
               callback_url, status, expiry, created_at, updated_at
        FROM invoices
        WHERE status IN ('PENDING', 'UNDERPAID') AND expiry <= :now
        ORDER BY expiry ASC
        LIMIT :limit
        "#,
    )?;

    let rows = stmt.query_map(
        named_params! { ":now": now.naive_utc().to_string(), ":limit": limit },
        row_to_invoice,
    )?;

    let mut invoices = Vec::new();
    for row in rows {
        let tuple = row?;
        invoices.push(assemble(
            tuple.0, tuple.1, tuple.2, tuple.3, tuple.4, tuple.5, tuple.6, tuple.7, tuple.8, tuple.9,
        )?);
    }
    Ok(invoices)
}
