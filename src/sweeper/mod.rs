//! Periodically expires invoices whose `expiry` has passed without
//! reaching `Paid`. A single `tokio::select!` poll loop, guarded by a
//! lease so only one gateway instance runs the sweep at a time against a
//! shared database.

use std::time::Duration;

use chrono::Utc;
use log::{error, info};
use rusqlite::Connection;
use uuid::Uuid;

use crate::config::SweeperSettings;
use crate::db::{self, SqlitePool};
use crate::domain;
use crate::error::GatewayResult;
use tokio::sync::broadcast;

const LEASE_NAME: &str = "sweeper";

pub struct Sweeper {
    db_pool: SqlitePool,
    settings: SweeperSettings,
    holder_id: String,
}

impl Sweeper {
    pub fn new(db_pool: SqlitePool, settings: SweeperSettings) -> Self {
        Self { db_pool, settings, holder_id: Uuid::new_v4().to_string() }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Expiry sweeper started.");
        let mut interval = tokio::time::interval(Duration::from_secs(self.settings.poll_interval_seconds));

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        error!(error:% = e; "Error sweeping expired invoices");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Expiry sweeper received shutdown signal.");
                    break;
                }
            }
        }
        info!("Expiry sweeper has shut down.");
    }

    async fn sweep_once(&self) -> GatewayResult<()> {
        let pool = self.db_pool.clone();
        let holder = self.holder_id.clone();
        let lease_ttl = self.settings.lease_ttl_seconds;
        let batch_size = self.settings.batch_size;

        tokio::task::spawn_blocking(move || sweep_expired_invoices(&pool, &holder, lease_ttl, batch_size))
            .await
            .map_err(|e| crate::error::GatewayError::Invariant(e.to_string()))??;
        Ok(())
    }
}

fn sweep_expired_invoices(pool: &SqlitePool, holder: &str, lease_ttl_seconds: i64, batch_size: i64) -> GatewayResult<()> {
    let mut conn = pool.get()?;

    if !db::acquire_lease(&conn, LEASE_NAME, holder, lease_ttl_seconds)? {
        return Ok(());
    }

    let now = Utc::now();
    let candidates = db::list_expired_candidate_invoices(&conn, now, batch_size)?;

    for invoice in candidates {
        if let Err(e) = expire_one(&mut conn, &invoice.id, now) {
            error!(invoice_id = invoice.id.to_string(), error:% = e; "Failed to expire invoice");
        }
    }

    db::release_lease(&conn, LEASE_NAME, holder)?;
    Ok(())
}

fn expire_one(conn: &mut Connection, invoice_id: &Uuid, now: chrono::DateTime<chrono::Utc>) -> GatewayResult<()> {
    let Some(invoice) = db::get_invoice_by_id(conn, *invoice_id)? else {
        return Ok(());
    };

    let intents = db::list_intents_for_invoice(conn, invoice.id)?;
    let has_partial_credit = intents.iter().any(|i| !i.credited_atomic.is_zero());

    let outcome = domain::expire(&invoice, now, has_partial_credit);
    if outcome.new_status == invoice.status {
        return Ok(());
    }

    let tx = conn.transaction()?;
    db::update_invoice_status(&tx, invoice.id, outcome.new_status, now)?;
    for record in &outcome.outbox_records {
        db::insert_outbox_record(&tx, record)?;
    }
    tx.commit()?;

    info!(target: "audit", invoice_id = invoice.id.to_string(), new_status:? = outcome.new_status; "Sweeper: invoice expired");
    Ok(())
}
