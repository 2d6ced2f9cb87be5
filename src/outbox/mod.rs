//! The outbox dispatcher: polls `outbox` for due records, claims a batch,
//! delivers each to the owning merchant's callback URL (or, for
//! self-rescheduling kinds, re-evaluates domain state), and reschedules
//! failures with exponential backoff.
//!
//! A poll-loop task owning a `reqwest::Client`, driven by a
//! `tokio::select!` against a shutdown broadcast channel.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, error, info, warn};
use rand::Rng;
use reqwest::Client;
use tokio::sync::broadcast;
use uuid::Uuid;

mod callback;

use crate::config::OutboxSettings;
use crate::db::{self, GatewayDbResult, OutboxRow, SqlitePool};
use crate::domain::confirmation_rule::{check_confirmations, ConfirmationOutcome, FundingTransfer};
use crate::domain::outbox_record::OutboxKind;
use crate::provider::ChainTipProvider;
use crate::signing;

/// Result of one delivery attempt to the merchant's callback endpoint.
enum DeliveryResult {
    Success,
    RetryableFailure(String),
    PermanentFailure(String),
}

pub struct Dispatcher {
    db_pool: SqlitePool,
    settings: OutboxSettings,
    required_confirmations: u64,
    http: Client,
    worker_id: String,
    chain_tip: Arc<dyn ChainTipProvider>,
}

impl Dispatcher {
    pub fn new(db_pool: SqlitePool, settings: OutboxSettings, required_confirmations: u64, chain_tip: Arc<dyn ChainTipProvider>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(20))
            .user_agent("stablegate/1.0")
            .build()
            .expect("failed to build HTTP client");

        Self { db_pool, settings, required_confirmations, http, worker_id: Uuid::new_v4().to_string(), chain_tip }
    }

    pub async fn run(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Outbox dispatcher started.");
        let mut interval = tokio::time::interval(Duration::from_secs(self.settings.poll_interval_seconds));

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.process_batch().await {
                        error!(error:% = e; "Error processing outbox batch");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Outbox dispatcher received shutdown signal.");
                    break;
                }
            }
        }
        info!("Outbox dispatcher has shut down.");
    }

    async fn process_batch(&self) -> anyhow::Result<()> {
        let pool = self.db_pool.clone();
        let claim_token = self.worker_id.clone();
        let claim_ttl = self.settings.claim_ttl_seconds;
        let batch_size = self.settings.batch_size;

        let rows = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            db::claim_due_outbox_records(&mut conn, &claim_token, claim_ttl, batch_size)
        })
        .await??;

        if rows.is_empty() {
            return Ok(());
        }

        debug!(count = rows.len(); "Processing due outbox batch");

        for row in rows {
            self.process_record(row).await;
        }

        Ok(())
    }

    async fn process_record(&self, row: OutboxRow) {
        if row.kind.is_self_rescheduling() {
            self.process_confirmation_check(row).await;
            return;
        }

        if row.kind.is_observability_only() {
            info!(outbox_id = row.id.to_string(), kind = row.kind.type_name(); "Outbox record is observability-only, not delivered to merchant");
            let pool = self.db_pool.clone();
            let id = row.id;
            let _ = tokio::task::spawn_blocking(move || db::mark_outbox_delivered(&pool.get()?, id)).await;
            return;
        }

        let merchant_secret = match self.load_merchant_secret(row.invoice_id).await {
            Ok(secret) => secret,
            Err(e) => {
                error!(outbox_id = row.id.to_string(), error:% = e; "Could not load merchant secret for outbox record");
                self.reschedule(row, &e.to_string()).await;
                return;
            },
        };

        let (callback_url, body) = match self.build_delivery(&row).await {
            Ok(built) => built,
            Err(e) => {
                warn!(outbox_id = row.id.to_string(), error:% = e; "Outbox record could not be built for delivery, dropping");
                let pool = self.db_pool.clone();
                let id = row.id;
                let _ = tokio::task::spawn_blocking(move || db::mark_outbox_permanently_failed(&pool.get()?, id, "unbuildable")).await;
                return;
            },
        };

        let result = self.deliver(&callback_url, &merchant_secret, row.delivery_id, &body).await;

        match result {
            DeliveryResult::Success => {
                info!(outbox_id = row.id.to_string(); "Outbox record delivered");
                let pool = self.db_pool.clone();
                let id = row.id;
                let _ = tokio::task::spawn_blocking(move || db::mark_outbox_delivered(&pool.get()?, id)).await;
            },
            DeliveryResult::PermanentFailure(msg) => {
                warn!(outbox_id = row.id.to_string(), error:% = msg; "Outbox delivery failed permanently");
                let pool = self.db_pool.clone();
                let id = row.id;
                let _ = tokio::task::spawn_blocking(move || db::mark_outbox_permanently_failed(&pool.get()?, id, &msg)).await;
            },
            DeliveryResult::RetryableFailure(msg) => {
                self.reschedule(row, &msg).await;
            },
        }
    }

    async fn reschedule(&self, row: OutboxRow, error: &str) {
        let attempt = row.attempt_count + 1;
        if attempt as u32 >= self.settings.max_attempts {
            warn!(outbox_id = row.id.to_string(), attempt; "Outbox record exceeded max attempts, giving up");
            let pool = self.db_pool.clone();
            let id = row.id;
            let err = error.to_string();
            let _ = tokio::task::spawn_blocking(move || db::mark_outbox_permanently_failed(&pool.get()?, id, &err)).await;
            return;
        }

        let next_attempt_at = Utc::now() + chrono::Duration::seconds(backoff_seconds(attempt, self.settings.backoff_base_seconds, self.settings.backoff_cap_seconds) as i64);
        warn!(outbox_id = row.id.to_string(), attempt, error:% = error; "Outbox delivery failed, rescheduling");

        let pool = self.db_pool.clone();
        let id = row.id;
        let err = error.to_string();
        let _ = tokio::task::spawn_blocking(move || db::reschedule_outbox_record(&pool.get()?, id, next_attempt_at, &err)).await;
    }

    async fn build_delivery(&self, row: &OutboxRow) -> anyhow::Result<(String, String)> {
        let pool = self.db_pool.clone();
        let invoice_id = row.invoice_id;
        let explicit_intent_id = row.kind.intent_id();

        let (invoice, funding) = tokio::task::spawn_blocking(move || -> GatewayDbResult<(crate::domain::Invoice, callback::FundingContext)> {
            let conn = pool.get()?;
            let invoice = db::get_invoice_by_id(&conn, invoice_id)?
                .ok_or_else(|| crate::db::GatewayDbError::NotFound(format!("invoice {invoice_id}")))?;

            let intent = match explicit_intent_id {
                Some(id) => db::get_intent_by_id(&conn, id)?,
                None => {
                    let intents = db::list_intents_for_invoice(&conn, invoice_id)?;
                    intents.into_iter().max_by_key(|i| i.updated_at)
                },
            };

            let funding = match intent {
                Some(intent) => {
                    let transfers = db::list_funding_transfers_for_intent(&conn, intent.id)?;
                    callback::FundingContext {
                        token: intent.token,
                        chain: intent.chain,
                        paid_amount_atomic: intent.credited_atomic,
                        tx_hashes: transfers.into_iter().map(|t| t.tx_hash).collect(),
                    }
                },
                None => callback::FundingContext {
                    token: String::new(),
                    chain: String::new(),
                    paid_amount_atomic: crate::money::AtomicAmount::ZERO,
                    tx_hashes: Vec::new(),
                },
            };

            Ok((invoice, funding))
        })
        .await??;

        let callback_body = callback::build(row.delivery_id, invoice_id, &invoice.merchant_order_id, &row.kind, funding, row.created_at);
        let body = serde_json::to_string(&callback_body)?;
        Ok((invoice.callback_url, body))
    }

    async fn load_merchant_secret(&self, invoice_id: Uuid) -> anyhow::Result<String> {
        let pool = self.db_pool.clone();
        let invoice = tokio::task::spawn_blocking(move || db::get_invoice_by_id(&pool.get()?, invoice_id))
            .await??
            .ok_or_else(|| anyhow::anyhow!("invoice {invoice_id} not found"))?;

        let pool = self.db_pool.clone();
        let merchant_id = invoice.merchant_id;
        let merchant = tokio::task::spawn_blocking(move || db::get_merchant_by_id(&pool.get()?, merchant_id))
            .await??
            .ok_or_else(|| anyhow::anyhow!("merchant {merchant_id} not found"))?;

        Ok(merchant.webhook_secret)
    }

    async fn deliver(&self, url: &str, secret: &str, delivery_id: Uuid, body: &str) -> DeliveryResult {
        let (timestamp, signature) = match signing::sign_now(secret, body) {
            Ok(s) => s,
            Err(e) => return DeliveryResult::PermanentFailure(format!("signing error: {e}")),
        };

        let request = self
            .http
            .post(url)
            .header("Content-Type", "application/json")
            .header(signing::SIGNATURE_HEADER, signature)
            .header(signing::TIMESTAMP_HEADER, timestamp.to_string())
            .header("Idempotency-Key", delivery_id.to_string())
            .body(body.to_string());

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                // 408/425/429 are the merchant asking us to slow down or
                // retry, not a rejection of the payload — treat them as
                // transient rather than falling into the permanent-failure
                // branch with the rest of 4xx.
                let transient_client_error =
                    status == reqwest::StatusCode::REQUEST_TIMEOUT || status == reqwest::StatusCode::TOO_EARLY || status == reqwest::StatusCode::TOO_MANY_REQUESTS;

                if status.is_success() {
                    DeliveryResult::Success
                } else if status.is_client_error() && !transient_client_error {
                    let body = response.text().await.unwrap_or_default().chars().take(200).collect::<String>();
                    DeliveryResult::PermanentFailure(format!("client error {status}: {body}"))
                } else {
                    DeliveryResult::RetryableFailure(format!("server error {status}"))
                }
            },
            Err(e) => DeliveryResult::RetryableFailure(format!("network error: {e}")),
        }
    }

    /// Handles a `PaidAwaitingConfirmation` record: checks confirmation
    /// depth against a live chain tip read from the configured provider
    /// (not from the funding transfers' own block numbers — a transfer is
    /// never its own tip) and either reschedules the same check, or
    /// emits+delivers an `InvoiceStatusChanged(Confirmed)` in its place.
    async fn process_confirmation_check(&self, row: OutboxRow) {
        let (invoice_id, intent_id) = match &row.kind {
            OutboxKind::PaidAwaitingConfirmation { invoice_id, intent_id } => (*invoice_id, *intent_id),
            _ => return,
        };

        let pool = self.db_pool.clone();
        let fetch: GatewayDbResult<(String, Vec<FundingTransfer>)> = tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            let intent = db::get_intent_by_id(&conn, intent_id)?.ok_or_else(|| crate::db::GatewayDbError::NotFound(format!("intent {intent_id}")))?;
            let transfers = db::list_funding_transfers_for_intent(&conn, intent_id)?;
            let funding = transfers.iter().map(|t| FundingTransfer { id: t.id, block_number: t.block_number }).collect();
            Ok((intent.chain, funding))
        })
        .await
        .map_err(|e| crate::db::GatewayDbError::Unexpected(e.to_string()))
        .and_then(|inner| inner);

        let (chain, funding) = match fetch {
            Ok(v) => v,
            Err(e) => {
                error!(outbox_id = row.id.to_string(), error:% = e; "Could not load intent for confirmation check");
                self.reschedule(row, &e.to_string()).await;
                return;
            },
        };

        let current_block = match self.chain_tip.chain_tip(&chain).await {
            Ok(block) => block,
            Err(e) => {
                error!(outbox_id = row.id.to_string(), error:% = e; "Could not read chain tip for confirmation check");
                self.reschedule(row, &e.to_string()).await;
                return;
            },
        };

        let outcome = check_confirmations(invoice_id, intent_id, &funding, current_block, self.required_confirmations, false);

        match outcome {
            ConfirmationOutcome::StillWaiting => {
                self.reschedule_confirmation_check(row).await;
            },
            ConfirmationOutcome::Confirmed { outbox_records } => {
                self.commit_confirmation(row.id, invoice_id, intent_id, outbox_records).await;
            },
            ConfirmationOutcome::RegressedAfterConfirm { .. } => {
                let pool = self.db_pool.clone();
                let id = row.id;
                let _ = tokio::task::spawn_blocking(move || db::mark_outbox_delivered(&pool.get()?, id)).await;
            },
        }
    }

    async fn reschedule_confirmation_check(&self, row: OutboxRow) {
        let next_attempt_at = Utc::now() + chrono::Duration::seconds(self.settings.poll_interval_seconds as i64);
        let pool = self.db_pool.clone();
        let id = row.id;
        let _ = tokio::task::spawn_blocking(move || db::reschedule_outbox_record(&pool.get()?, id, next_attempt_at, "awaiting confirmations")).await;
    }

    async fn commit_confirmation(&self, outbox_id: Uuid, invoice_id: Uuid, intent_id: Uuid, outbox_records: Vec<OutboxKind>) {
        let pool = self.db_pool.clone();
        let result: GatewayDbResult<()> = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let tx = conn.transaction()?;
            db::update_invoice_status(&tx, invoice_id, crate::domain::InvoiceStatus::Confirmed, Utc::now())?;
            for record in &outbox_records {
                db::insert_outbox_record(&tx, record)?;
            }
            db::mark_outbox_delivered(&tx, outbox_id)?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(|e| crate::db::GatewayDbError::Unexpected(e.to_string()))
        .and_then(|inner| inner);

        if let Err(e) = result {
            error!(intent_id = intent_id.to_string(), error:% = e; "Failed to commit invoice confirmation");
        } else {
            info!(target: "audit", invoice_id = invoice_id.to_string(); "Invoice confirmed");
        }
    }
}

/// `min(cap, base * 2^(attempt-1)) * uniform(0.5, 1.5)`.
fn backoff_seconds(attempt: i64, base_seconds: u64, cap_seconds: u64) -> u64 {
    let exponent = (attempt - 1).max(0) as u32;
    let raw = base_seconds.saturating_mul(2u64.saturating_pow(exponent));
    let capped = raw.min(cap_seconds);
    let jitter = rand::thread_rng().gen_range(0.5..1.5);
    ((capped as f64) * jitter).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_stays_under_the_cap() {
        for attempt in 1..12 {
            let delay = backoff_seconds(attempt, 5, 3600);
            assert!(delay <= (3600.0 * 1.5) as u64);
        }
    }

    #[test]
    fn backoff_first_attempt_hovers_around_base() {
        let delay = backoff_seconds(1, 5, 3600);
        assert!(delay >= 2 && delay <= 8);
    }
}
