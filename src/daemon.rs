//! Orchestrates the gateway's long-running process: the HTTP API
//! server plus the outbox dispatcher and expiry sweeper background
//! tasks, all coordinated through a shared shutdown broadcast channel
//! (ctrl_c, or the first task to fail).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use log::info;
use tokio::signal;
use tokio::sync::broadcast;

use crate::api::{self, AppState};
use crate::config::GatewaySettings;
use crate::db;
use crate::outbox::Dispatcher;
use crate::provider::ChainTipClient;
use crate::sweeper::Sweeper;

pub struct Daemon {
    settings: GatewaySettings,
}

impl Daemon {
    pub fn new(settings: GatewaySettings) -> Self {
        Self { settings }
    }

    /// Runs until a shutdown signal is received, or a component fails
    /// fatally.
    pub async fn run(&self) -> Result<()> {
        info!("Daemon started. Press Ctrl+C to stop.");

        let (shutdown_tx, _) = broadcast::channel(1);

        let db_pool = db::init_db(PathBuf::from(&self.settings.database.path)).context("failed to initialize database")?;

        let rpc_url = url::Url::parse(&self.settings.provider.rpc_url).context("invalid provider.rpc_url")?;
        let chain_tip_timeout = std::time::Duration::from_millis(self.settings.provider.timeout_ms);
        let chain_tip = Arc::new(
            ChainTipClient::with_config(rpc_url, self.settings.provider.max_retries, chain_tip_timeout)
                .context("failed to build chain-tip provider client")?,
        );

        let dispatcher = Arc::new(Dispatcher::new(
            db_pool.clone(),
            self.settings.outbox.clone(),
            self.settings.matching.required_confirmations,
            chain_tip,
        ));
        let dispatcher_rx = shutdown_tx.subscribe();
        let dispatcher_handle = tokio::spawn(async move {
            dispatcher.run(dispatcher_rx).await;
            Ok::<(), anyhow::Error>(())
        });

        let sweeper = Sweeper::new(db_pool.clone(), self.settings.sweeper.clone());
        let sweeper_rx = shutdown_tx.subscribe();
        let sweeper_handle = tokio::spawn(async move {
            sweeper.run(sweeper_rx).await;
            Ok::<(), anyhow::Error>(())
        });

        let state = AppState { db_pool, provider_webhook_secret: self.settings.ingress.provider_webhook_secret.clone() };
        let router = api::create_router(state);
        let listener = tokio::net::TcpListener::bind(&self.settings.http.bind_address)
            .await
            .map_err(|e| anyhow!("failed to bind API server to {}: {e}", self.settings.http.bind_address))?;

        info!(address = self.settings.http.bind_address.as_str(); "API server listening");

        let mut shutdown_rx_api = shutdown_tx.subscribe();
        let api_handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    shutdown_rx_api.recv().await.ok();
                })
                .await
                .map_err(anyhow::Error::from)
        });

        let shutdown_tx_clone = shutdown_tx.clone();
        let ctrlc_handle = tokio::spawn(async move {
            signal::ctrl_c().await.expect("failed to listen for ctrl_c");
            info!("Received shutdown signal, stopping all tasks...");
            let _ = shutdown_tx_clone.send(());
            Ok::<(), anyhow::Error>(())
        });

        let joined = tokio::try_join!(api_handle, dispatcher_handle, sweeper_handle, ctrlc_handle)
            .map_err(|e| anyhow!("a task panicked: {e}"))?;

        let (api_res, dispatcher_res, sweeper_res, ctrlc_res) = joined;
        api_res?;
        dispatcher_res?;
        sweeper_res?;
        ctrlc_res?;

        info!("Daemon stopped gracefully.");
        Ok(())
    }
}
