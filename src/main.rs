use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use stablegate::cli::{Cli, Commands};
use stablegate::{config, daemon::Daemon, db, log as gatewaylog};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = config::load_configuration(&cli.config).context("failed to load configuration")?;

    match cli.command {
        Commands::Serve => {
            gatewaylog::init_logging(&settings.log.config_path);
            info!(network = settings.network.as_str(); "Starting stablegate daemon");
            Daemon::new(settings).run().await
        },
        Commands::Migrate => {
            gatewaylog::init_logging(&settings.log.config_path);
            db::init_db(&settings.database.path).context("failed to apply migrations")?;
            info!("Migrations applied");
            Ok(())
        },
        Commands::PrintConfig => {
            println!("network = {:?}", settings.network);
            println!("database.path = {:?}", settings.database.path);
            println!("http.bind_address = {:?}", settings.http.bind_address);
            println!("ingress.provider_webhook_secret = \"<redacted>\"");
            println!("matching.required_confirmations = {}", settings.matching.required_confirmations);
            println!(
                "outbox = {{ poll_interval_seconds: {}, batch_size: {}, max_attempts: {}, backoff_base_seconds: {}, backoff_cap_seconds: {}, claim_ttl_seconds: {} }}",
                settings.outbox.poll_interval_seconds,
                settings.outbox.batch_size,
                settings.outbox.max_attempts,
                settings.outbox.backoff_base_seconds,
                settings.outbox.backoff_cap_seconds,
                settings.outbox.claim_ttl_seconds
            );
            println!(
                "sweeper = {{ poll_interval_seconds: {}, batch_size: {}, lease_ttl_seconds: {} }}",
                settings.sweeper.poll_interval_seconds, settings.sweeper.batch_size, settings.sweeper.lease_ttl_seconds
            );
            println!(
                "provider = {{ rpc_url: {:?}, timeout_ms: {}, max_retries: {} }}",
                settings.provider.rpc_url, settings.provider.timeout_ms, settings.provider.max_retries
            );
            Ok(())
        },
    }
}
