//! Configuration loading: a TOML file on disk, seeded from an embedded
//! default on first run, overridable by `STABLEGATE_`-prefixed
//! environment variables.

use std::fs;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use config::Environment;
use log::info;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpSettings {
    pub bind_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngressSettings {
    pub provider_webhook_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingSettings {
    pub required_confirmations: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutboxSettings {
    pub poll_interval_seconds: u64,
    pub batch_size: i64,
    pub max_attempts: u32,
    pub backoff_base_seconds: u64,
    pub backoff_cap_seconds: u64,
    pub claim_ttl_seconds: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SweeperSettings {
    pub poll_interval_seconds: u64,
    pub batch_size: i64,
    pub lease_ttl_seconds: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSettings {
    pub rpc_url: String,
    pub timeout_ms: u64,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    pub config_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySettings {
    pub network: String,
    pub database: DatabaseSettings,
    pub http: HttpSettings,
    pub ingress: IngressSettings,
    pub matching: MatchingSettings,
    pub outbox: OutboxSettings,
    pub sweeper: SweeperSettings,
    pub provider: ProviderSettings,
    pub log: LogSettings,
}

pub fn get_default_config() -> &'static str {
    include_str!("../../resources/default_config.toml")
}

/// Loads configuration from `path`, writing the embedded default there
/// first if no file yet exists, then layering `STABLEGATE_`-prefixed
/// environment variable overrides (`STABLEGATE_OUTBOX__BATCH_SIZE=50`,
/// double underscore as the nesting separator).
pub fn load_configuration(path: &Path) -> Result<GatewaySettings> {
    if !path.exists() {
        write_config_to(path, get_default_config()).context("could not create default config")?;
        info!(path:% = path.display(); "Created new configuration file");
    }

    let filename = path.to_str().context("invalid config file path")?;

    let cfg = config::Config::builder()
        .add_source(config::File::with_name(filename))
        .add_source(Environment::with_prefix("STABLEGATE").prefix_separator("_").separator("__"))
        .build()
        .context("could not build configuration")?;

    cfg.try_deserialize().context("could not deserialize configuration")
}

pub fn write_config_to(path: &Path, source: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).context("failed to create parent directories")?;
        }
    }
    let mut file = File::create(path).context("failed to create config file")?;
    file.write_all(source.as_bytes()).context("failed to write config content")?;
    Ok(())
}
