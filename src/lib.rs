//! `stablegate` — a stablecoin payment gateway: merchants create
//! invoices, deposit addresses are matched against on-chain USDT/USDC
//! transfers, and the resulting state changes are delivered to merchant
//! callback endpoints at least once.
//!
//! The crate is organized around the payment pipeline:
//!
//! - [`domain`] — the pure state machine (no I/O)
//! - [`ingress`] — normalizes inbound provider webhooks
//! - [`matcher`] — folds a normalized transfer into its intent, transactionally
//! - [`outbox`] — delivers queued side effects to merchants with retry
//! - [`sweeper`] — expires invoices whose deadline has passed
//! - [`db`] — SQLite persistence for all of the above
//! - [`api`] — the merchant- and operator-facing REST surface

pub mod api;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod db;
pub mod domain;
pub mod error;
pub mod idempotency;
pub mod ingress;
pub mod log;
pub mod matcher;
pub mod money;
pub mod outbox;
pub mod provider;
pub mod signing;
pub mod sweeper;
