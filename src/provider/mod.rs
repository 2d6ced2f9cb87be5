//! A small JSON-RPC client for reading the live tip of the configured
//! EVM chain, used by the outbox dispatcher to compute confirmation
//! depth against a real block height instead of a funding transfer's own
//! block.
//!
//! A thin retrying transport (`http_client`) wrapped by a typed client
//! exposing one operation (`chain_tip_client`).

mod chain_tip_client;
mod error;
mod http_client;

pub use chain_tip_client::{ChainTipClient, ChainTipProvider};
pub use error::ProviderError;
