use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use url::Url;

use super::error::ProviderError;
use super::http_client::HttpClient;

/// A source of "what block is the chain at right now". Abstracted behind
/// a trait so the dispatcher can be driven by a fake chain tip in tests
/// instead of a live node.
#[async_trait]
pub trait ChainTipProvider: Send + Sync {
    async fn chain_tip(&self, chain: &str) -> Result<u64, ProviderError>;
}

/// Reads the tip via the standard EVM JSON-RPC `eth_blockNumber` call.
/// One RPC endpoint per gateway instance — `chain` is accepted for
/// forward compatibility with a multi-chain deployment, but this
/// implementation targets the single configured network.
pub struct ChainTipClient {
    http: HttpClient,
}

impl ChainTipClient {
    pub fn new(rpc_url: Url) -> Result<Self, ProviderError> {
        Ok(Self { http: HttpClient::new(rpc_url)? })
    }

    pub fn with_config(rpc_url: Url, max_retries: u32, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self { http: HttpClient::with_config(rpc_url, max_retries, timeout)? })
    }
}

#[async_trait]
impl ChainTipProvider for ChainTipClient {
    async fn chain_tip(&self, _chain: &str) -> Result<u64, ProviderError> {
        let hex_height: String = self.http.call("eth_blockNumber", json!([])).await?;
        let trimmed = hex_height.trim_start_matches("0x");
        u64::from_str_radix(trimmed, 16)
            .map_err(|e| ProviderError::RpcError { code: 0, message: format!("malformed block height {hex_height}: {e}") })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedTip(u64);

    #[async_trait]
    impl ChainTipProvider for FixedTip {
        async fn chain_tip(&self, _chain: &str) -> Result<u64, ProviderError> {
            Ok(self.0)
        }
    }

    #[tokio::test]
    async fn a_stub_provider_satisfies_the_trait() {
        let provider: Box<dyn ChainTipProvider> = Box::new(FixedTip(42));
        assert_eq!(provider.chain_tip("arbitrum").await.unwrap(), 42);
    }
}
