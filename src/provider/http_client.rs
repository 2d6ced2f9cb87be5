use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use super::error::ProviderError;

const DEFAULT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

/// A retrying JSON-RPC-over-HTTP transport, used for the one call this
/// gateway needs from a node provider: reading the current block height.
pub(crate) struct HttpClient {
    rpc_url: Url,
    client: reqwest_middleware::ClientWithMiddleware,
}

impl HttpClient {
    pub fn new(rpc_url: Url) -> Result<Self, ProviderError> {
        Self::with_config(rpc_url, DEFAULT_MAX_RETRIES, Duration::from_millis(DEFAULT_TIMEOUT_MS))
    }

    pub fn with_config(rpc_url: Url, max_retries: u32, timeout: Duration) -> Result<Self, ProviderError> {
        let retry_policy = reqwest_retry::policies::ExponentialBackoff::builder().build_with_max_retries(max_retries);

        let inner_client = reqwest::Client::builder().timeout(timeout).build()?;

        let client = reqwest_middleware::ClientBuilder::new(inner_client)
            .with(reqwest_retry::RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self { rpc_url, client })
    }

    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, ProviderError> {
        let request_body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let resp = self.client.post(self.rpc_url.clone()).json(&request_body).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_else(|_| "failed to read response body".into());
            return Err(ProviderError::ServerError { status, body });
        }

        let parsed: JsonRpcResponse<T> = resp.json().await?;
        match parsed.result {
            Some(result) => Ok(result),
            None => {
                let error = parsed.error.unwrap_or(JsonRpcError { code: 0, message: "empty RPC response".into() });
                Err(ProviderError::RpcError { code: error.code, message: error.message })
            },
        }
    }
}
