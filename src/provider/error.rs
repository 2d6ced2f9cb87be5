//! Error types for the chain-tip RPC client.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),

    #[error("server error {status}: {body}")]
    ServerError { status: reqwest::StatusCode, body: String },

    #[error("URL parse error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("RPC error {code}: {message}")]
    RpcError { code: i64, message: String },
}
