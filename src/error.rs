//! Top-level error taxonomy. Every operation on the
//! ingress/matcher/outbox path reports one of these categories so
//! callers can decide whether to retry, surface to the merchant, or page
//! an operator.

use thiserror::Error;

use crate::db::GatewayDbError;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The request itself was malformed or failed a business-rule check
    /// (e.g. unsupported `(token, chain)` pair). Not retryable as-is.
    #[error("validation error: {0}")]
    Validation(String),

    /// The request conflicts with already-persisted state (e.g. a reused
    /// `merchant_order_id`, or an `Idempotency-Key` replayed with a
    /// different body).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A downstream dependency (database, provider API, merchant
    /// endpoint) failed in a way expected to clear on retry.
    #[error("transient infrastructure error: {0}")]
    TransientInfrastructure(String),

    /// A downstream dependency failed in a way not expected to clear on
    /// retry (e.g. the provider rejected our credentials).
    #[error("permanent external error: {0}")]
    PermanentExternal(String),

    /// An internal invariant the state machine assumes was violated.
    /// Always a bug, never a transient condition; should page, not
    /// retry.
    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl From<r2d2::Error> for GatewayError {
    fn from(err: r2d2::Error) -> Self {
        GatewayError::TransientInfrastructure(err.to_string())
    }
}

impl From<GatewayDbError> for GatewayError {
    fn from(err: GatewayDbError) -> Self {
        match err {
            GatewayDbError::NotFound(msg) => GatewayError::NotFound(msg),
            GatewayDbError::InvalidInput(msg) => GatewayError::Validation(msg),
            GatewayDbError::DuplicateEntry(msg) => GatewayError::Conflict(msg),
            other => GatewayError::TransientInfrastructure(other.to_string()),
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
