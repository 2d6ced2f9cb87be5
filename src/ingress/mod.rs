//! Normalizes inbound provider webhook payloads into
//! [`NormalizedTransferEvent`]s before they reach the matcher. This is
//! the one place that knows the shape of the upstream indexer's
//! envelope; everything downstream only sees the normalized type.

use serde::Deserialize;

use crate::domain::transfer::NormalizedTransferEvent;
use crate::error::{GatewayError, GatewayResult};
use crate::money::AtomicAmount;
use crate::signing;

/// The envelope shape the upstream chain-data provider POSTs to
/// `/webhooks/provider`. Provider-specific; kept narrow on purpose so
/// swapping indexers only touches this struct and [`normalize`].
#[derive(Debug, Deserialize)]
pub struct ProviderTransferEnvelope {
    pub chain: String,
    pub tx_hash: String,
    pub log_index: i64,
    pub token: String,
    pub to: String,
    pub amount: String,
    pub block_number: u64,
    pub event_id: String,
}

/// Verifies the provider's signature over the raw request body, then
/// parses and normalizes it.
pub fn verify_and_normalize(
    secret: &str,
    timestamp: u64,
    raw_body: &str,
    signature: &str,
) -> GatewayResult<NormalizedTransferEvent> {
    if !signing::verify(secret, timestamp, raw_body, signature) {
        return Err(GatewayError::Validation("provider webhook signature invalid".into()));
    }

    let envelope: ProviderTransferEnvelope =
        serde_json::from_str(raw_body).map_err(|e| GatewayError::Validation(format!("malformed provider payload: {e}")))?;

    normalize(envelope)
}

pub fn normalize(envelope: ProviderTransferEnvelope) -> GatewayResult<NormalizedTransferEvent> {
    let amount: AtomicAmount = envelope
        .amount
        .parse()
        .map_err(|e| GatewayError::Validation(format!("malformed transfer amount: {e}")))?;

    Ok(NormalizedTransferEvent {
        chain: envelope.chain,
        tx_hash: envelope.tx_hash,
        log_index: envelope.log_index,
        token: envelope.token,
        to: envelope.to,
        amount,
        block_number: envelope.block_number,
        provider_event_id: envelope.event_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_a_well_formed_envelope() {
        let envelope = ProviderTransferEnvelope {
            chain: "arbitrum".into(),
            tx_hash: "0xdead".into(),
            log_index: 2,
            token: "USDT".into(),
            to: "0xabc".into(),
            amount: "500000".into(),
            block_number: 100,
            event_id: "evt-1".into(),
        };
        let event = normalize(envelope).unwrap();
        assert_eq!(event.amount, AtomicAmount::from(500_000u64));
    }

    #[test]
    fn rejects_a_malformed_amount() {
        let envelope = ProviderTransferEnvelope {
            chain: "arbitrum".into(),
            tx_hash: "0xdead".into(),
            log_index: 2,
            token: "USDT".into(),
            to: "0xabc".into(),
            amount: "not-a-number".into(),
            block_number: 100,
            event_id: "evt-1".into(),
        };
        assert!(normalize(envelope).is_err());
    }

    #[test]
    fn verify_and_normalize_rejects_bad_signature() {
        let body = r#"{"chain":"arbitrum","tx_hash":"0xdead","log_index":0,"token":"USDT","to":"0xabc","amount":"1","block_number":1,"event_id":"e"}"#;
        let err = verify_and_normalize("secret", 1_700_000_000, body, "v1=deadbeef").unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }
}
