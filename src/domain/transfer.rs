use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::AtomicAmount;

/// An observed on-chain credit toward some address. Append-only; unique
/// by `(chain, tx_hash, log_index)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub id: Uuid,
    pub chain: String,
    pub tx_hash: String,
    pub log_index: i64,
    pub token: String,
    pub to_address: String,
    pub amount: AtomicAmount,
    pub block_number: u64,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// Normalized shape the ingress layer produces from a provider webhook
/// envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedTransferEvent {
    pub chain: String,
    pub tx_hash: String,
    pub log_index: i64,
    pub token: String,
    pub to: String,
    pub amount: AtomicAmount,
    pub block_number: u64,
    pub provider_event_id: String,
}

/// Effective confirmations for a transfer at a given chain tip,
/// `max(0, currentBlock - blockNumber + 1)`.
pub fn effective_confirmations(current_block: u64, transfer_block: u64) -> u64 {
    if current_block + 1 < transfer_block {
        0
    } else {
        current_block + 1 - transfer_block
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirmations_are_inclusive_of_the_mined_block() {
        assert_eq!(effective_confirmations(100, 100), 1);
    }

    #[test]
    fn confirmations_grow_with_chain_tip() {
        assert_eq!(effective_confirmations(112, 100), 13);
    }

    #[test]
    fn confirmations_never_go_negative_on_reorg_below_mined_height() {
        assert_eq!(effective_confirmations(5, 100), 0);
    }
}
