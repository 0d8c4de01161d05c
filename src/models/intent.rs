use alloy_primitives::U256;
use std::time::Duration;

use crate::blockchain::{normalize_hex, validate_address, validate_calldata, validate_transaction_hash};
use crate::error::ValidationError;
use crate::models::ChainTransaction;

/// The logical transaction being watched.
///
/// `hash` moves to a replacement's hash when one is adopted. `nonce` stays fixed
/// once it is known. `fee_price` only ever increases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorIntent {
    pub sender: String,
    pub hash: String,
    /// Calldata; learned from the node when not supplied
    pub data: Option<String>,
    pub nonce: Option<u64>,
    pub fee_price: Option<U256>,
}

impl MonitorIntent {
    pub fn new(sender: &str, hash: &str, data: &str) -> Result<Self, ValidationError> {
        validate_calldata(data)?;
        let mut intent = Self::without_calldata(sender, hash)?;
        intent.data = Some(normalize_hex(data));
        Ok(intent)
    }

    /// Track a hash whose calldata the caller does not have at hand
    pub fn without_calldata(sender: &str, hash: &str) -> Result<Self, ValidationError> {
        validate_address(sender)?;
        validate_transaction_hash(hash)?;

        Ok(Self {
            sender: normalize_hex(sender),
            hash: normalize_hex(hash),
            data: None,
            nonce: None,
            fee_price: None,
        })
    }

    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = Some(nonce);
        self
    }

    pub fn with_fee_price(mut self, fee_price: U256) -> Self {
        self.fee_price = Some(fee_price);
        self
    }

    /// Whether everything needed to scan for replacements is known
    pub fn is_resolved(&self) -> bool {
        self.nonce.is_some() && self.fee_price.is_some() && self.data.is_some()
    }

    /// Fill in whatever is still unknown from the original transaction
    pub fn record_discovery(&mut self, tx: &ChainTransaction) {
        self.nonce.get_or_insert(tx.nonce);
        self.fee_price.get_or_insert(tx.fee);
        if self.data.is_none() {
            self.data = Some(tx.input.clone());
        }
    }

    /// Start tracking a pending replacement. Sender and nonce are unchanged.
    pub fn adopt(&mut self, replacement: &ChainTransaction) {
        self.hash = replacement.hash.clone();
        self.data = Some(replacement.input.clone());
        self.fee_price = Some(replacement.fee);
    }
}

/// Tuning for a single monitoring session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorOptions {
    /// Delay between the end of one round and the start of the next
    pub poll_delay: Duration,
    /// Stop with an error after this many failed rounds in a row
    pub max_consecutive_failures: Option<u32>,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            poll_delay: Duration::from_millis(500),
            max_consecutive_failures: None,
        }
    }
}
