use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

/// A transaction as reported by the node, decoded into domain types.
///
/// Hex strings (`hash`, `from`, `to`, `input`) are stored lower-cased.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChainTransaction {
    pub hash: String,
    pub from: String,
    pub to: Option<String>,
    pub nonce: u64,
    /// Legacy `gasPrice`, or `maxFeePerGas` for dynamic-fee transactions
    pub fee: U256,
    pub input: String,
    /// `None` while the transaction is still pending
    pub block_number: Option<u64>,
}

impl ChainTransaction {
    pub fn is_pending(&self) -> bool {
        self.block_number.is_none()
    }
}

/// A block with its full transaction list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    pub number: u64,
    pub hash: String,
    pub transactions: Vec<ChainTransaction>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReceiptStatus {
    Success,
    Failed,
}

/// Chain-issued confirmation for a mined transaction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub transaction_hash: String,
    pub block_number: u64,
    pub block_hash: String,
    pub status: ReceiptStatus,
    pub from: String,
    pub to: Option<String>,
    pub gas_used: U256,
    pub effective_gas_price: Option<U256>,
}

impl TransactionReceipt {
    pub fn succeeded(&self) -> bool {
        self.status == ReceiptStatus::Success
    }
}
