use async_trait::async_trait;

use crate::error::WatchError;
use crate::models::{Block, ChainTransaction, TransactionReceipt};

/// Read-only view of chain state that the transaction monitor polls.
///
/// "Not found" is `Ok(None)`, never an error: a node that has not indexed a
/// transaction yet is the normal case while it propagates.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Look up a transaction, pending or mined, by hash.
    async fn get_transaction_by_hash(&self, hash: &str) -> Result<Option<ChainTransaction>, WatchError>;

    /// Receipt for a mined transaction; `None` while it is still pending.
    async fn get_transaction_receipt(&self, hash: &str) -> Result<Option<TransactionReceipt>, WatchError>;

    /// The latest block, with full transaction objects in block order.
    async fn get_latest_block_with_transactions(&self) -> Result<Block, WatchError>;
}
