pub mod intent;
pub mod transaction;

pub use intent::{MonitorIntent, MonitorOptions};
pub use transaction::{Block, ChainTransaction, ReceiptStatus, TransactionReceipt};
