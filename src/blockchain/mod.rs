pub mod chain_reader;
pub mod replacement_detector;
pub mod rpc_client;
pub mod tx_monitor;

pub use chain_reader::ChainReader;
pub use replacement_detector::{
    calldata_changed_competitors, classify, find_replacement, is_replacement_candidate, normalize_hex, same_hex,
    validate_address, validate_calldata, validate_transaction_hash, Competitor,
};
pub use rpc_client::RpcClient;
pub use tx_monitor::{monitor_transaction, MonitorHandle, MonitorOutcome, MonitorState, TransactionMonitor};
