pub mod api;
pub mod blockchain;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod retry;

pub use blockchain::{
    monitor_transaction, ChainReader, MonitorHandle, MonitorOutcome, MonitorState, RpcClient, TransactionMonitor,
};
pub use config::{AppConfig, LoggingConfig, MonitorConfig, RpcConfig};
pub use error::{MonitorError, Result, WatchError};
pub use logging::{ErrorLogger, LogContext, MetricsLogger, PerformanceMonitor};
pub use models::{Block, ChainTransaction, MonitorIntent, MonitorOptions, ReceiptStatus, TransactionReceipt};
pub use retry::{RetryConfig, RetryManager, RetryUtils};
