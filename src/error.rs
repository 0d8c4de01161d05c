use thiserror::Error;

/// Main error type for the pending transaction monitor
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Monitor error: {0}")]
    Monitor(#[from] MonitorError),
}

/// RPC-related errors
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("RPC method error: code={code}, message={message}")]
    Method { code: i32, message: String },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Timeout after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Rate limit exceeded, retry after {seconds} seconds")]
    RateLimit { seconds: u64 },

    #[error("Connection failed: {0}")]
    Connection(String),
}

/// Errors raised while turning node JSON into domain types
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Invalid hex quantity for {field}: {value}")]
    Quantity { field: &'static str, value: String },

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Transaction parsing failed: {0}")]
    Transaction(String),

    #[error("Receipt parsing failed: {0}")]
    Receipt(String),

    #[error("Block parsing failed: {0}")]
    Block(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Configuration parsing failed: {0}")]
    Parsing(String),

    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
}

/// Validation errors for caller-supplied input
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid transaction hash: {0}")]
    InvalidTransactionHash(String),

    #[error("Invalid calldata: {0}")]
    InvalidCalldata(String),

    #[error("Invalid fee: {0}")]
    InvalidFee(String),
}

/// Terminal failures of a monitoring session
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Gave up after {failures} consecutive failed rounds, last error: {last_error}")]
    RetriesExhausted { failures: u32, last_error: String },

    #[error("Monitor task aborted: {0}")]
    TaskAborted(String),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, WatchError>;

/// Error severity levels for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Errors that stop the process or a monitoring session
    Critical,
    /// Errors that affect functionality
    High,
    /// Errors that usually clear up on their own
    Medium,
    /// Mostly informational
    Low,
}

impl WatchError {
    /// Get the severity level of an error
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            WatchError::Config(_) => ErrorSeverity::Critical,
            WatchError::Monitor(_) => ErrorSeverity::Critical,

            WatchError::Rpc(RpcError::Connection(_)) => ErrorSeverity::High,
            WatchError::Rpc(RpcError::Method { .. }) => ErrorSeverity::High,
            WatchError::Decode(_) => ErrorSeverity::High,

            WatchError::Rpc(RpcError::Timeout { .. }) => ErrorSeverity::Medium,
            WatchError::Rpc(RpcError::RateLimit { .. }) => ErrorSeverity::Medium,

            WatchError::Validation(_) => ErrorSeverity::Low,
            _ => ErrorSeverity::Medium,
        }
    }

    /// Check if the error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        match self {
            WatchError::Rpc(RpcError::Timeout { .. }) => true,
            WatchError::Rpc(RpcError::RateLimit { .. }) => true,
            WatchError::Rpc(RpcError::Connection(_)) => true,
            WatchError::Rpc(RpcError::Http(e)) => e.is_timeout() || e.is_connect() || e.is_request(),
            // -32603 is the generic "internal error" most nodes return under load
            WatchError::Rpc(RpcError::Method { code, .. }) => *code == -32603,

            WatchError::Config(_) => false,
            WatchError::Validation(_) => false,
            WatchError::Decode(_) => false,
            WatchError::Monitor(_) => false,

            _ => false,
        }
    }

    /// Get suggested retry delay in seconds for recoverable errors
    pub fn retry_delay(&self) -> Option<u64> {
        if !self.is_recoverable() {
            return None;
        }

        match self {
            WatchError::Rpc(RpcError::RateLimit { seconds }) => Some(*seconds),
            WatchError::Rpc(RpcError::Timeout { .. }) => Some(5),
            WatchError::Rpc(RpcError::Connection(_)) => Some(10),
            _ => Some(5),
        }
    }
}
