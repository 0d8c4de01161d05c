use log::{debug, error, info, trace, warn};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::LoggingConfig;

/// Structured logging context for the monitor
pub struct LogContext {
    pub component: String,
    pub operation: String,
    pub metadata: HashMap<String, Value>,
}

impl LogContext {
    pub fn new(component: &str, operation: &str) -> Self {
        Self {
            component: component.to_string(),
            operation: operation.to_string(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn with_block_number(self, block_number: u64) -> Self {
        self.with_metadata("block_number", json!(block_number))
    }

    pub fn with_transaction_hash(self, tx_hash: &str) -> Self {
        self.with_metadata("transaction_hash", json!(tx_hash))
    }

    pub fn with_address(self, address: &str) -> Self {
        self.with_metadata("address", json!(address))
    }

    pub fn with_nonce(self, nonce: u64) -> Self {
        self.with_metadata("nonce", json!(nonce))
    }

    /// Fees are logged as decimal strings, they do not fit a JSON number
    pub fn with_fee(self, fee: &str) -> Self {
        self.with_metadata("fee", json!(fee))
    }

    pub fn with_round(self, round: u64) -> Self {
        self.with_metadata("round", json!(round))
    }

    pub fn with_duration_ms(self, duration_ms: u64) -> Self {
        self.with_metadata("duration_ms", json!(duration_ms))
    }

    pub fn with_retry_count(self, retry_count: u32) -> Self {
        self.with_metadata("retry_count", json!(retry_count))
    }

    fn format_message(&self, level: &str, message: &str) -> String {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let mut log_entry = json!({
            "timestamp": timestamp,
            "level": level,
            "component": self.component,
            "operation": self.operation,
            "message": message,
        });

        for (key, value) in &self.metadata {
            log_entry[key] = value.clone();
        }

        log_entry.to_string()
    }

    pub fn info(&self, message: &str) {
        info!("{}", self.format_message("INFO", message));
    }

    pub fn warn(&self, message: &str) {
        warn!("{}", self.format_message("WARN", message));
    }

    pub fn error(&self, message: &str) {
        error!("{}", self.format_message("ERROR", message));
    }

    pub fn debug(&self, message: &str) {
        debug!("{}", self.format_message("DEBUG", message));
    }

    pub fn trace(&self, message: &str) {
        trace!("{}", self.format_message("TRACE", message));
    }
}

/// Times a single operation and logs the outcome when finished
pub struct PerformanceMonitor {
    pub start_time: SystemTime,
    operation: String,
    metadata: HashMap<String, Value>,
}

impl PerformanceMonitor {
    pub fn new(operation: &str) -> Self {
        Self {
            start_time: SystemTime::now(),
            operation: operation.to_string(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    fn elapsed_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.start_time)
            .unwrap_or_default()
            .as_millis() as u64
    }

    pub fn finish_with_result<T, E>(self, result: &Result<T, E>) -> u64
    where
        E: std::fmt::Display,
    {
        let duration = self.elapsed_ms();

        let mut context = LogContext::new("performance", &self.operation)
            .with_duration_ms(duration);

        for (key, value) in self.metadata {
            context = context.with_metadata(&key, value);
        }

        match result {
            Ok(_) => {
                context.trace(&format!("Operation completed in {}ms", duration));
            }
            Err(e) => {
                context = context.with_metadata("error", json!(e.to_string()));
                context.debug(&format!("Operation failed after {}ms: {}", duration, e));
            }
        }

        duration
    }
}

/// Error logging utilities
pub struct ErrorLogger;

impl ErrorLogger {
    pub fn log_error(error: &crate::error::WatchError, context: Option<LogContext>) {
        let severity = error.severity();

        let mut log_context = context.unwrap_or_else(|| LogContext::new("error", "unknown"));
        log_context = log_context
            .with_metadata("error_type", json!(format!("{:?}", error)))
            .with_metadata("severity", json!(format!("{:?}", severity)))
            .with_metadata("recoverable", json!(error.is_recoverable()));

        if let Some(delay) = error.retry_delay() {
            log_context = log_context.with_metadata("retry_delay_seconds", json!(delay));
        }

        let message = format!("Error occurred: {}", error);

        match severity {
            crate::error::ErrorSeverity::Critical => log_context.error(&message),
            crate::error::ErrorSeverity::High => log_context.error(&message),
            crate::error::ErrorSeverity::Medium => log_context.warn(&message),
            crate::error::ErrorSeverity::Low => log_context.info(&message),
        }
    }

    pub fn log_recovery_attempt(error: &crate::error::WatchError, attempt: u32, max_attempts: u32) {
        let context = LogContext::new("recovery", "retry_attempt")
            .with_retry_count(attempt)
            .with_metadata("max_attempts", json!(max_attempts))
            .with_metadata("error_type", json!(format!("{:?}", error)));

        if attempt == max_attempts {
            context.error(&format!("Final retry attempt failed: {}", error));
        } else {
            context.warn(&format!("Retry attempt {} of {}: {}", attempt, max_attempts, error));
        }
    }

    pub fn log_recovery_success(operation: &str, attempts: u32, total_duration_ms: u64) {
        let context = LogContext::new("recovery", "success")
            .with_metadata("operation", json!(operation))
            .with_retry_count(attempts)
            .with_duration_ms(total_duration_ms);

        context.info(&format!(
            "Operation recovered after {} attempts in {}ms",
            attempts, total_duration_ms
        ));
    }
}

/// Per-round monitor telemetry. None of these feed back into control flow.
pub struct MetricsLogger;

impl MetricsLogger {
    pub fn log_rpc_call(method: &str, duration_ms: u64, success: bool) {
        let context = LogContext::new("metrics", "rpc_call")
            .with_metadata("method", json!(method))
            .with_duration_ms(duration_ms)
            .with_metadata("success", json!(success));

        if success {
            context.debug(&format!("RPC call {} completed in {}ms", method, duration_ms));
        } else {
            context.warn(&format!("RPC call {} failed after {}ms", method, duration_ms));
        }
    }

    pub fn log_transaction_found(hash: &str, sender: &str, nonce: u64, fee: &str) {
        LogContext::new("monitor", "nonce_discovery")
            .with_transaction_hash(hash)
            .with_address(sender)
            .with_nonce(nonce)
            .with_fee(fee)
            .info(&format!("Transaction {} found with nonce {}", hash, nonce));
    }

    pub fn log_transaction_missing(hash: &str) {
        LogContext::new("monitor", "nonce_discovery")
            .with_transaction_hash(hash)
            .debug(&format!("Transaction {} not indexed yet", hash));
    }

    pub fn log_receipt_found(hash: &str, block_number: u64, success: bool) {
        LogContext::new("monitor", "receipt")
            .with_transaction_hash(hash)
            .with_block_number(block_number)
            .with_metadata("success", json!(success))
            .info(&format!("Receipt for {} found in block {}", hash, block_number));
    }

    pub fn log_latest_block(block_number: u64, transaction_count: usize) {
        LogContext::new("monitor", "latest_block")
            .with_block_number(block_number)
            .with_metadata("transaction_count", json!(transaction_count))
            .debug(&format!(
                "Scanning block {} with {} transactions",
                block_number, transaction_count
            ));
    }

    pub fn log_replacement_candidate(original_hash: &str, candidate_hash: &str, nonce: u64, fee: &str) {
        LogContext::new("monitor", "replacement_candidate")
            .with_transaction_hash(candidate_hash)
            .with_metadata("original_hash", json!(original_hash))
            .with_nonce(nonce)
            .with_fee(fee)
            .info(&format!(
                "Replacement candidate {} found for {}",
                candidate_hash, original_hash
            ));
    }

    pub fn log_replacement_adopted(previous_hash: &str, new_hash: &str, fee: &str) {
        LogContext::new("monitor", "replacement_adopted")
            .with_transaction_hash(new_hash)
            .with_metadata("previous_hash", json!(previous_hash))
            .with_fee(fee)
            .info(&format!("Now tracking {} in place of {}", new_hash, previous_hash));
    }
}

/// Initialize structured logging for the application
pub fn init_logging(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let pretty = config.format == "pretty";

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.level.as_str()))
        .format(move |buf, record| {
            use std::io::Write;

            let line = record.args().to_string();
            match serde_json::from_str::<Value>(&line) {
                Ok(json_value) if pretty => {
                    writeln!(buf, "{}", serde_json::to_string_pretty(&json_value)?)
                }
                Ok(_) => writeln!(buf, "{}", line),
                Err(_) => writeln!(
                    buf,
                    "{} [{}] {}: {}",
                    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                    record.level(),
                    record.target(),
                    line
                ),
            }
        })
        .try_init()?;

    info!("Structured logging initialized");
    Ok(())
}
