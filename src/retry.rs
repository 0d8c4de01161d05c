use std::time::{Duration, Instant};
use tokio::time::sleep;

use crate::error::WatchError;
use crate::logging::{ErrorLogger, LogContext};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Initial delay between retries in seconds
    pub initial_delay_seconds: u64,
    /// Maximum delay between retries in seconds
    pub max_delay_seconds: u64,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Whether to add jitter to prevent thundering herd
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_seconds: 1,
            max_delay_seconds: 60,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a configuration for RPC operations
    pub fn for_rpc() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_seconds: 1,
            max_delay_seconds: 10,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_delay_seconds: 0,
            max_delay_seconds: 0,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }
}

/// Retry mechanism with exponential backoff and jitter
pub struct RetryManager {
    config: RetryConfig,
    operation_name: String,
}

impl RetryManager {
    pub fn new(operation_name: &str, config: RetryConfig) -> Self {
        Self {
            config,
            operation_name: operation_name.to_string(),
        }
    }

    /// Execute an operation with retry logic.
    ///
    /// Non-recoverable errors are returned immediately.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, WatchError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, WatchError>>,
    {
        let started = Instant::now();
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let error = match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        ErrorLogger::log_recovery_success(
                            &self.operation_name,
                            attempt,
                            started.elapsed().as_millis() as u64,
                        );
                    }
                    return Ok(result);
                }
                Err(error) => error,
            };

            if !error.is_recoverable() {
                LogContext::new("retry", &self.operation_name)
                    .with_retry_count(attempt)
                    .with_metadata("reason", serde_json::json!("non_recoverable"))
                    .debug(&format!("Non-recoverable error, not retrying: {}", error));
                return Err(error);
            }

            ErrorLogger::log_recovery_attempt(&error, attempt, max_attempts);

            if attempt >= max_attempts {
                return Err(error);
            }

            let delay = self.calculate_delay(attempt);
            LogContext::new("retry", &self.operation_name)
                .with_retry_count(attempt)
                .with_metadata("delay_ms", serde_json::json!(delay.as_millis() as u64))
                .debug(&format!(
                    "Retrying in {}ms (attempt {} of {})",
                    delay.as_millis(),
                    attempt,
                    max_attempts
                ));

            sleep(delay).await;
            attempt += 1;
        }
    }

    /// Calculate delay for the given attempt number
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay = self.config.initial_delay_seconds as f64;
        let exponential_delay = base_delay * self.config.backoff_multiplier.powi(attempt as i32 - 1);

        let capped_delay = exponential_delay.min(self.config.max_delay_seconds as f64);

        let final_delay = if self.config.jitter {
            let jitter_factor = 0.1; // 10% jitter
            let jitter = capped_delay * jitter_factor * (rand::random::<f64>() - 0.5);
            (capped_delay + jitter).max(0.0)
        } else {
            capped_delay
        };

        Duration::from_secs_f64(final_delay)
    }
}

/// Convenience functions for common retry patterns
pub struct RetryUtils;

impl RetryUtils {
    /// Retry an RPC operation with standard configuration
    pub async fn retry_rpc<T, F, Fut>(operation_name: &str, operation: F) -> Result<T, WatchError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, WatchError>>,
    {
        Self::retry_with_config(operation_name, RetryConfig::for_rpc(), operation).await
    }

    /// Retry with custom configuration
    pub async fn retry_with_config<T, F, Fut>(
        operation_name: &str,
        config: RetryConfig,
        operation: F,
    ) -> Result<T, WatchError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, WatchError>>,
    {
        RetryManager::new(operation_name, config).execute(operation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RpcError, ValidationError};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn no_jitter(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay_seconds: 1,
            max_delay_seconds: 10,
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    #[test]
    fn test_retry_config_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.initial_delay_seconds, 1);
        assert_eq!(config.max_delay_seconds, 60);
        assert!(config.jitter);

        let rpc_config = RetryConfig::for_rpc();
        assert_eq!(rpc_config.max_attempts, 3);

        assert_eq!(RetryConfig::none().max_attempts, 1);
    }

    #[tokio::test]
    async fn test_retry_manager_success_on_first_attempt() {
        let retry_manager = RetryManager::new("test_operation", no_jitter(3));

        let result = retry_manager.execute(|| async { Ok::<i32, WatchError>(42) }).await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_manager_recovers_after_transient_errors() {
        let calls = &AtomicU32::new(0);
        let retry_manager = RetryManager::new("flaky", no_jitter(3));

        let result = retry_manager
            .execute(move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(WatchError::Rpc(RpcError::Timeout { seconds: 30 }))
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_manager_gives_up_after_max_attempts() {
        let calls = &AtomicU32::new(0);
        let retry_manager = RetryManager::new("down", no_jitter(2));

        let result = retry_manager
            .execute(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(WatchError::Rpc(RpcError::Connection("refused".to_string())))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_manager_non_recoverable_error() {
        let calls = &AtomicU32::new(0);
        let retry_manager = RetryManager::new("test_operation", no_jitter(3));

        let result = retry_manager
            .execute(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<i32, WatchError>(WatchError::Validation(ValidationError::InvalidAddress(
                    "0x".to_string(),
                )))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delay_calculation() {
        let retry_manager = RetryManager::new("test", no_jitter(5));

        assert_eq!(retry_manager.calculate_delay(1).as_secs(), 1);
        assert_eq!(retry_manager.calculate_delay(2).as_secs(), 2);
        assert_eq!(retry_manager.calculate_delay(3).as_secs(), 4);
        assert_eq!(retry_manager.calculate_delay(5).as_secs(), 10);
    }
}
