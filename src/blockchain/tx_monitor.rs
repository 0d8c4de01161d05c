use log::{debug, info};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::blockchain::replacement_detector::{calldata_changed_competitors, find_replacement};
use crate::blockchain::ChainReader;
use crate::error::{MonitorError, WatchError};
use crate::logging::{ErrorLogger, LogContext, MetricsLogger};
use crate::models::{ChainTransaction, MonitorIntent, MonitorOptions, TransactionReceipt};

/// Where a monitoring session stands between two chain reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorState {
    /// Nonce, fee or calldata of the tracked hash still unknown
    NonceDiscovery,
    /// Waiting for the tracked hash to be mined or replaced
    Polling,
    /// A higher-fee replacement was seen; check whether it is mined
    ReceiptCheck(ChainTransaction),
    /// Terminal
    Mined(TransactionReceipt),
}

impl MonitorState {
    pub fn initial(intent: &MonitorIntent) -> Self {
        if intent.is_resolved() {
            MonitorState::Polling
        } else {
            MonitorState::NonceDiscovery
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MonitorState::Mined(_))
    }

    fn name(&self) -> &'static str {
        match self {
            MonitorState::NonceDiscovery => "nonce_discovery",
            MonitorState::Polling => "polling",
            MonitorState::ReceiptCheck(_) => "receipt_check",
            MonitorState::Mined(_) => "mined",
        }
    }
}

/// How a monitoring session ended without error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorOutcome {
    Mined(TransactionReceipt),
    Cancelled,
}

struct RoundFailure {
    resume: MonitorState,
    error: WatchError,
}

/// Polls a [`ChainReader`] until a tracked transaction, or a replacement of
/// it, is mined.
pub struct TransactionMonitor<R> {
    reader: Arc<R>,
    options: MonitorOptions,
}

impl<R> Clone for TransactionMonitor<R> {
    fn clone(&self) -> Self {
        Self {
            reader: Arc::clone(&self.reader),
            options: self.options.clone(),
        }
    }
}

impl<R: ChainReader + 'static> TransactionMonitor<R> {
    pub fn new(reader: Arc<R>, options: MonitorOptions) -> Self {
        Self { reader, options }
    }

    pub fn options(&self) -> &MonitorOptions {
        &self.options
    }

    /// Start monitoring in the background.
    ///
    /// `on_mined` runs at most once, with the receipt of whichever transaction
    /// was mined. It never runs if the session is cancelled or fails.
    /// Dropping the handle leaves the session running.
    pub fn monitor<F>(&self, intent: MonitorIntent, on_mined: F) -> MonitorHandle
    where
        F: FnOnce(TransactionReceipt) + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let monitor = self.clone();

        let join = tokio::spawn(async move {
            let outcome = monitor.run(intent, token.clone()).await?;
            Ok::<_, MonitorError>(deliver(outcome, &token, on_mined))
        });

        MonitorHandle { cancel, join }
    }

    /// Drive one session to completion on the current task
    pub async fn run(
        &self,
        mut intent: MonitorIntent,
        cancel: CancellationToken,
    ) -> Result<MonitorOutcome, MonitorError> {
        let mut state = MonitorState::initial(&intent);
        let mut round: u64 = 0;
        let mut consecutive_failures: u32 = 0;

        LogContext::new("monitor", "start")
            .with_transaction_hash(&intent.hash)
            .with_address(&intent.sender)
            .with_metadata("poll_delay_ms", serde_json::json!(self.options.poll_delay.as_millis() as u64))
            .info(&format!("Monitoring transaction {}", intent.hash));

        loop {
            if cancel.is_cancelled() {
                return Ok(Self::cancelled(&intent, round));
            }

            round += 1;
            debug!("Round {} for {} in state {}", round, intent.hash, state.name());

            let finished = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = self.run_round(state, &mut intent) => Some(result),
            };
            let Some(result) = finished else {
                return Ok(Self::cancelled(&intent, round));
            };

            match result {
                Ok(MonitorState::Mined(receipt)) => {
                    LogContext::new("monitor", "mined")
                        .with_transaction_hash(&receipt.transaction_hash)
                        .with_block_number(receipt.block_number)
                        .with_round(round)
                        .info(&format!(
                            "Transaction {} mined in block {}",
                            receipt.transaction_hash, receipt.block_number
                        ));
                    return Ok(MonitorOutcome::Mined(receipt));
                }
                Ok(next) => {
                    consecutive_failures = 0;
                    state = next;
                }
                Err(failure) => {
                    consecutive_failures += 1;
                    let context = LogContext::new("monitor", "round")
                        .with_round(round)
                        .with_transaction_hash(&intent.hash)
                        .with_retry_count(consecutive_failures);
                    ErrorLogger::log_error(&failure.error, Some(context));

                    if let Some(limit) = self.options.max_consecutive_failures {
                        if consecutive_failures >= limit {
                            return Err(MonitorError::RetriesExhausted {
                                failures: consecutive_failures,
                                last_error: failure.error.to_string(),
                            });
                        }
                    }
                    state = failure.resume;
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(Self::cancelled(&intent, round)),
                _ = sleep(self.options.poll_delay) => {}
            }
        }
    }

    /// One polling round. A replacement candidate is receipt-checked in the
    /// same round.
    async fn run_round(
        &self,
        mut state: MonitorState,
        intent: &mut MonitorIntent,
    ) -> Result<MonitorState, RoundFailure> {
        loop {
            let resume = match &state {
                MonitorState::ReceiptCheck(_) => MonitorState::Polling,
                other => other.clone(),
            };

            match self.advance(state, intent).await {
                Ok(MonitorState::ReceiptCheck(candidate)) => {
                    state = MonitorState::ReceiptCheck(candidate);
                }
                Ok(next) => return Ok(next),
                Err(error) => return Err(RoundFailure { resume, error }),
            }
        }
    }

    /// Perform exactly one state transition. Never sleeps.
    pub async fn advance(
        &self,
        state: MonitorState,
        intent: &mut MonitorIntent,
    ) -> Result<MonitorState, WatchError> {
        match state {
            MonitorState::NonceDiscovery => self.discover_nonce(intent).await,
            MonitorState::Polling => self.poll(intent).await,
            MonitorState::ReceiptCheck(candidate) => self.check_candidate(candidate, intent).await,
            MonitorState::Mined(receipt) => Ok(MonitorState::Mined(receipt)),
        }
    }

    async fn discover_nonce(&self, intent: &mut MonitorIntent) -> Result<MonitorState, WatchError> {
        match self.reader.get_transaction_by_hash(&intent.hash).await? {
            Some(tx) => {
                intent.record_discovery(&tx);
                let nonce = intent.nonce.unwrap_or(tx.nonce);
                let fee = intent.fee_price.unwrap_or(tx.fee);
                MetricsLogger::log_transaction_found(&tx.hash, &tx.from, nonce, &fee.to_string());
                Ok(MonitorState::Polling)
            }
            None => {
                MetricsLogger::log_transaction_missing(&intent.hash);
                Ok(MonitorState::NonceDiscovery)
            }
        }
    }

    async fn poll(&self, intent: &mut MonitorIntent) -> Result<MonitorState, WatchError> {
        if let Some(receipt) = self.reader.get_transaction_receipt(&intent.hash).await? {
            MetricsLogger::log_receipt_found(&receipt.transaction_hash, receipt.block_number, receipt.succeeded());
            return Ok(MonitorState::Mined(receipt));
        }

        let block = self.reader.get_latest_block_with_transactions().await?;
        MetricsLogger::log_latest_block(block.number, block.transactions.len());

        for competitor in calldata_changed_competitors(intent, &block) {
            LogContext::new("monitor", "calldata_changed")
                .with_transaction_hash(&competitor.hash)
                .with_metadata("tracked_hash", serde_json::json!(intent.hash))
                .with_nonce(competitor.nonce)
                .warn("Same-nonce transaction with different calldata seen, not adopting it");
        }

        match find_replacement(intent, &block) {
            Some(candidate) => {
                MetricsLogger::log_replacement_candidate(
                    &intent.hash,
                    &candidate.hash,
                    candidate.nonce,
                    &candidate.fee.to_string(),
                );
                Ok(MonitorState::ReceiptCheck(candidate.clone()))
            }
            None => Ok(MonitorState::Polling),
        }
    }

    async fn check_candidate(
        &self,
        candidate: ChainTransaction,
        intent: &mut MonitorIntent,
    ) -> Result<MonitorState, WatchError> {
        match self.reader.get_transaction_receipt(&candidate.hash).await? {
            Some(receipt) => {
                MetricsLogger::log_receipt_found(&receipt.transaction_hash, receipt.block_number, receipt.succeeded());
                Ok(MonitorState::Mined(receipt))
            }
            None => {
                let previous = intent.hash.clone();
                intent.adopt(&candidate);
                MetricsLogger::log_replacement_adopted(&previous, &intent.hash, &candidate.fee.to_string());
                Ok(MonitorState::Polling)
            }
        }
    }

    fn cancelled(intent: &MonitorIntent, round: u64) -> MonitorOutcome {
        info!("Monitoring of {} cancelled after {} rounds", intent.hash, round);
        MonitorOutcome::Cancelled
    }
}

/// Hand a mined receipt to the callback unless the session was cancelled first
fn deliver<F>(outcome: MonitorOutcome, cancel: &CancellationToken, on_mined: F) -> MonitorOutcome
where
    F: FnOnce(TransactionReceipt),
{
    match outcome {
        MonitorOutcome::Mined(receipt) if !cancel.is_cancelled() => {
            on_mined(receipt.clone());
            MonitorOutcome::Mined(receipt)
        }
        MonitorOutcome::Mined(receipt) => {
            debug!("Cancelled before {} could be delivered", receipt.transaction_hash);
            MonitorOutcome::Cancelled
        }
        MonitorOutcome::Cancelled => MonitorOutcome::Cancelled,
    }
}

/// Handle to a background monitoring session
pub struct MonitorHandle {
    cancel: CancellationToken,
    join: JoinHandle<Result<MonitorOutcome, MonitorError>>,
}

impl MonitorHandle {
    /// Stop polling. The mined callback will not run afterwards.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the session to end
    pub async fn join(self) -> Result<MonitorOutcome, MonitorError> {
        match self.join.await {
            Ok(result) => result,
            Err(e) => Err(MonitorError::TaskAborted(e.to_string())),
        }
    }
}

/// Monitor `intent` through `reader` with the given options.
///
/// Shorthand for building a [`TransactionMonitor`] for a single session.
pub fn monitor_transaction<R, F>(
    reader: Arc<R>,
    intent: MonitorIntent,
    on_mined: F,
    options: MonitorOptions,
) -> MonitorHandle
where
    R: ChainReader + 'static,
    F: FnOnce(TransactionReceipt) + Send + 'static,
{
    TransactionMonitor::new(reader, options).monitor(intent, on_mined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RpcError;
    use crate::models::{Block, ReceiptStatus};
    use alloy_primitives::U256;
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    const SENDER: &str = "0xf977814e90da44bfa03b6295a0616a897441acec";
    const H1: &str = "0x1111111111111111111111111111111111111111111111111111111111111111";
    const H2: &str = "0x2222222222222222222222222222222222222222222222222222222222222222";

    #[derive(Default)]
    struct StubReader {
        transactions: Mutex<HashMap<String, ChainTransaction>>,
        receipts: Mutex<HashMap<String, TransactionReceipt>>,
        blocks: Mutex<VecDeque<Result<Block, String>>>,
    }

    #[async_trait]
    impl ChainReader for StubReader {
        async fn get_transaction_by_hash(&self, hash: &str) -> Result<Option<ChainTransaction>, WatchError> {
            Ok(self.transactions.lock().unwrap().get(hash).cloned())
        }

        async fn get_transaction_receipt(&self, hash: &str) -> Result<Option<TransactionReceipt>, WatchError> {
            Ok(self.receipts.lock().unwrap().get(hash).cloned())
        }

        async fn get_latest_block_with_transactions(&self) -> Result<Block, WatchError> {
            match self.blocks.lock().unwrap().pop_front() {
                Some(Ok(block)) => Ok(block),
                Some(Err(message)) => Err(RpcError::Connection(message).into()),
                None => Ok(block(vec![])),
            }
        }
    }

    fn tx(hash: &str, nonce: u64, fee: u64) -> ChainTransaction {
        ChainTransaction {
            hash: hash.to_string(),
            from: SENDER.to_string(),
            to: None,
            nonce,
            fee: U256::from(fee),
            input: "0x".to_string(),
            block_number: None,
        }
    }

    fn block(transactions: Vec<ChainTransaction>) -> Block {
        Block {
            number: 100,
            hash: "0xb10c".to_string(),
            transactions,
        }
    }

    fn receipt(hash: &str) -> TransactionReceipt {
        TransactionReceipt {
            transaction_hash: hash.to_string(),
            block_number: 101,
            block_hash: "0xb10c".to_string(),
            status: ReceiptStatus::Success,
            from: SENDER.to_string(),
            to: None,
            gas_used: U256::from(21000u64),
            effective_gas_price: None,
        }
    }

    fn monitor(reader: StubReader) -> TransactionMonitor<StubReader> {
        TransactionMonitor::new(Arc::new(reader), MonitorOptions::default())
    }

    #[test]
    fn test_initial_state() {
        let unresolved = MonitorIntent::without_calldata(SENDER, H1).unwrap();
        assert_eq!(MonitorState::initial(&unresolved), MonitorState::NonceDiscovery);

        let resolved = MonitorIntent::new(SENDER, H1, "0x")
            .unwrap()
            .with_nonce(1)
            .with_fee_price(U256::from(1u64));
        assert_eq!(MonitorState::initial(&resolved), MonitorState::Polling);
        assert!(!MonitorState::Polling.is_terminal());
        assert!(MonitorState::Mined(receipt(H1)).is_terminal());
    }

    #[tokio::test]
    async fn test_nonce_discovery_waits_for_node() {
        let monitor = monitor(StubReader::default());
        let mut intent = MonitorIntent::without_calldata(SENDER, H1).unwrap();

        let next = monitor.advance(MonitorState::NonceDiscovery, &mut intent).await.unwrap();
        assert_eq!(next, MonitorState::NonceDiscovery);
        assert_eq!(intent.nonce, None);
    }

    #[tokio::test]
    async fn test_nonce_discovery_learns_nonce_fee_and_calldata() {
        let reader = StubReader::default();
        reader.transactions.lock().unwrap().insert(H1.to_string(), tx(H1, 7, 10));
        let monitor = monitor(reader);
        let mut intent = MonitorIntent::without_calldata(SENDER, H1).unwrap();

        let next = monitor.advance(MonitorState::NonceDiscovery, &mut intent).await.unwrap();
        assert_eq!(next, MonitorState::Polling);
        assert_eq!(intent.nonce, Some(7));
        assert_eq!(intent.fee_price, Some(U256::from(10u64)));
        assert_eq!(intent.data.as_deref(), Some("0x"));
    }

    #[tokio::test]
    async fn test_polling_moves_to_receipt_check_on_speed_up() {
        let reader = StubReader::default();
        reader.blocks.lock().unwrap().push_back(Ok(block(vec![tx(H2, 7, 20)])));
        let monitor = monitor(reader);
        let mut intent = MonitorIntent::new(SENDER, H1, "0x")
            .unwrap()
            .with_nonce(7)
            .with_fee_price(U256::from(10u64));

        let next = monitor.advance(MonitorState::Polling, &mut intent).await.unwrap();
        assert_eq!(next, MonitorState::ReceiptCheck(tx(H2, 7, 20)));
        assert_eq!(intent.hash, H1);
    }

    #[tokio::test]
    async fn test_pending_candidate_is_adopted() {
        let monitor = monitor(StubReader::default());
        let mut intent = MonitorIntent::new(SENDER, H1, "0x")
            .unwrap()
            .with_nonce(7)
            .with_fee_price(U256::from(10u64));

        let next = monitor
            .advance(MonitorState::ReceiptCheck(tx(H2, 7, 20)), &mut intent)
            .await
            .unwrap();
        assert_eq!(next, MonitorState::Polling);
        assert_eq!(intent.hash, H2);
        assert_eq!(intent.fee_price, Some(U256::from(20u64)));
    }

    #[tokio::test]
    async fn test_mined_is_terminal() {
        let monitor = monitor(StubReader::default());
        let mut intent = MonitorIntent::without_calldata(SENDER, H1).unwrap();

        let next = monitor
            .advance(MonitorState::Mined(receipt(H1)), &mut intent)
            .await
            .unwrap();
        assert_eq!(next, MonitorState::Mined(receipt(H1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_round_keeps_state_until_budget_runs_out() {
        let reader = StubReader::default();
        for _ in 0..3 {
            reader.blocks.lock().unwrap().push_back(Err("node down".to_string()));
        }
        let options = MonitorOptions {
            max_consecutive_failures: Some(3),
            ..MonitorOptions::default()
        };
        let monitor = TransactionMonitor::new(Arc::new(reader), options);
        let intent = MonitorIntent::new(SENDER, H1, "0x")
            .unwrap()
            .with_nonce(7)
            .with_fee_price(U256::from(10u64));

        let result = monitor.run(intent, CancellationToken::new()).await;
        match result {
            Err(MonitorError::RetriesExhausted { failures, last_error }) => {
                assert_eq!(failures, 3);
                assert!(last_error.contains("node down"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_deliver_skips_callback_once_cancelled() {
        let cancel = CancellationToken::new();
        let mut delivered = Vec::new();

        let outcome = deliver(MonitorOutcome::Mined(receipt(H1)), &cancel, |r| delivered.push(r));
        assert_eq!(outcome, MonitorOutcome::Mined(receipt(H1)));
        assert_eq!(delivered.len(), 1);

        cancel.cancel();
        let outcome = deliver(MonitorOutcome::Mined(receipt(H2)), &cancel, |r| delivered.push(r));
        assert_eq!(outcome, MonitorOutcome::Cancelled);
        assert_eq!(delivered, vec![receipt(H1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_returns_cancelled_when_token_fires_first() {
        let monitor = monitor(StubReader::default());
        let intent = MonitorIntent::without_calldata(SENDER, H1).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = monitor.run(intent, cancel).await.unwrap();
        assert_eq!(outcome, MonitorOutcome::Cancelled);
    }
}
