use alloy_primitives::U256;
use clap::{Args, Parser, Subcommand};
use log::info;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::blockchain::{MonitorOutcome, RpcClient, TransactionMonitor};
use crate::config::AppConfig;
use crate::error::{ConfigError, MonitorError, ValidationError, WatchError};
use crate::models::{MonitorIntent, MonitorOptions};

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid argument: {0}")]
    Validation(#[from] ValidationError),

    #[error("Monitoring stopped: {0}")]
    Monitor(#[from] MonitorError),

    #[error("Failed to render output: {0}")]
    Output(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "txwatch")]
#[command(about = "Watch a submitted transaction until it, or a speed-up replacement, is mined")]
#[command(version)]
pub struct Cli {
    /// JSON-RPC endpoint; overrides the configured one
    #[arg(long, global = true)]
    pub rpc_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Poll until the transaction is mined and print its receipt
    Watch(WatchArgs),
    /// Show the node's latest block, and optionally where a transaction stands
    Status {
        #[arg(long)]
        hash: Option<String>,
    },
    /// Print a sample configuration file
    Config,
}

#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    /// Sender address
    #[arg(long)]
    pub sender: String,

    /// Hash returned when the transaction was submitted
    #[arg(long)]
    pub hash: String,

    /// Calldata; looked up from the node when omitted
    #[arg(long)]
    pub data: Option<String>,

    #[arg(long)]
    pub nonce: Option<u64>,

    /// Fee price in wei, decimal or 0x-prefixed hex
    #[arg(long)]
    pub fee: Option<String>,

    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=3_600_000))]
    pub poll_delay_ms: Option<u64>,

    /// Give up after this many failed rounds in a row
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_failures: Option<u32>,
}

impl WatchArgs {
    pub fn to_intent(&self) -> Result<MonitorIntent, ValidationError> {
        let mut intent = match &self.data {
            Some(data) => MonitorIntent::new(&self.sender, &self.hash, data)?,
            None => MonitorIntent::without_calldata(&self.sender, &self.hash)?,
        };

        if let Some(nonce) = self.nonce {
            intent = intent.with_nonce(nonce);
        }
        if let Some(fee) = &self.fee {
            intent = intent.with_fee_price(parse_fee(fee)?);
        }

        Ok(intent)
    }

    pub fn to_options(&self, defaults: MonitorOptions) -> MonitorOptions {
        MonitorOptions {
            poll_delay: self
                .poll_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_delay),
            max_consecutive_failures: self.max_failures.or(defaults.max_consecutive_failures),
        }
    }
}

pub fn parse_fee(value: &str) -> Result<U256, ValidationError> {
    value
        .trim()
        .parse::<U256>()
        .map_err(|e| ValidationError::InvalidFee(format!("{}: {}", value, e)))
}

pub struct CliHandler {
    config: AppConfig,
    rpc_client: RpcClient,
}

impl CliHandler {
    pub fn new(config: AppConfig) -> Result<Self, CliError> {
        let rpc_client = RpcClient::from_config(&config.rpc)?;
        Ok(Self { config, rpc_client })
    }

    pub async fn execute_command(&self, command: &Commands) -> Result<(), CliError> {
        match command {
            Commands::Watch(args) => self.watch(args).await,
            Commands::Status { hash } => self.status(hash.as_deref()).await,
            Commands::Config => {
                println!("{}", AppConfig::generate_sample_config()?);
                Ok(())
            }
        }
    }

    async fn watch(&self, args: &WatchArgs) -> Result<(), CliError> {
        let intent = args.to_intent()?;
        let options = args.to_options(self.config.monitor.to_options());

        println!("Watching {} from {} via {}", intent.hash, intent.sender, self.rpc_client.endpoint());

        let monitor = TransactionMonitor::new(Arc::new(self.rpc_client.clone()), options);
        let handle = monitor.monitor(intent, |receipt| {
            info!("Receipt delivered for {}", receipt.transaction_hash);
        });

        let token = handle.cancellation_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        });

        match handle.join().await? {
            MonitorOutcome::Mined(receipt) => {
                println!("{}", serde_json::to_string_pretty(&receipt)?);
            }
            MonitorOutcome::Cancelled => {
                println!("Monitoring cancelled");
            }
        }

        Ok(())
    }

    async fn status(&self, hash: Option<&str>) -> Result<(), CliError> {
        let latest = self.rpc_client.get_latest_block_number().await?;
        println!("Endpoint:     {}", self.rpc_client.endpoint());
        println!("Latest block: {}", latest);

        let Some(hash) = hash else {
            return Ok(());
        };

        if let Some(receipt) = self.rpc_client.get_transaction_receipt(hash).await? {
            let outcome = if receipt.succeeded() { "success" } else { "failed" };
            println!(
                "Transaction:  mined in block {} ({}, {} confirmations)",
                receipt.block_number,
                outcome,
                latest.saturating_sub(receipt.block_number) + 1
            );
        } else if let Some(tx) = self.rpc_client.get_transaction_by_hash(hash).await? {
            println!("Transaction:  pending (nonce {}, fee {} wei)", tx.nonce, tx.fee);
        } else {
            println!("Transaction:  unknown to this node");
        }

        Ok(())
    }
}
