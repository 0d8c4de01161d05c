use clap::Parser;
use pending_tx_monitor::api::{Cli, CliHandler, Commands};
use pending_tx_monitor::config::AppConfig;
use pending_tx_monitor::logging::init_logging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Some(rpc_url) = &cli.rpc_url {
        config.rpc.endpoint = rpc_url.clone();
        config.validate()?;
    }

    // Config output goes to stdout untouched
    if !matches!(cli.command, Commands::Config) {
        init_logging(&config.logging)?;
    }

    let handler = CliHandler::new(config)?;

    if let Err(e) = handler.execute_command(&cli.command).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
