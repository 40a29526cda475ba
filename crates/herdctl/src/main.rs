//! Herd Control - operator CLI for the herdd bot.
//!
//! Registers the bot's command menu with the transport and writes the
//! default configuration file.

use anyhow::{ensure, Context, Result};
use clap::{Parser, Subcommand};
use herdd::config::{Config, CONFIG_PATH};
use herdd::telegram::TelegramGateway;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "herdctl")]
#[command(about = "Operator tooling for the herdd bot", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register the bot's command menu with the transport and exit
    Menu,

    /// Write a default configuration file
    ConfigInit {
        /// Destination path
        #[arg(long, default_value = CONFIG_PATH)]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Menu => {
            let config = Config::load();
            ensure!(
                !config.transport.bot_token.is_empty(),
                "transport.bot_token must be set in the config"
            );
            let gateway = TelegramGateway::new(&config.transport)
                .context("failed to build the transport client")?;
            gateway
                .set_command_menu()
                .await
                .context("failed to register the command menu")?;
            info!("Command menu registered. Exiting.");
        }
        Commands::ConfigInit { path } => {
            Config::save_default(&path)?;
        }
    }
    Ok(())
}
