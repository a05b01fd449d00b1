//! deepseek-proxy - REST and streaming proxy for the DeepSeek chat API
//!
//! Accepts chat requests over HTTP, forwards them to DeepSeek, and relays
//! either a single JSON reply or a server-sent-event stream.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use deepseek_proxy::config::Config;
use deepseek_proxy::proxy::run_server;

#[derive(Parser)]
#[command(name = "deepseek-proxy")]
#[command(about = "REST and streaming proxy for the DeepSeek chat API")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the proxy server
    Serve {
        /// Path to configuration file; must exist when given.
        /// Without it, ./config.toml is read if present
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override listen address
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Resolve and print the configuration
    Check {
        /// Path to configuration file; must exist when given.
        /// Without it, ./config.toml is read if present
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "deepseek_proxy=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, listen } => {
            let mut config = Config::load(config.as_deref())?;

            if let Some(addr) = listen {
                tracing::info!(listen = %addr, "Override listen address");
                config.server.listen = addr;
            }

            run_server(config).await
        }

        Commands::Check { config } => {
            let config = Config::load(config.as_deref())?;

            println!("{}", toml::to_string_pretty(&config)?);
            if config.api_key_configured() {
                println!("# API key: present");
            } else {
                println!("# API key: missing (completion requests will return 400)");
            }
            Ok(())
        }
    }
}
