use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::prelude::*;

use chat_relay::{CliOverrides, RelayConfig, Server};

#[derive(Parser)]
#[command(name = "chat-relay")]
#[command(about = "Line-oriented TCP chat relay")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the TOML config file (missing file = defaults)
    #[arg(long, global = true, default_value = "chat_relay.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay in the foreground (default)
    Serve(ServeArgs),

    /// Connect to a relay as an interactive line client
    Connect(ConnectArgs),
}

#[derive(Parser, Default)]
struct ServeArgs {
    /// Host to bind to (overrides config)
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Port to bind to (overrides config)
    #[arg(short, long)]
    port: Option<u16>,
}

#[derive(Parser)]
struct ConnectArgs {
    /// Login to claim on the relay
    #[arg(short, long)]
    login: String,

    /// Relay host (defaults to the configured listen address)
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Relay port (defaults to the configured listen port)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    match cli.command {
        None => run_server(&cli.config, ServeArgs::default()).await,
        Some(Commands::Serve(args)) => run_server(&cli.config, args).await,
        Some(Commands::Connect(args)) => {
            let config = RelayConfig::load(
                &cli.config,
                &CliOverrides {
                    host: args.host,
                    port: args.port,
                },
            )
            .context("Failed to load configuration")?;
            chat_relay::cli::connect_command(&config.listen_addr(), &args.login).await
        }
    }
}

fn init_logging(debug: bool) {
    let default_directive = if debug {
        "chat_relay=debug,info"
    } else {
        "chat_relay=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

async fn run_server(config_path: &std::path::Path, args: ServeArgs) -> Result<()> {
    let config = RelayConfig::load(
        config_path,
        &CliOverrides {
            host: args.host,
            port: args.port,
        },
    )
    .context("Failed to load configuration")?;

    info!("Starting chat relay");

    let server = Server::bind(&config)
        .await
        .with_context(|| format!("Failed to start listener on {}", config.listen_addr()))?;

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal, stopping relay..."),
            Err(e) => {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                return;
            }
        }
        shutdown.cancel();
    });

    server.run(cancel).await.context("Relay error")?;

    info!("Shutdown complete");
    Ok(())
}
