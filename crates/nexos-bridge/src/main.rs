//! nexos-bridge - OpenAI-compatible proxy for nexos.ai

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use nexos_bridge::BridgeError;
use nexos_bridge::api::BridgeServer;
use nexos_bridge::config::Config;
use nexos_bridge::error::Result;

/// nexos-bridge - OpenAI-compatible API in front of a nexos.ai workspace
#[derive(Parser)]
#[command(name = "nexos-bridge")]
#[command(about = "An OpenAI-compatible API in front of a nexos.ai workspace")]
#[command(version)]
pub struct Cli {
    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the bridge server (default command)
    #[command(name = "serve")]
    Serve,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => serve(cli.config).await,
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,nexos_bridge=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn read_config(path: &Path) -> Result<Config> {
    tracing::info!("Loading config from: {}", path.display());
    let content = std::fs::read_to_string(path).map_err(|e| {
        BridgeError::Config(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;
    toml::from_str(&content)
        .map_err(|e| BridgeError::Config(format!("Failed to parse config: {e}")))
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let mut config = if let Some(path) = config_path {
        read_config(&path)?
    } else {
        let default_paths = [
            dirs::home_dir().map(|h| h.join(".nexos-bridge").join("config.toml")),
            dirs::config_dir().map(|c| c.join("nexos-bridge").join("config.toml")),
            Some(PathBuf::from("config.toml")),
        ];

        match default_paths.iter().flatten().find(|p| p.exists()) {
            Some(path) => read_config(path)?,
            None => {
                tracing::info!("No config file found, using defaults");
                Config::default()
            }
        }
    };

    config.apply_env_overrides()?;
    Ok(config)
}

async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    tracing::info!("Starting nexos bridge");

    let config = load_config(config_path)?;
    tracing::debug!(
        "Config loaded: listen={}, upstream={}, default chat={}, {} models",
        config.server.listen_addr(),
        config.upstream.base_url,
        config.upstream.chat_id,
        config.models.len()
    );

    BridgeServer::new(config).serve().await?;

    tracing::info!("nexos bridge stopped");
    Ok(())
}
