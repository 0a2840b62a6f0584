//! Album Relay - buffered upload forwarder for a media-album API

use album_relay::config::{Config, ConfigLoader};
use album_relay::{logging, Relay};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

/// Album Relay - queue uploads locally and forward them to an album API
#[derive(Parser, Debug)]
#[command(name = "album-relay")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a YAML configuration file (defaults plus environment when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Dotenv file with API_KEY, ENDPOINT and ALBUM (defaults to ./.env)
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Before logging is up, so remember the outcome and report it afterwards
    let dotenv_loaded = ConfigLoader::load_dotenv(args.env_file.as_deref());

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::from_env()?,
    };
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    logging::init(&config.logging)?;

    info!("Starting Album Relay v{}", album_relay::VERSION);
    if !dotenv_loaded {
        info!("No .env file loaded; using the process environment");
    }
    match &args.config {
        Some(path) => info!("Loaded configuration from {:?}", path),
        None => info!("Using default configuration"),
    }

    let relay = Relay::new(config).await?;
    relay.run().await?;

    Ok(())
}
