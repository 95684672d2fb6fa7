//! CacheVoice binary entry point: CLI parsing, logging setup, config load,
//! and handoff to [`cachevoice::App`].

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cachevoice::{App, CacheVoiceConfig};

#[derive(Parser, Debug)]
#[command(version, about = "Caching reverse proxy for text-to-speech providers")]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override `server.data_dir` from the config file.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Override `server.bind_addr` from the config file.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => CacheVoiceConfig::load(path)?,
        None => CacheVoiceConfig::default(),
    };

    if let Some(data_dir) = args.data_dir {
        config.server.data_dir = data_dir;
    }
    if let Some(bind) = args.bind {
        config.server.bind_addr = bind;
    }

    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut app = App::init(config)?;
    app.serve().await
}
