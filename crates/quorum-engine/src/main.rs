use anyhow::Result;
use clap::Parser;
use quorum_core::ExecMode;
use quorum_engine::{AppConfig, Application};
use quorum_telemetry::{init_logging, LogFormat};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "quorum-engine")]
#[command(about = "Multi-agent consensus trading engine")]
struct Args {
    /// Path to config file (default: config/default.toml, or QUORUM_CONFIG)
    #[arg(short, long)]
    config: Option<String>,

    /// Override the configured execution mode (shadow/paper/live)
    #[arg(short, long)]
    mode: Option<ExecMode>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging(LogFormat::from_env(), "info,quorum=debug")?;

    let args = Args::parse();
    let config_path = args
        .config
        .or_else(|| std::env::var("QUORUM_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(path = %config_path, "Loading configuration");
    let mut config = AppConfig::load(&config_path)?;
    if let Some(mode) = args.mode {
        config.mode = mode;
    }

    let (app, _handle) = Application::new(config)?;
    app.run().await?;

    info!("Engine stopped");
    Ok(())
}
