//! camlink - Main entry point
//!
//! Runs one or more host/surface camera link pairs and drives them from a
//! JSON command stream.

mod config;
mod session;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::io::BufReader;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "camlink")]
#[command(about = "Camera state link between a parameter host and a render surface")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "camlink.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Read commands from this file instead of stdin
    #[arg(short, long)]
    script: Option<PathBuf>,

    /// Number of host/surface pairs (overrides the config file)
    #[arg(short, long)]
    instances: Option<usize>,

    /// Print the default configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print!("{}", config::default_config_toml()?);
        return Ok(());
    }

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout carries command output
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("camlink v{}", env!("CARGO_PKG_VERSION"));

    let mut config = config::load_config(&args.config)?;
    if let Some(instances) = args.instances {
        config.session.instances = instances;
    }

    info!(
        instances = config.session.instances,
        debounce_ms = config.host.resize_debounce_ms,
        frame_rate = config.surface.frame_rate,
        "Configuration loaded"
    );

    let mut session = session::Session::start(&config)?;
    info!(instances = session.len(), "Session started");

    match &args.script {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open script {}", path.display()))?;
            info!(script = %path.display(), "Running script");
            session.run(BufReader::new(file)).await?;
        }
        None => {
            info!("Reading commands from stdin");
            session.run(BufReader::new(tokio::io::stdin())).await?;
        }
    }

    let reports = session.shutdown().await?;
    for report in reports {
        println!(
            "instance {}: {} frames, {} camera reports, {} field updates",
            report.instance, report.frames_rendered, report.reports_sent, report.dirty_count
        );
    }

    Ok(())
}
