//! # Tessera - headless compositor
//!
//! Runs the scene graph against in-memory outputs with synthetic clients,
//! reporting how much was repainted and how presents behaved.

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use std::path::PathBuf;

use tessera::{HeadlessCompositor, TesseraConfig};

#[derive(Parser)]
#[command(name = "tessera")]
#[command(about = "Headless compositor driving a damage-tracked scene graph")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/tessera/tessera.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Frames to render (0 = until Ctrl+C); overrides the config
    #[arg(short, long)]
    frames: Option<u32>,

    /// Number of demo windows; overrides the config
    #[arg(short, long)]
    windows: Option<u32>,

    /// Write the last frame of the first output to this PNG file
    #[arg(long)]
    dump: Option<PathBuf>,

    /// Print frame statistics as JSON on exit
    #[arg(long)]
    stats_json: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match TesseraConfig::load(&cli.config) {
        Ok(config) => Some(config),
        Err(e) => {
            // Logging is not up yet; report once it is
            eprintln!("failed to load {}: {:#}", cli.config, e);
            None
        }
    };
    let debug = cli.debug || config.as_ref().is_some_and(|c| c.general.debug);

    // Initialize logging
    let filter = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    info!("🚀 Starting Tessera");
    info!("📄 Version: {}", tessera::VERSION);

    let mut config = match config.take() {
        Some(config) => {
            info!("✅ Configuration loaded from: {}", cli.config);
            config
        }
        None => {
            warn!("📝 Using default configuration");
            TesseraConfig::default()
        }
    };

    // Override config with CLI flags
    if let Some(frames) = cli.frames {
        config.general.frames = frames;
    }
    if let Some(windows) = cli.windows {
        config.demo.windows = windows;
    }

    let first_output = config.outputs.first().map(|output| output.name.clone());
    let mut compositor = HeadlessCompositor::new(config)?;
    let stats = match compositor.run().await {
        Ok(stats) => stats,
        Err(e) => {
            error!("❌ Frame loop failed: {:#}", e);
            return Err(e);
        }
    };

    if let Some(path) = &cli.dump {
        let target = first_output
            .as_deref()
            .and_then(|name| compositor.target(name))
            .context("No output to dump")?;
        target
            .pixmap()
            .save_png(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("🖼️ Wrote last frame to {}", path.display());
    }

    if cli.stats_json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }

    info!("👋 Tessera shut down after {:?}", compositor.uptime());
    Ok(())
}
