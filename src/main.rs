use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lipsync_dubber::{config::Config, discover_items, FanOutDriver};

#[derive(Parser)]
#[command(
    name = "lipsync-dubber",
    version,
    about = "Dub videos onto new audio with lip-sync and face restoration",
    long_about = "Lipsync-Dubber pairs every audio file in the input directory with the video of the same name, lip-syncs the video to the audio, restores the faces frame by frame and writes the dubbed result to outputs/<title>/final_with_audio.mp4."
)]
struct Cli {
    /// Base directory holding `inputs/` and `outputs/`
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Items allowed to run at once (0 = no limit)
    #[arg(short = 'j', long)]
    max_concurrent: Option<usize>,

    /// Only process these titles (repeatable)
    #[arg(long = "only", value_name = "TITLE")]
    only: Vec<String>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    // Load configuration
    let mut config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => Config::default(),
    };
    if let Some(root) = cli.root {
        config.paths.root = root;
    }
    if let Some(limit) = cli.max_concurrent {
        config.pipeline.max_concurrent_items = limit;
    }
    config.validate()?;

    if cli.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    config.paths.root = std::fs::canonicalize(&config.paths.root)
        .with_context(|| format!("root directory {:?}", config.paths.root))?;

    info!("Starting Lipsync-Dubber v{}", env!("CARGO_PKG_VERSION"));
    info!("Root: {:?}", config.paths.root);

    let mut items = discover_items(&config).map_err(|e| anyhow::anyhow!(e.user_message()))?;
    if !cli.only.is_empty() {
        items.retain(|item| cli.only.contains(&item.title));
        for title in &cli.only {
            if !items.iter().any(|item| &item.title == title) {
                warn!("No audio input titled '{}'", title);
            }
        }
    }
    if items.is_empty() {
        warn!("Nothing to do");
        return Ok(());
    }

    let summary = FanOutDriver::from_config(Arc::new(config)).run(items).await?;
    summary.log();

    if !summary.all_succeeded() {
        let failed = summary.failed_titles();
        anyhow::bail!("{} item(s) failed: {}", failed.len(), failed.join(", "));
    }
    Ok(())
}
