// Diagnostic binary: print what the pipeline would see for each media file

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use lipsync_dubber::{audio::AudioProbe, config::Config, media::probe_video};

const AUDIO_EXTENSIONS: [&str; 6] = ["wav", "mp3", "flac", "ogg", "m4a", "aac"];

#[derive(Parser)]
#[command(name = "probe-media", about = "Show video metadata and audio durations")]
struct Cli {
    /// Files to inspect
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Configuration file, for the ffprobe location
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .init();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    let ffprobe = config.resolve_program(&config.encoding.ffprobe);

    println!("🔍 Probing {} file(s)", cli.files.len());
    let mut failures = 0;

    for file in &cli.files {
        let is_audio = file
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
            .unwrap_or(false);

        let result = if is_audio {
            AudioProbe::duration(file)
                .map(|duration| println!("   🎵 {:?}: {:.2}s", file, duration))
                .with_context(|| format!("reading {:?}", file))
        } else {
            probe_video(&ffprobe, file)
                .await
                .map(|info| {
                    println!(
                        "   🎞️  {:?}: {}x{} {} @ {:.3} fps, {} frames, {:.2}s",
                        file, info.width, info.height, info.codec, info.fps, info.frame_count, info.duration
                    )
                })
                .with_context(|| format!("probing {:?}", file))
        };

        if let Err(e) = result {
            println!("   ❌ {:#}", e);
            failures += 1;
        }
    }

    if failures > 0 {
        anyhow::bail!("{} file(s) could not be read", failures);
    }
    println!("✅ Done");
    Ok(())
}
