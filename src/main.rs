use anyhow::{Context, Result};
use clap::Parser;
use mediascribe::config::{self, Config};
use mediascribe::pipeline::{print_summary, run_batch, PipelineOptions};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "mediascribe")]
#[command(version, about = "Transcribe video/audio files to text")]
#[command(
    long_about = "Transcribe video and audio files to plain text using local Whisper inference. \
Large files are split into size-bounded chunks, transcribed sequentially, and merged."
)]
struct Cli {
    /// Input video/audio file. Omit when using --input-dir.
    input: Option<PathBuf>,

    /// Process every supported media file in this directory
    #[arg(long, conflicts_with = "input")]
    input_dir: Option<PathBuf>,

    /// Directory transcripts are written to (defaults to input location)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Path to the Whisper ggml model file
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Forced transcription language (ISO 639-1 code)
    #[arg(short, long)]
    language: Option<String>,

    /// Size ceiling per audio chunk, in megabytes
    #[arg(long)]
    max_chunk_mb: Option<f64>,

    /// Fail the file on the first chunk transcription error
    #[arg(long)]
    strict: bool,

    /// Keep the intermediate extracted WAV next to the transcript
    #[arg(long)]
    keep_audio: bool,

    /// Stop after audio extraction (no model required)
    #[arg(long)]
    audio_only: bool,

    /// Disable progress bars
    #[arg(long)]
    no_progress: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

/// Discover supported media files in a directory, non-recursive, sorted.
fn discover_inputs(dir: &PathBuf) -> Result<Vec<PathBuf>> {
    let mut inputs = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read input directory {}", dir.display()))?
    {
        let path = entry?.path();
        if path.is_file() && config::is_supported_input(&path) {
            inputs.push(path);
        }
    }
    inputs.sort();
    inputs.dedup();
    Ok(inputs)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    // Load configuration, then apply CLI overrides
    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(model) = cli.model {
        config.model_path = Some(model);
    }
    if let Some(language) = cli.language {
        config.language = language;
    }
    if let Some(mb) = cli.max_chunk_mb {
        config.max_chunk_mb = mb;
    }
    if cli.strict {
        config.strictness = mediascribe::Strictness::Strict;
    }

    config
        .validate(!cli.audio_only)
        .context("Configuration validation failed")?;

    // Determine input files
    let inputs = match (&cli.input, &cli.input_dir) {
        (Some(input), _) => {
            if !input.exists() {
                anyhow::bail!("Input file not found: {}", input.display());
            }
            vec![input.clone()]
        }
        (None, Some(dir)) => {
            let inputs = discover_inputs(dir)?;
            if inputs.is_empty() {
                anyhow::bail!(
                    "No supported media files found in {} (extensions: {:?})",
                    dir.display(),
                    config::SUPPORTED_EXTENSIONS
                );
            }
            inputs
        }
        (None, None) => anyhow::bail!("Provide an input file or --input-dir"),
    };

    info!("Found {} file(s) to process", inputs.len());
    info!("Language: {}", config.language);
    info!("Chunk ceiling: {:.0} MB", config.max_chunk_mb);

    let options = PipelineOptions {
        output_dir: cli.output_dir,
        keep_audio: cli.keep_audio,
        audio_only: cli.audio_only,
        show_progress: !cli.no_progress,
    };

    let stats = run_batch(&inputs, &config, &options).await?;
    print_summary(&stats);

    if stats.failed > 0 && stats.succeeded == 0 {
        anyhow::bail!("All {} file(s) failed", stats.failed);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_inputs_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.mp4", "a.mkv", "notes.txt", "c.wav"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub.mp4")).unwrap();

        let inputs = discover_inputs(&dir.path().to_path_buf()).unwrap();
        let names: Vec<_> = inputs
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();

        assert_eq!(names, vec!["a.mkv", "b.mp4", "c.wav"]);
    }
}
