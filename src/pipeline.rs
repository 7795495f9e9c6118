use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::{self, Config, ModelLifecycle};
use crate::error::{MediascribeError, Result};
use crate::media::{
    check_ffmpeg, extract_audio, plan_chunks, probe_duration, split_into_chunks, ChunkWorkspace,
};
use crate::progress::{ProgressMonitor, ProgressRenderer};
use crate::transcribe::{
    detect_device, EngineConfig, TranscriptionEngine, WhisperBackend, WhisperConfig,
};

/// Options for one pipeline run, on top of [`Config`].
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Directory transcripts are written to; defaults to the input's parent.
    pub output_dir: Option<PathBuf>,
    /// Keep the intermediate extracted WAV next to the transcript.
    pub keep_audio: bool,
    /// Stop after audio extraction; no inference backend required.
    pub audio_only: bool,
    /// Render progress bars.
    pub show_progress: bool,
}

/// Result of processing one file.
#[derive(Debug, Clone)]
pub struct FileReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub chunks: usize,
    pub failed_chunks: usize,
    pub duration_secs: f64,
    pub extraction_time: Duration,
    pub transcription_time: Duration,
    pub total_time: Duration,
}

/// Success/failure and timing aggregated across a batch.
#[derive(Debug, Clone, Default)]
pub struct BatchStats {
    pub total_files: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

impl BatchStats {
    pub fn completed(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Running-average elapsed time per completed file.
    pub fn avg_per_file(&self) -> Option<Duration> {
        let completed = self.completed();
        if completed == 0 {
            return None;
        }
        Some(self.elapsed / completed as u32)
    }

    /// Estimated time remaining, from the running average.
    pub fn eta(&self) -> Option<Duration> {
        let remaining = self.total_files.saturating_sub(self.completed());
        let avg = self.avg_per_file()?;
        Some(avg * remaining as u32)
    }

    fn record(&mut self, elapsed: Duration, ok: bool) {
        self.elapsed += elapsed;
        if ok {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Default transcript path: input base name with the `.txt` extension.
pub fn derive_output_path(input: &Path, output_dir: Option<&Path>) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default();
    let file_name = format!("{}.txt", stem.to_string_lossy());
    match output_dir {
        Some(dir) => dir.join(file_name),
        None => input.with_file_name(file_name),
    }
}

/// Where the intermediate WAV lands when the caller asks to keep it.
///
/// The `.audio.wav` suffix keeps it distinct from any supported input, so a
/// `.wav` source in the output directory is never overwritten.
fn kept_audio_path(input: &Path, output_dir: &Path) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default();
    output_dir.join(format!("{}.audio.wav", stem.to_string_lossy()))
}

fn renderer(show: bool, message: &str) -> ProgressRenderer {
    if show {
        ProgressRenderer::new(message)
    } else {
        ProgressRenderer::hidden()
    }
}

/// Process a single file end to end: extract audio, plan and split chunks,
/// transcribe, merge, persist, clean up.
///
/// The chunk workspace (which also holds the intermediate WAV) is removed on
/// every exit path; a cleanup failure is a warning, never a file failure.
pub async fn process_file(
    input: &Path,
    config: &Config,
    options: &PipelineOptions,
    engine: Option<&mut TranscriptionEngine>,
) -> Result<FileReport> {
    let start_time = Instant::now();

    if !input.exists() {
        return Err(MediascribeError::MissingInput(input.display().to_string()));
    }
    if !config::is_supported_input(input) {
        return Err(MediascribeError::Config(format!(
            "Unsupported input extension: {} (expected one of {:?})",
            input.display(),
            config::SUPPORTED_EXTENSIONS
        )));
    }

    check_ffmpeg()?;

    // Workspace owns the chunk set and the intermediate WAV; its Drop is the
    // scoped cleanup guarantee for every exit path below.
    let mut workspace = ChunkWorkspace::create()?;

    // Stage 1: probe + extract
    let duration_secs = probe_duration(input);
    if duration_secs == 0.0 {
        warn!(
            "Unknown duration for {}; progress will not be reported",
            input.display()
        );
    }

    info!("Stage 1/3: Extracting audio from {}", input.display());
    let extraction_start = Instant::now();
    let audio_path = workspace.path().join("audio.wav");

    let mut monitor = ProgressMonitor::new(duration_secs);
    let mut bar = renderer(options.show_progress, "Extracting audio");
    extract_audio(input, &audio_path, duration_secs, &mut monitor, |state| {
        bar.update(state)
    })
    .await?;
    bar.finish("Audio extracted");
    let extraction_time = extraction_start.elapsed();

    let output_dir = options
        .output_dir
        .clone()
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&output_dir)?;

    if options.keep_audio || options.audio_only {
        let kept = kept_audio_path(input, &output_dir);
        fs::copy(&audio_path, &kept)?;
        info!("Kept extracted audio at {}", kept.display());
    }

    if options.audio_only {
        let total_time = start_time.elapsed();
        finish_cleanup(&mut workspace);
        return Ok(FileReport {
            input: input.to_path_buf(),
            output: kept_audio_path(input, &output_dir),
            chunks: 0,
            failed_chunks: 0,
            duration_secs,
            extraction_time,
            transcription_time: Duration::ZERO,
            total_time,
        });
    }

    let engine = engine.ok_or_else(|| {
        MediascribeError::BackendUnavailable(
            "Transcription requested but no engine was provided".to_string(),
        )
    })?;

    // Stage 2: plan + split
    info!("Stage 2/3: Planning and splitting chunks");
    let audio_size = fs::metadata(&audio_path)?.len();
    let audio_duration = {
        let probed = probe_duration(&audio_path);
        if probed > 0.0 {
            probed
        } else {
            duration_secs
        }
    };
    let plan = plan_chunks(audio_size, audio_duration, config.max_chunk_mb);
    info!(
        "Planned {} chunk(s) of up to {:.1}s for {:.1} MB of audio",
        plan.expected_chunks,
        plan.chunk_duration,
        audio_size as f64 / (1024.0 * 1024.0)
    );

    let chunks = match split_into_chunks(&audio_path, &plan, &workspace) {
        Ok(chunks) => chunks,
        Err(split_err) => {
            warn!(
                "Split aborted with {} of {} chunks extracted",
                split_err.partial.len(),
                plan.expected_chunks
            );
            finish_cleanup(&mut workspace);
            return Err(split_err.into());
        }
    };

    // Stage 3: transcribe + merge + persist
    info!(
        "Stage 3/3: Transcribing {} chunk(s) with {}",
        chunks.len(),
        engine.backend_name()
    );
    let transcription_start = Instant::now();

    let mut bar = renderer(options.show_progress, "Transcribing");
    let result = engine
        .transcribe_chunks(&chunks, &mut monitor, |state| bar.update(state))
        .await;

    // Cleanup runs before the error propagates.
    let result = match result {
        Ok(r) => r,
        Err(e) => {
            finish_cleanup(&mut workspace);
            return Err(e);
        }
    };
    bar.finish("Transcription complete");
    let transcription_time = transcription_start.elapsed();

    let output = derive_output_path(input, Some(&output_dir));
    fs::write(&output, &result.text)?;
    info!("Wrote transcript to {}", output.display());

    if result.failed_chunks > 0 {
        warn!(
            "{} chunk(s) degraded to inline error markers in {}",
            result.failed_chunks,
            output.display()
        );
    }

    finish_cleanup(&mut workspace);

    Ok(FileReport {
        input: input.to_path_buf(),
        output,
        chunks: chunks.len(),
        failed_chunks: result.failed_chunks,
        duration_secs: audio_duration,
        extraction_time,
        transcription_time,
        total_time: start_time.elapsed(),
    })
}

/// Explicit cleanup on the success/error paths so failures surface as
/// warnings; Drop remains the backstop for panics and early returns.
fn finish_cleanup(workspace: &mut ChunkWorkspace) {
    if let Err(e) = workspace.cleanup() {
        warn!("Workspace cleanup failed: {e}");
    }
}

/// Build the transcription engine described by the config.
pub fn build_engine(config: &Config) -> Result<TranscriptionEngine> {
    let model_path = config.model_path.clone().ok_or_else(|| {
        MediascribeError::Config("Model path required for transcription".to_string())
    })?;

    let backend = WhisperBackend::new(WhisperConfig {
        model_path,
        language: config.language.clone(),
        threads: None,
        suppress_backend_logs: config.suppress_backend_logs,
    })?;

    Ok(TranscriptionEngine::new(
        Box::new(backend),
        EngineConfig {
            language: config.language.clone(),
            boilerplate_phrases: config.boilerplate_phrases.clone(),
            strictness: config.strictness,
        },
    ))
}

/// Process a batch of files strictly sequentially.
///
/// One file's failure never stops the batch; every file lands in the
/// success/failure tally and the summary is always produced.
pub async fn run_batch(
    inputs: &[PathBuf],
    config: &Config,
    options: &PipelineOptions,
) -> Result<BatchStats> {
    let mut stats = BatchStats {
        total_files: inputs.len(),
        ..Default::default()
    };

    let mut engine = if options.audio_only {
        None
    } else {
        info!("Inference device: {}", detect_device());
        Some(build_engine(config)?)
    };

    for (i, input) in inputs.iter().enumerate() {
        info!(
            "[{}/{}] Processing {}",
            i + 1,
            stats.total_files,
            input.display()
        );

        let file_start = Instant::now();
        match process_file(input, config, options, engine.as_mut()).await {
            Ok(report) => {
                stats.record(file_start.elapsed(), true);
                info!(
                    "Finished {} -> {} ({} chunks, {:.2}s)",
                    report.input.display(),
                    report.output.display(),
                    report.chunks,
                    report.total_time.as_secs_f64()
                );
            }
            Err(e) => {
                stats.record(file_start.elapsed(), false);
                warn!("Failed to process {}: {e}", input.display());
            }
        }

        if config.model_lifecycle == ModelLifecycle::PerFile {
            if let Some(engine) = engine.as_mut() {
                engine.release();
            }
        }

        if let Some(eta) = stats.eta() {
            let remaining = stats.total_files - stats.completed();
            if remaining > 0 {
                info!(
                    "{} file(s) remaining, ETA {:.0}s",
                    remaining,
                    eta.as_secs_f64()
                );
            }
        }
    }

    if let Some(engine) = engine.as_mut() {
        engine.release();
    }

    Ok(stats)
}

/// Print the final batch tally.
pub fn print_summary(stats: &BatchStats) {
    println!();
    println!("═══════════════════════════════════════════════════════════════");
    println!("                    Transcription Summary                       ");
    println!("═══════════════════════════════════════════════════════════════");
    println!();
    println!("  Total files:   {}", stats.total_files);
    println!("  Succeeded:     {}", stats.succeeded);
    println!("  Failed:        {}", stats.failed);
    println!("  Elapsed:       {:.2}s", stats.elapsed.as_secs_f64());
    if let Some(avg) = stats.avg_per_file() {
        println!("  Avg per file:  {:.2}s", avg.as_secs_f64());
    }
    println!();
    println!("═══════════════════════════════════════════════════════════════");
}
