use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::Strictness;
use crate::error::{MediascribeError, Result};
use crate::media::AudioChunk;
use crate::progress::{ProgressMonitor, ProgressState};

use super::{Transcript, TranscriptResult, TranscriptSegment, Transcriber};

/// Compute device for inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Accelerator,
    Cpu,
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Accelerator => write!(f, "gpu"),
            Device::Cpu => write!(f, "cpu"),
        }
    }
}

/// Pick the compute device once per process lifetime and report it.
///
/// Accelerator support is compiled in through the GPU pass-through features;
/// without one of them the general-purpose processor is used.
pub fn detect_device() -> Device {
    static DEVICE: OnceLock<Device> = OnceLock::new();
    *DEVICE.get_or_init(|| {
        let device = if cfg!(any(
            feature = "cuda",
            feature = "metal",
            feature = "vulkan",
            feature = "hipblas"
        )) {
            Device::Accelerator
        } else {
            Device::Cpu
        };
        info!("Using {device} for inference");
        device
    })
}

/// Startup configuration handed to the engine, replacing any process-wide
/// implicit filtering or hidden globals.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Forced target language, never auto-detected.
    pub language: String,
    /// Known boilerplate phrases stripped from merged text.
    pub boilerplate_phrases: Vec<String>,
    /// Failure policy for individual chunks.
    pub strictness: Strictness,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            boilerplate_phrases: Vec::new(),
            strictness: Strictness::Tolerant,
        }
    }
}

/// Drives per-chunk inference, reconciles chunk-local timestamps into the
/// global timeline, and merges chunk outputs into one transcript.
pub struct TranscriptionEngine {
    backend: Box<dyn Transcriber>,
    config: EngineConfig,
}

impl TranscriptionEngine {
    pub fn new(backend: Box<dyn Transcriber>, config: EngineConfig) -> Self {
        Self { backend, config }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Transcribe all chunks strictly in index order and merge the results.
    ///
    /// Under [`Strictness::Tolerant`] a failed chunk becomes an inline error
    /// marker and processing continues; under [`Strictness::Strict`] the
    /// first failure aborts the file. The per-chunk progress monitor fires
    /// `on_event` after every completed chunk.
    pub async fn transcribe_chunks(
        &mut self,
        chunks: &[AudioChunk],
        monitor: &mut ProgressMonitor,
        mut on_event: impl FnMut(&ProgressState),
    ) -> Result<TranscriptResult> {
        let total_duration = chunks.last().map(|c| c.end).unwrap_or(0.0);
        monitor.reset(total_duration);

        let mut all_segments: Vec<TranscriptSegment> = Vec::new();
        let mut chunk_texts: Vec<String> = Vec::with_capacity(chunks.len());
        let mut failed_chunks = 0;

        for chunk in chunks {
            debug!(
                "Transcribing chunk {} [{:.1}s, {:.1}s) with {}",
                chunk.index,
                chunk.start,
                chunk.end,
                self.backend.name()
            );

            match self.backend.transcribe_chunk(chunk).await {
                Ok(transcript) => {
                    let (segments, text) = reconcile(chunk, transcript);
                    all_segments.extend(segments);
                    chunk_texts.push(collapse_whitespace(&text));
                }
                Err(e) => {
                    if self.config.strictness == Strictness::Strict {
                        return Err(MediascribeError::ChunkTranscription {
                            index: chunk.index,
                            reason: e.to_string(),
                        });
                    }
                    warn!("Chunk {} failed, continuing: {e}", chunk.index);
                    failed_chunks += 1;
                    chunk_texts.push(error_marker(chunk.index, &e.to_string()));
                }
            }

            // Observe progress in the same elapsed-time protocol external
            // operations use: the end offset of the completed chunk.
            if let Some(state) = monitor.observe_line(&format_elapsed(chunk.end)) {
                on_event(&state);
            }
        }

        let text = self.merge_texts(&chunk_texts);

        info!(
            "Transcribed {} chunks ({} failed), {} segments",
            chunks.len(),
            failed_chunks,
            all_segments.len()
        );

        Ok(TranscriptResult {
            segments: all_segments,
            text,
            failed_chunks,
        })
    }

    /// Concatenate chunk texts in index order, strip boilerplate, and tidy
    /// whitespace.
    fn merge_texts(&self, chunk_texts: &[String]) -> String {
        let mut merged = chunk_texts
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");

        for phrase in &self.config.boilerplate_phrases {
            if phrase.is_empty() {
                continue;
            }
            merged = merged.replace(phrase.as_str(), "");
        }

        collapse_blank_runs(merged.trim())
    }

    /// Release accelerator memory held by the backend.
    pub fn release(&mut self) {
        self.backend.release();
    }
}

/// Apply the chunk's start offset to every backend segment so timestamps
/// become globally meaningful.
fn reconcile(chunk: &AudioChunk, transcript: Transcript) -> (Vec<TranscriptSegment>, String) {
    let segments = transcript
        .segments
        .into_iter()
        .map(|s| TranscriptSegment {
            start: chunk.start + s.start,
            end: chunk.start + s.end,
            text: s.text,
        })
        .collect();
    (segments, transcript.text)
}

/// Inline marker embedded in the merged transcript for a failed chunk.
fn error_marker(index: usize, reason: &str) -> String {
    format!("[chunk {index} failed: {reason}]")
}

fn format_elapsed(secs: f64) -> String {
    let total_centis = (secs * 100.0).round() as u64;
    let (cs, s) = (total_centis % 100, total_centis / 100);
    format!(
        "time={:02}:{:02}:{:02}.{:02}",
        s / 3600,
        (s % 3600) / 60,
        s % 60,
        cs
    )
}

fn whitespace_run() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[ \t]+").expect("valid regex"))
}

fn blank_line_run() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\n{3,}").expect("valid regex"))
}

/// Collapse repeated spaces and tabs within one chunk's text.
fn collapse_whitespace(text: &str) -> String {
    whitespace_run().replace_all(text.trim(), " ").into_owned()
}

/// Collapse runs of blank lines left behind by boilerplate removal.
fn collapse_blank_runs(text: &str) -> String {
    blank_line_run().replace_all(text, "\n\n").into_owned()
}
