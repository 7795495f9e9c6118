pub mod engine;
pub mod whisper;

pub use engine::{detect_device, Device, EngineConfig, TranscriptionEngine};
pub use whisper::{WhisperBackend, WhisperConfig};

use crate::error::Result;
use crate::media::AudioChunk;
use async_trait::async_trait;

/// A time-bounded span of recognized text.
///
/// Backends return chunk-local offsets; the engine shifts them into the
/// global timeline before anything leaves the transcription stage.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptSegment {
    /// Start offset, seconds.
    pub start: f64,
    /// End offset, seconds.
    pub end: f64,
    pub text: String,
}

/// Output of one chunk's inference pass, timestamps chunk-local.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    pub segments: Vec<TranscriptSegment>,
    pub text: String,
}

/// Merged output for one file: segments in chunk-index (temporal) order on
/// the global timeline, plus the concatenated text form.
#[derive(Debug, Clone, Default)]
pub struct TranscriptResult {
    pub segments: Vec<TranscriptSegment>,
    pub text: String,
    pub failed_chunks: usize,
}

/// Speech-recognition backend seam.
///
/// Implementations load their model lazily on the first chunk and hold it
/// until [`Transcriber::release`], which must return any accelerator memory.
#[async_trait]
pub trait Transcriber: Send {
    /// Transcribe one chunk file with fixed deterministic decoding settings.
    /// Returned timestamps are relative to the start of the chunk.
    async fn transcribe_chunk(&mut self, chunk: &AudioChunk) -> Result<Transcript>;

    /// Drop the loaded model, releasing accelerator memory.
    fn release(&mut self);

    fn name(&self) -> &'static str;
}
