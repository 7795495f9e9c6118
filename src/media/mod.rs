pub mod extract;
pub mod probe;
pub mod split;

pub use extract::{check_ffmpeg, extract_audio, AUDIO_SAMPLE_RATE};
pub use probe::probe_duration;
pub use split::{plan_chunks, split_into_chunks, ChunkPlan, ChunkWorkspace};

use std::path::PathBuf;

/// A time-bounded sub-file of the source audio, extracted for bounded-size
/// inference.
///
/// Chunks partition `[0, total_duration)` exactly: indices are contiguous
/// from 0, each chunk's end equals the next chunk's start, and the last
/// chunk's end equals the total duration.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub index: usize,
    /// Start offset in the source timeline, seconds.
    pub start: f64,
    /// End offset in the source timeline, seconds.
    pub end: f64,
    pub path: PathBuf,
}

impl AudioChunk {
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}
