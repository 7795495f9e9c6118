use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::error::{MediascribeError, Result};

use super::extract::extract_segment;
use super::AudioChunk;

/// Planned chunk durations never drop below this floor, except when the
/// whole file is shorter than it.
pub const MIN_CHUNK_SECS: f64 = 60.0;

/// Safety margin applied to the raw chunk duration so chunks land under the
/// size ceiling even when bitrate varies.
pub const SAFETY_MARGIN: f64 = 0.9;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// The computed chunk duration and expected count, before extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPlan {
    /// Total source duration, seconds.
    pub total_duration: f64,
    /// Planned duration of each chunk, seconds. The last chunk may be
    /// shorter.
    pub chunk_duration: f64,
    pub expected_chunks: usize,
}

impl ChunkPlan {
    /// The planned `[start, end)` intervals. They partition
    /// `[0, total_duration)` with no gaps or overlaps.
    ///
    /// Rounding slivers from repeated addition are folded into the final
    /// chunk, so no near-zero interval is ever handed to the extractor.
    pub fn intervals(&self) -> Vec<(f64, f64)> {
        const SLIVER_SECS: f64 = 1e-6;
        let mut intervals = Vec::with_capacity(self.expected_chunks);
        let mut start = 0.0;
        while start < self.total_duration {
            let mut end = (start + self.chunk_duration).min(self.total_duration);
            if self.total_duration - end < SLIVER_SECS {
                end = self.total_duration;
            }
            intervals.push((start, end));
            start = end;
        }
        intervals
    }
}

/// Decide how many time-bounded chunks the source must be divided into to
/// respect the size ceiling.
///
/// Files at or under the ceiling plan as a single chunk spanning the whole
/// duration, regardless of length.
pub fn plan_chunks(file_size_bytes: u64, total_duration: f64, ceiling_mb: f64) -> ChunkPlan {
    let size_mb = file_size_bytes as f64 / BYTES_PER_MB;

    if size_mb <= ceiling_mb || total_duration <= 0.0 {
        return ChunkPlan {
            total_duration,
            chunk_duration: total_duration,
            expected_chunks: 1,
        };
    }

    let required_chunks = size_mb / ceiling_mb;
    let raw_chunk_duration = total_duration / required_chunks;
    let chunk_duration = (raw_chunk_duration * SAFETY_MARGIN).max(MIN_CHUNK_SECS);

    // A short file hits the floor and collapses back to a single chunk.
    if chunk_duration >= total_duration {
        return ChunkPlan {
            total_duration,
            chunk_duration: total_duration,
            expected_chunks: 1,
        };
    }

    let expected_chunks = (total_duration / chunk_duration).ceil() as usize;

    ChunkPlan {
        total_duration,
        chunk_duration,
        expected_chunks,
    }
}

/// Temp directory exclusively owning one file's chunk artifacts.
///
/// Cleanup is idempotent and is the sole cleanup obligation for chunk files.
#[derive(Debug)]
pub struct ChunkWorkspace {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl ChunkWorkspace {
    pub fn create() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("mediascribe-chunks-")
            .tempdir()?;
        let path = dir.path().to_path_buf();
        debug!("Created chunk workspace at {}", path.display());
        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn chunk_path(&self, index: usize) -> PathBuf {
        self.path.join(format!("chunk_{index:04}.wav"))
    }

    /// Remove the workspace and everything in it. Safe to call more than
    /// once; an already-absent directory is not an error.
    pub fn cleanup(&mut self) -> Result<()> {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            dir.close()?;
            debug!("Removed chunk workspace {}", path.display());
        }
        Ok(())
    }
}

impl Drop for ChunkWorkspace {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            warn!("Failed to remove chunk workspace: {e}");
        }
    }
}

/// Error from a partially completed split: the chunks extracted before the
/// failure, plus the failure itself.
#[derive(Debug)]
pub struct SplitError {
    pub partial: Vec<AudioChunk>,
    pub source: MediascribeError,
}

impl From<SplitError> for MediascribeError {
    fn from(e: SplitError) -> Self {
        e.source
    }
}

/// Extract every planned chunk into the workspace with lossless stream
/// copies.
///
/// Fails fast: the first extraction failure aborts the remaining plan, since
/// a truncated transcript from an incomplete chunk set is worse than no
/// transcript. The partial chunk list is surfaced alongside the error.
pub fn split_into_chunks(
    source_audio: &Path,
    plan: &ChunkPlan,
    workspace: &ChunkWorkspace,
) -> std::result::Result<Vec<AudioChunk>, SplitError> {
    if !source_audio.exists() {
        return Err(SplitError {
            partial: Vec::new(),
            source: MediascribeError::MissingInput(source_audio.display().to_string()),
        });
    }

    let intervals = plan.intervals();
    info!(
        "Splitting into {} chunks of up to {:.1}s each",
        intervals.len(),
        plan.chunk_duration
    );

    let mut chunks: Vec<AudioChunk> = Vec::with_capacity(intervals.len());

    for (index, (start, end)) in intervals.into_iter().enumerate() {
        let chunk_path = workspace.chunk_path(index);
        debug!("Extracting chunk {index}: [{start:.3}, {end:.3})");

        if let Err(e) = extract_segment(source_audio, &chunk_path, start, end) {
            let completed = chunks.len();
            return Err(SplitError {
                partial: chunks,
                source: MediascribeError::ChunkExtraction {
                    index,
                    completed,
                    reason: e.to_string(),
                },
            });
        }

        chunks.push(AudioChunk {
            index,
            start,
            end,
            path: chunk_path,
        });
    }

    info!("Created {} audio chunks", chunks.len());
    Ok(chunks)
}
