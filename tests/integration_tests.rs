//! Integration tests for mediascribe
//!
//! These tests validate the integration between components without requiring
//! a Whisper model. FFmpeg-dependent tests skip themselves when FFmpeg is
//! not installed.

use async_trait::async_trait;
use mediascribe::config::{Config, Strictness};
use mediascribe::error::{MediascribeError, Result};
use mediascribe::media::{plan_chunks, split_into_chunks, AudioChunk, ChunkWorkspace};
use mediascribe::progress::ProgressMonitor;
use mediascribe::transcribe::{EngineConfig, Transcriber, TranscriptionEngine};
use mediascribe::transcribe::{Transcript, TranscriptSegment};

use std::path::PathBuf;
use std::process::Command;

// ============================================================================
// Test helpers
// ============================================================================

/// Stub backend: one chunk-local segment covering each chunk.
struct StubBackend {
    fail_on_index: Option<usize>,
}

#[async_trait]
impl Transcriber for StubBackend {
    async fn transcribe_chunk(&mut self, chunk: &AudioChunk) -> Result<Transcript> {
        if self.fail_on_index == Some(chunk.index) {
            return Err(MediascribeError::ChunkTranscription {
                index: chunk.index,
                reason: "stub failure".to_string(),
            });
        }
        Ok(Transcript {
            segments: vec![TranscriptSegment {
                start: 0.5,
                end: chunk.duration() - 0.5,
                text: format!("chunk {} speech", chunk.index),
            }],
            text: format!("chunk {} speech", chunk.index),
        })
    }

    fn release(&mut self) {}

    fn name(&self) -> &'static str {
        "stub"
    }
}

fn stub_engine(fail_on_index: Option<usize>, strictness: Strictness) -> TranscriptionEngine {
    TranscriptionEngine::new(
        Box::new(StubBackend { fail_on_index }),
        EngineConfig {
            language: "en".to_string(),
            boilerplate_phrases: Vec::new(),
            strictness,
        },
    )
}

fn chunks_for_plan(total: f64, chunk_secs: f64) -> Vec<AudioChunk> {
    let mut chunks = Vec::new();
    let mut start = 0.0;
    let mut index = 0;
    while start < total {
        let end = (start + chunk_secs).min(total);
        chunks.push(AudioChunk {
            index,
            start,
            end,
            path: PathBuf::from(format!("/tmp/chunk_{index:04}.wav")),
        });
        start = end;
        index += 1;
    }
    chunks
}

fn ffmpeg_available() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Write a silent 16 kHz mono PCM WAV of the given duration.
fn write_silent_wav(path: &std::path::Path, secs: f64) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: mediascribe::media::AUDIO_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for _ in 0..(secs * spec.sample_rate as f64) as usize {
        writer.write_sample(0i16).unwrap();
    }
    writer.finalize().unwrap();
}

// ============================================================================
// Chunk planning properties
// ============================================================================

mod planning_tests {
    use super::*;

    #[test]
    fn test_plans_partition_without_gaps() {
        let mb = 1024 * 1024;
        for (size, duration) in [(30 * mb, 600.0), (75 * mb, 3600.0), (120 * mb, 5400.0)] {
            let plan = plan_chunks(size, duration, 25.0);
            let intervals = plan.intervals();

            assert!(plan.expected_chunks >= 1);
            assert_eq!(intervals[0].0, 0.0);
            for pair in intervals.windows(2) {
                assert_eq!(pair[0].1, pair[1].0);
            }
            assert_eq!(intervals.last().unwrap().1, duration);
        }
    }

    #[test]
    fn test_under_ceiling_is_one_chunk() {
        let plan = plan_chunks(5 * 1024 * 1024, 7200.0, 25.0);
        assert_eq!(plan.expected_chunks, 1);
        assert_eq!(plan.intervals(), vec![(0.0, 7200.0)]);
    }

    #[test]
    fn test_hour_long_file_at_three_times_ceiling() {
        // 60 minutes at 3x the ceiling: chunk duration max(60, 1200*0.9) =
        // 1080s (18 minutes), 4 chunks, last one shorter.
        let plan = plan_chunks(75 * 1024 * 1024, 3600.0, 25.0);
        assert!((plan.chunk_duration - 1080.0).abs() < 1e-9);
        assert_eq!(plan.expected_chunks, 4);
        let last = *plan.intervals().last().unwrap();
        assert!(last.1 - last.0 < plan.chunk_duration);
    }

    #[test]
    fn test_forty_five_second_file_not_clamped_to_floor() {
        let plan = plan_chunks(1024 * 1024, 45.0, 25.0);
        assert_eq!(plan.expected_chunks, 1);
        assert_eq!(plan.chunk_duration, 45.0);
    }
}

// ============================================================================
// Engine + merge behavior
// ============================================================================

mod engine_tests {
    use super::*;

    #[tokio::test]
    async fn test_merged_timestamps_never_exceed_duration() {
        let total = 95.0;
        let chunks = chunks_for_plan(total, 30.0);
        let mut engine = stub_engine(None, Strictness::Tolerant);
        let mut monitor = ProgressMonitor::new(total);

        let result = engine
            .transcribe_chunks(&chunks, &mut monitor, |_| {})
            .await
            .unwrap();

        assert_eq!(result.segments.len(), chunks.len());
        for seg in &result.segments {
            assert!(seg.start >= 0.0);
            assert!(seg.end <= total + 1e-6);
        }
        // Segments follow chunk index order, which is temporal order.
        for pair in result.segments.windows(2) {
            assert!(pair[1].start >= pair[0].start);
        }
    }

    #[tokio::test]
    async fn test_failed_middle_chunk_degrades_to_marker() {
        let chunks = chunks_for_plan(90.0, 30.0);
        assert_eq!(chunks.len(), 3);

        let mut engine = stub_engine(Some(1), Strictness::Tolerant);
        let mut monitor = ProgressMonitor::new(90.0);
        let result = engine
            .transcribe_chunks(&chunks, &mut monitor, |_| {})
            .await
            .unwrap();

        assert!(result.text.contains("chunk 0 speech"));
        assert!(result.text.contains("[chunk 1 failed:"));
        assert!(result.text.contains("chunk 2 speech"));
        assert_eq!(result.failed_chunks, 1);
    }

    #[tokio::test]
    async fn test_strict_mode_propagates_chunk_failure() {
        let chunks = chunks_for_plan(90.0, 30.0);
        let mut engine = stub_engine(Some(1), Strictness::Strict);
        let mut monitor = ProgressMonitor::new(90.0);

        let result = engine.transcribe_chunks(&chunks, &mut monitor, |_| {}).await;
        assert!(matches!(
            result,
            Err(MediascribeError::ChunkTranscription { index: 1, .. })
        ));
    }
}

// ============================================================================
// Workspace + splitting
// ============================================================================

mod workspace_tests {
    use super::*;

    #[test]
    fn test_cleanup_is_idempotent() {
        let mut workspace = ChunkWorkspace::create().unwrap();
        let path = workspace.path().to_path_buf();
        std::fs::write(workspace.chunk_path(0), b"chunk data").unwrap();

        workspace.cleanup().unwrap();
        assert!(!path.exists());
        workspace.cleanup().unwrap();
        workspace.cleanup().unwrap();
    }

    #[test]
    fn test_split_silent_wav_partitions_duration() {
        if !ffmpeg_available() {
            eprintln!("Skipping test: FFmpeg not available");
            return;
        }

        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("silence.wav");
        write_silent_wav(&source, 30.0);

        // A 30s 16kHz mono WAV is ~0.92 MB, over a 0.3 MB ceiling, but the
        // 60s floor exceeds the 30s total so the plan collapses to one chunk.
        let size = std::fs::metadata(&source).unwrap().len();
        let plan = plan_chunks(size, 30.0, 0.3);
        assert_eq!(plan.expected_chunks, 1, "30s is under the 60s floor");

        let workspace = ChunkWorkspace::create().unwrap();
        let chunks = split_into_chunks(&source, &plan, &workspace).unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start, 0.0);
        assert_eq!(chunks[0].end, 30.0);
        assert!(chunks[0].path.exists());
    }

    #[test]
    fn test_split_missing_source_reports_partial() {
        let workspace = ChunkWorkspace::create().unwrap();
        let plan = plan_chunks(1024, 10.0, 25.0);
        let err =
            split_into_chunks(std::path::Path::new("/nonexistent.wav"), &plan, &workspace)
                .unwrap_err();
        assert!(err.partial.is_empty());
    }
}

// ============================================================================
// End-to-end with stub backend: split, transcribe, merge
// ============================================================================

mod end_to_end_tests {
    use super::*;

    #[tokio::test]
    async fn test_split_then_transcribe_then_merge_silent_audio() {
        if !ffmpeg_available() {
            eprintln!("Skipping test: FFmpeg not available");
            return;
        }

        let total = 120.0;
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("silence.wav");
        write_silent_wav(&source, total);

        // A 120s WAV is ~3.7 MB; a 1 MB ceiling forces multiple chunks at
        // the 60s floor.
        let size = std::fs::metadata(&source).unwrap().len();
        let plan = plan_chunks(size, total, 1.0);
        assert!(plan.expected_chunks > 1);

        let mut workspace = ChunkWorkspace::create().unwrap();
        let chunks = split_into_chunks(&source, &plan, &workspace).unwrap();
        assert_eq!(chunks.len(), plan.expected_chunks);
        assert_eq!(chunks.last().unwrap().end, total);

        let mut engine = stub_engine(None, Strictness::Tolerant);
        let mut monitor = ProgressMonitor::new(total);
        let result = engine
            .transcribe_chunks(&chunks, &mut monitor, |_| {})
            .await
            .unwrap();

        // Offset-adjusted end timestamps never exceed the source duration.
        for seg in &result.segments {
            assert!(seg.end <= total + 1e-6);
        }
        assert!(!result.text.is_empty());
        assert_eq!(result.failed_chunks, 0);

        workspace.cleanup().unwrap();
    }
}

// ============================================================================
// Config integration
// ============================================================================

mod config_tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();
        assert_eq!(config.language, "en");
        assert_eq!(config.max_chunk_mb, 25.0);
        assert_eq!(config.strictness, Strictness::Tolerant);
    }

    #[test]
    fn test_audio_only_skips_model_requirement() {
        let config = Config::default();
        assert!(config.validate(true).is_err());
        assert!(config.validate(false).is_ok());
    }

    #[test]
    fn test_config_toml_round_trip() {
        let config = Config {
            model_path: Some(PathBuf::from("models/ggml-base.bin")),
            language: "ko".to_string(),
            max_chunk_mb: 20.0,
            strictness: Strictness::Strict,
            ..Default::default()
        };

        let serialized = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.language, "ko");
        assert_eq!(parsed.max_chunk_mb, 20.0);
        assert_eq!(parsed.strictness, Strictness::Strict);
    }
}
