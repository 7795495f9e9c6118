//! Whisper backend built on `whisper-rs` / whisper.cpp.
//!
//! Requires the `whisper` feature (and cmake to build). Without it a stub
//! implementation is compiled that fails with `BackendUnavailable`, so
//! audio-only workflows keep working.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::{MediascribeError, Result};
use crate::media::AudioChunk;

use super::{Transcript, Transcriber};
#[cfg(feature = "whisper")]
use super::TranscriptSegment;

#[cfg(feature = "whisper")]
use std::sync::Once;
#[cfg(feature = "whisper")]
use tracing::{debug, info};
#[cfg(feature = "whisper")]
use whisper_rs::{
    install_logging_hooks, FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters,
};

#[cfg(feature = "whisper")]
static LOGGING_HOOKS_INSTALLED: Once = Once::new();

/// Configuration for the Whisper backend.
#[derive(Debug, Clone)]
pub struct WhisperConfig {
    /// Path to the ggml model file.
    pub model_path: PathBuf,
    /// Forced language code (ISO 639-1); never auto-detected so chunked
    /// output stays consistent.
    pub language: String,
    /// Inference threads (None = all logical cores).
    pub threads: Option<usize>,
    /// Route whisper.cpp diagnostics through tracing instead of stderr.
    pub suppress_backend_logs: bool,
}

/// Whisper transcriber holding a lazily loaded model.
///
/// The context is loaded on the first chunk and kept until [`release`],
/// because loading is expensive and must not repeat per chunk.
///
/// [`release`]: Transcriber::release
pub struct WhisperBackend {
    config: WhisperConfig,
    #[cfg(feature = "whisper")]
    ctx: Option<WhisperContext>,
}

impl WhisperBackend {
    pub fn new(config: WhisperConfig) -> Result<Self> {
        if !config.model_path.exists() {
            return Err(MediascribeError::BackendUnavailable(format!(
                "Model file not found: {}",
                config.model_path.display()
            )));
        }

        Ok(Self {
            config,
            #[cfg(feature = "whisper")]
            ctx: None,
        })
    }

    pub fn config(&self) -> &WhisperConfig {
        &self.config
    }

    /// Decode a 16 kHz mono 16-bit PCM WAV chunk into normalized f32
    /// samples.
    fn read_samples(path: &std::path::Path) -> Result<Vec<f32>> {
        let mut reader = hound::WavReader::open(path).map_err(|e| {
            MediascribeError::ChunkTranscription {
                index: 0,
                reason: format!("failed to open chunk WAV {}: {e}", path.display()),
            }
        })?;

        let samples: std::result::Result<Vec<i16>, _> = reader.samples::<i16>().collect();
        let samples = samples.map_err(|e| MediascribeError::ChunkTranscription {
            index: 0,
            reason: format!("failed to decode chunk samples: {e}"),
        })?;

        Ok(samples.iter().map(|&s| s as f32 / 32768.0).collect())
    }
}

#[cfg(feature = "whisper")]
impl WhisperBackend {
    /// Load the model if it isn't resident yet.
    fn ensure_loaded(&mut self) -> Result<()> {
        if self.ctx.is_none() {
            if self.config.suppress_backend_logs {
                LOGGING_HOOKS_INSTALLED.call_once(install_logging_hooks);
            }

            let device = super::detect_device();
            info!(
                "Loading Whisper model from {} ({device})",
                self.config.model_path.display()
            );

            let mut ctx_params = WhisperContextParameters::default();
            ctx_params.use_gpu(device == super::Device::Accelerator);

            let model_path = self.config.model_path.to_str().ok_or_else(|| {
                MediascribeError::BackendUnavailable("Invalid UTF-8 in model path".to_string())
            })?;

            let ctx = WhisperContext::new_with_params(model_path, ctx_params).map_err(|e| {
                MediascribeError::BackendUnavailable(format!("Failed to load Whisper model: {e}"))
            })?;

            self.ctx = Some(ctx);
        }

        Ok(())
    }

    /// Fixed deterministic decoding settings.
    ///
    /// Zero-temperature greedy sampling, forced language, no conditioning on
    /// prior text (prevents cross-chunk prompt bleed), and thresholds that
    /// tolerate near-silent audio without emitting repetitive boilerplate.
    fn build_params(&self) -> FullParams<'_, '_> {
        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });

        params.set_temperature(0.0);
        params.set_language(Some(&self.config.language));
        params.set_no_context(true);
        params.set_single_segment(false);
        params.set_suppress_blank(true);
        params.set_no_speech_thold(0.6);
        params.set_entropy_thold(2.4);
        params.set_logprob_thold(-1.0);

        if let Some(threads) = self.config.threads {
            params.set_n_threads(threads as i32);
        }

        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        params
    }
}

#[cfg(feature = "whisper")]
#[async_trait]
impl Transcriber for WhisperBackend {
    async fn transcribe_chunk(&mut self, chunk: &AudioChunk) -> Result<Transcript> {
        let samples = Self::read_samples(&chunk.path).map_err(|e| match e {
            MediascribeError::ChunkTranscription { reason, .. } => {
                MediascribeError::ChunkTranscription {
                    index: chunk.index,
                    reason,
                }
            }
            other => other,
        })?;

        if samples.is_empty() {
            return Ok(Transcript::default());
        }

        self.ensure_loaded()?;
        let ctx = self.ctx.as_ref().expect("context loaded above");
        let params = self.build_params();

        let mut state = ctx
            .create_state()
            .map_err(|e| MediascribeError::ChunkTranscription {
                index: chunk.index,
                reason: format!("failed to create whisper state: {e}"),
            })?;

        state
            .full(params, &samples)
            .map_err(|e| MediascribeError::ChunkTranscription {
                index: chunk.index,
                reason: format!("whisper inference failed: {e}"),
            })?;

        let mut segments = Vec::new();
        let mut text = String::new();

        for segment in state.as_iter() {
            let segment_text = segment
                .to_str()
                .map_err(|e| MediascribeError::ChunkTranscription {
                    index: chunk.index,
                    reason: format!("failed to read segment text: {e}"),
                })?
                .trim()
                .to_string();

            if segment_text.is_empty() {
                continue;
            }

            // Whisper reports centiseconds, chunk-local.
            let start = segment.start_timestamp() as f64 / 100.0;
            let end = segment.end_timestamp() as f64 / 100.0;

            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(&segment_text);

            segments.push(TranscriptSegment {
                start,
                end,
                text: segment_text,
            });
        }

        debug!(
            "Chunk {}: {} segments, {} chars",
            chunk.index,
            segments.len(),
            text.len()
        );

        Ok(Transcript { segments, text })
    }

    fn release(&mut self) {
        if self.ctx.take().is_some() {
            debug!("Released Whisper model");
        }
    }

    fn name(&self) -> &'static str {
        "whisper.cpp"
    }
}

#[cfg(not(feature = "whisper"))]
#[async_trait]
impl Transcriber for WhisperBackend {
    async fn transcribe_chunk(&mut self, _chunk: &AudioChunk) -> Result<Transcript> {
        Err(MediascribeError::BackendUnavailable(
            "Built without the `whisper` feature; rebuild with `cargo build --features whisper`"
                .to_string(),
        ))
    }

    fn release(&mut self) {}

    fn name(&self) -> &'static str {
        "whisper.cpp (unavailable)"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_backend_requires_existing_model() {
        let config = WhisperConfig {
            model_path: PathBuf::from("/nonexistent/ggml-base.bin"),
            language: "en".to_string(),
            threads: None,
            suppress_backend_logs: true,
        };

        match WhisperBackend::new(config).err() {
            Some(MediascribeError::BackendUnavailable(msg)) => {
                assert!(msg.contains("nonexistent"));
            }
            other => panic!("Expected BackendUnavailable, got: {other:?}"),
        }
    }

    #[test]
    fn test_backend_new_with_existing_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not a real model").unwrap();

        let config = WhisperConfig {
            model_path: file.path().to_path_buf(),
            language: "ko".to_string(),
            threads: Some(4),
            suppress_backend_logs: true,
        };

        // Construction only validates the path; loading is deferred to the
        // first chunk.
        let backend = WhisperBackend::new(config).unwrap();
        assert_eq!(backend.config().language, "ko");
        assert_eq!(backend.config().threads, Some(4));
    }

    #[test]
    fn test_read_samples_normalizes_pcm() {
        let dir = tempfile::tempdir().unwrap();
        let wav_path = dir.path().join("tone.wav");

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: crate::media::AUDIO_SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&wav_path, spec).unwrap();
        for s in [0i16, 16384, -16384, i16::MAX, i16::MIN] {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();

        let samples = WhisperBackend::read_samples(&wav_path).unwrap();
        assert_eq!(samples.len(), 5);
        assert_eq!(samples[0], 0.0);
        assert!((samples[1] - 0.5).abs() < 0.01);
        assert!((samples[2] + 0.5).abs() < 0.01);
        assert!(samples[3] < 1.0 && samples[3] > 0.99);
        assert_eq!(samples[4], -1.0);
    }

    #[test]
    fn test_read_samples_missing_file() {
        let result = WhisperBackend::read_samples(std::path::Path::new("/nonexistent/c.wav"));
        assert!(result.is_err());
    }
}
