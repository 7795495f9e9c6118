use std::path::Path;
use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::error::{MediascribeError, Result};
use crate::progress::{ProgressMonitor, ProgressState};

/// Sample rate of extracted audio. 16 kHz mono is what the inference
/// backend expects.
pub const AUDIO_SAMPLE_RATE: u32 = 16_000;

/// Check if FFmpeg is installed and accessible.
pub fn check_ffmpeg() -> Result<()> {
    let output = Command::new("ffmpeg")
        .arg("-version")
        .output()
        .map_err(|e| {
            MediascribeError::ExternalOperation(format!(
                "FFmpeg not found. Please install FFmpeg and ensure it's in your PATH. Error: {e}"
            ))
        })?;

    if !output.status.success() {
        return Err(MediascribeError::ExternalOperation(
            "FFmpeg check failed".to_string(),
        ));
    }

    debug!("FFmpeg is available");
    Ok(())
}

/// Extract the audio track of a video/audio file into a 16 kHz mono PCM WAV.
///
/// Audio-only output with a fixed codec and a forced container format, so
/// downstream chunk splitting and sample decoding see a predictable layout.
/// FFmpeg's status stream is drained synchronously through the given
/// monitor; `on_event` fires once per parsed progress event.
pub async fn extract_audio(
    input: &Path,
    output: &Path,
    total_duration_secs: f64,
    monitor: &mut ProgressMonitor,
    mut on_event: impl FnMut(&ProgressState),
) -> Result<()> {
    if !input.exists() {
        return Err(MediascribeError::MissingInput(input.display().to_string()));
    }

    info!("Extracting audio from {}", input.display());
    monitor.reset(total_duration_secs);

    let mut child = Command::new("ffmpeg")
        .args(["-y", "-i"])
        .arg(input)
        .args(["-vn", "-acodec", "pcm_s16le", "-ar"])
        .arg(AUDIO_SAMPLE_RATE.to_string())
        .args(["-ac", "1", "-f", "wav"])
        .arg(output)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| MediascribeError::ExternalOperation(format!("Failed to spawn FFmpeg: {e}")))?;

    if let Some(stderr) = child.stderr.take() {
        monitor.drain(stderr, &mut on_event)?;
    }

    let status = child.wait().map_err(|e| {
        MediascribeError::ExternalOperation(format!("Failed to wait for FFmpeg: {e}"))
    })?;

    if !status.success() {
        return Err(MediascribeError::ExternalOperation(
            "FFmpeg audio extraction failed".to_string(),
        ));
    }

    if !output.exists() {
        return Err(MediascribeError::ExternalOperation(
            "Output file was not created".to_string(),
        ));
    }

    info!("Audio extracted to {}", output.display());
    Ok(())
}

/// Extract `[start, end)` of an audio file with a lossless stream copy.
///
/// No re-encoding, for speed and fidelity of the chunk boundary.
pub fn extract_segment(input: &Path, output: &Path, start: f64, end: f64) -> Result<()> {
    let duration = end - start;
    if duration <= 0.0 {
        return Err(MediascribeError::ExternalOperation(
            "Segment duration is zero".to_string(),
        ));
    }

    let start_secs = format!("{start:.3}");
    let duration_secs = format!("{duration:.3}");

    debug!("Extracting segment: start={start_secs}, duration={duration_secs}");

    let output_result = Command::new("ffmpeg")
        .args(["-y", "-ss"])
        .arg(&start_secs)
        .arg("-t")
        .arg(&duration_secs)
        .arg("-i")
        .arg(input)
        .args(["-c", "copy"])
        .arg(output)
        .output()
        .map_err(|e| MediascribeError::ExternalOperation(format!("Failed to run FFmpeg: {e}")))?;

    if !output_result.status.success() {
        let stderr = String::from_utf8_lossy(&output_result.stderr);
        return Err(MediascribeError::ExternalOperation(format!(
            "FFmpeg segment extraction failed: {}",
            stderr.trim()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ffmpeg_available() -> bool {
        Command::new("ffmpeg")
            .arg("-version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[test]
    fn test_check_ffmpeg() {
        if !ffmpeg_available() {
            eprintln!("Skipping test: FFmpeg not available");
            return;
        }
        assert!(check_ffmpeg().is_ok());
    }

    #[tokio::test]
    async fn test_extract_audio_missing_input() {
        let mut monitor = ProgressMonitor::new(0.0);
        let result = extract_audio(
            Path::new("/nonexistent/file.mp4"),
            Path::new("/tmp/out.wav"),
            0.0,
            &mut monitor,
            |_| {},
        )
        .await;

        match result {
            Err(MediascribeError::MissingInput(path)) => {
                assert!(path.contains("nonexistent"));
            }
            other => panic!("Expected MissingInput error, got: {other:?}"),
        }
    }

    #[test]
    fn test_extract_segment_rejects_empty_range() {
        let result = extract_segment(
            Path::new("/tmp/in.wav"),
            Path::new("/tmp/out.wav"),
            10.0,
            10.0,
        );
        assert!(matches!(
            result,
            Err(MediascribeError::ExternalOperation(_))
        ));
    }
}
