use std::path::Path;
use std::process::Command;

use serde::Deserialize;
use tracing::{debug, warn};

/// Structured ffprobe output for the format section.
#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Query the total playback duration of a media file, in seconds.
///
/// Tries a structured metadata query first, then a minimal single-value
/// probe. Never errors: returns 0.0 when the duration cannot be determined,
/// which callers must treat as "cannot compute a percentage, still proceed".
pub fn probe_duration(input: &Path) -> f64 {
    match probe_structured(input) {
        Ok(secs) => return secs,
        Err(reason) => debug!("Structured duration probe failed: {reason}"),
    }

    match probe_fallback(input) {
        Ok(secs) => secs,
        Err(reason) => {
            warn!(
                "Could not determine duration of {}: {reason}",
                input.display()
            );
            0.0
        }
    }
}

/// Primary path: JSON metadata query via ffprobe.
fn probe_structured(input: &Path) -> Result<f64, String> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "json",
        ])
        .arg(input)
        .output()
        .map_err(|e| format!("failed to run ffprobe: {e}"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("ffprobe exited with error: {}", stderr.trim()));
    }

    let parsed: ProbeOutput = serde_json::from_slice(&output.stdout)
        .map_err(|e| format!("unparseable ffprobe output: {e}"))?;

    let duration = parsed
        .format
        .and_then(|f| f.duration)
        .ok_or_else(|| "no duration in format metadata".to_string())?;

    parse_duration_token(&duration)
}

/// Fallback: minimal probe printing a single numeric token on stdout.
fn probe_fallback(input: &Path) -> Result<f64, String> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(input)
        .output()
        .map_err(|e| format!("failed to run ffprobe: {e}"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("ffprobe exited with error: {}", stderr.trim()));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_duration_token(stdout.trim())
}

fn parse_duration_token(token: &str) -> Result<f64, String> {
    let secs: f64 = token
        .trim()
        .parse()
        .map_err(|e| format!("failed to parse duration '{}': {e}", token.trim()))?;

    if secs.is_finite() && secs >= 0.0 {
        Ok(secs)
    } else {
        Err(format!("invalid duration value: {secs}"))
    }
}
