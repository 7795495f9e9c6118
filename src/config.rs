use crate::error::{MediascribeError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How stage failures inside one file are handled.
///
/// The reference behavior is asymmetric: chunk extraction always aborts the
/// remaining plan, while chunk transcription degrades to an inline error
/// marker and continues. `Strict` makes transcription fail-fast as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    #[default]
    Tolerant,
    Strict,
}

impl std::fmt::Display for Strictness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strictness::Tolerant => write!(f, "tolerant"),
            Strictness::Strict => write!(f, "strict"),
        }
    }
}

impl std::str::FromStr for Strictness {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tolerant" => Ok(Strictness::Tolerant),
            "strict" => Ok(Strictness::Strict),
            _ => Err(format!(
                "Unknown strictness: {}. Use 'tolerant' or 'strict'",
                s
            )),
        }
    }
}

/// When the loaded inference model is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelLifecycle {
    /// Load once, keep for the whole batch. Cheapest for multi-file runs.
    #[default]
    PerBatch,
    /// Release accelerator memory after every file.
    PerFile,
}

impl std::str::FromStr for ModelLifecycle {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "perbatch" | "per-batch" | "batch" => Ok(ModelLifecycle::PerBatch),
            "perfile" | "per-file" | "file" => Ok(ModelLifecycle::PerFile),
            _ => Err(format!(
                "Unknown model lifecycle: {}. Use 'per-batch' or 'per-file'",
                s
            )),
        }
    }
}

/// Input container extensions the pipeline accepts.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "m4a", "mp3", "wav"];

fn default_max_chunk_mb() -> f64 {
    25.0
}

fn default_language() -> String {
    "en".to_string()
}

fn default_boilerplate() -> Vec<String> {
    vec![
        "Thanks for watching".to_string(),
        "Thank you for watching".to_string(),
        "Please subscribe".to_string(),
        "Subtitles by the Amara.org community".to_string(),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the Whisper ggml model file.
    pub model_path: Option<PathBuf>,
    /// Forced transcription language (ISO 639-1 code, never auto-detected).
    #[serde(default = "default_language")]
    pub language: String,
    /// Size ceiling per chunk in megabytes.
    #[serde(default = "default_max_chunk_mb")]
    pub max_chunk_mb: f64,
    /// Failure policy for chunk transcription.
    #[serde(default)]
    pub strictness: Strictness,
    /// When the loaded model is released.
    #[serde(default)]
    pub model_lifecycle: ModelLifecycle,
    /// Known boilerplate phrases stripped from merged transcripts.
    #[serde(default = "default_boilerplate")]
    pub boilerplate_phrases: Vec<String>,
    /// Suppress inference backend diagnostics on stderr.
    #[serde(default = "default_true")]
    pub suppress_backend_logs: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_path: None,
            language: default_language(),
            max_chunk_mb: default_max_chunk_mb(),
            strictness: Strictness::default(),
            model_lifecycle: ModelLifecycle::default(),
            boilerplate_phrases: default_boilerplate(),
            suppress_backend_logs: true,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        // Load from config file if it exists
        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                let contents = std::fs::read_to_string(&config_path)?;
                if let Ok(file_config) = toml::from_str::<Config>(&contents) {
                    config = file_config;
                }
            }
        }

        // Override with environment variables
        if let Ok(path) = std::env::var("MEDIASCRIBE_MODEL") {
            config.model_path = Some(PathBuf::from(path));
        }
        if let Ok(lang) = std::env::var("MEDIASCRIBE_LANGUAGE") {
            config.language = lang;
        }
        if let Ok(mb) = std::env::var("MEDIASCRIBE_MAX_CHUNK_MB") {
            if let Ok(v) = mb.parse() {
                config.max_chunk_mb = v;
            }
        }
        if let Ok(s) = std::env::var("MEDIASCRIBE_STRICTNESS") {
            if let Ok(v) = s.parse() {
                config.strictness = v;
            }
        }
        if let Ok(s) = std::env::var("MEDIASCRIBE_MODEL_LIFECYCLE") {
            if let Ok(v) = s.parse() {
                config.model_lifecycle = v;
            }
        }

        Ok(config)
    }

    /// Validate settings required for a transcription run.
    ///
    /// Audio-only runs skip the model requirement entirely.
    pub fn validate(&self, needs_backend: bool) -> Result<()> {
        if needs_backend && self.model_path.is_none() {
            return Err(MediascribeError::Config(
                "Model path not set. Use --model or export MEDIASCRIBE_MODEL=path/to/ggml-base.bin"
                    .to_string(),
            ));
        }

        if self.max_chunk_mb <= 0.0 {
            return Err(MediascribeError::Config(
                "max_chunk_mb must be greater than 0".to_string(),
            ));
        }

        if self.language.is_empty() {
            return Err(MediascribeError::Config(
                "Language must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("mediascribe").join("config.toml"))
    }
}

/// Check whether the path carries a recognized media extension.
pub fn is_supported_input(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let lower = e.to_lowercase();
            SUPPORTED_EXTENSIONS.contains(&lower.as_str())
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_strictness_parsing() {
        assert_eq!(
            "tolerant".parse::<Strictness>().unwrap(),
            Strictness::Tolerant
        );
        assert_eq!("strict".parse::<Strictness>().unwrap(), Strictness::Strict);
        assert_eq!("STRICT".parse::<Strictness>().unwrap(), Strictness::Strict);
        assert!("lenient".parse::<Strictness>().is_err());
    }

    #[test]
    fn test_model_lifecycle_parsing() {
        assert_eq!(
            "per-batch".parse::<ModelLifecycle>().unwrap(),
            ModelLifecycle::PerBatch
        );
        assert_eq!(
            "per-file".parse::<ModelLifecycle>().unwrap(),
            ModelLifecycle::PerFile
        );
        assert!("per-chunk".parse::<ModelLifecycle>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.language, "en");
        assert_eq!(config.max_chunk_mb, 25.0);
        assert_eq!(config.strictness, Strictness::Tolerant);
        assert_eq!(config.model_lifecycle, ModelLifecycle::PerBatch);
        assert!(config.suppress_backend_logs);
        assert!(!config.boilerplate_phrases.is_empty());
    }

    #[test]
    fn test_validate_missing_model() {
        let config = Config::default();
        assert!(config.validate(true).is_err());
        // Audio-only workflows don't need a backend
        assert!(config.validate(false).is_ok());
    }

    #[test]
    fn test_validate_with_model() {
        let config = Config {
            model_path: Some(PathBuf::from("models/ggml-base.bin")),
            ..Default::default()
        };
        assert!(config.validate(true).is_ok());
    }

    #[test]
    fn test_validate_bad_ceiling() {
        let config = Config {
            max_chunk_mb: 0.0,
            ..Default::default()
        };
        assert!(config.validate(false).is_err());
    }

    #[test]
    fn test_supported_input_extensions() {
        assert!(is_supported_input(Path::new("video.mp4")));
        assert!(is_supported_input(Path::new("VIDEO.MP4")));
        assert!(is_supported_input(Path::new("audio.wav")));
        assert!(!is_supported_input(Path::new("notes.txt")));
        assert!(!is_supported_input(Path::new("noextension")));
    }
}
