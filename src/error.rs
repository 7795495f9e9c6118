use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediascribeError {
    #[error("Input file not found: {0}")]
    MissingInput(String),

    #[error("External operation failed: {0}")]
    ExternalOperation(String),

    #[error("Chunk {index} extraction failed after {completed} completed chunks: {reason}")]
    ChunkExtraction {
        index: usize,
        completed: usize,
        reason: String,
    },

    #[error("Chunk {index} transcription failed: {reason}")]
    ChunkTranscription { index: usize, reason: String },

    #[error("Inference backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MediascribeError>;
