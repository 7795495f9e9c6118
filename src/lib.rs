pub mod config;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod progress;
pub mod transcribe;

pub use config::{Config, ModelLifecycle, Strictness};
pub use error::{MediascribeError, Result};
pub use pipeline::{
    print_summary, process_file, run_batch, BatchStats, FileReport, PipelineOptions,
};
