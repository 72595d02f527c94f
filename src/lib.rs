pub mod audio;
pub mod config;
pub mod error;
pub mod interactive;
pub mod job;
pub mod pipeline;
pub mod speech;
pub mod text;

pub use config::Config;
pub use error::{Doc2SpeechError, Result};
pub use pipeline::{
    generate_audio, generate_audio_with_cancel, print_summary, PipelineConfig, PipelineResult,
    PipelineStats,
};
