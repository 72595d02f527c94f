pub mod assemble;
pub mod download;
pub mod tone;

pub use assemble::{assemble_segments, check_ffmpeg, cleanup_segments};
pub use download::{audio_extension_for_url, download_audio};
pub use tone::{mock_tone, ToneConfig};

use std::path::PathBuf;

/// Sample rate of assembled output and mock tones.
pub const OUTPUT_SAMPLE_RATE: u32 = 44_100;

/// Channel count of assembled output and mock tones.
pub const OUTPUT_CHANNELS: u16 = 2;

/// Synthesized audio for one chunk, stored on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Index of the chunk this audio was produced from.
    pub index: usize,
    pub path: PathBuf,
}
