use std::f32::consts::PI;
use std::path::Path;
use std::time::Duration;

use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::debug;

use crate::error::{Doc2SpeechError, Result};

use super::{OUTPUT_CHANNELS, OUTPUT_SAMPLE_RATE};

/// Placeholder tone written instead of synthesized speech in mock mode.
#[derive(Debug, Clone)]
pub struct ToneConfig {
    pub duration: Duration,
    pub frequency: f32,
    /// Peak amplitude, 0.0 to 1.0.
    pub amplitude: f32,
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_millis(1200),
            frequency: 440.0,
            amplitude: 0.3,
        }
    }
}

/// Write a sine tone as a 16-bit stereo WAV file.
pub fn mock_tone(output: &Path, config: &ToneConfig) -> Result<()> {
    let spec = WavSpec {
        channels: OUTPUT_CHANNELS,
        sample_rate: OUTPUT_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let to_err = |e: hound::Error| {
        Doc2SpeechError::Assembly(format!(
            "Failed to write mock tone {}: {e}",
            output.display()
        ))
    };

    let mut writer = WavWriter::create(output, spec).map_err(to_err)?;

    let frames = (config.duration.as_millis() * OUTPUT_SAMPLE_RATE as u128 / 1000) as usize;
    let amplitude = config.amplitude.clamp(0.0, 1.0) * i16::MAX as f32;

    for n in 0..frames {
        let t = n as f32 / OUTPUT_SAMPLE_RATE as f32;
        let sample = (amplitude * (2.0 * PI * config.frequency * t).sin()) as i16;
        for _ in 0..OUTPUT_CHANNELS {
            writer.write_sample(sample).map_err(to_err)?;
        }
    }

    writer.finalize().map_err(to_err)?;

    debug!(
        "Wrote {:.1}s mock tone to {}",
        config.duration.as_secs_f64(),
        output.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::WavReader;

    #[test]
    fn test_mock_tone_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mock.wav");

        mock_tone(&path, &ToneConfig::default()).unwrap();

        let reader = WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.sample_rate, 44_100);
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.bits_per_sample, 16);
        // 1.2s of frames
        assert_eq!(reader.duration(), 52_920);
    }

    #[test]
    fn test_mock_tone_is_not_silent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mock.wav");

        mock_tone(
            &path,
            &ToneConfig {
                duration: Duration::from_millis(100),
                ..Default::default()
            },
        )
        .unwrap();

        let mut reader = WavReader::open(&path).unwrap();
        let peak = reader
            .samples::<i16>()
            .map(|s| s.unwrap().unsigned_abs())
            .max()
            .unwrap();
        assert!(peak > 9000);
    }

    #[test]
    fn test_mock_tone_bad_path() {
        let result = mock_tone(
            Path::new("/nonexistent/dir/mock.wav"),
            &ToneConfig::default(),
        );
        assert!(result.is_err());
    }
}
