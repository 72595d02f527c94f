pub mod vibevoice;

pub use vibevoice::VibeVoiceClient;

use crate::config::Config;
use crate::error::Doc2SpeechError;
use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

/// Label prepended to every script line; the service is driven single-speaker.
pub const SPEAKER_LABEL: &str = "Speaker 0: ";

/// Build the script line sent for one chunk.
pub fn build_script(text: &str) -> String {
    format!("{SPEAKER_LABEL}{text}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisResult {
    pub audio_url: String,
}

/// Result of one synthesis call, classified for the caller's fallback logic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisOutcome {
    Success(SynthesisResult),
    /// The preset or request was rejected (400/422, or not in the allow-list).
    ValidationFailure(String),
    /// Network or server errors persisted through every retry.
    TransientFailure { attempts: u32, message: String },
    /// A success status with a body we could not read a URL from.
    ShapeFailure(String),
}

impl SynthesisOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SynthesisOutcome::Success(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SynthesisOutcome::Success(_) => "success",
            SynthesisOutcome::ValidationFailure(_) => "validation",
            SynthesisOutcome::TransientFailure { .. } => "transient",
            SynthesisOutcome::ShapeFailure(_) => "response-shape",
        }
    }

    /// Convert into the crate's typed error space.
    pub fn into_result(self) -> crate::error::Result<SynthesisResult> {
        match self {
            SynthesisOutcome::Success(result) => Ok(result),
            SynthesisOutcome::ValidationFailure(msg) => Err(Doc2SpeechError::Validation(msg)),
            SynthesisOutcome::TransientFailure { attempts, message } => Err(
                Doc2SpeechError::Transient(format!("{message} (after {attempts} attempts)")),
            ),
            SynthesisOutcome::ShapeFailure(msg) => Err(Doc2SpeechError::ResponseShape(msg)),
        }
    }
}

#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize one script line with the given voice preset.
    async fn synthesize(&self, script: &str, preset: &str) -> SynthesisOutcome;
    fn name(&self) -> &'static str;
}

/// Exponential backoff with uniform jitter for transient failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_jitter: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_jitter: Duration::from_millis(config.max_jitter_ms),
        }
    }

    /// Deterministic part of the delay after failed attempt `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .checked_mul(2u32.pow(exponent))
            .unwrap_or(Duration::MAX)
    }

    /// Delay before the attempt following `attempt`, including jitter.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let max_jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if max_jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::rng().random_range(0..max_jitter_ms))
        };
        self.backoff(attempt).saturating_add(jitter)
    }
}

/// Build the live synthesizer, or `None` when audio should be mocked.
pub fn create_synthesizer(config: &Config) -> Option<Arc<dyn Synthesizer>> {
    if config.should_mock() {
        return None;
    }
    let api_key = config.api_key()?.to_string();

    Some(Arc::new(
        VibeVoiceClient::new(api_key)
            .with_endpoint(config.fal_url.clone())
            .with_presets(config.presets.clone())
            .with_retry(RetryPolicy::from_config(config))
            .with_timeouts(
                Duration::from_secs(config.connect_timeout_secs),
                Duration::from_secs(config.read_timeout_secs),
            ),
    ))
}
