use crate::config::DEFAULT_FAL_URL;
use crate::speech::{RetryPolicy, SynthesisOutcome, SynthesisResult, Synthesizer};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Failure of a single HTTP attempt.
#[derive(Debug)]
enum AttemptError {
    /// Rejected request; retrying with the same preset cannot help.
    Validation(String),
    /// Worth another attempt.
    Transient(String),
    /// Success status but no usable audio URL.
    Shape(String),
}

/// VibeVoice text-to-speech client (fal.ai).
pub struct VibeVoiceClient {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    presets: Vec<String>,
    retry: RetryPolicy,
}

impl VibeVoiceClient {
    /// Create a new client with the given API key.
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            endpoint: DEFAULT_FAL_URL.to_string(),
            presets: Vec::new(),
            retry: RetryPolicy::default(),
        }
    }

    /// Set the synthesis endpoint URL.
    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Restrict requests to an allow-list of presets. Empty disables the check.
    pub fn with_presets(mut self, presets: Vec<String>) -> Self {
        self.presets = presets;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set connect and overall request timeouts.
    pub fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        match reqwest::Client::builder()
            .connect_timeout(connect)
            .timeout(read)
            .build()
        {
            Ok(client) => self.client = client,
            Err(e) => warn!("Keeping default HTTP client, timeouts not applied: {}", e),
        }
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Make one request and classify the response.
    async fn call_api(&self, script: &str, preset: &str) -> Result<SynthesisResult, AttemptError> {
        let request = SynthesisRequest {
            script,
            speakers: vec![SpeakerSpec { preset }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Key {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| AttemptError::Transient(format!("request failed: {e}")))?;

        let status = response.status();
        debug!("VibeVoice response status: {}", status);

        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNPROCESSABLE_ENTITY {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptError::Validation(format!(
                "{} from VibeVoice (possible unsupported preset '{}'): {}",
                status.as_u16(),
                preset,
                error_message(&body)
            )));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptError::Transient(format!(
                "VibeVoice error ({}): {}",
                status,
                error_message(&body)
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AttemptError::Transient(format!("failed to read response body: {e}")))?;
        debug!(
            "VibeVoice response: {}",
            body.chars().take(500).collect::<String>()
        );

        parse_audio_url(&body)
            .map(|audio_url| SynthesisResult { audio_url })
            .ok_or_else(|| AttemptError::Shape("VibeVoice response missing audio URL".to_string()))
    }
}

#[async_trait]
impl Synthesizer for VibeVoiceClient {
    async fn synthesize(&self, script: &str, preset: &str) -> SynthesisOutcome {
        if !self.presets.is_empty() && !self.presets.iter().any(|p| p == preset) {
            return SynthesisOutcome::ValidationFailure(format!(
                "Preset '{}' is not in allowed presets list",
                preset
            ));
        }

        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match self.call_api(script, preset).await {
                Ok(result) => {
                    debug!(attempt, preset, "VibeVoice synthesis succeeded");
                    return SynthesisOutcome::Success(result);
                }
                Err(AttemptError::Validation(msg)) => {
                    return SynthesisOutcome::ValidationFailure(msg);
                }
                Err(AttemptError::Shape(msg)) => {
                    return SynthesisOutcome::ShapeFailure(msg);
                }
                Err(AttemptError::Transient(msg)) => {
                    if attempt < max_attempts {
                        let delay = self.retry.delay_after(attempt);
                        warn!(
                            "VibeVoice request failed (attempt {}/{}, preset={}): {}; retrying in {:.1}s",
                            attempt,
                            max_attempts,
                            preset,
                            msg,
                            delay.as_secs_f64()
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last_error = msg;
                }
            }
        }

        SynthesisOutcome::TransientFailure {
            attempts: max_attempts,
            message: last_error,
        }
    }

    fn name(&self) -> &'static str {
        "VibeVoice"
    }
}

/// Pull a readable message out of an error body.
fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["error", "detail"] {
            match value.get(key) {
                Some(serde_json::Value::String(s)) => return s.clone(),
                Some(serde_json::Value::Null) | None => {}
                Some(other) => return other.to_string(),
            }
        }
    }
    body.trim().to_string()
}

/// Accept `{"audio": {"url"}}` or `{"audios": [{"url"}, ...]}`.
fn parse_audio_url(body: &str) -> Option<String> {
    let parsed: SynthesisResponse = serde_json::from_str(body).ok()?;

    parsed
        .audio
        .and_then(|a| a.url)
        .filter(|u| !u.is_empty())
        .or_else(|| {
            parsed
                .audios
                .and_then(|list| list.into_iter().next())
                .and_then(|a| a.url)
                .filter(|u| !u.is_empty())
        })
}

// API request/response types

#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    script: &'a str,
    speakers: Vec<SpeakerSpec<'a>>,
}

#[derive(Debug, Serialize)]
struct SpeakerSpec<'a> {
    preset: &'a str,
}

#[derive(Debug, Deserialize)]
struct SynthesisResponse {
    #[serde(default)]
    audio: Option<AudioFile>,
    #[serde(default)]
    audios: Option<Vec<AudioFile>>,
}

#[derive(Debug, Deserialize)]
struct AudioFile {
    #[serde(default)]
    url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_audio() {
        let body = r#"{"audio": {"url": "https://cdn.fal.media/a.mp3", "content_type": "audio/mpeg"}}"#;
        assert_eq!(
            parse_audio_url(body).as_deref(),
            Some("https://cdn.fal.media/a.mp3")
        );
    }

    #[test]
    fn test_parse_audio_list_uses_first() {
        let body = r#"{"audios": [{"url": "https://cdn/1.wav"}, {"url": "https://cdn/2.wav"}]}"#;
        assert_eq!(parse_audio_url(body).as_deref(), Some("https://cdn/1.wav"));
    }

    #[test]
    fn test_parse_missing_url() {
        assert!(parse_audio_url(r#"{"audio": {}}"#).is_none());
        assert!(parse_audio_url(r#"{"audios": []}"#).is_none());
        assert!(parse_audio_url(r#"{"status": "ok"}"#).is_none());
        assert!(parse_audio_url(r#"["https://cdn/a.mp3"]"#).is_none());
        assert!(parse_audio_url("not json").is_none());
    }

    #[test]
    fn test_single_audio_without_url_falls_back_to_list() {
        let body = r#"{"audio": {"url": ""}, "audios": [{"url": "https://cdn/x.mp3"}]}"#;
        assert_eq!(parse_audio_url(body).as_deref(), Some("https://cdn/x.mp3"));
    }

    #[test]
    fn test_error_message_fields() {
        assert_eq!(error_message(r#"{"error": "bad preset"}"#), "bad preset");
        assert_eq!(error_message(r#"{"detail": "invalid"}"#), "invalid");
        assert_eq!(
            error_message(r#"{"detail": [{"msg": "field required"}]}"#),
            r#"[{"msg":"field required"}]"#
        );
        assert_eq!(error_message("  Bad Gateway \n"), "Bad Gateway");
    }

    #[test]
    fn test_request_serialization() {
        let request = SynthesisRequest {
            script: "Speaker 0: Hi.",
            speakers: vec![SpeakerSpec {
                preset: "Frank [EN]",
            }],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"script": "Speaker 0: Hi.", "speakers": [{"preset": "Frank [EN]"}]})
        );
    }

    #[tokio::test]
    async fn test_unknown_preset_rejected_before_request() {
        // Unroutable endpoint: any network call would fail as transient instead
        let client = VibeVoiceClient::new("key".to_string())
            .with_endpoint("http://127.0.0.1:9/".to_string())
            .with_presets(vec!["Frank [EN]".to_string()]);

        let outcome = client.synthesize("Speaker 0: Hi.", "Nobody [EN]").await;
        assert!(matches!(outcome, SynthesisOutcome::ValidationFailure(_)));
    }
}
