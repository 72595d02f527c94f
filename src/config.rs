use crate::error::{Doc2SpeechError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default VibeVoice endpoint on fal.ai.
pub const DEFAULT_FAL_URL: &str = "https://fal.run/fal-ai/vibevoice";

/// Voice presets offered when none are configured.
pub const DEFAULT_PRESETS: &[&str] = &[
    "Frank [EN]",
    "Emma [EN]",
    "Alice [EN]",
    "Morgan [EN]",
    "James [EN]",
    "Olivia [EN]",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub fal_key: Option<String>,
    pub fal_url: String,
    pub mock_tts: bool,
    pub presets: Vec<String>,
    pub fallback_preset: Option<String>,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_jitter_ms: u64,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub download_timeout_secs: u64,
    pub tmp_dir: PathBuf,
    pub storage_dir: PathBuf,
    pub job_timeout_secs: u64,
    pub min_chars: usize,
    pub max_chars: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fal_key: None,
            fal_url: DEFAULT_FAL_URL.to_string(),
            mock_tts: false,
            presets: DEFAULT_PRESETS.iter().map(|p| p.to_string()).collect(),
            fallback_preset: None,
            max_attempts: 5,
            base_delay_ms: 1000,
            max_jitter_ms: 500,
            connect_timeout_secs: 10,
            read_timeout_secs: 120,
            download_timeout_secs: 600,
            tmp_dir: PathBuf::from("tmp"),
            storage_dir: PathBuf::from("storage"),
            job_timeout_secs: 1800,
            min_chars: 400,
            max_chars: 700,
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
                config = toml::from_str::<Config>(&contents).map_err(|e| {
                    Doc2SpeechError::Config(format!(
                        "Failed to parse {}: {e}",
                        config_path.display()
                    ))
                })?;
            }
        }

        // Override with environment variables
        config.apply_env(|name| std::env::var(name).ok());
        if config.api_key().is_none() {
            config.fal_key = None;
        }

        Ok(config)
    }

    /// Apply overrides from a variable lookup. Unparseable numbers are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("FAL_KEY").filter(|k| !k.trim().is_empty()) {
            self.fal_key = Some(key);
        }
        if let Some(url) = lookup("FAL_URL") {
            self.fal_url = url;
        }
        if let Some(flag) = lookup("MOCK_TTS") {
            self.mock_tts = matches!(flag.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(presets) = lookup("PRESETS") {
            let parsed: Vec<String> = presets
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect();
            if !parsed.is_empty() {
                self.presets = parsed;
            }
        }
        if let Some(fallback) = lookup("FALLBACK_PRESET").filter(|f| !f.trim().is_empty()) {
            self.fallback_preset = Some(fallback.trim().to_string());
        }
        if let Some(dir) = lookup("TMP_DIR") {
            self.tmp_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("STORAGE_DIR") {
            self.storage_dir = PathBuf::from(dir);
        }

        let numeric = |name: &str| lookup(name).and_then(|v| v.trim().parse::<u64>().ok());
        if let Some(n) = numeric("FAL_MAX_ATTEMPTS").and_then(|n| u32::try_from(n).ok()) {
            self.max_attempts = n;
        }
        if let Some(n) = numeric("FAL_CONNECT_TIMEOUT") {
            self.connect_timeout_secs = n;
        }
        if let Some(n) = numeric("FAL_READ_TIMEOUT") {
            self.read_timeout_secs = n;
        }
        if let Some(n) = numeric("TTS_JOB_TIMEOUT") {
            self.job_timeout_secs = n;
        }
        if let Some(n) = numeric("CHUNK_MIN_CHARS").and_then(|n| usize::try_from(n).ok()) {
            self.min_chars = n;
        }
        if let Some(n) = numeric("CHUNK_MAX_CHARS").and_then(|n| usize::try_from(n).ok()) {
            self.max_chars = n;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.presets.is_empty() {
            return Err(Doc2SpeechError::Config(
                "At least one voice preset must be configured".to_string(),
            ));
        }

        if let Some(ref fallback) = self.fallback_preset {
            if !self.presets.contains(fallback) {
                return Err(Doc2SpeechError::Config(format!(
                    "Fallback preset '{}' is not in the preset list",
                    fallback
                )));
            }
        }

        if self.max_chars == 0 {
            return Err(Doc2SpeechError::Config(
                "CHUNK_MAX_CHARS must be greater than 0".to_string(),
            ));
        }

        if self.min_chars > self.max_chars {
            return Err(Doc2SpeechError::Config(format!(
                "CHUNK_MIN_CHARS ({}) exceeds CHUNK_MAX_CHARS ({})",
                self.min_chars, self.max_chars
            )));
        }

        if self.max_attempts == 0 {
            return Err(Doc2SpeechError::Config(
                "FAL_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// The allow-list of voice presets, in declaration order.
    pub fn presets(&self) -> &[String] {
        &self.presets
    }

    /// The explicitly configured fallback, else the first declared preset.
    pub fn fallback_preset(&self) -> &str {
        self.fallback_preset
            .as_deref()
            .or_else(|| self.presets.first().map(String::as_str))
            .unwrap_or(DEFAULT_PRESETS[0])
    }

    /// Audio is mocked when forced, or when no API key is available.
    pub fn should_mock(&self) -> bool {
        self.mock_tts || self.api_key().is_none()
    }

    /// The configured API key, ignoring blank values.
    pub fn api_key(&self) -> Option<&str> {
        self.fal_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("doc2speech").join("config.toml"))
    }
}
