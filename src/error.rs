use thiserror::Error;

#[derive(Error, Debug)]
pub enum Doc2SpeechError {
    #[error("Preset rejected: {0}")]
    Validation(String),

    #[error("Speech service unavailable: {0}")]
    Transient(String),

    #[error("Unexpected speech service response: {0}")]
    ResponseShape(String),

    #[error("Audio assembly failed: {0}")]
    Assembly(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to parse document: {0}")]
    DocumentParse(String),

    #[error("Document contains no speakable text")]
    EmptyDocument,

    #[error("Audio download failed: {0}")]
    Download(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Job cancelled")]
    Cancelled,

    #[error("Job timed out after {0}s")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Doc2SpeechError {
    /// Short message suitable for a job's terminal status: the last
    /// non-empty line of the error text.
    pub fn status_message(&self) -> String {
        let full = self.to_string();
        full.lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("Unknown error")
            .to_string()
    }
}

pub type Result<T> = std::result::Result<T, Doc2SpeechError>;
