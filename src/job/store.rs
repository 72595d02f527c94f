use crate::error::{Doc2SpeechError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

/// Destination for finished audio.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Store `local_path` and return a public URL or path for it.
    async fn upload(&self, local_path: &Path, suggested_name: &str) -> Result<String>;
}

/// Stores results in a local directory served under a URL prefix.
#[derive(Debug, Clone)]
pub struct LocalResultStore {
    dir: PathBuf,
    url_prefix: String,
}

impl LocalResultStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            url_prefix: "/files".to_string(),
        }
    }

    pub fn with_url_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.url_prefix = prefix.into().trim_end_matches('/').to_string();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// First free path for `name` in the store, adding `_1`, `_2`, ... on collision.
    fn available_path(&self, name: &str) -> PathBuf {
        let candidate = self.dir.join(name);
        if !candidate.exists() {
            return candidate;
        }

        let (stem, ext) = match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
            _ => (name, None),
        };

        (1..)
            .map(|i| match ext {
                Some(ext) => self.dir.join(format!("{stem}_{i}.{ext}")),
                None => self.dir.join(format!("{stem}_{i}")),
            })
            .find(|path| !path.exists())
            .unwrap_or(candidate)
    }
}

#[async_trait]
impl ResultStore for LocalResultStore {
    async fn upload(&self, local_path: &Path, suggested_name: &str) -> Result<String> {
        if !local_path.exists() {
            return Err(Doc2SpeechError::FileNotFound(
                local_path.display().to_string(),
            ));
        }

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            Doc2SpeechError::Storage(format!(
                "Failed to create storage directory {}: {e}",
                self.dir.display()
            ))
        })?;

        let fallback_name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "output.mp3".to_string());
        let base = if suggested_name.trim().is_empty() {
            fallback_name
        } else {
            suggested_name.trim().to_string()
        };
        let safe_name = base.replace(' ', "_");

        let destination = self.available_path(&safe_name);
        tokio::fs::copy(local_path, &destination).await.map_err(|e| {
            Doc2SpeechError::Storage(format!(
                "Failed to copy result to {}: {e}",
                destination.display()
            ))
        })?;

        let stored_name = destination
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or(safe_name);

        info!("Stored result at {}", destination.display());
        Ok(format!("{}/{}", self.url_prefix, stored_name))
    }
}
