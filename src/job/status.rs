use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Started,
    Finished,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Finished | JobState::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Queued => write!(f, "queued"),
            JobState::Started => write!(f, "started"),
            JobState::Finished => write!(f, "finished"),
            JobState::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    pub total_chunks: usize,
    pub processed_chunks: usize,
}

/// Status record as exposed to pollers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: String,
    pub status: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_chunks: Option<usize>,
}

impl JobStatus {
    pub fn queued(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobState::Queued,
            audio_url: None,
            error: None,
            total_chunks: None,
            processed_chunks: None,
        }
    }

    /// Fold an update into this record.
    ///
    /// Progress never moves backwards and terminal states are final.
    pub fn apply(&mut self, update: &JobUpdate) {
        if self.status.is_terminal() {
            return;
        }

        match update {
            JobUpdate::Started { total_chunks } => {
                self.status = JobState::Started;
                self.total_chunks = Some(*total_chunks);
                self.processed_chunks = Some(0);
            }
            JobUpdate::Progress(progress) => {
                self.status = JobState::Started;
                self.total_chunks = Some(progress.total_chunks);
                let current = self.processed_chunks.unwrap_or(0);
                self.processed_chunks = Some(current.max(progress.processed_chunks));
            }
            JobUpdate::Finished { audio_url } => {
                self.status = JobState::Finished;
                self.audio_url = Some(audio_url.clone());
            }
            JobUpdate::Failed { error } => {
                self.status = JobState::Failed;
                self.error = Some(error.clone());
            }
        }
    }
}

/// Messages a running job sends to its status sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobUpdate {
    Started { total_chunks: usize },
    Progress(JobProgress),
    Finished { audio_url: String },
    Failed { error: String },
}

/// Where job status is published.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn send(&self, job_id: &str, update: JobUpdate);
}

/// In-process status store, keyed by job id.
///
/// Entries are kept until [`MemoryStatusStore::remove`] is called, so a
/// long-lived process should remove jobs once their terminal status is read.
#[derive(Debug, Default)]
pub struct MemoryStatusStore {
    jobs: Mutex<HashMap<String, JobStatus>>,
    history: Mutex<Vec<(String, JobUpdate)>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job before it starts.
    pub fn enqueue(&self, job_id: &str) -> JobStatus {
        let status = JobStatus::queued(job_id);
        self.jobs.lock().insert(job_id.to_string(), status.clone());
        status
    }

    pub fn get(&self, job_id: &str) -> Option<JobStatus> {
        self.jobs.lock().get(job_id).cloned()
    }

    /// Drop a job's status and update history, returning its last status.
    pub fn remove(&self, job_id: &str) -> Option<JobStatus> {
        self.history.lock().retain(|(id, _)| id != job_id);
        self.jobs.lock().remove(job_id)
    }

    /// Every update received for `job_id`, in arrival order.
    pub fn updates(&self, job_id: &str) -> Vec<JobUpdate> {
        self.history
            .lock()
            .iter()
            .filter(|(id, _)| id == job_id)
            .map(|(_, update)| update.clone())
            .collect()
    }
}

#[async_trait]
impl StatusSink for MemoryStatusStore {
    async fn send(&self, job_id: &str, update: JobUpdate) {
        debug!(job_id, ?update, "Job status update");

        self.jobs
            .lock()
            .entry(job_id.to_string())
            .or_insert_with(|| JobStatus::queued(job_id))
            .apply(&update);
        self.history.lock().push((job_id.to_string(), update));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(processed: usize, total: usize) -> JobUpdate {
        JobUpdate::Progress(JobProgress {
            total_chunks: total,
            processed_chunks: processed,
        })
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let store = MemoryStatusStore::new();
        assert_eq!(store.enqueue("job-1").status, JobState::Queued);

        store.send("job-1", JobUpdate::Started { total_chunks: 2 }).await;
        let status = store.get("job-1").unwrap();
        assert_eq!(status.status, JobState::Started);
        assert_eq!(status.processed_chunks, Some(0));

        store.send("job-1", progress(1, 2)).await;
        store.send("job-1", progress(2, 2)).await;
        store
            .send(
                "job-1",
                JobUpdate::Finished {
                    audio_url: "/files/out.mp3".to_string(),
                },
            )
            .await;

        let status = store.get("job-1").unwrap();
        assert_eq!(status.status, JobState::Finished);
        assert_eq!(status.audio_url.as_deref(), Some("/files/out.mp3"));
        assert_eq!(status.processed_chunks, Some(2));
        assert_eq!(store.updates("job-1").len(), 4);
    }

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let store = MemoryStatusStore::new();
        store.send("job", progress(3, 5)).await;
        store.send("job", progress(2, 5)).await;
        assert_eq!(store.get("job").unwrap().processed_chunks, Some(3));
    }

    #[tokio::test]
    async fn test_terminal_state_is_final() {
        let store = MemoryStatusStore::new();
        store
            .send(
                "job",
                JobUpdate::Failed {
                    error: "boom".to_string(),
                },
            )
            .await;
        store.send("job", progress(1, 1)).await;

        let status = store.get("job").unwrap();
        assert_eq!(status.status, JobState::Failed);
        assert_eq!(status.error.as_deref(), Some("boom"));
        assert_eq!(status.processed_chunks, None);
    }

    #[test]
    fn test_status_serialization_omits_empty_fields() {
        let status = JobStatus::queued("abc");
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json, serde_json::json!({"job_id": "abc", "status": "queued"}));
    }

    #[test]
    fn test_unknown_job() {
        let store = MemoryStatusStore::new();
        assert!(store.get("missing").is_none());
        assert!(store.updates("missing").is_empty());
    }

    #[tokio::test]
    async fn test_remove_prunes_job() {
        let store = MemoryStatusStore::new();
        store.send("done", JobUpdate::Started { total_chunks: 1 }).await;
        store.send("other", JobUpdate::Started { total_chunks: 2 }).await;

        let removed = store.remove("done").unwrap();
        assert_eq!(removed.status, JobState::Started);
        assert!(store.get("done").is_none());
        assert!(store.updates("done").is_empty());
        assert_eq!(store.updates("other").len(), 1);
        assert!(store.remove("done").is_none());
    }
}
