use crate::audio::{
    assemble_segments, audio_extension_for_url, cleanup_segments, download_audio, mock_tone,
    Segment, ToneConfig,
};
use crate::config::DEFAULT_PRESETS;
use crate::error::{Doc2SpeechError, Result};
use crate::job::status::{JobProgress, JobUpdate, StatusSink};
use crate::job::store::ResultStore;
use crate::speech::{build_script, SynthesisOutcome, SynthesisResult, Synthesizer};
use crate::text::Chunk;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How chunk audio is produced.
pub enum SynthesisMode {
    /// Placeholder tones, no network calls.
    Mock(ToneConfig),
    Live(Arc<dyn Synthesizer>),
}

impl SynthesisMode {
    pub fn is_mock(&self) -> bool {
        matches!(self, SynthesisMode::Mock(_))
    }
}

/// What to do with the outcome of a synthesis call.
#[derive(Debug)]
pub enum FallbackDecision {
    Accept(SynthesisResult),
    RetryWithFallback { reason: String },
    Fail(Doc2SpeechError),
}

/// Fallback table: any failure with a non-fallback preset earns one retry
/// with the fallback preset; a failure with the fallback preset is final.
pub fn decide_fallback(
    outcome: SynthesisOutcome,
    preset_used: &str,
    fallback_preset: &str,
) -> FallbackDecision {
    match outcome.into_result() {
        Ok(result) => FallbackDecision::Accept(result),
        Err(e) if preset_used != fallback_preset => FallbackDecision::RetryWithFallback {
            reason: e.to_string(),
        },
        Err(e) => FallbackDecision::Fail(e),
    }
}

/// Runs one job: synthesizes chunks in order, then assembles and stores the result.
pub struct JobRunner {
    job_id: String,
    mode: SynthesisMode,
    fallback_preset: String,
    work_dir: PathBuf,
    http: reqwest::Client,
    store: Arc<dyn ResultStore>,
    sink: Arc<dyn StatusSink>,
    cancelled: Arc<AtomicBool>,
    show_progress: bool,
}

impl JobRunner {
    /// Create a runner writing intermediate files into `work_dir`.
    pub fn new(
        job_id: impl Into<String>,
        mode: SynthesisMode,
        store: Arc<dyn ResultStore>,
        sink: Arc<dyn StatusSink>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            mode,
            fallback_preset: DEFAULT_PRESETS[0].to_string(),
            work_dir: work_dir.into(),
            http: reqwest::Client::new(),
            store,
            sink,
            cancelled: Arc::new(AtomicBool::new(false)),
            show_progress: false,
        }
    }

    pub fn with_fallback_preset(mut self, preset: impl Into<String>) -> Self {
        self.fallback_preset = preset.into();
        self
    }

    /// Share a flag that stops the job between chunks when set.
    pub fn with_cancellation(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = cancelled;
        self
    }

    /// Enable or disable progress bar display.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        match reqwest::Client::builder().timeout(timeout).build() {
            Ok(client) => self.http = client,
            Err(e) => warn!("Keeping default download client: {}", e),
        }
        self
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Process every chunk and return the stored result's URL.
    ///
    /// The first chunk that fails after fallback aborts the run.
    pub async fn run(&self, chunks: &[Chunk], preset: &str, output_name: &str) -> Result<String> {
        let total_chunks = chunks.len();
        let start_time = Instant::now();

        info!(
            job_id = %self.job_id,
            "Processing {} chunks (preset={}, mock={})",
            total_chunks,
            preset,
            self.mode.is_mock()
        );

        self.sink
            .send(&self.job_id, JobUpdate::Started { total_chunks })
            .await;

        let progress_bar = if self.show_progress {
            let pb = ProgressBar::new(total_chunks as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({eta})")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            Some(pb)
        } else {
            None
        };

        let mut segments: Vec<Segment> = Vec::with_capacity(total_chunks);

        for chunk in chunks {
            if self.cancelled.load(Ordering::Relaxed) {
                warn!(job_id = %self.job_id, "Cancelled before chunk {}/{}", chunk.position(), total_chunks);
                cleanup_segments(&segments);
                return Err(Doc2SpeechError::Cancelled);
            }

            let segment = match self.produce_segment(chunk, preset, total_chunks).await {
                Ok(segment) => segment,
                Err(e) => {
                    warn!(job_id = %self.job_id, "Chunk {}/{} failed: {}", chunk.position(), total_chunks, e);
                    if let Some(pb) = &progress_bar {
                        pb.abandon_with_message("Synthesis failed");
                    }
                    cleanup_segments(&segments);
                    return Err(e);
                }
            };
            segments.push(segment);

            self.sink
                .send(
                    &self.job_id,
                    JobUpdate::Progress(JobProgress {
                        total_chunks,
                        processed_chunks: chunk.position(),
                    }),
                )
                .await;

            if let Some(pb) = &progress_bar {
                pb.inc(1);
            }
        }

        if let Some(pb) = progress_bar {
            pb.finish_with_message("Synthesis complete");
        }

        info!(
            "Synthesized {} chunks in {:.2}s",
            total_chunks,
            start_time.elapsed().as_secs_f64()
        );

        let output_path = self.work_dir.join(output_name);
        let assembled = assemble_segments(segments, &output_path).await?;
        self.store.upload(&assembled, output_name).await
    }

    async fn produce_segment(&self, chunk: &Chunk, preset: &str, total: usize) -> Result<Segment> {
        match &self.mode {
            SynthesisMode::Mock(tone) => {
                info!("Mocking chunk {}/{}", chunk.position(), total);
                let path = self.work_dir.join(format!("mock-{:04}.wav", chunk.index));
                let (tone_path, tone) = (path.clone(), tone.clone());
                tokio::task::spawn_blocking(move || mock_tone(&tone_path, &tone))
                    .await
                    .map_err(|e| Doc2SpeechError::Assembly(format!("tone task failed: {e}")))??;
                Ok(Segment {
                    index: chunk.index,
                    path,
                })
            }
            SynthesisMode::Live(synthesizer) => {
                info!(
                    "Generating chunk {}/{} via {} (preset={})",
                    chunk.position(),
                    total,
                    synthesizer.name(),
                    preset
                );
                let result = self
                    .synthesize_chunk(synthesizer.as_ref(), chunk, preset)
                    .await?;

                let ext = audio_extension_for_url(&result.audio_url);
                let path = self
                    .work_dir
                    .join(format!("seg-{:04}.{}", chunk.index, ext));
                download_audio(&self.http, &result.audio_url, &path).await?;

                Ok(Segment {
                    index: chunk.index,
                    path,
                })
            }
        }
    }

    /// Synthesize one chunk, retrying once with the fallback preset on failure.
    pub async fn synthesize_chunk(
        &self,
        synthesizer: &dyn Synthesizer,
        chunk: &Chunk,
        preset: &str,
    ) -> Result<SynthesisResult> {
        let script = build_script(&chunk.text);

        let outcome = synthesizer.synthesize(&script, preset).await;
        debug!(chunk = chunk.index, outcome = outcome.kind(), "Synthesis outcome");

        match decide_fallback(outcome, preset, &self.fallback_preset) {
            FallbackDecision::Accept(result) => Ok(result),
            FallbackDecision::Fail(e) => Err(e),
            FallbackDecision::RetryWithFallback { reason } => {
                warn!(
                    "Preset '{}' failed for chunk {} ({}). Falling back to '{}'",
                    preset,
                    chunk.position(),
                    reason,
                    self.fallback_preset
                );
                synthesizer
                    .synthesize(&script, &self.fallback_preset)
                    .await
                    .into_result()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::status::MemoryStatusStore;
    use crate::job::store::LocalResultStore;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    const FALLBACK: &str = "Frank [EN]";

    /// Synthesizer with a scripted outcome per preset.
    struct MockSynthesizer {
        outcomes: HashMap<String, SynthesisOutcome>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl MockSynthesizer {
        fn new(outcomes: &[(&str, SynthesisOutcome)]) -> Self {
            Self {
                outcomes: outcomes
                    .iter()
                    .map(|(p, o)| (p.to_string(), o.clone()))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn presets_called(&self) -> Vec<String> {
            self.calls.lock().iter().map(|(_, p)| p.clone()).collect()
        }
    }

    #[async_trait]
    impl Synthesizer for MockSynthesizer {
        async fn synthesize(&self, script: &str, preset: &str) -> SynthesisOutcome {
            self.calls
                .lock()
                .push((script.to_string(), preset.to_string()));
            self.outcomes
                .get(preset)
                .cloned()
                .unwrap_or_else(|| SynthesisOutcome::ValidationFailure("unknown preset".into()))
        }

        fn name(&self) -> &'static str {
            "Mock"
        }
    }

    fn success(url: &str) -> SynthesisOutcome {
        SynthesisOutcome::Success(SynthesisResult {
            audio_url: url.to_string(),
        })
    }

    fn chunk(index: usize, text: &str) -> Chunk {
        Chunk {
            index,
            text: text.to_string(),
        }
    }

    fn runner(mode: SynthesisMode, dir: &std::path::Path) -> (JobRunner, Arc<MemoryStatusStore>) {
        let sink = Arc::new(MemoryStatusStore::new());
        let store = Arc::new(LocalResultStore::new(dir.join("storage")));
        let runner = JobRunner::new("job-test", mode, store, sink.clone(), dir)
            .with_fallback_preset(FALLBACK);
        (runner, sink)
    }

    #[test]
    fn test_decide_accepts_success() {
        let decision = decide_fallback(success("u"), "Emma [EN]", FALLBACK);
        assert!(matches!(decision, FallbackDecision::Accept(r) if r.audio_url == "u"));
    }

    #[test]
    fn test_decide_retries_every_failure_kind_once() {
        let failures = [
            SynthesisOutcome::ValidationFailure("422".into()),
            SynthesisOutcome::TransientFailure {
                attempts: 5,
                message: "503".into(),
            },
            SynthesisOutcome::ShapeFailure("no url".into()),
        ];
        for failure in failures {
            assert!(matches!(
                decide_fallback(failure.clone(), "Emma [EN]", FALLBACK),
                FallbackDecision::RetryWithFallback { .. }
            ));
            assert!(matches!(
                decide_fallback(failure, FALLBACK, FALLBACK),
                FallbackDecision::Fail(_)
            ));
        }
    }

    #[tokio::test]
    async fn test_validation_failure_falls_back_once() {
        let dir = tempfile::tempdir().unwrap();
        let synth = MockSynthesizer::new(&[
            ("Emma [EN]", SynthesisOutcome::ValidationFailure("422".into())),
            (FALLBACK, success("https://cdn/fallback.mp3")),
        ]);
        let (runner, _) = runner(SynthesisMode::Mock(ToneConfig::default()), dir.path());

        let result = runner
            .synthesize_chunk(&synth, &chunk(0, "Hello."), "Emma [EN]")
            .await
            .unwrap();

        assert_eq!(result.audio_url, "https://cdn/fallback.mp3");
        assert_eq!(synth.presets_called(), vec!["Emma [EN]", FALLBACK]);
        assert!(synth
            .calls
            .lock()
            .iter()
            .all(|(script, _)| script == "Speaker 0: Hello."));
    }

    #[tokio::test]
    async fn test_fallback_preset_failure_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let synth = MockSynthesizer::new(&[(
            FALLBACK,
            SynthesisOutcome::ValidationFailure("422".into()),
        )]);
        let (runner, _) = runner(SynthesisMode::Mock(ToneConfig::default()), dir.path());

        let result = runner
            .synthesize_chunk(&synth, &chunk(0, "Hello."), FALLBACK)
            .await;

        assert!(matches!(result, Err(Doc2SpeechError::Validation(_))));
        assert_eq!(synth.presets_called(), vec![FALLBACK]);
    }

    #[tokio::test]
    async fn test_fallback_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let synth = MockSynthesizer::new(&[
            (
                "Emma [EN]",
                SynthesisOutcome::TransientFailure {
                    attempts: 5,
                    message: "503".into(),
                },
            ),
            (FALLBACK, SynthesisOutcome::ShapeFailure("no url".into())),
        ]);
        let (runner, _) = runner(SynthesisMode::Mock(ToneConfig::default()), dir.path());

        let result = runner
            .synthesize_chunk(&synth, &chunk(0, "Hello."), "Emma [EN]")
            .await;

        assert!(matches!(result, Err(Doc2SpeechError::ResponseShape(_))));
        assert_eq!(synth.presets_called().len(), 2);
    }

    #[tokio::test]
    async fn test_run_stops_at_first_failed_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let synth = Arc::new(MockSynthesizer::new(&[(
            FALLBACK,
            SynthesisOutcome::ValidationFailure("rejected".into()),
        )]));
        let (runner, sink) = runner(SynthesisMode::Live(synth.clone()), dir.path());

        let chunks = vec![chunk(0, "One."), chunk(1, "Two.")];
        let result = runner.run(&chunks, FALLBACK, "out.mp3").await;

        assert!(matches!(result, Err(Doc2SpeechError::Validation(_))));
        // Second chunk never attempted
        assert_eq!(synth.presets_called(), vec![FALLBACK]);
        assert_eq!(
            sink.updates("job-test"),
            vec![JobUpdate::Started { total_chunks: 2 }]
        );
    }

    #[tokio::test]
    async fn test_run_honours_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        let cancelled = Arc::new(AtomicBool::new(true));
        let (runner, sink) = runner(SynthesisMode::Mock(ToneConfig::default()), dir.path());
        let runner = runner.with_cancellation(cancelled);

        let result = runner.run(&[chunk(0, "One.")], FALLBACK, "out.mp3").await;

        assert!(matches!(result, Err(Doc2SpeechError::Cancelled)));
        assert_eq!(sink.updates("job-test").len(), 1);
        assert!(!dir.path().join("mock-0000.wav").exists());
    }

    #[tokio::test]
    async fn test_run_with_no_chunks_fails_assembly() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, _) = runner(SynthesisMode::Mock(ToneConfig::default()), dir.path());

        let result = runner.run(&[], FALLBACK, "out.mp3").await;
        assert!(matches!(result, Err(Doc2SpeechError::Assembly(_))));
    }

    #[tokio::test]
    async fn test_mock_run_reports_every_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, sink) = runner(SynthesisMode::Mock(ToneConfig::default()), dir.path());

        let chunks = vec![chunk(0, "One."), chunk(1, "Two.")];
        let result = runner.run(&chunks, FALLBACK, "out.mp3").await;

        let progress: Vec<usize> = sink
            .updates("job-test")
            .into_iter()
            .filter_map(|u| match u {
                JobUpdate::Progress(p) => Some(p.processed_chunks),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![1, 2]);
        assert!(!dir.path().join("mock-0000.wav").exists());
        assert!(!dir.path().join("mock-0001.wav").exists());

        // Without FFmpeg the tones are still written, only assembly fails
        match crate::audio::check_ffmpeg().await {
            Ok(()) => assert_eq!(result.unwrap(), "/files/out.mp3"),
            Err(_) => assert!(matches!(result, Err(Doc2SpeechError::Assembly(_)))),
        }
    }
}
