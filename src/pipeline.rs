use crate::audio::{check_ffmpeg, ToneConfig};
use crate::config::Config;
use crate::error::{Doc2SpeechError, Result};
use crate::job::{JobRunner, JobUpdate, LocalResultStore, StatusSink, SynthesisMode};
use crate::speech::create_synthesizer;
use crate::text::{extract_text, plan_chunks, ChunkConfig};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Configuration for one document-to-speech job.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Identifier under which status is published.
    pub job_id: String,
    /// Requested voice preset; unknown or missing presets use the fallback.
    pub preset: Option<String>,
    /// Show progress bars.
    pub show_progress: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            preset: None,
            show_progress: true,
        }
    }
}

/// Statistics from a finished job.
#[derive(Debug, Clone)]
pub struct PipelineStats {
    /// Total time taken for the entire job.
    pub total_time: Duration,
    /// Time taken to read the document.
    pub extraction_time: Duration,
    /// Time taken for synthesis, assembly and upload.
    pub synthesis_time: Duration,
    /// Characters of text extracted from the document.
    pub characters: usize,
    /// Number of chunks synthesized.
    pub chunks_processed: usize,
    /// Voice preset the job ran with.
    pub preset: String,
    /// Whether placeholder audio was used.
    pub mocked: bool,
}

/// Result of a successful job.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub job_id: String,
    /// Public URL (or path) of the narrated audio.
    pub audio_url: String,
    pub stats: PipelineStats,
}

/// Pick the preset a job runs with.
///
/// Missing, blank or unknown presets are replaced by the fallback preset.
pub fn resolve_preset(requested: Option<&str>, config: &Config) -> String {
    let fallback = config.fallback_preset();

    match requested.map(str::trim).filter(|p| !p.is_empty()) {
        None => fallback.to_string(),
        Some(preset) if config.presets().iter().any(|p| p == preset) => preset.to_string(),
        Some(preset) => {
            warn!(
                "Unknown preset '{}' requested; using fallback '{}'",
                preset, fallback
            );
            fallback.to_string()
        }
    }
}

/// Name for the final audio: document stem plus a short random suffix.
pub fn output_name_for(input: &Path) -> String {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string());
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}.mp3", stem, &suffix[..8])
}

/// Convert a document into narrated audio.
///
/// This is the main entry point. It:
/// 1. Extracts text from the document
/// 2. Splits the text into chunks
/// 3. Synthesizes each chunk in order (or mocks it)
/// 4. Assembles and normalizes the audio
/// 5. Stores the result and publishes the final status
pub async fn generate_audio(
    input: &Path,
    config: &Config,
    pipeline_config: PipelineConfig,
    sink: Arc<dyn StatusSink>,
) -> Result<PipelineResult> {
    let cancelled = Arc::new(AtomicBool::new(false));
    generate_audio_with_cancel(input, config, pipeline_config, sink, cancelled).await
}

/// Convert a document with cancellation support.
///
/// The job's terminal status is always published to `sink`.
pub async fn generate_audio_with_cancel(
    input: &Path,
    config: &Config,
    pipeline_config: PipelineConfig,
    sink: Arc<dyn StatusSink>,
    cancelled: Arc<AtomicBool>,
) -> Result<PipelineResult> {
    let job_id = pipeline_config.job_id.clone();
    let timeout = config.job_timeout();

    let outcome = tokio::time::timeout(
        timeout,
        execute(input, config, &pipeline_config, sink.clone(), cancelled),
    )
    .await
    .unwrap_or_else(|_| Err(Doc2SpeechError::Timeout(timeout.as_secs())));

    match &outcome {
        Ok(result) => {
            sink.send(
                &job_id,
                JobUpdate::Finished {
                    audio_url: result.audio_url.clone(),
                },
            )
            .await;
        }
        Err(e) => {
            warn!(job_id = %job_id, "Job failed: {}", e);
            sink.send(
                &job_id,
                JobUpdate::Failed {
                    error: e.status_message(),
                },
            )
            .await;
        }
    }

    outcome
}

async fn execute(
    input: &Path,
    config: &Config,
    pipeline_config: &PipelineConfig,
    sink: Arc<dyn StatusSink>,
    cancelled: Arc<AtomicBool>,
) -> Result<PipelineResult> {
    let start_time = Instant::now();

    // Validate input file exists
    if !input.exists() {
        return Err(Doc2SpeechError::FileNotFound(input.display().to_string()));
    }

    config.validate()?;

    // Check FFmpeg before spending any synthesis requests
    check_ffmpeg().await.map_err(|_| {
        Doc2SpeechError::Assembly(
            "FFmpeg not found. Install it with: brew install ffmpeg (macOS) or apt install ffmpeg (Linux)".to_string()
        )
    })?;

    let preset = resolve_preset(pipeline_config.preset.as_deref(), config);

    // Job-scoped scratch space, removed on drop
    tokio::fs::create_dir_all(&config.tmp_dir).await?;
    let work_dir = tempfile::Builder::new()
        .prefix("job-")
        .tempdir_in(&config.tmp_dir)?;
    debug!("Using work directory: {:?}", work_dir.path());

    // ═══════════════════════════════════════════════════════════════════════
    // Stage 1: Text Extraction
    // ═══════════════════════════════════════════════════════════════════════
    info!("Stage 1/3: Extracting text from {:?}", input);
    let extraction_start = Instant::now();

    let path: PathBuf = input.to_path_buf();
    let text = tokio::task::spawn_blocking(move || extract_text(&path))
        .await
        .map_err(|e| Doc2SpeechError::DocumentParse(format!("parser task failed: {e}")))??;

    let extraction_time = extraction_start.elapsed();
    let characters = text.chars().count();
    info!(
        "Extracted {} characters in {:.2}s",
        characters,
        extraction_time.as_secs_f64()
    );

    if cancelled.load(Ordering::Relaxed) {
        return Err(Doc2SpeechError::Cancelled);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Stage 2: Chunking
    // ═══════════════════════════════════════════════════════════════════════
    let chunk_config = ChunkConfig::new(config.min_chars, config.max_chars);
    let chunks = plan_chunks(&text, &chunk_config);
    info!(
        "Stage 2/3: Split into {} chunks ({}-{} chars)",
        chunks.len(),
        chunk_config.min_chars,
        chunk_config.max_chars
    );

    if chunks.is_empty() {
        return Err(Doc2SpeechError::EmptyDocument);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Stage 3: Synthesis, Assembly, Upload
    // ═══════════════════════════════════════════════════════════════════════
    let mode = match create_synthesizer(config) {
        Some(synthesizer) => SynthesisMode::Live(synthesizer),
        None => {
            info!("No live speech credentials or mock forced; using placeholder audio");
            SynthesisMode::Mock(ToneConfig::default())
        }
    };
    let mocked = mode.is_mock();
    info!("Stage 3/3: Synthesizing with preset '{}'", preset);
    let synthesis_start = Instant::now();

    let store = Arc::new(LocalResultStore::new(config.storage_dir.clone()));
    let runner = JobRunner::new(
        pipeline_config.job_id.clone(),
        mode,
        store,
        sink,
        work_dir.path(),
    )
    .with_fallback_preset(config.fallback_preset())
    .with_download_timeout(Duration::from_secs(config.download_timeout_secs))
    .with_cancellation(cancelled)
    .with_progress(pipeline_config.show_progress);

    let output_name = output_name_for(input);
    let audio_url = runner.run(&chunks, &preset, &output_name).await?;

    let synthesis_time = synthesis_start.elapsed();

    let stats = PipelineStats {
        total_time: start_time.elapsed(),
        extraction_time,
        synthesis_time,
        characters,
        chunks_processed: chunks.len(),
        preset,
        mocked,
    };

    Ok(PipelineResult {
        job_id: pipeline_config.job_id.clone(),
        audio_url,
        stats,
    })
}

/// Print a summary of the job results.
pub fn print_summary(result: &PipelineResult) {
    println!();
    println!("═══════════════════════════════════════════════════════════════");
    println!("                       Narration Complete                       ");
    println!("═══════════════════════════════════════════════════════════════");
    println!();
    println!("  Audio:      {}", result.audio_url);
    println!("  Job:        {}", result.job_id);
    println!("  Preset:     {}", result.stats.preset);
    println!(
        "  Text:       {} characters in {} chunks",
        result.stats.characters, result.stats.chunks_processed
    );
    if result.stats.mocked {
        println!("  Note:       placeholder tones (mock mode)");
    }
    println!();
    println!("  Timing:");
    println!(
        "    Extract:     {:.2}s",
        result.stats.extraction_time.as_secs_f64()
    );
    println!(
        "    Synthesize:  {:.2}s",
        result.stats.synthesis_time.as_secs_f64()
    );
    println!(
        "    Total:       {:.2}s",
        result.stats.total_time.as_secs_f64()
    );
    println!();
    println!("═══════════════════════════════════════════════════════════════");
}
