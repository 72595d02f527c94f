use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{Doc2SpeechError, Result};

use super::{Segment, OUTPUT_CHANNELS, OUTPUT_SAMPLE_RATE};

/// LAME VBR quality for the assembled MP3.
const MP3_QUALITY: &str = "2";

/// Subprocess killed when its future is dropped (job timeout or cancel).
fn tool_command(program: impl AsRef<OsStr>) -> Command {
    let mut command = Command::new(program);
    command.kill_on_drop(true);
    command
}

/// Check if FFmpeg is installed and accessible.
pub async fn check_ffmpeg() -> Result<()> {
    let output = tool_command("ffmpeg")
        .arg("-version")
        .output()
        .await
        .map_err(|e| {
            Doc2SpeechError::Assembly(format!(
                "FFmpeg not found. Please install FFmpeg and ensure it's in your PATH. Error: {e}"
            ))
        })?;

    if !output.status.success() {
        return Err(Doc2SpeechError::Assembly("FFmpeg check failed".to_string()));
    }

    debug!("FFmpeg is available");
    Ok(())
}

/// Filter graph: conform every input, concatenate in order, normalize loudness.
fn build_filter_graph(inputs: usize) -> String {
    let mut graph = String::new();

    for i in 0..inputs {
        graph.push_str(&format!(
            "[{i}:a]aresample={OUTPUT_SAMPLE_RATE},aformat=sample_fmts=fltp:channel_layouts=stereo[a{i}];"
        ));
    }
    for i in 0..inputs {
        graph.push_str(&format!("[a{i}]"));
    }
    graph.push_str(&format!("concat=n={inputs}:v=0:a=1[joined];[joined]loudnorm[out]"));

    graph
}

/// Concatenate segments in order into one loudness-normalized MP3.
///
/// Segments are consumed: their files are removed whether or not assembly
/// succeeds. An existing file at `destination` is overwritten.
pub async fn assemble_segments(segments: Vec<Segment>, destination: &Path) -> Result<PathBuf> {
    if segments.is_empty() {
        return Err(Doc2SpeechError::Assembly(
            "No input audio segments to concatenate".to_string(),
        ));
    }

    let result = run_ffmpeg(&segments, destination).await;
    cleanup_segments(&segments);
    result?;

    Ok(destination.to_path_buf())
}

async fn run_ffmpeg(segments: &[Segment], destination: &Path) -> Result<()> {
    check_ffmpeg().await?;

    for segment in segments {
        if !segment.path.exists() {
            return Err(Doc2SpeechError::Assembly(format!(
                "Segment {} is missing: {}",
                segment.index,
                segment.path.display()
            )));
        }
    }

    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    info!(
        "Assembling {} segments into {}",
        segments.len(),
        destination.display()
    );

    let mut command = tool_command("ffmpeg");
    command.args(["-y", "-loglevel", "error"]);
    for segment in segments {
        command.arg("-i").arg(&segment.path);
    }
    command
        .arg("-filter_complex")
        .arg(build_filter_graph(segments.len()))
        .args(["-map", "[out]", "-acodec", "libmp3lame"])
        .arg("-ar")
        .arg(OUTPUT_SAMPLE_RATE.to_string())
        .arg("-ac")
        .arg(OUTPUT_CHANNELS.to_string())
        .args(["-q:a", MP3_QUALITY])
        .arg(destination)
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    let output = command
        .output()
        .await
        .map_err(|e| Doc2SpeechError::Assembly(format!("Failed to run FFmpeg: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Doc2SpeechError::Assembly(format!(
            "FFmpeg concat failed: {}",
            stderr.trim()
        )));
    }

    if !destination.exists() {
        return Err(Doc2SpeechError::Assembly(
            "Output file was not created".to_string(),
        ));
    }

    info!("Audio assembled at {}", destination.display());
    Ok(())
}

/// Remove segment files, logging rather than failing on errors.
pub fn cleanup_segments(segments: &[Segment]) {
    for segment in segments {
        if segment.path.exists() {
            if let Err(e) = std::fs::remove_file(&segment.path) {
                warn!(
                    "Failed to remove segment file {}: {}",
                    segment.path.display(),
                    e
                );
            }
        }
    }
}
