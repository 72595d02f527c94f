use anyhow::{Context, Result};
use clap::Parser;
use doc2speech::config::Config;
use doc2speech::interactive::run_interactive_wizard;
use doc2speech::job::MemoryStatusStore;
use doc2speech::pipeline::{generate_audio_with_cancel, print_summary, PipelineConfig};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "doc2speech")]
#[command(version, about = "Turn documents into narrated audio")]
#[command(long_about = "Convert .txt, .docx or .pdf documents into a single narrated MP3 using the VibeVoice text-to-speech service. Runs an interactive wizard when no input is given.")]
struct Cli {
    /// Input document (.txt, .docx, .pdf)
    input: Option<PathBuf>,

    /// Voice preset (see --list-voices)
    #[arg(short, long)]
    preset: Option<String>,

    /// Directory the finished audio is stored in
    #[arg(long)]
    storage_dir: Option<PathBuf>,

    /// Generate placeholder tones instead of calling the speech service
    #[arg(long)]
    mock: bool,

    /// List the configured voice presets and exit
    #[arg(long)]
    list_voices: bool,

    /// Print the final job status as JSON
    #[arg(long)]
    status_json: bool,

    /// Disable progress bars
    #[arg(long)]
    no_progress: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

fn list_voices(config: &Config) {
    let fallback = config.fallback_preset();
    println!("Available voice presets:");
    for preset in config.presets() {
        if preset == fallback {
            println!("  {} (fallback)", preset);
        } else {
            println!("  {}", preset);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let (input, mut config, mut pipeline_config) = match cli.input {
        Some(input) => {
            let config = Config::load().context("Failed to load configuration")?;
            let pipeline_config = PipelineConfig {
                preset: cli.preset.clone(),
                show_progress: !cli.no_progress,
                ..Default::default()
            };
            (Some(input), config, pipeline_config)
        }
        None if cli.list_voices => {
            let config = Config::load().context("Failed to load configuration")?;
            (None, config, PipelineConfig::default())
        }
        None => {
            let wizard = run_interactive_wizard()?;
            (Some(wizard.input), wizard.config, wizard.pipeline_config)
        }
    };

    if cli.mock {
        config.mock_tts = true;
    }
    if let Some(dir) = cli.storage_dir {
        config.storage_dir = dir;
    }
    if cli.no_progress {
        pipeline_config.show_progress = false;
    }

    config.validate().context("Configuration validation failed")?;

    if cli.list_voices {
        list_voices(&config);
        return Ok(());
    }

    let Some(input) = input else {
        anyhow::bail!("No input document given");
    };

    // Validate input file exists
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }

    info!("Input:    {}", input.display());
    info!("Storage:  {}", config.storage_dir.display());
    if config.should_mock() {
        info!("Mode:     mock (placeholder tones)");
    }

    let cancelled = Arc::new(AtomicBool::new(false));
    let handler_flag = cancelled.clone();
    ctrlc::set_handler(move || {
        warn!("Interrupt received, stopping after the current chunk...");
        handler_flag.store(true, Ordering::Relaxed);
    })
    .context("Failed to install Ctrl+C handler")?;

    let status_store = Arc::new(MemoryStatusStore::new());
    let job_id = pipeline_config.job_id.clone();
    status_store.enqueue(&job_id);

    let result = generate_audio_with_cancel(
        &input,
        &config,
        pipeline_config,
        status_store.clone(),
        cancelled,
    )
    .await;

    if cli.status_json {
        if let Some(status) = status_store.get(&job_id) {
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    let result = result.context("Narration failed")?;
    if !cli.status_json {
        print_summary(&result);
    }

    Ok(())
}
