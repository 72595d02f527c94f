use crate::config::Config;
use crate::pipeline::{resolve_preset, PipelineConfig};
use crate::text::DocumentFormat;
use console::style;
use dialoguer::{Confirm, FuzzySelect, Input, Select};
use std::fs;
use std::path::{Path, PathBuf};

pub struct InteractiveResult {
    pub input: PathBuf,
    pub config: Config,
    pub pipeline_config: PipelineConfig,
}

pub fn run_interactive_wizard() -> anyhow::Result<InteractiveResult> {
    print_header();

    // Step 1: Check/Setup API Key
    let config = setup_api_key()?;

    // Step 2: Select document
    let input = select_document()?;

    // Step 3: Select voice preset
    let preset = select_preset(&config)?;

    // Step 4: Confirm
    print_summary(&input, &preset, &config);

    if !Confirm::new()
        .with_prompt("Proceed with these settings?")
        .default(true)
        .interact()?
    {
        anyhow::bail!("Cancelled by user");
    }

    println!();

    let pipeline_config = PipelineConfig {
        preset: Some(preset),
        show_progress: true,
        ..Default::default()
    };

    Ok(InteractiveResult {
        input,
        config,
        pipeline_config,
    })
}

fn print_header() {
    println!();
    println!(
        "{}",
        style("╔═══════════════════════════════════════════════════╗").cyan()
    );
    println!(
        "{}",
        style("║         doc2speech - Document Narration           ║").cyan()
    );
    println!(
        "{}",
        style("╚═══════════════════════════════════════════════════╝").cyan()
    );
    println!();
}

fn setup_api_key() -> anyhow::Result<Config> {
    let mut config = Config::load().unwrap_or_default();

    if config.api_key().is_some() {
        println!("{} API key configured", style("✓").green());
        return Ok(config);
    }

    println!("{} FAL_KEY not found", style("!").yellow());
    println!("  Without a key, placeholder tones are generated instead of speech.\n");

    let api_key: String = Input::new()
        .with_prompt("Enter your fal.ai API key (leave empty for mock mode)")
        .allow_empty(true)
        .interact_text()?;

    if api_key.trim().is_empty() {
        config.mock_tts = true;
        return Ok(config);
    }

    config.fal_key = Some(api_key.trim().to_string());

    // Offer to save
    if Confirm::new()
        .with_prompt("Save API key to config file?")
        .default(true)
        .interact()?
    {
        save_config(&config)?;
        println!("{} API key saved to config\n", style("✓").green());
    }

    Ok(config)
}

fn save_config(config: &Config) -> anyhow::Result<()> {
    if let Some(config_path) = Config::config_file_path() {
        if let Some(dir) = config_path.parent() {
            fs::create_dir_all(dir)?;
        }
        let toml_content = toml::to_string_pretty(config)?;
        fs::write(config_path, toml_content)?;
    }
    Ok(())
}

fn select_document() -> anyhow::Result<PathBuf> {
    println!("\n{}", style("Select document:").bold());

    let files = scan_documents(Path::new("."))?;

    if files.is_empty() {
        println!("  No .txt, .docx or .pdf files found in current directory.\n");
        return prompt_path();
    }

    let mut items: Vec<String> = files
        .iter()
        .map(|f| {
            let size = fs::metadata(f)
                .map(|m| format_size(m.len()))
                .unwrap_or_else(|_| "?".to_string());
            format!("{} ({})", f.display(), size)
        })
        .collect();
    items.push("Enter custom path...".to_string());

    let selection = FuzzySelect::new()
        .with_prompt("Choose a document")
        .items(&items)
        .default(0)
        .interact()?;

    if selection == files.len() {
        prompt_path()
    } else {
        Ok(files[selection].clone())
    }
}

fn prompt_path() -> anyhow::Result<PathBuf> {
    let path: String = Input::new()
        .with_prompt("Enter file path")
        .interact_text()?;
    let path = PathBuf::from(path.trim());
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }
    Ok(path)
}

fn scan_documents(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_supported_document(&path) {
            files.push(path);
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

fn is_supported_document(path: &Path) -> bool {
    DocumentFormat::from_path(path).is_ok()
}

fn select_preset(config: &Config) -> anyhow::Result<String> {
    let presets = config.presets();
    let fallback = config.fallback_preset();
    let default = presets.iter().position(|p| p == fallback).unwrap_or(0);

    let selection = Select::new()
        .with_prompt("Select voice preset")
        .items(presets)
        .default(default)
        .interact()?;

    Ok(resolve_preset(presets.get(selection).map(String::as_str), config))
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

fn print_summary(input: &Path, preset: &str, config: &Config) {
    println!("\n{}", style("═══ Summary ═══").bold());
    println!("  Document:  {}", style(input.display()).cyan());
    println!("  Preset:    {}", style(preset).cyan());
    if config.should_mock() {
        println!("  Mode:      {}", style("mock (placeholder tones)").yellow());
    }
    println!("  Storage:   {}", config.storage_dir.display());
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(500), "500 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1024 * 1024), "1.0 MB");
    }

    #[test]
    fn test_supported_documents() {
        assert!(is_supported_document(Path::new("notes.txt")));
        assert!(is_supported_document(Path::new("Memo.DOCX")));
        assert!(is_supported_document(Path::new("paper.pdf")));
        assert!(!is_supported_document(Path::new("movie.mp4")));
    }

    #[test]
    fn test_scan_documents_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.pdf", "a.txt", "c.mp3"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }

        let files = scan_documents(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.pdf"]);
    }
}
