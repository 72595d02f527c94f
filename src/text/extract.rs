use std::path::Path;

use docx_rs::{DocumentChild, ParagraphChild, RunChild};
use tracing::{debug, info};

use crate::error::{Doc2SpeechError, Result};

/// Document formats we can read text from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Text,
    Docx,
    Pdf,
}

impl DocumentFormat {
    pub const EXTENSIONS: &'static [&'static str] = &["txt", "docx", "pdf"];

    /// Detect the format from a file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        match ext.as_str() {
            "txt" => Ok(DocumentFormat::Text),
            "docx" => Ok(DocumentFormat::Docx),
            "pdf" => Ok(DocumentFormat::Pdf),
            "" => Err(Doc2SpeechError::UnsupportedFormat(
                "(no extension)".to_string(),
            )),
            other => Err(Doc2SpeechError::UnsupportedFormat(format!(".{other}"))),
        }
    }
}

impl std::fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentFormat::Text => write!(f, "text"),
            DocumentFormat::Docx => write!(f, "docx"),
            DocumentFormat::Pdf => write!(f, "pdf"),
        }
    }
}

/// Extract the plain text of a document.
///
/// This is blocking; run it on a blocking thread from async code.
pub fn extract_text(path: &Path) -> Result<String> {
    let format = DocumentFormat::from_path(path)?;

    if !path.exists() {
        return Err(Doc2SpeechError::FileNotFound(path.display().to_string()));
    }

    info!("Extracting {} text from {}", format, path.display());

    let text = match format {
        DocumentFormat::Text => extract_plain(path)?,
        DocumentFormat::Docx => extract_docx(path)?,
        DocumentFormat::Pdf => extract_pdf(path)?,
    };

    debug!("Extracted {} characters", text.chars().count());
    Ok(text)
}

fn extract_plain(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    // Invalid UTF-8 is dropped rather than rejected
    Ok(String::from_utf8_lossy(&bytes).replace('\u{FFFD}', ""))
}

fn extract_docx(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    let docx = docx_rs::read_docx(&bytes)
        .map_err(|e| Doc2SpeechError::DocumentParse(format!("{}: {e}", path.display())))?;

    let mut paragraphs = Vec::new();
    for child in &docx.document.children {
        if let DocumentChild::Paragraph(paragraph) = child {
            let mut text = String::new();
            for p_child in &paragraph.children {
                if let ParagraphChild::Run(run) = p_child {
                    for r_child in &run.children {
                        match r_child {
                            RunChild::Text(t) => text.push_str(&t.text),
                            RunChild::Tab(_) => text.push(' '),
                            _ => {}
                        }
                    }
                }
            }
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                paragraphs.push(trimmed.to_string());
            }
        }
    }

    Ok(paragraphs.join("\n\n"))
}

fn extract_pdf(path: &Path) -> Result<String> {
    let text = pdf_extract::extract_text(path)
        .map_err(|e| Doc2SpeechError::DocumentParse(format!("{}: {e}", path.display())))?;

    let pages: Vec<&str> = text
        .split('\u{000C}')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    Ok(pages.join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_format_detection() {
        assert_eq!(
            DocumentFormat::from_path(Path::new("a/report.TXT")).unwrap(),
            DocumentFormat::Text
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("memo.docx")).unwrap(),
            DocumentFormat::Docx
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("paper.pdf")).unwrap(),
            DocumentFormat::Pdf
        );
    }

    #[test]
    fn test_unsupported_format() {
        match DocumentFormat::from_path(Path::new("slides.pptx")) {
            Err(Doc2SpeechError::UnsupportedFormat(ext)) => assert_eq!(ext, ".pptx"),
            other => panic!("Expected UnsupportedFormat, got {other:?}"),
        }
        assert!(matches!(
            DocumentFormat::from_path(Path::new("README")),
            Err(Doc2SpeechError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_extract_plain_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        std::fs::write(&path, b"Hello \xFFworld. Bye.").unwrap();

        let text = extract_text(&path).unwrap();
        assert_eq!(text, "Hello world. Bye.");
    }

    #[test]
    fn test_extract_missing_file() {
        let result = extract_text(&PathBuf::from("/nonexistent/doc.txt"));
        assert!(matches!(result, Err(Doc2SpeechError::FileNotFound(_))));
    }

    #[test]
    fn test_unsupported_checked_before_existence() {
        let result = extract_text(&PathBuf::from("/nonexistent/doc.odt"));
        assert!(matches!(result, Err(Doc2SpeechError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_extract_docx_paragraphs() {
        use docx_rs::{Docx, Paragraph, Run};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memo.docx");
        let file = std::fs::File::create(&path).unwrap();
        Docx::new()
            .add_paragraph(Paragraph::new().add_run(Run::new().add_text("First paragraph.")))
            .add_paragraph(Paragraph::new())
            .add_paragraph(Paragraph::new().add_run(Run::new().add_text("Second one.")))
            .build()
            .pack(file)
            .unwrap();

        let text = extract_text(&path).unwrap();
        assert_eq!(text, "First paragraph.\n\nSecond one.");
    }

    #[test]
    fn test_invalid_docx_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.docx");
        std::fs::write(&path, b"not a zip archive").unwrap();

        assert!(matches!(
            extract_text(&path),
            Err(Doc2SpeechError::DocumentParse(_))
        ));
    }
}
