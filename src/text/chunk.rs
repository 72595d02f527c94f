use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::Chunk;

/// Sentence terminator followed by whitespace.
static SENTENCE_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]\s+").expect("valid sentence regex"));

/// Size limits for text chunks, in characters.
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Chunks below this length are only emitted when the next sentence cannot fit.
    pub min_chars: usize,

    /// Upper bound for a chunk, exceeded only by a single oversized sentence.
    pub max_chars: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            min_chars: 400,
            max_chars: 700,
        }
    }
}

impl ChunkConfig {
    pub fn new(min_chars: usize, max_chars: usize) -> Self {
        Self {
            min_chars,
            max_chars,
        }
    }
}

/// Split text into trimmed, non-empty sentences.
///
/// A sentence ends at `.`, `!` or `?` followed by whitespace; the terminator
/// stays with its sentence.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut last_end = 0;

    for mat in SENTENCE_BREAK.find_iter(text) {
        // Terminators are single-byte ASCII
        let sentence = text[last_end..mat.start() + 1].trim();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
        last_end = mat.end();
    }

    let tail = text[last_end..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }

    sentences
}

/// Greedily pack sentences into chunks bounded by `config`.
pub fn split_text(text: &str, config: &ChunkConfig) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut buffer = String::new();
    let mut buffer_chars = 0usize;

    for sentence in split_sentences(text) {
        let sentence_chars = sentence.chars().count();
        let separator = usize::from(!buffer.is_empty());

        if buffer_chars + separator + sentence_chars <= config.max_chars {
            if separator == 1 {
                buffer.push(' ');
            }
            buffer.push_str(sentence);
            buffer_chars += separator + sentence_chars;
            continue;
        }

        if !buffer.is_empty() {
            if buffer_chars < config.min_chars {
                debug!(
                    "Flushing undersized chunk ({} < {} chars) to fit next sentence",
                    buffer_chars, config.min_chars
                );
            }
            chunks.push(std::mem::take(&mut buffer));
        }

        buffer.push_str(sentence);
        buffer_chars = sentence_chars;
    }

    if !buffer.is_empty() {
        chunks.push(buffer);
    }

    chunks.retain(|c| !c.trim().is_empty());
    chunks
}

/// Split text into indexed chunks ready for synthesis.
pub fn plan_chunks(text: &str, config: &ChunkConfig) -> Vec<Chunk> {
    split_text(text, config)
        .into_iter()
        .enumerate()
        .map(|(index, text)| Chunk { index, text })
        .collect()
}
