pub mod chunk;
pub mod extract;

pub use chunk::{plan_chunks, split_sentences, split_text, ChunkConfig};
pub use extract::{extract_text, DocumentFormat};

/// A span of document text synthesized as one speech request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Zero-based position in the document.
    pub index: usize,
    pub text: String,
}

impl Chunk {
    /// One-based position, as reported in job progress.
    pub fn position(&self) -> usize {
        self.index + 1
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}
