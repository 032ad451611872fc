use crate::error::IndexError;
use crate::models::{Chunk, Document, IndexOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    max_chars: usize,
    overlap_chars: usize,
}

impl ChunkingConfig {
    pub fn new(max_chars: usize, overlap_chars: usize) -> Result<Self, IndexError> {
        if max_chars == 0 {
            return Err(IndexError::InvalidChunkConfig(
                "max_chars must be greater than zero".to_string(),
            ));
        }
        if overlap_chars >= max_chars {
            return Err(IndexError::InvalidChunkConfig(format!(
                "overlap {overlap_chars} must be smaller than max_chars {max_chars}"
            )));
        }
        Ok(Self {
            max_chars,
            overlap_chars,
        })
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    pub fn overlap_chars(&self) -> usize {
        self.overlap_chars
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: 1_100,
            overlap_chars: 200,
        }
    }
}

impl TryFrom<&IndexOptions> for ChunkingConfig {
    type Error = IndexError;

    fn try_from(value: &IndexOptions) -> Result<Self, Self::Error> {
        Self::new(value.chunk_max_chars, value.chunk_overlap_chars)
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Splits `text` into windows of at most `max_chars` characters, each window
/// starting `overlap_chars` before the end of the previous one.
pub fn chunk_text(text: &str, config: ChunkingConfig) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= config.max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + config.max_chars).min(chars.len());
        chunks.push(chars[start..end].iter().collect::<String>());
        if end == chars.len() {
            break;
        }
        start = end.saturating_sub(config.overlap_chars);
    }

    chunks
}

/// Chunks an already-normalized document, numbering chunks from zero.
pub fn chunk_document(document: &Document, normalized: &str, config: ChunkingConfig) -> Vec<Chunk> {
    chunk_text(normalized, config)
        .into_iter()
        .enumerate()
        .map(|(index, text)| Chunk {
            text,
            source_name: document.source_name.clone(),
            chunk_index: index as u64,
        })
        .collect()
}
