use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub source_name: String,
    pub raw_text: String,
}

impl Document {
    pub fn new(source_name: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            raw_text: raw_text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub source_name: String,
    pub chunk_index: u64,
}

/// Per-chunk metadata as stored in the persisted index file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMeta {
    pub source: String,
    #[serde(rename = "chunkId", alias = "chunk_id")]
    pub chunk_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub score: f32,
    pub text: String,
    pub source: String,
    pub chunk_id: u64,
}

#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub chunk_max_chars: usize,
    pub chunk_overlap_chars: usize,
    pub embed_batch_size: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            chunk_max_chars: 1_100,
            chunk_overlap_chars: 200,
            embed_batch_size: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hmo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hmo_card: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
}
