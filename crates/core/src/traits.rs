use crate::error::{IndexError, ServiceError};
use crate::index::Index;
use crate::models::ChatMessage;
use async_trait::async_trait;

/// Durable storage for built indexes, keyed by an identifier such as a file path.
#[async_trait]
pub trait IndexStore: Send + Sync {
    async fn load(&self, id: &str) -> Result<Index, IndexError>;

    async fn save(&self, id: &str, index: &Index) -> Result<(), IndexError>;
}

#[async_trait]
pub trait ChatCompleter: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ServiceError>;
}

#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn ocr(&self, document: &[u8], file_name: &str) -> Result<String, ServiceError>;
}

pub trait PromptLoader: Send + Sync {
    fn load_prompt(&self, name: &str) -> Result<String, ServiceError>;
}
