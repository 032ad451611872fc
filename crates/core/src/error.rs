use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index build failed: {0}")]
    Build(String),

    #[error("index not found: {0}")]
    NotFound(String),

    #[error("index not loaded")]
    Unavailable,

    #[error("index data is inconsistent: {0}")]
    Corrupt(String),

    #[error("vector dimension {actual} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("prompt not found: {0}")]
    Prompt(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ServiceError> for IndexError {
    fn from(value: ServiceError) -> Self {
        IndexError::Embedding(value.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("OCR failed: {0}")]
    Ocr(ServiceError),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

pub type Result<T, E = IndexError> = std::result::Result<T, E>;
