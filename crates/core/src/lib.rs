pub mod answer;
pub mod azure;
pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extraction;
pub mod index;
pub mod ingest;
pub mod models;
pub mod normalize;
pub mod ocr;
pub mod prompts;
pub mod stores;
pub mod traits;
pub mod validation;

pub use answer::{build_context, render_qa_prompt, DEFAULT_QA_PROMPT, QA_PROMPT_FILE};
pub use azure::{AzureOpenAiClient, AzureOpenAiConfig};
pub use chunking::{chunk_document, chunk_text, normalize_whitespace, ChunkingConfig};
pub use embeddings::{l2_normalize, CharacterNgramEmbedder, Embedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{ExtractionError, IndexError, ServiceError};
pub use extraction::{detect_language, strip_code_fences, ExtractionReport, FieldExtractor};
pub use index::{build_index, Index, IndexHandle, IndexHealth};
pub use ingest::{build_index_from_dir, discover_html_files, load_documents_from_dir};
pub use models::{ChatMessage, Chunk, ChunkMeta, Document, IndexOptions, SearchHit, UserProfile};
pub use normalize::html_to_text;
pub use ocr::{DocumentIntelligenceClient, DocumentIntelligenceConfig};
pub use prompts::{load_prompt_or, FilePromptLoader};
pub use stores::{JsonFileStore, MemoryStore};
pub use traits::{ChatCompleter, IndexStore, OcrEngine, PromptLoader};
pub use validation::{form_template, key_paths, validate, ValidationIssue, DATE_FIELDS};
