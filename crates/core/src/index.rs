use crate::chunking::{chunk_document, ChunkingConfig};
use crate::embeddings::{dot, l2_normalize, Embedder};
use crate::error::{IndexError, Result};
use crate::models::{ChunkMeta, Document, IndexOptions, SearchHit};
use crate::normalize::html_to_text;
use crate::traits::IndexStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

/// Immutable set of unit-norm chunk vectors with their texts and metadata.
///
/// The three collections are parallel: entry `i` of each describes the same chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "IndexFile")]
pub struct Index {
    vectors: Vec<Vec<f32>>,
    chunks: Vec<String>,
    metas: Vec<ChunkMeta>,
}

#[derive(Deserialize)]
pub(crate) struct IndexFile {
    vectors: Vec<Vec<f32>>,
    chunks: Vec<String>,
    metas: Vec<ChunkMeta>,
}

impl TryFrom<IndexFile> for Index {
    type Error = IndexError;

    fn try_from(file: IndexFile) -> Result<Self> {
        let mut vectors = file.vectors;
        for vector in &mut vectors {
            l2_normalize(vector);
        }
        Index::from_parts(vectors, file.chunks, file.metas)
    }
}

impl Index {
    pub fn from_parts(
        vectors: Vec<Vec<f32>>,
        chunks: Vec<String>,
        metas: Vec<ChunkMeta>,
    ) -> Result<Self> {
        if vectors.len() != chunks.len() || chunks.len() != metas.len() {
            return Err(IndexError::Corrupt(format!(
                "vectors={} chunks={} metas={}",
                vectors.len(),
                chunks.len(),
                metas.len()
            )));
        }

        if let Some(first) = vectors.first() {
            let expected = first.len();
            if let Some(bad) = vectors.iter().find(|vector| vector.len() != expected) {
                return Err(IndexError::Corrupt(format!(
                    "mixed vector dimensions {expected} and {}",
                    bad.len()
                )));
            }
        }

        Ok(Self {
            vectors,
            chunks,
            metas,
        })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.vectors.first().map(Vec::len).unwrap_or(0)
    }

    pub fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }

    pub fn chunks(&self) -> &[String] {
        &self.chunks
    }

    pub fn metas(&self) -> &[ChunkMeta] {
        &self.metas
    }

    /// Embeds `query` and returns the `k` most similar chunks.
    pub async fn search<E>(&self, embedder: &E, query: &str, k: usize) -> Result<Vec<SearchHit>>
    where
        E: Embedder + ?Sized,
    {
        let mut embedded = embedder.embed(&[query.to_string()]).await?;
        if embedded.len() != 1 {
            return Err(IndexError::Embedding(format!(
                "expected one query vector, got {}",
                embedded.len()
            )));
        }
        let mut query_vector = embedded.swap_remove(0);
        l2_normalize(&mut query_vector);
        self.search_vector(&query_vector, k)
    }

    /// Scores every chunk against a unit-norm query vector. Ties keep index order.
    pub fn search_vector(&self, query_vector: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query_vector.len() != self.dimensions() {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions(),
                actual: query_vector.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .map(|vector| dot(vector, query_vector))
            .enumerate()
            .collect();
        scored.sort_by(|left, right| right.1.total_cmp(&left.1));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(position, score)| SearchHit {
                score,
                text: self.chunks[position].clone(),
                source: self.metas[position].source.clone(),
                chunk_id: self.metas[position].chunk_id,
            })
            .collect())
    }
}

/// Normalizes, chunks and embeds `documents` into a new index.
///
/// Documents are processed in source-name order; empty documents contribute
/// no chunks.
/// A set whose documents all lack visible text fails with `IndexError::Build`.
pub async fn build_index<E>(
    mut documents: Vec<Document>,
    embedder: &E,
    options: &IndexOptions,
) -> Result<Index>
where
    E: Embedder + ?Sized,
{
    if documents.is_empty() {
        return Err(IndexError::Build("no input documents".to_string()));
    }

    let config = ChunkingConfig::try_from(options)?;
    documents.sort_by(|left, right| left.source_name.cmp(&right.source_name));

    let mut chunks = Vec::new();
    let mut metas = Vec::new();
    for document in &documents {
        let normalized = html_to_text(&document.raw_text);
        if normalized.is_empty() {
            debug!(source = %document.source_name, "document has no visible text");
            continue;
        }

        for chunk in chunk_document(document, &normalized, config) {
            metas.push(ChunkMeta {
                source: chunk.source_name,
                chunk_id: chunk.chunk_index,
            });
            chunks.push(chunk.text);
        }
    }

    if chunks.is_empty() {
        return Err(IndexError::Build(
            "input documents contain no visible text".to_string(),
        ));
    }

    let vectors = embed_in_batches(embedder, &chunks, options.embed_batch_size).await?;
    info!(
        documents = documents.len(),
        chunk_count = chunks.len(),
        "built index"
    );
    Index::from_parts(vectors, chunks, metas)
}

async fn embed_in_batches<E>(
    embedder: &E,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>>
where
    E: Embedder + ?Sized,
{
    let mut vectors = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size.max(1)) {
        let embedded = embedder.embed(batch).await?;
        if embedded.len() != batch.len() {
            return Err(IndexError::Embedding(format!(
                "embedding count {} doesn't match chunk count {}",
                embedded.len(),
                batch.len()
            )));
        }
        debug!(batch = batch.len(), "embedded batch");
        vectors.extend(embedded.into_iter().map(|mut vector| {
            l2_normalize(&mut vector);
            vector
        }));
    }
    Ok(vectors)
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IndexHealth {
    pub status: &'static str,
    pub chunks: usize,
    pub loaded_at: Option<DateTime<Utc>>,
}

struct Published {
    index: Arc<Index>,
    loaded_at: DateTime<Utc>,
}

/// Slot holding the index a service currently answers from.
///
/// Publishing swaps in a new `Arc`; readers keep whichever index they
/// already cloned, so no lock is held while scoring.
#[derive(Default)]
pub struct IndexHandle {
    current: RwLock<Option<Published>>,
}

impl IndexHandle {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_index(index: Index) -> Self {
        let handle = Self::empty();
        handle.publish(index);
        handle
    }

    pub fn publish(&self, index: Index) {
        let published = Published {
            index: Arc::new(index),
            loaded_at: Utc::now(),
        };
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = Some(published);
    }

    pub fn current(&self) -> Result<Arc<Index>> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        guard
            .as_ref()
            .map(|published| Arc::clone(&published.index))
            .ok_or(IndexError::Unavailable)
    }

    pub fn health(&self) -> IndexHealth {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(published) => IndexHealth {
                status: "ok",
                chunks: published.index.len(),
                loaded_at: Some(published.loaded_at),
            },
            None => IndexHealth {
                status: "degraded",
                chunks: 0,
                loaded_at: None,
            },
        }
    }

    pub async fn search<E>(&self, embedder: &E, query: &str, k: usize) -> Result<Vec<SearchHit>>
    where
        E: Embedder + ?Sized,
    {
        let index = self.current()?;
        index.search(embedder, query, k).await
    }

    /// Loads `id` from `store` and publishes it, returning its chunk count.
    /// On error the previously published index stays in place.
    pub async fn reload_from<S>(&self, store: &S, id: &str) -> Result<usize>
    where
        S: IndexStore + ?Sized,
    {
        let index = store.load(id).await?;
        let chunks = index.len();
        self.publish(index);
        info!(id, chunks, "index published");
        Ok(chunks)
    }
}
