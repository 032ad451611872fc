use crate::error::IndexError;
use crate::index::{Index, IndexFile};
use crate::traits::IndexStore;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::info;

/// Stores each index as one JSON document; the id is the file path,
/// resolved against `root` when relative.
#[derive(Debug, Clone, Default)]
pub struct JsonFileStore {
    root: Option<PathBuf>,
}

impl JsonFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, id: &str) -> PathBuf {
        match &self.root {
            Some(root) => root.join(id),
            None => PathBuf::from(id),
        }
    }
}

#[async_trait]
impl IndexStore for JsonFileStore {
    async fn load(&self, id: &str) -> Result<Index, IndexError> {
        let path = self.resolve(id);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                return Err(IndexError::NotFound(path.display().to_string()));
            }
            Err(error) => return Err(IndexError::Io(error)),
        };

        let file: IndexFile = serde_json::from_slice(&raw)?;
        let index = Index::try_from(file)?;
        info!(path = %path.display(), chunk_count = index.len(), "loaded index");
        Ok(index)
    }

    async fn save(&self, id: &str, index: &Index) -> Result<(), IndexError> {
        let path = self.resolve(id);
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let payload = serde_json::to_vec(index)?;
        write_atomically(&path, &payload).await?;
        info!(path = %path.display(), chunk_count = index.len(), "saved index");
        Ok(())
    }
}

async fn write_atomically(path: &Path, payload: &[u8]) -> Result<(), IndexError> {
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    let staging = PathBuf::from(staging);

    tokio::fs::write(&staging, payload).await?;
    tokio::fs::rename(&staging, path).await?;
    Ok(())
}
