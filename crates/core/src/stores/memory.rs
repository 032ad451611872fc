use crate::error::IndexError;
use crate::index::Index;
use crate::traits::IndexStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

#[derive(Default)]
pub struct MemoryStore {
    indexes: RwLock<HashMap<String, Index>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IndexStore for MemoryStore {
    async fn load(&self, id: &str) -> Result<Index, IndexError> {
        let indexes = self.indexes.read().unwrap_or_else(PoisonError::into_inner);
        indexes
            .get(id)
            .cloned()
            .ok_or_else(|| IndexError::NotFound(id.to_string()))
    }

    async fn save(&self, id: &str, index: &Index) -> Result<(), IndexError> {
        let mut indexes = self.indexes.write().unwrap_or_else(PoisonError::into_inner);
        indexes.insert(id.to_string(), index.clone());
        Ok(())
    }
}
