//! Process-local cache backend.

use super::{glob_match, CacheBackend};
use async_trait::async_trait;
use dashmap::DashMap;
use progressor_core::error::ProgressorError;

/// In-memory cache over a concurrent map.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, String>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, ProgressorError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), ProgressorError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, ProgressorError> {
        Ok(keys
            .iter()
            .filter(|k| self.entries.remove(k.as_str()).is_some())
            .count() as u64)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, ProgressorError> {
        Ok(self
            .entries
            .iter()
            .filter(|e| glob_match(pattern, e.key()))
            .map(|e| e.key().clone())
            .collect())
    }

    async fn exists(&self, key: &str) -> Result<bool, ProgressorError> {
        Ok(self.entries.contains_key(key))
    }

    async fn flush(&self) -> Result<(), ProgressorError> {
        self.entries.clear();
        Ok(())
    }
}
