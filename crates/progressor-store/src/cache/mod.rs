//! Key-value side-cache for repository reads.
//!
//! Values are the JSON text of repository results. Entries never expire;
//! the repository deletes them when it writes.

mod memory;
mod redis_cache;

pub use memory::MemoryCache;
pub use redis_cache::RedisCache;

use async_trait::async_trait;
use progressor_core::{
    config::{CacheBackendKind, CacheConfig},
    error::ProgressorError,
};
use std::sync::Arc;

/// String-keyed cache backend.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Human-readable backend name.
    fn name(&self) -> &str;

    async fn get(&self, key: &str) -> Result<Option<String>, ProgressorError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), ProgressorError>;

    /// Delete `keys`, returning how many existed.
    async fn delete(&self, keys: &[String]) -> Result<u64, ProgressorError>;

    /// Keys matching a Redis-style glob (`*`, `?`, `\` escapes).
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, ProgressorError>;

    async fn exists(&self, key: &str) -> Result<bool, ProgressorError>;

    /// Drop every entry.
    async fn flush(&self) -> Result<(), ProgressorError>;
}

/// Build the backend selected in `[cache]`.
pub async fn connect(config: &CacheConfig) -> Result<Arc<dyn CacheBackend>, ProgressorError> {
    match config.backend {
        CacheBackendKind::Memory => Ok(Arc::new(MemoryCache::new())),
        CacheBackendKind::Redis => Ok(Arc::new(RedisCache::connect(config).await?)),
    }
}

/// Redis `KEYS` glob matching.
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    // Position of the last `*` and the text index it was tried at.
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                star = Some((p, t));
                p += 1;
                continue;
            }
            Some('?') => {
                p += 1;
                t += 1;
                continue;
            }
            Some('\\') if p + 1 < pattern.len() && pattern[p + 1] == text[t] => {
                p += 2;
                t += 1;
                continue;
            }
            Some(&c) if c != '\\' && c == text[t] => {
                p += 1;
                t += 1;
                continue;
            }
            _ => {}
        }
        match star {
            Some((sp, st)) => {
                p = sp + 1;
                t = st + 1;
                star = Some((sp, st + 1));
            }
            None => return false,
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_prefix() {
        assert!(glob_match("get_by_custom_fields:user:*", "get_by_custom_fields:user:active:true"));
        assert!(!glob_match("get_by_custom_fields:user:*", "get_by_custom_fields:userstate:x:y"));
        assert!(!glob_match("get_by_custom_fields:user:*", "get_by_custom_fields:user"));
    }

    #[test]
    fn test_glob_wildcards() {
        assert!(glob_match("*", ""));
        assert!(glob_match("*", "anything"));
        assert!(glob_match("a?c", "abc"));
        assert!(!glob_match("a?c", "ac"));
        assert!(glob_match("a*b*c", "a123b456c"));
        assert!(!glob_match("a*b*c", "a123b456"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exactly"));
    }

    #[test]
    fn test_glob_escape() {
        assert!(glob_match(r"a\*b", "a*b"));
        assert!(!glob_match(r"a\*b", "axb"));
    }
}
