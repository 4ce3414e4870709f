//! # progressor-store
//!
//! Relational repository (SQLite) with a key-value side-cache.

pub mod cache;
pub mod keys;
pub mod repository;
pub mod tree;

pub use cache::{CacheBackend, MemoryCache, RedisCache};
pub use keys::Filters;
pub use repository::{Repository, UnitOfWork};
