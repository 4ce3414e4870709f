//! # progressor-core
//!
//! Core types, entity schema, configuration, progress engine, and error
//! handling for Progressor.

pub mod config;
pub mod entity;
pub mod error;
pub mod message;
pub mod progress;
pub mod traits;
pub mod tree;
pub mod validate;

pub use config::shellexpand;
pub use serde_json;
