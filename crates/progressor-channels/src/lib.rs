//! # progressor-channels
//!
//! Messaging platform integrations for Progressor.

pub mod telegram;
