//! Shared domain types for Dawntasy.
//!
//! This crate contains the core domain types used across the workspace:
//! chats and their messages, LLM request/response shapes, the signed-in
//! user identity, configuration, and the error taxonomy.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod chat;
pub mod config;
pub mod error;
pub mod identity;
pub mod llm;
