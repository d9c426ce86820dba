//! Infrastructure layer for Dawntasy.
//!
//! Concrete implementations of the ports defined in `dawntasy-core`:
//! chat stores (in-memory and SQLite), the OpenAI-compatible completion
//! source, configuration loading and data-directory resolution.

pub mod config;
pub mod filesystem;
pub mod llm;
pub mod sqlite;
pub mod store;
