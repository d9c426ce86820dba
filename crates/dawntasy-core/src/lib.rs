//! Chat session logic and port definitions for Dawntasy.
//!
//! This crate defines the "ports" (`ChatStore`, `CompletionSource`) that the
//! infrastructure layer implements, plus the logic built on them: stream
//! assembly, the session cache and its live synchronizer. It depends only on
//! `dawntasy-types` -- never on `dawntasy-infra` or any database/IO crate.

pub mod chat;
pub mod llm;
pub mod session;
