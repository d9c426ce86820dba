//! Completion source abstraction and streamed-reply assembly.

pub mod assembler;
pub mod source;
