// ABOUTME: LLM module - provider identity, shared stream types, and the
// ABOUTME: wire types of the delta-style and lifecycle-style formats.

pub mod anthropic;
pub mod openai;
mod types;

pub use types::*;
