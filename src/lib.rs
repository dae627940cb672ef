// ABOUTME: Root module for llmstream - incremental LLM response stream parsing.
// ABOUTME: Re-exports the stream context, provider types, and transport helpers.

pub mod config;
pub mod error;
pub mod llm;
pub mod prelude;
pub mod sentence;
pub mod stream;
pub mod transport;

pub use config::StreamLimits;
pub use error::StreamError;
pub use stream::{StreamContext, StreamOutcome};
