// ABOUTME: Wire types for OpenAI-compatible delta streams (OpenAI, Gemini's
// ABOUTME: compatibility endpoint, and local llama.cpp-style servers).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

use crate::error::EventError;

/// Literal end-of-stream sentinel carried in the final SSE `data:` line.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One streamed chunk.
#[derive(Debug, Default, Deserialize)]
pub struct OpenAIStreamChunk {
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub choices: Vec<OpenAIStreamChoice>,
    /// Present in the final chunk when usage reporting is enabled.
    #[serde(default, deserialize_with = "lenient")]
    pub usage: Option<OpenAIUsage>,
    /// Per-chunk generation timings emitted by llama.cpp servers.
    #[serde(default, deserialize_with = "lenient")]
    pub timings: Option<LlamaTimings>,
}

/// Streaming choice.
#[derive(Debug, Default, Deserialize)]
pub struct OpenAIStreamChoice {
    #[serde(default, deserialize_with = "lenient")]
    pub delta: Option<OpenAIDelta>,
    #[serde(default, deserialize_with = "lenient")]
    pub finish_reason: Option<String>,
}

/// Streaming delta.
#[derive(Debug, Default, Deserialize)]
pub struct OpenAIDelta {
    #[serde(default, deserialize_with = "lenient")]
    pub content: Option<String>,
    /// Reasoning text from reasoning models served by llama.cpp.
    #[serde(default, deserialize_with = "lenient")]
    pub reasoning_content: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub tool_calls: Option<Vec<OpenAIToolCallDelta>>,
}

/// Streaming tool call delta.
#[derive(Debug, Default, Deserialize)]
pub struct OpenAIToolCallDelta {
    #[serde(default, deserialize_with = "lenient")]
    pub index: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub function: Option<OpenAIFunctionDelta>,
    /// Gemini: `extra_content.google.thought_signature`.
    #[serde(default, deserialize_with = "lenient")]
    pub extra_content: Option<ExtraContent>,
    /// Gemini fallback location for the signature.
    #[serde(default, deserialize_with = "lenient")]
    pub thought_signature: Option<String>,
}

impl OpenAIToolCallDelta {
    /// The Gemini thought signature carried by this delta, if any.
    pub fn gemini_signature(&self) -> Option<&str> {
        let nested = self
            .extra_content
            .as_ref()
            .and_then(|e| e.google.as_ref())
            .and_then(|g| g.thought_signature.as_deref());
        nested
            .or(self.thought_signature.as_deref())
            .filter(|s| !s.is_empty())
    }
}

/// Streaming function delta.
#[derive(Debug, Default, Deserialize)]
pub struct OpenAIFunctionDelta {
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub arguments: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExtraContent {
    #[serde(default, deserialize_with = "lenient")]
    pub google: Option<GoogleExtra>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GoogleExtra {
    #[serde(default, deserialize_with = "lenient")]
    pub thought_signature: Option<String>,
}

/// OpenAI usage stats.
#[derive(Debug, Default, Deserialize)]
pub struct OpenAIUsage {
    #[serde(default, deserialize_with = "lenient")]
    pub prompt_tokens: Option<u32>,
    #[serde(default, deserialize_with = "lenient")]
    pub completion_tokens: Option<u32>,
    #[serde(default, deserialize_with = "lenient")]
    pub prompt_tokens_details: Option<PromptTokensDetails>,
    #[serde(default, deserialize_with = "lenient")]
    pub completion_tokens_details: Option<CompletionTokensDetails>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PromptTokensDetails {
    #[serde(default, deserialize_with = "lenient")]
    pub cached_tokens: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompletionTokensDetails {
    #[serde(default, deserialize_with = "lenient")]
    pub reasoning_tokens: Option<u32>,
}

impl OpenAIUsage {
    pub fn input_tokens(&self) -> u32 {
        self.prompt_tokens.unwrap_or(0)
    }

    pub fn output_tokens(&self) -> u32 {
        self.completion_tokens.unwrap_or(0)
    }

    pub fn cached_tokens(&self) -> u32 {
        self.prompt_tokens_details
            .as_ref()
            .and_then(|d| d.cached_tokens)
            .unwrap_or(0)
    }

    pub fn reasoning_tokens(&self) -> Option<u32> {
        self.completion_tokens_details
            .as_ref()
            .and_then(|d| d.reasoning_tokens)
    }
}

/// Real-time generation timings (llama.cpp with `timings_per_token`).
#[derive(Debug, Default, Deserialize)]
pub struct LlamaTimings {
    #[serde(default, deserialize_with = "lenient")]
    pub predicted_n: Option<u32>,
    #[serde(default, deserialize_with = "lenient")]
    pub predicted_per_second: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub prompt_n: Option<u32>,
    #[serde(default, deserialize_with = "lenient")]
    pub cache_n: Option<u32>,
}

/// Decode an optional field, treating a value of the wrong shape as absent.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).ok())
}

fn lenient_or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    Ok(lenient(deserializer)?.unwrap_or_default())
}

/// True when the raw event is the end-of-stream sentinel.
pub fn is_done_sentinel(raw: &str) -> bool {
    raw.trim() == DONE_SENTINEL
}

/// Decode one raw chunk.
///
/// Only text that is not JSON is an error. A field of the wrong type is read
/// as absent so the rest of the chunk survives.
pub fn parse_chunk(raw: &str) -> Result<OpenAIStreamChunk, EventError> {
    Ok(serde_json::from_str(raw)?)
}
