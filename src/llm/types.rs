// ABOUTME: Core types shared by every provider stream - provider identity,
// ABOUTME: fragment kinds, tool calls, token usage, and assembled content.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which backend produced a stream. Fixed for the lifetime of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Local inference server speaking the OpenAI-compatible format.
    Local,
    OpenAI,
    Claude,
    Gemini,
}

/// The wire-format family a provider streams in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// Each chunk carries only the change since the previous chunk.
    Delta,
    /// Discrete typed events bracket each content block.
    Lifecycle,
}

/// How a tool-call argument fragment combines with what is already stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentMode {
    /// The fragment is the next slice of the argument JSON.
    Append,
    /// The fragment is the complete argument JSON so far.
    Replace,
}

impl ProviderKind {
    pub fn wire_format(self) -> WireFormat {
        match self {
            ProviderKind::Local | ProviderKind::OpenAI | ProviderKind::Gemini => WireFormat::Delta,
            ProviderKind::Claude => WireFormat::Lifecycle,
        }
    }

    /// Gemini repeats the full argument JSON on every delta; everyone else
    /// sends true increments.
    pub fn argument_mode(self) -> ArgumentMode {
        match self {
            ProviderKind::Gemini => ArgumentMode::Replace,
            _ => ArgumentMode::Append,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Local => "local",
            ProviderKind::OpenAI => "openai",
            ProviderKind::Claude => "claude",
            ProviderKind::Gemini => "gemini",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" | "llama" | "llamacpp" => Ok(ProviderKind::Local),
            "openai" => Ok(ProviderKind::OpenAI),
            "claude" | "anthropic" => Ok(ProviderKind::Claude),
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            other => Err(format!("unknown provider '{}'", other)),
        }
    }
}

/// Kind of a streamed fragment delivered to the typed callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FragmentKind {
    Text,
    Thinking,
}

/// Why the model stopped generating, normalized across providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    ContentFilter,
    Other,
}

impl StopReason {
    /// Map a raw provider finish/stop reason onto the common set.
    pub fn from_raw(s: &str) -> Self {
        match s {
            "stop" | "end_turn" | "STOP" => StopReason::EndTurn,
            "tool_calls" | "tool_use" | "function_call" => StopReason::ToolUse,
            "length" | "max_tokens" | "MAX_TOKENS" => StopReason::MaxTokens,
            "stop_sequence" => StopReason::StopSequence,
            "content_filter" | "refusal" | "SAFETY" => StopReason::ContentFilter,
            _ => StopReason::Other,
        }
    }
}

/// A fully reassembled tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw argument JSON exactly as reassembled from the stream.
    pub arguments: String,
}

impl ToolCall {
    /// Parse the arguments, falling back to an empty object when the model
    /// produced invalid JSON.
    pub fn input(&self) -> serde_json::Value {
        serde_json::from_str(&self.arguments)
            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()))
    }
}

/// Token usage reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cached_tokens: u32,
    pub reasoning_tokens: u32,
}

impl TokenUsage {
    pub fn is_empty(&self) -> bool {
        self.input_tokens == 0 && self.output_tokens == 0
    }
}

/// A block of assistant content assembled from a finished stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
}

impl ContentBlock {
    /// Create a text content block.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

impl From<&ToolCall> for ContentBlock {
    fn from(call: &ToolCall) -> Self {
        ContentBlock::ToolUse {
            id: call.id.clone(),
            name: call.name.clone(),
            input: call.input(),
        }
    }
}
