// ABOUTME: Wire types for Anthropic's typed SSE lifecycle events
// ABOUTME: (message/content_block start, delta, stop).

use serde::Deserialize;

use crate::error::EventError;

/// One typed streaming event.
///
/// Event types this crate does not understand (pings, future additions)
/// decode as [`AnthropicStreamEvent::Unknown`].
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicStreamEvent {
    MessageStart {
        #[serde(default)]
        message: Option<AnthropicMessageStart>,
    },
    ContentBlockStart {
        #[serde(default)]
        index: usize,
        content_block: AnthropicBlockStart,
    },
    ContentBlockDelta {
        #[serde(default)]
        index: usize,
        delta: AnthropicDelta,
    },
    ContentBlockStop {
        #[serde(default)]
        index: usize,
    },
    MessageDelta {
        #[serde(default)]
        delta: Option<AnthropicMessageDelta>,
        #[serde(default)]
        usage: Option<AnthropicUsage>,
    },
    MessageStop,
    Error {
        #[serde(default)]
        error: Option<AnthropicErrorDetail>,
    },
    #[serde(other)]
    Unknown,
}

/// The `message` object of `message_start`.
#[derive(Debug, Default, Deserialize)]
pub struct AnthropicMessageStart {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub usage: Option<AnthropicUsage>,
}

/// Anthropic usage stats. Every field is optional on the wire.
#[derive(Debug, Default, Deserialize)]
pub struct AnthropicUsage {
    #[serde(default)]
    pub input_tokens: Option<u32>,
    #[serde(default)]
    pub output_tokens: Option<u32>,
    #[serde(default)]
    pub cache_read_input_tokens: Option<u32>,
}

/// The `content_block` announced by `content_block_start`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicBlockStart {
    Text {
        #[serde(default)]
        text: String,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    ToolUse {
        #[serde(default)]
        id: String,
        #[serde(default)]
        name: String,
    },
    #[serde(other)]
    Other,
}

/// The `delta` of `content_block_delta`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicDelta {
    TextDelta {
        #[serde(default)]
        text: String,
    },
    ThinkingDelta {
        #[serde(default)]
        thinking: String,
    },
    InputJsonDelta {
        #[serde(default)]
        partial_json: String,
    },
    SignatureDelta {
        #[serde(default)]
        signature: String,
    },
    #[serde(other)]
    Other,
}

/// The `delta` of `message_delta`.
#[derive(Debug, Default, Deserialize)]
pub struct AnthropicMessageDelta {
    #[serde(default)]
    pub stop_reason: Option<String>,
}

/// Anthropic in-stream error detail.
#[derive(Debug, Default, Deserialize)]
pub struct AnthropicErrorDetail {
    #[serde(rename = "type", default)]
    pub error_type: String,
    #[serde(default)]
    pub message: String,
}

/// Decode one raw event payload.
pub fn parse_event(raw: &str) -> Result<AnthropicStreamEvent, EventError> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    if !value.get("type").is_some_and(serde_json::Value::is_string) {
        return Err(EventError::MissingField("type"));
    }
    Ok(serde_json::from_value(value)?)
}
