// ABOUTME: Lifecycle-style stream handling (Anthropic) - typed events open,
// ABOUTME: fill, and close one content block at a time.

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use super::buffer::BoundedBuffer;
use super::context::{Core, ThinkingBlock};
use super::tool_calls::PendingToolCall;
use crate::config::StreamLimits;
use crate::llm::anthropic::{self, AnthropicBlockStart, AnthropicDelta, AnthropicStreamEvent};
use crate::llm::{ArgumentMode, TokenUsage};

const INITIAL_SIGNATURE_CAPACITY: usize = 1024;

/// Kind of the content block a lifecycle stream is inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Idle,
    Text,
    Thinking,
    ToolUse,
}

#[derive(Debug)]
enum Block {
    Idle,
    Text,
    Thinking,
    ToolUse(PendingToolCall),
}

impl Block {
    fn kind(&self) -> BlockKind {
        match self {
            Block::Idle => BlockKind::Idle,
            Block::Text => BlockKind::Text,
            Block::Thinking => BlockKind::Thinking,
            Block::ToolUse(_) => BlockKind::ToolUse,
        }
    }
}

/// Byte range of one finished thinking block and its signature.
#[derive(Debug)]
struct ThinkingSegment {
    start: usize,
    end: usize,
    signature: String,
}

/// Block state plus the values captured from `message_start`.
#[derive(Debug)]
pub(crate) struct LifecycleState {
    block: Block,
    block_index: Option<usize>,
    signature: BoundedBuffer,
    signature_cap: usize,
    segment_start: usize,
    segments: Vec<ThinkingSegment>,
    argument_cap: usize,
    identifier_cap: usize,
    input_tokens: u32,
    cached_tokens: u32,
}

impl LifecycleState {
    pub(crate) fn new(limits: &StreamLimits) -> Self {
        Self {
            block: Block::Idle,
            block_index: None,
            signature: new_signature_buffer(limits.signature_cap),
            signature_cap: limits.signature_cap,
            segment_start: 0,
            segments: Vec::new(),
            argument_cap: limits.tool_argument_cap,
            identifier_cap: limits.identifier_cap,
            input_tokens: 0,
            cached_tokens: 0,
        }
    }

    pub(crate) fn signature(&self) -> Option<&str> {
        Some(self.signature.as_str()).filter(|s| !s.is_empty())
    }

    pub(crate) fn block_kind(&self) -> BlockKind {
        self.block.kind()
    }

    /// Split the accumulated thinking text back into its blocks, each with
    /// the signature received inside it. A block still open is included.
    pub(crate) fn thinking_blocks(&self, thinking: &str) -> Vec<ThinkingBlock> {
        let open = matches!(self.block, Block::Thinking)
            .then(|| (self.segment_start, thinking.len(), self.signature.as_str()));

        self.segments
            .iter()
            .map(|s| (s.start, s.end, s.signature.as_str()))
            .chain(open)
            .filter_map(|(start, end, signature)| {
                let text = thinking.get(start..end)?;
                if text.is_empty() && signature.is_empty() {
                    return None;
                }
                Some(ThinkingBlock {
                    thinking: text.to_string(),
                    signature: Some(signature.to_string()).filter(|s| !s.is_empty()),
                })
            })
            .collect()
    }
}

fn new_signature_buffer(cap: usize) -> BoundedBuffer {
    BoundedBuffer::new(INITIAL_SIGNATURE_CAPACITY.min(cap), cap)
}

pub(super) fn handle(state: &mut LifecycleState, core: &mut Core, raw: &str) {
    let event = match anthropic::parse_event(raw) {
        Ok(event) => event,
        Err(e) => {
            core.record_malformed(&e);
            return;
        }
    };

    match event {
        AnthropicStreamEvent::MessageStart { message } => {
            let message = message.unwrap_or_default();
            if let Some(usage) = message.usage {
                state.input_tokens = usage.input_tokens.unwrap_or(0);
                state.cached_tokens = usage.cache_read_input_tokens.unwrap_or(0);
            }
            debug!(
                model = message.model.as_deref().unwrap_or(""),
                input_tokens = state.input_tokens,
                cached_tokens = state.cached_tokens,
                "Message started"
            );
        }
        AnthropicStreamEvent::ContentBlockStart {
            index,
            content_block,
        } => start_block(state, core, index, content_block),
        AnthropicStreamEvent::ContentBlockDelta { delta, .. } => apply_delta(state, core, delta),
        AnthropicStreamEvent::ContentBlockStop { .. } => stop_block(state, core),
        AnthropicStreamEvent::MessageDelta { delta, usage } => {
            if let Some(reason) = delta.and_then(|d| d.stop_reason) {
                core.set_finish_reason(&reason);
            }
            if let Some(usage) = usage {
                if let Some(output_tokens) = usage.output_tokens {
                    let cached_tokens = usage
                        .cache_read_input_tokens
                        .unwrap_or(state.cached_tokens);
                    core.record_usage(TokenUsage {
                        input_tokens: usage.input_tokens.unwrap_or(state.input_tokens),
                        output_tokens,
                        cached_tokens,
                        reasoning_tokens: 0,
                    });
                }
            }
        }
        AnthropicStreamEvent::MessageStop => {
            if state.block.kind() != BlockKind::Idle {
                stop_block(state, core);
            }
            core.mark_complete();
            let count = core.tool_call_count();
            if count > 0 {
                info!(provider = %core.provider, count, "Stream finished with tool calls");
            }
        }
        AnthropicStreamEvent::Error { error } => {
            let error = error.unwrap_or_default();
            warn!(
                provider = %core.provider,
                error_type = %error.error_type,
                message = %error.message,
                "Provider reported an in-stream error"
            );
        }
        AnthropicStreamEvent::Unknown => trace!("Ignoring unrecognized lifecycle event"),
    }
}

fn start_block(
    state: &mut LifecycleState,
    core: &mut Core,
    index: usize,
    block: AnthropicBlockStart,
) {
    if state.block.kind() != BlockKind::Idle {
        debug!(
            open = ?state.block.kind(),
            open_index = ?state.block_index,
            index,
            "Block started while another is open, closing it"
        );
        stop_block(state, core);
    }
    state.block_index = Some(index);

    state.block = match block {
        AnthropicBlockStart::Thinking { thinking } => {
            state.signature = new_signature_buffer(state.signature_cap);
            state.segment_start = core.thinking_len();
            core.open_thinking();
            core.emit_thinking(&thinking);
            Block::Thinking
        }
        AnthropicBlockStart::ToolUse { id, name } => {
            let mut pending = PendingToolCall::new(state.argument_cap, state.identifier_cap);
            pending.set_id(&id);
            pending.set_name(&name);
            core.mark_tool_calls();
            info!(provider = %core.provider, index, tool = %pending.name(), "Tool call started");
            Block::ToolUse(pending)
        }
        AnthropicBlockStart::Text { text } => {
            core.emit_text(&text);
            Block::Text
        }
        AnthropicBlockStart::Other => Block::Text,
    };
}

fn apply_delta(state: &mut LifecycleState, core: &mut Core, delta: AnthropicDelta) {
    match (delta, &mut state.block) {
        (AnthropicDelta::TextDelta { text }, Block::Text) => core.emit_text(&text),
        (AnthropicDelta::ThinkingDelta { thinking }, Block::Thinking) => {
            core.emit_thinking(&thinking)
        }
        (AnthropicDelta::SignatureDelta { signature }, Block::Thinking) => {
            if let Err(e) = state.signature.append(&signature) {
                warn!(error = %e, "Thinking signature exceeds limit");
            }
        }
        (AnthropicDelta::InputJsonDelta { partial_json }, Block::ToolUse(pending)) => {
            if let Err(e) = pending.extend(&partial_json, ArgumentMode::Append) {
                warn!(tool = %pending.name(), error = %e, "Tool call arguments exceed limit");
            }
        }
        (AnthropicDelta::Other, _) => trace!("Ignoring unrecognized delta type"),
        (delta, block) => {
            debug!(?delta, block = ?block.kind(), "Ignoring delta outside a matching block")
        }
    }
}

fn stop_block(state: &mut LifecycleState, core: &mut Core) {
    state.block_index = None;
    match std::mem::replace(&mut state.block, Block::Idle) {
        Block::Thinking => {
            core.close_thinking();
            state.segments.push(ThinkingSegment {
                start: state.segment_start,
                end: core.thinking_len(),
                signature: state.signature.as_str().to_string(),
            });
            debug!(signature_bytes = state.signature.len(), "Thinking block closed");
        }
        Block::ToolUse(pending) => {
            let call = pending.finish();
            info!(
                provider = %core.provider,
                tool = %call.name,
                argument_bytes = call.arguments.len(),
                "Tool call complete"
            );
            core.commit_tool_call(call);
        }
        Block::Text | Block::Idle => {}
    }
}
