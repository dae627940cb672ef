// ABOUTME: StreamContext - owns everything reconstructed from one LLM stream
// ABOUTME: and routes each raw event to the parser for its wire format.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::buffer::BoundedBuffer;
use super::delta::{self, DeltaState};
use super::lifecycle::{self, BlockKind, LifecycleState};
use super::observer::{LiveNotifier, MetricsSink, Observers, SessionId, UsageTracker};
use super::telemetry::{usage_rate, Telemetry, TelemetrySummary};
use super::tool_calls::{truncate_to_boundary, ToolCallList};
use crate::config::StreamLimits;
use crate::error::{EventError, StreamError};
use crate::llm::{
    ContentBlock, FragmentKind, ProviderKind, StopReason, TokenUsage, ToolCall, WireFormat,
};

/// Receives every visible text fragment as it arrives.
pub type TextCallback = Box<dyn FnMut(&str) + Send>;

/// Receives every text or thinking fragment as it arrives.
pub type FragmentCallback = Box<dyn FnMut(FragmentKind, &str) + Send>;

const FINISH_REASON_CAP: usize = 64;

/// Per-format scratch state. Only the variant for the stream's provider exists.
pub(super) enum ProviderState {
    Delta(DeltaState),
    Lifecycle(LifecycleState),
}

/// State shared by both parsers: buffers, callbacks, flags, and telemetry.
pub(super) struct Core {
    pub(super) provider: ProviderKind,
    pub(super) limits: StreamLimits,
    on_text: TextCallback,
    on_fragment: Option<FragmentCallback>,
    pub(super) observers: Observers,
    session_id: SessionId,
    response: BoundedBuffer,
    thinking: Option<BoundedBuffer>,
    thinking_active: bool,
    has_thinking: bool,
    tool_calls: ToolCallList,
    has_tool_calls: bool,
    finish_reason: Option<String>,
    complete: bool,
    pub(super) telemetry: Telemetry,
    malformed_events: u64,
    gemini_thought_signature: Option<String>,
}

impl Core {
    /// Forward a visible text fragment and accumulate it.
    pub(super) fn emit_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }

        if let Some(ttft) = self.telemetry.mark_first_token(Instant::now()) {
            info!(provider = %self.provider, ttft_ms = ttft.as_secs_f64() * 1000.0, "LLM TTFT");
            if let Some(metrics) = &self.observers.metrics {
                metrics.record_ttft(self.provider, ttft);
            }
        }

        (self.on_text)(text);
        if let Some(on_fragment) = self.on_fragment.as_mut() {
            on_fragment(FragmentKind::Text, text);
        }

        let was_sealed = self.response.is_sealed();
        if let Err(e) = self.response.append(text) {
            if was_sealed {
                debug!(bytes = text.len(), "Response buffer sealed, fragment not accumulated");
            } else {
                error!(provider = %self.provider, error = %e, "Response size limit exceeded");
            }
        }
    }

    /// Forward a thinking fragment and accumulate it.
    pub(super) fn emit_thinking(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }

        if let Some(on_fragment) = self.on_fragment.as_mut() {
            on_fragment(FragmentKind::Thinking, text);
        }
        self.observers
            .notify("thinking_delta", |n| n.thinking_delta(text));

        let (initial, cap) = (self.limits.initial_thinking_capacity, self.limits.thinking_cap);
        let thinking = self
            .thinking
            .get_or_insert_with(|| BoundedBuffer::new(initial, cap));
        let was_sealed = thinking.is_sealed();
        if let Err(e) = thinking.append(text) {
            if !was_sealed {
                warn!(provider = %self.provider, error = %e, "Thinking size limit exceeded");
            }
        }
    }

    /// Enter a thinking segment unless one is already open.
    pub(super) fn open_thinking(&mut self) {
        if self.thinking_active {
            return;
        }
        self.thinking_active = true;
        self.has_thinking = true;
        info!(provider = %self.provider, "Thinking segment started");
        let provider = self.provider;
        self.observers
            .notify("thinking_started", |n| n.thinking_started(provider));
    }

    /// Leave the open thinking segment, if any.
    pub(super) fn close_thinking(&mut self) {
        if !self.thinking_active {
            return;
        }
        self.thinking_active = false;
        let bytes = self.thinking_len();
        info!(provider = %self.provider, bytes, "Thinking segment ended");
        self.observers
            .notify("thinking_ended", |n| n.thinking_ended(bytes > 0));
    }

    pub(super) fn set_finish_reason(&mut self, reason: &str) {
        if self.finish_reason.is_some() {
            return;
        }
        info!(provider = %self.provider, reason, "Stream finish reason");
        self.finish_reason = Some(truncate_to_boundary(reason, FINISH_REASON_CAP).to_string());
    }

    pub(super) fn mark_complete(&mut self) {
        if self.complete {
            return;
        }
        self.complete = true;
        debug!(
            provider = %self.provider,
            response_bytes = self.response.len(),
            tool_calls = self.tool_calls.len(),
            "Stream complete"
        );
    }

    /// Record that the model has started requesting tools.
    pub(super) fn mark_tool_calls(&mut self) {
        self.has_tool_calls = true;
    }

    pub(super) fn thinking_len(&self) -> usize {
        self.thinking.as_ref().map_or(0, BoundedBuffer::len)
    }

    /// Move a finished tool call into the public list.
    pub(super) fn commit_tool_call(&mut self, call: ToolCall) {
        let name = call.name.clone();
        if !self.tool_calls.push(call) {
            warn!(
                provider = %self.provider,
                tool = %name,
                limit = self.limits.max_tool_calls,
                "Tool call list full, dropping call"
            );
        }
    }

    pub(super) fn capture_gemini_signature(&mut self, signature: &str) {
        if self.gemini_thought_signature.is_some() {
            return;
        }
        if signature.len() > self.limits.signature_cap {
            warn!(
                bytes = signature.len(),
                limit = self.limits.signature_cap,
                "Gemini thought_signature exceeds limit, not captured"
            );
            return;
        }
        info!(bytes = signature.len(), "Captured Gemini thought_signature");
        self.gemini_thought_signature = Some(signature.to_string());
    }

    /// Record provider-reported usage and derive the accurate token rate.
    pub(super) fn record_usage(&mut self, usage: TokenUsage) {
        if usage.is_empty() {
            return;
        }
        self.telemetry.usage = Some(usage);

        if let Some(metrics) = &self.observers.metrics {
            metrics.record_usage(self.provider, &usage);
        }
        if let Some(tracker) = &self.observers.usage_tracker {
            tracker.update_usage(&self.session_id, &usage);
        }

        let elapsed = self.telemetry.elapsed(Instant::now());
        let floor = Duration::from_millis(self.limits.rate_floor_ms);
        if let Some(rate) = usage_rate(usage.output_tokens, elapsed, floor) {
            self.telemetry.tokens_per_second = rate;
            self.telemetry.tokens_generated = usage.output_tokens;
            info!(
                provider = %self.provider,
                tokens_per_second = rate,
                output_tokens = usage.output_tokens,
                elapsed_ms = elapsed.as_millis() as u64,
                "Stream rate"
            );
            self.publish_rate(rate);
        }

        info!(
            provider = %self.provider,
            input = usage.input_tokens,
            output = usage.output_tokens,
            cached = usage.cached_tokens,
            "Stream usage"
        );
    }

    pub(super) fn publish_rate(&self, tokens_per_second: f64) {
        if let Some(metrics) = &self.observers.metrics {
            metrics.record_rate(self.provider, tokens_per_second);
        }
        self.observers
            .notify("rate_update", |n| n.rate_update(tokens_per_second));
    }

    pub(super) fn record_malformed(&mut self, err: &EventError) {
        self.malformed_events += 1;
        warn!(provider = %self.provider, error = %err, "Skipping malformed stream event");
    }

    pub(super) fn tool_call_count(&self) -> usize {
        self.tool_calls.len()
    }
}

/// Reconstructs one logical LLM response from its raw stream events.
///
/// Create one per LLM call with [`StreamContext::builder`], feed it every raw
/// event in arrival order with [`handle_event`](Self::handle_event), and read
/// the results once [`is_complete`](Self::is_complete) turns true. Partial
/// reads at any point reflect the work done so far.
pub struct StreamContext {
    core: Core,
    state: ProviderState,
}

impl StreamContext {
    /// Start building a context for `provider`.
    pub fn builder(provider: ProviderKind) -> StreamContextBuilder {
        StreamContextBuilder::new(provider)
    }

    /// Process one raw event: a JSON document, a typed lifecycle event
    /// payload, or the delta-style end-of-stream sentinel.
    ///
    /// Malformed events and overflows are logged and absorbed. Events after
    /// completion are still processed; completion, TTFT, and the finish
    /// reason never change once set.
    pub fn handle_event(&mut self, raw: &str) {
        match &mut self.state {
            ProviderState::Delta(state) => delta::handle(state, &mut self.core, raw),
            ProviderState::Lifecycle(state) => lifecycle::handle(state, &mut self.core, raw),
        }
    }

    pub fn provider(&self) -> ProviderKind {
        self.core.provider
    }

    pub fn limits(&self) -> &StreamLimits {
        &self.core.limits
    }

    pub fn session_id(&self) -> &SessionId {
        &self.core.session_id
    }

    pub fn is_complete(&self) -> bool {
        self.core.complete
    }

    /// Visible response text accumulated so far.
    pub fn response(&self) -> &str {
        self.core.response.as_str()
    }

    /// Thinking text accumulated so far, if any was produced.
    pub fn thinking(&self) -> Option<&str> {
        self.core
            .thinking
            .as_ref()
            .map(BoundedBuffer::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Opaque signature of the last thinking block (lifecycle streams only).
    pub fn thinking_signature(&self) -> Option<&str> {
        match &self.state {
            ProviderState::Lifecycle(state) => state.signature(),
            ProviderState::Delta(_) => None,
        }
    }

    /// Gemini thought signature captured from the first tool call delta.
    pub fn gemini_thought_signature(&self) -> Option<&str> {
        self.core.gemini_thought_signature.as_deref()
    }

    /// Committed tool calls.
    pub fn tool_calls(&self) -> &[ToolCall] {
        self.core.tool_calls.as_slice()
    }

    /// True once the stream has started a tool call, even before any call
    /// is committed to [`tool_calls`](Self::tool_calls).
    pub fn has_tool_calls(&self) -> bool {
        self.core.has_tool_calls
    }

    pub fn has_thinking(&self) -> bool {
        self.core.has_thinking && self.thinking().is_some()
    }

    /// True while a thinking segment is open.
    pub fn is_thinking(&self) -> bool {
        self.core.thinking_active
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.core.finish_reason.as_deref()
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.core.finish_reason.as_deref().map(StopReason::from_raw)
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.core.telemetry
    }

    pub fn first_token_at(&self) -> Option<Instant> {
        self.core.telemetry.first_token_at()
    }

    pub fn ttft(&self) -> Option<Duration> {
        self.core.telemetry.ttft()
    }

    /// True once the response or thinking buffer has rejected a fragment.
    pub fn overflowed(&self) -> bool {
        self.core.response.is_sealed()
            || self.core.thinking.as_ref().is_some_and(BoundedBuffer::is_sealed)
    }

    /// Bytes of visible text that could not be accumulated.
    pub fn dropped_response_bytes(&self) -> usize {
        self.core.response.rejected_bytes()
    }

    /// Number of raw events that failed to decode.
    pub fn malformed_events(&self) -> u64 {
        self.core.malformed_events
    }

    /// Kind of the open lifecycle content block, `None` for delta streams.
    pub fn active_block(&self) -> Option<BlockKind> {
        match &self.state {
            ProviderState::Lifecycle(state) => Some(state.block_kind()),
            ProviderState::Delta(_) => None,
        }
    }

    /// Consume the context and hand back everything it reconstructed.
    pub fn finish(self) -> StreamOutcome {
        let thinking_signature = self.thinking_signature().map(str::to_string);
        let thinking_blocks = match &self.state {
            ProviderState::Lifecycle(state) => self
                .core
                .thinking
                .as_ref()
                .map(|t| state.thinking_blocks(t.as_str()))
                .unwrap_or_default(),
            ProviderState::Delta(_) => Vec::new(),
        };
        let overflowed = self.overflowed();
        let core = self.core;
        let thinking = core
            .thinking
            .map(BoundedBuffer::into_string)
            .filter(|s| !s.is_empty());

        StreamOutcome {
            provider: core.provider,
            stop_reason: core.finish_reason.as_deref().map(StopReason::from_raw),
            finish_reason: core.finish_reason,
            response: core.response.into_string(),
            thinking,
            thinking_signature,
            thinking_blocks,
            gemini_thought_signature: core.gemini_thought_signature,
            tool_calls: core.tool_calls.into_vec(),
            complete: core.complete,
            overflowed,
            malformed_events: core.malformed_events,
            telemetry: core.telemetry.summary(),
        }
    }
}

impl std::fmt::Debug for StreamContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamContext")
            .field("provider", &self.core.provider)
            .field("complete", &self.core.complete)
            .field("response_bytes", &self.core.response.len())
            .field("tool_calls", &self.core.tool_calls.len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`StreamContext`].
pub struct StreamContextBuilder {
    provider: ProviderKind,
    limits: StreamLimits,
    on_text: Option<TextCallback>,
    on_fragment: Option<FragmentCallback>,
    observers: Observers,
    session_id: Option<SessionId>,
    started_at: Option<Instant>,
}

impl StreamContextBuilder {
    fn new(provider: ProviderKind) -> Self {
        Self {
            provider,
            limits: StreamLimits::default(),
            on_text: None,
            on_fragment: None,
            observers: Observers::default(),
            session_id: None,
            started_at: None,
        }
    }

    /// Override the default limits.
    pub fn limits(mut self, limits: StreamLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the visible-text callback. Required.
    pub fn on_text<F>(mut self, f: F) -> Self
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.on_text = Some(Box::new(f));
        self
    }

    /// Set the typed fragment callback.
    pub fn on_fragment<F>(mut self, f: F) -> Self
    where
        F: FnMut(FragmentKind, &str) + Send + 'static,
    {
        self.on_fragment = Some(Box::new(f));
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.observers.metrics = Some(metrics);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn LiveNotifier>) -> Self {
        self.observers.notifier = Some(notifier);
        self
    }

    pub fn usage_tracker(mut self, tracker: Arc<dyn UsageTracker>) -> Self {
        self.observers.usage_tracker = Some(tracker);
        self
    }

    /// Session the stream belongs to. A fresh id is generated when unset.
    pub fn session_id(mut self, id: impl Into<SessionId>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    /// When the request was sent. Defaults to the moment of `build()`.
    pub fn started_at(mut self, at: Instant) -> Self {
        self.started_at = Some(at);
        self
    }

    /// Validate the configuration and create the context.
    pub fn build(self) -> Result<StreamContext, StreamError> {
        let on_text = self.on_text.ok_or(StreamError::MissingCallback("on_text"))?;
        self.limits.validate()?;

        let limits = self.limits;
        let state = match self.provider.wire_format() {
            WireFormat::Delta => ProviderState::Delta(DeltaState::new(&limits)),
            WireFormat::Lifecycle => ProviderState::Lifecycle(LifecycleState::new(&limits)),
        };

        let session_id = self.session_id.unwrap_or_else(SessionId::generate);
        debug!(provider = %self.provider, session = %session_id, "Stream context created");

        let core = Core {
            provider: self.provider,
            on_text,
            on_fragment: self.on_fragment,
            observers: self.observers,
            session_id,
            response: BoundedBuffer::new(limits.initial_response_capacity, limits.response_cap),
            thinking: None,
            thinking_active: false,
            has_thinking: false,
            tool_calls: ToolCallList::new(limits.max_tool_calls),
            has_tool_calls: false,
            finish_reason: None,
            complete: false,
            telemetry: Telemetry::new(self.started_at.unwrap_or_else(Instant::now)),
            malformed_events: 0,
            gemini_thought_signature: None,
            limits,
        };

        Ok(StreamContext { core, state })
    }
}

/// One thinking block of a lifecycle stream and the signature that covers it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThinkingBlock {
    pub thinking: String,
    pub signature: Option<String>,
}

impl From<ThinkingBlock> for ContentBlock {
    fn from(block: ThinkingBlock) -> Self {
        ContentBlock::Thinking {
            thinking: block.thinking,
            signature: block.signature,
        }
    }
}

/// Everything a finished stream produced.
#[derive(Debug, Clone, Serialize)]
pub struct StreamOutcome {
    pub provider: ProviderKind,
    pub response: String,
    pub thinking: Option<String>,
    pub thinking_signature: Option<String>,
    /// Each lifecycle thinking block with its own signature, in stream order.
    pub thinking_blocks: Vec<ThinkingBlock>,
    pub gemini_thought_signature: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: Option<String>,
    pub stop_reason: Option<StopReason>,
    pub complete: bool,
    pub overflowed: bool,
    pub malformed_events: u64,
    pub telemetry: TelemetrySummary,
}

impl StreamOutcome {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Assemble the assistant turn for conversation history: thinking, then
    /// text, then one block per tool call.
    ///
    /// Lifecycle streams yield one thinking block per provider block so every
    /// signature stays attached to the text it signs. Delta streams carry no
    /// signatures and yield a single merged thinking block.
    pub fn into_content(self) -> Vec<ContentBlock> {
        let mut blocks =
            Vec::with_capacity(1 + self.thinking_blocks.len() + self.tool_calls.len());

        if !self.thinking_blocks.is_empty() {
            blocks.extend(self.thinking_blocks.into_iter().map(ContentBlock::from));
        } else if let Some(thinking) = self.thinking {
            blocks.push(ContentBlock::Thinking {
                thinking,
                signature: self.thinking_signature,
            });
        }
        if !self.response.is_empty() {
            blocks.push(ContentBlock::text(self.response));
        }
        blocks.extend(self.tool_calls.iter().map(ContentBlock::from));

        blocks
    }
}
