// ABOUTME: Delta-style stream handling (OpenAI, Gemini, llama.cpp) - each chunk
// ABOUTME: carries incremental text, reasoning, tool-call pieces, and usage.

use tracing::{debug, info, warn};

use super::context::Core;
use super::telemetry::realtime_rate_trusted;
use super::tool_calls::ToolCallTable;
use crate::config::StreamLimits;
use crate::llm::openai::{self, LlamaTimings, OpenAIDelta, OpenAIUsage};
use crate::llm::{ProviderKind, TokenUsage};

/// In-flight tool calls of a delta-style stream, keyed by stream index.
#[derive(Debug)]
pub(crate) struct DeltaState {
    tools: ToolCallTable,
}

impl DeltaState {
    pub(crate) fn new(limits: &StreamLimits) -> Self {
        Self {
            tools: ToolCallTable::new(
                limits.max_tool_calls,
                limits.tool_argument_cap,
                limits.identifier_cap,
            ),
        }
    }
}

pub(super) fn handle(state: &mut DeltaState, core: &mut Core, raw: &str) {
    if openai::is_done_sentinel(raw) {
        core.close_thinking();
        core.mark_complete();
        commit_identified(state, core);
        return;
    }

    let chunk = match openai::parse_chunk(raw) {
        Ok(chunk) => chunk,
        Err(e) => {
            core.record_malformed(&e);
            return;
        }
    };

    if let Some(choice) = chunk.choices.first() {
        if let Some(delta) = &choice.delta {
            apply_delta(state, core, delta);
        }
        if let Some(reason) = choice.finish_reason.as_deref() {
            finish(state, core, reason);
        }
    }

    if let Some(timings) = &chunk.timings {
        apply_timings(core, timings);
    }
    if let Some(usage) = &chunk.usage {
        apply_usage(core, usage);
    }
}

fn apply_delta(state: &mut DeltaState, core: &mut Core, delta: &OpenAIDelta) {
    if let Some(reasoning) = delta.reasoning_content.as_deref().filter(|s| !s.is_empty()) {
        core.open_thinking();
        core.emit_thinking(reasoning);
    }

    if let Some(text) = delta.content.as_deref().filter(|s| !s.is_empty()) {
        core.close_thinking();
        core.emit_text(text);
    }

    let Some(tool_calls) = delta.tool_calls.as_ref().filter(|t| !t.is_empty()) else {
        return;
    };
    core.mark_tool_calls();

    let mode = core.provider.argument_mode();
    for tc in tool_calls {
        let index = tc.index.unwrap_or(0);
        let function = tc.function.as_ref();
        let name = function.and_then(|f| f.name.as_deref());

        if !state.tools.begin(index, tc.id.as_deref(), name) {
            continue;
        }
        if let Some(name) = name.filter(|n| !n.is_empty()) {
            info!(provider = %core.provider, index, tool = name, "Tool call started");
        }

        if let Some(arguments) = function.and_then(|f| f.arguments.as_deref()) {
            if let Err(e) = state.tools.extend_arguments(index, arguments, mode) {
                warn!(
                    provider = %core.provider,
                    index,
                    error = %e,
                    "Tool call arguments exceed limit"
                );
            }
        }

        if core.provider == ProviderKind::Gemini {
            if let Some(signature) = tc.gemini_signature() {
                core.capture_gemini_signature(signature);
            }
        }
    }
}

fn finish(state: &mut DeltaState, core: &mut Core, reason: &str) {
    core.set_finish_reason(reason);
    core.close_thinking();
    core.mark_complete();

    let calls = state.tools.commit_all();
    if calls.is_empty() {
        return;
    }
    let count = calls.len();
    for call in calls {
        core.commit_tool_call(call);
    }
    info!(provider = %core.provider, count, "Stream finished with tool calls");
}

/// Commit the calls still open when a stream ends without a finish reason.
/// Slots that never received an id cannot be answered and are dropped.
fn commit_identified(state: &mut DeltaState, core: &mut Core) {
    for call in state.tools.commit_all() {
        if call.id.is_empty() {
            debug!(tool = %call.name, "Dropping open tool call without an id");
            continue;
        }
        core.commit_tool_call(call);
    }
}

fn apply_usage(core: &mut Core, usage: &OpenAIUsage) {
    let reasoning = usage.reasoning_tokens();
    if let Some(tokens) = reasoning {
        core.telemetry.reasoning_tokens = tokens;
        if tokens > 0 {
            info!(provider = %core.provider, reasoning_tokens = tokens, "Reasoning tokens used");
        }
    }

    core.record_usage(TokenUsage {
        input_tokens: usage.input_tokens(),
        output_tokens: usage.output_tokens(),
        cached_tokens: usage.cached_tokens(),
        reasoning_tokens: reasoning.unwrap_or(0),
    });
}

fn apply_timings(core: &mut Core, timings: &LlamaTimings) {
    let (max_rate, min_tokens) = (core.limits.max_realtime_rate, core.limits.min_realtime_tokens);

    if let Some(n) = timings.predicted_n {
        core.telemetry.tokens_generated = n;
    }
    if let Some(n) = timings.prompt_n {
        core.telemetry.realtime_prompt_tokens = n;
    }
    if let Some(n) = timings.cache_n {
        core.telemetry.realtime_cached_tokens = n;
    }

    if let Some(rate) = timings.predicted_per_second {
        if realtime_rate_trusted(rate, core.telemetry.tokens_generated, max_rate, min_tokens) {
            core.telemetry.tokens_per_second = rate;
        } else {
            debug!(
                rate,
                tokens = core.telemetry.tokens_generated,
                "Ignoring untrusted realtime rate"
            );
        }
    }

    let rate = core.telemetry.tokens_per_second;
    if rate > 0.0 && core.telemetry.tokens_generated >= min_tokens {
        core.publish_rate(rate);
    }
}
