// ABOUTME: Stream reconstruction - the per-stream context, its bounded
// ABOUTME: buffers and tool-call table, and the collaborators it notifies.

mod buffer;
mod context;
mod delta;
mod lifecycle;
mod observer;
mod telemetry;
mod tool_calls;

pub use buffer::BoundedBuffer;
pub use context::{
    FragmentCallback, StreamContext, StreamContextBuilder, StreamOutcome, TextCallback,
    ThinkingBlock,
};
pub use lifecycle::BlockKind;
pub use observer::{
    ContextWindowTracker, LiveNotifier, MetricsSink, MetricsSnapshot, SessionId, SharedMetrics,
    UsageTracker,
};
pub use telemetry::{realtime_rate_trusted, usage_rate, Telemetry, TelemetrySummary};
pub use tool_calls::{PendingToolCall, ToolCallList, ToolCallTable};

#[cfg(test)]
mod tool_calls_test;
