// ABOUTME: Prelude module - convenient imports for common use cases.
// ABOUTME: Use `use llmstream::prelude::*;` to get started quickly.

pub use crate::config::StreamLimits;
pub use crate::error::{BufferOverflow, ConfigError, EventError, StreamError};
pub use crate::llm::{
    ArgumentMode, ContentBlock, FragmentKind, ProviderKind, StopReason, TokenUsage, ToolCall,
    WireFormat,
};
pub use crate::sentence::SentenceBuffer;
pub use crate::stream::{
    BlockKind, ContextWindowTracker, LiveNotifier, MetricsSink, SessionId, SharedMetrics,
    StreamContext, StreamContextBuilder, StreamOutcome, Telemetry, ThinkingBlock, UsageTracker,
};
pub use crate::transport::{pump, PumpStats, SseEvent, SseParser};
