// ABOUTME: Stream timing telemetry - time to first token and generation rate,
// ABOUTME: with the noise filters applied to jittery early samples.

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::llm::TokenUsage;

/// Timing and token counters of one stream.
#[derive(Debug, Clone)]
pub struct Telemetry {
    started_at: Instant,
    first_token_at: Option<Instant>,
    pub tokens_generated: u32,
    pub tokens_per_second: f64,
    pub reasoning_tokens: u32,
    pub realtime_prompt_tokens: u32,
    pub realtime_cached_tokens: u32,
    pub usage: Option<TokenUsage>,
}

impl Telemetry {
    pub fn new(started_at: Instant) -> Self {
        Self {
            started_at,
            first_token_at: None,
            tokens_generated: 0,
            tokens_per_second: 0.0,
            reasoning_tokens: 0,
            realtime_prompt_tokens: 0,
            realtime_cached_tokens: 0,
            usage: None,
        }
    }

    /// Record the first visible token. Returns the TTFT the first time only.
    pub fn mark_first_token(&mut self, now: Instant) -> Option<Duration> {
        if self.first_token_at.is_some() {
            return None;
        }
        self.first_token_at = Some(now);
        Some(now.saturating_duration_since(self.started_at))
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn first_token_at(&self) -> Option<Instant> {
        self.first_token_at
    }

    pub fn ttft(&self) -> Option<Duration> {
        self.first_token_at
            .map(|t| t.saturating_duration_since(self.started_at))
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    pub fn summary(&self) -> TelemetrySummary {
        TelemetrySummary {
            ttft_ms: self.ttft().map(|d| d.as_secs_f64() * 1000.0),
            tokens_generated: self.tokens_generated,
            tokens_per_second: self.tokens_per_second,
            reasoning_tokens: self.reasoning_tokens,
            realtime_prompt_tokens: self.realtime_prompt_tokens,
            realtime_cached_tokens: self.realtime_cached_tokens,
            usage: self.usage,
        }
    }
}

/// Serializable view of [`Telemetry`].
#[derive(Debug, Clone, Serialize)]
pub struct TelemetrySummary {
    pub ttft_ms: Option<f64>,
    pub tokens_generated: u32,
    pub tokens_per_second: f64,
    pub reasoning_tokens: u32,
    pub realtime_prompt_tokens: u32,
    pub realtime_cached_tokens: u32,
    pub usage: Option<TokenUsage>,
}

/// Rate from a provider-reported output token count and the time since the
/// stream started. `None` when there is nothing to measure or the elapsed
/// time is at or below `floor`.
pub fn usage_rate(output_tokens: u32, elapsed: Duration, floor: Duration) -> Option<f64> {
    if output_tokens == 0 || elapsed <= floor {
        return None;
    }
    let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
    Some(f64::from(output_tokens) * 1000.0 / elapsed_ms)
}

/// Whether a server-reported realtime rate is worth trusting.
pub fn realtime_rate_trusted(
    rate: f64,
    tokens_generated: u32,
    max_rate: f64,
    min_tokens: u32,
) -> bool {
    rate > 0.0 && rate < max_rate && tokens_generated >= min_tokens
}
