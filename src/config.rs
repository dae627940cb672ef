// ABOUTME: StreamLimits - resource ceilings and telemetry thresholds for a stream.
// ABOUTME: Defaults match the daemon's built-in constants; overridable via TOML.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const MIB: usize = 1024 * 1024;

/// Resource ceilings and telemetry thresholds applied to every stream.
///
/// Embeds as a `[stream]` table in a daemon config file. Missing keys take
/// their default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamLimits {
    /// Hard ceiling for visible response text, in bytes.
    pub response_cap: usize,
    /// Hard ceiling for thinking text, in bytes.
    pub thinking_cap: usize,
    pub initial_response_capacity: usize,
    pub initial_thinking_capacity: usize,
    /// Number of tool-call slots per stream.
    pub max_tool_calls: usize,
    /// Ceiling for one tool call's argument JSON, in bytes.
    pub tool_argument_cap: usize,
    /// Tool ids and names longer than this are truncated.
    pub identifier_cap: usize,
    /// Ceiling for an opaque thinking signature, in bytes.
    pub signature_cap: usize,
    /// Elapsed time below which a usage-derived token rate is not computed.
    pub rate_floor_ms: u64,
    /// Realtime rates at or above this are discarded as noise.
    pub max_realtime_rate: f64,
    /// Realtime rates are only trusted after this many generated tokens.
    pub min_realtime_tokens: u32,
    /// Ceiling for an unterminated SSE line.
    pub sse_buffer_cap: usize,
    /// Ceiling for text waiting on a sentence boundary.
    pub sentence_buffer_cap: usize,
}

impl Default for StreamLimits {
    fn default() -> Self {
        Self {
            response_cap: 10 * MIB,
            thinking_cap: 2 * MIB,
            initial_response_capacity: 8 * 1024,
            initial_thinking_capacity: 4 * 1024,
            max_tool_calls: 8,
            tool_argument_cap: 64 * 1024,
            identifier_cap: 256,
            signature_cap: 64 * 1024,
            rate_floor_ms: 100,
            max_realtime_rate: 1000.0,
            min_realtime_tokens: 3,
            sse_buffer_cap: 10 * MIB,
            sentence_buffer_cap: 10 * MIB,
        }
    }
}

impl StreamLimits {
    /// Parse limits from a TOML document and validate them.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let limits: StreamLimits = toml::from_str(s)?;
        limits.validate()?;
        Ok(limits)
    }

    /// Set the response text ceiling. The starting capacity shrinks to fit.
    pub fn with_response_cap(mut self, bytes: usize) -> Self {
        self.response_cap = bytes;
        self.initial_response_capacity = self.initial_response_capacity.min(bytes);
        self
    }

    /// Set the thinking text ceiling. The starting capacity shrinks to fit.
    pub fn with_thinking_cap(mut self, bytes: usize) -> Self {
        self.thinking_cap = bytes;
        self.initial_thinking_capacity = self.initial_thinking_capacity.min(bytes);
        self
    }

    /// Set the number of tool-call slots.
    pub fn with_max_tool_calls(mut self, n: usize) -> Self {
        self.max_tool_calls = n;
        self
    }

    /// Set the per-call argument ceiling.
    pub fn with_tool_argument_cap(mut self, bytes: usize) -> Self {
        self.tool_argument_cap = bytes;
        self
    }

    /// Set the signature ceiling.
    pub fn with_signature_cap(mut self, bytes: usize) -> Self {
        self.signature_cap = bytes;
        self
    }

    /// Set the minimum elapsed time for usage-derived rates.
    pub fn with_rate_floor_ms(mut self, ms: u64) -> Self {
        self.rate_floor_ms = ms;
        self
    }

    /// Check that every limit is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let nonzero = [
            ("response_cap", self.response_cap),
            ("thinking_cap", self.thinking_cap),
            ("max_tool_calls", self.max_tool_calls),
            ("tool_argument_cap", self.tool_argument_cap),
            ("identifier_cap", self.identifier_cap),
            ("signature_cap", self.signature_cap),
            ("sse_buffer_cap", self.sse_buffer_cap),
            ("sentence_buffer_cap", self.sentence_buffer_cap),
        ];
        for (field, value) in nonzero {
            if value == 0 {
                return Err(invalid(field, "must be greater than zero"));
            }
        }

        if self.initial_response_capacity > self.response_cap {
            return Err(invalid(
                "initial_response_capacity",
                format!("exceeds response_cap ({})", self.response_cap),
            ));
        }
        if self.initial_thinking_capacity > self.thinking_cap {
            return Err(invalid(
                "initial_thinking_capacity",
                format!("exceeds thinking_cap ({})", self.thinking_cap),
            ));
        }
        if !(self.max_realtime_rate.is_finite() && self.max_realtime_rate > 0.0) {
            return Err(invalid("max_realtime_rate", "must be a positive number"));
        }

        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidLimit {
        field,
        reason: reason.into(),
    }
}
