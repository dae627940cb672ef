// ABOUTME: Transport-side helpers - SSE framing of raw HTTP body bytes and the
// ABOUTME: async pump that feeds framed events into a StreamContext.

mod pump;
mod sse;

pub use pump::{pump, PumpStats};
pub use sse::{SseEvent, SseParser, DEFAULT_SSE_BUFFER_CAP};
