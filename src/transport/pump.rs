// ABOUTME: Async pump that drives a StreamContext from a chunked byte stream,
// ABOUTME: framing SSE and feeding each event payload in arrival order.

use futures::{Stream, StreamExt};
use serde::Serialize;
use tracing::debug;

use super::sse::SseParser;
use crate::error::StreamError;
use crate::stream::StreamContext;

/// Counters from one pump run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PumpStats {
    pub bytes: usize,
    pub chunks: usize,
    pub events: usize,
}

/// Read `body` to the end, feeding every SSE event's data to `ctx`.
///
/// Reading continues past completion because usage can follow the finish
/// chunk. A body error stops the pump with [`StreamError::Transport`]; `ctx`
/// keeps everything reconstructed up to that point.
pub async fn pump<S, B, E>(ctx: &mut StreamContext, body: S) -> Result<PumpStats, StreamError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<anyhow::Error>,
{
    let mut parser = SseParser::with_buffer_cap(ctx.limits().sse_buffer_cap);
    let mut stats = PumpStats::default();
    let mut body = std::pin::pin!(body);

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| StreamError::Transport(e.into()))?;
        let bytes = chunk.as_ref();
        stats.bytes += bytes.len();
        stats.chunks += 1;

        for event in parser.feed(bytes) {
            stats.events += 1;
            ctx.handle_event(&event.data);
        }
    }

    if let Some(event) = parser.finish() {
        stats.events += 1;
        ctx.handle_event(&event.data);
    }

    debug!(
        provider = %ctx.provider(),
        bytes = stats.bytes,
        chunks = stats.chunks,
        events = stats.events,
        complete = ctx.is_complete(),
        "Stream body drained"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use std::io;

    use futures::stream;

    use super::*;
    use crate::llm::ProviderKind;

    fn context(provider: ProviderKind) -> StreamContext {
        StreamContext::builder(provider)
            .on_text(|_| {})
            .build()
            .unwrap()
    }

    fn chunks(body: &str, size: usize) -> Vec<Result<Vec<u8>, io::Error>> {
        body.as_bytes().chunks(size).map(|c| Ok(c.to_vec())).collect()
    }

    const OPENAI_BODY: &str = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"Héllo\"}}]}\n\n",
        ": keep-alive\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
        "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":4,\"completion_tokens\":2}}\n\n",
        "data: [DONE]\n\n",
    );

    #[tokio::test]
    async fn test_pump_reassembles_across_tiny_chunks() {
        let mut ctx = context(ProviderKind::OpenAI);
        let stats = pump(&mut ctx, stream::iter(chunks(OPENAI_BODY, 3)))
            .await
            .unwrap();

        assert_eq!(ctx.response(), "Héllo there");
        assert!(ctx.is_complete());
        assert_eq!(ctx.telemetry().usage.unwrap().output_tokens, 2);
        assert_eq!(stats.events, 5);
        assert_eq!(stats.bytes, OPENAI_BODY.len());
    }

    #[tokio::test]
    async fn test_pump_claude_event_stream() {
        let body = concat!(
            "event: message_start\r\n",
            "data: {\"type\":\"message_start\",\"message\":{\"usage\":{\"input_tokens\":9}}}\r\n\r\n",
            "event: content_block_start\r\n",
            "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\r\n\r\n",
            "event: ping\r\n",
            "data: {\"type\":\"ping\"}\r\n\r\n",
            "event: content_block_delta\r\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Sure.\"}}\r\n\r\n",
            "event: content_block_stop\r\n",
            "data: {\"type\":\"content_block_stop\",\"index\":0}\r\n\r\n",
            "event: message_stop\r\n",
            "data: {\"type\":\"message_stop\"}",
        );
        let mut ctx = context(ProviderKind::Claude);
        pump(&mut ctx, stream::iter(chunks(body, 17))).await.unwrap();

        assert_eq!(ctx.response(), "Sure.");
        // The unterminated final event is dispatched at end of body.
        assert!(ctx.is_complete());
    }

    #[tokio::test]
    async fn test_pump_transport_error_keeps_partial_response() {
        let body: Vec<Result<Vec<u8>, io::Error>> = vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"Part\"}}]}\n\n".to_vec()),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer reset")),
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"never\"}}]}\n\n".to_vec()),
        ];
        let mut ctx = context(ProviderKind::Local);

        let err = pump(&mut ctx, stream::iter(body)).await.unwrap_err();

        assert!(matches!(err, StreamError::Transport(_)));
        assert!(err.to_string().contains("peer reset"));
        assert_eq!(ctx.response(), "Part");
        assert!(!ctx.is_complete());
    }

    #[tokio::test]
    async fn test_pump_empty_body() {
        let mut ctx = context(ProviderKind::Gemini);
        let body: Vec<Result<Vec<u8>, io::Error>> = Vec::new();
        let stats = pump(&mut ctx, stream::iter(body)).await.unwrap();

        assert_eq!(stats, PumpStats::default());
        assert!(!ctx.is_complete());
    }
}
