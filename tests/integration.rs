// ABOUTME: Integration tests verifying modules work together.
// ABOUTME: Drives full provider bodies through the pump into sentences and outcomes.

use std::io;
use std::sync::Arc;

use futures::stream;
use llmstream::prelude::*;
use parking_lot::Mutex;
use serde_json::json;

fn body_chunks(body: &str, size: usize) -> Vec<Result<Vec<u8>, io::Error>> {
    body.as_bytes().chunks(size).map(|c| Ok(c.to_vec())).collect()
}

fn sse(events: &[serde_json::Value]) -> String {
    events
        .iter()
        .map(|e| format!("data: {e}\n\n"))
        .collect::<String>()
}

/// Context whose visible text is split into sentences, as a voice pipeline would.
fn speaking_context(
    provider: ProviderKind,
) -> (StreamContext, Arc<Mutex<SentenceBuffer>>, Arc<Mutex<Vec<String>>>) {
    let buffer = Arc::new(Mutex::new(SentenceBuffer::new()));
    let spoken = Arc::new(Mutex::new(Vec::new()));
    let (b, s) = (Arc::clone(&buffer), Arc::clone(&spoken));
    let ctx = StreamContext::builder(provider)
        .on_text(move |text| {
            let sentences = b.lock().push(text);
            s.lock().extend(sentences);
        })
        .build()
        .unwrap();
    (ctx, buffer, spoken)
}

#[tokio::test]
async fn test_local_stream_to_sentences() {
    let body = format!(
        "{}data: [DONE]\n\n",
        sse(&[
            json!({"choices": [{"delta": {"reasoning_content": "User wants the time."}}]}),
            json!({"choices": [{"delta": {"content": "It is 3"}}]}),
            json!({"choices": [{"delta": {"content": ".15 now. Anything"}}]}),
            json!({"choices": [{"delta": {"content": " else?"}}], "timings": {"predicted_n": 9, "predicted_per_second": 31.5}}),
            json!({"choices": [{"delta": {}, "finish_reason": "stop"}]}),
        ])
    );

    let (mut ctx, buffer, spoken) = speaking_context(ProviderKind::Local);
    pump(&mut ctx, stream::iter(body_chunks(&body, 7))).await.unwrap();
    if let Some(rest) = buffer.lock().flush() {
        spoken.lock().push(rest);
    }

    assert_eq!(*spoken.lock(), vec!["It is 3.15 now.", "Anything else?"]);
    assert!(ctx.is_complete());
    assert_eq!(ctx.thinking(), Some("User wants the time."));
    assert_eq!(ctx.telemetry().tokens_per_second, 31.5);

    let outcome = ctx.finish();
    assert_eq!(outcome.stop_reason, Some(StopReason::EndTurn));
    assert_eq!(outcome.response, "It is 3.15 now. Anything else?");
}

#[tokio::test]
async fn test_claude_tool_turn_builds_history_content() {
    let events = [
        json!({"type": "message_start", "message": {"id": "msg_1", "usage": {"input_tokens": 120, "cache_read_input_tokens": 100}}}),
        json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Turning on the lights. "}}),
        json!({"type": "content_block_stop", "index": 0}),
        json!({"type": "content_block_start", "index": 1, "content_block": {"type": "tool_use", "id": "toolu_9", "name": "switch"}}),
        json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "{\"room\":\"hall\","}}),
        json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "\"on\":true}"}}),
        json!({"type": "content_block_stop", "index": 1}),
        json!({"type": "message_delta", "delta": {"stop_reason": "tool_use"}, "usage": {"output_tokens": 33}}),
        json!({"type": "message_stop"}),
    ];
    let body: String = events
        .iter()
        .map(|e| format!("event: {}\ndata: {e}\n\n", e["type"].as_str().unwrap()))
        .collect();

    let tracker = Arc::new(ContextWindowTracker::new(200_000));
    let mut ctx = StreamContext::builder(ProviderKind::Claude)
        .on_text(|_| {})
        .usage_tracker(tracker.clone())
        .session_id("hallway-speaker")
        .build()
        .unwrap();
    pump(&mut ctx, stream::iter(body_chunks(&body, 64))).await.unwrap();

    let usage = tracker.usage(&SessionId::from("hallway-speaker")).unwrap();
    assert_eq!(usage.input_tokens, 120);
    assert_eq!(usage.cached_tokens, 100);
    assert_eq!(usage.output_tokens, 33);

    let content = ctx.finish().into_content();
    assert_eq!(content.len(), 2);
    assert!(matches!(&content[0], ContentBlock::Text { text } if text == "Turning on the lights. "));
    match &content[1] {
        ContentBlock::ToolUse { id, name, input } => {
            assert_eq!(id, "toolu_9");
            assert_eq!(name, "switch");
            assert_eq!(input, &json!({"room": "hall", "on": true}));
        }
        other => panic!("Expected ToolUse, got {:?}", other),
    }
}

#[tokio::test]
async fn test_gemini_replace_and_signature_end_to_end() {
    let body = sse(&[
        json!({"choices": [{"delta": {"tool_calls": [{
            "index": 0, "id": "g-1",
            "function": {"name": "get_weather", "arguments": "{\"loc\":\"NYC\"}"},
            "extra_content": {"google": {"thought_signature": "CiQB-opaque"}}
        }]}}]}),
        json!({"choices": [{"delta": {"tool_calls": [{
            "index": 0,
            "function": {"arguments": "{\"loc\":\"NYC\",\"unit\":\"F\"}"}
        }]}}]}),
        json!({"choices": [{"delta": {}, "finish_reason": "tool_calls"}],
               "usage": {"prompt_tokens": 50, "completion_tokens": 12}}),
    ]);

    let metrics = Arc::new(SharedMetrics::new());
    let mut ctx = StreamContext::builder(ProviderKind::Gemini)
        .on_text(|_| {})
        .metrics(metrics.clone())
        .build()
        .unwrap();
    pump(&mut ctx, stream::iter(body_chunks(&body, 11))).await.unwrap();

    let outcome = ctx.finish();
    assert_eq!(outcome.tool_calls.len(), 1);
    assert_eq!(outcome.tool_calls[0].arguments, "{\"loc\":\"NYC\",\"unit\":\"F\"}");
    assert_eq!(outcome.gemini_thought_signature.as_deref(), Some("CiQB-opaque"));
    assert_eq!(
        metrics.snapshot().usage_by_provider[&ProviderKind::Gemini].output_tokens,
        12
    );
}

#[tokio::test]
async fn test_limits_from_toml_applied() {
    let limits = StreamLimits::from_toml_str(
        r#"
        response_cap = 16384
        max_tool_calls = 1
        "#,
    )
    .unwrap();

    let body = sse(&[
        json!({"choices": [{"delta": {"content": "x".repeat(16000)}}]}),
        json!({"choices": [{"delta": {"content": "y".repeat(1000)}}]}),
        json!({"choices": [{"delta": {"tool_calls": [
            {"index": 0, "id": "a", "function": {"name": "one", "arguments": "{}"}},
            {"index": 1, "id": "b", "function": {"name": "two", "arguments": "{}"}}
        ]}}]}),
        json!({"choices": [{"delta": {}, "finish_reason": "tool_calls"}]}),
    ]);

    let mut ctx = StreamContext::builder(ProviderKind::OpenAI)
        .on_text(|_| {})
        .limits(limits)
        .build()
        .unwrap();
    pump(&mut ctx, stream::iter(body_chunks(&body, 4096))).await.unwrap();

    assert_eq!(ctx.response().len(), 16000);
    assert!(ctx.overflowed());
    assert_eq!(ctx.tool_calls().len(), 1);
    assert_eq!(ctx.tool_calls()[0].name, "one");
}
