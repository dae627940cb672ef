// ABOUTME: Replays a captured LLM SSE body through llmstream, printing each
// ABOUTME: sentence as speech would receive it and then the stream outcome.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use futures::stream;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use llmstream::prelude::*;

/// Replay a captured provider stream the way the voice pipeline consumes it.
#[derive(Parser)]
#[command(name = "stream-replay", version, about)]
struct Cli {
    /// Captured SSE response body.
    capture: PathBuf,

    /// Provider that produced the capture (local, openai, claude, gemini).
    #[arg(short, long, default_value = "openai")]
    provider: ProviderKind,

    /// TOML file with stream limits.
    #[arg(short, long)]
    limits: Option<PathBuf>,

    /// Bytes delivered per simulated network read.
    #[arg(long, default_value = "512")]
    chunk_size: NonZeroUsize,
}

/// What a replay produced.
#[derive(Debug, Serialize)]
struct Replay {
    sentences: Vec<String>,
    stats: PumpStats,
    outcome: StreamOutcome,
}

struct Speaker {
    buffer: SentenceBuffer,
    spoken: Vec<String>,
}

impl Speaker {
    fn new(cap: usize) -> Self {
        Self {
            buffer: SentenceBuffer::with_cap(cap),
            spoken: Vec::new(),
        }
    }

    fn say(&mut self, sentence: String) {
        println!("> {sentence}");
        self.spoken.push(sentence);
    }
}

fn load_limits(path: &Path) -> Result<StreamLimits> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading limits from {}", path.display()))?;
    Ok(StreamLimits::from_toml_str(&text)?)
}

async fn replay(
    provider: ProviderKind,
    limits: StreamLimits,
    capture: &[u8],
    chunk_size: NonZeroUsize,
) -> Result<Replay> {
    let speaker = Arc::new(Mutex::new(Speaker::new(limits.sentence_buffer_cap)));
    let sink = Arc::clone(&speaker);

    let mut ctx = StreamContext::builder(provider)
        .limits(limits)
        .session_id("replay")
        .on_text(move |text| {
            let mut speaker = sink.lock();
            for sentence in speaker.buffer.push(text) {
                speaker.say(sentence);
            }
        })
        .build()?;

    let body = stream::iter(
        capture
            .chunks(chunk_size.get())
            .map(Ok::<_, std::io::Error>),
    );
    let stats = pump(&mut ctx, body).await?;

    if !ctx.is_complete() {
        info!(provider = %provider, "Capture ended before the stream completed");
    }

    let sentences = {
        let mut speaker = speaker.lock();
        if let Some(rest) = speaker.buffer.flush() {
            speaker.say(rest);
        }
        std::mem::take(&mut speaker.spoken)
    };

    Ok(Replay {
        sentences,
        stats,
        outcome: ctx.finish(),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let limits = match &cli.limits {
        Some(path) => load_limits(path)?,
        None => StreamLimits::default(),
    };
    let capture = tokio::fs::read(&cli.capture)
        .await
        .with_context(|| format!("reading capture {}", cli.capture.display()))?;

    let result = replay(cli.provider, limits, &capture, cli.chunk_size).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    const CLAUDE_CAPTURE: &str = concat!(
        "event: message_start\n",
        "data: {\"type\":\"message_start\",\"message\":{\"usage\":{\"input_tokens\":12}}}\n\n",
        "event: content_block_start\n",
        "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi there. How can\"}}\n\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\" I help\"}}\n\n",
        "event: content_block_stop\n",
        "data: {\"type\":\"content_block_stop\",\"index\":0}\n\n",
        "event: message_delta\n",
        "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":7}}\n\n",
        "event: message_stop\n",
        "data: {\"type\":\"message_stop\"}\n\n",
    );

    fn chunk(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[tokio::test]
    async fn test_replay_splits_sentences_and_flushes() {
        let result = replay(
            ProviderKind::Claude,
            StreamLimits::default(),
            CLAUDE_CAPTURE.as_bytes(),
            chunk(5),
        )
        .await
        .unwrap();

        assert_eq!(result.sentences, vec!["Hi there.", "How can I help"]);
        assert!(result.outcome.complete);
        assert_eq!(result.outcome.response, "Hi there. How can I help");
        assert_eq!(result.stats.bytes, CLAUDE_CAPTURE.len());
    }

    #[tokio::test]
    async fn test_replay_output_serializes() {
        let result = replay(
            ProviderKind::Claude,
            StreamLimits::default(),
            CLAUDE_CAPTURE.as_bytes(),
            chunk(4096),
        )
        .await
        .unwrap();

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["outcome"]["stop_reason"], "end_turn");
        assert_eq!(json["outcome"]["telemetry"]["usage"]["input_tokens"], 12);
        assert_eq!(json["stats"]["chunks"], 1);
    }

    #[test]
    fn test_load_limits_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "response_cap = 65536\nmax_tool_calls = 4").unwrap();

        let limits = load_limits(file.path()).unwrap();
        assert_eq!(limits.response_cap, 65536);
        assert_eq!(limits.max_tool_calls, 4);
    }

    #[test]
    fn test_load_limits_rejects_invalid_values() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "max_tool_calls = 0").unwrap();

        let err = load_limits(file.path()).unwrap_err();
        assert!(err.to_string().contains("max_tool_calls"));
    }

    #[test]
    fn test_cli_parses_provider_aliases() {
        let args = ["stream-replay", "cap.sse", "-p", "anthropic", "--chunk-size", "64"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.provider, ProviderKind::Claude);
        assert_eq!(cli.chunk_size.get(), 64);

        assert!(Cli::try_parse_from(["stream-replay", "cap.sse", "--chunk-size", "0"]).is_err());
        assert!(Cli::try_parse_from(["stream-replay", "cap.sse", "-p", "mystery"]).is_err());
    }
}
