// ABOUTME: Collaborators notified from inside a stream - metrics, live UI
// ABOUTME: notifications, and per-session context usage - plus shared impls.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::llm::{ProviderKind, TokenUsage};

/// Opaque identifier of the user session a stream belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh random session id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Receives latency and token telemetry. Shared by concurrent streams.
pub trait MetricsSink: Send + Sync {
    /// Time from stream start to the first visible text fragment.
    fn record_ttft(&self, provider: ProviderKind, ttft: Duration);

    /// Final token usage of a stream.
    fn record_usage(&self, provider: ProviderKind, usage: &TokenUsage);

    /// A trusted generation rate.
    fn record_rate(&self, provider: ProviderKind, tokens_per_second: f64);
}

/// Best-effort push channel to a live UI.
///
/// Errors are logged and otherwise ignored.
pub trait LiveNotifier: Send + Sync {
    fn thinking_started(&self, provider: ProviderKind) -> anyhow::Result<()>;

    fn thinking_delta(&self, text: &str) -> anyhow::Result<()>;

    fn thinking_ended(&self, has_content: bool) -> anyhow::Result<()>;

    fn rate_update(&self, tokens_per_second: f64) -> anyhow::Result<()>;
}

/// Tracks how much of the model's context window each session has used.
pub trait UsageTracker: Send + Sync {
    fn update_usage(&self, session: &SessionId, usage: &TokenUsage);
}

/// The collaborators attached to one stream.
#[derive(Clone, Default)]
pub(crate) struct Observers {
    pub metrics: Option<Arc<dyn MetricsSink>>,
    pub notifier: Option<Arc<dyn LiveNotifier>>,
    pub usage_tracker: Option<Arc<dyn UsageTracker>>,
}

impl Observers {
    pub fn notify(
        &self,
        what: &'static str,
        f: impl FnOnce(&dyn LiveNotifier) -> anyhow::Result<()>,
    ) {
        if let Some(notifier) = &self.notifier {
            if let Err(e) = f(notifier.as_ref()) {
                debug!(error = %e, what, "Live notification failed");
            }
        }
    }
}

/// Point-in-time copy of [`SharedMetrics`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    pub ttft_samples: Vec<Duration>,
    pub usage_by_provider: HashMap<ProviderKind, TokenUsage>,
    pub usage_reports: u64,
    pub last_rate: Option<f64>,
}

impl MetricsSnapshot {
    pub fn mean_ttft(&self) -> Option<Duration> {
        if self.ttft_samples.is_empty() {
            return None;
        }
        let total: Duration = self.ttft_samples.iter().sum();
        Some(total / self.ttft_samples.len() as u32)
    }
}

/// Thread-safe in-process metrics aggregate.
#[derive(Debug, Default)]
pub struct SharedMetrics {
    inner: Mutex<MetricsSnapshot>,
}

impl SharedMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().clone()
    }
}

impl MetricsSink for SharedMetrics {
    fn record_ttft(&self, _provider: ProviderKind, ttft: Duration) {
        self.inner.lock().ttft_samples.push(ttft);
    }

    fn record_usage(&self, provider: ProviderKind, usage: &TokenUsage) {
        let mut inner = self.inner.lock();
        let total = inner.usage_by_provider.entry(provider).or_default();
        total.input_tokens = total.input_tokens.saturating_add(usage.input_tokens);
        total.output_tokens = total.output_tokens.saturating_add(usage.output_tokens);
        total.cached_tokens = total.cached_tokens.saturating_add(usage.cached_tokens);
        total.reasoning_tokens = total.reasoning_tokens.saturating_add(usage.reasoning_tokens);
        inner.usage_reports += 1;
    }

    fn record_rate(&self, _provider: ProviderKind, tokens_per_second: f64) {
        self.inner.lock().last_rate = Some(tokens_per_second);
    }
}

/// Thread-safe map of each session's latest usage against a context window.
#[derive(Debug)]
pub struct ContextWindowTracker {
    window_tokens: u32,
    sessions: RwLock<HashMap<SessionId, TokenUsage>>,
}

impl ContextWindowTracker {
    pub fn new(window_tokens: u32) -> Self {
        Self {
            window_tokens,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn usage(&self, session: &SessionId) -> Option<TokenUsage> {
        self.sessions.read().get(session).copied()
    }

    /// Fraction of the window filled by the session's last exchange.
    pub fn utilization(&self, session: &SessionId) -> Option<f64> {
        if self.window_tokens == 0 {
            return None;
        }
        let usage = self.usage(session)?;
        let used = u64::from(usage.input_tokens) + u64::from(usage.output_tokens);
        Some(used as f64 / f64::from(self.window_tokens))
    }

    pub fn forget(&self, session: &SessionId) {
        self.sessions.write().remove(session);
    }
}

impl UsageTracker for ContextWindowTracker {
    fn update_usage(&self, session: &SessionId, usage: &TokenUsage) {
        self.sessions.write().insert(session.clone(), *usage);
    }
}
