//! Scripted transport for unit tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::transport::{FailureReason, Payload, Transport, UpstreamOutcome};
use super::variants::RequestVariant;

/// Replays queued outcomes in order; answers `default` once the queue drains
pub struct MockTransport {
    script: Mutex<VecDeque<UpstreamOutcome>>,
    default: UpstreamOutcome,
    calls: AtomicUsize,
    labels: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl MockTransport {
    pub fn new(script: Vec<UpstreamOutcome>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            default: UpstreamOutcome::Empty,
            calls: AtomicUsize::new(0),
            labels: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Always answer with the same outcome
    pub fn always(outcome: UpstreamOutcome) -> Self {
        Self::new(Vec::new()).with_default(outcome)
    }

    pub fn with_default(mut self, outcome: UpstreamOutcome) -> Self {
        self.default = outcome;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Variant labels in the order they were sent
    pub fn labels(&self) -> Vec<String> {
        self.labels.lock().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, variant: &RequestVariant) -> UpstreamOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.labels.lock().push(variant.label.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| self.default.clone())
    }
}

pub fn success(rows: Vec<Value>) -> UpstreamOutcome {
    UpstreamOutcome::Success(Payload { rows, etag: None })
}

pub fn server_error(status: u16) -> UpstreamOutcome {
    UpstreamOutcome::Retryable(FailureReason::status(status, "upstream unavailable", None))
}

pub fn rate_limited(retry_after: Duration) -> UpstreamOutcome {
    UpstreamOutcome::Retryable(FailureReason::status(429, "", Some(retry_after)))
}

pub fn bad_request() -> UpstreamOutcome {
    UpstreamOutcome::Fatal(FailureReason::status(400, "unknown field", None))
}
