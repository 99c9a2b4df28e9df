//! Usage tracking via the UsageSink trait.
//!
//! Every gateway call, successful or not, produces one [`ProviderCallRecord`].
//! Where it goes is up to the sink: nowhere ([`NoopUsageSink`]) or the log
//! ([`TracingUsageSink`]).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Success,
    Error,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Success => "success",
            CallStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProviderCallRecord {
    pub provider: &'static str,
    pub model: String,
    pub caller: &'static str,
    pub assignment_id: Option<String>,
    pub submission_id: Option<String>,
    pub images: usize,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_nanodollars: i64,
    pub latency_ms: u64,
    pub status: CallStatus,
    pub error_code: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ProviderCallRecord {
    pub fn new(provider: &'static str, model: impl Into<String>, caller: &'static str) -> Self {
        Self {
            provider,
            model: model.into(),
            caller,
            assignment_id: None,
            submission_id: None,
            images: 0,
            input_tokens: 0,
            output_tokens: 0,
            cost_nanodollars: 0,
            latency_ms: 0,
            status: CallStatus::Success,
            error_code: None,
            timestamp: Utc::now(),
        }
    }

    pub fn records(mut self, assignment_id: Option<String>, submission_id: Option<String>) -> Self {
        self.assignment_id = assignment_id;
        self.submission_id = submission_id;
        self
    }

    pub fn images(mut self, count: usize) -> Self {
        self.images = count;
        self
    }

    pub fn tokens(mut self, input: u32, output: u32) -> Self {
        self.input_tokens = input;
        self.output_tokens = output;
        self
    }

    pub fn cost(mut self, nanodollars: i64) -> Self {
        self.cost_nanodollars = nanodollars;
        self
    }

    pub fn latency(mut self, ms: u64) -> Self {
        self.latency_ms = ms;
        self
    }

    pub fn error(mut self, code: impl Into<String>) -> Self {
        self.status = CallStatus::Error;
        self.error_code = Some(code.into());
        self
    }
}

#[async_trait]
pub trait UsageSink: Send + Sync {
    /// Fire-and-forget: sinks log their own failures instead of returning them.
    async fn record(&self, record: ProviderCallRecord);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopUsageSink;

#[async_trait]
impl UsageSink for NoopUsageSink {
    async fn record(&self, _record: ProviderCallRecord) {}
}

/// Emits each record as a structured `info` event on the `usage` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingUsageSink;

#[async_trait]
impl UsageSink for TracingUsageSink {
    async fn record(&self, record: ProviderCallRecord) {
        tracing::info!(
            target: "usage",
            provider = record.provider,
            model = %record.model,
            caller = record.caller,
            assignment = record.assignment_id.as_deref().unwrap_or(""),
            submission = record.submission_id.as_deref().unwrap_or(""),
            images = record.images,
            tokens = record.input_tokens + record.output_tokens,
            cost_nanos = record.cost_nanodollars,
            latency_ms = record.latency_ms,
            status = record.status.as_str(),
            error = record.error_code.as_deref().unwrap_or(""),
            "provider call"
        );
    }
}
