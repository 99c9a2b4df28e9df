//! Model gateway: the black-box seam to the vision model.
//!
//! Graders depend only on [`ChatGateway`]; [`ProviderGateway`] is the real
//! OpenRouter-backed implementation with retries and usage recording.

pub mod error;
pub mod openrouter;
pub mod pricing;
pub mod types;
pub mod usage;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use openrouter::{ChatProvider, OpenRouterAdapter};
use usage::ProviderCallRecord;

pub use error::{ErrorContext, ProviderError};
pub use pricing::chat_cost;
pub use types::*;
pub use usage::{CallStatus, NoopUsageSink, TracingUsageSink, UsageSink};

#[async_trait::async_trait]
pub trait ChatGateway: Send + Sync {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_base_delay: Duration::from_secs(1),
        }
    }
}

pub struct ProviderGateway<U: UsageSink> {
    provider: Arc<dyn ChatProvider>,
    usage_sink: Arc<U>,
    config: GatewayConfig,
}

#[async_trait::async_trait]
impl<U: UsageSink> ChatGateway for ProviderGateway<U> {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        ProviderGateway::chat(self, req).await
    }
}

impl<U: UsageSink> ProviderGateway<U> {
    pub fn from_env(usage_sink: Arc<U>) -> Result<Self, ProviderError> {
        let openrouter = OpenRouterAdapter::from_env()?;
        Ok(Self::with_config(
            Arc::new(openrouter),
            usage_sink,
            GatewayConfig::default(),
        ))
    }

    pub fn with_config(
        provider: Arc<dyn ChatProvider>,
        usage_sink: Arc<U>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            provider,
            usage_sink,
            config,
        }
    }

    pub async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let mut attempt = 0;
        loop {
            match self.provider.chat(&req).await {
                Ok(resp) => {
                    self.record_usage(&req, Some(&resp), None).await;
                    return Ok(resp);
                }
                Err(err) => {
                    self.record_usage(&req, None, Some(err.code())).await;
                    if !err.is_retryable() || attempt >= self.config.max_retries {
                        return Err(err);
                    }
                    let delay = backoff_delay(self.config.retry_base_delay, attempt);
                    tracing::debug!(error = %err, attempt, ?delay, "retrying provider call");
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn record_usage(
        &self,
        req: &ChatRequest,
        resp: Option<&ChatResponse>,
        error_code: Option<&str>,
    ) {
        let mut record = ProviderCallRecord::new(
            req.model.provider(),
            req.model.model_id(),
            req.attribution.caller,
        )
        .records(
            req.attribution.assignment_id.clone(),
            req.attribution.submission_id.clone(),
        )
        .images(req.image_count());

        if let Some(resp) = resp {
            record = record
                .tokens(resp.input_tokens, resp.output_tokens)
                .cost(resp.cost_nanodollars)
                .latency(resp.latency.as_millis() as u64);
        }
        if let Some(code) = error_code {
            record = record.error(code);
        }

        self.usage_sink.record(record).await;
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base * 2u32.pow(attempt.min(5))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(400));
        assert_eq!(backoff_delay(base, 9), Duration::from_millis(3_200));
    }
}
