use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRequest {
    pub input_text: String,
    pub text_generation_config: TextGenerationConfig,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextGenerationConfig {
    pub max_token_count: u32,
    pub temperature: f64,
    pub top_p: f64,
}

impl Default for TextGenerationConfig {
    fn default() -> Self {
        Self { max_token_count: 800, temperature: 0.3, top_p: 0.9 }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ModelResponse {
    #[serde(default)]
    pub results: Vec<ModelResult>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ModelResult {
    #[serde(rename = "outputText", default)]
    pub output_text: String,
}

impl ModelResponse {
    pub fn first_output(&self) -> Option<&str> {
        self.results.first().map(|result| result.output_text.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("model throttled: {0}")]
    Throttled(String),
    #[error("model invocation failed: {0}")]
    Failed(String),
}

impl ModelError {
    pub fn is_throttling(&self) -> bool {
        matches!(self, Self::Throttled(_))
    }
}

#[async_trait]
pub trait TextModel: Send + Sync {
    async fn invoke(&self, request: &ModelRequest) -> Result<String, ModelError>;
}

/// Bounded retry for throttling-class model errors.
///
/// Delay before retry `n` (0-based) is `base_delay * factor^n + U[0, max_jitter)`.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub factor: f64,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            factor: 1.5,
            max_jitter: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self { max_retries, ..Self::default() }
    }

    /// `jitter_fraction` is expected in `[0, 1)`.
    pub fn delay_for(&self, attempt: u32, jitter_fraction: f64) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let backoff = self.base_delay.as_secs_f64() * self.factor.powi(exponent);
        let jitter = self.max_jitter.as_secs_f64() * jitter_fraction.clamp(0.0, 1.0);
        Duration::try_from_secs_f64((backoff + jitter).max(0.0)).unwrap_or(Duration::MAX)
    }
}

pub async fn invoke_with_retry(
    model: &dyn TextModel,
    request: &ModelRequest,
    policy: &RetryPolicy,
) -> Result<String, ModelError> {
    let mut attempt = 0;
    loop {
        match model.invoke(request).await {
            Ok(output) => return Ok(output),
            Err(error) if error.is_throttling() && attempt < policy.max_retries => {
                let jitter_fraction = rand::thread_rng().gen::<f64>();
                let delay = policy.delay_for(attempt, jitter_fraction);
                warn!(
                    event_name = "agent.model.throttled",
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "model throttled, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}
