//! Advice generation: external advice service, optional enhancement through a
//! text model, and a deterministic fallback.
//!
//! `generate` never fails. Advice-service failures produce the fallback
//! template; enhancement failures degrade to the raw advice. Only advice that
//! came back from the service is cached.

use std::sync::Arc;

use counsel_core::config::{AdviceConfig, ModelConfig};
use counsel_core::ResponseCache;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::llm::{invoke_with_retry, ModelRequest, RetryPolicy, TextGenerationConfig, TextModel};
use crate::services::{AdviceQuery, AdviceService, ServiceReply, TransportError};

pub const CLARIFICATION_PROMPT: &str =
    "I'd be happy to help! Could you please ask me a specific question?";

/// Advice field text shorter than this (after trimming) is treated as a failed answer.
/// Plain-text bodies must be strictly longer.
pub const MIN_ADVICE_CHARS: usize = 10;

const SUMMARY_MIN_LINES: usize = 3;
const SUMMARY_MIN_CHARS: usize = 200;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AdviceError {
    #[error("advice service returned status {0}")]
    Status(u16),
    #[error("advice service reported an error: {0}")]
    Reported(String),
    #[error("advice service returned empty or invalid advice")]
    Empty,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdviceOrigin {
    Clarification,
    Cache,
    Service,
    Fallback,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdviceResult {
    pub advice: String,
    pub cached: bool,
    pub origin: AdviceOrigin,
}

impl AdviceResult {
    fn new(advice: String, origin: AdviceOrigin) -> Self {
        Self { advice, cached: origin == AdviceOrigin::Cache, origin }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AdviceSettings {
    pub length: String,
    pub temperature: f64,
}

impl From<&AdviceConfig> for AdviceSettings {
    fn from(config: &AdviceConfig) -> Self {
        Self { length: config.length.clone(), temperature: config.temperature }
    }
}

impl Default for AdviceSettings {
    fn default() -> Self {
        Self { length: "long".to_string(), temperature: 0.5 }
    }
}

#[derive(Clone)]
pub enum Enhancement {
    /// Mechanical reformat only; the model is never called.
    Bypass,
    Model { model: Arc<dyn TextModel>, generation: TextGenerationConfig, retry: RetryPolicy },
}

impl Enhancement {
    pub fn from_model_config(model: Arc<dyn TextModel>, config: &ModelConfig) -> Self {
        Self::Model {
            model,
            generation: TextGenerationConfig {
                max_token_count: config.max_token_count,
                temperature: config.temperature,
                top_p: config.top_p,
            },
            retry: RetryPolicy::with_max_retries(config.max_retries),
        }
    }

    pub fn is_bypassed(&self) -> bool {
        matches!(self, Self::Bypass)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Bypass => "bypass",
            Self::Model { .. } => "model",
        }
    }
}

#[derive(Clone)]
pub struct AdvicePipeline {
    advice: Arc<dyn AdviceService>,
    enhancement: Enhancement,
    cache: Option<Arc<ResponseCache>>,
    settings: AdviceSettings,
}

impl AdvicePipeline {
    pub fn new(advice: Arc<dyn AdviceService>, enhancement: Enhancement, settings: AdviceSettings) -> Self {
        Self { advice, enhancement, cache: None, settings }
    }

    pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn cache(&self) -> Option<&Arc<ResponseCache>> {
        self.cache.as_ref()
    }

    pub fn enhancement(&self) -> &Enhancement {
        &self.enhancement
    }

    pub async fn generate(&self, question: &str, context: Option<&str>, user_id: &str) -> AdviceResult {
        if question.trim().is_empty() {
            debug!(event_name = "agent.advice.clarification", user_id, "blank question");
            return AdviceResult::new(CLARIFICATION_PROMPT.to_string(), AdviceOrigin::Clarification);
        }
        let context = context.filter(|context| !context.trim().is_empty());

        if let Some(cached) = self.cache.as_ref().and_then(|cache| cache.get(user_id, question, context)) {
            info!(event_name = "agent.advice.cache_hit", user_id, "serving cached advice");
            return AdviceResult::new(cached, AdviceOrigin::Cache);
        }

        let raw = match self.fetch(question, context).await {
            Ok(raw) => raw,
            Err(error) => {
                warn!(
                    event_name = "agent.advice.fallback",
                    user_id,
                    error = %error,
                    "advice service failed, returning fallback guidance"
                );
                return AdviceResult::new(fallback_advice(question, context), AdviceOrigin::Fallback);
            }
        };

        let advice = self.enhance(raw, question, context, user_id).await;
        if let Some(cache) = &self.cache {
            cache.set(user_id, question, context, advice.clone());
        }
        info!(event_name = "agent.advice.generated", user_id, enhancement = self.enhancement.label(), "advice generated");
        AdviceResult::new(advice, AdviceOrigin::Service)
    }

    /// Keeps the model connection warm. Returns whether the model was invoked.
    pub async fn warm(&self) -> bool {
        let Enhancement::Model { model, generation, .. } = &self.enhancement else {
            return false;
        };
        let request = ModelRequest {
            input_text: "Reply with OK.".to_string(),
            text_generation_config: TextGenerationConfig { max_token_count: 10, ..*generation },
        };
        if let Err(error) = model.invoke(&request).await {
            debug!(event_name = "agent.model.warmup_failed", error = %error, "warmup invocation failed");
        }
        true
    }

    async fn fetch(&self, question: &str, context: Option<&str>) -> Result<String, AdviceError> {
        let query = AdviceQuery {
            question: full_question(question, context),
            length: self.settings.length.clone(),
            temperature: self.settings.temperature,
        };
        let reply = self.advice.advise(&query).await?;
        extract_advice(&reply)
    }

    async fn enhance(&self, raw: String, question: &str, context: Option<&str>, user_id: &str) -> String {
        let (model, generation, retry) = match &self.enhancement {
            Enhancement::Bypass => return reformat(&raw),
            Enhancement::Model { model, generation, retry } => (model, generation, retry),
        };

        let request = ModelRequest {
            input_text: enhancement_prompt(&raw, question, context),
            text_generation_config: *generation,
        };
        match invoke_with_retry(model.as_ref(), &request, retry).await {
            Ok(output) if !output.trim().is_empty() => output.trim().to_string(),
            Ok(_) => {
                warn!(event_name = "agent.model.empty_output", user_id, "model returned no text, using raw advice");
                raw
            }
            Err(error) => {
                warn!(
                    event_name = "agent.model.enhancement_failed",
                    user_id,
                    error = %error,
                    "enhancement failed, using raw advice"
                );
                raw
            }
        }
    }
}

pub fn full_question(question: &str, context: Option<&str>) -> String {
    match context {
        Some(context) => format!("{question}. Additional context: {context}"),
        None => question.to_string(),
    }
}

/// Interprets an advice-service reply.
pub fn extract_advice(reply: &ServiceReply) -> Result<String, AdviceError> {
    if reply.status != 200 {
        return Err(AdviceError::Status(reply.status));
    }

    let advice = match serde_json::from_str::<Value>(&reply.body) {
        Ok(Value::Object(body)) => {
            if let Some(error) = body.get("error") {
                return Err(AdviceError::Reported(text_of(error)));
            }
            match ["advice", "response", "answer"].iter().find_map(|field| body.get(*field)) {
                Some(Value::Null) => return Err(AdviceError::Empty),
                Some(value) => text_of(value),
                None => Value::Object(body.clone()).to_string(),
            }
        }
        Ok(other) => text_of(&other),
        Err(_) => {
            return if reply.body.trim().chars().count() > MIN_ADVICE_CHARS {
                Ok(reply.body.clone())
            } else {
                Err(AdviceError::Empty)
            };
        }
    };

    if advice.trim().chars().count() < MIN_ADVICE_CHARS {
        return Err(AdviceError::Empty);
    }
    Ok(advice)
}

/// Trims, collapses runs of blank lines, and prepends a quick summary to long answers.
pub fn reformat(raw: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    for line in raw.trim().lines().map(str::trim_end) {
        let blank = line.trim().is_empty();
        if blank && lines.last().map_or(true, |previous| previous.is_empty()) {
            continue;
        }
        lines.push(if blank { "" } else { line });
    }
    let body = lines.join("\n");

    let content_lines = lines.iter().filter(|line| !line.is_empty()).count();
    if content_lines > SUMMARY_MIN_LINES && body.chars().count() > SUMMARY_MIN_CHARS {
        let first = lines.first().map(|line| line.trim()).unwrap_or_default();
        return format!("Quick summary: {first}\n\n{body}");
    }
    body
}

pub fn enhancement_prompt(raw: &str, question: &str, context: Option<&str>) -> String {
    let mut prompt = String::from(
        "You reformat text. Rewrite the advice below without adding any new facts, \
         recommendations, figures, or opinions.\n\n",
    );
    prompt.push_str(&format!("Question: {question}\n"));
    if let Some(context) = context {
        prompt.push_str(&format!("Context: {context}\n"));
    }
    prompt.push_str(&format!("\nAdvice:\n{raw}\n\n"));
    prompt.push_str(
        "Rules:\n\
         1. Start with a TL;DR of two or three sentences built only from points already in the advice.\n\
         2. Follow it with plain paragraphs that carry the remaining content. Drop markdown headers and bullets.\n\
         3. Keep every figure, price and recommendation exactly as given.\n\
         4. Never introduce information that is not in the advice.\n\n\
         Output format:\n\
         TL;DR: <summary>\n\n\
         <paragraphs>",
    );
    prompt
}

/// Generic guidance returned when the advice service cannot answer.
pub fn fallback_advice(question: &str, context: Option<&str>) -> String {
    let mut advice = format!(
        "Thank you for your question: \"{question}\"\n\n\
         Our advice service is having trouble right now, so here is some general guidance in the meantime:\n\n\
         1. Research the topic using reliable sources and expert opinion.\n\
         2. Compare several perspectives before deciding.\n\
         3. Break large decisions into small, manageable steps.\n\
         4. Consult a professional who specialises in the area.\n\
         5. Give yourself time to reflect before committing."
    );
    if let Some(context) = context {
        advice.push_str(&format!(
            "\n\nGiven your context ({context}), please ask again later for advice tailored to your situation."
        ));
    }
    advice.push_str("\n\nPlease try again in a few minutes for personalised advice.");
    advice
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
