//! reqwest-backed collaborators: the advice service, the permission service
//! and the text-generation model endpoint.

use std::time::Duration;

use async_trait::async_trait;
use counsel_agent::llm::{ModelError, ModelRequest, ModelResponse, TextModel};
use counsel_agent::services::{
    AdviceQuery, AdviceService, PermissionDirectory, ServiceReply, TransportError,
};
use counsel_core::config::{AdviceConfig, ModelConfig, PermissionsConfig};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::{debug, warn};

use crate::bootstrap::BootstrapError;

const THROTTLING_MARKER: &str = "ThrottlingException";

pub struct HttpAdviceService {
    client: Client,
    url: String,
    timeout: Duration,
}

impl HttpAdviceService {
    pub fn new(client: Client, config: &AdviceConfig) -> Self {
        Self { client, url: config.url.clone(), timeout: Duration::from_secs(config.timeout_secs) }
    }
}

#[async_trait]
impl AdviceService for HttpAdviceService {
    async fn advise(&self, query: &AdviceQuery) -> Result<ServiceReply, TransportError> {
        debug!(event_name = "upstream.advice.request", url = %self.url, "calling advice service");
        send(self.client.post(&self.url).json(query).timeout(self.timeout)).await
    }
}

pub struct HttpPermissionDirectory {
    client: Client,
    base_url: Url,
    lookup_timeout: Duration,
    subscribe_timeout: Duration,
}

impl HttpPermissionDirectory {
    pub fn new(client: Client, config: &PermissionsConfig) -> Result<Self, BootstrapError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|error| BootstrapError::InvalidUrl(format!("permissions.base_url: {error}")))?;
        if base_url.cannot_be_a_base() {
            return Err(BootstrapError::InvalidUrl(format!(
                "permissions.base_url: `{}` cannot carry a path",
                config.base_url
            )));
        }
        Ok(Self {
            client,
            base_url,
            lookup_timeout: Duration::from_secs(config.timeout_secs),
            subscribe_timeout: Duration::from_secs(config.subscribe_timeout_secs),
        })
    }

    /// Appends path segments to the base url; each segment is percent-encoded whole.
    fn resource_url(&self, segments: &[&str]) -> String {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url.to_string()
    }

    async fn lookup(&self, segments: &[&str]) -> Result<ServiceReply, TransportError> {
        let url = self.resource_url(segments);
        debug!(event_name = "upstream.permissions.request", url = %url, "calling permission service");
        send(self.client.get(&url).timeout(self.lookup_timeout)).await
    }
}

#[async_trait]
impl PermissionDirectory for HttpPermissionDirectory {
    async fn profile(&self, user_id: &str) -> Result<ServiceReply, TransportError> {
        self.lookup(&["profiles", user_id]).await
    }

    async fn permissions(&self, user_id: &str) -> Result<ServiceReply, TransportError> {
        self.lookup(&["permissions", user_id]).await
    }

    async fn add_agent(&self, user_id: &str, agent_name: &str) -> Result<ServiceReply, TransportError> {
        let url = self.subscription_url(user_id);
        debug!(event_name = "upstream.permissions.subscribe", url = %url, agent_name, "adding agent");
        send(
            self.client
                .post(&url)
                .json(&json!({ "agent_name": agent_name }))
                .timeout(self.subscribe_timeout),
        )
        .await
    }

    fn subscription_url(&self, user_id: &str) -> String {
        self.resource_url(&["permissions", user_id, "agents"])
    }
}

/// Model runtime invoked over HTTP with a bearer API key.
pub struct HttpTextModel {
    client: Client,
    invoke_url: String,
    api_key: Option<SecretString>,
    timeout: Duration,
}

impl HttpTextModel {
    pub fn new(client: Client, config: &ModelConfig) -> Self {
        Self {
            client,
            invoke_url: config.invoke_url(),
            api_key: config.api_key.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[async_trait]
impl TextModel for HttpTextModel {
    async fn invoke(&self, request: &ModelRequest) -> Result<String, ModelError> {
        let mut builder = self
            .client
            .post(&self.invoke_url)
            .header("Accept", "application/json")
            .json(request)
            .timeout(self.timeout);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key.expose_secret());
        }

        let response =
            builder.send().await.map_err(|error| ModelError::Failed(format!("model request failed: {error}")))?;
        let status = response.status();
        let error_type = response
            .headers()
            .get("x-amzn-errortype")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response
            .text()
            .await
            .map_err(|error| ModelError::Failed(format!("model response unreadable: {error}")))?;

        if !status.is_success() {
            let detail = format!("status {status}: {body}");
            if status == StatusCode::TOO_MANY_REQUESTS
                || error_type.contains(THROTTLING_MARKER)
                || body.contains(THROTTLING_MARKER)
            {
                warn!(event_name = "upstream.model.throttled", status = status.as_u16(), "model throttled");
                return Err(ModelError::Throttled(detail));
            }
            return Err(ModelError::Failed(detail));
        }

        let parsed: ModelResponse = serde_json::from_str(&body)
            .map_err(|error| ModelError::Failed(format!("model response malformed: {error}")))?;
        parsed
            .first_output()
            .map(str::to_string)
            .ok_or_else(|| ModelError::Failed("model returned no results".to_string()))
    }
}

async fn send(request: RequestBuilder) -> Result<ServiceReply, TransportError> {
    let response = request.send().await.map_err(classify)?;
    let status = response.status().as_u16();
    let body = response.text().await.map_err(classify)?;
    Ok(ServiceReply::new(status, body))
}

fn classify(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout(error.to_string())
    } else if error.is_connect() {
        TransportError::Connect(error.to_string())
    } else {
        TransportError::Other(error.to_string())
    }
}
