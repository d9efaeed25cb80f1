use std::sync::Arc;

use counsel_agent::{
    AdvicePipeline, AdviceSettings, AgentRuntime, Enhancement, PermissionGate, RuntimeSettings,
};
use counsel_core::config::{AppConfig, ConfigError, LoadOptions};
use counsel_core::ResponseCache;
use reqwest::Client;
use thiserror::Error;
use tracing::info;

use crate::upstream::{HttpAdviceService, HttpPermissionDirectory, HttpTextModel};

pub struct Application {
    pub config: AppConfig,
    pub runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("http client construction failed: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("invalid collaborator url: {0}")]
    InvalidUrl(String),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let client = Client::builder().build().map_err(BootstrapError::HttpClient)?;

    let enhancement = if config.enhancement.bypass {
        Enhancement::Bypass
    } else {
        Enhancement::from_model_config(
            Arc::new(HttpTextModel::new(client.clone(), &config.model)),
            &config.model,
        )
    };

    let mut pipeline = AdvicePipeline::new(
        Arc::new(HttpAdviceService::new(client.clone(), &config.advice)),
        enhancement,
        AdviceSettings::from(&config.advice),
    );
    if let Some(cache) = ResponseCache::from_config(&config.cache) {
        pipeline = pipeline.with_cache(Arc::new(cache));
    }

    let gate = PermissionGate::new(Arc::new(HttpPermissionDirectory::new(client, &config.permissions)?));
    let settings = RuntimeSettings {
        agent_name: config.permissions.agent_name.clone(),
        action_group: config.server.action_group.clone(),
    };

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        enhancement = pipeline.enhancement().label(),
        cache_enabled = pipeline.cache().is_some(),
        agent_name = %settings.agent_name,
        "collaborators initialized"
    );

    Ok(Application { runtime: Arc::new(AgentRuntime::new(gate, pipeline, settings)), config })
}
