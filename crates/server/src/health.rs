use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use counsel_agent::AgentRuntime;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    runtime: Arc<AgentRuntime>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CacheCheck {
    pub enabled: bool,
    pub entries: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub cache: CacheCheck,
    pub enhancement: &'static str,
    pub checked_at: String,
}

pub fn router(runtime: Arc<AgentRuntime>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { runtime })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let pipeline = state.runtime.pipeline();
    let cache = match pipeline.cache() {
        Some(cache) => CacheCheck { enabled: true, entries: cache.len() },
        None => CacheCheck { enabled: false, entries: 0 },
    };

    let payload = HealthResponse {
        status: "ready",
        service: HealthCheck {
            status: "ready",
            detail: format!("serving agent `{}`", state.runtime.settings().agent_name),
        },
        cache,
        enhancement: pipeline.enhancement().label(),
        checked_at: Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(payload))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::{extract::State, http::StatusCode, Json};
    use counsel_agent::services::{AdviceQuery, AdviceService, ServiceReply, TransportError};
    use counsel_agent::{
        AdvicePipeline, AdviceSettings, AgentRuntime, Enhancement, PermissionGate, RuntimeSettings,
    };
    use counsel_core::config::AppConfig;
    use counsel_core::ResponseCache;
    use reqwest::Client;

    use crate::health::{health, HealthState};
    use crate::upstream::HttpPermissionDirectory;

    struct SilentAdvice;

    #[async_trait]
    impl AdviceService for SilentAdvice {
        async fn advise(&self, _query: &AdviceQuery) -> Result<ServiceReply, TransportError> {
            Ok(ServiceReply::new(500, ""))
        }
    }

    fn runtime(cache: Option<Arc<ResponseCache>>) -> Arc<AgentRuntime> {
        let mut pipeline =
            AdvicePipeline::new(Arc::new(SilentAdvice), Enhancement::Bypass, AdviceSettings::default());
        if let Some(cache) = cache {
            pipeline = pipeline.with_cache(cache);
        }
        let directory = HttpPermissionDirectory::new(Client::new(), &AppConfig::default().permissions)
            .expect("default permissions url");
        Arc::new(AgentRuntime::new(
            PermissionGate::new(Arc::new(directory)),
            pipeline,
            RuntimeSettings::default(),
        ))
    }

    #[tokio::test]
    async fn health_reports_cache_size_and_enhancement_mode() {
        let cache = Arc::new(ResponseCache::new(Duration::from_secs(60), 10));
        cache.set("u1", "q", None, "cached advice");

        let (status, Json(payload)) = health(State(HealthState { runtime: runtime(Some(cache)) })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.cache.entries, 1);
        assert!(payload.cache.enabled);
        assert_eq!(payload.enhancement, "bypass");
    }

    #[tokio::test]
    async fn health_reports_disabled_cache() {
        let (_, Json(payload)) = health(State(HealthState { runtime: runtime(None) })).await;

        assert!(!payload.cache.enabled);
        assert_eq!(payload.cache.entries, 0);
    }
}
