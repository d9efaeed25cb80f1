//! Seams to the external collaborators: the advice service and the
//! permission service. Implementations only move bytes; every status code is
//! interpreted by the caller.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceReply {
    pub status: u16,
    pub body: String,
}

impl ServiceReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status, body: body.into() }
    }

    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("transport failure: {0}")]
    Other(String),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AdviceQuery {
    pub question: String,
    pub length: String,
    pub temperature: f64,
}

#[async_trait]
pub trait AdviceService: Send + Sync {
    async fn advise(&self, query: &AdviceQuery) -> Result<ServiceReply, TransportError>;
}

#[async_trait]
pub trait PermissionDirectory: Send + Sync {
    /// `GET {base}/profiles/{user_id}`
    async fn profile(&self, user_id: &str) -> Result<ServiceReply, TransportError>;
    /// `GET {base}/permissions/{user_id}`
    async fn permissions(&self, user_id: &str) -> Result<ServiceReply, TransportError>;
    /// `POST {base}/permissions/{user_id}/agents` with `{agent_name}`
    async fn add_agent(&self, user_id: &str, agent_name: &str)
        -> Result<ServiceReply, TransportError>;
    fn subscription_url(&self, user_id: &str) -> String;
}
