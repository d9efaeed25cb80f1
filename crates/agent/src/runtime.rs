use counsel_core::format::{format_response, preflight_response};
use counsel_core::{
    normalize, AdviceRequest, ApplicationError, Convention, InboundEvent,
    Invocation, OutboundResponse, Outcome, PermissionDenial, PermissionOutcome, Route,
    SubscribeRequest, UserLookup,
};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::accounts;
use crate::permissions::PermissionGate;
use crate::pipeline::AdvicePipeline;

/// Per-invocation identity threaded through logs and responses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvocationContext {
    pub correlation_id: String,
}

impl InvocationContext {
    pub fn new() -> Self {
        Self { correlation_id: Uuid::new_v4().to_string() }
    }

    pub fn with_correlation_id(correlation_id: impl Into<String>) -> Self {
        Self { correlation_id: correlation_id.into() }
    }
}

impl Default for InvocationContext {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub agent_name: String,
    pub action_group: String,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self { agent_name: "advice-agent".to_string(), action_group: "advice-proxy".to_string() }
    }
}

/// Wires normalizer, permission gate, advice pipeline and formatters into one handler.
#[derive(Clone)]
pub struct AgentRuntime {
    gate: PermissionGate,
    pipeline: AdvicePipeline,
    settings: RuntimeSettings,
}

impl AgentRuntime {
    pub fn new(gate: PermissionGate, pipeline: AdvicePipeline, settings: RuntimeSettings) -> Self {
        Self { gate, pipeline, settings }
    }

    pub fn pipeline(&self) -> &AdvicePipeline {
        &self.pipeline
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    pub async fn handle_event(&self, event: &Value, context: &InvocationContext) -> OutboundResponse {
        let correlation_id = context.correlation_id.as_str();
        match normalize(event) {
            Ok(InboundEvent::Warmup) => {
                let model_invoked = self.pipeline.warm().await;
                info!(event_name = "agent.runtime.warmup", correlation_id, model_invoked, "warmup handled");
                OutboundResponse::Acknowledgement(json!({
                    "status": "warm",
                    "message": "warmup complete",
                    "model_invoked": model_invoked,
                }))
            }
            Ok(InboundEvent::Preflight) => OutboundResponse::Http(preflight_response()),
            Ok(InboundEvent::Invocation(invocation)) => {
                info!(
                    event_name = "agent.runtime.invocation",
                    correlation_id,
                    route = ?invocation.route,
                    convention = ?invocation.convention,
                    "dispatching invocation"
                );
                let outcome = self.dispatch(&invocation, context).await;
                self.respond(outcome, invocation.convention, &invocation.api_path, &invocation.verb, context)
            }
            Err(rejected) => {
                warn!(
                    event_name = "agent.runtime.rejected",
                    correlation_id,
                    error = %rejected.error,
                    "inbound event rejected"
                );
                let outcome = Outcome::Failure(rejected.error.into_interface(correlation_id));
                self.respond(outcome, rejected.convention, &rejected.api_path, &rejected.verb, context)
            }
        }
    }

    pub async fn dispatch(&self, invocation: &Invocation, context: &InvocationContext) -> Outcome {
        let directory = self.gate.directory().as_ref();
        let params = &invocation.params;
        match invocation.route {
            Route::GetAdvice => match AdviceRequest::from_params(params) {
                Ok(request) => self.advise(&request, context).await,
                Err(error) => reject(error, context),
            },
            Route::Subscribe => {
                // Agent platforms may omit agent_name; direct callers must name it.
                let default_agent = (invocation.convention != Convention::DirectHttp)
                    .then_some(self.settings.agent_name.as_str());
                match SubscribeRequest::from_params(params, default_agent) {
                    Ok(request) => accounts::subscribe(directory, &request).await,
                    Err(error) => reject(error, context),
                }
            }
            Route::CheckUser => match UserLookup::from_params(params) {
                Ok(lookup) => accounts::check_user(directory, &lookup).await,
                Err(error) => reject(error, context),
            },
            Route::CheckPermissions => match UserLookup::from_params(params) {
                Ok(lookup) => accounts::check_permissions(directory, &lookup, &self.settings.agent_name).await,
                Err(error) => reject(error, context),
            },
        }
    }

    /// Gate first; the cache and the advice service are only reached once entitlement is confirmed.
    pub async fn advise(&self, request: &AdviceRequest, context: &InvocationContext) -> Outcome {
        let correlation_id = context.correlation_id.as_str();
        let user_id = request.user_id.as_str();
        let agent_name = self.settings.agent_name.as_str();

        let outcome = self.gate.check(user_id, agent_name).await;
        info!(
            event_name = "agent.permissions.checked",
            correlation_id,
            user_id,
            outcome = outcome.label(),
            "permission check complete"
        );

        match outcome {
            PermissionOutcome::Granted(_) => {
                let result = self.pipeline.generate(&request.question, request.context.as_deref(), user_id).await;
                Outcome::Success(json!({
                    "advice": result.advice,
                    "user_id": user_id,
                    "cached": result.cached,
                    "request_id": correlation_id,
                }))
            }
            PermissionOutcome::NoPermission(_) => {
                let error = ApplicationError::PermissionDenied {
                    denial: PermissionDenial::SubscriptionRequired,
                    user_id: user_id.to_string(),
                    agent_name: agent_name.to_string(),
                }
                .into_interface(correlation_id)
                .with_context("subscription_instructions", self.subscription_instructions(user_id));
                Outcome::Failure(error)
            }
            PermissionOutcome::ProfileNotFound => Outcome::Failure(
                ApplicationError::PermissionDenied {
                    denial: PermissionDenial::ProfileNotFound,
                    user_id: user_id.to_string(),
                    agent_name: agent_name.to_string(),
                }
                .into_interface(correlation_id),
            ),
            PermissionOutcome::CheckFailed => Outcome::Failure(
                ApplicationError::Upstream(format!("permission check for `{user_id}` did not complete"))
                    .into_interface(correlation_id)
                    .with_context("user_id", user_id),
            ),
        }
    }

    fn subscription_instructions(&self, user_id: &str) -> Value {
        let agent_name = &self.settings.agent_name;
        json!({
            "method": "POST",
            "url": self.gate.directory().subscription_url(user_id),
            "body": { "agent_name": agent_name },
            "description": format!("Subscribe to the {agent_name} service to start receiving advice."),
        })
    }

    fn respond(
        &self,
        outcome: Outcome,
        convention: Convention,
        api_path: &str,
        verb: &str,
        context: &InvocationContext,
    ) -> OutboundResponse {
        let outcome = match outcome {
            Outcome::Failure(error) => {
                Outcome::Failure(error.with_correlation_id(context.correlation_id.as_str()))
            }
            success => success,
        };
        format_response(&outcome, convention, &self.settings.action_group, api_path, verb)
    }
}

fn reject(error: ApplicationError, context: &InvocationContext) -> Outcome {
    Outcome::Failure(error.into_interface(context.correlation_id.as_str()))
}
