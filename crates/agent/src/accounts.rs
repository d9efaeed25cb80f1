//! Account-facing routes that talk to the permission service directly:
//! subscription, profile lookup and permission listing.

use counsel_core::{ErrorCode, InterfaceError, Outcome, PermissionRecord, SubscribeRequest, UserLookup};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::services::{PermissionDirectory, TransportError};

pub async fn subscribe(directory: &dyn PermissionDirectory, request: &SubscribeRequest) -> Outcome {
    let SubscribeRequest { user_id, agent_name } = request;
    let failure = |code: ErrorCode, message: String| {
        Outcome::Failure(
            InterfaceError::new(code, message)
                .with_context("user_id", user_id.as_str())
                .with_context("agent_name", agent_name.as_str()),
        )
    };

    match directory.profile(user_id).await {
        Ok(reply) if reply.status == 200 => {}
        Ok(reply) if reply.status == 404 => {
            warn!(event_name = "agent.subscribe.profile_not_found", user_id = %user_id, "cannot subscribe without a profile");
            return failure(
                ErrorCode::ProfileNotFound,
                format!("User profile {user_id} not found. Please contact an administrator to create your profile."),
            );
        }
        Ok(reply) => {
            error!(
                event_name = "agent.subscribe.profile_check_failed",
                user_id = %user_id,
                status = reply.status,
                "profile lookup failed during subscription"
            );
            return failure(
                ErrorCode::ProfileCheckFailed,
                "Unable to verify user profile. Please try again later.".to_string(),
            );
        }
        Err(transport) => return transport_failure(transport, failure),
    }

    match directory.permissions(user_id).await {
        Ok(reply) if reply.status == 200 => match reply.json() {
            Some(body) if PermissionRecord::from_response(&body).permits(agent_name) => {
                info!(event_name = "agent.subscribe.already_subscribed", user_id = %user_id, agent_name = %agent_name, "already subscribed");
                return subscribed(user_id, agent_name, true);
            }
            Some(_) => {}
            None => {
                warn!(event_name = "agent.subscribe.unparseable_permissions", user_id = %user_id, "ignoring unreadable permissions body");
            }
        },
        Ok(_) => {}
        Err(transport) => return transport_failure(transport, failure),
    }

    match directory.add_agent(user_id, agent_name).await {
        Ok(reply) => match reply.status {
            200 => {
                info!(event_name = "agent.subscribe.subscribed", user_id = %user_id, agent_name = %agent_name, "subscription added");
                subscribed(user_id, agent_name, false)
            }
            409 => subscribed(user_id, agent_name, true),
            400 => failure(
                ErrorCode::InvalidAgent,
                format!("Invalid agent name \"{agent_name}\" or request format"),
            ),
            status => {
                error!(
                    event_name = "agent.subscribe.failed",
                    user_id = %user_id,
                    agent_name = %agent_name,
                    status,
                    "permission service rejected subscription"
                );
                failure(
                    ErrorCode::SubscriptionFailed,
                    format!("Failed to subscribe to {agent_name}. Please try again later."),
                )
            }
        },
        Err(transport) => transport_failure(transport, failure),
    }
}

pub async fn check_user(directory: &dyn PermissionDirectory, lookup: &UserLookup) -> Outcome {
    let user_id = lookup.user_id.as_str();
    let reply = match directory.profile(user_id).await {
        Ok(reply) => reply,
        Err(transport) => {
            error!(event_name = "agent.check_user.transport_error", user_id, error = %transport, "profile lookup failed");
            return Outcome::Failure(
                InterfaceError::new(ErrorCode::ServiceUnavailable, "Failed to check user profile.")
                    .with_context("user_id", user_id),
            );
        }
    };

    match reply.status {
        200 => Outcome::Success(json!({
            "user_exists": true,
            "user_id": user_id,
            "status_code": 200,
            "profile_data": reply.json().unwrap_or(Value::Null),
        })),
        404 => Outcome::Success(json!({
            "user_exists": false,
            "user_id": user_id,
            "status_code": 404,
            "message": "User profile not found",
        })),
        status => Outcome::Failure(
            InterfaceError::new(ErrorCode::ProfileCheckFailed, format!("Profile service returned status {status}"))
                .with_context("user_exists", false)
                .with_context("user_id", user_id)
                .with_context("status_code", status),
        ),
    }
}

pub async fn check_permissions(
    directory: &dyn PermissionDirectory,
    lookup: &UserLookup,
    default_agent: &str,
) -> Outcome {
    let user_id = lookup.user_id.as_str();
    let agent_name = lookup.agent_name.as_deref().unwrap_or(default_agent);
    let reply = match directory.permissions(user_id).await {
        Ok(reply) => reply,
        Err(transport) => {
            error!(event_name = "agent.check_permissions.transport_error", user_id, error = %transport, "permission lookup failed");
            return Outcome::Failure(
                InterfaceError::new(ErrorCode::ServiceUnavailable, "Failed to check user permissions.")
                    .with_context("user_id", user_id),
            );
        }
    };

    match reply.status {
        200 => {
            let record = reply.json().map(|body| PermissionRecord::from_response(&body)).unwrap_or_else(|| {
                warn!(event_name = "agent.check_permissions.unparseable_body", user_id, "treating unreadable permissions as empty");
                PermissionRecord { permitted_agents: Vec::new(), data: Value::Null }
            });
            let has_permission = record.permits(agent_name);
            Outcome::Success(json!({
                "user_id": user_id,
                "permitted_agents": record.permitted_agents,
                "has_permission": has_permission,
                "agent_name": agent_name,
                "status_code": 200,
            }))
        }
        404 => Outcome::Success(json!({
            "user_id": user_id,
            "permitted_agents": [],
            "has_permission": false,
            "agent_name": agent_name,
            "status_code": 404,
            "message": "User permissions not found",
        })),
        status => Outcome::Failure(
            InterfaceError::new(
                ErrorCode::ServiceUnavailable,
                format!("Permission service returned status {status}"),
            )
            .with_context("user_id", user_id)
            .with_context("agent_name", agent_name)
            .with_context("status_code", status),
        ),
    }
}

fn subscribed(user_id: &str, agent_name: &str, already_subscribed: bool) -> Outcome {
    let message = if already_subscribed {
        format!("User {user_id} is already subscribed to {agent_name}")
    } else {
        format!("Successfully subscribed user {user_id} to {agent_name}")
    };
    Outcome::Success(json!({
        "message": message,
        "user_id": user_id,
        "agent_name": agent_name,
        "already_subscribed": already_subscribed,
    }))
}

fn transport_failure(transport: TransportError, failure: impl Fn(ErrorCode, String) -> Outcome) -> Outcome {
    error!(event_name = "agent.subscribe.transport_error", error = %transport, "permission service unreachable");
    match transport {
        TransportError::Timeout(_) => {
            failure(ErrorCode::Timeout, "Request timed out. Please try again later.".to_string())
        }
        TransportError::Connect(_) | TransportError::Other(_) => failure(
            ErrorCode::InternalError,
            "An internal error occurred during subscription. Please try again later.".to_string(),
        ),
    }
}
