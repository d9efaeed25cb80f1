//! HTTP dispatcher. `/invoke` accepts any inbound event shape verbatim; the
//! REST-style routes build the direct-HTTP event themselves.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use counsel_agent::{AgentRuntime, InvocationContext};
use counsel_core::OutboundResponse;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::health;

pub const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct DispatchState {
    runtime: Arc<AgentRuntime>,
}

pub fn router(runtime: Arc<AgentRuntime>) -> Router {
    Router::new()
        .route("/invoke", post(invoke))
        .route("/advice", post(advice).options(preflight))
        .route("/subscribe/{user_id}", post(subscribe).options(preflight))
        .with_state(DispatchState { runtime: runtime.clone() })
        .merge(health::router(runtime))
}

async fn invoke(State(state): State<DispatchState>, headers: HeaderMap, Json(event): Json<Value>) -> Response {
    dispatch(&state, &headers, event).await
}

async fn advice(State(state): State<DispatchState>, headers: HeaderMap, body: String) -> Response {
    let event = json!({ "httpMethod": "POST", "resource": "/advice", "body": body });
    dispatch(&state, &headers, event).await
}

async fn subscribe(
    State(state): State<DispatchState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let event = json!({
        "httpMethod": "POST",
        "resource": "/subscribe/{user_id}",
        "pathParameters": { "user_id": user_id },
        "body": body,
    });
    dispatch(&state, &headers, event).await
}

async fn preflight(State(state): State<DispatchState>, headers: HeaderMap) -> Response {
    dispatch(&state, &headers, json!({ "httpMethod": "OPTIONS" })).await
}

async fn dispatch(state: &DispatchState, headers: &HeaderMap, event: Value) -> Response {
    let context = headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map(InvocationContext::with_correlation_id)
        .unwrap_or_default();

    let outbound = state.runtime.handle_event(&event, &context).await;
    let mut response = into_response(outbound);
    if let Ok(value) = HeaderValue::from_str(&context.correlation_id) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    info!(
        event_name = "system.http.responded",
        correlation_id = %context.correlation_id,
        status = response.status().as_u16(),
        "invocation answered"
    );
    response
}

/// Direct-HTTP envelopes become real responses; action-group envelopes are returned as JSON.
pub fn into_response(outbound: OutboundResponse) -> Response {
    match outbound {
        OutboundResponse::Http(http) => {
            let status = StatusCode::from_u16(http.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let mut response = (status, http.body).into_response();
            for (name, value) in &http.headers {
                match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
                    (Ok(name), Ok(value)) => {
                        response.headers_mut().insert(name, value);
                    }
                    _ => warn!(event_name = "system.http.invalid_header", header = %name, "dropping invalid header"),
                }
            }
            response
        }
        OutboundResponse::ActionGroup(envelope) => Json(envelope).into_response(),
        OutboundResponse::Acknowledgement(ack) => Json(ack).into_response(),
    }
}
