//! Inbound event normalization.
//!
//! Every calling convention the dispatcher can hand us is reduced to one
//! [`Invocation`]: a resolved [`Route`], the verb, and a flat [`Params`] map.
//! Shapes recognised, in order of precedence:
//!
//! 1. scheduled warm-up pings (`{"warmup": true}` / `{"source": "scheduled-event"}`)
//! 2. action-group invocations (`actionGroupInvocationInput`)
//! 3. function invocations (`function` + `parameters`)
//! 4. bare api-path invocations (`apiPath` + `requestBody` and/or `parameters`)
//! 5. direct HTTP requests (`httpMethod` + JSON `body` + `pathParameters`)

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::request::{Convention, Params, Route};
use crate::errors::ApplicationError;

const DEFAULT_API_PATH: &str = "/getAdvice";
const DEFAULT_VERB: &str = "POST";
const DIRECT_FIELDS: [&str; 4] = ["user_id", "question", "context", "agent_name"];

#[derive(Clone, Debug, PartialEq)]
pub enum InboundEvent {
    Warmup,
    Preflight,
    Invocation(Invocation),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Invocation {
    pub convention: Convention,
    pub route: Route,
    /// Path (or function name) exactly as the caller sent it; echoed in responses.
    pub api_path: String,
    pub verb: String,
    pub params: Params,
}

/// Rejection that still knows enough about the caller to shape its response.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("{error}")]
pub struct NormalizeError {
    pub convention: Convention,
    pub api_path: String,
    pub verb: String,
    pub error: ApplicationError,
}

pub fn normalize(event: &Value) -> Result<InboundEvent, NormalizeError> {
    if is_warmup(event) {
        return Ok(InboundEvent::Warmup);
    }

    if let Some(input) = event.get("actionGroupInvocationInput") {
        return action_group(input).map(InboundEvent::Invocation);
    }

    if let Some(function) = event.get("function").and_then(Value::as_str) {
        return function_call(event, function).map(InboundEvent::Invocation);
    }

    let looks_like_api_call = event.get("apiPath").is_some()
        || event.get("requestBody").is_some()
        || event.get("parameters").map(Value::is_array).unwrap_or(false);
    if looks_like_api_call {
        return api_call(event).map(InboundEvent::Invocation);
    }

    direct_http(event)
}

pub fn is_warmup(event: &Value) -> bool {
    event.get("warmup").and_then(Value::as_bool).unwrap_or(false)
        || event.get("source").and_then(Value::as_str) == Some("scheduled-event")
}

fn action_group(input: &Value) -> Result<Invocation, NormalizeError> {
    let api_path = string_field(input, "apiPath").unwrap_or(DEFAULT_API_PATH).to_string();
    let verb = string_field(input, "verb").unwrap_or(DEFAULT_VERB).to_ascii_uppercase();

    let mut params = Params::new();
    flatten_request_body(input.get("requestBody"), &mut params);

    resolve_path(Convention::ActionGroupApi, api_path, verb, params)
}

fn function_call(event: &Value, function: &str) -> Result<Invocation, NormalizeError> {
    let verb = string_field(event, "httpMethod").unwrap_or(DEFAULT_VERB).to_ascii_uppercase();

    let mut params = Params::new();
    if let Some(records) = event.get("parameters").and_then(Value::as_array) {
        flatten_records(records, &mut params);
    }

    match Route::from_function(function) {
        Some(route) => Ok(Invocation {
            convention: Convention::ActionGroupFunction,
            route,
            api_path: function.to_string(),
            verb,
            params,
        }),
        None => Err(NormalizeError {
            convention: Convention::ActionGroupFunction,
            api_path: function.to_string(),
            verb,
            error: ApplicationError::UnknownApiPath(function.to_string()),
        }),
    }
}

fn api_call(event: &Value) -> Result<Invocation, NormalizeError> {
    let api_path = string_field(event, "apiPath").unwrap_or(DEFAULT_API_PATH).to_string();
    let verb = string_field(event, "httpMethod").unwrap_or(DEFAULT_VERB).to_ascii_uppercase();

    let mut params = Params::new();
    flatten_request_body(event.get("requestBody"), &mut params);
    if params.is_empty() {
        if let Some(records) = event.get("parameters").and_then(Value::as_array) {
            flatten_records(records, &mut params);
        }
    }

    resolve_path(Convention::ActionGroupApi, api_path, verb, params)
}

fn direct_http(event: &Value) -> Result<InboundEvent, NormalizeError> {
    let verb = string_field(event, "httpMethod").unwrap_or(DEFAULT_VERB).to_ascii_uppercase();
    if verb == "OPTIONS" {
        return Ok(InboundEvent::Preflight);
    }

    let path_user_id = event
        .get("pathParameters")
        .and_then(|path| path.get("user_id"))
        .and_then(scalar_to_string)
        .filter(|value| !value.trim().is_empty());

    let declared_path = string_field(event, "resource").or_else(|| string_field(event, "path"));
    let (route, api_path) = match declared_path {
        Some(path) => match Route::from_api_path(path) {
            Some(route) => (route, path.to_string()),
            None => {
                return Err(NormalizeError {
                    convention: Convention::DirectHttp,
                    api_path: path.to_string(),
                    verb,
                    error: ApplicationError::UnknownApiPath(path.to_string()),
                })
            }
        },
        None if path_user_id.is_some() => (Route::Subscribe, Route::Subscribe.api_path().to_string()),
        None => (Route::GetAdvice, Route::GetAdvice.api_path().to_string()),
    };

    let reject = |message: &str| NormalizeError {
        convention: Convention::DirectHttp,
        api_path: api_path.clone(),
        verb: verb.clone(),
        error: ApplicationError::InvalidRequest(message.to_string()),
    };

    let body = match event.get("body") {
        None | Some(Value::Null) => return Err(reject("Request body is required")),
        Some(Value::String(raw)) if raw.trim().is_empty() => {
            return Err(reject("Request body is required"))
        }
        Some(Value::String(raw)) => serde_json::from_str::<Value>(raw)
            .map_err(|_| reject("Invalid JSON in request body"))?,
        Some(inline) => inline.clone(),
    };
    if !body.is_object() {
        return Err(reject("Request body must be a JSON object"));
    }

    let mut params = Params::new();
    for field in DIRECT_FIELDS {
        if let Some(value) = body.get(field).and_then(scalar_to_string) {
            params.insert(field.to_string(), value);
        }
    }

    if let Some(user_id) = path_user_id {
        if route == Route::Subscribe || !params.contains_key("user_id") {
            params.insert("user_id".to_string(), user_id);
        }
    }

    Ok(InboundEvent::Invocation(Invocation {
        convention: Convention::DirectHttp,
        route,
        api_path,
        verb,
        params,
    }))
}

fn resolve_path(
    convention: Convention,
    api_path: String,
    verb: String,
    params: Params,
) -> Result<Invocation, NormalizeError> {
    debug!(event_name = "normalize.resolve", api_path = %api_path, params = params.len());
    match Route::from_api_path(&api_path) {
        Some(route) => Ok(Invocation { convention, route, api_path, verb, params }),
        None => Err(NormalizeError {
            convention,
            error: ApplicationError::UnknownApiPath(api_path.clone()),
            api_path,
            verb,
        }),
    }
}

/// Accepts `content["application/json"]` as either `[{name, value}]` or
/// `{"properties": [{name, value}]}`. Anything else yields no parameters.
fn flatten_request_body(request_body: Option<&Value>, params: &mut Params) {
    let Some(content) = request_body
        .and_then(|body| body.get("content"))
        .and_then(|content| content.get("application/json"))
    else {
        return;
    };

    match content {
        Value::Array(records) => flatten_records(records, params),
        Value::Object(object) => match object.get("properties").and_then(Value::as_array) {
            Some(records) => flatten_records(records, params),
            None => info!(
                event_name = "normalize.unrecognized_body",
                shape = "object_without_properties",
                "request body carried no parameter records"
            ),
        },
        other => info!(
            event_name = "normalize.unrecognized_body",
            shape = %json_kind(other),
            "request body carried no parameter records"
        ),
    }
}

fn flatten_records(records: &[Value], params: &mut Params) {
    for record in records {
        let Some(name) = record.get("name").and_then(Value::as_str).filter(|name| !name.is_empty())
        else {
            continue;
        };
        if let Some(value) = record.get("value").and_then(scalar_to_string) {
            params.insert(name.to_string(), value);
        }
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

fn string_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str).filter(|text| !text.trim().is_empty())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
