//! Response shaping for the two calling conventions.
//!
//! Action-group callers always receive an HTTP 200 wrapper; the logical status
//! travels inside a JSON-encoded string body. Direct HTTP callers receive a
//! real status code with fixed CORS headers.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::domain::request::Convention;
use crate::errors::InterfaceError;

pub const MESSAGE_VERSION: &str = "1.0";

pub const CORS_HEADERS: [(&str, &str); 4] = [
    ("Content-Type", "application/json"),
    ("Access-Control-Allow-Origin", "*"),
    (
        "Access-Control-Allow-Headers",
        "Content-Type,X-Amz-Date,Authorization,X-Api-Key,X-Amz-Security-Token",
    ),
    ("Access-Control-Allow-Methods", "OPTIONS,POST,GET"),
];

#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Success(Value),
    Failure(InterfaceError),
}

impl Outcome {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Success(_) => 200,
            Self::Failure(error) => error.http_status(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundResponse {
    ActionGroup(ActionGroupResponse),
    Http(HttpResponse),
    Acknowledgement(Value),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionGroupResponse {
    pub message_version: &'static str,
    pub response: ActionGroupPayload,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ActionGroupPayload {
    Api(ApiPayload),
    Function(FunctionPayload),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiPayload {
    pub action_group: String,
    pub api_path: String,
    pub http_method: String,
    pub http_status_code: u16,
    pub response_body: BTreeMap<&'static str, EncodedBody>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionPayload {
    pub action_group: String,
    pub function: String,
    pub function_response: FunctionResponse,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResponse {
    pub response_body: BTreeMap<&'static str, EncodedBody>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EncodedBody {
    pub body: String,
}

impl ActionGroupResponse {
    /// The JSON-encoded `{status, result}` string carried inside the envelope.
    pub fn encoded_body(&self) -> &str {
        let bodies = match &self.response {
            ActionGroupPayload::Api(api) => &api.response_body,
            ActionGroupPayload::Function(function) => &function.function_response.response_body,
        };
        bodies.values().next().map(|encoded| encoded.body.as_str()).unwrap_or_default()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

/// Selects the envelope for the caller's convention.
pub fn format_response(
    outcome: &Outcome,
    convention: Convention,
    action_group: &str,
    api_path: &str,
    verb: &str,
) -> OutboundResponse {
    match convention {
        Convention::ActionGroupApi => {
            OutboundResponse::ActionGroup(action_group_response(outcome, action_group, api_path, verb))
        }
        Convention::ActionGroupFunction => {
            OutboundResponse::ActionGroup(function_response(outcome, action_group, api_path))
        }
        Convention::DirectHttp => OutboundResponse::Http(http_response(outcome)),
    }
}

pub fn action_group_response(
    outcome: &Outcome,
    action_group: &str,
    api_path: &str,
    verb: &str,
) -> ActionGroupResponse {
    let mut response_body = BTreeMap::new();
    response_body.insert("application/json", EncodedBody { body: action_group_body(outcome) });

    ActionGroupResponse {
        message_version: MESSAGE_VERSION,
        response: ActionGroupPayload::Api(ApiPayload {
            action_group: action_group.to_string(),
            api_path: api_path.to_string(),
            http_method: verb.to_string(),
            http_status_code: 200,
            response_body,
        }),
    }
}

pub fn function_response(outcome: &Outcome, action_group: &str, function: &str) -> ActionGroupResponse {
    let mut response_body = BTreeMap::new();
    response_body.insert("TEXT", EncodedBody { body: action_group_body(outcome) });

    ActionGroupResponse {
        message_version: MESSAGE_VERSION,
        response: ActionGroupPayload::Function(FunctionPayload {
            action_group: action_group.to_string(),
            function: function.to_string(),
            function_response: FunctionResponse { response_body },
        }),
    }
}

pub fn http_response(outcome: &Outcome) -> HttpResponse {
    let body = match outcome {
        Outcome::Success(data) => json!({ "status": "success", "data": data }),
        Outcome::Failure(error) => json!({ "status": "error", "error": error.to_body() }),
    };
    HttpResponse { status_code: outcome.http_status(), headers: cors_headers(), body: body.to_string() }
}

pub fn preflight_response() -> HttpResponse {
    HttpResponse {
        status_code: 200,
        headers: cors_headers(),
        body: json!({ "message": "CORS preflight successful" }).to_string(),
    }
}

pub fn cors_headers() -> BTreeMap<String, String> {
    CORS_HEADERS.iter().map(|(name, value)| (name.to_string(), value.to_string())).collect()
}

fn action_group_body(outcome: &Outcome) -> String {
    let (status, result) = match outcome {
        Outcome::Success(data) => ("SUCCESS", data.clone()),
        Outcome::Failure(error) => {
            let mut result = Map::new();
            result.insert("error".to_string(), Value::from(error.message.clone()));
            result.insert("code".to_string(), Value::from(error.code.as_str()));
            for (key, value) in &error.context {
                result.insert(key.clone(), value.clone());
            }
            ("ERROR", Value::Object(result))
        }
    };
    json!({ "status": status, "result": result }).to_string()
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{
        action_group_response, format_response, function_response, http_response,
        preflight_response, OutboundResponse, Outcome,
    };
    use crate::domain::request::Convention;
    use crate::errors::{ErrorCode, InterfaceError};

    fn parse(raw: &str) -> Value {
        serde_json::from_str(raw).expect("body should be valid json")
    }

    #[test]
    fn action_group_envelope_wraps_status_in_encoded_body() {
        let outcome = Outcome::Failure(
            InterfaceError::new(ErrorCode::SubscriptionRequired, "not subscribed")
                .with_context("user_id", "u1"),
        );
        let response = action_group_response(&outcome, "advice-proxy", "/getAdvice", "POST");
        let wire = serde_json::to_value(&response).expect("serializable");

        assert_eq!(wire["messageVersion"], "1.0");
        assert_eq!(wire["response"]["actionGroup"], "advice-proxy");
        assert_eq!(wire["response"]["apiPath"], "/getAdvice");
        assert_eq!(wire["response"]["httpMethod"], "POST");
        assert_eq!(wire["response"]["httpStatusCode"], 200, "wrapper status is always 200");

        let body = parse(
            wire["response"]["responseBody"]["application/json"]["body"]
                .as_str()
                .expect("body is a string"),
        );
        assert_eq!(body["status"], "ERROR");
        assert_eq!(body["result"]["code"], "SUBSCRIPTION_REQUIRED");
        assert_eq!(body["result"]["error"], "not subscribed");
        assert_eq!(body["result"]["user_id"], "u1");
    }

    #[test]
    fn function_envelope_uses_text_body() {
        let outcome = Outcome::Success(json!({ "user_exists": true }));
        let response = function_response(&outcome, "advice-proxy", "checkUser");
        let wire = serde_json::to_value(&response).expect("serializable");

        assert_eq!(wire["response"]["function"], "checkUser");
        let body = parse(response.encoded_body());
        assert_eq!(body, json!({ "status": "SUCCESS", "result": { "user_exists": true } }));
        assert!(wire["response"]["functionResponse"]["responseBody"]["TEXT"]["body"].is_string());
    }

    #[test]
    fn http_envelope_carries_real_status_and_cors_headers() {
        let success = http_response(&Outcome::Success(json!({ "advice": "Save.", "user_id": "u1" })));
        assert_eq!(success.status_code, 200);
        assert_eq!(success.headers["Access-Control-Allow-Origin"], "*");
        assert_eq!(
            parse(&success.body),
            json!({ "status": "success", "data": { "advice": "Save.", "user_id": "u1" } })
        );

        let failure = http_response(&Outcome::Failure(InterfaceError::new(
            ErrorCode::InvalidRequest,
            "question is required",
        )));
        assert_eq!(failure.status_code, 400);
        let body = parse(&failure.body);
        assert_eq!(body["status"], "error");
        assert_eq!(body["error"]["code"], "INVALID_REQUEST");

        let wire = serde_json::to_value(&failure).expect("serializable");
        assert_eq!(wire["statusCode"], 400);
    }

    #[test]
    fn format_response_selects_envelope_by_convention() {
        let outcome = Outcome::Success(json!({}));
        assert!(matches!(
            format_response(&outcome, Convention::DirectHttp, "g", "/getAdvice", "POST"),
            OutboundResponse::Http(_)
        ));
        assert!(matches!(
            format_response(&outcome, Convention::ActionGroupApi, "g", "/getAdvice", "POST"),
            OutboundResponse::ActionGroup(_)
        ));
    }

    #[test]
    fn preflight_acknowledges_with_cors_headers() {
        let response = preflight_response();
        assert_eq!(response.status_code, 200);
        assert_eq!(response.headers.len(), 4);
        assert_eq!(parse(&response.body)["message"], "CORS preflight successful");
    }
}
