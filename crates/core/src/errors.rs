use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::permission::PermissionDenial;

/// Machine-readable error codes carried by every outbound error body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidRequest,
    UnknownApiPath,
    SubscriptionRequired,
    ProfileNotFound,
    ProfileCheckFailed,
    InvalidAgent,
    SubscriptionFailed,
    Timeout,
    ServiceUnavailable,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::UnknownApiPath => "UNKNOWN_API_PATH",
            Self::SubscriptionRequired => "SUBSCRIPTION_REQUIRED",
            Self::ProfileNotFound => "PROFILE_NOT_FOUND",
            Self::ProfileCheckFailed => "PROFILE_CHECK_FAILED",
            Self::InvalidAgent => "INVALID_AGENT",
            Self::SubscriptionFailed => "SUBSCRIPTION_FAILED",
            Self::Timeout => "TIMEOUT",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidRequest | Self::UnknownApiPath | Self::InvalidAgent => 400,
            Self::SubscriptionRequired | Self::ProfileNotFound => 403,
            Self::ProfileCheckFailed
            | Self::SubscriptionFailed
            | Self::Timeout
            | Self::ServiceUnavailable
            | Self::InternalError => 500,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ApplicationError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("unknown api path `{0}`")]
    UnknownApiPath(String),
    #[error("permission denied for `{user_id}` on `{agent_name}`: {denial:?}")]
    PermissionDenied { denial: PermissionDenial, user_id: String, agent_name: String },
    #[error("upstream failure: {0}")]
    Upstream(String),
}

/// The only error shape that crosses the service boundary.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("{code}: {message}")]
pub struct InterfaceError {
    pub code: ErrorCode,
    pub message: String,
    pub correlation_id: String,
    pub context: Map<String, Value>,
}

impl InterfaceError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            correlation_id: "unassigned".to_owned(),
            context: Map::new(),
        }
    }

    pub fn with_context(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.context.insert(key.to_owned(), value.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// Body of the `error` member: code and message first, then contextual identifiers.
    pub fn to_body(&self) -> Value {
        let mut body = Map::new();
        body.insert("code".to_owned(), Value::from(self.code.as_str()));
        body.insert("message".to_owned(), Value::from(self.message.clone()));
        for (key, value) in &self.context {
            body.insert(key.clone(), value.clone());
        }
        Value::Object(body)
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        InterfaceError::from(self).with_correlation_id(correlation_id)
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::InvalidRequest(message) => {
                Self::new(ErrorCode::InvalidRequest, message)
            }
            ApplicationError::UnknownApiPath(path) => {
                Self::new(ErrorCode::UnknownApiPath, format!("Unknown API path: {path}"))
                    .with_context("api_path", path)
            }
            ApplicationError::PermissionDenied { denial, user_id, agent_name } => match denial {
                PermissionDenial::SubscriptionRequired => Self::new(
                    ErrorCode::SubscriptionRequired,
                    format!("You are not subscribed to the {agent_name} service."),
                )
                .with_context("user_id", user_id)
                .with_context("action_available", true)
                .with_context(
                    "action_message",
                    format!("Would you like to subscribe to the {agent_name} service?"),
                ),
                PermissionDenial::ProfileNotFound => Self::new(
                    ErrorCode::ProfileNotFound,
                    "User profile not found. Please contact an administrator or support to create your profile.",
                )
                .with_context("user_id", user_id)
                .with_context("action_available", false)
                .with_context(
                    "support_message",
                    "Contact your system administrator or support team to set up your user profile before using this service.",
                ),
            },
            ApplicationError::Upstream(_) => Self::new(
                ErrorCode::ServiceUnavailable,
                "Unable to reach a required service. Please try again later.",
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::permission::PermissionDenial;
    use crate::errors::{ApplicationError, ErrorCode, InterfaceError};

    #[test]
    fn invalid_request_maps_to_bad_request_with_correlation_id() {
        let interface = ApplicationError::InvalidRequest("user_id is required".to_owned())
            .into_interface("req-1");

        assert_eq!(interface.code, ErrorCode::InvalidRequest);
        assert_eq!(interface.http_status(), 400);
        assert_eq!(interface.correlation_id, "req-1");
        assert_eq!(interface.message, "user_id is required");
    }

    #[test]
    fn subscription_required_carries_actionable_context() {
        let interface = ApplicationError::PermissionDenied {
            denial: PermissionDenial::SubscriptionRequired,
            user_id: "u1".to_owned(),
            agent_name: "advice-agent".to_owned(),
        }
        .into_interface("req-2");

        assert_eq!(interface.http_status(), 403);
        let body = interface.to_body();
        assert_eq!(body["code"], "SUBSCRIPTION_REQUIRED");
        assert_eq!(body["user_id"], "u1");
        assert_eq!(body["action_available"], true);
        assert!(body["message"].as_str().unwrap_or_default().contains("advice-agent"));
    }

    #[test]
    fn profile_not_found_is_forbidden_without_action() {
        let interface = InterfaceError::from(ApplicationError::PermissionDenied {
            denial: PermissionDenial::ProfileNotFound,
            user_id: "ghost".to_owned(),
            agent_name: "advice-agent".to_owned(),
        });

        assert_eq!(interface.code, ErrorCode::ProfileNotFound);
        assert_eq!(interface.http_status(), 403);
        assert_eq!(interface.to_body()["action_available"], false);
    }

    #[test]
    fn upstream_failure_never_leaks_raw_detail() {
        let interface =
            ApplicationError::Upstream("connection refused at 10.0.0.4:8000".to_owned())
                .into_interface("req-3");

        assert_eq!(interface.code, ErrorCode::ServiceUnavailable);
        assert_eq!(interface.http_status(), 500);
        assert!(!interface.message.contains("10.0.0.4"));
    }

    #[test]
    fn unknown_api_path_names_the_path() {
        let interface = InterfaceError::from(ApplicationError::UnknownApiPath("/nope".to_owned()));

        assert_eq!(interface.code.as_str(), "UNKNOWN_API_PATH");
        assert_eq!(interface.to_body()["api_path"], "/nope");
    }
}
