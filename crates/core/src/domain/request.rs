use std::collections::BTreeMap;

use serde::Serialize;

use crate::errors::ApplicationError;

/// Flat parameter mapping produced by the normalizer.
pub type Params = BTreeMap<String, String>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    GetAdvice,
    Subscribe,
    CheckUser,
    CheckPermissions,
}

impl Route {
    pub fn from_api_path(path: &str) -> Option<Self> {
        let path = path.trim().trim_end_matches('/');
        match path {
            "/getAdvice" | "/advice" => Some(Self::GetAdvice),
            "/subscribeToAgent" => Some(Self::Subscribe),
            "/checkUser" => Some(Self::CheckUser),
            "/checkPermissions" => Some(Self::CheckPermissions),
            other if other.starts_with("/subscribe/") => Some(Self::Subscribe),
            _ => None,
        }
    }

    pub fn from_function(name: &str) -> Option<Self> {
        match name.trim() {
            "getAdvice" => Some(Self::GetAdvice),
            "subscribeToAgent" => Some(Self::Subscribe),
            "checkUser" => Some(Self::CheckUser),
            "checkPermissions" => Some(Self::CheckPermissions),
            _ => None,
        }
    }

    pub fn api_path(&self) -> &'static str {
        match self {
            Self::GetAdvice => "/getAdvice",
            Self::Subscribe => "/subscribeToAgent",
            Self::CheckUser => "/checkUser",
            Self::CheckPermissions => "/checkPermissions",
        }
    }
}

/// Calling convention of the inbound event; selects the response envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Convention {
    ActionGroupApi,
    ActionGroupFunction,
    DirectHttp,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdviceRequest {
    pub user_id: String,
    pub question: String,
    pub context: Option<String>,
}

impl AdviceRequest {
    /// A present-but-blank question is accepted; the pipeline answers it with a clarification.
    pub fn from_params(params: &Params) -> Result<Self, ApplicationError> {
        let user_id = required(params, "user_id")?;
        let question = params
            .get("question")
            .cloned()
            .ok_or_else(|| ApplicationError::InvalidRequest("question is required".to_string()))?;
        let context = optional(params, "context");
        Ok(Self { user_id, question, context })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscribeRequest {
    pub user_id: String,
    pub agent_name: String,
}

impl SubscribeRequest {
    pub fn from_params(
        params: &Params,
        default_agent: Option<&str>,
    ) -> Result<Self, ApplicationError> {
        let user_id = required(params, "user_id")?;
        let agent_name = match optional(params, "agent_name") {
            Some(agent_name) => agent_name,
            None => default_agent.map(str::to_string).ok_or_else(|| {
                ApplicationError::InvalidRequest("agent_name is required".to_string())
            })?,
        };
        Ok(Self { user_id, agent_name })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserLookup {
    pub user_id: String,
    pub agent_name: Option<String>,
}

impl UserLookup {
    pub fn from_params(params: &Params) -> Result<Self, ApplicationError> {
        Ok(Self { user_id: required(params, "user_id")?, agent_name: optional(params, "agent_name") })
    }
}

fn required(params: &Params, key: &str) -> Result<String, ApplicationError> {
    optional(params, key).ok_or_else(|| ApplicationError::InvalidRequest(format!("{key} is required")))
}

fn optional(params: &Params, key: &str) -> Option<String> {
    params.get(key).map(|value| value.trim()).filter(|value| !value.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::{AdviceRequest, Params, Route, SubscribeRequest};
    use crate::errors::ApplicationError;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs.iter().map(|(key, value)| (key.to_string(), value.to_string())).collect()
    }

    #[test]
    fn routes_resolve_from_paths_and_functions() {
        assert_eq!(Route::from_api_path("/getAdvice"), Some(Route::GetAdvice));
        assert_eq!(Route::from_api_path("/subscribe/u1"), Some(Route::Subscribe));
        assert_eq!(Route::from_api_path("/deleteEverything"), None);
        assert_eq!(Route::from_function("checkPermissions"), Some(Route::CheckPermissions));
        assert_eq!(Route::from_function("unknown"), None);
    }

    #[test]
    fn advice_request_requires_user_and_question() {
        let missing_user = AdviceRequest::from_params(&params(&[("question", "why?")]));
        assert_eq!(
            missing_user,
            Err(ApplicationError::InvalidRequest("user_id is required".to_string()))
        );

        let missing_question = AdviceRequest::from_params(&params(&[("user_id", "u1")]));
        assert_eq!(
            missing_question,
            Err(ApplicationError::InvalidRequest("question is required".to_string()))
        );
    }

    #[test]
    fn blank_question_and_context_are_accepted() {
        let request = AdviceRequest::from_params(&params(&[
            ("user_id", "u1"),
            ("question", ""),
            ("context", "  "),
        ]))
        .expect("blank question is a valid request");

        assert_eq!(request.question, "");
        assert_eq!(request.context, None);
    }

    #[test]
    fn subscribe_request_falls_back_to_default_agent() {
        let request = SubscribeRequest::from_params(&params(&[("user_id", "u1")]), Some("advice-agent"))
            .expect("default agent applies");
        assert_eq!(request.agent_name, "advice-agent");

        let strict = SubscribeRequest::from_params(&params(&[("user_id", "u1")]), None);
        assert!(matches!(strict, Err(ApplicationError::InvalidRequest(message)) if message.contains("agent_name")));
    }
}
