use serde::Serialize;
use serde_json::Value;

/// Entitlements returned by the permission service for one user.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PermissionRecord {
    pub permitted_agents: Vec<String>,
    pub data: Value,
}

impl PermissionRecord {
    /// Reads `data.permitted_agents` from a permission service response body.
    pub fn from_response(body: &Value) -> Self {
        let data = body.get("data").cloned().unwrap_or(Value::Null);
        let permitted_agents = data
            .get("permitted_agents")
            .and_then(Value::as_array)
            .map(|agents| agents.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();
        Self { permitted_agents, data }
    }

    pub fn permits(&self, agent_name: &str) -> bool {
        self.permitted_agents.iter().any(|agent| agent == agent_name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PermissionOutcome {
    Granted(PermissionRecord),
    /// Profile exists; `None` when the user has no permissions document yet.
    NoPermission(Option<PermissionRecord>),
    ProfileNotFound,
    CheckFailed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PermissionDenial {
    SubscriptionRequired,
    ProfileNotFound,
}

impl PermissionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Granted(_) => "granted",
            Self::NoPermission(_) => "no_permission",
            Self::ProfileNotFound => "profile_not_found",
            Self::CheckFailed => "check_failed",
        }
    }
}
