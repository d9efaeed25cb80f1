use std::sync::Arc;

use counsel_core::{PermissionOutcome, PermissionRecord};
use tracing::{error, info, warn};

use crate::services::PermissionDirectory;

/// Classifies a caller against the permission service.
///
/// Two sequential lookups keep "no profile" and "no entitlement" apart: the
/// first is routed to support, the second is offered a subscription.
#[derive(Clone)]
pub struct PermissionGate {
    directory: Arc<dyn PermissionDirectory>,
}

impl PermissionGate {
    pub fn new(directory: Arc<dyn PermissionDirectory>) -> Self {
        Self { directory }
    }

    pub fn directory(&self) -> &Arc<dyn PermissionDirectory> {
        &self.directory
    }

    pub async fn check(&self, user_id: &str, agent_name: &str) -> PermissionOutcome {
        let profile = match self.directory.profile(user_id).await {
            Ok(reply) => reply,
            Err(transport) => {
                error!(
                    event_name = "agent.permissions.profile_transport_error",
                    user_id,
                    error = %transport,
                    "profile lookup failed"
                );
                return PermissionOutcome::CheckFailed;
            }
        };

        match profile.status {
            200 => {}
            404 => {
                warn!(event_name = "agent.permissions.profile_not_found", user_id, "profile not found");
                return PermissionOutcome::ProfileNotFound;
            }
            status => {
                error!(
                    event_name = "agent.permissions.profile_check_failed",
                    user_id,
                    status,
                    "profile lookup returned unexpected status"
                );
                return PermissionOutcome::CheckFailed;
            }
        }

        let permissions = match self.directory.permissions(user_id).await {
            Ok(reply) => reply,
            Err(transport) => {
                error!(
                    event_name = "agent.permissions.permissions_transport_error",
                    user_id,
                    error = %transport,
                    "permission lookup failed"
                );
                return PermissionOutcome::CheckFailed;
            }
        };

        match permissions.status {
            200 => match permissions.json() {
                Some(body) => {
                    let record = PermissionRecord::from_response(&body);
                    if record.permits(agent_name) {
                        PermissionOutcome::Granted(record)
                    } else {
                        PermissionOutcome::NoPermission(Some(record))
                    }
                }
                None => {
                    error!(
                        event_name = "agent.permissions.unparseable_body",
                        user_id,
                        "permission lookup returned a non-JSON body"
                    );
                    PermissionOutcome::CheckFailed
                }
            },
            404 => {
                info!(
                    event_name = "agent.permissions.unset",
                    user_id,
                    "profile exists but no permissions are set"
                );
                PermissionOutcome::NoPermission(None)
            }
            status => {
                error!(
                    event_name = "agent.permissions.check_failed",
                    user_id,
                    status,
                    "permission lookup returned unexpected status"
                );
                PermissionOutcome::CheckFailed
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use counsel_core::PermissionOutcome;

    use super::PermissionGate;
    use crate::services::{PermissionDirectory, ServiceReply, TransportError};

    /// In-memory permission service keyed by path (`profiles/u1`, `permissions/u1`, ...).
    #[derive(Default)]
    pub(crate) struct FakeDirectory {
        pub replies: Mutex<HashMap<String, Result<ServiceReply, TransportError>>>,
        pub calls: Mutex<Vec<String>>,
    }

    impl FakeDirectory {
        pub(crate) fn with(
            entries: Vec<(&str, Result<ServiceReply, TransportError>)>,
        ) -> Arc<Self> {
            let directory = Self::default();
            {
                let mut replies = directory.replies.lock().expect("replies lock");
                for (path, reply) in entries {
                    replies.insert(path.to_string(), reply);
                }
            }
            Arc::new(directory)
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("calls lock").clone()
        }

        fn reply(&self, path: String) -> Result<ServiceReply, TransportError> {
            self.calls.lock().expect("calls lock").push(path.clone());
            self.replies
                .lock()
                .expect("replies lock")
                .get(&path)
                .cloned()
                .unwrap_or_else(|| Ok(ServiceReply::new(404, "{}")))
        }
    }

    #[async_trait]
    impl PermissionDirectory for FakeDirectory {
        async fn profile(&self, user_id: &str) -> Result<ServiceReply, TransportError> {
            self.reply(format!("profiles/{user_id}"))
        }

        async fn permissions(&self, user_id: &str) -> Result<ServiceReply, TransportError> {
            self.reply(format!("permissions/{user_id}"))
        }

        async fn add_agent(
            &self,
            user_id: &str,
            agent_name: &str,
        ) -> Result<ServiceReply, TransportError> {
            self.reply(format!("permissions/{user_id}/agents:{agent_name}"))
        }

        fn subscription_url(&self, user_id: &str) -> String {
            format!("https://permissions.test/dev/permissions/{user_id}/agents")
        }
    }

    pub(crate) fn granted_directory(user_id: &str, agents: &[&str]) -> Arc<FakeDirectory> {
        let body = serde_json::json!({ "data": { "user_id": user_id, "permitted_agents": agents } });
        FakeDirectory::with(vec![
            (&format!("profiles/{user_id}"), Ok(ServiceReply::new(200, "{}"))),
            (&format!("permissions/{user_id}"), Ok(ServiceReply::new(200, body.to_string()))),
        ])
    }

    #[tokio::test]
    async fn missing_profile_is_profile_not_found() {
        let directory = FakeDirectory::with(vec![("profiles/u1", Ok(ServiceReply::new(404, "")))]);
        let gate = PermissionGate::new(directory.clone());

        assert_eq!(gate.check("u1", "advice-agent").await, PermissionOutcome::ProfileNotFound);
        assert_eq!(directory.calls(), vec!["profiles/u1"], "permissions must not be queried");
    }

    #[tokio::test]
    async fn listed_agent_is_granted() {
        let gate = PermissionGate::new(granted_directory("u1", &["advice-agent"]));

        let outcome = gate.check("u1", "advice-agent").await;
        let PermissionOutcome::Granted(record) = outcome else {
            panic!("expected granted outcome");
        };
        assert_eq!(record.permitted_agents, vec!["advice-agent"]);
    }

    #[tokio::test]
    async fn unlisted_agent_is_no_permission_with_data() {
        let gate = PermissionGate::new(granted_directory("u1", &["tax-agent"]));

        let outcome = gate.check("u1", "advice-agent").await;
        assert!(matches!(outcome, PermissionOutcome::NoPermission(Some(ref record)) if record.permits("tax-agent")));
    }

    #[tokio::test]
    async fn unset_permissions_are_no_permission_without_data() {
        let directory = FakeDirectory::with(vec![
            ("profiles/u1", Ok(ServiceReply::new(200, "{}"))),
            ("permissions/u1", Ok(ServiceReply::new(404, ""))),
        ]);
        let gate = PermissionGate::new(directory);

        assert_eq!(gate.check("u1", "advice-agent").await, PermissionOutcome::NoPermission(None));
    }

    #[tokio::test]
    async fn unexpected_statuses_and_transport_errors_fail_the_check() {
        let cases = vec![
            FakeDirectory::with(vec![("profiles/u1", Ok(ServiceReply::new(500, "")))]),
            FakeDirectory::with(vec![(
                "profiles/u1",
                Err(TransportError::Timeout("10s elapsed".to_string())),
            )]),
            FakeDirectory::with(vec![
                ("profiles/u1", Ok(ServiceReply::new(200, "{}"))),
                ("permissions/u1", Ok(ServiceReply::new(502, ""))),
            ]),
            FakeDirectory::with(vec![
                ("profiles/u1", Ok(ServiceReply::new(200, "{}"))),
                ("permissions/u1", Ok(ServiceReply::new(200, "<html>"))),
            ]),
            FakeDirectory::with(vec![
                ("profiles/u1", Ok(ServiceReply::new(200, "{}"))),
                ("permissions/u1", Err(TransportError::Connect("refused".to_string()))),
            ]),
        ];

        for directory in cases {
            let gate = PermissionGate::new(directory);
            assert_eq!(gate.check("u1", "advice-agent").await, PermissionOutcome::CheckFailed);
        }
    }
}
