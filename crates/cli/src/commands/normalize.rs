use std::fs;
use std::path::Path;

use counsel_core::{normalize, InboundEvent, InterfaceError};
use serde_json::{json, Value};

use crate::commands::CommandResult;

/// Prints how an inbound event would be routed without calling any collaborator.
pub fn run(event_path: &Path) -> CommandResult {
    let raw = match fs::read_to_string(event_path) {
        Ok(raw) => raw,
        Err(error) => {
            return CommandResult::failure(
                "normalize",
                "read_failed",
                format!("could not read `{}`: {error}", event_path.display()),
                3,
            )
        }
    };

    let event: Value = match serde_json::from_str(&raw) {
        Ok(event) => event,
        Err(error) => {
            return CommandResult::failure(
                "normalize",
                "invalid_json",
                format!("`{}` is not valid JSON: {error}", event_path.display()),
                4,
            )
        }
    };

    match normalize(&event) {
        Ok(InboundEvent::Warmup) => report(0, json!({ "kind": "warmup" })),
        Ok(InboundEvent::Preflight) => report(0, json!({ "kind": "preflight" })),
        Ok(InboundEvent::Invocation(invocation)) => {
            report(0, json!({ "kind": "invocation", "invocation": invocation }))
        }
        Err(rejected) => {
            let error = InterfaceError::from(rejected.error);
            report(
                5,
                json!({
                    "kind": "rejected",
                    "convention": rejected.convention,
                    "api_path": rejected.api_path,
                    "verb": rejected.verb,
                    "error": error.to_body(),
                }),
            )
        }
    }
}

fn report(exit_code: u8, mut payload: Value) -> CommandResult {
    if let Value::Object(fields) = &mut payload {
        fields.insert("command".to_string(), Value::from("normalize"));
        fields.insert("status".to_string(), Value::from(if exit_code == 0 { "ok" } else { "error" }));
    }
    let output = serde_json::to_string_pretty(&payload).unwrap_or_else(|error| {
        format!("{{\"command\":\"normalize\",\"status\":\"error\",\"message\":\"{error}\"}}")
    });
    CommandResult { exit_code, output }
}
