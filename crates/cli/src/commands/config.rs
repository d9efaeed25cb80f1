use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use counsel_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

use crate::commands::CommandResult;

struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult { exit_code: 2, output: format!("config validation failed: {error}") }
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source =
            field_source(field.key, field.env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(field.key, &field.value, source));
    }

    CommandResult { exit_code: 0, output: lines.join("\n") }
}

fn field(key: &'static str, value: String, env_keys: &'static [&'static str]) -> Field {
    Field { key, value, env_keys }
}

fn fields(config: &AppConfig) -> Vec<Field> {
    vec![
        field("advice.url", config.advice.url.clone(), &["COUNSEL_ADVICE_URL", "EXTERNAL_ADVICE_API_URL"]),
        field("advice.length", config.advice.length.clone(), &["COUNSEL_ADVICE_LENGTH", "ADVICE_LENGTH"]),
        field(
            "advice.temperature",
            config.advice.temperature.to_string(),
            &["COUNSEL_ADVICE_TEMPERATURE", "ADVICE_TEMPERATURE"],
        ),
        field("advice.timeout_secs", config.advice.timeout_secs.to_string(), &["COUNSEL_ADVICE_TIMEOUT_SECS"]),
        field(
            "permissions.base_url",
            config.permissions.base_url.clone(),
            &["COUNSEL_PERMISSIONS_BASE_URL", "PERMISSION_API_URL"],
        ),
        field("permissions.agent_name", config.permissions.agent_name.clone(), &["COUNSEL_AGENT_NAME", "AGENT_NAME"]),
        field(
            "permissions.timeout_secs",
            config.permissions.timeout_secs.to_string(),
            &["COUNSEL_PERMISSIONS_TIMEOUT_SECS"],
        ),
        field("model.model_id", config.model.model_id.clone(), &["COUNSEL_MODEL_ID", "BEDROCK_MODEL_ID"]),
        field("model.region", config.model.region.clone(), &["COUNSEL_MODEL_REGION", "BEDROCK_REGION"]),
        field("model.endpoint", config.model.endpoint_base(), &["COUNSEL_MODEL_ENDPOINT"]),
        field(
            "model.api_key",
            redact_secret(config.model.api_key.as_ref().map(|key| key.expose_secret())),
            &["COUNSEL_MODEL_API_KEY"],
        ),
        field("model.max_retries", config.model.max_retries.to_string(), &["COUNSEL_MODEL_MAX_RETRIES"]),
        field("enhancement.bypass", config.enhancement.bypass.to_string(), &["COUNSEL_ENHANCEMENT_BYPASS"]),
        field("cache.enabled", config.cache.enabled.to_string(), &["COUNSEL_CACHE_ENABLED"]),
        field("cache.ttl_secs", config.cache.ttl_secs.to_string(), &["COUNSEL_CACHE_TTL_SECS"]),
        field("cache.max_entries", config.cache.max_entries.to_string(), &["COUNSEL_CACHE_MAX_ENTRIES"]),
        field("server.bind_address", config.server.bind_address.clone(), &["COUNSEL_SERVER_BIND_ADDRESS"]),
        field("server.port", config.server.port.to_string(), &["COUNSEL_SERVER_PORT"]),
        field("server.action_group", config.server.action_group.clone(), &["COUNSEL_SERVER_ACTION_GROUP"]),
        field("logging.level", config.logging.level.clone(), &["COUNSEL_LOGGING_LEVEL", "COUNSEL_LOG_LEVEL"]),
        field(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["COUNSEL_LOGGING_FORMAT", "COUNSEL_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("counsel.toml"), PathBuf::from("config/counsel.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_secret(secret: Option<&str>) -> String {
    match secret.map(str::trim) {
        None => "<unset>".to_string(),
        Some("") => "<empty>".to_string(),
        Some(value) if value.chars().count() > 8 => {
            let prefix: String = value.chars().take(4).collect();
            format!("{prefix}***")
        }
        Some(_) => "<redacted>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::{contains_path, redact_secret};

    #[test]
    fn secrets_never_render_in_full() {
        assert_eq!(redact_secret(None), "<unset>");
        assert_eq!(redact_secret(Some("short")), "<redacted>");
        assert_eq!(redact_secret(Some("abcd-1234-secret")), "abcd***");
    }

    #[test]
    fn dotted_paths_resolve_against_toml_tables() {
        let doc: Value = "[advice]\nurl = \"http://advice\"\n".parse().expect("toml");
        assert!(contains_path(&doc, "advice.url"));
        assert!(!contains_path(&doc, "advice.length"));
        assert!(!contains_path(&doc, "cache.enabled"));
    }
}
