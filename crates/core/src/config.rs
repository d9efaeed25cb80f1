use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub advice: AdviceConfig,
    pub permissions: PermissionsConfig,
    pub model: ModelConfig,
    pub enhancement: EnhancementConfig,
    pub cache: CacheConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct AdviceConfig {
    pub url: String,
    pub length: String,
    pub temperature: f64,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct PermissionsConfig {
    pub base_url: String,
    pub agent_name: String,
    pub timeout_secs: u64,
    pub subscribe_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ModelConfig {
    pub model_id: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub api_key: Option<SecretString>,
    pub max_token_count: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct EnhancementConfig {
    pub bypass: bool,
}

#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub max_entries: usize,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub action_group: String,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub advice_url: Option<String>,
    pub permissions_base_url: Option<String>,
    pub agent_name: Option<String>,
    pub model_id: Option<String>,
    pub model_api_key: Option<String>,
    pub enhancement_bypass: Option<bool>,
    pub cache_enabled: Option<bool>,
    pub log_level: Option<String>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            advice: AdviceConfig {
                url: "http://localhost:8000/advise".to_string(),
                length: "long".to_string(),
                temperature: 0.5,
                timeout_secs: 20,
            },
            permissions: PermissionsConfig {
                base_url: "http://localhost:9000/dev".to_string(),
                agent_name: "advice-agent".to_string(),
                timeout_secs: 10,
                subscribe_timeout_secs: 15,
            },
            model: ModelConfig {
                model_id: "amazon.titan-text-premier-v1:0".to_string(),
                region: "us-east-1".to_string(),
                endpoint: None,
                api_key: None,
                max_token_count: 800,
                temperature: 0.3,
                top_p: 0.9,
                timeout_secs: 30,
                max_retries: 2,
            },
            enhancement: EnhancementConfig { bypass: true },
            cache: CacheConfig { enabled: true, ttl_secs: 3600, max_entries: 100 },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                action_group: "advice-proxy".to_string(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl ModelConfig {
    /// Runtime endpoint for the configured region unless an explicit endpoint is set.
    pub fn endpoint_base(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://bedrock-runtime.{}.amazonaws.com", self.region),
        }
    }

    pub fn invoke_url(&self) -> String {
        format!("{}/model/{}/invoke", self.endpoint_base(), self.model_id)
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("counsel.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.normalize();
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(advice) = patch.advice {
            if let Some(url) = advice.url {
                self.advice.url = url;
            }
            if let Some(length) = advice.length {
                self.advice.length = length;
            }
            if let Some(temperature) = advice.temperature {
                self.advice.temperature = temperature;
            }
            if let Some(timeout_secs) = advice.timeout_secs {
                self.advice.timeout_secs = timeout_secs;
            }
        }

        if let Some(permissions) = patch.permissions {
            if let Some(base_url) = permissions.base_url {
                self.permissions.base_url = base_url;
            }
            if let Some(agent_name) = permissions.agent_name {
                self.permissions.agent_name = agent_name;
            }
            if let Some(timeout_secs) = permissions.timeout_secs {
                self.permissions.timeout_secs = timeout_secs;
            }
            if let Some(subscribe_timeout_secs) = permissions.subscribe_timeout_secs {
                self.permissions.subscribe_timeout_secs = subscribe_timeout_secs;
            }
        }

        if let Some(model) = patch.model {
            if let Some(model_id) = model.model_id {
                self.model.model_id = model_id;
            }
            if let Some(region) = model.region {
                self.model.region = region;
            }
            if let Some(endpoint) = model.endpoint {
                self.model.endpoint = Some(endpoint);
            }
            if let Some(model_api_key_value) = model.api_key {
                self.model.api_key = Some(secret_value(model_api_key_value));
            }
            if let Some(max_token_count) = model.max_token_count {
                self.model.max_token_count = max_token_count;
            }
            if let Some(temperature) = model.temperature {
                self.model.temperature = temperature;
            }
            if let Some(top_p) = model.top_p {
                self.model.top_p = top_p;
            }
            if let Some(timeout_secs) = model.timeout_secs {
                self.model.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = model.max_retries {
                self.model.max_retries = max_retries;
            }
        }

        if let Some(enhancement) = patch.enhancement {
            if let Some(bypass) = enhancement.bypass {
                self.enhancement.bypass = bypass;
            }
        }

        if let Some(cache) = patch.cache {
            if let Some(enabled) = cache.enabled {
                self.cache.enabled = enabled;
            }
            if let Some(ttl_secs) = cache.ttl_secs {
                self.cache.ttl_secs = ttl_secs;
            }
            if let Some(max_entries) = cache.max_entries {
                self.cache.max_entries = max_entries;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(action_group) = server.action_group {
                self.server.action_group = action_group;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        // Unprefixed names are accepted for deployments that predate the COUNSEL_ prefix.
        if let Some(value) =
            read_env("COUNSEL_ADVICE_URL").or_else(|| read_env("EXTERNAL_ADVICE_API_URL"))
        {
            self.advice.url = value;
        }
        if let Some(value) = read_env("COUNSEL_ADVICE_LENGTH").or_else(|| read_env("ADVICE_LENGTH"))
        {
            self.advice.length = value;
        }
        if let Some((key, value)) = read_env_with_key(&["COUNSEL_ADVICE_TEMPERATURE", "ADVICE_TEMPERATURE"])
        {
            self.advice.temperature = parse_f64(key, &value)?;
        }
        if let Some(value) = read_env("COUNSEL_ADVICE_TIMEOUT_SECS") {
            self.advice.timeout_secs = parse_u64("COUNSEL_ADVICE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) =
            read_env("COUNSEL_PERMISSIONS_BASE_URL").or_else(|| read_env("PERMISSION_API_URL"))
        {
            self.permissions.base_url = value;
        }
        if let Some(value) = read_env("COUNSEL_AGENT_NAME").or_else(|| read_env("AGENT_NAME")) {
            self.permissions.agent_name = value;
        }
        if let Some(value) = read_env("COUNSEL_PERMISSIONS_TIMEOUT_SECS") {
            self.permissions.timeout_secs = parse_u64("COUNSEL_PERMISSIONS_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("COUNSEL_MODEL_ID").or_else(|| read_env("BEDROCK_MODEL_ID")) {
            self.model.model_id = value;
        }
        if let Some(value) =
            read_env("COUNSEL_MODEL_REGION").or_else(|| read_env("BEDROCK_REGION"))
        {
            self.model.region = value;
        }
        if let Some(value) = read_env("COUNSEL_MODEL_ENDPOINT") {
            self.model.endpoint = Some(value);
        }
        if let Some(value) = read_env("COUNSEL_MODEL_API_KEY") {
            self.model.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("COUNSEL_MODEL_MAX_RETRIES") {
            self.model.max_retries = parse_u32("COUNSEL_MODEL_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("COUNSEL_ENHANCEMENT_BYPASS") {
            self.enhancement.bypass = parse_bool("COUNSEL_ENHANCEMENT_BYPASS", &value)?;
        }

        if let Some(value) = read_env("COUNSEL_CACHE_ENABLED") {
            self.cache.enabled = parse_bool("COUNSEL_CACHE_ENABLED", &value)?;
        }
        if let Some(value) = read_env("COUNSEL_CACHE_TTL_SECS") {
            self.cache.ttl_secs = parse_u64("COUNSEL_CACHE_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("COUNSEL_CACHE_MAX_ENTRIES") {
            self.cache.max_entries = parse_u32("COUNSEL_CACHE_MAX_ENTRIES", &value)? as usize;
        }

        if let Some(value) = read_env("COUNSEL_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("COUNSEL_SERVER_PORT") {
            self.server.port = parse_u16("COUNSEL_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("COUNSEL_SERVER_ACTION_GROUP") {
            self.server.action_group = value;
        }

        let log_level =
            read_env("COUNSEL_LOGGING_LEVEL").or_else(|| read_env("COUNSEL_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("COUNSEL_LOGGING_FORMAT").or_else(|| read_env("COUNSEL_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(advice_url) = overrides.advice_url {
            self.advice.url = advice_url;
        }
        if let Some(base_url) = overrides.permissions_base_url {
            self.permissions.base_url = base_url;
        }
        if let Some(agent_name) = overrides.agent_name {
            self.permissions.agent_name = agent_name;
        }
        if let Some(model_id) = overrides.model_id {
            self.model.model_id = model_id;
        }
        if let Some(model_api_key) = overrides.model_api_key {
            self.model.api_key = Some(secret_value(model_api_key));
        }
        if let Some(bypass) = overrides.enhancement_bypass {
            self.enhancement.bypass = bypass;
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = enabled;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
    }

    fn normalize(&mut self) {
        let trimmed = self.permissions.base_url.trim().trim_end_matches('/').to_string();
        self.permissions.base_url = trimmed;
        self.advice.url = self.advice.url.trim().to_string();
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_advice(&self.advice)?;
        validate_permissions(&self.permissions)?;
        validate_model(&self.model, &self.enhancement)?;
        validate_cache(&self.cache)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("counsel.toml"), PathBuf::from("config/counsel.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn validate_timeout(key: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 || value > 300 {
        return Err(ConfigError::Validation(format!("{key} must be in range 1..=300")));
    }
    Ok(())
}

fn validate_advice(advice: &AdviceConfig) -> Result<(), ConfigError> {
    if !is_http_url(&advice.url) {
        return Err(ConfigError::Validation(
            "advice.url must start with http:// or https://".to_string(),
        ));
    }
    if advice.length.trim().is_empty() {
        return Err(ConfigError::Validation("advice.length must not be empty".to_string()));
    }
    if !(0.0..=1.0).contains(&advice.temperature) {
        return Err(ConfigError::Validation(
            "advice.temperature must be in range 0.0..=1.0".to_string(),
        ));
    }
    validate_timeout("advice.timeout_secs", advice.timeout_secs)
}

fn validate_permissions(permissions: &PermissionsConfig) -> Result<(), ConfigError> {
    if !is_http_url(&permissions.base_url) {
        return Err(ConfigError::Validation(
            "permissions.base_url must start with http:// or https://".to_string(),
        ));
    }
    if permissions.agent_name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "permissions.agent_name must not be empty".to_string(),
        ));
    }
    validate_timeout("permissions.timeout_secs", permissions.timeout_secs)?;
    validate_timeout("permissions.subscribe_timeout_secs", permissions.subscribe_timeout_secs)
}

/// Upper bound on throttling retries for one enhancement call.
pub const MAX_MODEL_RETRIES: u32 = 5;

fn validate_model(model: &ModelConfig, enhancement: &EnhancementConfig) -> Result<(), ConfigError> {
    validate_timeout("model.timeout_secs", model.timeout_secs)?;

    if model.model_id.trim().is_empty() {
        return Err(ConfigError::Validation("model.model_id must not be empty".to_string()));
    }
    if let Some(endpoint) = &model.endpoint {
        if !is_http_url(endpoint) {
            return Err(ConfigError::Validation(
                "model.endpoint must start with http:// or https://".to_string(),
            ));
        }
    }
    if !(0.0..=1.0).contains(&model.temperature) || !(0.0..=1.0).contains(&model.top_p) {
        return Err(ConfigError::Validation(
            "model.temperature and model.top_p must be in range 0.0..=1.0".to_string(),
        ));
    }
    if model.max_retries > MAX_MODEL_RETRIES {
        return Err(ConfigError::Validation(format!(
            "model.max_retries must be at most {MAX_MODEL_RETRIES}"
        )));
    }
    if model.max_token_count == 0 {
        return Err(ConfigError::Validation(
            "model.max_token_count must be greater than zero".to_string(),
        ));
    }

    if !enhancement.bypass {
        let missing = model
            .api_key
            .as_ref()
            .map(|value| value.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if missing {
            return Err(ConfigError::Validation(
                "model.api_key is required when enhancement.bypass is false".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_cache(cache: &CacheConfig) -> Result<(), ConfigError> {
    if cache.enabled && (cache.ttl_secs == 0 || cache.max_entries == 0) {
        return Err(ConfigError::Validation(
            "cache.ttl_secs and cache.max_entries must be greater than zero when cache is enabled"
                .to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }
    if server.action_group.trim().is_empty() {
        return Err(ConfigError::Validation(
            "server.action_group must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn read_env_with_key<'a>(keys: &[&'a str]) -> Option<(&'a str, String)> {
    keys.iter().find_map(|key| read_env(key).map(|value| (*key, value)))
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse::<u16>().map_err(|_| invalid_override(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.trim().parse::<f64>().map_err(|_| invalid_override(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(invalid_override(key, value)),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    advice: Option<AdvicePatch>,
    permissions: Option<PermissionsPatch>,
    model: Option<ModelPatch>,
    enhancement: Option<EnhancementPatch>,
    cache: Option<CachePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct AdvicePatch {
    url: Option<String>,
    length: Option<String>,
    temperature: Option<f64>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PermissionsPatch {
    base_url: Option<String>,
    agent_name: Option<String>,
    timeout_secs: Option<u64>,
    subscribe_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ModelPatch {
    model_id: Option<String>,
    region: Option<String>,
    endpoint: Option<String>,
    api_key: Option<String>,
    max_token_count: Option<u32>,
    temperature: Option<f64>,
    top_p: Option<f64>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct EnhancementPatch {
    bypass: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct CachePatch {
    enabled: Option<bool>,
    ttl_secs: Option<u64>,
    max_entries: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    action_group: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_validate_without_any_input() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.enhancement.bypass, "enhancement should default to bypass")?;
        ensure(config.cache.ttl_secs == 3600, "default ttl should be one hour")?;
        ensure(config.cache.max_entries == 100, "default capacity should be 100")?;
        ensure(config.advice.timeout_secs == 20, "advice timeout should default to 20s")?;
        ensure(config.permissions.timeout_secs == 10, "permission timeout should default to 10s")?;
        ensure(config.permissions.agent_name == "advice-agent", "default agent name")?;
        ensure(
            config.model.invoke_url()
                == "https://bedrock-runtime.us-east-1.amazonaws.com/model/amazon.titan-text-premier-v1:0/invoke",
            "invoke url should be derived from region and model id",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_COUNSEL_MODEL_KEY", "key-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("counsel.toml");
            fs::write(
                &path,
                r#"
[enhancement]
bypass = false

[model]
api_key = "${TEST_COUNSEL_MODEL_KEY}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(!config.enhancement.bypass, "bypass should be disabled from file")?;
            ensure(
                config.model.api_key.as_ref().map(|key| key.expose_secret().to_string())
                    == Some("key-from-env".to_string()),
                "model api key should be interpolated from environment",
            )
        })();

        clear_vars(&["TEST_COUNSEL_MODEL_KEY"]);
        result
    }

    #[test]
    fn unprefixed_env_names_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("PERMISSION_API_URL", "https://permissions.example.test/dev/");
        env::set_var("EXTERNAL_ADVICE_API_URL", "https://advice.example.test/advise");
        env::set_var("ADVICE_TEMPERATURE", "0.7");
        env::set_var("BEDROCK_REGION", "eu-west-1");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.permissions.base_url == "https://permissions.example.test/dev",
                "permission url should drop the trailing slash",
            )?;
            ensure(
                config.advice.url == "https://advice.example.test/advise",
                "advice url should come from legacy env name",
            )?;
            ensure((config.advice.temperature - 0.7).abs() < f64::EPSILON, "temperature")?;
            ensure(config.model.region == "eu-west-1", "region should come from legacy env name")
        })();

        clear_vars(&[
            "PERMISSION_API_URL",
            "EXTERNAL_ADVICE_API_URL",
            "ADVICE_TEMPERATURE",
            "BEDROCK_REGION",
        ]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("COUNSEL_ADVICE_URL", "http://from-env/advise");
        env::set_var("COUNSEL_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("counsel.toml");
            fs::write(
                &path,
                r#"
[advice]
url = "http://from-file/advise"
length = "short"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    log_level: Some("debug".to_string()),
                    agent_name: Some("budget-agent".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.advice.url == "http://from-env/advise", "env should win over file")?;
            ensure(config.advice.length == "short", "file value should win over default")?;
            ensure(config.logging.level == "debug", "override should win over file")?;
            ensure(matches!(config.logging.format, LogFormat::Json), "json format from env")?;
            ensure(config.permissions.agent_name == "budget-agent", "agent override applies")
        })();

        clear_vars(&["COUNSEL_ADVICE_URL", "COUNSEL_LOG_FORMAT"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("COUNSEL_ENHANCEMENT_BYPASS", "false");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("model.api_key")
            );
            ensure(has_message, "validation failure should mention model.api_key")
        })();

        clear_vars(&["COUNSEL_ENHANCEMENT_BYPASS"]);
        result
    }

    #[test]
    fn model_retries_above_the_cap_are_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("COUNSEL_MODEL_MAX_RETRIES", "5000");

        let result = (|| -> Result<(), String> {
            let rejected = matches!(
                AppConfig::load(LoadOptions::default()),
                Err(ConfigError::Validation(ref message)) if message.contains("model.max_retries")
            );
            ensure(rejected, "oversized retry count should fail validation")?;

            env::set_var("COUNSEL_MODEL_MAX_RETRIES", "5");
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            ensure(config.model.max_retries == 5, "retry count at the cap should be accepted")
        })();

        clear_vars(&["COUNSEL_MODEL_MAX_RETRIES"]);
        result
    }

    #[test]
    fn malformed_numeric_env_is_reported_with_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("COUNSEL_CACHE_TTL_SECS", "soon");

        let result = (|| -> Result<(), String> {
            match AppConfig::load(LoadOptions::default()) {
                Err(ConfigError::InvalidEnvOverride { key, .. }) => {
                    ensure(key == "COUNSEL_CACHE_TTL_SECS", "error should name the env key")
                }
                _ => Err("expected invalid env override error".to_string()),
            }
        })();

        clear_vars(&["COUNSEL_CACHE_TTL_SECS"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("COUNSEL_MODEL_API_KEY", "model-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("model-secret-value"),
                "debug output should not contain the model api key",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )
        })();

        clear_vars(&["COUNSEL_MODEL_API_KEY"]);
        result
    }
}
