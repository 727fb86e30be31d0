// Configuration loading: YAML base file, optional override file, ${ENV} placeholders.
use anyhow::{Context, Result};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::env;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::warn;

pub const CONFIG_PATH_ENV: &str = "SEMAFORO_CONFIG_PATH";
pub const CONFIG_OVERRIDE_PATH_ENV: &str = "SEMAFORO_CONFIG_OVERRIDE_PATH";
const DEFAULT_CONFIG_PATH: &str = "config/semaforo.yaml";
const DEFAULT_OVERRIDE_PATH: &str = "data/config/semaforo.override.yaml";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub i18n: I18nConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    #[serde(deserialize_with = "deserialize_u16_from_any")]
    pub port: u16,
    /// Include the underlying error text (`detalle`) in 5xx bodies. Turn off for any
    /// deployment reachable by untrusted callers.
    pub expose_error_detail: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            expose_error_detail: true,
        }
    }
}

/// `None` on any list means "allow all"; a `"*"` entry does too.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CorsConfig {
    pub allow_origins: Option<Vec<String>>,
    pub allow_methods: Option<Vec<String>>,
    pub allow_headers: Option<Vec<String>>,
    pub allow_credentials: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct I18nConfig {
    pub default_language: String,
}

impl Default for I18nConfig {
    fn default() -> Self {
        Self {
            default_language: "es-ES".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub path: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            path: "web/dashboard.html".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: String,
    #[serde(default)]
    pub db_path: String,
    /// Abort startup when the table cannot be created instead of serving degraded.
    #[serde(default)]
    pub fail_fast_on_schema_error: bool,
    #[serde(default)]
    pub postgres: PostgresConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    pub dsn: String,
    pub host: String,
    pub port: Option<u16>,
    pub user: String,
    pub password: String,
    pub database: String,
    pub connect_timeout_s: u64,
    pub pool_size: usize,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            dsn: String::new(),
            host: String::new(),
            port: None,
            user: String::new(),
            password: String::new(),
            database: String::new(),
            connect_timeout_s: 5,
            pool_size: 16,
        }
    }
}

impl Config {
    /// Bind address; `SEMAFORO_HOST` / `SEMAFORO_PORT` win over the file for containers.
    pub fn bind_address(&self) -> String {
        let host = env::var("SEMAFORO_HOST").unwrap_or_else(|_| self.server.host.clone());
        let port = env::var("SEMAFORO_PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(self.server.port);
        format!("{host}:{port}")
    }
}

fn deserialize_u16_from_any<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    struct U16Visitor;

    impl<'de> Visitor<'de> for U16Visitor {
        type Value = u16;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("u16 or numeric string")
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            u16::try_from(value).map_err(|_| E::custom("u16 out of range"))
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if value < 0 {
                return Err(E::custom("u16 must be non-negative"));
            }
            self.visit_u64(value as u64)
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Err(E::custom("u16 string is empty"));
            }
            trimmed
                .parse::<u16>()
                .map_err(|_| E::custom("invalid u16 string"))
        }
    }

    deserializer.deserialize_any(U16Visitor)
}

/// Reads the base file and merges the override file over it. A missing file means
/// defaults; a file that exists but cannot be read, parsed or typed is an error.
pub fn load_config() -> Result<Config> {
    let base_path = env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let override_path =
        env::var(CONFIG_OVERRIDE_PATH_ENV).unwrap_or_else(|_| DEFAULT_OVERRIDE_PATH.to_string());
    load_config_from(&base_path, Some(&override_path))
}

pub fn load_config_from(base_path: &str, override_path: Option<&str>) -> Result<Config> {
    let mut merged = read_yaml(base_path)?;
    if let Some(override_path) = override_path.filter(|path| Path::new(path).exists()) {
        // Only non-null override values replace base values.
        merge_yaml(&mut merged, read_yaml(override_path)?);
    }

    expand_yaml_env(&mut merged);

    if merged.is_null() {
        return Ok(Config::default());
    }
    serde_yaml::from_value::<Config>(merged)
        .with_context(|| format!("invalid configuration in {base_path}"))
}

fn read_yaml(path: &str) -> Result<Value> {
    let content = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            warn!("config file {path} not found, using defaults");
            return Ok(Value::Null);
        }
        Err(err) => return Err(err).with_context(|| format!("cannot read config file {path}")),
    };
    serde_yaml::from_str(&content).with_context(|| format!("cannot parse YAML {path}"))
}

fn merge_yaml(base: &mut Value, override_value: Value) {
    match (base, override_value) {
        (Value::Mapping(base_map), Value::Mapping(override_map)) => {
            for (key, value) in override_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_yaml(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base_slot, override_value) => {
            if !override_value.is_null() {
                *base_slot = override_value;
            }
        }
    }
}

fn expand_yaml_env(value: &mut Value) {
    match value {
        Value::String(text) => {
            *text = expand_env_placeholders(text);
        }
        Value::Sequence(items) => {
            for item in items {
                expand_yaml_env(item);
            }
        }
        Value::Mapping(map) => {
            for (_, value) in map.iter_mut() {
                expand_yaml_env(value);
            }
        }
        _ => {}
    }
}

fn expand_env_placeholders(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        rest = &rest[start + 2..];
        let Some(end) = rest.find('}') else {
            output.push_str("${");
            output.push_str(rest);
            return output;
        };
        let inner = &rest[..end];
        rest = &rest[end + 1..];
        let (name, default_value) = match inner.split_once(":-") {
            Some((name, default_value)) => (name.trim(), Some(default_value)),
            None => (inner.trim(), None),
        };
        if name.is_empty() {
            output.push_str("${");
            output.push_str(inner);
            output.push('}');
            continue;
        }
        let resolved = env::var(name).ok().filter(|value| !value.is_empty());
        match (resolved, default_value) {
            (Some(value), _) => output.push_str(&value),
            (None, Some(default_value)) => output.push_str(default_value),
            (None, None) => {}
        }
    }
    output.push_str(rest);
    output
}
