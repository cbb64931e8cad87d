use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub payments: PaymentsConfig,
    pub planner: PlannerConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct PaymentsConfig {
    pub provider: PaymentProvider,
    pub secret_key: Option<SecretString>,
    pub webhook_secret: Option<SecretString>,
    pub success_url: String,
    pub cancel_url: String,
}

/// Optional text-understanding enrichment. Disabled means the deterministic
/// extractor runs alone, which is always a complete path.
#[derive(Clone, Debug)]
pub struct PlannerConfig {
    pub enabled: bool,
    pub model: String,
    pub api_key: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentProvider {
    /// Deterministic in-process stand-in; no network, sessions always open.
    Noop,
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
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub planner_enabled: Option<bool>,
    pub payments_success_url: Option<String>,
    pub payments_cancel_url: Option<String>,
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
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://tably.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            payments: PaymentsConfig {
                provider: PaymentProvider::Noop,
                secret_key: None,
                webhook_secret: None,
                success_url: "http://localhost:8080/checkout/success".to_string(),
                cancel_url: "http://localhost:8080/checkout/cancel".to_string(),
            },
            planner: PlannerConfig {
                enabled: false,
                model: "gpt-4o-mini".to_string(),
                api_key: None,
                timeout_secs: 10,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for PaymentProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "noop" => Ok(Self::Noop),
            other => Err(ConfigError::Validation(format!(
                "unsupported payment provider `{other}` (expected noop)"
            ))),
        }
    }
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
    /// Precedence: defaults < config file < environment < explicit overrides.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("tably.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(payments) = patch.payments {
            if let Some(provider) = payments.provider {
                self.payments.provider = provider;
            }
            if let Some(secret_key) = payments.secret_key {
                self.payments.secret_key = Some(secret_key.into());
            }
            if let Some(webhook_secret) = payments.webhook_secret {
                self.payments.webhook_secret = Some(webhook_secret.into());
            }
            if let Some(success_url) = payments.success_url {
                self.payments.success_url = success_url;
            }
            if let Some(cancel_url) = payments.cancel_url {
                self.payments.cancel_url = cancel_url;
            }
        }

        if let Some(planner) = patch.planner {
            if let Some(enabled) = planner.enabled {
                self.planner.enabled = enabled;
            }
            if let Some(model) = planner.model {
                self.planner.model = model;
            }
            if let Some(api_key) = planner.api_key {
                self.planner.api_key = Some(api_key.into());
            }
            if let Some(timeout_secs) = planner.timeout_secs {
                self.planner.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
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
        if let Some(value) = read_env("TABLY_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("TABLY_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("TABLY_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("TABLY_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("TABLY_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TABLY_PAYMENTS_PROVIDER") {
            self.payments.provider = value.parse()?;
        }
        if let Some(value) = read_env("TABLY_PAYMENTS_SECRET_KEY") {
            self.payments.secret_key = Some(value.into());
        }
        if let Some(value) = read_env("TABLY_PAYMENTS_WEBHOOK_SECRET") {
            self.payments.webhook_secret = Some(value.into());
        }
        if let Some(value) = read_env("TABLY_PAYMENTS_SUCCESS_URL") {
            self.payments.success_url = value;
        }
        if let Some(value) = read_env("TABLY_PAYMENTS_CANCEL_URL") {
            self.payments.cancel_url = value;
        }

        if let Some(value) = read_env("TABLY_PLANNER_ENABLED") {
            self.planner.enabled = parse_bool("TABLY_PLANNER_ENABLED", &value)?;
        }
        if let Some(value) = read_env("TABLY_PLANNER_MODEL") {
            self.planner.model = value;
        }
        if let Some(value) = read_env("TABLY_PLANNER_API_KEY") {
            self.planner.api_key = Some(value.into());
        }
        if let Some(value) = read_env("TABLY_PLANNER_TIMEOUT_SECS") {
            self.planner.timeout_secs = parse_u64("TABLY_PLANNER_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TABLY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("TABLY_SERVER_PORT") {
            self.server.port = parse_u16("TABLY_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("TABLY_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("TABLY_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("TABLY_LOGGING_LEVEL").or_else(|| read_env("TABLY_LOG_LEVEL"))
        {
            self.logging.level = value;
        }
        if let Some(value) =
            read_env("TABLY_LOGGING_FORMAT").or_else(|| read_env("TABLY_LOG_FORMAT"))
        {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(planner_enabled) = overrides.planner_enabled {
            self.planner.enabled = planner_enabled;
        }
        if let Some(success_url) = overrides.payments_success_url {
            self.payments.success_url = success_url;
        }
        if let Some(cancel_url) = overrides.payments_cancel_url {
            self.payments.cancel_url = cancel_url;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Validation("database.url must not be empty".to_string()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Validation(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        if self.payments.success_url.trim().is_empty() || self.payments.cancel_url.trim().is_empty()
        {
            return Err(ConfigError::Validation(
                "payments.success_url and payments.cancel_url must be set".to_string(),
            ));
        }
        if self.planner.enabled && self.planner.model.trim().is_empty() {
            return Err(ConfigError::Validation(
                "planner.model must be set when the planner is enabled".to_string(),
            ));
        }
        if self.server.bind_address.trim().is_empty() {
            return Err(ConfigError::Validation(
                "server.bind_address must not be empty".to_string(),
            ));
        }
        self.logging.level.parse::<tracing_level::Level>().map_err(|_| {
            ConfigError::Validation(format!(
                "unsupported logging.level `{}`",
                self.logging.level
            ))
        })?;
        Ok(())
    }
}

// Minimal level validation without pulling tracing into core.
mod tracing_level {
    pub struct Level;

    impl std::str::FromStr for Level {
        type Err = ();

        fn from_str(value: &str) -> Result<Self, Self::Err> {
            match value.trim().to_ascii_lowercase().as_str() {
                "trace" | "debug" | "info" | "warn" | "error" => Ok(Self),
                _ => Err(()),
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    payments: Option<PaymentsPatch>,
    planner: Option<PlannerPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PaymentsPatch {
    provider: Option<PaymentProvider>,
    secret_key: Option<String>,
    webhook_secret: Option<String>,
    success_url: Option<String>,
    cancel_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PlannerPatch {
    enabled: Option<bool>,
    model: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("tably.toml"), PathBuf::from("config/tably.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    toml::from_str::<ConfigPatch>(&raw)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidEnvOverride {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    #[test]
    fn defaults_validate() {
        AppConfig::default().validate().expect("defaults are valid");
    }

    #[test]
    fn file_patch_applies_under_overrides() {
        let mut file = tempfile::NamedTempFile::new().expect("temp config");
        writeln!(
            file,
            r#"
            [database]
            url = "sqlite://from-file.db"

            [logging]
            level = "debug"
            format = "json"
            "#
        )
        .expect("write config");

        let config = AppConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            require_file: true,
            overrides: ConfigOverrides {
                database_url: Some("sqlite://from-override.db".to_string()),
                ..ConfigOverrides::default()
            },
        })
        .expect("load config");

        // Explicit overrides win over the file.
        assert_eq!(config.database.url, "sqlite://from-override.db");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let result = AppConfig::load(LoadOptions {
            config_path: Some("/nonexistent/tably.toml".into()),
            require_file: true,
            overrides: ConfigOverrides::default(),
        });
        assert!(matches!(result, Err(ConfigError::MissingConfigFile(_))));
    }

    #[test]
    fn bad_log_level_fails_validation() {
        let mut config = AppConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn secrets_are_redacted_in_debug_output() {
        let mut config = AppConfig::default();
        config.payments.secret_key = Some("sk_live_very_secret".to_string().into());
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk_live_very_secret"));
    }
}
