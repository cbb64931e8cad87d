use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tably_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "database.url",
        &config.database.url,
        source("database.url", "TABLY_DATABASE_URL"),
    ));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        source("database.max_connections", "TABLY_DATABASE_MAX_CONNECTIONS"),
    ));
    lines.push(render_line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        source("database.timeout_secs", "TABLY_DATABASE_TIMEOUT_SECS"),
    ));

    lines.push(render_line(
        "payments.provider",
        &format!("{:?}", config.payments.provider),
        source("payments.provider", "TABLY_PAYMENTS_PROVIDER"),
    ));
    lines.push(render_line(
        "payments.secret_key",
        redact_secret(config.payments.secret_key.is_some()),
        source("payments.secret_key", "TABLY_PAYMENTS_SECRET_KEY"),
    ));
    lines.push(render_line(
        "payments.webhook_secret",
        redact_secret(config.payments.webhook_secret.is_some()),
        source("payments.webhook_secret", "TABLY_PAYMENTS_WEBHOOK_SECRET"),
    ));
    lines.push(render_line(
        "payments.success_url",
        &config.payments.success_url,
        source("payments.success_url", "TABLY_PAYMENTS_SUCCESS_URL"),
    ));
    lines.push(render_line(
        "payments.cancel_url",
        &config.payments.cancel_url,
        source("payments.cancel_url", "TABLY_PAYMENTS_CANCEL_URL"),
    ));

    lines.push(render_line(
        "planner.enabled",
        &config.planner.enabled.to_string(),
        source("planner.enabled", "TABLY_PLANNER_ENABLED"),
    ));
    lines.push(render_line(
        "planner.model",
        &config.planner.model,
        source("planner.model", "TABLY_PLANNER_MODEL"),
    ));
    lines.push(render_line(
        "planner.api_key",
        redact_secret(config.planner.api_key.is_some()),
        source("planner.api_key", "TABLY_PLANNER_API_KEY"),
    ));
    lines.push(render_line(
        "planner.timeout_secs",
        &config.planner.timeout_secs.to_string(),
        source("planner.timeout_secs", "TABLY_PLANNER_TIMEOUT_SECS"),
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        source("server.bind_address", "TABLY_SERVER_BIND_ADDRESS"),
    ));
    lines.push(render_line(
        "server.port",
        &config.server.port.to_string(),
        source("server.port", "TABLY_SERVER_PORT"),
    ));
    lines.push(render_line(
        "server.graceful_shutdown_secs",
        &config.server.graceful_shutdown_secs.to_string(),
        source("server.graceful_shutdown_secs", "TABLY_SERVER_GRACEFUL_SHUTDOWN_SECS"),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", "TABLY_LOGGING_LEVEL"),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", "TABLY_LOGGING_FORMAT"),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("tably.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/tably.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
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

fn redact_secret(is_set: bool) -> &'static str {
    if is_set {
        "<redacted>"
    } else {
        "<unset>"
    }
}
