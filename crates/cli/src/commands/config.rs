use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use homequote_core::config::AppConfig;
use homequote_core::config::LoadOptions;
use secrecy::ExposeSecret;
use toml::Value;

/// (dotted key, primary env var)
const FIELDS: &[(&str, &str)] = &[
    ("database.url", "HOMEQUOTE_DATABASE_URL"),
    ("database.max_connections", "HOMEQUOTE_DATABASE_MAX_CONNECTIONS"),
    ("database.timeout_secs", "HOMEQUOTE_DATABASE_TIMEOUT_SECS"),
    ("server.bind_address", "HOMEQUOTE_SERVER_BIND_ADDRESS"),
    ("server.port", "HOMEQUOTE_SERVER_PORT"),
    ("server.health_check_port", "HOMEQUOTE_SERVER_HEALTH_CHECK_PORT"),
    ("server.graceful_shutdown_secs", "HOMEQUOTE_SERVER_GRACEFUL_SHUTDOWN_SECS"),
    ("admin.setup_token", "HOMEQUOTE_ADMIN_SETUP_TOKEN"),
    ("pricing.currency", "HOMEQUOTE_PRICING_CURRENCY"),
    ("pricing.bundle_rules", ""),
    ("logging.level", "HOMEQUOTE_LOGGING_LEVEL"),
    ("logging.format", "HOMEQUOTE_LOGGING_FORMAT"),
];

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, env_key) in FIELDS {
        let env_key = (!env_key.is_empty()).then_some(*env_key);
        lines.push(render_line(
            key,
            &effective_value(&config, key),
            field_source(key, env_key, config_file_doc.as_ref(), config_file_path.as_deref()),
        ));
    }

    lines.join("\n")
}

fn effective_value(config: &AppConfig, key: &str) -> String {
    match key {
        "database.url" => config.database.url.clone(),
        "database.max_connections" => config.database.max_connections.to_string(),
        "database.timeout_secs" => config.database.timeout_secs.to_string(),
        "server.bind_address" => config.server.bind_address.clone(),
        "server.port" => config.server.port.to_string(),
        "server.health_check_port" => config.server.health_check_port.to_string(),
        "server.graceful_shutdown_secs" => config.server.graceful_shutdown_secs.to_string(),
        "admin.setup_token" => match &config.admin.setup_token {
            Some(token) => redact_token(token.expose_secret()),
            None => "<unset>".to_string(),
        },
        "pricing.currency" => config.pricing.currency.clone(),
        "pricing.bundle_rules" => {
            if config.pricing.bundle_rules.is_empty() {
                "<built-in>".to_string()
            } else {
                config
                    .pricing
                    .bundle_rules
                    .iter()
                    .map(|rule| rule.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            }
        }
        "logging.level" => config.logging.level.clone(),
        "logging.format" => format!("{:?}", config.logging.format).to_ascii_lowercase(),
        _ => "<unknown>".to_string(),
    }
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("homequote.toml"), PathBuf::from("config/homequote.toml")]
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
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
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

/// Keeps the first four characters so operators can tell tokens apart.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    let prefix: String = trimmed.chars().take(4).collect();
    format!("{prefix}***")
}
