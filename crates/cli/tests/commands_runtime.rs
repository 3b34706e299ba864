use std::env;
use std::sync::{Mutex, OnceLock};

use homequote_cli::commands::{doctor, migrate, seed};
use serde_json::Value;

const MEMORY_DB: &[(&str, &str)] =
    &[("HOMEQUOTE_DATABASE_URL", "sqlite::memory:"), ("HOMEQUOTE_DATABASE_MAX_CONNECTIONS", "1")];

#[test]
fn migrate_returns_success_with_memory_database() {
    with_env(MEMORY_DB, || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
        assert!(payload["error_class"].is_null());
        assert!(payload["message"].as_str().unwrap_or_default().starts_with("applied"));
    });
}

#[test]
fn migrate_reports_config_failure_with_exit_code_two() {
    with_env(&[("HOMEQUOTE_DATABASE_URL", "postgres://elsewhere/homequote")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn migrate_reports_unparseable_env_override_as_config_failure() {
    with_env(&[("HOMEQUOTE_SERVER_PORT", "not-a-port")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "config_validation");
    });
}

#[test]
fn seed_loads_and_verifies_demo_dataset() {
    with_env(MEMORY_DB, || {
        let result = seed::run(false);
        assert_eq!(result.exit_code, 0, "expected seed success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");

        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("3 users"));
        assert!(message.contains("3 financing plans"));
        assert!(message.ends_with("proposal P-SEED-001"));
    });
}

#[test]
fn seed_reset_is_repeatable() {
    with_env(MEMORY_DB, || {
        let result = seed::run(true);
        assert_eq!(result.exit_code, 0, "expected seed --reset success: {}", result.output);
        assert_eq!(parse_payload(&result.output)["status"], "ok");
    });
}

#[test]
fn doctor_flags_unmigrated_schema_in_json() {
    with_env(MEMORY_DB, || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 5, "fresh database has pending migrations");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "fail");

        let checks = payload["checks"].as_array().expect("checks array");
        let status_of = |name: &str| {
            checks
                .iter()
                .find(|check| check["name"] == name)
                .map(|check| check["status"].as_str().unwrap_or_default().to_string())
                .unwrap_or_default()
        };
        assert_eq!(status_of("config_validation"), "pass");
        assert_eq!(status_of("database_connectivity"), "pass");
        assert_eq!(status_of("schema_migrations"), "fail");
        assert_eq!(status_of("admin_bootstrap"), "skipped");
    });
}

#[test]
fn doctor_skips_database_checks_when_config_is_invalid() {
    with_env(&[("HOMEQUOTE_PRICING_CURRENCY", "dollars")], || {
        let result = doctor::run(false);
        assert_eq!(result.exit_code, 2);

        let output = result.output;
        assert!(output.starts_with("doctor: one or more readiness checks failed"));
        assert!(output.contains("- [fail] config_validation:"));
        assert!(output.contains("- [skip] database_connectivity:"));
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "HOMEQUOTE_DATABASE_URL",
        "HOMEQUOTE_DATABASE_MAX_CONNECTIONS",
        "HOMEQUOTE_DATABASE_TIMEOUT_SECS",
        "HOMEQUOTE_SERVER_BIND_ADDRESS",
        "HOMEQUOTE_SERVER_PORT",
        "HOMEQUOTE_SERVER_HEALTH_CHECK_PORT",
        "HOMEQUOTE_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "HOMEQUOTE_ADMIN_SETUP_TOKEN",
        "HOMEQUOTE_PRICING_CURRENCY",
        "HOMEQUOTE_LOGGING_LEVEL",
        "HOMEQUOTE_LOGGING_FORMAT",
        "HOMEQUOTE_LOG_LEVEL",
        "HOMEQUOTE_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
