use homequote_core::config::{AppConfig, LoadOptions};
use homequote_core::Role;
use homequote_db::repositories::{SqlUserRepository, UserRepository};
use homequote_db::{connect_with_config, migrations::MIGRATOR, DbPool};
use serde::Serialize;

use crate::commands::{migrate::applied_count, CommandResult};
use crate::commands::{EXIT_CONFIG, EXIT_DB_CONNECTIVITY, EXIT_MIGRATION, EXIT_RUNTIME};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
    #[serde(skip)]
    exit_code: u8,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into(), exit_code: 0 }
    }

    fn fail(name: &'static str, details: impl Into<String>, exit_code: u8) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into(), exit_code }
    }

    fn skipped(name: &'static str, reason: &str) -> Self {
        Self {
            name,
            status: CheckStatus::Skipped,
            details: format!("skipped because {reason}"),
            exit_code: 0,
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

impl DoctorReport {
    /// Exit code of the first failing check.
    fn exit_code(&self) -> u8 {
        self.checks
            .iter()
            .find(|check| check.status == CheckStatus::Fail)
            .map(|check| check.exit_code)
            .unwrap_or(0)
    }
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = report.exit_code();

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::pass("config_validation", "configuration loaded and validated"));
            checks.extend(database_checks(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string(), EXIT_CONFIG));
            for name in ["database_connectivity", "schema_migrations", "admin_bootstrap"] {
                checks.push(DoctorCheck::skipped(name, "configuration did not load"));
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn database_checks(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![
                DoctorCheck::fail(
                    "database_connectivity",
                    format!("failed to initialize async runtime: {error}"),
                    EXIT_RUNTIME,
                ),
                DoctorCheck::skipped("schema_migrations", "no async runtime"),
                DoctorCheck::skipped("admin_bootstrap", "no async runtime"),
            ];
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_config(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck::fail(
                        "database_connectivity",
                        format!("failed to connect to database: {error}"),
                        EXIT_DB_CONNECTIVITY,
                    ),
                    DoctorCheck::skipped("schema_migrations", "the database is unreachable"),
                    DoctorCheck::skipped("admin_bootstrap", "the database is unreachable"),
                ];
            }
        };

        let mut checks = vec![DoctorCheck::pass(
            "database_connectivity",
            format!("connected using `{}`", config.database.url),
        )];
        let schema = check_schema(&pool).await;
        let schema_ready = schema.status == CheckStatus::Pass;
        checks.push(schema);
        checks.push(if schema_ready {
            check_admin_bootstrap(&pool, config).await
        } else {
            DoctorCheck::skipped("admin_bootstrap", "the schema is not migrated")
        });

        pool.close().await;
        checks
    })
}

async fn check_schema(pool: &DbPool) -> DoctorCheck {
    let expected = MIGRATOR.iter().filter(|migration| migration.migration_type.is_up_migration()).count()
        as i64;
    let applied = applied_count(pool).await;

    if applied >= expected {
        DoctorCheck::pass("schema_migrations", format!("{applied} of {expected} migrations applied"))
    } else {
        DoctorCheck::fail(
            "schema_migrations",
            format!("{applied} of {expected} migrations applied; run `homequote migrate`"),
            EXIT_MIGRATION,
        )
    }
}

/// An active administrator, or a setup token to create the first one.
async fn check_admin_bootstrap(pool: &DbPool, config: &AppConfig) -> DoctorCheck {
    let admins = match SqlUserRepository::new(pool.clone())
        .count_active_with_role(Role::Administrator)
        .await
    {
        Ok(count) => count,
        Err(error) => {
            return DoctorCheck::fail(
                "admin_bootstrap",
                format!("could not count administrators: {error}"),
                EXIT_DB_CONNECTIVITY,
            );
        }
    };

    match (admins, config.admin.setup_token.is_some()) {
        (0, true) => DoctorCheck::pass(
            "admin_bootstrap",
            "no administrator yet; first-run setup is enabled",
        ),
        (0, false) => DoctorCheck::fail(
            "admin_bootstrap",
            "no administrator and no admin.setup_token configured",
            EXIT_CONFIG,
        ),
        (count, _) => DoctorCheck::pass("admin_bootstrap", format!("{count} active administrator(s)")),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::{render_human, CheckStatus, DoctorCheck, DoctorReport};

    #[test]
    fn exit_code_follows_first_failure() {
        let report = DoctorReport {
            overall_status: CheckStatus::Fail,
            summary: "doctor: one or more readiness checks failed".to_string(),
            checks: vec![
                DoctorCheck::pass("config_validation", "ok"),
                DoctorCheck::fail("schema_migrations", "0 of 1", 5),
                DoctorCheck::fail("admin_bootstrap", "none", 2),
            ],
        };

        assert_eq!(report.exit_code(), 5);
        let rendered = render_human(&report);
        assert!(rendered.contains("- [fail] schema_migrations: 0 of 1"));
        assert!(rendered.contains("- [ok] config_validation: ok"));
    }
}
