use homequote_core::config::{AppConfig, ConfigError, LoadOptions};
use homequote_db::{connect_with_config, migrations, DbPool};
use thiserror::Error;
use tracing::info;

use crate::api::ApiState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub api_state: ApiState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Connects, migrates and wires repositories for an already loaded config.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        max_connections = config.database.max_connections,
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let api_state = ApiState::from_pool(db_pool.clone(), &config);
    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        currency = %config.pricing.currency,
        setup_enabled = config.admin.setup_token.is_some(),
        "application wired"
    );

    Ok(Application { config, db_pool, api_state })
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderMap;
    use homequote_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    fn options(database_url: &str, setup_token: Option<&str>) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                admin_setup_token: setup_token.map(str::to_string),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_with_short_setup_token() {
        let result = bootstrap(options("sqlite::memory:", Some("short"))).await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("admin.setup_token"));
    }

    #[tokio::test]
    async fn bootstrap_migrates_and_wires_repositories() {
        let app = bootstrap(options("sqlite::memory:", Some("first-run-setup-token-0001")))
            .await
            .expect("bootstrap should succeed");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('proposal', 'discount_request', 'app_user', 'audit_event')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema lookup");
        assert_eq!(table_count, 4);

        let policy = app.api_state.approval_policy().await.expect("role permissions");
        assert!(policy.permissions_for(homequote_core::Role::SalesManager).can_approve_discounts);

        // No users exist yet, so every authenticated route is closed.
        let refused = app.api_state.authenticate(&HeaderMap::new()).await;
        assert!(refused.is_err());
        assert!(app.api_state.setup_token.is_some());

        app.db_pool.close().await;
    }
}
