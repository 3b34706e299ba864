//! Readiness endpoint for load balancers and the deploy pipeline.
//!
//! Ready means the database answers, every embedded migration is applied and
//! at least one role can resolve over-limit discount requests.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use homequote_db::{migrations::MIGRATOR, DbPool};
use serde::Serialize;
use tracing::{error, info, warn};

const READY: &str = "ready";
const DEGRADED: &str = "degraded";
const SKIPPED: &str = "skipped";

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

impl HealthCheck {
    fn ready(detail: impl Into<String>) -> Self {
        Self { status: READY, detail: detail.into() }
    }

    fn degraded(detail: impl Into<String>) -> Self {
        Self { status: DEGRADED, detail: detail.into() }
    }

    fn skipped(reason: &str) -> Self {
        Self { status: SKIPPED, detail: format!("skipped because {reason}") }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: HealthCheck,
    pub schema: HealthCheck,
    pub approvals: HealthCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool })
}

/// Serves `/health` on the dedicated health-check port.
pub async fn spawn(bind_address: &str, port: u16, db_pool: DbPool) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(db_pool)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let pool = &state.db_pool;
    let database = database_check(pool).await;
    let schema = if database.status == READY {
        schema_check(pool).await
    } else {
        HealthCheck::skipped("the database is unreachable")
    };
    let approvals = if schema.status == READY {
        approvals_check(pool).await
    } else {
        HealthCheck::skipped("the schema is not migrated")
    };

    let ready = [&database, &schema, &approvals].iter().all(|check| check.status == READY);
    if !ready {
        warn!(
            event_name = "system.health.degraded",
            correlation_id = "health",
            database = database.status,
            schema = schema.status,
            approvals = approvals.status,
            "readiness check failed"
        );
    }

    let payload = HealthResponse {
        status: if ready { READY } else { DEGRADED },
        database,
        schema,
        approvals,
        checked_at: Utc::now().to_rfc3339(),
    };
    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck::ready("sqlite connection answered"),
        Err(error) => HealthCheck::degraded(format!("database query failed: {error}")),
    }
}

/// Compares the migration ledger against the migrations compiled into the
/// binary. A missing ledger counts as nothing applied.
async fn schema_check(pool: &DbPool) -> HealthCheck {
    let expected =
        MIGRATOR.iter().filter(|migration| migration.migration_type.is_up_migration()).count();
    let applied =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
            .fetch_one(pool)
            .await
            .unwrap_or(0);

    if applied >= expected as i64 {
        HealthCheck::ready(format!("{applied} of {expected} migrations applied"))
    } else {
        HealthCheck::degraded(format!(
            "{applied} of {expected} migrations applied; run `homequote migrate`"
        ))
    }
}

/// Over-limit overrides wait on a role with approval rights.
async fn approvals_check(pool: &DbPool) -> HealthCheck {
    let counts = sqlx::query_as::<_, (i64, i64)>(
        "SELECT
             (SELECT COUNT(*) FROM role_permission WHERE can_approve_discounts = 1),
             (SELECT COUNT(*) FROM discount_request WHERE status = 'pending')",
    )
    .fetch_one(pool)
    .await;

    match counts {
        Ok((0, pending)) => HealthCheck::degraded(format!(
            "no role can approve discounts; {pending} pending request(s) cannot be resolved"
        )),
        Ok((approvers, pending)) => HealthCheck::ready(format!(
            "{approvers} approving role(s), {pending} pending discount request(s)"
        )),
        Err(error) => HealthCheck::degraded(format!("approval tables unreadable: {error}")),
    }
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, Json};
    use homequote_db::{connect_with_settings, migrations, DbPool};

    use crate::health::{health, HealthState};

    async fn pool() -> DbPool {
        connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect")
    }

    #[tokio::test]
    async fn ready_once_migrated_with_default_approvers() {
        let pool = pool().await;
        migrations::run_pending(&pool).await.expect("migrations");

        let (status, Json(payload)) = health(State(HealthState { db_pool: pool.clone() })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert!(payload.schema.detail.ends_with("migrations applied"));
        assert_eq!(
            payload.approvals.detail,
            "2 approving role(s), 0 pending discount request(s)"
        );

        pool.close().await;
    }

    #[tokio::test]
    async fn unmigrated_schema_is_degraded_and_skips_approvals() {
        let pool = pool().await;

        let (status, Json(payload)) = health(State(HealthState { db_pool: pool.clone() })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.database.status, "ready");
        assert_eq!(payload.schema.status, "degraded");
        assert!(payload.schema.detail.starts_with("0 of "));
        assert!(payload.schema.detail.contains("homequote migrate"));
        assert_eq!(payload.approvals.status, "skipped");

        pool.close().await;
    }

    #[tokio::test]
    async fn no_approving_role_is_degraded() {
        let pool = pool().await;
        migrations::run_pending(&pool).await.expect("migrations");
        sqlx::query("UPDATE role_permission SET can_approve_discounts = 0")
            .execute(&pool)
            .await
            .expect("revoke approvals");

        let (status, Json(payload)) = health(State(HealthState { db_pool: pool.clone() })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.schema.status, "ready");
        assert_eq!(payload.approvals.status, "degraded");
        assert!(payload.approvals.detail.starts_with("no role can approve discounts"));

        pool.close().await;
    }

    #[tokio::test]
    async fn closed_pool_skips_downstream_checks() {
        let pool = pool().await;
        pool.close().await;

        let (status, Json(payload)) = health(State(HealthState { db_pool: pool })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.database.status, "degraded");
        assert_eq!(payload.schema.status, "skipped");
        assert_eq!(payload.approvals.status, "skipped");
    }
}
