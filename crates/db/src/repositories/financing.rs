use homequote_core::domain::financing::{FinancingPlan, FinancingPlanId};

use super::{column, decimal_column, timestamp_column, FinancingPlanRepository, RepositoryError};
use crate::DbPool;

pub struct SqlFinancingPlanRepository {
    pool: DbPool,
}

impl SqlFinancingPlanRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_plan(row: &sqlx::sqlite::SqliteRow) -> Result<FinancingPlan, RepositoryError> {
    let term_months: i64 = column(row, "term_months")?;
    let term_months = u32::try_from(term_months)
        .map_err(|_| RepositoryError::Decode(format!("term_months `{term_months}` out of range")))?;

    Ok(FinancingPlan {
        id: FinancingPlanId(column(row, "id")?),
        provider: column(row, "provider")?,
        plan_name: column(row, "plan_name")?,
        interest_rate: decimal_column(row, "interest_rate")?,
        term_months,
        payment_factor: decimal_column(row, "payment_factor")?,
        merchant_fee: decimal_column(row, "merchant_fee")?,
        active: column(row, "active")?,
        created_at: timestamp_column(row, "created_at")?,
        updated_at: timestamp_column(row, "updated_at")?,
    })
}

#[async_trait::async_trait]
impl FinancingPlanRepository for SqlFinancingPlanRepository {
    async fn find_by_id(
        &self,
        id: &FinancingPlanId,
    ) -> Result<Option<FinancingPlan>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, provider, plan_name, interest_rate, term_months, payment_factor,
                    merchant_fee, active, created_at, updated_at
             FROM financing_plan WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_plan(r)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, include_inactive: bool) -> Result<Vec<FinancingPlan>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, provider, plan_name, interest_rate, term_months, payment_factor,
                    merchant_fee, active, created_at, updated_at
             FROM financing_plan
             WHERE active = 1 OR ?
             ORDER BY provider ASC, term_months ASC",
        )
        .bind(include_inactive)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_plan).collect::<Result<Vec<_>, _>>()
    }

    async fn save(&self, plan: FinancingPlan) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO financing_plan (id, provider, plan_name, interest_rate, term_months,
                                         payment_factor, merchant_fee, active, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 provider = excluded.provider,
                 plan_name = excluded.plan_name,
                 interest_rate = excluded.interest_rate,
                 term_months = excluded.term_months,
                 payment_factor = excluded.payment_factor,
                 merchant_fee = excluded.merchant_fee,
                 active = excluded.active,
                 updated_at = excluded.updated_at",
        )
        .bind(&plan.id.0)
        .bind(&plan.provider)
        .bind(&plan.plan_name)
        .bind(plan.interest_rate.to_string())
        .bind(plan.term_months)
        .bind(plan.payment_factor.to_string())
        .bind(plan.merchant_fee.to_string())
        .bind(plan.active)
        .bind(plan.created_at.to_rfc3339())
        .bind(plan.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: &FinancingPlanId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM financing_plan WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
