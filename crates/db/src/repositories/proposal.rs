use sqlx::{QueryBuilder, Sqlite};

use homequote_core::domain::customer::CustomerId;
use homequote_core::domain::financing::FinancingPlanId;
use homequote_core::domain::proposal::{Proposal, ProposalId};
use homequote_core::domain::user::UserId;

use super::{
    column, json_column, parsed_column, timestamp_column, to_json, ProposalFilter,
    ProposalRepository, RepositoryError,
};
use crate::DbPool;

const PROPOSAL_COLUMNS: &str = "id, customer_id, owner_id, status, services_json, selections_json,
     discount_json, financing_plan_id, pricing_json, signature_json, created_at, updated_at";

pub struct SqlProposalRepository {
    pool: DbPool,
}

impl SqlProposalRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_proposal(row: &sqlx::sqlite::SqliteRow) -> Result<Proposal, RepositoryError> {
    let financing_plan_id: Option<String> = column(row, "financing_plan_id")?;
    let signature_json: Option<String> = column(row, "signature_json")?;
    let signature = signature_json
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(|e| RepositoryError::Decode(format!("signature_json: {e}")))?;

    Ok(Proposal {
        id: ProposalId(column(row, "id")?),
        customer_id: CustomerId(column(row, "customer_id")?),
        owner_id: UserId(column(row, "owner_id")?),
        services: json_column(row, "services_json")?,
        selections: json_column(row, "selections_json")?,
        discount: json_column(row, "discount_json")?,
        financing_plan_id: financing_plan_id.map(FinancingPlanId),
        pricing: json_column(row, "pricing_json")?,
        status: parsed_column(row, "status")?,
        signature,
        created_at: timestamp_column(row, "created_at")?,
        updated_at: timestamp_column(row, "updated_at")?,
    })
}

#[async_trait::async_trait]
impl ProposalRepository for SqlProposalRepository {
    async fn find_by_id(&self, id: &ProposalId) -> Result<Option<Proposal>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {PROPOSAL_COLUMNS} FROM proposal WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_proposal(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, proposal: Proposal) -> Result<(), RepositoryError> {
        let signature_json = proposal.signature.as_ref().map(to_json).transpose()?;

        sqlx::query(
            "INSERT INTO proposal (id, customer_id, owner_id, status, services_json, selections_json,
                                   discount_json, financing_plan_id, pricing_json, subtotal, total,
                                   signature_json, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 customer_id = excluded.customer_id,
                 owner_id = excluded.owner_id,
                 status = excluded.status,
                 services_json = excluded.services_json,
                 selections_json = excluded.selections_json,
                 discount_json = excluded.discount_json,
                 financing_plan_id = excluded.financing_plan_id,
                 pricing_json = excluded.pricing_json,
                 subtotal = excluded.subtotal,
                 total = excluded.total,
                 signature_json = excluded.signature_json,
                 updated_at = excluded.updated_at",
        )
        .bind(&proposal.id.0)
        .bind(&proposal.customer_id.0)
        .bind(&proposal.owner_id.0)
        .bind(proposal.status.as_str())
        .bind(to_json(&proposal.services)?)
        .bind(to_json(&proposal.selections)?)
        .bind(to_json(&proposal.discount)?)
        .bind(proposal.financing_plan_id.as_ref().map(|id| id.0.clone()))
        .bind(to_json(&proposal.pricing)?)
        .bind(proposal.pricing.subtotal.to_string())
        .bind(proposal.pricing.total.to_string())
        .bind(signature_json)
        .bind(proposal.created_at.to_rfc3339())
        .bind(proposal.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self, filter: &ProposalFilter) -> Result<Vec<Proposal>, RepositoryError> {
        let mut builder =
            QueryBuilder::<Sqlite>::new(format!("SELECT {PROPOSAL_COLUMNS} FROM proposal WHERE 1 = 1"));
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(owner_id) = &filter.owner_id {
            builder.push(" AND owner_id = ").push_bind(owner_id.0.clone());
        }
        builder.push(" ORDER BY created_at DESC, id DESC LIMIT ").push_bind(i64::from(filter.limit));

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_proposal).collect::<Result<Vec<_>, _>>()
    }

    async fn count_by_financing_plan(
        &self,
        plan_id: &FinancingPlanId,
    ) -> Result<u64, RepositoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM proposal WHERE financing_plan_id = ?")
                .bind(&plan_id.0)
                .fetch_one(&self.pool)
                .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}
