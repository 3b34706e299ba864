use homequote_core::domain::approval::{DiscountRequest, DiscountRequestId, DiscountRequestStatus};
use homequote_core::domain::proposal::ProposalId;
use homequote_core::domain::user::UserId;

use super::{
    column, decimal_column, parsed_column, timestamp_column, DiscountRequestRepository,
    RepositoryError,
};
use crate::DbPool;

pub struct SqlDiscountRequestRepository {
    pool: DbPool,
}

impl SqlDiscountRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> Result<DiscountRequest, RepositoryError> {
    let decided_by: Option<String> = column(row, "decided_by")?;

    Ok(DiscountRequest {
        id: DiscountRequestId(column(row, "id")?),
        proposal_id: ProposalId(column(row, "proposal_id")?),
        requested_discount: decimal_column(row, "requested_discount")?,
        requested_pct: decimal_column(row, "requested_pct")?,
        requested_by: UserId(column(row, "requested_by")?),
        approver_role: parsed_column(row, "approver_role")?,
        status: parsed_column(row, "status")?,
        notes: column(row, "notes")?,
        decided_by: decided_by.map(UserId),
        decision_notes: column(row, "decision_notes")?,
        created_at: timestamp_column(row, "created_at")?,
        updated_at: timestamp_column(row, "updated_at")?,
    })
}

#[async_trait::async_trait]
impl DiscountRequestRepository for SqlDiscountRequestRepository {
    async fn find_by_id(
        &self,
        id: &DiscountRequestId,
    ) -> Result<Option<DiscountRequest>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, proposal_id, requested_discount, requested_pct, requested_by, approver_role,
                    status, notes, decided_by, decision_notes, created_at, updated_at
             FROM discount_request WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_request(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, request: DiscountRequest) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO discount_request (id, proposal_id, requested_discount, requested_pct,
                                           requested_by, approver_role, status, notes, decided_by,
                                           decision_notes, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 status = excluded.status,
                 decided_by = excluded.decided_by,
                 decision_notes = excluded.decision_notes,
                 updated_at = excluded.updated_at",
        )
        .bind(&request.id.0)
        .bind(&request.proposal_id.0)
        .bind(request.requested_discount.to_string())
        .bind(request.requested_pct.to_string())
        .bind(&request.requested_by.0)
        .bind(request.approver_role.as_str())
        .bind(request.status.as_str())
        .bind(&request.notes)
        .bind(request.decided_by.as_ref().map(|id| id.0.clone()))
        .bind(&request.decision_notes)
        .bind(request.created_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_proposal(
        &self,
        proposal_id: &ProposalId,
    ) -> Result<Vec<DiscountRequest>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, proposal_id, requested_discount, requested_pct, requested_by, approver_role,
                    status, notes, decided_by, decision_notes, created_at, updated_at
             FROM discount_request WHERE proposal_id = ? ORDER BY created_at DESC",
        )
        .bind(&proposal_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_request).collect::<Result<Vec<_>, _>>()
    }

    async fn list(
        &self,
        status: Option<DiscountRequestStatus>,
        limit: u32,
    ) -> Result<Vec<DiscountRequest>, RepositoryError> {
        let rows = if let Some(status) = status {
            sqlx::query(
                "SELECT id, proposal_id, requested_discount, requested_pct, requested_by,
                        approver_role, status, notes, decided_by, decision_notes, created_at,
                        updated_at
                 FROM discount_request
                 WHERE status = ?
                 ORDER BY created_at ASC
                 LIMIT ?",
            )
            .bind(status.as_str())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(
                "SELECT id, proposal_id, requested_discount, requested_pct, requested_by,
                        approver_role, status, notes, decided_by, decision_notes, created_at,
                        updated_at
                 FROM discount_request
                 ORDER BY created_at ASC
                 LIMIT ?",
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        };

        rows.iter().map(row_to_request).collect::<Result<Vec<_>, _>>()
    }
}
