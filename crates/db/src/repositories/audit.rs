use std::collections::BTreeMap;

use homequote_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use homequote_core::domain::proposal::ProposalId;

use super::{column, json_column, timestamp_column, to_json, AuditEventRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAuditEventRepository {
    pool: DbPool,
}

impl SqlAuditEventRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_category(raw: &str) -> AuditCategory {
    match raw {
        "proposal" => AuditCategory::Proposal,
        "pricing" => AuditCategory::Pricing,
        "approval" => AuditCategory::Approval,
        "catalog" => AuditCategory::Catalog,
        "identity" => AuditCategory::Identity,
        _ => AuditCategory::System,
    }
}

fn parse_outcome(raw: &str) -> AuditOutcome {
    match raw {
        "rejected" => AuditOutcome::Rejected,
        "failed" => AuditOutcome::Failed,
        _ => AuditOutcome::Success,
    }
}

fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<AuditEvent, RepositoryError> {
    let proposal_id: Option<String> = column(row, "proposal_id")?;
    let category: String = column(row, "event_category")?;
    let outcome: String = column(row, "outcome")?;
    let metadata: BTreeMap<String, String> = json_column(row, "payload_json")?;

    Ok(AuditEvent {
        event_id: column(row, "id")?,
        proposal_id: proposal_id.map(ProposalId),
        correlation_id: column(row, "correlation_id")?,
        event_type: column(row, "event_type")?,
        category: parse_category(&category),
        actor: column(row, "actor")?,
        outcome: parse_outcome(&outcome),
        metadata,
        occurred_at: timestamp_column(row, "timestamp")?,
    })
}

#[async_trait::async_trait]
impl AuditEventRepository for SqlAuditEventRepository {
    async fn append(&self, event: AuditEvent) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO audit_event (id, timestamp, actor, proposal_id, correlation_id, event_type,
                                      event_category, outcome, payload_json)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.event_id)
        .bind(event.occurred_at.to_rfc3339())
        .bind(&event.actor)
        .bind(event.proposal_id.as_ref().map(|id| id.0.clone()))
        .bind(&event.correlation_id)
        .bind(&event.event_type)
        .bind(event.category.as_str())
        .bind(event.outcome.as_str())
        .bind(to_json(&event.metadata)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_proposal(
        &self,
        proposal_id: &ProposalId,
    ) -> Result<Vec<AuditEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, timestamp, actor, proposal_id, correlation_id, event_type, event_category,
                    outcome, payload_json
             FROM audit_event WHERE proposal_id = ? ORDER BY timestamp ASC",
        )
        .bind(&proposal_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_event).collect::<Result<Vec<_>, _>>()
    }
}
