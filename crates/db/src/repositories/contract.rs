use homequote_core::domain::contract::{ContractTemplate, ContractTemplateId};
use homequote_core::domain::service::ServiceKind;

use super::{column, timestamp_column, ContractTemplateRepository, RepositoryError};
use crate::DbPool;

pub struct SqlContractTemplateRepository {
    pool: DbPool,
}

impl SqlContractTemplateRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_template(row: &sqlx::sqlite::SqliteRow) -> Result<ContractTemplate, RepositoryError> {
    let service: Option<String> = column(row, "service")?;
    let service = service
        .map(|raw| raw.parse::<ServiceKind>())
        .transpose()
        .map_err(|e| RepositoryError::Decode(format!("service: {e}")))?;

    Ok(ContractTemplate {
        id: ContractTemplateId(column(row, "id")?),
        name: column(row, "name")?,
        service,
        body: column(row, "body")?,
        active: column(row, "active")?,
        created_at: timestamp_column(row, "created_at")?,
        updated_at: timestamp_column(row, "updated_at")?,
    })
}

#[async_trait::async_trait]
impl ContractTemplateRepository for SqlContractTemplateRepository {
    async fn find_by_id(
        &self,
        id: &ContractTemplateId,
    ) -> Result<Option<ContractTemplate>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, service, body, active, created_at, updated_at
             FROM contract_template WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_template(r)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<ContractTemplate>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, service, body, active, created_at, updated_at
             FROM contract_template ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_template).collect::<Result<Vec<_>, _>>()
    }

    async fn save(&self, template: ContractTemplate) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO contract_template (id, name, service, body, active, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 service = excluded.service,
                 body = excluded.body,
                 active = excluded.active,
                 updated_at = excluded.updated_at",
        )
        .bind(&template.id.0)
        .bind(&template.name)
        .bind(template.service.map(|service| service.as_str()))
        .bind(&template.body)
        .bind(template.active)
        .bind(template.created_at.to_rfc3339())
        .bind(template.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: &ContractTemplateId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM contract_template WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
