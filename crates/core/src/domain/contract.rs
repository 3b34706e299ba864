use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::service::ServiceKind;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContractTemplateId(pub String);

impl ContractTemplateId {
    pub fn generate() -> Self {
        Self(format!("CT-{}", Uuid::new_v4().simple()))
    }
}

/// Contract text rendered against a proposal. `service: None` marks the
/// general template used when no service-specific one exists.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractTemplate {
    pub id: ContractTemplateId,
    pub name: String,
    pub service: Option<ServiceKind>,
    pub body: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContractTemplate {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::Validation("contract name is required".to_string()));
        }
        if self.body.trim().is_empty() {
            return Err(DomainError::Validation("contract body is required".to_string()));
        }
        Ok(())
    }
}
