use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::proposal::ProposalId;
use crate::domain::user::{Role, UserId};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiscountRequestId(pub String);

impl DiscountRequestId {
    pub fn generate() -> Self {
        Self(format!("DR-{}", Uuid::new_v4().simple()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountRequestStatus {
    Pending,
    Approved,
    Denied,
    /// Replaced by a later discount change before anyone decided it.
    Withdrawn,
}

impl DiscountRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Denied => "denied",
            Self::Withdrawn => "withdrawn",
        }
    }
}

impl FromStr for DiscountRequestStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "denied" | "rejected" => Ok(Self::Denied),
            "withdrawn" | "superseded" => Ok(Self::Withdrawn),
            other => Err(DomainError::Validation(format!("unknown request status `{other}`"))),
        }
    }
}

/// A persisted ask for a higher role to authorize a discount above the
/// requester's limit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountRequest {
    pub id: DiscountRequestId,
    pub proposal_id: ProposalId,
    pub requested_discount: Decimal,
    pub requested_pct: Decimal,
    pub requested_by: UserId,
    pub approver_role: Role,
    pub status: DiscountRequestStatus,
    pub notes: Option<String>,
    pub decided_by: Option<UserId>,
    pub decision_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DiscountRequest {
    pub fn is_pending(&self) -> bool {
        self.status == DiscountRequestStatus::Pending
    }

    /// Takes a pending request out of the queue. Decided requests are left
    /// untouched and `false` is returned.
    pub fn withdraw(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.status = DiscountRequestStatus::Withdrawn;
        self.updated_at = now;
        true
    }
}
