use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::customer::CustomerId;
use crate::domain::user::UserId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppointmentId(pub String);

impl AppointmentId {
    pub fn generate() -> Self {
        Self(format!("AP-{}", Uuid::new_v4().simple()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub customer_id: CustomerId,
    pub user_id: UserId,
    pub title: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Appointment {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.title.trim().is_empty() {
            return Err(DomainError::Validation("appointment title is required".to_string()));
        }
        if self.ends_at <= self.starts_at {
            return Err(DomainError::Validation(
                "appointment must end after it starts".to_string(),
            ));
        }
        Ok(())
    }

    /// Half-open interval overlap; back-to-back slots do not collide.
    pub fn overlaps(&self, other: &Appointment) -> bool {
        self.user_id == other.user_id
            && self.starts_at < other.ends_at
            && other.starts_at < self.ends_at
    }
}
