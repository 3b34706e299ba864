use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FinancingPlanId(pub String);

impl FinancingPlanId {
    pub fn generate() -> Self {
        Self(format!("FP-{}", Uuid::new_v4().simple()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancingPlan {
    pub id: FinancingPlanId,
    pub provider: String,
    pub plan_name: String,
    /// Annual interest rate in percent.
    pub interest_rate: Decimal,
    pub term_months: u32,
    /// Multiplier from financed total to monthly payment.
    pub payment_factor: Decimal,
    /// Dealer fee in percent of the financed total.
    pub merchant_fee: Decimal,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FinancingPlan {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.provider.trim().is_empty() {
            return Err(DomainError::Validation("provider is required".to_string()));
        }
        if self.plan_name.trim().is_empty() {
            return Err(DomainError::Validation("plan_name is required".to_string()));
        }
        if self.term_months == 0 {
            return Err(DomainError::Validation(
                "term_months must be greater than zero".to_string(),
            ));
        }
        if self.payment_factor <= Decimal::ZERO {
            return Err(DomainError::Validation(
                "payment_factor must be greater than zero".to_string(),
            ));
        }
        let hundred = Decimal::from(100);
        if self.interest_rate < Decimal::ZERO || self.interest_rate > hundred {
            return Err(DomainError::Validation(
                "interest_rate must be in range 0..=100".to_string(),
            ));
        }
        if self.merchant_fee < Decimal::ZERO || self.merchant_fee > hundred {
            return Err(DomainError::Validation(
                "merchant_fee must be in range 0..=100".to_string(),
            ));
        }
        Ok(())
    }
}
