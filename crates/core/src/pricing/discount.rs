use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::user::{Role, RolePermissions};
use crate::errors::DomainError;
use crate::pricing::totals::{percent_of, round_money};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountValue {
    Amount(Decimal),
    Percent(Decimal),
}

impl DiscountValue {
    pub fn resolve(&self, subtotal: Decimal) -> Decimal {
        match self {
            Self::Amount(amount) => round_money(*amount),
            Self::Percent(pct) => round_money(percent_of(subtotal, *pct)),
        }
    }
}

/// Whether a proposal takes its automatic bundle discount or a value typed
/// in by the rep.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum DiscountSelection {
    #[default]
    Automatic,
    ManualOverride(DiscountValue),
}

impl DiscountSelection {
    pub fn is_manual(&self) -> bool {
        matches!(self, Self::ManualOverride(_))
    }

    /// Rejects values that are malformed regardless of who asks for them.
    pub fn validate(&self, subtotal: Decimal) -> Result<(), DomainError> {
        let Self::ManualOverride(value) = self else {
            return Ok(());
        };

        match value {
            DiscountValue::Amount(amount) => {
                if *amount < Decimal::ZERO {
                    return Err(DomainError::InvalidDiscount(
                        "discount amount cannot be negative".to_string(),
                    ));
                }
                if *amount > subtotal {
                    return Err(DomainError::InvalidDiscount(format!(
                        "discount amount {amount} exceeds subtotal {subtotal}"
                    )));
                }
            }
            DiscountValue::Percent(pct) => {
                if *pct < Decimal::ZERO || *pct > Decimal::ONE_HUNDRED {
                    return Err(DomainError::InvalidDiscount(
                        "discount percent must be in range 0..=100".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountAuthority {
    pub role: Role,
    pub max_discount_pct: Decimal,
}

impl From<&RolePermissions> for DiscountAuthority {
    fn from(permissions: &RolePermissions) -> Self {
        Self { role: permissions.role, max_discount_pct: permissions.max_discount_pct }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountEvaluationInput {
    pub selection: DiscountSelection,
    pub bundle_entitlement: Decimal,
    pub authority: DiscountAuthority,
    pub subtotal: Decimal,
    /// Largest amount already approved for this proposal, if any.
    pub approved_discount: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountEvaluation {
    pub applied_discount: Decimal,
    pub requires_approval: bool,
    pub requested_discount: Option<Decimal>,
    pub bundle_entitlement: Decimal,
    pub cap: Decimal,
}

impl DiscountEvaluation {
    pub fn pending_discount(&self) -> Option<Decimal> {
        if self.requires_approval {
            self.requested_discount
        } else {
            None
        }
    }
}

/// The most a user may grant without approval: their role limit applied to
/// the subtotal, but never less than the bundle entitlement.
pub fn discount_cap(
    authority: &DiscountAuthority,
    subtotal: Decimal,
    bundle_entitlement: Decimal,
) -> Decimal {
    round_money(percent_of(subtotal, authority.max_discount_pct)).max(bundle_entitlement)
}

pub fn evaluate_discount(input: &DiscountEvaluationInput) -> DiscountEvaluation {
    let cap = discount_cap(&input.authority, input.subtotal, input.bundle_entitlement);

    let DiscountSelection::ManualOverride(value) = &input.selection else {
        return DiscountEvaluation {
            applied_discount: input.bundle_entitlement,
            requires_approval: false,
            requested_discount: None,
            bundle_entitlement: input.bundle_entitlement,
            cap,
        };
    };

    let requested = value.resolve(input.subtotal);
    let pre_approved = input.approved_discount.is_some_and(|approved| approved >= requested);

    if requested <= cap || pre_approved {
        return DiscountEvaluation {
            applied_discount: requested,
            requires_approval: false,
            requested_discount: Some(requested),
            bundle_entitlement: input.bundle_entitlement,
            cap,
        };
    }

    // Over the cap: keep the automatic value until someone approves.
    DiscountEvaluation {
        applied_discount: input.bundle_entitlement,
        requires_approval: true,
        requested_discount: Some(requested),
        bundle_entitlement: input.bundle_entitlement,
        cap,
    }
}
