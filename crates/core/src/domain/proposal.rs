use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::customer::CustomerId;
use crate::domain::financing::FinancingPlanId;
use crate::domain::product::ProductId;
use crate::domain::service::ServiceKind;
use crate::domain::user::UserId;
use crate::errors::DomainError;
use crate::pricing::discount::{DiscountSelection, DiscountValue};
use crate::pricing::totals::round_money;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProposalId(pub String);

impl ProposalId {
    pub fn generate() -> Self {
        Self(format!("P-{}", Uuid::new_v4().simple()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Draft,
    Sent,
    Viewed,
    Signed,
    Rejected,
    Completed,
}

impl ProposalStatus {
    pub const ALL: [ProposalStatus; 6] =
        [Self::Draft, Self::Sent, Self::Viewed, Self::Signed, Self::Rejected, Self::Completed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Viewed => "viewed",
            Self::Signed => "signed",
            Self::Rejected => "rejected",
            Self::Completed => "completed",
        }
    }
}

impl FromStr for ProposalStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "sent" => Ok(Self::Sent),
            "viewed" => Ok(Self::Viewed),
            "signed" => Ok(Self::Signed),
            "rejected" => Ok(Self::Rejected),
            "completed" => Ok(Self::Completed),
            other => Err(DomainError::Validation(format!("unknown proposal status `{other}`"))),
        }
    }
}

/// A catalog product picked for one of the proposal's services, priced at
/// the moment it was selected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSelection {
    pub product_id: ProductId,
    pub service: ServiceKind,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

impl ProductSelection {
    pub fn line_total(&self) -> Decimal {
        self.quantity * self.unit_price
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingSnapshot {
    pub subtotal: Decimal,
    pub bundle_discount: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub monthly_payment: Option<Decimal>,
    pub term_months: Option<u32>,
    pub payment_factor: Option<Decimal>,
    pub financed_total: Option<Decimal>,
    pub merchant_fee: Option<Decimal>,
    pub requires_approval: bool,
    pub pending_discount: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub signer_name: String,
    pub signer_email: String,
    pub signature: String,
    pub signed_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub customer_id: CustomerId,
    pub owner_id: UserId,
    pub services: Vec<ServiceKind>,
    pub selections: Vec<ProductSelection>,
    pub discount: DiscountSelection,
    pub financing_plan_id: Option<FinancingPlanId>,
    pub pricing: PricingSnapshot,
    pub status: ProposalStatus,
    pub signature: Option<Signature>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Proposal {
    pub fn new_draft(
        customer_id: CustomerId,
        owner_id: UserId,
        services: Vec<ServiceKind>,
        selections: Vec<ProductSelection>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let services = normalize_services(services);
        validate_selections(&services, &selections)?;

        Ok(Self {
            id: ProposalId::generate(),
            customer_id,
            owner_id,
            services,
            selections,
            discount: DiscountSelection::Automatic,
            financing_plan_id: None,
            pricing: PricingSnapshot::default(),
            status: ProposalStatus::Draft,
            signature: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn subtotal(&self) -> Decimal {
        self.selections.iter().map(ProductSelection::line_total).sum()
    }

    pub fn service_set(&self) -> BTreeSet<ServiceKind> {
        self.services.iter().copied().collect()
    }

    /// Wizard steps may only touch drafts.
    pub fn ensure_editable(&self) -> Result<(), DomainError> {
        if self.status == ProposalStatus::Draft {
            return Ok(());
        }
        Err(DomainError::ProposalLocked { status: self.status })
    }

    pub fn replace_selections(
        &mut self,
        services: Vec<ServiceKind>,
        selections: Vec<ProductSelection>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.ensure_editable()?;
        let services = normalize_services(services);
        validate_selections(&services, &selections)?;
        self.services = services;
        self.selections = selections;
        self.updated_at = now;
        Ok(())
    }

    /// Falls back to the automatic discount when a fixed-amount override no
    /// longer fits under the subtotal. Returns the dropped amount.
    pub fn release_oversized_override(&mut self) -> Option<Decimal> {
        let subtotal = round_money(self.subtotal());
        match self.discount {
            DiscountSelection::ManualOverride(DiscountValue::Amount(amount)) if amount > subtotal => {
                self.discount = DiscountSelection::Automatic;
                Some(amount)
            }
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: ProposalStatus) -> bool {
        matches!(
            (self.status, next),
            (ProposalStatus::Draft, ProposalStatus::Sent)
                | (ProposalStatus::Sent, ProposalStatus::Viewed)
                | (ProposalStatus::Sent, ProposalStatus::Signed)
                | (ProposalStatus::Sent, ProposalStatus::Rejected)
                | (ProposalStatus::Viewed, ProposalStatus::Signed)
                | (ProposalStatus::Viewed, ProposalStatus::Rejected)
                | (ProposalStatus::Signed, ProposalStatus::Completed)
        )
    }

    pub fn transition_to(
        &mut self,
        next: ProposalStatus,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            self.updated_at = now;
            return Ok(());
        }

        Err(DomainError::InvalidProposalTransition { from: self.status, to: next })
    }

    pub fn sign(&mut self, signature: Signature) -> Result<(), DomainError> {
        if signature.signer_name.trim().is_empty() {
            return Err(DomainError::Validation("signer_name is required".to_string()));
        }
        if signature.signature.trim().is_empty() {
            return Err(DomainError::Validation("signature is required".to_string()));
        }
        let signed_at = signature.signed_at;
        self.transition_to(ProposalStatus::Signed, signed_at)?;
        self.signature = Some(signature);
        Ok(())
    }
}

fn normalize_services(services: Vec<ServiceKind>) -> Vec<ServiceKind> {
    let mut seen = BTreeSet::new();
    services.into_iter().filter(|service| seen.insert(*service)).collect()
}

fn validate_selections(
    services: &[ServiceKind],
    selections: &[ProductSelection],
) -> Result<(), DomainError> {
    if services.is_empty() {
        return Err(DomainError::Validation("at least one service must be selected".to_string()));
    }

    for selection in selections {
        if !services.contains(&selection.service) {
            return Err(DomainError::Validation(format!(
                "product `{}` belongs to `{}` which is not a selected service",
                selection.product_id.0, selection.service
            )));
        }
        if selection.quantity <= Decimal::ZERO {
            return Err(DomainError::Validation(format!(
                "quantity for product `{}` must be greater than zero",
                selection.product_id.0
            )));
        }
        if selection.unit_price < Decimal::ZERO {
            return Err(DomainError::Validation(format!(
                "unit price for product `{}` cannot be negative",
                selection.product_id.0
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{ProductSelection, Proposal, ProposalStatus, Signature};
    use crate::domain::customer::CustomerId;
    use crate::pricing::discount::{DiscountSelection, DiscountValue};
    use crate::domain::product::ProductId;
    use crate::domain::service::ServiceKind;
    use crate::domain::user::UserId;
    use crate::errors::DomainError;

    fn selection(service: ServiceKind, quantity: i64, unit_price: i64) -> ProductSelection {
        ProductSelection {
            product_id: ProductId(format!("prod-{service}")),
            service,
            description: service.display_name().to_string(),
            quantity: Decimal::from(quantity),
            unit_price: Decimal::from(unit_price),
        }
    }

    fn draft() -> Proposal {
        Proposal::new_draft(
            CustomerId("cust-1".to_string()),
            UserId("user_rep".to_string()),
            vec![ServiceKind::Roofing, ServiceKind::Hvac, ServiceKind::Roofing],
            vec![selection(ServiceKind::Roofing, 25, 600), selection(ServiceKind::Hvac, 1, 10_000)],
            Utc::now(),
        )
        .expect("valid draft")
    }

    #[test]
    fn new_draft_dedupes_services_and_sums_selections() {
        let proposal = draft();

        assert_eq!(proposal.services, vec![ServiceKind::Roofing, ServiceKind::Hvac]);
        assert_eq!(proposal.subtotal(), Decimal::from(25_000));
        assert_eq!(proposal.status, ProposalStatus::Draft);
    }

    #[test]
    fn rejects_selection_for_unselected_service() {
        let error = Proposal::new_draft(
            CustomerId("cust-1".to_string()),
            UserId("user_rep".to_string()),
            vec![ServiceKind::Roofing],
            vec![selection(ServiceKind::Solar, 1, 100)],
            Utc::now(),
        )
        .expect_err("solar is not selected");

        assert!(matches!(error, DomainError::Validation(_)));
    }

    #[test]
    fn rejects_empty_service_list() {
        let result = Proposal::new_draft(
            CustomerId("cust-1".to_string()),
            UserId("user_rep".to_string()),
            Vec::new(),
            Vec::new(),
            Utc::now(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn follows_send_view_sign_complete_lifecycle() {
        let mut proposal = draft();
        proposal.transition_to(ProposalStatus::Sent, Utc::now()).expect("draft->sent");
        proposal.transition_to(ProposalStatus::Viewed, Utc::now()).expect("sent->viewed");
        proposal
            .sign(Signature {
                signer_name: "Pat Homeowner".to_string(),
                signer_email: "pat@example.com".to_string(),
                signature: "Pat Homeowner".to_string(),
                signed_at: Utc::now(),
            })
            .expect("viewed->signed");
        proposal.transition_to(ProposalStatus::Completed, Utc::now()).expect("signed->completed");

        assert_eq!(proposal.status, ProposalStatus::Completed);
        assert!(proposal.signature.is_some());
    }

    #[test]
    fn blocks_invalid_lifecycle_transition() {
        let mut proposal = draft();
        let error = proposal
            .transition_to(ProposalStatus::Signed, Utc::now())
            .expect_err("draft->signed should fail");
        assert!(matches!(error, DomainError::InvalidProposalTransition { .. }));
    }

    #[test]
    fn sent_proposals_are_locked_for_edits() {
        let mut proposal = draft();
        proposal.transition_to(ProposalStatus::Sent, Utc::now()).expect("draft->sent");

        let error = proposal
            .replace_selections(vec![ServiceKind::Roofing], Vec::new(), Utc::now())
            .expect_err("sent proposals are locked");
        assert_eq!(error, DomainError::ProposalLocked { status: ProposalStatus::Sent });
    }

    #[test]
    fn shrinking_below_a_fixed_override_drops_it() {
        let mut proposal = draft();
        proposal.discount =
            DiscountSelection::ManualOverride(DiscountValue::Amount(Decimal::from(2_000)));

        proposal
            .replace_selections(
                vec![ServiceKind::Roofing],
                vec![selection(ServiceKind::Roofing, 10, 525)],
                Utc::now(),
            )
            .expect("shrink to 10 squares");
        assert_eq!(proposal.release_oversized_override(), None, "2000 still fits under 5250");

        proposal
            .replace_selections(
                vec![ServiceKind::Roofing],
                vec![selection(ServiceKind::Roofing, 1, 525)],
                Utc::now(),
            )
            .expect("shrink to one square");
        assert_eq!(proposal.release_oversized_override(), Some(Decimal::from(2_000)));
        assert_eq!(proposal.discount, DiscountSelection::Automatic);

        proposal.discount =
            DiscountSelection::ManualOverride(DiscountValue::Percent(Decimal::from(50)));
        assert_eq!(proposal.release_oversized_override(), None, "percent overrides always fit");
    }

    #[test]
    fn signing_requires_a_signature() {
        let mut proposal = draft();
        proposal.transition_to(ProposalStatus::Sent, Utc::now()).expect("draft->sent");

        let error = proposal
            .sign(Signature {
                signer_name: "Pat".to_string(),
                signer_email: "pat@example.com".to_string(),
                signature: "   ".to_string(),
                signed_at: Utc::now(),
            })
            .expect_err("blank signature");
        assert!(matches!(error, DomainError::Validation(_)));
        assert_eq!(proposal.status, ProposalStatus::Sent);
    }
}
