use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::approval::{DiscountRequest, DiscountRequestId, DiscountRequestStatus};
use crate::domain::proposal::{Proposal, ProposalId};
use crate::domain::user::{Actor, Role, RolePermissions, UserId};
use crate::errors::DomainError;
use crate::pricing::totals::round_money;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequestInput {
    pub proposal_id: ProposalId,
    pub requested_discount: Decimal,
    pub subtotal: Decimal,
    pub requested_by: UserId,
    pub notes: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approve,
    Deny,
}

#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApprovalValidationFailure {
    #[error("discount request is already {status:?}")]
    NotPending { status: DiscountRequestStatus },
    #[error("role `{role}` cannot approve discounts")]
    CannotApprove { role: Role },
    #[error("approver role `{approver_role}` does not satisfy required role `{required_role}`")]
    InsufficientRoleAuthority { approver_role: Role, required_role: Role },
    #[error(
        "requested discount {requested_pct}% exceeds `{approver_role}` limit {max_discount_pct}%"
    )]
    DiscountLimitExceeded { approver_role: Role, requested_pct: Decimal, max_discount_pct: Decimal },
    #[error("users cannot decide their own discount requests")]
    SelfDecision,
}

impl ApprovalValidationFailure {
    /// State conflicts as opposed to permission problems.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::NotPending { .. })
    }
}

/// Role limits used to route and validate discount approvals.
#[derive(Clone, Debug)]
pub struct ApprovalPolicy {
    permissions: HashMap<Role, RolePermissions>,
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self::new(Role::ALL.iter().map(|role| RolePermissions::defaults_for(*role)).collect())
    }
}

impl ApprovalPolicy {
    /// Roles missing from `permissions` keep their defaults.
    pub fn new(permissions: Vec<RolePermissions>) -> Self {
        let mut table: HashMap<Role, RolePermissions> = Role::ALL
            .iter()
            .map(|role| (*role, RolePermissions::defaults_for(*role)))
            .collect();
        for entry in permissions {
            table.insert(entry.role, entry);
        }
        Self { permissions: table }
    }

    pub fn permissions_for(&self, role: Role) -> RolePermissions {
        self.permissions.get(&role).cloned().unwrap_or_else(|| RolePermissions::defaults_for(role))
    }

    /// Lowest-ranked approving role whose limit covers `requested_pct`.
    pub fn required_role(&self, requested_pct: Decimal) -> Role {
        let mut approvers: Vec<&RolePermissions> =
            self.permissions.values().filter(|entry| entry.can_approve_discounts).collect();
        approvers.sort_by_key(|entry| entry.role.rank());

        approvers
            .into_iter()
            .find(|entry| entry.max_discount_pct >= requested_pct)
            .map(|entry| entry.role)
            .unwrap_or(Role::Administrator)
    }

    pub fn request_approval(
        &self,
        input: ApprovalRequestInput,
        now: DateTime<Utc>,
    ) -> Result<DiscountRequest, DomainError> {
        if input.requested_discount <= Decimal::ZERO {
            return Err(DomainError::InvalidDiscount(
                "requested discount must be greater than zero".to_string(),
            ));
        }
        if input.requested_discount > input.subtotal {
            return Err(DomainError::InvalidDiscount(format!(
                "requested discount {} exceeds subtotal {}",
                input.requested_discount, input.subtotal
            )));
        }

        let requested_pct = discount_pct(input.requested_discount, input.subtotal);
        Ok(DiscountRequest {
            id: DiscountRequestId::generate(),
            proposal_id: input.proposal_id,
            requested_discount: input.requested_discount,
            requested_pct,
            requested_by: input.requested_by,
            approver_role: self.required_role(requested_pct),
            status: DiscountRequestStatus::Pending,
            notes: input.notes.filter(|notes| !notes.trim().is_empty()),
            decided_by: None,
            decision_notes: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn validate_decision(
        &self,
        request: &DiscountRequest,
        decider: &Actor,
    ) -> Result<(), ApprovalValidationFailure> {
        if !request.is_pending() {
            return Err(ApprovalValidationFailure::NotPending { status: request.status });
        }
        if &request.requested_by == decider.id() {
            return Err(ApprovalValidationFailure::SelfDecision);
        }
        if !decider.permissions.can_approve_discounts {
            return Err(ApprovalValidationFailure::CannotApprove { role: decider.role() });
        }
        if decider.role().rank() < request.approver_role.rank() {
            return Err(ApprovalValidationFailure::InsufficientRoleAuthority {
                approver_role: decider.role(),
                required_role: request.approver_role,
            });
        }
        if request.requested_pct > decider.permissions.max_discount_pct {
            return Err(ApprovalValidationFailure::DiscountLimitExceeded {
                approver_role: decider.role(),
                requested_pct: request.requested_pct,
                max_discount_pct: decider.permissions.max_discount_pct,
            });
        }
        Ok(())
    }

    pub fn decide(
        &self,
        request: &mut DiscountRequest,
        decider: &Actor,
        decision: ApprovalDecision,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), ApprovalValidationFailure> {
        self.validate_decision(request, decider)?;

        request.status = match decision {
            ApprovalDecision::Approve => DiscountRequestStatus::Approved,
            ApprovalDecision::Deny => DiscountRequestStatus::Denied,
        };
        request.decided_by = Some(decider.id().clone());
        request.decision_notes = notes.filter(|notes| !notes.trim().is_empty());
        request.updated_at = now;
        Ok(())
    }
}

pub fn discount_pct(discount: Decimal, subtotal: Decimal) -> Decimal {
    if subtotal <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    round_money(discount * Decimal::ONE_HUNDRED / subtotal)
}

/// Largest approved amount among a proposal's requests.
pub fn approved_discount(requests: &[DiscountRequest]) -> Option<Decimal> {
    requests
        .iter()
        .filter(|request| request.status == DiscountRequestStatus::Approved)
        .map(|request| request.requested_discount)
        .max()
}

/// A proposal may only be sent once its current discount needs no approval.
/// Requests for amounts the proposal no longer carries do not block it.
pub fn ensure_sendable(proposal: &Proposal, requests: &[DiscountRequest]) -> Result<(), DomainError> {
    if !proposal.pricing.requires_approval {
        return Ok(());
    }

    let waiting = proposal.pricing.pending_discount.and_then(|amount| {
        requests
            .iter()
            .find(|request| request.is_pending() && request.requested_discount == amount)
    });
    Err(DomainError::InvariantViolation(match waiting {
        Some(pending) => format!(
            "proposal `{}` has pending discount request `{}`",
            proposal.id.0, pending.id.0
        ),
        None => format!("proposal `{}` discount exceeds the approved limit", proposal.id.0),
    }))
}

/// Pending requests whose amount is not the discount the proposal is
/// currently waiting on.
pub fn superseded_requests<'a>(
    proposal: &Proposal,
    requests: &'a [DiscountRequest],
) -> impl Iterator<Item = &'a DiscountRequest> {
    let current = proposal.pricing.pending_discount;
    requests
        .iter()
        .filter(move |request| request.is_pending() && Some(request.requested_discount) != current)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{
        approved_discount, ensure_sendable, superseded_requests, ApprovalDecision,
        ApprovalPolicy, ApprovalRequestInput, ApprovalValidationFailure,
    };
    use crate::domain::approval::{DiscountRequest, DiscountRequestStatus};
    use crate::domain::customer::CustomerId;
    use crate::domain::proposal::{Proposal, ProposalId};
    use crate::domain::service::ServiceKind;
    use crate::domain::user::{Actor, Role, RolePermissions, User, UserId};

    fn actor(id: &str, role: Role) -> Actor {
        Actor {
            user: User {
                id: UserId(id.to_string()),
                email: format!("{id}@example.com"),
                first_name: None,
                last_name: None,
                role,
                active: true,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            permissions: RolePermissions::defaults_for(role),
        }
    }

    fn request(amount: i64) -> DiscountRequest {
        ApprovalPolicy::default()
            .request_approval(
                ApprovalRequestInput {
                    proposal_id: ProposalId("P-1".to_string()),
                    requested_discount: Decimal::from(amount),
                    subtotal: Decimal::from(25_000),
                    requested_by: UserId("rep".to_string()),
                    notes: Some("Neighbor referral".to_string()),
                },
                Utc::now(),
            )
            .expect("request")
    }

    #[test]
    fn routes_to_lowest_role_whose_limit_covers_request() {
        let within_manager = request(3_000);
        assert_eq!(within_manager.requested_pct, Decimal::from(12));
        assert_eq!(within_manager.approver_role, Role::SalesManager);
        assert_eq!(within_manager.status, DiscountRequestStatus::Pending);

        let beyond_manager = request(6_000);
        assert_eq!(beyond_manager.approver_role, Role::Administrator);
    }

    #[test]
    fn rejects_zero_or_oversized_requests() {
        let policy = ApprovalPolicy::default();
        let input = |amount: i64| ApprovalRequestInput {
            proposal_id: ProposalId("P-1".to_string()),
            requested_discount: Decimal::from(amount),
            subtotal: Decimal::from(1_000),
            requested_by: UserId("rep".to_string()),
            notes: None,
        };

        assert!(policy.request_approval(input(0), Utc::now()).is_err());
        assert!(policy.request_approval(input(1_001), Utc::now()).is_err());
    }

    #[test]
    fn manager_approves_within_limit() {
        let policy = ApprovalPolicy::default();
        let mut pending = request(3_000);

        policy
            .decide(
                &mut pending,
                &actor("mgr", Role::SalesManager),
                ApprovalDecision::Approve,
                Some("ok".to_string()),
                Utc::now(),
            )
            .expect("manager may approve 12%");

        assert_eq!(pending.status, DiscountRequestStatus::Approved);
        assert_eq!(pending.decided_by, Some(UserId("mgr".to_string())));
    }

    #[test]
    fn denies_unqualified_deciders() {
        let policy = ApprovalPolicy::default();

        let error = policy
            .validate_decision(&request(3_000), &actor("rep2", Role::SalesRepresentative))
            .expect_err("reps cannot approve");
        assert!(matches!(error, ApprovalValidationFailure::CannotApprove { .. }));

        let error = policy
            .validate_decision(&request(6_000), &actor("mgr", Role::SalesManager))
            .expect_err("24% needs an administrator");
        assert!(matches!(error, ApprovalValidationFailure::InsufficientRoleAuthority { .. }));

        let error = policy
            .validate_decision(&request(3_000), &actor("rep", Role::Administrator))
            .expect_err("requester cannot self-approve");
        assert_eq!(error, ApprovalValidationFailure::SelfDecision);
    }

    #[test]
    fn decided_requests_cannot_be_decided_again() {
        let policy = ApprovalPolicy::default();
        let admin = actor("admin", Role::Administrator);
        let mut decided = request(3_000);
        policy
            .decide(&mut decided, &admin, ApprovalDecision::Deny, None, Utc::now())
            .expect("deny");

        let error = policy
            .decide(&mut decided, &admin, ApprovalDecision::Approve, None, Utc::now())
            .expect_err("already denied");
        assert!(error.is_conflict());
    }

    #[test]
    fn custom_limits_change_routing() {
        let mut manager = RolePermissions::defaults_for(Role::SalesManager);
        manager.max_discount_pct = Decimal::from(30);
        let policy = ApprovalPolicy::new(vec![manager]);

        assert_eq!(policy.required_role(Decimal::from(25)), Role::SalesManager);
        assert_eq!(
            policy.permissions_for(Role::SalesRepresentative).max_discount_pct,
            Decimal::from(10)
        );
    }

    fn draft() -> Proposal {
        Proposal::new_draft(
            CustomerId("C-1".to_string()),
            UserId("rep".to_string()),
            vec![ServiceKind::Roofing],
            Vec::new(),
            Utc::now(),
        )
        .expect("draft")
    }

    #[test]
    fn sending_waits_on_the_current_discount_only() {
        let mut proposal = draft();
        proposal.pricing.requires_approval = true;
        proposal.pricing.pending_discount = Some(Decimal::from(3_000));

        let abandoned = request(3_750);
        let current = request(3_000);
        let requests = vec![abandoned.clone(), current.clone()];
        let error = ensure_sendable(&proposal, &requests).expect_err("current override waits");
        assert!(error.to_string().contains(&current.id.0));

        let superseded: Vec<_> = superseded_requests(&proposal, &requests).collect();
        assert_eq!(superseded, vec![&abandoned]);

        // Approved and repriced: the stale 15% request no longer matters.
        proposal.pricing.requires_approval = false;
        proposal.pricing.pending_discount = None;
        let mut approved = current;
        approved.status = DiscountRequestStatus::Approved;
        assert!(ensure_sendable(&proposal, &[abandoned, approved.clone()]).is_ok());
        assert_eq!(approved_discount(&[approved]), Some(Decimal::from(3_000)));
    }

    #[test]
    fn over_limit_snapshot_blocks_without_a_filed_request() {
        let mut proposal = draft();
        proposal.pricing.requires_approval = true;
        proposal.pricing.pending_discount = Some(Decimal::from(3_000));

        let error = ensure_sendable(&proposal, &[]).expect_err("still over the limit");
        assert!(error.to_string().contains("exceeds the approved limit"));
    }

    #[test]
    fn withdrawn_requests_leave_the_queue_for_good() {
        let policy = ApprovalPolicy::default();
        let mut stale = request(3_000);

        assert!(stale.withdraw(Utc::now()));
        assert_eq!(stale.status, DiscountRequestStatus::Withdrawn);
        assert!(!stale.withdraw(Utc::now()), "only pending requests are withdrawn");

        let error = policy
            .validate_decision(&stale, &actor("mgr", Role::SalesManager))
            .expect_err("withdrawn requests cannot be decided");
        assert!(error.is_conflict());
        assert_eq!(approved_discount(&[stale]), None);
    }
}
