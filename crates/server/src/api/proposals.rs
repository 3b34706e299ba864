//! Proposal wizard and lifecycle routes.
//!
//! - `POST /api/proposals` create a priced draft
//! - `GET  /api/proposals/{id}` fetch one proposal
//! - `PUT  /api/proposals/{id}/selections` replace services and lines
//! - `PUT  /api/proposals/{id}/discount` automatic or manual discount
//! - `PUT  /api/proposals/{id}/financing` attach or clear a plan
//! - `POST /api/proposals/{id}/send|view|sign|reject|complete`
//! - `GET  /api/proposals/{id}/contract` render the contract text
//! - `POST /api/proposals/{id}/discount-requests` ask for approval explicitly

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use homequote_core::{
    approvals::{ensure_sendable, superseded_requests, ApprovalRequestInput},
    audit::{AuditCategory, AuditEvent, AuditOutcome},
    contracts::{render_contract, select_template},
    domain::{
        customer::CustomerId,
        financing::FinancingPlanId,
        product::ProductId,
        proposal::{ProductSelection, Proposal, ProposalId, ProposalStatus, Signature},
        service::ServiceKind,
    },
    pricing::{
        discount::{DiscountSelection, DiscountValue},
        PricingOutcome, PricingTrace,
    },
    ApplicationError, DiscountRequest, DomainError, Role,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{not_found, ApiError, ApiState, Caller, ForRequest};

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Deserialize)]
pub struct SelectionInput {
    pub product_id: String,
    pub quantity: Decimal,
    /// Overrides the catalog price for custom work.
    #[serde(default)]
    pub unit_price: Option<Decimal>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CreateProposalRequest {
    pub customer_id: String,
    pub services: Vec<ServiceKind>,
    #[serde(default)]
    pub selections: Vec<SelectionInput>,
    #[serde(default)]
    pub financing_plan_id: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SelectionsRequest {
    pub services: Vec<ServiceKind>,
    #[serde(default)]
    pub selections: Vec<SelectionInput>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountMode {
    Automatic,
    Manual,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DiscountUpdateRequest {
    pub mode: DiscountMode,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub percent: Option<Decimal>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl DiscountUpdateRequest {
    pub fn selection(&self) -> Result<DiscountSelection, DomainError> {
        match (self.mode, self.amount, self.percent) {
            (DiscountMode::Automatic, None, None) => Ok(DiscountSelection::Automatic),
            (DiscountMode::Automatic, _, _) => Err(DomainError::InvalidDiscount(
                "automatic mode does not take an amount or percent".to_string(),
            )),
            (DiscountMode::Manual, Some(amount), None) => {
                Ok(DiscountSelection::ManualOverride(DiscountValue::Amount(amount)))
            }
            (DiscountMode::Manual, None, Some(percent)) => {
                Ok(DiscountSelection::ManualOverride(DiscountValue::Percent(percent)))
            }
            (DiscountMode::Manual, _, _) => Err(DomainError::InvalidDiscount(
                "manual mode needs exactly one of amount or percent".to_string(),
            )),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct FinancingRequest {
    #[serde(default)]
    pub plan_id: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SignRequest {
    pub signer_name: String,
    pub signer_email: String,
    pub signature: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ApprovalAskRequest {
    pub amount: Decimal,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ProposalResponse {
    pub proposal: Proposal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_request: Option<DiscountRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pricing_trace: Option<PricingTrace>,
}

impl ProposalResponse {
    fn plain(proposal: Proposal) -> Self {
        Self { proposal, discount_request: None, pricing_trace: None }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ContractResponse {
    pub proposal_id: String,
    pub template_id: String,
    pub template_name: String,
    pub body: String,
}

// ---------------------------------------------------------------------------
// Wizard
// ---------------------------------------------------------------------------

pub async fn create_proposal(
    State(state): State<ApiState>,
    caller: Caller,
    Json(body): Json<CreateProposalRequest>,
) -> Result<(StatusCode, Json<ProposalResponse>), ApiError> {
    let cid = caller.correlation_id.as_str();
    let customer_id = CustomerId(body.customer_id.trim().to_string());
    state
        .customers
        .find_by_id(&customer_id)
        .await
        .for_request(cid)?
        .ok_or_else(|| caller.fail(not_found("customer", &customer_id.0)))?;

    let selections = build_selections(&state, &body.selections).await.for_request(cid)?;
    let mut proposal = Proposal::new_draft(
        customer_id,
        caller.actor.id().clone(),
        body.services,
        selections,
        Utc::now(),
    )
    .for_request(cid)?;

    if let Some(plan_id) = body.financing_plan_id.as_deref() {
        proposal.financing_plan_id = Some(active_plan(&state, plan_id).await.for_request(cid)?);
    }

    let outcome = state.reprice(&mut proposal, &caller.actor).await.for_request(cid)?;
    state.proposals.save(proposal.clone()).await.for_request(cid)?;

    info!(
        event_name = "proposal.created",
        correlation_id = %cid,
        proposal_id = %proposal.id.0,
        owner_id = %caller.user_id(),
        total = %proposal.pricing.total,
        "proposal draft created"
    );
    state
        .record_audit(
            proposal_event(&caller, &proposal, "proposal.created", AuditCategory::Proposal)
                .with_metadata("subtotal", proposal.pricing.subtotal)
                .with_metadata("total", proposal.pricing.total),
        )
        .await;

    Ok((
        StatusCode::CREATED,
        Json(ProposalResponse {
            proposal,
            discount_request: None,
            pricing_trace: Some(outcome.trace),
        }),
    ))
}

pub async fn get_proposal(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<ProposalResponse>, ApiError> {
    let proposal = load_proposal(&state, &caller, &id).await?;
    ensure_readable(&caller, &proposal)?;
    Ok(Json(ProposalResponse::plain(proposal)))
}

pub async fn update_selections(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(body): Json<SelectionsRequest>,
) -> Result<Json<ProposalResponse>, ApiError> {
    let cid = caller.correlation_id.as_str();
    let mut proposal = load_proposal(&state, &caller, &id).await?;
    ensure_writable(&caller, &proposal)?;
    proposal.ensure_editable().for_request(cid)?;

    let selections = build_selections(&state, &body.selections).await.for_request(cid)?;
    proposal.replace_selections(body.services, selections, Utc::now()).for_request(cid)?;
    if let Some(dropped) = proposal.release_oversized_override() {
        info!(
            event_name = "proposal.discount.override_released",
            correlation_id = %cid,
            proposal_id = %proposal.id.0,
            dropped_amount = %dropped,
            "fixed discount exceeds the new subtotal; reverted to automatic"
        );
    }
    let (outcome, discount_request) =
        reprice_and_route(&state, &caller, &mut proposal, None).await?;
    state.proposals.save(proposal.clone()).await.for_request(cid)?;

    info!(
        event_name = "proposal.selections.updated",
        correlation_id = %cid,
        proposal_id = %proposal.id.0,
        bundle_rule = outcome.bundle_rule.as_deref().unwrap_or("none"),
        total = %proposal.pricing.total,
        "proposal selections replaced"
    );
    state
        .record_audit(
            proposal_event(&caller, &proposal, "proposal.selections.updated", AuditCategory::Pricing)
                .with_metadata("services", proposal.services.len())
                .with_metadata("lines", proposal.selections.len()),
        )
        .await;

    Ok(Json(ProposalResponse {
        proposal,
        discount_request,
        pricing_trace: Some(outcome.trace),
    }))
}

/// Applies the requested discount selection. An override above the caller's
/// cap leaves the bundle entitlement applied and files a pending request for
/// the override amount; requests for earlier overrides are withdrawn.
pub async fn update_discount(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(body): Json<DiscountUpdateRequest>,
) -> Result<Json<ProposalResponse>, ApiError> {
    let cid = caller.correlation_id.as_str();
    let mut proposal = load_proposal(&state, &caller, &id).await?;
    ensure_writable(&caller, &proposal)?;
    proposal.ensure_editable().for_request(cid)?;

    proposal.discount = body.selection().for_request(cid)?;
    proposal.updated_at = Utc::now();
    let (outcome, discount_request) =
        reprice_and_route(&state, &caller, &mut proposal, body.notes.clone()).await?;
    state.proposals.save(proposal.clone()).await.for_request(cid)?;

    info!(
        event_name = "proposal.discount.updated",
        correlation_id = %cid,
        proposal_id = %proposal.id.0,
        applied_discount = %proposal.pricing.discount,
        requires_approval = proposal.pricing.requires_approval,
        "proposal discount evaluated"
    );
    state
        .record_audit(
            proposal_event(&caller, &proposal, "proposal.discount.updated", AuditCategory::Pricing)
                .with_metadata("mode", if proposal.discount.is_manual() { "manual" } else { "automatic" })
                .with_metadata("applied_discount", proposal.pricing.discount)
                .with_metadata("cap", outcome.discount.cap),
        )
        .await;

    Ok(Json(ProposalResponse {
        proposal,
        discount_request,
        pricing_trace: Some(outcome.trace),
    }))
}

pub async fn update_financing(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(body): Json<FinancingRequest>,
) -> Result<Json<ProposalResponse>, ApiError> {
    let cid = caller.correlation_id.as_str();
    let mut proposal = load_proposal(&state, &caller, &id).await?;
    ensure_writable(&caller, &proposal)?;
    proposal.ensure_editable().for_request(cid)?;

    proposal.financing_plan_id = match body.plan_id.as_deref().map(str::trim) {
        Some(plan_id) if !plan_id.is_empty() => {
            Some(active_plan(&state, plan_id).await.for_request(cid)?)
        }
        _ => None,
    };
    proposal.updated_at = Utc::now();
    let (outcome, discount_request) =
        reprice_and_route(&state, &caller, &mut proposal, None).await?;
    state.proposals.save(proposal.clone()).await.for_request(cid)?;

    info!(
        event_name = "proposal.financing.updated",
        correlation_id = %cid,
        proposal_id = %proposal.id.0,
        financing_plan_id = proposal.financing_plan_id.as_ref().map(|id| id.0.as_str()).unwrap_or("none"),
        "proposal financing updated"
    );

    Ok(Json(ProposalResponse {
        proposal,
        discount_request,
        pricing_trace: Some(outcome.trace),
    }))
}

pub async fn request_discount_approval(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(body): Json<ApprovalAskRequest>,
) -> Result<(StatusCode, Json<DiscountRequest>), ApiError> {
    let proposal = load_proposal(&state, &caller, &id).await?;
    ensure_writable(&caller, &proposal)?;
    proposal.ensure_editable().for_request(&caller.correlation_id)?;

    let request = file_discount_request(&state, &caller, &proposal, body.amount, body.notes).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Refused with `409` while an approval is outstanding or the applied
/// discount is still over the limit.
pub async fn send_proposal(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<ProposalResponse>, ApiError> {
    let cid = caller.correlation_id.as_str();
    let proposal = load_proposal(&state, &caller, &id).await?;
    ensure_writable(&caller, &proposal)?;

    let requests =
        state.discount_requests.list_for_proposal(&proposal.id).await.for_request(cid)?;
    if let Err(blocked) = ensure_sendable(&proposal, &requests) {
        state
            .record_audit(
                proposal_event(&caller, &proposal, "proposal.send.blocked", AuditCategory::Approval)
                    .with_metadata("reason", &blocked),
            )
            .await;
        return Err(caller.fail(ApplicationError::Conflict(blocked.to_string())));
    }

    let proposal = transition(&state, &caller, proposal, ProposalStatus::Sent).await?;
    Ok(Json(ProposalResponse::plain(proposal)))
}

pub async fn view_proposal(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<ProposalResponse>, ApiError> {
    let proposal = load_proposal(&state, &caller, &id).await?;
    ensure_readable(&caller, &proposal)?;
    let proposal = transition(&state, &caller, proposal, ProposalStatus::Viewed).await?;
    Ok(Json(ProposalResponse::plain(proposal)))
}

pub async fn sign_proposal(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(body): Json<SignRequest>,
) -> Result<Json<ProposalResponse>, ApiError> {
    let cid = caller.correlation_id.as_str();
    let mut proposal = load_proposal(&state, &caller, &id).await?;
    ensure_writable(&caller, &proposal)?;

    proposal
        .sign(Signature {
            signer_name: body.signer_name.trim().to_string(),
            signer_email: body.signer_email.trim().to_string(),
            signature: body.signature,
            signed_at: Utc::now(),
        })
        .for_request(cid)?;
    state.proposals.save(proposal.clone()).await.for_request(cid)?;

    info!(
        event_name = "proposal.signed",
        correlation_id = %cid,
        proposal_id = %proposal.id.0,
        total = %proposal.pricing.total,
        "proposal signed"
    );
    state
        .record_audit(
            proposal_event(&caller, &proposal, "proposal.signed", AuditCategory::Proposal)
                .with_metadata("total", proposal.pricing.total),
        )
        .await;

    Ok(Json(ProposalResponse::plain(proposal)))
}

pub async fn reject_proposal(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<ProposalResponse>, ApiError> {
    let proposal = load_proposal(&state, &caller, &id).await?;
    ensure_writable(&caller, &proposal)?;
    let proposal = transition(&state, &caller, proposal, ProposalStatus::Rejected).await?;
    Ok(Json(ProposalResponse::plain(proposal)))
}

pub async fn complete_proposal(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<ProposalResponse>, ApiError> {
    let proposal = load_proposal(&state, &caller, &id).await?;
    ensure_writable(&caller, &proposal)?;
    let proposal = transition(&state, &caller, proposal, ProposalStatus::Completed).await?;
    Ok(Json(ProposalResponse::plain(proposal)))
}

pub async fn render_proposal_contract(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<ContractResponse>, ApiError> {
    let cid = caller.correlation_id.as_str();
    let proposal = load_proposal(&state, &caller, &id).await?;
    ensure_readable(&caller, &proposal)?;

    let customer = state
        .customers
        .find_by_id(&proposal.customer_id)
        .await
        .for_request(cid)?
        .ok_or_else(|| caller.fail(not_found("customer", &proposal.customer_id.0)))?;
    let plan = match &proposal.financing_plan_id {
        Some(plan_id) => state.financing_plans.find_by_id(plan_id).await.for_request(cid)?,
        None => None,
    };

    let templates = state.contracts.list().await.for_request(cid)?;
    let template = select_template(&templates, &proposal).ok_or_else(|| {
        caller.fail(ApplicationError::NotFound(
            "no active contract template matches this proposal".to_string(),
        ))
    })?;
    let body = render_contract(template, &proposal, &customer, plan.as_ref()).for_request(cid)?;

    Ok(Json(ContractResponse {
        proposal_id: proposal.id.0,
        template_id: template.id.0.clone(),
        template_name: template.name.clone(),
        body,
    }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) async fn load_proposal(
    state: &ApiState,
    caller: &Caller,
    id: &str,
) -> Result<Proposal, ApiError> {
    state
        .proposals
        .find_by_id(&ProposalId(id.to_string()))
        .await
        .for_request(&caller.correlation_id)?
        .ok_or_else(|| caller.fail(not_found("proposal", id)))
}

/// Owners and managers may change a proposal.
fn ensure_writable(caller: &Caller, proposal: &Proposal) -> Result<(), ApiError> {
    caller.require(
        &proposal.owner_id == caller.actor.id()
            || caller.actor.role().rank() >= Role::SalesManager.rank(),
        "change another user's proposal",
    )
}

/// Support may read any proposal but not change it.
fn ensure_readable(caller: &Caller, proposal: &Proposal) -> Result<(), ApiError> {
    caller.require(
        &proposal.owner_id == caller.actor.id()
            || caller.actor.role() == Role::Support
            || caller.actor.role().rank() >= Role::SalesManager.rank(),
        "view another user's proposal",
    )
}

async fn build_selections(
    state: &ApiState,
    inputs: &[SelectionInput],
) -> Result<Vec<ProductSelection>, ApplicationError> {
    let mut selections = Vec::with_capacity(inputs.len());
    for input in inputs {
        let product = state
            .products
            .find_by_id(&ProductId(input.product_id.trim().to_string()))
            .await?
            .filter(|product| product.active)
            .ok_or_else(|| {
                DomainError::Validation(format!(
                    "product `{}` is unknown or inactive",
                    input.product_id
                ))
            })?;

        selections.push(ProductSelection {
            product_id: product.id,
            service: product.service,
            description: input
                .description
                .as_deref()
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(str::to_string)
                .unwrap_or(product.name),
            quantity: input.quantity,
            unit_price: input.unit_price.unwrap_or(product.unit_price),
        });
    }
    Ok(selections)
}

async fn active_plan(state: &ApiState, plan_id: &str) -> Result<FinancingPlanId, ApplicationError> {
    let plan_id = FinancingPlanId(plan_id.trim().to_string());
    match state.financing_plans.find_by_id(&plan_id).await? {
        Some(plan) if plan.active => Ok(plan.id),
        Some(_) => Err(DomainError::Validation(format!(
            "financing plan `{}` is no longer offered",
            plan_id.0
        ))
        .into()),
        None => Err(not_found("financing plan", &plan_id.0)),
    }
}

/// Reprices a draft with the caller's authority, then keeps the approval
/// queue in step: requests the new pricing no longer waits on are withdrawn
/// and an over-limit override gets a pending request.
async fn reprice_and_route(
    state: &ApiState,
    caller: &Caller,
    proposal: &mut Proposal,
    notes: Option<String>,
) -> Result<(PricingOutcome, Option<DiscountRequest>), ApiError> {
    let cid = caller.correlation_id.as_str();
    let outcome = state.reprice(proposal, &caller.actor).await.for_request(cid)?;
    withdraw_superseded(state, caller, proposal).await?;

    let discount_request = match outcome.discount.pending_discount() {
        Some(requested) => {
            Some(file_discount_request(state, caller, proposal, requested, notes).await?)
        }
        None => None,
    };
    Ok((outcome, discount_request))
}

async fn withdraw_superseded(
    state: &ApiState,
    caller: &Caller,
    proposal: &Proposal,
) -> Result<(), ApiError> {
    let cid = caller.correlation_id.as_str();
    let requests = state.discount_requests.list_for_proposal(&proposal.id).await.for_request(cid)?;
    let now = Utc::now();

    for stale in superseded_requests(proposal, &requests) {
        let mut stale = stale.clone();
        if !stale.withdraw(now) {
            continue;
        }
        state.discount_requests.save(stale.clone()).await.for_request(cid)?;

        info!(
            event_name = "proposal.discount.request_withdrawn",
            correlation_id = %cid,
            proposal_id = %proposal.id.0,
            discount_request_id = %stale.id.0,
            requested_discount = %stale.requested_discount,
            "superseded discount request withdrawn"
        );
        state
            .record_audit(
                proposal_event(caller, proposal, "approval.withdrawn", AuditCategory::Approval)
                    .with_metadata("discount_request_id", &stale.id.0)
                    .with_metadata("requested_discount", stale.requested_discount),
            )
            .await;
    }
    Ok(())
}

/// Records a pending request unless an identical one is already waiting.
async fn file_discount_request(
    state: &ApiState,
    caller: &Caller,
    proposal: &Proposal,
    requested_discount: Decimal,
    notes: Option<String>,
) -> Result<DiscountRequest, ApiError> {
    let cid = caller.correlation_id.as_str();
    let existing = state.discount_requests.list_for_proposal(&proposal.id).await.for_request(cid)?;
    if let Some(pending) = existing
        .into_iter()
        .find(|request| request.is_pending() && request.requested_discount == requested_discount)
    {
        return Ok(pending);
    }

    let policy = state.approval_policy().await.for_request(cid)?;
    let request = policy
        .request_approval(
            ApprovalRequestInput {
                proposal_id: proposal.id.clone(),
                requested_discount,
                subtotal: proposal.pricing.subtotal,
                requested_by: caller.actor.id().clone(),
                notes,
            },
            Utc::now(),
        )
        .for_request(cid)?;
    state.discount_requests.save(request.clone()).await.for_request(cid)?;

    info!(
        event_name = "proposal.discount.approval_requested",
        correlation_id = %cid,
        proposal_id = %proposal.id.0,
        discount_request_id = %request.id.0,
        requested_discount = %request.requested_discount,
        approver_role = %request.approver_role,
        "discount approval requested"
    );
    state
        .record_audit(
            proposal_event(
                caller,
                proposal,
                "proposal.discount.approval_requested",
                AuditCategory::Approval,
            )
            .with_metadata("discount_request_id", &request.id.0)
            .with_metadata("requested_discount", request.requested_discount)
            .with_metadata("approver_role", request.approver_role),
        )
        .await;

    Ok(request)
}

async fn transition(
    state: &ApiState,
    caller: &Caller,
    mut proposal: Proposal,
    next: ProposalStatus,
) -> Result<Proposal, ApiError> {
    let cid = caller.correlation_id.as_str();
    let from = proposal.status;
    proposal.transition_to(next, Utc::now()).for_request(cid)?;
    state.proposals.save(proposal.clone()).await.for_request(cid)?;

    let event_type = format!("proposal.{}", next.as_str());
    info!(
        event_name = %event_type,
        correlation_id = %cid,
        proposal_id = %proposal.id.0,
        from = from.as_str(),
        to = next.as_str(),
        "proposal status changed"
    );
    state
        .record_audit(
            proposal_event(caller, &proposal, &event_type, AuditCategory::Proposal)
                .with_metadata("from", from.as_str()),
        )
        .await;

    Ok(proposal)
}

fn proposal_event(
    caller: &Caller,
    proposal: &Proposal,
    event_type: &str,
    category: AuditCategory,
) -> AuditEvent {
    AuditEvent::new(
        Some(proposal.id.clone()),
        caller.correlation_id.clone(),
        event_type,
        category,
        caller.user_id(),
        AuditOutcome::Success,
    )
}

#[cfg(test)]
mod tests {
    use axum::{
        extract::{Path, State},
        http::StatusCode,
        Json,
    };
    use homequote_core::{
        domain::{proposal::ProposalStatus, service::ServiceKind, user::Role},
        DiscountRequestStatus,
    };
    use rust_decimal::Decimal;

    use super::*;
    use crate::api::discount_requests::{approve_request, DecisionRequest};
    use crate::api::test_support::{caller, seeded_state, MANAGER, REP, SEED_PROPOSAL};

    fn manual_percent(percent: i64) -> DiscountUpdateRequest {
        DiscountUpdateRequest {
            mode: DiscountMode::Manual,
            amount: None,
            percent: Some(Decimal::from(percent)),
            notes: Some("matching competitor bid".to_string()),
        }
    }

    fn manual_amount(amount: i64) -> DiscountUpdateRequest {
        DiscountUpdateRequest {
            mode: DiscountMode::Manual,
            amount: Some(Decimal::from(amount)),
            percent: None,
            notes: None,
        }
    }

    fn automatic() -> DiscountUpdateRequest {
        DiscountUpdateRequest { mode: DiscountMode::Automatic, amount: None, percent: None, notes: None }
    }

    async fn set_discount(state: &ApiState, body: DiscountUpdateRequest) -> ProposalResponse {
        let Json(response) = update_discount(
            State(state.clone()),
            caller(state, REP).await,
            Path(SEED_PROPOSAL.to_string()),
            Json(body),
        )
        .await
        .expect("discount update");
        response
    }

    async fn roofing_squares(state: &ApiState, squares: i64) -> ProposalResponse {
        let Json(response) = update_selections(
            State(state.clone()),
            caller(state, REP).await,
            Path(SEED_PROPOSAL.to_string()),
            Json(SelectionsRequest {
                services: vec![ServiceKind::Roofing],
                selections: vec![line("prod-rf-arch", squares)],
            }),
        )
        .await
        .expect("selections update");
        response
    }

    async fn stored_status(state: &ApiState, request: &DiscountRequest) -> DiscountRequestStatus {
        state
            .discount_requests
            .find_by_id(&request.id)
            .await
            .expect("lookup")
            .expect("stored request")
            .status
    }

    fn line(product_id: &str, quantity: i64) -> SelectionInput {
        SelectionInput {
            product_id: product_id.to_string(),
            quantity: Decimal::from(quantity),
            unit_price: None,
            description: None,
        }
    }

    #[tokio::test]
    async fn create_prices_draft_with_bundle_discount() {
        let (state, _pool) = seeded_state().await;
        let rep = caller(&state, REP).await;

        let (status, Json(response)) = create_proposal(
            State(state.clone()),
            rep,
            Json(CreateProposalRequest {
                customer_id: "C-SEED-002".to_string(),
                services: vec![ServiceKind::Roofing, ServiceKind::Hvac],
                selections: vec![line("prod-rf-arch", 20), line("prod-hv-16", 1)],
                financing_plan_id: None,
            }),
        )
        .await
        .expect("create proposal");

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(response.proposal.status, ProposalStatus::Draft);
        assert_eq!(response.proposal.pricing.subtotal, Decimal::from(21_750));
        assert_eq!(response.proposal.pricing.bundle_discount, Decimal::from(1_965));
        assert_eq!(response.proposal.pricing.total, Decimal::from(19_785));

        let stored = state
            .proposals
            .find_by_id(&response.proposal.id)
            .await
            .expect("lookup")
            .expect("stored proposal");
        assert_eq!(stored.pricing.total, Decimal::from(19_785));
    }

    #[tokio::test]
    async fn create_rejects_unknown_customer_and_product() {
        let (state, _pool) = seeded_state().await;

        let missing_customer = create_proposal(
            State(state.clone()),
            caller(&state, REP).await,
            Json(CreateProposalRequest {
                customer_id: "C-NOPE".to_string(),
                services: vec![ServiceKind::Roofing],
                selections: vec![line("prod-rf-arch", 10)],
                financing_plan_id: None,
            }),
        )
        .await
        .expect_err("unknown customer");
        assert_eq!(missing_customer.status(), StatusCode::NOT_FOUND);

        let missing_product = create_proposal(
            State(state.clone()),
            caller(&state, REP).await,
            Json(CreateProposalRequest {
                customer_id: "C-SEED-001".to_string(),
                services: vec![ServiceKind::Roofing],
                selections: vec![line("prod-unknown", 1)],
                financing_plan_id: None,
            }),
        )
        .await
        .expect_err("unknown product");
        assert_eq!(missing_product.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn manual_discount_within_limit_applies_directly() {
        let (state, _pool) = seeded_state().await;

        let Json(response) = update_discount(
            State(state.clone()),
            caller(&state, REP).await,
            Path(SEED_PROPOSAL.to_string()),
            Json(manual_percent(10)),
        )
        .await
        .expect("discount within limit");

        assert!(response.discount_request.is_none());
        assert!(!response.proposal.pricing.requires_approval);
        assert_eq!(response.proposal.pricing.discount, Decimal::new(238_500, 2));
        assert_eq!(response.proposal.pricing.total, Decimal::new(2_146_500, 2));
    }

    #[tokio::test]
    async fn override_above_limit_files_request_and_blocks_send() {
        let (state, _pool) = seeded_state().await;

        let Json(response) = update_discount(
            State(state.clone()),
            caller(&state, REP).await,
            Path(SEED_PROPOSAL.to_string()),
            Json(manual_percent(15)),
        )
        .await
        .expect("override above limit");

        let request = response.discount_request.expect("pending request");
        assert_eq!(request.status, DiscountRequestStatus::Pending);
        assert_eq!(request.requested_discount, Decimal::new(357_750, 2));
        assert_eq!(request.approver_role, Role::SalesManager);
        assert!(response.proposal.pricing.requires_approval);
        assert_eq!(response.proposal.pricing.discount, Decimal::from(1_965));

        // Re-submitting the same override reuses the pending request.
        let Json(again) = update_discount(
            State(state.clone()),
            caller(&state, REP).await,
            Path(SEED_PROPOSAL.to_string()),
            Json(manual_percent(15)),
        )
        .await
        .expect("same override");
        assert_eq!(again.discount_request.map(|r| r.id), Some(request.id));

        let blocked = send_proposal(
            State(state.clone()),
            caller(&state, REP).await,
            Path(SEED_PROPOSAL.to_string()),
        )
        .await
        .expect_err("send blocked");
        assert_eq!(blocked.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn discount_body_needs_exactly_one_value() {
        let both = DiscountUpdateRequest {
            mode: DiscountMode::Manual,
            amount: Some(Decimal::from(100)),
            percent: Some(Decimal::from(5)),
            notes: None,
        };
        assert!(both.selection().is_err());

        let automatic =
            DiscountUpdateRequest { mode: DiscountMode::Automatic, amount: None, percent: None, notes: None };
        assert_eq!(automatic.selection().ok(), Some(DiscountSelection::Automatic));
    }

    #[tokio::test]
    async fn financing_adds_monthly_payment() {
        let (state, _pool) = seeded_state().await;

        let Json(response) = update_financing(
            State(state.clone()),
            caller(&state, REP).await,
            Path(SEED_PROPOSAL.to_string()),
            Json(FinancingRequest { plan_id: Some("FP-SEED-60".to_string()) }),
        )
        .await
        .expect("attach plan");

        assert_eq!(response.proposal.pricing.term_months, Some(60));
        assert_eq!(response.proposal.pricing.monthly_payment, Some(Decimal::new(44_427, 2)));

        let Json(cleared) = update_financing(
            State(state.clone()),
            caller(&state, REP).await,
            Path(SEED_PROPOSAL.to_string()),
            Json(FinancingRequest { plan_id: None }),
        )
        .await
        .expect("clear plan");
        assert_eq!(cleared.proposal.pricing.monthly_payment, None);
    }

    #[tokio::test]
    async fn lifecycle_runs_from_send_to_completion() {
        let (state, _pool) = seeded_state().await;
        let path = || Path(SEED_PROPOSAL.to_string());

        let Json(sent) = send_proposal(State(state.clone()), caller(&state, REP).await, path())
            .await
            .expect("send");
        assert_eq!(sent.proposal.status, ProposalStatus::Sent);

        let locked = update_selections(
            State(state.clone()),
            caller(&state, REP).await,
            path(),
            Json(SelectionsRequest {
                services: vec![ServiceKind::Roofing],
                selections: vec![line("prod-rf-arch", 10)],
            }),
        )
        .await
        .expect_err("sent proposals are locked");
        assert_eq!(locked.status(), StatusCode::CONFLICT);

        let Json(viewed) = view_proposal(State(state.clone()), caller(&state, REP).await, path())
            .await
            .expect("view");
        assert_eq!(viewed.proposal.status, ProposalStatus::Viewed);
        let Json(signed) = sign_proposal(
            State(state.clone()),
            caller(&state, REP).await,
            path(),
            Json(SignRequest {
                signer_name: "Pat Homeowner".to_string(),
                signer_email: "pat@example.com".to_string(),
                signature: "data:image/png;base64,AAAA".to_string(),
            }),
        )
        .await
        .expect("sign");
        assert_eq!(signed.proposal.status, ProposalStatus::Signed);
        assert!(signed.proposal.signature.is_some());

        let too_late = reject_proposal(State(state.clone()), caller(&state, REP).await, path())
            .await
            .expect_err("signed proposals cannot be rejected");
        assert_eq!(too_late.status(), StatusCode::CONFLICT);

        let Json(done) =
            complete_proposal(State(state.clone()), caller(&state, MANAGER).await, path())
                .await
                .expect("complete");
        assert_eq!(done.proposal.status, ProposalStatus::Completed);
    }

    #[tokio::test]
    async fn contract_renders_general_template() {
        let (state, _pool) = seeded_state().await;

        let Json(contract) = render_proposal_contract(
            State(state.clone()),
            caller(&state, REP).await,
            Path(SEED_PROPOSAL.to_string()),
        )
        .await
        .expect("render contract");

        assert_eq!(contract.template_id, "CT-SEED-GENERAL");
        assert!(contract.body.contains("Pat Homeowner"));
        assert!(contract.body.contains("Contract total: $21,885.00"));
    }

    #[tokio::test]
    async fn explicit_request_routes_by_amount() {
        let (state, _pool) = seeded_state().await;

        let (status, Json(request)) = request_discount_approval(
            State(state.clone()),
            caller(&state, REP).await,
            Path(SEED_PROPOSAL.to_string()),
            Json(ApprovalAskRequest { amount: Decimal::from(7_155), notes: None }),
        )
        .await
        .expect("explicit request");

        assert_eq!(status, StatusCode::CREATED);
        // 30% of 23,850 is above the manager limit.
        assert_eq!(request.approver_role, Role::Administrator);
    }

    #[tokio::test]
    async fn approving_the_latest_override_unblocks_send() {
        let (state, _pool) = seeded_state().await;

        let first = set_discount(&state, manual_percent(15)).await;
        let abandoned = first.discount_request.expect("request for 15%");
        let second = set_discount(&state, manual_percent(12)).await;
        let current = second.discount_request.expect("request for 12%");
        assert_eq!(current.requested_discount, Decimal::new(286_200, 2));
        assert_eq!(stored_status(&state, &abandoned).await, DiscountRequestStatus::Withdrawn);

        let Json(decision) = approve_request(
            State(state.clone()),
            caller(&state, MANAGER).await,
            Path(current.id.0.clone()),
            Json(DecisionRequest::default()),
        )
        .await
        .expect("approve 12%");
        let repriced = decision.proposal.expect("repriced proposal");
        assert_eq!(repriced.pricing.discount, Decimal::new(286_200, 2));
        assert!(!repriced.pricing.requires_approval);

        let Json(sent) = send_proposal(
            State(state.clone()),
            caller(&state, REP).await,
            Path(SEED_PROPOSAL.to_string()),
        )
        .await
        .expect("send after approval");
        assert_eq!(sent.proposal.status, ProposalStatus::Sent);
        assert_eq!(sent.proposal.pricing.total, Decimal::new(2_098_800, 2));
    }

    #[tokio::test]
    async fn reset_to_automatic_restores_bundle_and_unblocks_send() {
        let (state, _pool) = seeded_state().await;

        let over = set_discount(&state, manual_percent(15)).await;
        let request = over.discount_request.expect("pending request");
        assert!(over.proposal.pricing.requires_approval);

        let reset = set_discount(&state, automatic()).await;
        assert!(reset.discount_request.is_none());
        assert!(!reset.proposal.pricing.requires_approval);
        assert_eq!(reset.proposal.pricing.discount, Decimal::from(1_965));
        assert_eq!(reset.proposal.pricing.discount, reset.proposal.pricing.bundle_discount);
        assert_eq!(stored_status(&state, &request).await, DiscountRequestStatus::Withdrawn);

        let withdrawn = approve_request(
            State(state.clone()),
            caller(&state, MANAGER).await,
            Path(request.id.0),
            Json(DecisionRequest::default()),
        )
        .await
        .expect_err("withdrawn requests cannot be approved");
        assert_eq!(withdrawn.status(), StatusCode::CONFLICT);

        let Json(sent) = send_proposal(
            State(state.clone()),
            caller(&state, REP).await,
            Path(SEED_PROPOSAL.to_string()),
        )
        .await
        .expect("send after reset");
        assert_eq!(sent.proposal.status, ProposalStatus::Sent);
    }

    #[tokio::test]
    async fn shrinking_selections_reroutes_a_fixed_override() {
        let (state, _pool) = seeded_state().await;

        let within = set_discount(&state, manual_amount(2_000)).await;
        assert!(within.discount_request.is_none());
        assert_eq!(within.proposal.pricing.discount, Decimal::from(2_000));

        // 2,000 of 5,250 is above the rep's 10% limit.
        let smaller = roofing_squares(&state, 10).await;
        assert_eq!(smaller.proposal.pricing.subtotal, Decimal::from(5_250));
        assert!(smaller.proposal.pricing.requires_approval);
        assert_eq!(smaller.proposal.pricing.discount, smaller.proposal.pricing.bundle_discount);
        let request = smaller.discount_request.expect("request filed on reprice");
        assert_eq!(request.requested_discount, Decimal::from(2_000));
        assert_eq!(request.approver_role, Role::Administrator);

        let blocked = send_proposal(
            State(state.clone()),
            caller(&state, REP).await,
            Path(SEED_PROPOSAL.to_string()),
        )
        .await
        .expect_err("override waits on approval");
        assert_eq!(blocked.status(), StatusCode::CONFLICT);

        // One square no longer covers the fixed amount.
        let tiny = roofing_squares(&state, 1).await;
        assert_eq!(tiny.proposal.pricing.subtotal, Decimal::from(525));
        assert_eq!(tiny.proposal.discount, DiscountSelection::Automatic);
        assert!(!tiny.proposal.pricing.requires_approval);
        assert!(tiny.discount_request.is_none());
        assert_eq!(stored_status(&state, &request).await, DiscountRequestStatus::Withdrawn);
    }

    #[tokio::test]
    async fn financing_change_keeps_a_waiting_request() {
        let (state, _pool) = seeded_state().await;
        let over = set_discount(&state, manual_percent(15)).await;
        let request = over.discount_request.expect("pending request");

        let Json(financed) = update_financing(
            State(state.clone()),
            caller(&state, REP).await,
            Path(SEED_PROPOSAL.to_string()),
            Json(FinancingRequest { plan_id: Some("FP-SEED-60".to_string()) }),
        )
        .await
        .expect("attach plan");

        assert_eq!(financed.discount_request.map(|r| r.id), Some(request.id.clone()));
        assert_eq!(stored_status(&state, &request).await, DiscountRequestStatus::Pending);
    }
}
