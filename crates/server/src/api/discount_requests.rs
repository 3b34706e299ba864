//! Approval queue.
//!
//! - `GET  /api/discount-requests?status=&limit=`
//! - `POST /api/discount-requests/{id}/approve`
//! - `POST /api/discount-requests/{id}/deny`

use std::str::FromStr;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use homequote_core::{
    audit::{AuditCategory, AuditEvent, AuditOutcome},
    domain::{approval::DiscountRequestId, proposal::ProposalStatus},
    Actor, ApplicationError, ApprovalDecision, DiscountRequest, DiscountRequestStatus, Proposal,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{not_found, ApiError, ApiState, Caller, ForRequest};

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 200;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RequestListQuery {
    pub status: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct DecisionRequest {
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct DecisionResponse {
    pub request: DiscountRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposal: Option<Proposal>,
}

/// Approvers see the whole queue; everyone else sees what they asked for.
pub async fn list_requests(
    State(state): State<ApiState>,
    caller: Caller,
    Query(query): Query<RequestListQuery>,
) -> Result<Json<Vec<DiscountRequest>>, ApiError> {
    let cid = caller.correlation_id.as_str();
    let status = query
        .status
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
        .map(DiscountRequestStatus::from_str)
        .transpose()
        .for_request(cid)?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let mut requests = state.discount_requests.list(status, limit).await.for_request(cid)?;
    if !caller.actor.permissions.can_approve_discounts {
        requests.retain(|request| &request.requested_by == caller.actor.id());
    }
    Ok(Json(requests))
}

pub async fn approve_request(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(body): Json<DecisionRequest>,
) -> Result<Json<DecisionResponse>, ApiError> {
    decide(&state, &caller, &id, ApprovalDecision::Approve, body.notes).await.map(Json)
}

pub async fn deny_request(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(body): Json<DecisionRequest>,
) -> Result<Json<DecisionResponse>, ApiError> {
    decide(&state, &caller, &id, ApprovalDecision::Deny, body.notes).await.map(Json)
}

async fn decide(
    state: &ApiState,
    caller: &Caller,
    id: &str,
    decision: ApprovalDecision,
    notes: Option<String>,
) -> Result<DecisionResponse, ApiError> {
    let cid = caller.correlation_id.as_str();
    let mut request = state
        .discount_requests
        .find_by_id(&DiscountRequestId(id.to_string()))
        .await
        .for_request(cid)?
        .ok_or_else(|| caller.fail(not_found("discount request", id)))?;

    let policy = state.approval_policy().await.for_request(cid)?;
    if let Err(failure) = policy.decide(&mut request, &caller.actor, decision, notes, Utc::now()) {
        warn!(
            event_name = "approval.decision.refused",
            correlation_id = %cid,
            discount_request_id = %request.id.0,
            proposal_id = %request.proposal_id.0,
            decider = %caller.user_id(),
            reason = %failure,
            "discount decision refused"
        );
        state
            .record_audit(
                decision_event(caller, &request, "approval.refused", AuditOutcome::Rejected)
                    .with_metadata("reason", &failure),
            )
            .await;
        let error = if failure.is_conflict() {
            ApplicationError::Conflict(failure.to_string())
        } else {
            ApplicationError::Forbidden(failure.to_string())
        };
        return Err(caller.fail(error));
    }
    state.discount_requests.save(request.clone()).await.for_request(cid)?;

    info!(
        event_name = "approval.decision.recorded",
        correlation_id = %cid,
        discount_request_id = %request.id.0,
        proposal_id = %request.proposal_id.0,
        status = request.status.as_str(),
        decider = %caller.user_id(),
        "discount decision recorded"
    );
    let event_type = format!("approval.{}", request.status.as_str());
    state.record_audit(decision_event(caller, &request, &event_type, AuditOutcome::Success)).await;

    let proposal = if request.status == DiscountRequestStatus::Approved {
        apply_approval(state, caller, &request).await?
    } else {
        None
    };

    Ok(DecisionResponse { request, proposal })
}

/// Reprices a draft with the owner's authority so the newly approved amount
/// takes effect. Proposals that already left draft keep their snapshot.
async fn apply_approval(
    state: &ApiState,
    caller: &Caller,
    request: &DiscountRequest,
) -> Result<Option<Proposal>, ApiError> {
    let cid = caller.correlation_id.as_str();
    let Some(mut proposal) =
        state.proposals.find_by_id(&request.proposal_id).await.for_request(cid)?
    else {
        return Ok(None);
    };
    if proposal.status != ProposalStatus::Draft {
        return Ok(Some(proposal));
    }

    let owner = match state.users.find_by_id(&proposal.owner_id).await.for_request(cid)? {
        Some(user) => {
            let permissions =
                state.approval_policy().await.for_request(cid)?.permissions_for(user.role);
            Actor { user, permissions }
        }
        None => caller.actor.clone(),
    };

    state.reprice(&mut proposal, &owner).await.for_request(cid)?;
    proposal.updated_at = Utc::now();
    state.proposals.save(proposal.clone()).await.for_request(cid)?;

    info!(
        event_name = "proposal.discount.approved_applied",
        correlation_id = %cid,
        proposal_id = %proposal.id.0,
        applied_discount = %proposal.pricing.discount,
        total = %proposal.pricing.total,
        "approved discount applied to proposal"
    );
    Ok(Some(proposal))
}

fn decision_event(
    caller: &Caller,
    request: &DiscountRequest,
    event_type: &str,
    outcome: AuditOutcome,
) -> AuditEvent {
    AuditEvent::new(
        Some(request.proposal_id.clone()),
        caller.correlation_id.clone(),
        event_type,
        AuditCategory::Approval,
        caller.user_id(),
        outcome,
    )
    .with_metadata("discount_request_id", &request.id.0)
    .with_metadata("requested_discount", request.requested_discount)
}
