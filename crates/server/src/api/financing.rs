//! Financing plan catalog.
//!
//! - `GET    /api/financing/plans?include_inactive=`
//! - `POST   /api/financing/plans`
//! - `PUT    /api/financing/plans/{id}`
//! - `DELETE /api/financing/plans/{id}` deactivates plans that proposals still reference

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use homequote_core::{
    audit::{AuditCategory, AuditEvent, AuditOutcome},
    domain::financing::{FinancingPlan, FinancingPlanId},
};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;

use super::{not_found, ApiError, ApiState, Caller, Deleted, ForRequest};

#[derive(Clone, Debug, Default, Deserialize)]
pub struct PlanListQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PlanInput {
    pub provider: String,
    pub plan_name: String,
    pub interest_rate: Decimal,
    pub term_months: u32,
    pub payment_factor: Decimal,
    #[serde(default)]
    pub merchant_fee: Decimal,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

pub async fn list_plans(
    State(state): State<ApiState>,
    caller: Caller,
    Query(query): Query<PlanListQuery>,
) -> Result<Json<Vec<FinancingPlan>>, ApiError> {
    // Inactive plans are catalog maintenance data.
    let include_inactive = query.include_inactive && caller.actor.permissions.can_manage_catalog;
    let plans =
        state.financing_plans.list(include_inactive).await.for_request(&caller.correlation_id)?;
    Ok(Json(plans))
}

pub async fn create_plan(
    State(state): State<ApiState>,
    caller: Caller,
    Json(body): Json<PlanInput>,
) -> Result<(StatusCode, Json<FinancingPlan>), ApiError> {
    caller.require_catalog()?;
    let now = Utc::now();
    let plan = plan_from_input(FinancingPlanId::generate(), body, now, now);
    let plan = store_plan(&state, &caller, plan, "catalog.financing_plan.created").await?;
    Ok((StatusCode::CREATED, Json(plan)))
}

pub async fn update_plan(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(body): Json<PlanInput>,
) -> Result<Json<FinancingPlan>, ApiError> {
    caller.require_catalog()?;
    let existing = state
        .financing_plans
        .find_by_id(&FinancingPlanId(id.clone()))
        .await
        .for_request(&caller.correlation_id)?
        .ok_or_else(|| caller.fail(not_found("financing plan", &id)))?;

    let plan = plan_from_input(existing.id, body, existing.created_at, Utc::now());
    let plan = store_plan(&state, &caller, plan, "catalog.financing_plan.updated").await?;
    Ok(Json(plan))
}

pub async fn delete_plan(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Deleted>, ApiError> {
    caller.require_catalog()?;
    let cid = caller.correlation_id.as_str();
    let plan_id = FinancingPlanId(id.clone());
    let mut plan = state
        .financing_plans
        .find_by_id(&plan_id)
        .await
        .for_request(cid)?
        .ok_or_else(|| caller.fail(not_found("financing plan", &id)))?;

    let references = state.proposals.count_by_financing_plan(&plan_id).await.for_request(cid)?;
    let outcome = if references > 0 {
        plan.active = false;
        plan.updated_at = Utc::now();
        state.financing_plans.save(plan).await.for_request(cid)?;
        Deleted { id, deleted: false, deactivated: true }
    } else {
        let deleted = state.financing_plans.delete(&plan_id).await.for_request(cid)?;
        Deleted { id, deleted, deactivated: false }
    };

    info!(
        event_name = "catalog.financing_plan.removed",
        correlation_id = %cid,
        financing_plan_id = %outcome.id,
        deleted = outcome.deleted,
        deactivated = outcome.deactivated,
        references,
        "financing plan removed from catalog"
    );
    state
        .record_audit(
            catalog_event(&caller, "catalog.financing_plan.removed")
                .with_metadata("financing_plan_id", &outcome.id)
                .with_metadata("deactivated", outcome.deactivated),
        )
        .await;

    Ok(Json(outcome))
}

fn plan_from_input(
    id: FinancingPlanId,
    input: PlanInput,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
) -> FinancingPlan {
    FinancingPlan {
        id,
        provider: input.provider.trim().to_string(),
        plan_name: input.plan_name.trim().to_string(),
        interest_rate: input.interest_rate,
        term_months: input.term_months,
        payment_factor: input.payment_factor,
        merchant_fee: input.merchant_fee,
        active: input.active,
        created_at,
        updated_at,
    }
}

async fn store_plan(
    state: &ApiState,
    caller: &Caller,
    plan: FinancingPlan,
    event_type: &str,
) -> Result<FinancingPlan, ApiError> {
    let cid = caller.correlation_id.as_str();
    plan.validate().for_request(cid)?;
    state.financing_plans.save(plan.clone()).await.for_request(cid)?;

    info!(
        event_name = %event_type,
        correlation_id = %cid,
        financing_plan_id = %plan.id.0,
        term_months = plan.term_months,
        payment_factor = %plan.payment_factor,
        "financing plan stored"
    );
    state
        .record_audit(
            catalog_event(caller, event_type).with_metadata("financing_plan_id", &plan.id.0),
        )
        .await;
    Ok(plan)
}

pub(crate) fn catalog_event(caller: &Caller, event_type: &str) -> AuditEvent {
    AuditEvent::new(
        None,
        caller.correlation_id.clone(),
        event_type,
        AuditCategory::Catalog,
        caller.user_id(),
        AuditOutcome::Success,
    )
}
