//! Administration routes.
//!
//! - `GET  /api/admin/proposals?status=&owner_id=&limit=`
//! - `GET  /api/admin/customers`, `POST /api/customers`
//! - `GET  /api/admin/dashboard`
//! - `GET  /api/admin/users`, `PUT /api/admin/users/{id}/role`
//! - `POST /api/admin/setup` first administrator, guarded by `x-setup-token`
//! - `PUT  /api/admin/setup` role permission limits
//! - `GET|POST /api/admin/contracts`, `PUT|DELETE /api/admin/contracts/{id}`

use std::str::FromStr;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use homequote_core::{
    audit::{AuditCategory, AuditEvent, AuditOutcome},
    dashboard::DashboardSummary,
    domain::{
        contract::{ContractTemplate, ContractTemplateId},
        customer::{Customer, CustomerId},
        service::ServiceKind,
        user::{Role, RolePermissions, User, UserId},
    },
    ApplicationError, DiscountRequestStatus, DomainError, Proposal, ProposalStatus,
};
use homequote_db::repositories::ProposalFilter;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{info, warn};

use super::{
    financing::catalog_event, header_value, not_found, ApiError, ApiState, Caller, Deleted,
    ForRequest, RequestMeta, SETUP_TOKEN_HEADER,
};

const DEFAULT_LIMIT: u32 = 100;
const MAX_LIMIT: u32 = 500;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProposalListQuery {
    pub status: Option<String>,
    pub owner_id: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct CustomerListQuery {
    pub limit: Option<u32>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CustomerInput {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RoleUpdateRequest {
    pub role: Role,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SetupRequest {
    pub user_id: String,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PermissionsUpdateRequest {
    pub permissions: Vec<RolePermissions>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ContractInput {
    pub name: String,
    #[serde(default)]
    pub service: Option<ServiceKind>,
    pub body: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Proposals, customers, dashboard
// ---------------------------------------------------------------------------

pub async fn list_proposals(
    State(state): State<ApiState>,
    caller: Caller,
    Query(query): Query<ProposalListQuery>,
) -> Result<Json<Vec<Proposal>>, ApiError> {
    caller.require_oversight()?;
    let cid = caller.correlation_id.as_str();
    let filter = ProposalFilter {
        status: query
            .status
            .as_deref()
            .filter(|raw| !raw.trim().is_empty())
            .map(ProposalStatus::from_str)
            .transpose()
            .for_request(cid)?,
        owner_id: query
            .owner_id
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .map(|raw| UserId(raw.to_string())),
        limit: query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
    };

    let proposals = state.proposals.list(&filter).await.for_request(cid)?;
    Ok(Json(proposals))
}

pub async fn list_customers(
    State(state): State<ApiState>,
    caller: Caller,
    Query(query): Query<CustomerListQuery>,
) -> Result<Json<Vec<Customer>>, ApiError> {
    caller.require_oversight()?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let customers = state.customers.list(limit).await.for_request(&caller.correlation_id)?;
    Ok(Json(customers))
}

pub async fn create_customer(
    State(state): State<ApiState>,
    caller: Caller,
    Json(body): Json<CustomerInput>,
) -> Result<(StatusCode, Json<Customer>), ApiError> {
    let cid = caller.correlation_id.as_str();
    let customer = Customer {
        id: CustomerId::generate(),
        first_name: body.first_name.trim().to_string(),
        last_name: body.last_name.trim().to_string(),
        email: trimmed(body.email),
        phone: trimmed(body.phone),
        address: trimmed(body.address),
        created_at: Utc::now(),
    };
    customer.validate().for_request(cid)?;
    state.customers.save(customer.clone()).await.for_request(cid)?;

    info!(
        event_name = "customer.created",
        correlation_id = %cid,
        customer_id = %customer.id.0,
        created_by = %caller.user_id(),
        "customer created"
    );
    Ok((StatusCode::CREATED, Json(customer)))
}

pub async fn dashboard(
    State(state): State<ApiState>,
    caller: Caller,
) -> Result<Json<DashboardSummary>, ApiError> {
    caller.require_oversight()?;
    let cid = caller.correlation_id.as_str();
    let proposals = state
        .proposals
        .list(&ProposalFilter { limit: u32::MAX, ..ProposalFilter::default() })
        .await
        .for_request(cid)?;
    let pending = state
        .discount_requests
        .list(Some(DiscountRequestStatus::Pending), u32::MAX)
        .await
        .for_request(cid)?;

    Ok(Json(DashboardSummary::from_proposals(&proposals, pending.len())))
}

// ---------------------------------------------------------------------------
// Users and roles
// ---------------------------------------------------------------------------

pub async fn list_users(
    State(state): State<ApiState>,
    caller: Caller,
) -> Result<Json<Vec<User>>, ApiError> {
    caller.require_user_admin()?;
    let users = state.users.list().await.for_request(&caller.correlation_id)?;
    Ok(Json(users))
}

/// The last active administrator cannot be demoted.
pub async fn update_user_role(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(body): Json<RoleUpdateRequest>,
) -> Result<Json<User>, ApiError> {
    caller.require_user_admin()?;
    let cid = caller.correlation_id.as_str();
    let mut user = state
        .users
        .find_by_id(&UserId(id.clone()))
        .await
        .for_request(cid)?
        .ok_or_else(|| caller.fail(not_found("user", &id)))?;

    if user.active && user.role == Role::Administrator && body.role != Role::Administrator {
        let admins =
            state.users.count_active_with_role(Role::Administrator).await.for_request(cid)?;
        if admins <= 1 {
            return Err(caller.fail(ApplicationError::Conflict(
                "cannot demote the last active administrator".to_string(),
            )));
        }
    }

    let previous = user.role;
    user.role = body.role;
    user.updated_at = Utc::now();
    state.users.save(user.clone()).await.for_request(cid)?;

    info!(
        event_name = "identity.user.role_changed",
        correlation_id = %cid,
        user_id = %user.id.0,
        from = %previous,
        to = %user.role,
        "user role changed"
    );
    state
        .record_audit(
            identity_event(&cid, caller.user_id(), "identity.user.role_changed")
                .with_metadata("user_id", &user.id.0)
                .with_metadata("from", previous)
                .with_metadata("to", user.role),
        )
        .await;

    Ok(Json(user))
}

/// Creates the first administrator. Needs the configured setup token and is
/// refused once any active administrator exists.
pub async fn setup_first_admin(
    State(state): State<ApiState>,
    meta: RequestMeta,
    headers: HeaderMap,
    Json(body): Json<SetupRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let cid = meta.correlation_id.as_str();
    let fail = |error: ApplicationError| ApiError::new(error, cid);

    let Some(expected) = state.setup_token.as_ref() else {
        return Err(fail(ApplicationError::Forbidden("first-run setup is disabled".to_string())));
    };
    if header_value(&headers, SETUP_TOKEN_HEADER) != Some(expected.expose_secret()) {
        warn!(
            event_name = "identity.setup.denied",
            correlation_id = %cid,
            "setup token missing or invalid"
        );
        return Err(fail(ApplicationError::Unauthorized("invalid setup token".to_string())));
    }

    let admins = state.users.count_active_with_role(Role::Administrator).await.for_request(cid)?;
    if admins > 0 {
        return Err(fail(ApplicationError::Conflict(
            "an administrator already exists".to_string(),
        )));
    }

    let user_id = body.user_id.trim();
    let email = body.email.trim();
    if user_id.is_empty() {
        return Err(fail(DomainError::Validation("user_id is required".to_string()).into()));
    }
    if !email.contains('@') {
        return Err(fail(DomainError::Validation(format!("invalid email `{email}`")).into()));
    }

    let now = Utc::now();
    let existing = state.users.find_by_id(&UserId(user_id.to_string())).await.for_request(cid)?;
    let user = User {
        id: UserId(user_id.to_string()),
        email: email.to_string(),
        first_name: trimmed(body.first_name),
        last_name: trimmed(body.last_name),
        role: Role::Administrator,
        active: true,
        created_at: existing.map(|user| user.created_at).unwrap_or(now),
        updated_at: now,
    };
    state.users.save(user.clone()).await.for_request(cid)?;

    info!(
        event_name = "identity.setup.completed",
        correlation_id = %cid,
        user_id = %user.id.0,
        "first administrator created"
    );
    state
        .record_audit(
            identity_event(cid, &user.id.0, "identity.setup.completed")
                .with_metadata("user_id", &user.id.0),
        )
        .await;

    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn update_permissions(
    State(state): State<ApiState>,
    caller: Caller,
    Json(body): Json<PermissionsUpdateRequest>,
) -> Result<Json<Vec<RolePermissions>>, ApiError> {
    caller.require(caller.actor.role() == Role::Administrator, "change role permissions")?;
    let cid = caller.correlation_id.as_str();

    for permissions in &body.permissions {
        permissions.validate().for_request(cid)?;
        if permissions.role == Role::Administrator && !permissions.can_manage_users {
            return Err(caller.fail(
                DomainError::Validation(
                    "administrators must keep the right to manage users".to_string(),
                )
                .into(),
            ));
        }
    }

    for permissions in body.permissions {
        state.role_permissions.save(permissions.clone()).await.for_request(cid)?;
        info!(
            event_name = "identity.permissions.updated",
            correlation_id = %cid,
            role = %permissions.role,
            max_discount_pct = %permissions.max_discount_pct,
            can_approve_discounts = permissions.can_approve_discounts,
            "role permissions updated"
        );
        state
            .record_audit(
                identity_event(cid, caller.user_id(), "identity.permissions.updated")
                    .with_metadata("role", permissions.role)
                    .with_metadata("max_discount_pct", permissions.max_discount_pct),
            )
            .await;
    }

    let stored = state.role_permissions.list().await.for_request(cid)?;
    Ok(Json(stored))
}

// ---------------------------------------------------------------------------
// Contract templates
// ---------------------------------------------------------------------------

pub async fn list_contracts(
    State(state): State<ApiState>,
    caller: Caller,
) -> Result<Json<Vec<ContractTemplate>>, ApiError> {
    caller.require_catalog()?;
    let templates = state.contracts.list().await.for_request(&caller.correlation_id)?;
    Ok(Json(templates))
}

pub async fn create_contract(
    State(state): State<ApiState>,
    caller: Caller,
    Json(body): Json<ContractInput>,
) -> Result<(StatusCode, Json<ContractTemplate>), ApiError> {
    caller.require_catalog()?;
    let now = Utc::now();
    let template = ContractTemplate {
        id: ContractTemplateId::generate(),
        name: body.name.trim().to_string(),
        service: body.service,
        body: body.body,
        active: body.active,
        created_at: now,
        updated_at: now,
    };
    let template = store_contract(&state, &caller, template, "catalog.contract.created").await?;
    Ok((StatusCode::CREATED, Json(template)))
}

pub async fn update_contract(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(body): Json<ContractInput>,
) -> Result<Json<ContractTemplate>, ApiError> {
    caller.require_catalog()?;
    let existing = state
        .contracts
        .find_by_id(&ContractTemplateId(id.clone()))
        .await
        .for_request(&caller.correlation_id)?
        .ok_or_else(|| caller.fail(not_found("contract template", &id)))?;

    let template = ContractTemplate {
        name: body.name.trim().to_string(),
        service: body.service,
        body: body.body,
        active: body.active,
        updated_at: Utc::now(),
        ..existing
    };
    let template = store_contract(&state, &caller, template, "catalog.contract.updated").await?;
    Ok(Json(template))
}

pub async fn delete_contract(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Deleted>, ApiError> {
    caller.require_catalog()?;
    let cid = caller.correlation_id.as_str();
    let deleted =
        state.contracts.delete(&ContractTemplateId(id.clone())).await.for_request(cid)?;
    if !deleted {
        return Err(caller.fail(not_found("contract template", &id)));
    }

    state
        .record_audit(
            catalog_event(&caller, "catalog.contract.deleted").with_metadata("template_id", &id),
        )
        .await;
    Ok(Json(Deleted { id, deleted, deactivated: false }))
}

async fn store_contract(
    state: &ApiState,
    caller: &Caller,
    template: ContractTemplate,
    event_type: &str,
) -> Result<ContractTemplate, ApiError> {
    let cid = caller.correlation_id.as_str();
    template.validate().for_request(cid)?;
    state.contracts.save(template.clone()).await.for_request(cid)?;

    info!(
        event_name = %event_type,
        correlation_id = %cid,
        template_id = %template.id.0,
        service = template.service.map(|service| service.as_str()).unwrap_or("general"),
        "contract template stored"
    );
    state
        .record_audit(catalog_event(caller, event_type).with_metadata("template_id", &template.id.0))
        .await;
    Ok(template)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn identity_event(correlation_id: &str, actor: &str, event_type: &str) -> AuditEvent {
    AuditEvent::new(
        None,
        correlation_id,
        event_type,
        AuditCategory::Identity,
        actor,
        AuditOutcome::Success,
    )
}

#[cfg(test)]
mod tests {
    use axum::{
        extract::{Path, Query, State},
        http::{HeaderMap, StatusCode},
        Json,
    };
    use homequote_core::{
        domain::user::{Role, RolePermissions},
        ProposalStatus,
    };
    use rust_decimal::Decimal;
    use secrecy::SecretString;

    use super::*;
    use crate::api::test_support::{caller, seeded_state, ADMIN, MANAGER, REP};
    use crate::api::{ApiState, RequestMeta, SETUP_TOKEN_HEADER};

    const TOKEN: &str = "first-run-token-0123456789";

    fn meta() -> RequestMeta {
        RequestMeta { correlation_id: "req-setup".to_string() }
    }

    fn setup_headers(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(SETUP_TOKEN_HEADER, token.parse().expect("header"));
        headers
    }

    fn setup_body() -> SetupRequest {
        SetupRequest {
            user_id: "user_owner".to_string(),
            email: "owner@homequote.test".to_string(),
            first_name: Some("Olive".to_string()),
            last_name: None,
        }
    }

    async fn empty_state() -> ApiState {
        let (mut state, pool) = seeded_state().await;
        sqlx::query("DELETE FROM app_user WHERE role = 'administrator'")
            .execute(&pool)
            .await
            .expect("remove seeded admin");
        state.setup_token = Some(SecretString::from(TOKEN.to_string()));
        state
    }

    #[tokio::test]
    async fn setup_creates_first_admin_once() {
        let state = empty_state().await;

        let wrong = setup_first_admin(
            State(state.clone()),
            meta(),
            setup_headers("nope"),
            Json(setup_body()),
        )
        .await
        .expect_err("wrong token");
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

        let (status, Json(admin)) = setup_first_admin(
            State(state.clone()),
            meta(),
            setup_headers(TOKEN),
            Json(setup_body()),
        )
        .await
        .expect("setup");
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(admin.role, Role::Administrator);

        let again = setup_first_admin(
            State(state.clone()),
            meta(),
            setup_headers(TOKEN),
            Json(setup_body()),
        )
        .await
        .expect_err("admin exists");
        assert_eq!(again.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn setup_is_disabled_without_configured_token() {
        let (state, _pool) = seeded_state().await;

        let refused =
            setup_first_admin(State(state), meta(), setup_headers(TOKEN), Json(setup_body()))
                .await
                .expect_err("disabled");
        assert_eq!(refused.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn admin_tunes_role_limits() {
        let (state, _pool) = seeded_state().await;
        let mut rep_limits = RolePermissions::defaults_for(Role::SalesRepresentative);
        rep_limits.max_discount_pct = Decimal::from(12);

        let refused = update_permissions(
            State(state.clone()),
            caller(&state, MANAGER).await,
            Json(PermissionsUpdateRequest { permissions: vec![rep_limits.clone()] }),
        )
        .await
        .expect_err("managers cannot change limits");
        assert_eq!(refused.status(), StatusCode::FORBIDDEN);

        let Json(stored) = update_permissions(
            State(state.clone()),
            caller(&state, ADMIN).await,
            Json(PermissionsUpdateRequest { permissions: vec![rep_limits] }),
        )
        .await
        .expect("admin updates limits");
        let rep = stored.iter().find(|entry| entry.role == Role::SalesRepresentative).expect("rep");
        assert_eq!(rep.max_discount_pct, Decimal::from(12));

        let rep_caller = caller(&state, REP).await;
        assert_eq!(rep_caller.actor.permissions.max_discount_pct, Decimal::from(12));
    }

    #[tokio::test]
    async fn last_admin_cannot_be_demoted() {
        let (state, _pool) = seeded_state().await;

        let refused = update_user_role(
            State(state.clone()),
            caller(&state, ADMIN).await,
            Path(ADMIN.to_string()),
            Json(RoleUpdateRequest { role: Role::SalesManager }),
        )
        .await
        .expect_err("last admin");
        assert_eq!(refused.status(), StatusCode::CONFLICT);

        let Json(promoted) = update_user_role(
            State(state.clone()),
            caller(&state, ADMIN).await,
            Path(REP.to_string()),
            Json(RoleUpdateRequest { role: Role::SalesManager }),
        )
        .await
        .expect("promote rep");
        assert_eq!(promoted.role, Role::SalesManager);
    }

    #[tokio::test]
    async fn dashboard_and_listing_need_oversight() {
        let (state, _pool) = seeded_state().await;

        let refused = dashboard(State(state.clone()), caller(&state, REP).await)
            .await
            .expect_err("reps have no dashboard");
        assert_eq!(refused.status(), StatusCode::FORBIDDEN);

        let Json(summary) = dashboard(State(state.clone()), caller(&state, MANAGER).await)
            .await
            .expect("dashboard");
        assert_eq!(summary.proposal_count, 1);
        assert_eq!(summary.by_status.get("draft"), Some(&1));
        assert_eq!(summary.pending_approvals, 0);

        let Json(drafts) = list_proposals(
            State(state.clone()),
            caller(&state, MANAGER).await,
            Query(ProposalListQuery {
                status: Some("draft".to_string()),
                owner_id: Some(REP.to_string()),
                limit: None,
            }),
        )
        .await
        .expect("list");
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].status, ProposalStatus::Draft);
    }

    #[tokio::test]
    async fn customers_and_contracts_round_trip() {
        let (state, _pool) = seeded_state().await;

        let (status, Json(customer)) = create_customer(
            State(state.clone()),
            caller(&state, REP).await,
            Json(CustomerInput {
                first_name: "Sam".to_string(),
                last_name: "Okafor".to_string(),
                email: Some("sam@example.com".to_string()),
                phone: Some("  ".to_string()),
                address: None,
            }),
        )
        .await
        .expect("create customer");
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(customer.phone, None);

        let Json(customers) = list_customers(
            State(state.clone()),
            caller(&state, MANAGER).await,
            Query(CustomerListQuery::default()),
        )
        .await
        .expect("list customers");
        assert!(customers.iter().any(|entry| entry.id == customer.id));

        let (_, Json(template)) = create_contract(
            State(state.clone()),
            caller(&state, MANAGER).await,
            Json(ContractInput {
                name: "Roofing agreement".to_string(),
                service: Some(ServiceKind::Roofing),
                body: "Roof work for {{ proposal.customer_name }}".to_string(),
                active: true,
            }),
        )
        .await
        .expect("create contract");

        let Json(removed) = delete_contract(
            State(state.clone()),
            caller(&state, MANAGER).await,
            Path(template.id.0.clone()),
        )
        .await
        .expect("delete contract");
        assert!(removed.deleted);

        let missing =
            delete_contract(State(state.clone()), caller(&state, MANAGER).await, Path(template.id.0))
                .await
                .expect_err("already deleted");
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
