//! JSON API for proposals, approvals, catalog and administration.
//!
//! Every route except the identity webhook and first-run setup resolves the
//! acting user from the `x-user-id` header. Errors share one body shape:
//! `{ "error": "...", "correlation_id": "..." }`.

use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use homequote_core::{
    approvals::{approved_discount, ApprovalPolicy},
    audit::AuditEvent,
    config::AppConfig,
    domain::{proposal::Proposal, user::UserId},
    import::ImportRowError,
    pricing::{
        discount::DiscountAuthority, totals::FinancingTerms, DeterministicProposalPricer,
        PricingInput, PricingOutcome, ProposalPricingEngine,
    },
    Actor, ApplicationError, InterfaceError, Role,
};
use homequote_db::{
    repositories::{
        AppointmentRepository, AuditEventRepository, ContractTemplateRepository,
        CustomerRepository, DiscountRequestRepository, FinancingPlanRepository, ProductRepository,
        ProposalRepository, RolePermissionRepository, SqlAppointmentRepository,
        SqlAuditEventRepository, SqlContractTemplateRepository, SqlCustomerRepository,
        SqlDiscountRequestRepository, SqlFinancingPlanRepository, SqlProductRepository,
        SqlProposalRepository, SqlRolePermissionRepository, SqlUserRepository, UserRepository,
    },
    DbPool,
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use uuid::Uuid;

pub mod admin;
pub mod calendar;
pub mod discount_requests;
pub mod financing;
pub mod pricing;
pub mod proposals;
pub mod webhooks;

pub const USER_HEADER: &str = "x-user-id";
pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const SETUP_TOKEN_HEADER: &str = "x-setup-token";

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ApiState {
    pub proposals: Arc<dyn ProposalRepository>,
    pub discount_requests: Arc<dyn DiscountRequestRepository>,
    pub users: Arc<dyn UserRepository>,
    pub role_permissions: Arc<dyn RolePermissionRepository>,
    pub financing_plans: Arc<dyn FinancingPlanRepository>,
    pub products: Arc<dyn ProductRepository>,
    pub customers: Arc<dyn CustomerRepository>,
    pub contracts: Arc<dyn ContractTemplateRepository>,
    pub appointments: Arc<dyn AppointmentRepository>,
    pub audit: Arc<dyn AuditEventRepository>,
    pub pricer: Arc<DeterministicProposalPricer>,
    pub currency: String,
    pub setup_token: Option<SecretString>,
}

impl ApiState {
    pub fn from_pool(db_pool: DbPool, config: &AppConfig) -> Self {
        Self {
            proposals: Arc::new(SqlProposalRepository::new(db_pool.clone())),
            discount_requests: Arc::new(SqlDiscountRequestRepository::new(db_pool.clone())),
            users: Arc::new(SqlUserRepository::new(db_pool.clone())),
            role_permissions: Arc::new(SqlRolePermissionRepository::new(db_pool.clone())),
            financing_plans: Arc::new(SqlFinancingPlanRepository::new(db_pool.clone())),
            products: Arc::new(SqlProductRepository::new(db_pool.clone())),
            customers: Arc::new(SqlCustomerRepository::new(db_pool.clone())),
            contracts: Arc::new(SqlContractTemplateRepository::new(db_pool.clone())),
            appointments: Arc::new(SqlAppointmentRepository::new(db_pool.clone())),
            audit: Arc::new(SqlAuditEventRepository::new(db_pool)),
            pricer: Arc::new(DeterministicProposalPricer::new(config.pricing.bundle_table())),
            currency: config.pricing.currency.clone(),
            setup_token: config.admin.setup_token.clone(),
        }
    }

    /// Role limits as currently stored; roles without a row keep their defaults.
    pub async fn approval_policy(&self) -> Result<ApprovalPolicy, ApplicationError> {
        Ok(ApprovalPolicy::new(self.role_permissions.list().await?))
    }

    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Actor, ApplicationError> {
        let user_id = header_value(headers, USER_HEADER).ok_or_else(|| {
            ApplicationError::Unauthorized(format!("missing `{USER_HEADER}` header"))
        })?;

        let user = self
            .users
            .find_by_id(&UserId(user_id.to_string()))
            .await?
            .filter(|user| user.active)
            .ok_or_else(|| {
                ApplicationError::Unauthorized(format!("unknown or inactive user `{user_id}`"))
            })?;

        let permissions = self.approval_policy().await?.permissions_for(user.role);
        Ok(Actor { user, permissions })
    }

    /// Re-runs the pricing engine for `proposal` and stores the new snapshot
    /// on it. Discount authority comes from `actor`; approved requests on
    /// record lift the cap.
    pub async fn reprice(
        &self,
        proposal: &mut Proposal,
        actor: &Actor,
    ) -> Result<PricingOutcome, ApplicationError> {
        let plan = match &proposal.financing_plan_id {
            Some(plan_id) => self.financing_plans.find_by_id(plan_id).await?,
            None => None,
        };
        let terms = plan.as_ref().map(FinancingTerms::from);
        let requests = self.discount_requests.list_for_proposal(&proposal.id).await?;
        let authority = DiscountAuthority::from(&actor.permissions);

        let outcome = self.pricer.price(PricingInput {
            proposal: &*proposal,
            authority: &authority,
            financing: terms.as_ref(),
            approved_discount: approved_discount(&requests),
            currency: &self.currency,
        })?;

        proposal.pricing = outcome.snapshot.clone();
        Ok(outcome)
    }

    /// Audit rows are best effort; a failed write never fails the request.
    pub async fn record_audit(&self, event: AuditEvent) {
        let event_type = event.event_type.clone();
        let correlation_id = event.correlation_id.clone();
        if let Err(error) = self.audit.append(event).await {
            warn!(
                event_name = "audit.write_failed",
                correlation_id = %correlation_id,
                audit_event_type = %event_type,
                error = %error,
                "failed to persist audit event"
            );
        }
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/proposals", post(proposals::create_proposal))
        .route("/api/proposals/{id}", get(proposals::get_proposal))
        .route("/api/proposals/{id}/selections", put(proposals::update_selections))
        .route("/api/proposals/{id}/discount", put(proposals::update_discount))
        .route("/api/proposals/{id}/financing", put(proposals::update_financing))
        .route("/api/proposals/{id}/send", post(proposals::send_proposal))
        .route("/api/proposals/{id}/view", post(proposals::view_proposal))
        .route("/api/proposals/{id}/sign", post(proposals::sign_proposal))
        .route("/api/proposals/{id}/reject", post(proposals::reject_proposal))
        .route("/api/proposals/{id}/complete", post(proposals::complete_proposal))
        .route("/api/proposals/{id}/contract", get(proposals::render_proposal_contract))
        .route(
            "/api/proposals/{id}/discount-requests",
            post(proposals::request_discount_approval),
        )
        .route("/api/discount-requests", get(discount_requests::list_requests))
        .route("/api/discount-requests/{id}/approve", post(discount_requests::approve_request))
        .route("/api/discount-requests/{id}/deny", post(discount_requests::deny_request))
        .route("/api/financing/plans", get(financing::list_plans).post(financing::create_plan))
        .route(
            "/api/financing/plans/{id}",
            put(financing::update_plan).delete(financing::delete_plan),
        )
        .route("/api/pricing/import", post(pricing::import_prices))
        .route("/api/pricing/products", get(pricing::list_products))
        .route("/api/customers", post(admin::create_customer))
        .route("/api/admin/customers", get(admin::list_customers))
        .route("/api/admin/proposals", get(admin::list_proposals))
        .route("/api/admin/dashboard", get(admin::dashboard))
        .route("/api/admin/users", get(admin::list_users))
        .route("/api/admin/users/{id}/role", put(admin::update_user_role))
        .route("/api/admin/setup", post(admin::setup_first_admin).put(admin::update_permissions))
        .route("/api/admin/contracts", get(admin::list_contracts).post(admin::create_contract))
        .route(
            "/api/admin/contracts/{id}",
            put(admin::update_contract).delete(admin::delete_contract),
        )
        .route(
            "/api/calendar/appointments",
            get(calendar::list_appointments).post(calendar::create_appointment),
        )
        .route("/api/webhooks/clerk", post(webhooks::clerk_webhook))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request context
// ---------------------------------------------------------------------------

/// Correlation id for requests that do not need an authenticated user.
#[derive(Clone, Debug)]
pub struct RequestMeta {
    pub correlation_id: String,
}

impl<S: Send + Sync> FromRequestParts<S> for RequestMeta {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self { correlation_id: correlation_id(&parts.headers) })
    }
}

/// The authenticated user behind a request.
#[derive(Clone, Debug)]
pub struct Caller {
    pub actor: Actor,
    pub correlation_id: String,
}

impl FromRequestParts<ApiState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ApiState,
    ) -> Result<Self, Self::Rejection> {
        let correlation_id = correlation_id(&parts.headers);
        let actor = state.authenticate(&parts.headers).await.for_request(&correlation_id)?;
        Ok(Self { actor, correlation_id })
    }
}

impl Caller {
    pub fn user_id(&self) -> &str {
        &self.actor.id().0
    }

    pub fn require(&self, allowed: bool, action: &str) -> Result<(), ApiError> {
        if allowed {
            return Ok(());
        }
        Err(ApiError::new(
            ApplicationError::Forbidden(format!("role `{}` cannot {action}", self.actor.role())),
            &self.correlation_id,
        ))
    }

    pub fn require_catalog(&self) -> Result<(), ApiError> {
        self.require(self.actor.permissions.can_manage_catalog, "manage the catalog")
    }

    pub fn require_user_admin(&self) -> Result<(), ApiError> {
        self.require(self.actor.permissions.can_manage_users, "manage users")
    }

    /// Managers and administrators.
    pub fn require_oversight(&self) -> Result<(), ApiError> {
        self.require(self.actor.role().rank() >= Role::SalesManager.rank(), "view team data")
    }

    pub fn fail(&self, error: ApplicationError) -> ApiError {
        ApiError::new(error, &self.correlation_id)
    }
}

pub fn correlation_id(headers: &HeaderMap) -> String {
    header_value(headers, REQUEST_ID_HEADER)
        .map(str::to_string)
        .unwrap_or_else(|| format!("req-{}", Uuid::new_v4().simple()))
}

pub(crate) fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub correlation_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ImportRowError>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(error: ApplicationError, correlation_id: &str) -> Self {
        if let ApplicationError::Persistence(detail) = &error {
            error!(
                event_name = "api.persistence.failed",
                correlation_id = %correlation_id,
                error = %detail,
                "repository operation failed"
            );
        }

        let interface = error.into_interface(correlation_id);
        let status = match &interface {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        Self {
            status,
            body: ErrorBody {
                error: interface.message().to_string(),
                correlation_id: interface.correlation_id().to_string(),
                errors: Vec::new(),
            },
        }
    }

    pub fn import_rejected(errors: Vec<ImportRowError>, correlation_id: &str) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            body: ErrorBody {
                error: format!("import rejected: {} row error(s)", errors.len()),
                correlation_id: correlation_id.to_string(),
                errors,
            },
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &ErrorBody {
        &self.body
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Attaches the request's correlation id to any error that converts into an
/// [`ApplicationError`].
pub trait ForRequest<T> {
    fn for_request(self, correlation_id: &str) -> Result<T, ApiError>;
}

impl<T, E> ForRequest<T> for Result<T, E>
where
    E: Into<ApplicationError>,
{
    fn for_request(self, correlation_id: &str) -> Result<T, ApiError> {
        self.map_err(|error| ApiError::new(error.into(), correlation_id))
    }
}

pub(crate) fn not_found(kind: &str, id: &str) -> ApplicationError {
    ApplicationError::NotFound(format!("{kind} `{id}`"))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Deleted {
    pub id: String,
    pub deleted: bool,
    pub deactivated: bool,
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::http::HeaderMap;
    use homequote_core::config::AppConfig;
    use homequote_db::{connect_with_settings, migrations, DemoSeedDataset, DbPool};

    use super::{ApiState, Caller, USER_HEADER};

    pub const ADMIN: &str = "user_seed_admin";
    pub const MANAGER: &str = "user_seed_manager";
    pub const REP: &str = "user_seed_rep";
    pub const SEED_PROPOSAL: &str = "P-SEED-001";

    pub async fn seeded_state() -> (ApiState, DbPool) {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        DemoSeedDataset::load(&pool).await.expect("seed");
        (ApiState::from_pool(pool.clone(), &AppConfig::default()), pool)
    }

    pub async fn caller(state: &ApiState, user_id: &str) -> Caller {
        let actor = state.authenticate(&headers_for(user_id)).await.expect("authenticate");
        Caller { actor, correlation_id: format!("test-{user_id}") }
    }

    pub fn headers_for(user_id: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_HEADER, user_id.parse().expect("header value"));
        headers
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{HeaderMap, Request, StatusCode},
    };
    use homequote_core::ApplicationError;
    use tower::ServiceExt;

    use super::test_support::{headers_for, seeded_state, REP, SEED_PROPOSAL};
    use super::{correlation_id, router, ApiError, ErrorBody, REQUEST_ID_HEADER};

    #[tokio::test]
    async fn authenticate_rejects_missing_and_unknown_users() {
        let (state, _pool) = seeded_state().await;

        let missing = state.authenticate(&HeaderMap::new()).await;
        assert!(matches!(missing, Err(ApplicationError::Unauthorized(_))));

        let unknown = state.authenticate(&headers_for("user_nobody")).await;
        assert!(matches!(unknown, Err(ApplicationError::Unauthorized(_))));

        let rep = state.authenticate(&headers_for(REP)).await.expect("rep authenticates");
        assert_eq!(rep.permissions.max_discount_pct, rust_decimal::Decimal::from(10));
    }

    #[test]
    fn api_error_maps_application_errors_to_status_codes() {
        let cases = [
            (ApplicationError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ApplicationError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (ApplicationError::Conflict("x".into()), StatusCode::CONFLICT),
            (ApplicationError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (ApplicationError::Persistence("disk full".into()), StatusCode::SERVICE_UNAVAILABLE),
            (ApplicationError::Configuration("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (error, expected) in cases {
            let api_error = ApiError::new(error, "req-1");
            assert_eq!(api_error.status(), expected);
            assert_eq!(api_error.body().correlation_id, "req-1");
        }

        let hidden = ApiError::new(ApplicationError::Persistence("disk full".into()), "req-2");
        assert!(!hidden.body().error.contains("disk full"));
    }

    #[test]
    fn correlation_id_prefers_request_header() {
        let mut headers = HeaderMap::new();
        assert!(correlation_id(&headers).starts_with("req-"));

        headers.insert(REQUEST_ID_HEADER, "abc-123".parse().expect("header"));
        assert_eq!(correlation_id(&headers), "abc-123");
    }

    #[tokio::test]
    async fn router_requires_user_header() {
        let (state, _pool) = seeded_state().await;

        let response = router(state)
            .oneshot(
                Request::builder()
                    .uri(format!("/api/proposals/{SEED_PROPOSAL}"))
                    .header(REQUEST_ID_HEADER, "req-anon")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let body: ErrorBody = serde_json::from_slice(&bytes).expect("error body");
        assert_eq!(body.correlation_id, "req-anon");
    }

    #[tokio::test]
    async fn router_serves_seeded_proposal() {
        let (state, _pool) = seeded_state().await;

        let response = router(state)
            .oneshot(
                Request::builder()
                    .uri(format!("/api/proposals/{SEED_PROPOSAL}"))
                    .header("x-user-id", REP)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(body["proposal"]["id"], SEED_PROPOSAL);
        let total: rust_decimal::Decimal = body["proposal"]["pricing"]["total"]
            .as_str()
            .expect("decimal string")
            .parse()
            .expect("decimal");
        assert_eq!(total, rust_decimal::Decimal::from(21_885));
    }
}
