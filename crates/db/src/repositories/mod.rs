use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite};
use thiserror::Error;

use homequote_core::audit::AuditEvent;
use homequote_core::domain::appointment::Appointment;
use homequote_core::domain::approval::{DiscountRequest, DiscountRequestId, DiscountRequestStatus};
use homequote_core::domain::contract::{ContractTemplate, ContractTemplateId};
use homequote_core::domain::customer::{Customer, CustomerId};
use homequote_core::domain::financing::{FinancingPlan, FinancingPlanId};
use homequote_core::domain::product::{Product, ProductId};
use homequote_core::domain::proposal::{Proposal, ProposalId, ProposalStatus};
use homequote_core::domain::service::ServiceKind;
use homequote_core::domain::user::{Role, RolePermissions, User, UserId};
use homequote_core::errors::ApplicationError;

pub mod appointment;
pub mod audit;
pub mod contract;
pub mod customer;
pub mod discount_request;
pub mod financing;
pub mod product;
pub mod proposal;
pub mod user;

pub use appointment::SqlAppointmentRepository;
pub use audit::SqlAuditEventRepository;
pub use contract::SqlContractTemplateRepository;
pub use customer::SqlCustomerRepository;
pub use discount_request::SqlDiscountRequestRepository;
pub use financing::SqlFinancingPlanRepository;
pub use product::SqlProductRepository;
pub use proposal::SqlProposalRepository;
pub use user::{SqlRolePermissionRepository, SqlUserRepository};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        ApplicationError::Persistence(error.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProposalFilter {
    pub status: Option<ProposalStatus>,
    pub owner_id: Option<UserId>,
    pub limit: u32,
}

impl Default for ProposalFilter {
    fn default() -> Self {
        Self { status: None, owner_id: None, limit: 100 }
    }
}

impl ProposalFilter {
    pub fn matches(&self, proposal: &Proposal) -> bool {
        self.status.map_or(true, |status| proposal.status == status)
            && self.owner_id.as_ref().map_or(true, |owner| &proposal.owner_id == owner)
    }
}

#[async_trait]
pub trait ProposalRepository: Send + Sync {
    async fn find_by_id(&self, id: &ProposalId) -> Result<Option<Proposal>, RepositoryError>;
    async fn save(&self, proposal: Proposal) -> Result<(), RepositoryError>;
    /// Newest first.
    async fn list(&self, filter: &ProposalFilter) -> Result<Vec<Proposal>, RepositoryError>;
    async fn count_by_financing_plan(
        &self,
        plan_id: &FinancingPlanId,
    ) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait DiscountRequestRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: &DiscountRequestId,
    ) -> Result<Option<DiscountRequest>, RepositoryError>;
    async fn save(&self, request: DiscountRequest) -> Result<(), RepositoryError>;
    async fn list_for_proposal(
        &self,
        proposal_id: &ProposalId,
    ) -> Result<Vec<DiscountRequest>, RepositoryError>;
    /// Oldest first, so approvers work the queue in order.
    async fn list(
        &self,
        status: Option<DiscountRequestStatus>,
        limit: u32,
    ) -> Result<Vec<DiscountRequest>, RepositoryError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
    async fn save(&self, user: User) -> Result<(), RepositoryError>;
    async fn list(&self) -> Result<Vec<User>, RepositoryError>;
    async fn count_active_with_role(&self, role: Role) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait RolePermissionRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<RolePermissions>, RepositoryError>;
    async fn save(&self, permissions: RolePermissions) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait FinancingPlanRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: &FinancingPlanId,
    ) -> Result<Option<FinancingPlan>, RepositoryError>;
    async fn list(&self, include_inactive: bool) -> Result<Vec<FinancingPlan>, RepositoryError>;
    async fn save(&self, plan: FinancingPlan) -> Result<(), RepositoryError>;
    /// Returns whether a row was removed.
    async fn delete(&self, id: &FinancingPlanId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn find_by_id(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError>;
    async fn save(&self, product: Product) -> Result<(), RepositoryError>;
    async fn list(&self, service: Option<ServiceKind>) -> Result<Vec<Product>, RepositoryError>;
    /// Upserts every product by SKU; either all rows land or none do.
    async fn save_all(&self, products: Vec<Product>) -> Result<usize, RepositoryError>;
}

#[async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn find_by_id(&self, id: &CustomerId) -> Result<Option<Customer>, RepositoryError>;
    async fn save(&self, customer: Customer) -> Result<(), RepositoryError>;
    async fn list(&self, limit: u32) -> Result<Vec<Customer>, RepositoryError>;
}

#[async_trait]
pub trait ContractTemplateRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: &ContractTemplateId,
    ) -> Result<Option<ContractTemplate>, RepositoryError>;
    async fn list(&self) -> Result<Vec<ContractTemplate>, RepositoryError>;
    async fn save(&self, template: ContractTemplate) -> Result<(), RepositoryError>;
    async fn delete(&self, id: &ContractTemplateId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait AppointmentRepository: Send + Sync {
    async fn list(&self, user_id: Option<&UserId>) -> Result<Vec<Appointment>, RepositoryError>;
    async fn save(&self, appointment: Appointment) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait AuditEventRepository: Send + Sync {
    async fn append(&self, event: AuditEvent) -> Result<(), RepositoryError>;
    async fn list_for_proposal(
        &self,
        proposal_id: &ProposalId,
    ) -> Result<Vec<AuditEvent>, RepositoryError>;
}

pub(crate) fn column<T>(row: &SqliteRow, name: &str) -> Result<T, RepositoryError>
where
    T: for<'r> sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name).map_err(|e| RepositoryError::Decode(e.to_string()))
}

pub(crate) fn decimal_column(row: &SqliteRow, name: &str) -> Result<Decimal, RepositoryError> {
    let raw: String = column(row, name)?;
    Decimal::from_str(raw.trim())
        .map_err(|e| RepositoryError::Decode(format!("{name} `{raw}` is not a decimal: {e}")))
}

pub(crate) fn timestamp_column(
    row: &SqliteRow,
    name: &str,
) -> Result<DateTime<Utc>, RepositoryError> {
    let raw: String = column(row, name)?;
    parse_timestamp(name, &raw)
}

pub(crate) fn parse_timestamp(name: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("{name} `{raw}` is not RFC3339: {e}")))
}

pub(crate) fn json_column<T: DeserializeOwned>(
    row: &SqliteRow,
    name: &str,
) -> Result<T, RepositoryError> {
    let raw: String = column(row, name)?;
    serde_json::from_str(&raw).map_err(|e| RepositoryError::Decode(format!("{name}: {e}")))
}

pub(crate) fn parsed_column<T>(row: &SqliteRow, name: &str) -> Result<T, RepositoryError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw: String = column(row, name)?;
    raw.parse::<T>().map_err(|e| RepositoryError::Decode(format!("{name}: {e}")))
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|e| RepositoryError::Decode(e.to_string()))
}
