pub mod approvals;
pub mod audit;
pub mod config;
pub mod contracts;
pub mod dashboard;
pub mod domain;
pub mod errors;
pub mod import;
pub mod pricing;

pub use approvals::{ApprovalDecision, ApprovalPolicy, ApprovalValidationFailure};
pub use audit::{AuditCategory, AuditEvent, AuditOutcome};
pub use domain::approval::{DiscountRequest, DiscountRequestId, DiscountRequestStatus};
pub use domain::proposal::{PricingSnapshot, Proposal, ProposalId, ProposalStatus};
pub use domain::service::ServiceKind;
pub use domain::user::{Actor, Role, RolePermissions, User, UserId};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use pricing::{DeterministicProposalPricer, PricingInput, PricingOutcome, ProposalPricingEngine};
