//! Deterministic demo data for local development and end-to-end checks.
//!
//! The dataset covers every role, a small catalog for each service line, the
//! financing plans sales offers by default, a general contract template and
//! one priced draft proposal. Loading is idempotent.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;

use homequote_core::domain::contract::{ContractTemplate, ContractTemplateId};
use homequote_core::domain::customer::{Customer, CustomerId};
use homequote_core::domain::financing::{FinancingPlan, FinancingPlanId};
use homequote_core::domain::product::{Product, ProductId};
use homequote_core::domain::proposal::{ProductSelection, Proposal, ProposalId};
use homequote_core::domain::service::ServiceKind;
use homequote_core::domain::user::{Role, RolePermissions, User, UserId};
use homequote_core::pricing::discount::DiscountAuthority;
use homequote_core::pricing::totals::FinancingTerms;
use homequote_core::pricing::{DeterministicProposalPricer, PricingInput, ProposalPricingEngine};

use crate::connection::DbPool;
use crate::repositories::{
    ContractTemplateRepository, CustomerRepository, FinancingPlanRepository, ProductRepository,
    ProposalRepository, RepositoryError, SqlContractTemplateRepository, SqlCustomerRepository,
    SqlFinancingPlanRepository, SqlProductRepository, SqlProposalRepository, SqlUserRepository,
    UserRepository,
};

const SEED_USERS: &[(&str, &str, &str, Role)] = &[
    ("user_seed_admin", "admin@homequote.test", "Avery", Role::Administrator),
    ("user_seed_manager", "manager@homequote.test", "Morgan", Role::SalesManager),
    ("user_seed_rep", "rep@homequote.test", "Riley", Role::SalesRepresentative),
];

const SEED_CUSTOMERS: &[(&str, &str, &str, &str)] = &[
    ("C-SEED-001", "Pat", "Homeowner", "12 Elm St, Springfield"),
    ("C-SEED-002", "Jordan", "Rivera", "88 Lakeview Dr, Springfield"),
];

/// (sku, service, name, unit, unit price in cents)
const SEED_PRODUCTS: &[(&str, ServiceKind, &str, &str, i64)] = &[
    ("RF-ARCH", ServiceKind::Roofing, "Architectural shingle roof", "square", 52_500),
    ("RF-METAL", ServiceKind::Roofing, "Standing seam metal roof", "square", 115_000),
    ("HV-16", ServiceKind::Hvac, "16 SEER heat pump system", "each", 1_125_000),
    ("HV-FURN", ServiceKind::Hvac, "96% AFUE gas furnace", "each", 620_000),
    ("WD-DH", ServiceKind::WindowsDoors, "Double-hung vinyl window", "each", 85_000),
    ("WD-ENTRY", ServiceKind::WindowsDoors, "Fiberglass entry door", "each", 310_000),
    ("SD-VINYL", ServiceKind::Siding, "Insulated vinyl siding", "square", 48_000),
    ("GT-6", ServiceKind::Gutters, "6in seamless gutter", "linear_ft", 1_250),
    ("SL-PANEL", ServiceKind::Solar, "400W solar panel installed", "each", 120_000),
    ("IN-ATTIC", ServiceKind::Insulation, "Blown-in attic insulation", "sq_ft", 185),
];

/// (id, provider, plan, interest rate, term months, payment factor, merchant fee)
const SEED_PLANS: &[(&str, &str, &str, i64, u32, i64, i64)] = &[
    ("FP-SEED-60", "GreenSky", "60 months 7.99%", 799, 60, 203, 650),
    ("FP-SEED-120", "GreenSky", "120 months 9.99%", 999, 120, 132, 850),
    ("FP-SEED-SAC", "Service Finance", "12 months same as cash", 0, 12, 834, 1_200),
];

const SEED_TEMPLATE_ID: &str = "CT-SEED-GENERAL";
const SEED_PROPOSAL_ID: &str = "P-SEED-001";

const GENERAL_CONTRACT_BODY: &str = "HOME IMPROVEMENT AGREEMENT {{ proposal.proposal_id }}

Customer: {{ proposal.customer_name }}
Property: {{ proposal.customer_address }}

{% for line in proposal.lines %}- {{ line.service }}: {{ line.description }} x {{ line.quantity }} @ {{ line.unit_price }} = {{ line.total }}
{% endfor %}
Subtotal: {{ proposal.subtotal }}
Discount: {{ proposal.discount }}
Contract total: {{ proposal.total }}
{% if proposal.financing %}Financing: {{ proposal.financing.provider }} {{ proposal.financing.plan_name }}, {{ proposal.financing.term_months }} payments of {{ proposal.financing.monthly_payment }}
{% endif %}";

pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let seeded_at = seed_timestamp();

        let users = SqlUserRepository::new(pool.clone());
        for (id, email, first_name, role) in SEED_USERS {
            users
                .save(User {
                    id: UserId((*id).to_string()),
                    email: (*email).to_string(),
                    first_name: Some((*first_name).to_string()),
                    last_name: Some("Seed".to_string()),
                    role: *role,
                    active: true,
                    created_at: seeded_at,
                    updated_at: seeded_at,
                })
                .await?;
        }

        let customers = SqlCustomerRepository::new(pool.clone());
        for (id, first_name, last_name, address) in SEED_CUSTOMERS {
            customers
                .save(Customer {
                    id: CustomerId((*id).to_string()),
                    first_name: (*first_name).to_string(),
                    last_name: (*last_name).to_string(),
                    email: Some(format!("{}@example.com", first_name.to_ascii_lowercase())),
                    phone: None,
                    address: Some((*address).to_string()),
                    created_at: seeded_at,
                })
                .await?;
        }

        let products = seed_products();
        let product_count = SqlProductRepository::new(pool.clone()).save_all(products.clone()).await?;

        let plans = SqlFinancingPlanRepository::new(pool.clone());
        for plan in seed_plans(seeded_at) {
            plans.save(plan).await?;
        }

        SqlContractTemplateRepository::new(pool.clone())
            .save(ContractTemplate {
                id: ContractTemplateId(SEED_TEMPLATE_ID.to_string()),
                name: "General home improvement agreement".to_string(),
                service: None,
                body: GENERAL_CONTRACT_BODY.to_string(),
                active: true,
                created_at: seeded_at,
                updated_at: seeded_at,
            })
            .await?;

        let proposal = seed_proposal(&products, seeded_at)?;
        SqlProposalRepository::new(pool.clone()).save(proposal).await?;

        Ok(SeedResult {
            users: SEED_USERS.len(),
            customers: SEED_CUSTOMERS.len(),
            products: product_count,
            financing_plans: SEED_PLANS.len(),
            proposal_id: SEED_PROPOSAL_ID,
        })
    }

    /// Verify that seed data exists and matches the contract.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let users = SqlUserRepository::new(pool.clone());
        for (id, _, _, role) in SEED_USERS {
            let present = users
                .find_by_id(&UserId((*id).to_string()))
                .await?
                .is_some_and(|user| user.role == *role && user.active);
            checks.push((*id, present));
        }

        let customers = SqlCustomerRepository::new(pool.clone());
        for (id, ..) in SEED_CUSTOMERS {
            checks.push((*id, customers.find_by_id(&CustomerId((*id).to_string())).await?.is_some()));
        }

        let catalog = SqlProductRepository::new(pool.clone()).list(None).await?;
        let catalog_complete = SEED_PRODUCTS
            .iter()
            .all(|(sku, ..)| catalog.iter().any(|product| product.sku == *sku));
        checks.push(("catalog", catalog_complete));

        let plans = SqlFinancingPlanRepository::new(pool.clone());
        for (id, ..) in SEED_PLANS {
            checks.push((*id, plans.find_by_id(&FinancingPlanId((*id).to_string())).await?.is_some()));
        }

        let template = SqlContractTemplateRepository::new(pool.clone())
            .find_by_id(&ContractTemplateId(SEED_TEMPLATE_ID.to_string()))
            .await?;
        checks.push((SEED_TEMPLATE_ID, template.is_some()));

        let proposal = SqlProposalRepository::new(pool.clone())
            .find_by_id(&ProposalId(SEED_PROPOSAL_ID.to_string()))
            .await?;
        let proposal_priced = proposal.is_some_and(|proposal| {
            proposal.pricing.bundle_discount == Decimal::from(1_965)
                && proposal.pricing.monthly_payment.is_some()
        });
        checks.push((SEED_PROPOSAL_ID, proposal_priced));

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    /// Remove seeded rows. Role permissions are left at their current values.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM discount_request WHERE proposal_id = ?")
            .bind(SEED_PROPOSAL_ID)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM proposal WHERE id = ?")
            .bind(SEED_PROPOSAL_ID)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM contract_template WHERE id = ?")
            .bind(SEED_TEMPLATE_ID)
            .execute(&mut *tx)
            .await?;
        for (id, ..) in SEED_PLANS {
            sqlx::query("DELETE FROM financing_plan WHERE id = ?").bind(*id).execute(&mut *tx).await?;
        }
        for (sku, ..) in SEED_PRODUCTS {
            sqlx::query("DELETE FROM product WHERE sku = ?").bind(*sku).execute(&mut *tx).await?;
        }
        for (id, ..) in SEED_CUSTOMERS {
            sqlx::query("DELETE FROM customer WHERE id = ?").bind(*id).execute(&mut *tx).await?;
        }
        for (id, ..) in SEED_USERS {
            sqlx::query("DELETE FROM app_user WHERE id = ?").bind(*id).execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

fn seed_timestamp() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).single().unwrap_or_else(Utc::now)
}

fn seed_products() -> Vec<Product> {
    SEED_PRODUCTS
        .iter()
        .map(|(sku, service, name, unit, cents)| Product {
            id: ProductId(format!("prod-{}", sku.to_ascii_lowercase())),
            service: *service,
            sku: (*sku).to_string(),
            name: (*name).to_string(),
            unit: (*unit).to_string(),
            unit_price: Decimal::new(*cents, 2),
            active: true,
        })
        .collect()
}

fn seed_plans(seeded_at: DateTime<Utc>) -> Vec<FinancingPlan> {
    SEED_PLANS
        .iter()
        .map(|(id, provider, plan_name, rate, term, factor, fee)| FinancingPlan {
            id: FinancingPlanId((*id).to_string()),
            provider: (*provider).to_string(),
            plan_name: (*plan_name).to_string(),
            interest_rate: Decimal::new(*rate, 2),
            term_months: *term,
            payment_factor: Decimal::new(*factor, 4),
            merchant_fee: Decimal::new(*fee, 2),
            active: true,
            created_at: seeded_at,
            updated_at: seeded_at,
        })
        .collect()
}

fn seed_proposal(
    products: &[Product],
    seeded_at: DateTime<Utc>,
) -> Result<Proposal, RepositoryError> {
    let pick = |sku: &str, quantity: i64| -> Result<ProductSelection, RepositoryError> {
        let product = products
            .iter()
            .find(|product| product.sku == sku)
            .ok_or_else(|| RepositoryError::Decode(format!("seed product `{sku}` missing")))?;
        Ok(ProductSelection {
            product_id: product.id.clone(),
            service: product.service,
            description: product.name.clone(),
            quantity: Decimal::from(quantity),
            unit_price: product.unit_price,
        })
    };

    let mut proposal = Proposal::new_draft(
        CustomerId(SEED_CUSTOMERS[0].0.to_string()),
        UserId(SEED_USERS[2].0.to_string()),
        vec![ServiceKind::Roofing, ServiceKind::Hvac],
        vec![pick("RF-ARCH", 24)?, pick("HV-16", 1)?],
        seeded_at,
    )
    .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    proposal.id = ProposalId(SEED_PROPOSAL_ID.to_string());

    let plan = seed_plans(seeded_at)
        .into_iter()
        .next()
        .ok_or_else(|| RepositoryError::Decode("seed financing plan missing".to_string()))?;
    proposal.financing_plan_id = Some(plan.id.clone());

    let terms = FinancingTerms::from(&plan);
    let authority = DiscountAuthority::from(&RolePermissions::defaults_for(Role::SalesRepresentative));
    let outcome = DeterministicProposalPricer::default()
        .price(PricingInput {
            proposal: &proposal,
            authority: &authority,
            financing: Some(&terms),
            approved_discount: None,
            currency: "USD",
        })
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    proposal.pricing = outcome.snapshot;

    Ok(proposal)
}

#[derive(Debug)]
pub struct SeedResult {
    pub users: usize,
    pub customers: usize,
    pub products: usize,
    pub financing_plans: usize,
    pub proposal_id: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
