pub mod bundle;
pub mod discount;
pub mod totals;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::proposal::{PricingSnapshot, Proposal, ProposalId};
use crate::errors::DomainError;

use self::{
    bundle::BundleRuleTable,
    discount::{evaluate_discount, DiscountAuthority, DiscountEvaluation, DiscountEvaluationInput},
    totals::{compute_totals, round_money, FinancingTerms},
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingTraceStep {
    pub stage: String,
    pub detail: String,
    pub amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingTrace {
    pub proposal_id: ProposalId,
    pub currency: String,
    pub steps: Vec<PricingTraceStep>,
}

#[derive(Clone, Debug)]
pub struct PricingInput<'a> {
    pub proposal: &'a Proposal,
    pub authority: &'a DiscountAuthority,
    pub financing: Option<&'a FinancingTerms>,
    pub approved_discount: Option<Decimal>,
    pub currency: &'a str,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingOutcome {
    pub snapshot: PricingSnapshot,
    pub discount: DiscountEvaluation,
    pub bundle_rule: Option<String>,
    pub trace: PricingTrace,
}

pub trait ProposalPricingEngine: Send + Sync {
    fn price(&self, input: PricingInput<'_>) -> Result<PricingOutcome, DomainError>;
}

/// Subtotal, bundle lookup, discount evaluation and financing totals in one
/// pass.
#[derive(Clone, Debug, Default)]
pub struct DeterministicProposalPricer {
    bundle_rules: BundleRuleTable,
}

impl DeterministicProposalPricer {
    pub fn new(bundle_rules: BundleRuleTable) -> Self {
        Self { bundle_rules }
    }

    pub fn bundle_rules(&self) -> &BundleRuleTable {
        &self.bundle_rules
    }
}

impl ProposalPricingEngine for DeterministicProposalPricer {
    fn price(&self, input: PricingInput<'_>) -> Result<PricingOutcome, DomainError> {
        let proposal = input.proposal;
        let subtotal = round_money(proposal.subtotal());
        proposal.discount.validate(subtotal)?;

        let bundle = self.bundle_rules.best_match(&proposal.service_set(), subtotal);
        let bundle_entitlement = bundle.as_ref().map(|found| found.amount).unwrap_or(Decimal::ZERO);

        let discount = evaluate_discount(&DiscountEvaluationInput {
            selection: proposal.discount.clone(),
            bundle_entitlement,
            authority: input.authority.clone(),
            subtotal,
            approved_discount: input.approved_discount,
        });
        let totals = compute_totals(subtotal, discount.applied_discount, input.financing);

        let mut steps = vec![
            PricingTraceStep {
                stage: "subtotal".to_string(),
                detail: "sum(unit_price * quantity)".to_string(),
                amount: subtotal,
            },
            PricingTraceStep {
                stage: "bundle".to_string(),
                detail: bundle
                    .as_ref()
                    .map(|found| format!("rule `{}`", found.rule_name))
                    .unwrap_or_else(|| "no matching bundle".to_string()),
                amount: bundle_entitlement,
            },
            PricingTraceStep {
                stage: "discount".to_string(),
                detail: if discount.requires_approval {
                    format!("override above cap {}; pending approval", discount.cap)
                } else if proposal.discount.is_manual() {
                    "manual override".to_string()
                } else {
                    "automatic bundle discount".to_string()
                },
                amount: discount.applied_discount,
            },
            PricingTraceStep {
                stage: "total".to_string(),
                detail: "subtotal - discount".to_string(),
                amount: totals.total,
            },
        ];
        if let Some(monthly_payment) = totals.monthly_payment {
            steps.push(PricingTraceStep {
                stage: "monthly_payment".to_string(),
                detail: "total * payment_factor".to_string(),
                amount: monthly_payment,
            });
        }

        Ok(PricingOutcome {
            snapshot: PricingSnapshot {
                subtotal,
                bundle_discount: bundle_entitlement,
                discount: discount.applied_discount,
                total: totals.total,
                monthly_payment: totals.monthly_payment,
                term_months: totals.term_months,
                payment_factor: input.financing.map(|terms| terms.payment_factor),
                financed_total: totals.financed_total,
                merchant_fee: totals.merchant_fee,
                requires_approval: discount.requires_approval,
                pending_discount: discount.pending_discount(),
            },
            bundle_rule: bundle.map(|found| found.rule_name),
            discount,
            trace: PricingTrace {
                proposal_id: proposal.id.clone(),
                currency: input.currency.to_string(),
                steps,
            },
        })
    }
}
