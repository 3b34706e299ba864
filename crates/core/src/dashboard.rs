use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::proposal::{Proposal, ProposalStatus};
use crate::pricing::totals::round_money;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub proposal_count: usize,
    pub by_status: BTreeMap<String, usize>,
    /// Sum of totals for signed and completed proposals.
    pub signed_revenue: Decimal,
    pub average_discount: Decimal,
    pub average_discount_pct: Decimal,
    pub pending_approvals: usize,
}

impl DashboardSummary {
    pub fn from_proposals(proposals: &[Proposal], pending_approvals: usize) -> Self {
        let mut by_status: BTreeMap<String, usize> =
            ProposalStatus::ALL.iter().map(|status| (status.as_str().to_string(), 0)).collect();
        let mut signed_revenue = Decimal::ZERO;
        let mut discount_total = Decimal::ZERO;
        let mut subtotal_total = Decimal::ZERO;

        for proposal in proposals {
            *by_status.entry(proposal.status.as_str().to_string()).or_default() += 1;
            if matches!(proposal.status, ProposalStatus::Signed | ProposalStatus::Completed) {
                signed_revenue += proposal.pricing.total;
            }
            discount_total += proposal.pricing.discount;
            subtotal_total += proposal.pricing.subtotal;
        }

        let average_discount = if proposals.is_empty() {
            Decimal::ZERO
        } else {
            round_money(discount_total / Decimal::from(proposals.len()))
        };
        let average_discount_pct = if subtotal_total.is_zero() {
            Decimal::ZERO
        } else {
            round_money(discount_total * Decimal::ONE_HUNDRED / subtotal_total)
        };

        Self {
            proposal_count: proposals.len(),
            by_status,
            signed_revenue: round_money(signed_revenue),
            average_discount,
            average_discount_pct,
            pending_approvals,
        }
    }
}
