use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::domain::financing::FinancingPlan;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancingTerms {
    pub payment_factor: Decimal,
    pub term_months: u32,
    pub merchant_fee: Decimal,
}

impl From<&FinancingPlan> for FinancingTerms {
    fn from(plan: &FinancingPlan) -> Self {
        Self {
            payment_factor: plan.payment_factor,
            term_months: plan.term_months,
            merchant_fee: plan.merchant_fee,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub total: Decimal,
    pub monthly_payment: Option<Decimal>,
    pub financed_total: Option<Decimal>,
    pub merchant_fee: Option<Decimal>,
    pub term_months: Option<u32>,
}

pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn percent_of(amount: Decimal, pct: Decimal) -> Decimal {
    amount * pct / Decimal::ONE_HUNDRED
}

/// `total = subtotal - discount`, floored at zero; financing fields are
/// derived from `total` when a plan is given.
pub fn compute_totals(
    subtotal: Decimal,
    discount: Decimal,
    plan: Option<&FinancingTerms>,
) -> Totals {
    let total = round_money((subtotal - discount).max(Decimal::ZERO));

    let Some(plan) = plan else {
        return Totals {
            total,
            monthly_payment: None,
            financed_total: None,
            merchant_fee: None,
            term_months: None,
        };
    };

    let monthly_payment = round_money(total * plan.payment_factor);
    Totals {
        total,
        monthly_payment: Some(monthly_payment),
        financed_total: Some(monthly_payment * Decimal::from(plan.term_months)),
        merchant_fee: Some(round_money(percent_of(total, plan.merchant_fee))),
        term_months: Some(plan.term_months),
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{compute_totals, round_money, FinancingTerms};

    fn plan(factor: Decimal) -> FinancingTerms {
        FinancingTerms { payment_factor: factor, term_months: 120, merchant_fee: Decimal::from(6) }
    }

    #[test]
    fn financed_totals_use_payment_factor() {
        let totals = compute_totals(
            Decimal::from(25_000),
            Decimal::from(1965),
            Some(&plan(Decimal::new(19, 3))),
        );

        assert_eq!(totals.total, Decimal::from(23_035));
        // 23035 * 0.019 = 437.665
        assert_eq!(totals.monthly_payment, Some(Decimal::new(43_767, 2)));
        assert_eq!(totals.financed_total, Some(Decimal::new(5_252_040, 2)));
        assert_eq!(totals.merchant_fee, Some(Decimal::new(138_210, 2)));
        assert_eq!(totals.term_months, Some(120));
    }

    #[test]
    fn cash_totals_have_no_financing_fields() {
        let totals = compute_totals(Decimal::from(10_000), Decimal::from(500), None);

        assert_eq!(totals.total, Decimal::from(9_500));
        assert!(totals.monthly_payment.is_none());
        assert!(totals.financed_total.is_none());
        assert!(totals.merchant_fee.is_none());
    }

    #[test]
    fn total_never_goes_negative() {
        let totals = compute_totals(Decimal::from(1_000), Decimal::from(1965), None);
        assert_eq!(totals.total, Decimal::ZERO);
    }

    #[test]
    fn rounds_half_cents_away_from_zero() {
        assert_eq!(round_money(Decimal::new(437_665, 3)), Decimal::new(43_767, 2));
        assert_eq!(round_money(Decimal::new(437_664, 3)), Decimal::new(43_766, 2));
    }
}
