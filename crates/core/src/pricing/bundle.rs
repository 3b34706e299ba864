use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::BundleRuleConfig;
use crate::domain::service::ServiceKind;
use crate::pricing::totals::{percent_of, round_money};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleFormula {
    Flat(Decimal),
    Percent(Decimal),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleRule {
    pub name: String,
    pub services: BTreeSet<ServiceKind>,
    pub formula: BundleFormula,
}

impl BundleRule {
    pub fn new(
        name: impl Into<String>,
        services: impl IntoIterator<Item = ServiceKind>,
        formula: BundleFormula,
    ) -> Self {
        Self { name: name.into(), services: services.into_iter().collect(), formula }
    }

    fn matches(&self, selected: &BTreeSet<ServiceKind>) -> bool {
        self.services.len() >= 2 && self.services.is_subset(selected)
    }

    fn amount(&self, subtotal: Decimal) -> Decimal {
        match &self.formula {
            BundleFormula::Flat(amount) => *amount,
            BundleFormula::Percent(pct) => round_money(percent_of(subtotal, *pct)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleMatch {
    pub rule_name: String,
    pub amount: Decimal,
}

/// Service-combination discounts. Rules never stack: the most valuable
/// matching rule wins.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BundleRuleTable {
    rules: Vec<BundleRule>,
}

impl Default for BundleRuleTable {
    fn default() -> Self {
        Self {
            rules: vec![
                BundleRule::new(
                    "roofing_hvac",
                    [ServiceKind::Roofing, ServiceKind::Hvac],
                    BundleFormula::Flat(Decimal::from(1965)),
                ),
                BundleRule::new(
                    "roofing_windows_doors",
                    [ServiceKind::Roofing, ServiceKind::WindowsDoors],
                    BundleFormula::Percent(Decimal::from(5)),
                ),
            ],
        }
    }
}

impl BundleRuleTable {
    /// An empty rule list falls back to the built-in table.
    pub fn new(rules: Vec<BundleRule>) -> Self {
        if rules.is_empty() {
            return Self::default();
        }
        Self { rules }
    }

    /// Configured rules replace the built-in table wholesale. Rules that set
    /// both or neither of `flat_amount` and `percent` are skipped.
    pub fn from_config(rules: &[BundleRuleConfig]) -> Self {
        Self::new(
            rules
                .iter()
                .filter_map(|rule| {
                    let formula = match (rule.flat_amount, rule.percent) {
                        (Some(amount), None) => BundleFormula::Flat(amount),
                        (None, Some(pct)) => BundleFormula::Percent(pct),
                        _ => return None,
                    };
                    Some(BundleRule::new(rule.name.clone(), rule.services.iter().copied(), formula))
                })
                .collect(),
        )
    }

    pub fn rules(&self) -> &[BundleRule] {
        &self.rules
    }

    pub fn best_match(
        &self,
        selected: &BTreeSet<ServiceKind>,
        subtotal: Decimal,
    ) -> Option<BundleMatch> {
        self.rules
            .iter()
            .filter(|rule| rule.matches(selected))
            .map(|rule| BundleMatch { rule_name: rule.name.clone(), amount: rule.amount(subtotal) })
            .max_by(|left, right| left.amount.cmp(&right.amount))
    }

    pub fn lookup(&self, selected: &BTreeSet<ServiceKind>, subtotal: Decimal) -> Decimal {
        self.best_match(selected, subtotal).map(|found| found.amount).unwrap_or(Decimal::ZERO)
    }
}

pub fn lookup_bundle_discount(selected: &BTreeSet<ServiceKind>, subtotal: Decimal) -> Decimal {
    BundleRuleTable::default().lookup(selected, subtotal)
}
