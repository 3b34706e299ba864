use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::service::ServiceKind;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId(pub String);

/// Pricing-catalog entry for one service line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub service: ServiceKind,
    pub sku: String,
    pub name: String,
    pub unit: String,
    pub unit_price: Decimal,
    pub active: bool,
}
