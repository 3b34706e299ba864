//! Row-level validation for pricing catalog imports.
//!
//! Rows arrive already parsed from the uploaded sheet. Every row is checked
//! and all problems are reported together so the user can fix the file in
//! one pass; a single bad row blocks the import.

use std::collections::HashMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::product::{Product, ProductId};
use crate::domain::service::ServiceKind;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceImportRow {
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub unit_price: Option<Value>,
    #[serde(default)]
    pub active: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRowError {
    /// 1-based data row number.
    pub row: usize,
    pub field: String,
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub products: Vec<Product>,
    pub errors: Vec<ImportRowError>,
}

impl ImportReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

pub fn validate_price_rows(rows: &[PriceImportRow]) -> ImportReport {
    let mut report = ImportReport::default();
    let mut seen_skus: HashMap<String, usize> = HashMap::new();

    if rows.is_empty() {
        report.errors.push(ImportRowError {
            row: 0,
            field: "rows".to_string(),
            message: "the import contains no rows".to_string(),
        });
        return report;
    }

    for (index, row) in rows.iter().enumerate() {
        let row_number = index + 1;
        let mut push = |field: &str, message: String| {
            report.errors.push(ImportRowError { row: row_number, field: field.to_string(), message })
        };

        let service = match non_empty(row.service.as_deref()) {
            None => {
                push("service", "service is required".to_string());
                None
            }
            Some(raw) => match ServiceKind::from_str(raw) {
                Ok(service) => Some(service),
                Err(_) => {
                    push("service", format!("unknown service `{raw}`"));
                    None
                }
            },
        };

        let sku = match non_empty(row.sku.as_deref()) {
            None => {
                push("sku", "sku is required".to_string());
                None
            }
            Some(raw) => {
                let key = raw.to_ascii_uppercase();
                if let Some(first_row) = seen_skus.get(&key) {
                    push("sku", format!("duplicate sku `{raw}` (first seen on row {first_row})"));
                    None
                } else {
                    seen_skus.insert(key.clone(), row_number);
                    Some(key)
                }
            }
        };

        let name = non_empty(row.name.as_deref()).map(str::to_string);
        if name.is_none() {
            push("name", "name is required".to_string());
        }

        let unit_price = match row.unit_price.as_ref() {
            None | Some(Value::Null) => {
                push("unit_price", "unit_price is required".to_string());
                None
            }
            Some(value) => match parse_price(value) {
                Some(price) if price >= Decimal::ZERO => Some(price),
                Some(_) => {
                    push("unit_price", "unit_price cannot be negative".to_string());
                    None
                }
                None => {
                    push("unit_price", format!("unit_price `{value}` is not a number"));
                    None
                }
            },
        };

        if let (Some(service), Some(sku), Some(name), Some(unit_price)) =
            (service, sku, name, unit_price)
        {
            report.products.push(Product {
                id: ProductId(format!("prod-{}", sku.to_ascii_lowercase())),
                service,
                sku,
                name,
                unit: non_empty(row.unit.as_deref()).unwrap_or("each").to_string(),
                unit_price,
                active: row.active.unwrap_or(true),
            });
        }
    }

    if !report.errors.is_empty() {
        report.products.clear();
    }
    report
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn parse_price(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(number) => Decimal::from_str(&number.to_string()).ok(),
        Value::String(raw) => {
            let cleaned: String =
                raw.trim().chars().filter(|ch| !matches!(ch, '$' | ',' | ' ')).collect();
            Decimal::from_str(&cleaned).ok()
        }
        _ => None,
    }
}
