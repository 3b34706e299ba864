//! Catalog import and lookup.
//!
//! - `POST /api/pricing/import` all-or-nothing price sheet import
//! - `GET  /api/pricing/products?service=` active catalog, optionally per service

use std::str::FromStr;

use axum::{
    extract::{Query, State},
    Json,
};
use homequote_core::{
    domain::{product::Product, service::ServiceKind},
    import::{validate_price_rows, PriceImportRow},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{financing::catalog_event, ApiError, ApiState, Caller, ForRequest};

#[derive(Clone, Debug, Deserialize)]
pub struct ImportRequest {
    pub rows: Vec<PriceImportRow>,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct ImportResponse {
    pub validated: usize,
    pub imported: usize,
    pub dry_run: bool,
    pub products: Vec<Product>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub service: Option<String>,
}

pub async fn import_prices(
    State(state): State<ApiState>,
    caller: Caller,
    Json(body): Json<ImportRequest>,
) -> Result<Json<ImportResponse>, ApiError> {
    caller.require_catalog()?;
    let cid = caller.correlation_id.as_str();

    let report = validate_price_rows(&body.rows);
    if !report.is_clean() {
        warn!(
            event_name = "catalog.import.rejected",
            correlation_id = %cid,
            rows = body.rows.len(),
            errors = report.errors.len(),
            "price import rejected"
        );
        return Err(ApiError::import_rejected(report.errors, cid));
    }

    let validated = report.products.len();
    let imported = if body.dry_run {
        0
    } else {
        state.products.save_all(report.products.clone()).await.for_request(cid)?
    };

    info!(
        event_name = "catalog.import.completed",
        correlation_id = %cid,
        validated,
        imported,
        dry_run = body.dry_run,
        "price import processed"
    );
    if !body.dry_run {
        state
            .record_audit(
                catalog_event(&caller, "catalog.import.completed")
                    .with_metadata("imported", imported),
            )
            .await;
    }

    Ok(Json(ImportResponse { validated, imported, dry_run: body.dry_run, products: report.products }))
}

pub async fn list_products(
    State(state): State<ApiState>,
    caller: Caller,
    Query(query): Query<ProductQuery>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let cid = caller.correlation_id.as_str();
    let service = query
        .service
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
        .map(ServiceKind::from_str)
        .transpose()
        .for_request(cid)?;

    let products = state.products.list(service).await.for_request(cid)?;
    Ok(Json(products.into_iter().filter(|product| product.active).collect()))
}
