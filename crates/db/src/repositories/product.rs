use homequote_core::domain::product::{Product, ProductId};
use homequote_core::domain::service::ServiceKind;

use super::{column, decimal_column, parsed_column, ProductRepository, RepositoryError};
use crate::DbPool;

pub struct SqlProductRepository {
    pool: DbPool,
}

impl SqlProductRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const UPSERT_PRODUCT: &str = "INSERT INTO product (id, service, sku, name, unit, unit_price, active)
     VALUES (?, ?, ?, ?, ?, ?, ?)
     ON CONFLICT(sku) DO UPDATE SET
         service = excluded.service,
         name = excluded.name,
         unit = excluded.unit,
         unit_price = excluded.unit_price,
         active = excluded.active";

fn row_to_product(row: &sqlx::sqlite::SqliteRow) -> Result<Product, RepositoryError> {
    Ok(Product {
        id: ProductId(column(row, "id")?),
        service: parsed_column(row, "service")?,
        sku: column(row, "sku")?,
        name: column(row, "name")?,
        unit: column(row, "unit")?,
        unit_price: decimal_column(row, "unit_price")?,
        active: column(row, "active")?,
    })
}

#[async_trait::async_trait]
impl ProductRepository for SqlProductRepository {
    async fn find_by_id(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, service, sku, name, unit, unit_price, active FROM product WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_product(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, product: Product) -> Result<(), RepositoryError> {
        sqlx::query(UPSERT_PRODUCT)
            .bind(&product.id.0)
            .bind(product.service.as_str())
            .bind(&product.sku)
            .bind(&product.name)
            .bind(&product.unit)
            .bind(product.unit_price.to_string())
            .bind(product.active)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list(&self, service: Option<ServiceKind>) -> Result<Vec<Product>, RepositoryError> {
        let rows = match service {
            Some(service) => {
                sqlx::query(
                    "SELECT id, service, sku, name, unit, unit_price, active
                     FROM product WHERE service = ? ORDER BY sku ASC",
                )
                .bind(service.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, service, sku, name, unit, unit_price, active
                     FROM product ORDER BY service ASC, sku ASC",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(row_to_product).collect::<Result<Vec<_>, _>>()
    }

    async fn save_all(&self, products: Vec<Product>) -> Result<usize, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        for product in &products {
            sqlx::query(UPSERT_PRODUCT)
                .bind(&product.id.0)
                .bind(product.service.as_str())
                .bind(&product.sku)
                .bind(&product.name)
                .bind(&product.unit)
                .bind(product.unit_price.to_string())
                .bind(product.active)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(products.len())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use homequote_core::domain::product::{Product, ProductId};
    use homequote_core::domain::service::ServiceKind;

    use super::SqlProductRepository;
    use crate::repositories::ProductRepository;
    use crate::{connect_with_settings, migrations};

    fn product(sku: &str, service: ServiceKind, price: i64) -> Product {
        Product {
            id: ProductId(format!("prod-{}", sku.to_ascii_lowercase())),
            service,
            sku: sku.to_string(),
            name: sku.to_string(),
            unit: "each".to_string(),
            unit_price: Decimal::from(price),
            active: true,
        }
    }

    #[tokio::test]
    async fn save_all_upserts_by_sku_and_filters_by_service() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlProductRepository::new(pool);

        let saved = repo
            .save_all(vec![
                product("RF-ARCH", ServiceKind::Roofing, 525),
                product("HV-16", ServiceKind::Hvac, 11_250),
            ])
            .await
            .expect("save all");
        assert_eq!(saved, 2);

        repo.save_all(vec![product("RF-ARCH", ServiceKind::Roofing, 540)]).await.expect("reimport");

        let roofing = repo.list(Some(ServiceKind::Roofing)).await.expect("list");
        assert_eq!(roofing.len(), 1);
        assert_eq!(roofing[0].unit_price, Decimal::from(540));
        assert_eq!(repo.list(None).await.expect("list").len(), 2);
    }
}
