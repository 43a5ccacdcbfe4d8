//! # Catalog Repository
//!
//! Stores and products. The engine only reads these (prices, names, barcode
//! lookup); inserts exist for seeding and tests.

use chrono::Utc;
use sqlx::{Executor, Sqlite, SqlitePool};
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use tally_core::validation::{validate_barcode, validate_free_text, validate_price};
use tally_core::{CoreError, Product, Store, ValidationError};

/// Input for [`CatalogRepository::insert_product`].
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub sku: String,
    pub barcode: Option<String>,
    pub name: String,
    /// Tax-inclusive price in minor units.
    pub price: i64,
}

impl NewProduct {
    pub fn new(sku: impl Into<String>, name: impl Into<String>, price: i64) -> Self {
        NewProduct {
            sku: sku.into(),
            barcode: None,
            name: name.into(),
            price,
        }
    }

    pub fn with_barcode(mut self, barcode: impl Into<String>) -> Self {
        self.barcode = Some(barcode.into());
        self
    }
}

/// Repository for store and product rows.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    /// Creates a new CatalogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    /// Inserts a store.
    pub async fn insert_store(&self, name: &str) -> EngineResult<Store> {
        let name = required("name", name)?;
        let now = Utc::now();

        let result = sqlx::query("INSERT INTO stores (name, created_at) VALUES (?1, ?2)")
            .bind(&name)
            .bind(now)
            .execute(&self.pool)
            .await?;

        let store = Store {
            id: result.last_insert_rowid(),
            name,
            created_at: now,
        };

        info!(store_id = store.id, name = %store.name, "Store created");
        Ok(store)
    }

    /// Gets a store by id.
    pub async fn get_store(&self, id: i64) -> EngineResult<Store> {
        sqlx::query_as::<_, Store>("SELECT id, name, created_at FROM stores WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CoreError::not_found("Store", id).into())
    }

    /// Inserts a product.
    ///
    /// ## Errors
    /// - Blank sku/name, negative price, malformed barcode → `Validation`
    /// - Duplicate sku or barcode → `Infrastructure(UniqueViolation)`
    pub async fn insert_product(&self, product: &NewProduct) -> EngineResult<Product> {
        let sku = required("sku", &product.sku)?;
        let name = required("name", &product.name)?;
        let barcode = product
            .barcode
            .as_deref()
            .map(validate_barcode)
            .transpose()?;
        validate_price(product.price)?;

        let now = Utc::now();
        debug!(sku = %sku, "Inserting product");

        let result = sqlx::query(
            r#"
            INSERT INTO products (sku, barcode, name, price, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&sku)
        .bind(&barcode)
        .bind(&name)
        .bind(product.price)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(Product {
            id: result.last_insert_rowid(),
            sku,
            barcode,
            name,
            price: product.price,
            created_at: now,
        })
    }

    /// Gets a product by id.
    pub async fn get_product(&self, id: i64) -> EngineResult<Product> {
        fetch_product(&self.pool, id)
            .await?
            .ok_or_else(|| CoreError::not_found("Product", id).into())
    }

    /// Looks up a product by barcode.
    ///
    /// ## Returns
    /// * `Ok(Some(Product))` - Product found
    /// * `Ok(None)` - No product carries this barcode
    pub async fn find_by_barcode(&self, barcode: &str) -> EngineResult<Option<Product>> {
        let barcode = validate_barcode(barcode)?;

        let product = sqlx::query_as::<_, Product>(
            "SELECT id, sku, barcode, name, price, created_at FROM products WHERE barcode = ?1",
        )
        .bind(&barcode)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }
}

/// Reads a product with any executor (pool or open transaction).
pub(crate) async fn fetch_product<'e, E>(executor: E, id: i64) -> Result<Option<Product>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Product>(
        "SELECT id, sku, barcode, name, price, created_at FROM products WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(executor)
    .await
}

/// Checks that a store row exists.
pub(crate) async fn store_exists<'e, E>(executor: E, id: i64) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM stores WHERE id = ?1)")
        .bind(id)
        .fetch_one(executor)
        .await
}

fn required(field: &str, value: &str) -> Result<String, EngineError> {
    validate_free_text(field, Some(value))?.ok_or_else(|| {
        ValidationError::Required {
            field: field.to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use crate::testing::test_db;
    use crate::DbError;

    use super::*;

    #[tokio::test]
    async fn test_store_roundtrip_and_missing() {
        let t = test_db().await;
        let store = t.db.catalog().insert_store("Shibuya").await.unwrap();
        let loaded = t.db.catalog().get_store(store.id).await.unwrap();
        assert_eq!(loaded.name, "Shibuya");

        let err = t.db.catalog().get_store(store.id + 100).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_product_barcode_lookup() {
        let t = test_db().await;
        let catalog = t.db.catalog();
        let product = catalog
            .insert_product(&NewProduct::new("TEA-500", "Green tea 500ml", 150).with_barcode(" 4901234567890 "))
            .await
            .unwrap();
        assert_eq!(product.barcode.as_deref(), Some("4901234567890"));

        let found = catalog.find_by_barcode("4901234567890").await.unwrap().unwrap();
        assert_eq!(found.id, product.id);
        assert_eq!(found.price().minor(), 150);
        assert!(catalog.find_by_barcode("0000").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_product_validation_and_duplicates() {
        let t = test_db().await;
        let catalog = t.db.catalog();

        let err = catalog.insert_product(&NewProduct::new("X", "Bad", -1)).await.unwrap_err();
        assert!(err.is_business());

        let err = catalog.insert_product(&NewProduct::new(" ", "Blank sku", 1)).await.unwrap_err();
        assert!(err.is_business());

        let err = catalog
            .insert_product(&NewProduct::new("GOLD", "Too dear", tally_core::MAX_UNIT_PRICE + 1))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert!(catalog
            .insert_product(&NewProduct::new("GOLD", "Dear", tally_core::MAX_UNIT_PRICE))
            .await
            .is_ok());

        catalog.insert_product(&NewProduct::new("DUP", "First", 10)).await.unwrap();
        let err = catalog.insert_product(&NewProduct::new("DUP", "Second", 10)).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Infrastructure(DbError::UniqueViolation { .. })
        ));
    }
}
