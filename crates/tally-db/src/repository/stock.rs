//! # Stock Ledger Repository
//!
//! Per-(store, product) quantity counters.
//!
//! ## Who Writes the Ledger
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     stock_entries (store_id, product_id)                │
//! │                                                                         │
//! │   Sale Settlement ──────► quantity -= sold        (never below 0)       │
//! │   adjust(delta)   ──────► quantity += delta       (NegativeStock)       │
//! │   set_absolute    ──────► quantity  = n                                 │
//! │   Stocktake apply ──────► quantity  = counted     (counted items only)  │
//! │                                                                         │
//! │   Entries are created lazily (quantity 0, threshold 0, active) by       │
//! │   ensure/adjust/set_*; settlement never creates one.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use super::begin_write;
use super::catalog::{fetch_product, store_exists};
use crate::error::EngineResult;
use tally_core::validation::validate_stock_level;
use tally_core::{CoreError, StockEntry, ValidationError};

/// Repository for the Stock Ledger.
#[derive(Debug, Clone)]
pub struct StockRepository {
    pool: SqlitePool,
}

impl StockRepository {
    /// Creates a new StockRepository.
    pub fn new(pool: SqlitePool) -> Self {
        StockRepository { pool }
    }

    /// Gets the entry for (store, product), if one exists.
    pub async fn get(&self, store_id: i64, product_id: i64) -> EngineResult<Option<StockEntry>> {
        let entry = sqlx::query_as::<_, StockEntry>(
            r#"
            SELECT id, store_id, product_id, quantity, low_stock_threshold, is_active, updated_at
            FROM stock_entries
            WHERE store_id = ?1 AND product_id = ?2
            "#,
        )
        .bind(store_id)
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    /// Creates the entry if missing and returns it.
    pub async fn ensure(&self, store_id: i64, product_id: i64) -> EngineResult<StockEntry> {
        self.write(store_id, product_id, |entry| Ok(entry.quantity), "ensure")
            .await
    }

    /// Removes `quantity` units. The entry must already exist.
    ///
    /// ## Errors
    /// - Missing or inactive entry → `ProductUnavailable`
    /// - Not enough units → `InsufficientStock`
    pub async fn decrement(
        &self,
        store_id: i64,
        product_id: i64,
        quantity: i64,
    ) -> EngineResult<StockEntry> {
        let result: EngineResult<StockEntry> = async {
            if quantity <= 0 {
                return Err(ValidationError::MustBePositive {
                    field: "quantity".to_string(),
                }
                .into());
            }

            let mut tx = begin_write(&self.pool).await?;
            let entry = fetch_entry(&mut tx, store_id, product_id)
                .await?
                .ok_or(CoreError::ProductUnavailable {
                    store_id,
                    product_id,
                })?;

            entry.check_sellable(quantity)?;
            let updated = write_quantity(&mut tx, &entry, entry.quantity - quantity, Utc::now()).await?;
            tx.commit().await?;

            info!(store_id, product_id, quantity, remaining = updated.quantity, "Stock decremented");
            Ok(updated)
        }
        .await;

        result.inspect_err(|e| e.log("stock.decrement"))
    }

    /// Applies a signed delta, creating the entry if needed.
    ///
    /// ## Errors
    /// - Result below zero → `NegativeStock`
    /// - Result past `i64::MAX` → `Validation`
    pub async fn adjust(&self, store_id: i64, product_id: i64, delta: i64) -> EngineResult<StockEntry> {
        self.write(store_id, product_id, |entry| Ok(entry.apply_delta(delta)?), "adjust")
            .await
    }

    /// Overwrites the quantity, creating the entry if needed.
    pub async fn set_absolute(
        &self,
        store_id: i64,
        product_id: i64,
        quantity: i64,
    ) -> EngineResult<StockEntry> {
        self.write(
            store_id,
            product_id,
            |_| {
                validate_stock_level(quantity)?;
                Ok(quantity)
            },
            "set_absolute",
        )
        .await
    }

    /// Sets the low-stock threshold.
    pub async fn set_threshold(
        &self,
        store_id: i64,
        product_id: i64,
        threshold: i64,
    ) -> EngineResult<StockEntry> {
        let result: EngineResult<StockEntry> = async {
            if threshold < 0 {
                return Err(ValidationError::MustNotBeNegative {
                    field: "low_stock_threshold".to_string(),
                }
                .into());
            }

            let mut tx = begin_write(&self.pool).await?;
            let entry = ensure_in(&mut tx, store_id, product_id, Utc::now()).await?;

            sqlx::query("UPDATE stock_entries SET low_stock_threshold = ?2, updated_at = ?3 WHERE id = ?1")
                .bind(entry.id)
                .bind(threshold)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?;

            let updated = fetch_entry(&mut tx, store_id, product_id)
                .await?
                .ok_or(sqlx::Error::RowNotFound)?;
            tx.commit().await?;

            debug!(store_id, product_id, threshold, "Low-stock threshold updated");
            Ok(updated)
        }
        .await;

        result.inspect_err(|e| e.log("stock.set_threshold"))
    }

    /// Activates or deactivates a product for one store.
    ///
    /// Inactive entries keep their quantity but cannot be sold.
    pub async fn set_active(
        &self,
        store_id: i64,
        product_id: i64,
        is_active: bool,
    ) -> EngineResult<StockEntry> {
        let result: EngineResult<StockEntry> = async {
            let mut tx = begin_write(&self.pool).await?;
            let entry = ensure_in(&mut tx, store_id, product_id, Utc::now()).await?;

            sqlx::query("UPDATE stock_entries SET is_active = ?2, updated_at = ?3 WHERE id = ?1")
                .bind(entry.id)
                .bind(is_active)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?;

            let updated = fetch_entry(&mut tx, store_id, product_id)
                .await?
                .ok_or(sqlx::Error::RowNotFound)?;
            tx.commit().await?;

            info!(store_id, product_id, is_active, "Stock entry activation changed");
            Ok(updated)
        }
        .await;

        result.inspect_err(|e| e.log("stock.set_active"))
    }

    /// All entries for a store, by product id.
    pub async fn list_for_store(&self, store_id: i64) -> EngineResult<Vec<StockEntry>> {
        let entries = sqlx::query_as::<_, StockEntry>(
            r#"
            SELECT id, store_id, product_id, quantity, low_stock_threshold, is_active, updated_at
            FROM stock_entries
            WHERE store_id = ?1
            ORDER BY product_id
            "#,
        )
        .bind(store_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Entries at or below their low-stock threshold.
    pub async fn list_low_stock(&self, store_id: i64) -> EngineResult<Vec<StockEntry>> {
        let entries = sqlx::query_as::<_, StockEntry>(
            r#"
            SELECT id, store_id, product_id, quantity, low_stock_threshold, is_active, updated_at
            FROM stock_entries
            WHERE store_id = ?1 AND quantity <= low_stock_threshold
            ORDER BY quantity, product_id
            "#,
        )
        .bind(store_id)
        .fetch_all(&self.pool)
        .await?;

        debug!(store_id, count = entries.len(), "Low-stock entries listed");
        Ok(entries)
    }

    /// Shared shape of the quantity-setting writes: lock, ensure, compute the
    /// next quantity from the current entry, write, commit.
    async fn write<F>(
        &self,
        store_id: i64,
        product_id: i64,
        next_quantity: F,
        operation: &'static str,
    ) -> EngineResult<StockEntry>
    where
        F: FnOnce(&StockEntry) -> EngineResult<i64>,
    {
        let result: EngineResult<StockEntry> = async {
            let now = Utc::now();
            let mut tx = begin_write(&self.pool).await?;
            let entry = ensure_in(&mut tx, store_id, product_id, now).await?;

            let quantity = next_quantity(&entry)?;
            let updated = if quantity == entry.quantity {
                entry
            } else {
                write_quantity(&mut tx, &entry, quantity, now).await?
            };
            tx.commit().await?;

            info!(store_id, product_id, operation, quantity = updated.quantity, "Stock ledger written");
            Ok(updated)
        }
        .await;

        result.inspect_err(|e| e.log(operation))
    }
}

// =============================================================================
// Transaction Helpers
// =============================================================================

/// Reads one ledger row inside an open transaction.
pub(crate) async fn fetch_entry(
    conn: &mut SqliteConnection,
    store_id: i64,
    product_id: i64,
) -> Result<Option<StockEntry>, sqlx::Error> {
    sqlx::query_as::<_, StockEntry>(
        r#"
        SELECT id, store_id, product_id, quantity, low_stock_threshold, is_active, updated_at
        FROM stock_entries
        WHERE store_id = ?1 AND product_id = ?2
        "#,
    )
    .bind(store_id)
    .bind(product_id)
    .fetch_optional(conn)
    .await
}

/// Writes a new quantity and returns the updated entry.
///
/// Callers have already checked the value against tally-core rules; the
/// CHECK constraint is the last line.
pub(crate) async fn write_quantity(
    conn: &mut SqliteConnection,
    entry: &StockEntry,
    quantity: i64,
    now: DateTime<Utc>,
) -> Result<StockEntry, sqlx::Error> {
    sqlx::query("UPDATE stock_entries SET quantity = ?2, updated_at = ?3 WHERE id = ?1")
        .bind(entry.id)
        .bind(quantity)
        .bind(now)
        .execute(conn)
        .await?;

    Ok(StockEntry {
        quantity,
        updated_at: now,
        ..entry.clone()
    })
}

/// Returns the entry, creating it (quantity 0, threshold 0, active) if the
/// store and product both exist.
async fn ensure_in(
    conn: &mut SqliteConnection,
    store_id: i64,
    product_id: i64,
    now: DateTime<Utc>,
) -> EngineResult<StockEntry> {
    if let Some(entry) = fetch_entry(&mut *conn, store_id, product_id).await? {
        return Ok(entry);
    }

    if !store_exists(&mut *conn, store_id).await? {
        return Err(CoreError::not_found("Store", store_id).into());
    }
    if fetch_product(&mut *conn, product_id).await?.is_none() {
        return Err(CoreError::not_found("Product", product_id).into());
    }

    sqlx::query(
        r#"
        INSERT INTO stock_entries (store_id, product_id, quantity, low_stock_threshold, is_active, updated_at)
        VALUES (?1, ?2, 0, 0, 1, ?3)
        "#,
    )
    .bind(store_id)
    .bind(product_id)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    debug!(store_id, product_id, "Stock entry created");

    Ok(fetch_entry(conn, store_id, product_id)
        .await?
        .ok_or(sqlx::Error::RowNotFound)?)
}

#[cfg(test)]
mod tests {
    use crate::testing::{test_db, Fixture};
    use crate::EngineError;

    #[tokio::test]
    async fn test_ensure_is_lazy_and_idempotent() {
        let t = test_db().await;
        let f = Fixture::new(&t.db).await;
        let product = f.product(&t.db, "RICE", 200).await;
        let stock = t.db.stock();

        assert!(stock.get(f.store.id, product.id).await.unwrap().is_none());

        let first = stock.ensure(f.store.id, product.id).await.unwrap();
        assert_eq!(first.quantity, 0);
        assert_eq!(first.low_stock_threshold, 0);
        assert!(first.is_active);

        let second = stock.ensure(f.store.id, product.id).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_ensure_unknown_product_is_not_found() {
        let t = test_db().await;
        let f = Fixture::new(&t.db).await;
        let err = t.db.stock().ensure(f.store.id, 999).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_adjust_never_goes_negative() {
        let t = test_db().await;
        let f = Fixture::new(&t.db).await;
        let product = f.product(&t.db, "SOAP", 300).await;
        let stock = t.db.stock();

        assert_eq!(stock.adjust(f.store.id, product.id, 5).await.unwrap().quantity, 5);
        assert_eq!(stock.adjust(f.store.id, product.id, -5).await.unwrap().quantity, 0);

        let err = stock.adjust(f.store.id, product.id, -1).await.unwrap_err();
        assert_eq!(err.code(), "NEGATIVE_STOCK");
        assert_eq!(stock.get(f.store.id, product.id).await.unwrap().unwrap().quantity, 0);
    }

    #[tokio::test]
    async fn test_adjust_overflow_is_rejected() {
        let t = test_db().await;
        let f = Fixture::new(&t.db).await;
        let product = f.stocked(&t.db, "SALT", 120, 5).await;
        let stock = t.db.stock();

        let err = stock.adjust(f.store.id, product.id, i64::MAX).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let err = stock.adjust(f.store.id, product.id, i64::MIN).await.unwrap_err();
        assert_eq!(err.code(), "NEGATIVE_STOCK");
        assert_eq!(stock.get(f.store.id, product.id).await.unwrap().unwrap().quantity, 5);
    }

    #[tokio::test]
    async fn test_decrement_rules() {
        let t = test_db().await;
        let f = Fixture::new(&t.db).await;
        let product = f.product(&t.db, "MILK", 180).await;
        let stock = t.db.stock();

        // Absent entry is never created implicitly
        let err = stock.decrement(f.store.id, product.id, 1).await.unwrap_err();
        assert_eq!(err.code(), "PRODUCT_UNAVAILABLE");
        assert!(stock.get(f.store.id, product.id).await.unwrap().is_none());

        stock.set_absolute(f.store.id, product.id, 3).await.unwrap();
        assert_eq!(stock.decrement(f.store.id, product.id, 2).await.unwrap().quantity, 1);

        let err = stock.decrement(f.store.id, product.id, 2).await.unwrap_err();
        assert!(matches!(err, EngineError::Business(_)));
        assert_eq!(err.code(), "INSUFFICIENT_STOCK");

        stock.set_active(f.store.id, product.id, false).await.unwrap();
        let err = stock.decrement(f.store.id, product.id, 1).await.unwrap_err();
        assert_eq!(err.code(), "PRODUCT_UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_low_stock_listing() {
        let t = test_db().await;
        let f = Fixture::new(&t.db).await;
        let low = f.product(&t.db, "LOW", 100).await;
        let fine = f.product(&t.db, "FINE", 100).await;
        let stock = t.db.stock();

        stock.set_absolute(f.store.id, low.id, 2).await.unwrap();
        stock.set_threshold(f.store.id, low.id, 5).await.unwrap();
        stock.set_absolute(f.store.id, fine.id, 20).await.unwrap();
        stock.set_threshold(f.store.id, fine.id, 5).await.unwrap();

        let listed = stock.list_low_stock(f.store.id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].product_id, low.id);
        assert!(listed[0].is_low_stock());

        assert_eq!(stock.list_for_store(f.store.id).await.unwrap().len(), 2);
        assert!(stock.set_threshold(f.store.id, low.id, -1).await.is_err());
        assert!(stock.set_absolute(f.store.id, low.id, -1).await.is_err());
    }
}
