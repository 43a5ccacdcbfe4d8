//! Test fixtures: a fresh on-disk database per test.
//!
//! On-disk (not `:memory:`) so the pool really has several connections and
//! concurrent writers really contend for the lock.

use tempfile::TempDir;

use crate::repository::catalog::NewProduct;
use crate::{Database, DbConfig};
use tally_core::{Actor, Product, Store};

pub(crate) struct TestDb {
    pub db: Database,
    _dir: TempDir,
}

pub(crate) async fn test_db() -> TestDb {
    test_db_with(|config| config).await
}

/// Like [`test_db`], with the pool configuration adjusted first.
pub(crate) async fn test_db_with(configure: impl FnOnce(DbConfig) -> DbConfig) -> TestDb {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = configure(DbConfig::new(dir.path().join("tally-test.db")).max_connections(5));
    let db = Database::new(config).await.expect("test database");
    TestDb { db, _dir: dir }
}

/// One store with a staff member bound to it and a member.
pub(crate) struct Fixture {
    pub store: Store,
    pub staff: Actor,
    pub member: Actor,
}

impl Fixture {
    pub async fn new(db: &Database) -> Self {
        let store = db.catalog().insert_store("Harajuku").await.expect("store");
        Fixture {
            staff: Actor::staff(10, store.id),
            member: Actor::member(7),
            store,
        }
    }

    /// Inserts a product with a barcode derived from the sku.
    pub async fn product(&self, db: &Database, sku: &str, price: i64) -> Product {
        db.catalog()
            .insert_product(
                &NewProduct::new(sku, format!("{} item", sku), price)
                    .with_barcode(format!("{}0001", sku)),
            )
            .await
            .expect("product")
    }

    /// Inserts a product and stocks it at the fixture store.
    pub async fn stocked(&self, db: &Database, sku: &str, price: i64, quantity: i64) -> Product {
        let product = self.product(db, sku, price).await;
        db.stock()
            .set_absolute(self.store.id, product.id, quantity)
            .await
            .expect("stock");
        product
    }
}
