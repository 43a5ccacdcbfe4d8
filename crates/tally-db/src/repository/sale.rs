//! # Sale Repository
//!
//! Sale settlement and anonymous receipt lookup.
//!
//! ## Settlement Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       settle(actor, request)                            │
//! │                                                                         │
//! │  0. PURE CHECKS (no transaction yet)                                    │
//! │     └── parties, cart normalization (merge + sort), free-text codes     │
//! │                                                                         │
//! │  1. BEGIN IMMEDIATE                                                     │
//! │                                                                         │
//! │  2. LOCK + CHECK, ascending product id                                  │
//! │     └── for each line: product row, ledger row                          │
//! │         absent / inactive  → ProductUnavailable ─┐                      │
//! │         quantity < wanted  → InsufficientStock  ─┤                      │
//! │                                                  │                      │
//! │  3. TOTALS                                       │                      │
//! │     └── Σ unit_price × qty, zero → Validation  ──┤                      │
//! │                                                  ├─► ROLLBACK, nothing  │
//! │  4. WRITE                                        │   survives           │
//! │     └── orders (paid, receipt UUID)              │                      │
//! │     └── order_lines (name + price snapshot)      │                      │
//! │     └── stock_entries quantity -= qty            │                      │
//! │                                                  │                      │
//! │  5. COMMIT ──────────────────────────────────────┘                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Staff terminals and the member storefront call the same `settle`; only
//! the actor differs.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use super::begin_write;
use super::catalog::{fetch_product, store_exists};
use super::stock::{fetch_entry, write_quantity};
use crate::error::EngineResult;
use tally_core::settlement::{
    normalize_cart, normalize_codes, settlement_totals, PricedLine, SettlementParties,
};
use tally_core::validation::validate_receipt_id;
use tally_core::{
    receipt_path, Actor, CoreError, Money, Order, OrderLine, OrderStatus, ReceiptLine, ReceiptView,
    SettlementRequest, StockEntry, INCLUSIVE_TAX_RATE,
};

/// A committed settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settlement {
    pub order: Order,
    pub lines: Vec<OrderLine>,
    /// Tax contained in `order.total_amount` (display only).
    pub tax_amount: i64,
    /// `order.total_amount - tax_amount`.
    pub subtotal_amount: i64,
    /// Public receipt URL, keyed by the receipt UUID only.
    pub receipt_url: String,
}

/// Repository for sale settlement and receipts.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
    receipt_base_url: String,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool, receipt_base_url: impl Into<String>) -> Self {
        SaleRepository {
            pool,
            receipt_base_url: receipt_base_url.into(),
        }
    }

    /// Builds the public URL for a receipt id.
    pub fn receipt_url(&self, receipt_id: &str) -> String {
        format!("{}{}", self.receipt_base_url, receipt_path(receipt_id))
    }

    /// Settles a cart into a paid order, all-or-nothing.
    ///
    /// ## Errors
    /// - `ActorNotPermitted` - staff acting outside their store, member
    ///   naming another member
    /// - `Validation` / `CartTooLarge` / `QuantityTooLarge` - malformed cart,
    ///   zero total
    /// - `NotFound` - unknown store or product
    /// - `ProductUnavailable` / `InsufficientStock` - ledger check failed
    /// - `Infrastructure` - lock timeout or database failure
    pub async fn settle(&self, actor: &Actor, request: &SettlementRequest) -> EngineResult<Settlement> {
        self.settle_locked(actor, request)
            .await
            .inspect_err(|e| e.log("settle_sale"))
    }

    async fn settle_locked(&self, actor: &Actor, request: &SettlementRequest) -> EngineResult<Settlement> {
        let parties = SettlementParties::resolve(actor, request)?;
        let cart = normalize_cart(&request.lines)?;
        let (staff_code, coupon_code) = normalize_codes(request)?;
        let store_id = request.store_id;

        debug!(
            store_id,
            actor_id = actor.id,
            lines = cart.len(),
            "Settling sale"
        );

        let mut tx = begin_write(&self.pool).await?;

        if !store_exists(&mut *tx, store_id).await? {
            return Err(CoreError::not_found("Store", store_id).into());
        }

        // Every row is read and checked before anything is written.
        let mut locked: Vec<(StockEntry, PricedLine)> = Vec::with_capacity(cart.len());
        for line in &cart {
            let product = fetch_product(&mut *tx, line.product_id)
                .await?
                .ok_or_else(|| CoreError::not_found("Product", line.product_id))?;

            let entry = fetch_entry(&mut tx, store_id, line.product_id)
                .await?
                .ok_or(CoreError::ProductUnavailable {
                    store_id,
                    product_id: line.product_id,
                })?;
            entry.check_sellable(line.quantity)?;

            locked.push((
                entry,
                PricedLine {
                    product_id: product.id,
                    name: product.name.clone(),
                    quantity: line.quantity,
                    unit_price: product.price(),
                },
            ));
        }

        let priced: Vec<PricedLine> = locked.iter().map(|(_, p)| p.clone()).collect();
        let split = settlement_totals(&priced, INCLUSIVE_TAX_RATE)?;

        let now = Utc::now();
        let receipt_id = Uuid::new_v4().to_string();

        let result = sqlx::query(
            r#"
            INSERT INTO orders (
                receipt_id, store_id, member_id, staff_id,
                total_amount, status, payment_method,
                staff_code, coupon_code, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&receipt_id)
        .bind(store_id)
        .bind(parties.member_id)
        .bind(parties.staff_id)
        .bind(split.total.minor())
        .bind(OrderStatus::Paid)
        .bind(request.payment_method)
        .bind(&staff_code)
        .bind(&coupon_code)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let order = Order {
            id: result.last_insert_rowid(),
            receipt_id,
            store_id,
            member_id: parties.member_id,
            staff_id: parties.staff_id,
            total_amount: split.total.minor(),
            status: OrderStatus::Paid,
            payment_method: request.payment_method,
            staff_code,
            coupon_code,
            created_at: now,
        };

        let mut lines = Vec::with_capacity(locked.len());
        for (entry, priced_line) in &locked {
            lines.push(insert_line(&mut tx, order.id, priced_line).await?);
            write_quantity(&mut tx, entry, entry.quantity - priced_line.quantity, now).await?;
        }

        tx.commit().await?;

        info!(
            order_id = order.id,
            receipt_id = %order.receipt_id,
            store_id,
            total = split.total.minor(),
            lines = lines.len(),
            payment_method = ?order.payment_method,
            self_service = order.staff_id.is_none(),
            "Sale settled"
        );

        let receipt_url = self.receipt_url(&order.receipt_id);
        Ok(Settlement {
            order,
            lines,
            tax_amount: split.tax.minor(),
            subtotal_amount: split.subtotal.minor(),
            receipt_url,
        })
    }

    /// Anonymous receipt lookup, keyed only by the receipt UUID.
    ///
    /// Malformed and unknown ids both come back as `NotFound`-class errors
    /// carrying the id the caller supplied, never an internal id.
    pub async fn get_receipt(&self, receipt_id: &str) -> EngineResult<ReceiptView> {
        let result: EngineResult<ReceiptView> = async {
            let receipt_id = validate_receipt_id(receipt_id)?;

            let order = sqlx::query_as::<_, Order>(
                r#"
                SELECT id, receipt_id, store_id, member_id, staff_id, total_amount, status,
                       payment_method, staff_code, coupon_code, created_at
                FROM orders
                WHERE receipt_id = ?1
                "#,
            )
            .bind(&receipt_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CoreError::not_found("Receipt", &receipt_id))?;

            let store_name: String = sqlx::query_scalar("SELECT name FROM stores WHERE id = ?1")
                .bind(order.store_id)
                .fetch_one(&self.pool)
                .await?;

            let lines = self
                .fetch_lines(order.id)
                .await?
                .into_iter()
                .map(|line| ReceiptLine {
                    name: line.name_snapshot,
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                    subtotal: line.subtotal,
                })
                .collect();

            let split = Money::from_minor(order.total_amount).split_inclusive_tax(INCLUSIVE_TAX_RATE);

            Ok(ReceiptView {
                receipt_id: order.receipt_id,
                store_name,
                issued_at: order.created_at,
                lines,
                total_amount: split.total.minor(),
                tax_amount: split.tax.minor(),
                subtotal_amount: split.subtotal.minor(),
                payment_method: order.payment_method.label().to_string(),
                status: order.status,
            })
        }
        .await;

        result.inspect_err(|e| e.log("get_receipt"))
    }

    /// Gets an order by internal id.
    pub async fn get_order(&self, id: i64) -> EngineResult<Order> {
        sqlx::query_as::<_, Order>(
            r#"
            SELECT id, receipt_id, store_id, member_id, staff_id, total_amount, status,
                   payment_method, staff_code, coupon_code, created_at
            FROM orders
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| CoreError::not_found("Order", id).into())
    }

    /// Gets the lines of an order, in product id order.
    pub async fn get_order_lines(&self, order_id: i64) -> EngineResult<Vec<OrderLine>> {
        Ok(self.fetch_lines(order_id).await?)
    }

    async fn fetch_lines(&self, order_id: i64) -> Result<Vec<OrderLine>, sqlx::Error> {
        sqlx::query_as::<_, OrderLine>(
            r#"
            SELECT id, order_id, product_id, name_snapshot, quantity, unit_price, subtotal
            FROM order_lines
            WHERE order_id = ?1
            ORDER BY product_id
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
    }
}

/// Inserts one order line.
///
/// ## Snapshot Pattern
/// Name and unit price are copied from the product so the order reads the
/// same after the catalog changes.
async fn insert_line(
    conn: &mut SqliteConnection,
    order_id: i64,
    line: &PricedLine,
) -> Result<OrderLine, sqlx::Error> {
    let subtotal = line.subtotal().minor();

    let result = sqlx::query(
        r#"
        INSERT INTO order_lines (order_id, product_id, name_snapshot, quantity, unit_price, subtotal)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(order_id)
    .bind(line.product_id)
    .bind(&line.name)
    .bind(line.quantity)
    .bind(line.unit_price.minor())
    .bind(subtotal)
    .execute(conn)
    .await?;

    Ok(OrderLine {
        id: result.last_insert_rowid(),
        order_id,
        product_id: line.product_id,
        name_snapshot: line.name.clone(),
        quantity: line.quantity,
        unit_price: line.unit_price.minor(),
        subtotal,
    })
}
