//! # Stocktake Repository
//!
//! Session-scoped physical counts reconciled against the Stock Ledger.
//!
//! ## Session Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  start(store)                                                           │
//! │     ├── open session exists? ──► SessionConflict                        │
//! │     │   (pre-check under the write lock, partial unique index backs it) │
//! │     └── INSERT session + snapshot every stock entry of the store        │
//! │              system_quantity = ledger quantity, is_counted = false      │
//! │                                                                         │
//! │  record_count(item, actual) / scan_barcode(barcode)                     │
//! │     └── in_progress only, else SessionClosed                            │
//! │                                                                         │
//! │  complete(apply_adjustments)                                            │
//! │     ├── true:  ledger quantity = actual_quantity, COUNTED ITEMS ONLY    │
//! │     │          (uncounted products keep their current quantity)         │
//! │     ├── false: count-only audit, ledger untouched                       │
//! │     └── status = completed, completed_by, completed_at                  │
//! │                                                                         │
//! │  cancel()                                                               │
//! │     └── status = cancelled, ledger untouched, items kept for audit      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{Executor, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use super::begin_write;
use super::catalog::store_exists;
use crate::error::{DbError, EngineError, EngineResult};
use tally_core::validation::{validate_barcode, validate_free_text};
use tally_core::{
    Actor, CoreError, DiscrepancySummary, Product, SessionStatus, StocktakeCompletion,
    StocktakeProgress, StocktakingItem, StocktakingSession,
};

/// Repository for stocktaking sessions and items.
#[derive(Debug, Clone)]
pub struct StocktakeRepository {
    pool: SqlitePool,
}

impl StocktakeRepository {
    /// Creates a new StocktakeRepository.
    pub fn new(pool: SqlitePool) -> Self {
        StocktakeRepository { pool }
    }

    /// Opens a session for a store and snapshots its ledger.
    ///
    /// ## Errors
    /// - `SessionConflict` - the store already has a session in progress
    /// - `ActorNotPermitted` - not staff of this store, not admin
    pub async fn start(
        &self,
        actor: &Actor,
        store_id: i64,
        notes: Option<&str>,
    ) -> EngineResult<StocktakingSession> {
        self.start_locked(actor, store_id, notes)
            .await
            .inspect_err(|e| e.log("stocktake.start"))
    }

    async fn start_locked(
        &self,
        actor: &Actor,
        store_id: i64,
        notes: Option<&str>,
    ) -> EngineResult<StocktakingSession> {
        actor.require_employee_for(store_id, "start stocktakes")?;
        let notes = validate_free_text("notes", notes)?;

        let mut tx = begin_write(&self.pool).await?;

        if !store_exists(&mut *tx, store_id).await? {
            return Err(CoreError::not_found("Store", store_id).into());
        }
        if let Some(open) = fetch_open_session(&mut *tx, store_id).await? {
            return Err(CoreError::SessionConflict {
                store_id,
                session_id: open.id,
            }
            .into());
        }

        let now = Utc::now();
        let inserted = sqlx::query(
            r#"
            INSERT INTO stocktaking_sessions (store_id, created_by, status, notes, started_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(store_id)
        .bind(actor.id)
        .bind(SessionStatus::InProgress)
        .bind(&notes)
        .bind(now)
        .execute(&mut *tx)
        .await;

        let session_id = match inserted {
            Ok(result) => result.last_insert_rowid(),
            Err(err) => return Err(self.conflict_or(&mut tx, store_id, err).await),
        };

        let snapshot = sqlx::query(
            r#"
            INSERT INTO stocktaking_items (session_id, product_id, system_quantity, is_counted)
            SELECT ?1, product_id, quantity, 0
            FROM stock_entries
            WHERE store_id = ?2
            "#,
        )
        .bind(session_id)
        .bind(store_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            session_id,
            store_id,
            created_by = actor.id,
            items = snapshot.rows_affected(),
            "Stocktake started"
        );

        Ok(StocktakingSession {
            id: session_id,
            store_id,
            created_by: actor.id,
            completed_by: None,
            status: SessionStatus::InProgress,
            notes,
            started_at: now,
            completed_at: None,
        })
    }

    /// Translates a unique-index hit on the open-session index into
    /// `SessionConflict`; everything else stays an infrastructure error.
    async fn conflict_or(
        &self,
        conn: &mut SqliteConnection,
        store_id: i64,
        err: sqlx::Error,
    ) -> EngineError {
        match DbError::from(err) {
            DbError::UniqueViolation { field, .. } if field.contains("stocktaking_sessions") => {
                match fetch_open_session(conn, store_id).await {
                    Ok(Some(open)) => CoreError::SessionConflict {
                        store_id,
                        session_id: open.id,
                    }
                    .into(),
                    Ok(None) => DbError::duplicate(field, store_id.to_string()).into(),
                    Err(err) => err.into(),
                }
            }
            other => other.into(),
        }
    }

    /// Records a physical count for one item.
    pub async fn record_count(
        &self,
        actor: &Actor,
        session_id: i64,
        item_id: i64,
        actual_quantity: i64,
        notes: Option<&str>,
    ) -> EngineResult<StocktakingItem> {
        let result: EngineResult<StocktakingItem> = async {
            let mut tx = begin_write(&self.pool).await?;
            let session = open_session_for(&mut tx, actor, session_id, "record stock counts").await?;

            let item = fetch_item(&mut *tx, item_id)
                .await?
                .filter(|i| i.session_id == session.id)
                .ok_or_else(|| CoreError::not_found("StocktakingItem", item_id))?;

            let entry = item.count(actual_quantity, notes)?;

            sqlx::query(
                r#"
                UPDATE stocktaking_items
                SET actual_quantity = ?2, difference = ?3, notes = ?4, is_counted = 1
                WHERE id = ?1
                "#,
            )
            .bind(item.id)
            .bind(entry.actual_quantity)
            .bind(entry.difference)
            .bind(&entry.notes)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;

            debug!(
                session_id,
                item_id,
                product_id = item.product_id,
                actual = entry.actual_quantity,
                difference = entry.difference,
                "Stock count recorded"
            );

            Ok(StocktakingItem {
                actual_quantity: Some(entry.actual_quantity),
                difference: Some(entry.difference),
                notes: entry.notes,
                is_counted: true,
                ..item
            })
        }
        .await;

        result.inspect_err(|e| e.log("stocktake.record_count"))
    }

    /// Resolves a scanned barcode to this session's item.
    ///
    /// ## Errors
    /// - `NotFound` - no product carries the barcode
    /// - `ItemNotInScope` - the product was not in the store's snapshot
    /// - `SessionClosed` - session no longer in progress
    pub async fn scan_barcode(
        &self,
        actor: &Actor,
        session_id: i64,
        barcode: &str,
    ) -> EngineResult<StocktakingItem> {
        let result: EngineResult<StocktakingItem> = async {
            let barcode = validate_barcode(barcode)?;
            let mut conn = self.pool.acquire().await?;
            let session = open_session_for(&mut conn, actor, session_id, "scan stock counts").await?;

            let product = sqlx::query_as::<_, Product>(
                "SELECT id, sku, barcode, name, price, created_at FROM products WHERE barcode = ?1",
            )
            .bind(&barcode)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| CoreError::not_found("Product", &barcode))?;

            let item = sqlx::query_as::<_, StocktakingItem>(
                r#"
                SELECT id, session_id, product_id, system_quantity, actual_quantity,
                       difference, notes, is_counted
                FROM stocktaking_items
                WHERE session_id = ?1 AND product_id = ?2
                "#,
            )
            .bind(session.id)
            .bind(product.id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or(CoreError::ItemNotInScope {
                session_id,
                barcode,
            })?;

            Ok(item)
        }
        .await;

        result.inspect_err(|e| e.log("stocktake.scan_barcode"))
    }

    /// Closes the session, optionally writing counted values to the ledger.
    pub async fn complete(
        &self,
        actor: &Actor,
        session_id: i64,
        apply_adjustments: bool,
    ) -> EngineResult<StocktakeCompletion> {
        self.complete_locked(actor, session_id, apply_adjustments)
            .await
            .inspect_err(|e| e.log("stocktake.complete"))
    }

    async fn complete_locked(
        &self,
        actor: &Actor,
        session_id: i64,
        apply_adjustments: bool,
    ) -> EngineResult<StocktakeCompletion> {
        let mut tx = begin_write(&self.pool).await?;
        let session = open_session_for(&mut tx, actor, session_id, "complete stocktakes").await?;
        let items = fetch_items(&mut *tx, session.id).await?;
        let now = Utc::now();

        let mut adjusted_entries = 0;
        if apply_adjustments {
            for item in items.iter().filter(|i| i.is_counted) {
                let Some(actual) = item.actual_quantity else {
                    continue;
                };

                // Upsert: the entry was snapshotted, but a missing row must
                // not turn a reconciliation into a failure.
                sqlx::query(
                    r#"
                    INSERT INTO stock_entries (store_id, product_id, quantity, low_stock_threshold, is_active, updated_at)
                    VALUES (?1, ?2, ?3, 0, 1, ?4)
                    ON CONFLICT (store_id, product_id)
                    DO UPDATE SET quantity = excluded.quantity, updated_at = excluded.updated_at
                    "#,
                )
                .bind(session.store_id)
                .bind(item.product_id)
                .bind(actual)
                .bind(now)
                .execute(&mut *tx)
                .await?;

                adjusted_entries += 1;
            }
        }

        sqlx::query(
            r#"
            UPDATE stocktaking_sessions
            SET status = ?2, completed_by = ?3, completed_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(session.id)
        .bind(SessionStatus::Completed)
        .bind(actor.id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let summary = DiscrepancySummary::from_items(&items);
        info!(
            session_id,
            store_id = session.store_id,
            apply_adjustments,
            adjusted_entries,
            over = summary.over_count,
            under = summary.under_count,
            total_difference = summary.total_difference,
            "Stocktake completed"
        );

        Ok(StocktakeCompletion {
            session: StocktakingSession {
                status: SessionStatus::Completed,
                completed_by: Some(actor.id),
                completed_at: Some(now),
                ..session
            },
            applied_adjustments: apply_adjustments,
            adjusted_entries,
            summary,
        })
    }

    /// Abandons the session. Ledger untouched, items kept.
    pub async fn cancel(&self, actor: &Actor, session_id: i64) -> EngineResult<StocktakingSession> {
        let result: EngineResult<StocktakingSession> = async {
            let mut tx = begin_write(&self.pool).await?;
            let session = open_session_for(&mut tx, actor, session_id, "cancel stocktakes").await?;

            sqlx::query("UPDATE stocktaking_sessions SET status = ?2 WHERE id = ?1")
                .bind(session.id)
                .bind(SessionStatus::Cancelled)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;

            info!(session_id, store_id = session.store_id, "Stocktake cancelled");
            Ok(StocktakingSession {
                status: SessionStatus::Cancelled,
                ..session
            })
        }
        .await;

        result.inspect_err(|e| e.log("stocktake.cancel"))
    }

    /// Gets a session by id.
    pub async fn get_session(&self, session_id: i64) -> EngineResult<StocktakingSession> {
        fetch_session(&self.pool, session_id)
            .await?
            .ok_or_else(|| CoreError::not_found("StocktakingSession", session_id).into())
    }

    /// The store's session in progress, if any.
    pub async fn active_session(&self, store_id: i64) -> EngineResult<Option<StocktakingSession>> {
        Ok(fetch_open_session(&self.pool, store_id).await?)
    }

    /// Items of a session, by product id.
    pub async fn list_items(&self, session_id: i64) -> EngineResult<Vec<StocktakingItem>> {
        self.get_session(session_id).await?;
        Ok(fetch_items(&self.pool, session_id).await?)
    }

    /// Counted / total items.
    pub async fn progress(&self, session_id: i64) -> EngineResult<StocktakeProgress> {
        let items = self.list_items(session_id).await?;
        Ok(StocktakeProgress::from_items(&items))
    }

    /// Over / under / exact counts over counted items.
    pub async fn discrepancies(&self, session_id: i64) -> EngineResult<DiscrepancySummary> {
        let items = self.list_items(session_id).await?;
        Ok(DiscrepancySummary::from_items(&items))
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Loads a session, checks the actor may work on its store, and requires it
/// to be in progress.
async fn open_session_for(
    conn: &mut SqliteConnection,
    actor: &Actor,
    session_id: i64,
    action: &str,
) -> EngineResult<StocktakingSession> {
    let session = fetch_session(&mut *conn, session_id)
        .await?
        .ok_or_else(|| CoreError::not_found("StocktakingSession", session_id))?;

    actor.require_employee_for(session.store_id, action)?;
    session.ensure_open()?;
    Ok(session)
}

async fn fetch_session<'e, E>(executor: E, session_id: i64) -> Result<Option<StocktakingSession>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, StocktakingSession>(
        r#"
        SELECT id, store_id, created_by, completed_by, status, notes, started_at, completed_at
        FROM stocktaking_sessions
        WHERE id = ?1
        "#,
    )
    .bind(session_id)
    .fetch_optional(executor)
    .await
}

async fn fetch_open_session<'e, E>(executor: E, store_id: i64) -> Result<Option<StocktakingSession>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, StocktakingSession>(
        r#"
        SELECT id, store_id, created_by, completed_by, status, notes, started_at, completed_at
        FROM stocktaking_sessions
        WHERE store_id = ?1 AND status = 'in_progress'
        "#,
    )
    .bind(store_id)
    .fetch_optional(executor)
    .await
}

async fn fetch_item<'e, E>(executor: E, item_id: i64) -> Result<Option<StocktakingItem>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, StocktakingItem>(
        r#"
        SELECT id, session_id, product_id, system_quantity, actual_quantity,
               difference, notes, is_counted
        FROM stocktaking_items
        WHERE id = ?1
        "#,
    )
    .bind(item_id)
    .fetch_optional(executor)
    .await
}

async fn fetch_items<'e, E>(executor: E, session_id: i64) -> Result<Vec<StocktakingItem>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, StocktakingItem>(
        r#"
        SELECT id, session_id, product_id, system_quantity, actual_quantity,
               difference, notes, is_counted
        FROM stocktaking_items
        WHERE session_id = ?1
        ORDER BY product_id
        "#,
    )
    .bind(session_id)
    .fetch_all(executor)
    .await
}
