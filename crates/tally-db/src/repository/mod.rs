//! # Repository Module
//!
//! One repository per engine component.
//!
//! ## Write Transactions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Locked Check-Then-Write                              │
//! │                                                                         │
//! │  begin_write(pool)          BEGIN IMMEDIATE                             │
//! │       │                     takes the database write lock up front;     │
//! │       │                     a second writer waits here (busy_timeout)   │
//! │       ▼                                                                 │
//! │  read current rows          sees every commit made before the lock      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  tally-core rule check      InsufficientStock / InCooldown / ...        │
//! │       │                        └── Err → tx dropped → ROLLBACK          │
//! │       ▼                                                                 │
//! │  writes + audit rows                                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT                     lock released, next writer re-reads         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A deferred `BEGIN` would take a shared lock on the first read and fail
//! with SQLITE_BUSY when upgrading to write, so every engine write goes
//! through [`begin_write`].
//!
//! ## Available Repositories
//!
//! - [`CatalogRepository`](catalog::CatalogRepository) - Stores and products
//! - [`StockRepository`](stock::StockRepository) - Stock Ledger
//! - [`SaleRepository`](sale::SaleRepository) - Sale Settlement and receipts
//! - [`TicketRepository`](ticket::TicketRepository) - Ticket Redemption
//! - [`StocktakeRepository`](stocktake::StocktakeRepository) - Stocktaking

use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::error::DbError;

pub mod catalog;
pub mod sale;
pub mod stock;
pub mod stocktake;
pub mod ticket;

/// Opens a transaction holding the database write lock.
pub(crate) async fn begin_write(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>, DbError> {
    pool.begin_with("BEGIN IMMEDIATE").await.map_err(DbError::from)
}
