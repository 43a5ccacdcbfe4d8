//! # tally-core: Pure Business Logic for the Settlement Engine
//!
//! Everything in this crate is deterministic: no database, no network, no
//! wall clock. Time-dependent rules receive `now` from the caller.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally POS Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │      Callers: staff terminal, storefront, back office           │   │
//! │  │      (resolve the Actor once, then call the engine)             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    tally-db (engine)                            │   │
//! │  │   transactions, row locks, ledger writes, audit rows            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ uses                                   │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │  ┌─────────┐ ┌──────────┐ ┌──────────┐ ┌─────────┐ ┌────────┐  │   │
//! │  │  │  money  │ │settlement│ │  ticket  │ │stocktake│ │ actor  │  │   │
//! │  │  │ TaxSplit│ │ cart/tax │ │ cooldown │ │ counts  │ │ roles  │  │   │
//! │  │  └─────────┘ └──────────┘ └──────────┘ └─────────┘ └────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Catalog, stock entry, order types
//! - [`money`] - Integer money and inclusive tax extraction
//! - [`actor`] - Explicit caller identity
//! - [`settlement`] - Cart normalization, parties, totals
//! - [`ticket`] - Ticket eligibility and cooldown
//! - [`stocktake`] - Session state, counts, discrepancies
//! - [`validation`] - Input validation
//! - [`error`] - Domain error types

// =============================================================================
// Module Declarations
// =============================================================================

pub mod actor;
pub mod error;
pub mod money;
pub mod settlement;
pub mod stocktake;
pub mod ticket;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use actor::{Actor, ActorKind};
pub use error::{CoreError, CoreResult, NotRedeemableReason, ValidationError};
pub use money::{Money, TaxSplit};
pub use settlement::{CartLine, SettlementRequest};
pub use stocktake::{
    DiscrepancySummary, SessionStatus, StocktakeCompletion, StocktakeProgress, StocktakingItem,
    StocktakingSession,
};
pub use ticket::{Redemption, RedemptionLog, Ticket, TicketStatus};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Consumption tax contained in every price (10%).
///
/// Prices are tax-inclusive; this rate is only used to extract the tax
/// portion for display.
pub const INCLUSIVE_TAX_RATE: TaxRate = TaxRate::from_bps(1000);

/// Maximum distinct lines in a single cart.
pub const MAX_CART_LINES: usize = 100;

/// Maximum quantity of a single product in one cart.
pub const MAX_LINE_QUANTITY: i64 = 999;

/// Maximum catalog price of one unit, in minor units.
pub const MAX_UNIT_PRICE: i64 = 100_000_000;

/// Maximum uses a single ticket can carry.
pub const MAX_TICKET_USES: i64 = 999;

/// Maximum length of free-text fields (notes, staff code, coupon code).
pub const MAX_FREE_TEXT_LEN: usize = 500;
