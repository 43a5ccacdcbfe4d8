//! # Error Types
//!
//! Domain-specific error types for tally-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tally-core errors (this file)                                         │
//! │  ├── CoreError        - Business rule rejections                       │
//! │  └── ValidationError  - Malformed input                                │
//! │                                                                         │
//! │  tally-db errors (separate crate)                                      │
//! │  ├── DbError          - Infrastructure failures                        │
//! │  └── EngineError      - Business(CoreError) | Infrastructure(DbError)  │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → caller              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Business rejections are expected and frequent (empty shelf, cooldown).
//! They carry enough context to render a message without another query.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

// =============================================================================
// Not Redeemable Reason
// =============================================================================

/// Why a ticket failed the eligibility predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum NotRedeemableReason {
    /// Ticket status is not `active`.
    Inactive,
    /// No uses left.
    Exhausted,
    /// `expires_at` has passed.
    Expired,
}

impl fmt::Display for NotRedeemableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotRedeemableReason::Inactive => write!(f, "ticket is not active"),
            NotRedeemableReason::Exhausted => write!(f, "no uses left"),
            NotRedeemableReason::Expired => write!(f, "ticket has expired"),
        }
    }
}

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations raised by the engine.
///
/// Every variant maps to a stable machine-readable code via [`CoreError::code`].
#[derive(Debug, Error)]
pub enum CoreError {
    /// Referenced entity does not exist (or is not visible to the caller).
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Product is inactive or not stocked at this store.
    #[error("Product {product_id} is unavailable at store {store_id}")]
    ProductUnavailable { store_id: i64, product_id: i64 },

    /// Insufficient stock to complete sale.
    ///
    /// ## User Workflow
    /// ```text
    /// Cart line (qty: 5)
    ///      │
    ///      ▼
    /// Locked ledger row: quantity=3
    ///      │
    ///      ▼
    /// InsufficientStock { product_id: 7, available: 3, requested: 5 }
    ///      │
    ///      ▼
    /// Whole settlement rolls back, UI shows "Only 3 left"
    /// ```
    #[error("Insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: i64,
        available: i64,
        requested: i64,
    },

    /// Manual adjustment would take the ledger below zero.
    #[error("Adjusting product {product_id} by {delta} would leave negative stock (current {current})")]
    NegativeStock {
        product_id: i64,
        current: i64,
        delta: i64,
    },

    /// Ticket failed the eligibility predicate.
    #[error("Ticket {ticket_id} cannot be redeemed: {reason}")]
    NotRedeemable {
        ticket_id: i64,
        reason: NotRedeemableReason,
    },

    /// Ticket was redeemed less than the cooldown interval ago.
    #[error("Ticket {ticket_id} is cooling down, try again in {remaining_seconds}s")]
    InCooldown {
        ticket_id: i64,
        remaining_seconds: i64,
    },

    /// Requested more uses than the ticket holds.
    #[error("Ticket {ticket_id} has {remaining} uses left, requested {requested}")]
    QuantityExceedsBalance {
        ticket_id: i64,
        remaining: i64,
        requested: i64,
    },

    /// Store already has an open stocktake.
    #[error("Store {store_id} already has stocktake {session_id} in progress")]
    SessionConflict { store_id: i64, session_id: i64 },

    /// Barcode resolves to a product outside the session snapshot.
    #[error("Barcode {barcode} is not part of stocktake {session_id}")]
    ItemNotInScope { session_id: i64, barcode: String },

    /// Mutation attempted on a completed or cancelled stocktake.
    #[error("Stocktake {session_id} is {status}, no further changes allowed")]
    SessionClosed { session_id: i64, status: String },

    /// The actor's role or store does not allow this operation.
    #[error("Actor {actor_id} is not permitted to {action}")]
    ActorNotPermitted { actor_id: i64, action: String },

    /// Cart has exceeded maximum allowed lines.
    #[error("Cart cannot have more than {max} lines")]
    CartTooLarge { max: usize },

    /// Line quantity exceeds maximum allowed.
    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: i64, max: i64 },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Creates an ActorNotPermitted error.
    pub fn not_permitted(actor_id: i64, action: impl Into<String>) -> Self {
        CoreError::ActorNotPermitted {
            actor_id,
            action: action.into(),
        }
    }

    /// Stable code for logs, metrics, and API payloads.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::NotFound { .. } => "NOT_FOUND",
            CoreError::ProductUnavailable { .. } => "PRODUCT_UNAVAILABLE",
            CoreError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            CoreError::NegativeStock { .. } => "NEGATIVE_STOCK",
            CoreError::NotRedeemable { .. } => "NOT_REDEEMABLE",
            CoreError::InCooldown { .. } => "IN_COOLDOWN",
            CoreError::QuantityExceedsBalance { .. } => "QUANTITY_EXCEEDS_BALANCE",
            CoreError::SessionConflict { .. } => "SESSION_CONFLICT",
            CoreError::ItemNotInScope { .. } => "ITEM_NOT_IN_SCOPE",
            CoreError::SessionClosed { .. } => "SESSION_CLOSED",
            CoreError::ActorNotPermitted { .. } => "ACTOR_NOT_PERMITTED",
            CoreError::CartTooLarge { .. }
            | CoreError::QuantityTooLarge { .. }
            | CoreError::Validation(_) => "VALIDATION_ERROR",
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when caller input doesn't meet requirements.
/// Raised before any transaction is opened.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., invalid UUID, invalid barcode).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
