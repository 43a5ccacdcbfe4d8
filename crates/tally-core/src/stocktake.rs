//! # Stocktaking
//!
//! Session state machine, count recording, and discrepancy math.
//!
//! ## Session State Machine
//! ```text
//!                  start()
//!                     │
//!                     ▼
//!              ┌─────────────┐  record_count() / scan_barcode()
//!              │ in_progress │◄──────────────┐
//!              └──────┬──────┘───────────────┘
//!          complete() │          │ cancel()
//!                     ▼          ▼
//!              ┌───────────┐ ┌───────────┐
//!              │ completed │ │ cancelled │     (terminal, no reopening)
//!              └───────────┘ └───────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::validation::{validate_counted_quantity, validate_free_text};

// =============================================================================
// Session
// =============================================================================

/// Status of a stocktaking session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Completed,
    Cancelled,
}

impl SessionStatus {
    /// Storage/display label.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
        }
    }
}

/// A bounded counting session for one store.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StocktakingSession {
    pub id: i64,
    pub store_id: i64,
    pub created_by: i64,
    pub completed_by: Option<i64>,
    pub status: SessionStatus,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub started_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl StocktakingSession {
    /// Fails with `SessionClosed` unless the session is in progress.
    pub fn ensure_open(&self) -> CoreResult<()> {
        if self.status != SessionStatus::InProgress {
            return Err(CoreError::SessionClosed {
                session_id: self.id,
                status: self.status.as_str().to_string(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Item
// =============================================================================

/// One product in a session snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StocktakingItem {
    pub id: i64,
    pub session_id: i64,
    pub product_id: i64,
    /// Ledger quantity when the session started.
    pub system_quantity: i64,
    /// Physically counted quantity, `None` until counted.
    pub actual_quantity: Option<i64>,
    /// `actual - system`, `None` until counted.
    pub difference: Option<i64>,
    pub notes: Option<String>,
    pub is_counted: bool,
}

/// A validated count, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountEntry {
    pub actual_quantity: i64,
    pub difference: i64,
    pub notes: Option<String>,
}

impl StocktakingItem {
    /// Validates a count against this item's snapshot.
    pub fn count(&self, actual_quantity: i64, notes: Option<&str>) -> CoreResult<CountEntry> {
        validate_counted_quantity(actual_quantity)?;
        let notes = validate_free_text("notes", notes)?;

        Ok(CountEntry {
            actual_quantity,
            difference: actual_quantity - self.system_quantity,
            notes,
        })
    }
}

// =============================================================================
// Progress & Discrepancies
// =============================================================================

/// How far a session has got.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StocktakeProgress {
    pub total_items: i64,
    pub counted_items: i64,
    /// counted / total × 100. Zero for an empty snapshot.
    pub percent: f64,
}

impl StocktakeProgress {
    pub fn from_items(items: &[StocktakingItem]) -> Self {
        let total_items = items.len() as i64;
        let counted_items = items.iter().filter(|i| i.is_counted).count() as i64;
        let percent = if total_items == 0 {
            0.0
        } else {
            counted_items as f64 * 100.0 / total_items as f64
        };

        StocktakeProgress {
            total_items,
            counted_items,
            percent,
        }
    }
}

/// Discrepancies over counted items only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DiscrepancySummary {
    /// Counted more than the system expected.
    pub over_count: i64,
    /// Counted fewer than the system expected.
    pub under_count: i64,
    pub exact_count: i64,
    /// Σ (actual − system), signed.
    pub total_difference: i64,
}

impl DiscrepancySummary {
    pub fn from_items(items: &[StocktakingItem]) -> Self {
        let mut summary = DiscrepancySummary::default();

        for item in items.iter().filter(|i| i.is_counted) {
            let difference = item
                .difference
                .or_else(|| item.actual_quantity.map(|a| a - item.system_quantity))
                .unwrap_or(0);

            match difference {
                d if d > 0 => summary.over_count += 1,
                d if d < 0 => summary.under_count += 1,
                _ => summary.exact_count += 1,
            }
            summary.total_difference += difference;
        }

        summary
    }
}

/// Outcome of completing a session.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StocktakeCompletion {
    pub session: StocktakingSession,
    pub applied_adjustments: bool,
    /// Ledger rows overwritten with counted values.
    pub adjusted_entries: i64,
    pub summary: DiscrepancySummary,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: i64, system: i64, actual: Option<i64>) -> StocktakingItem {
        StocktakingItem {
            id,
            session_id: 1,
            product_id: id,
            system_quantity: system,
            actual_quantity: actual,
            difference: actual.map(|a| a - system),
            notes: None,
            is_counted: actual.is_some(),
        }
    }

    fn session(status: SessionStatus) -> StocktakingSession {
        StocktakingSession {
            id: 3,
            store_id: 1,
            created_by: 10,
            completed_by: None,
            status,
            notes: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    #[test]
    fn test_ensure_open() {
        assert!(session(SessionStatus::InProgress).ensure_open().is_ok());
        assert!(matches!(
            session(SessionStatus::Completed).ensure_open(),
            Err(CoreError::SessionClosed { session_id: 3, ref status }) if status == "completed"
        ));
        assert!(session(SessionStatus::Cancelled).ensure_open().is_err());
    }

    #[test]
    fn test_count_computes_difference() {
        let entry = item(1, 10, None).count(7, Some(" damaged box ")).unwrap();
        assert_eq!(entry.difference, -3);
        assert_eq!(entry.notes.as_deref(), Some("damaged box"));

        assert!(item(1, 10, None).count(-1, None).is_err());
    }

    #[test]
    fn test_progress() {
        let items = vec![item(1, 5, Some(5)), item(2, 5, None), item(3, 5, None), item(4, 5, Some(1))];
        let progress = StocktakeProgress::from_items(&items);
        assert_eq!(progress.total_items, 4);
        assert_eq!(progress.counted_items, 2);
        assert!((progress.percent - 50.0).abs() < f64::EPSILON);

        assert_eq!(StocktakeProgress::from_items(&[]).percent, 0.0);
    }

    #[test]
    fn test_discrepancy_summary_ignores_uncounted() {
        let items = vec![
            item(1, 10, Some(12)),
            item(2, 10, Some(7)),
            item(3, 10, Some(10)),
            item(4, 10, None),
        ];
        let summary = DiscrepancySummary::from_items(&items);
        assert_eq!(
            summary,
            DiscrepancySummary {
                over_count: 1,
                under_count: 1,
                exact_count: 1,
                total_difference: -1,
            }
        );
    }
}
