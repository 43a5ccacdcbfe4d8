//! # Tickets
//!
//! A ticket is a pre-purchased bundle of uses tied to a member. This module
//! holds the eligibility and cooldown rules; `tally-db` applies them inside a
//! locked transaction.
//!
//! ## Redemption Decision
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  plan_redemption(quantity, now)                                         │
//! │       │                                                                 │
//! │       ├── status != active        → NotRedeemable(Inactive)             │
//! │       ├── remaining_uses == 0     → NotRedeemable(Exhausted)            │
//! │       ├── expires_at <= now       → NotRedeemable(Expired)              │
//! │       ├── now - last < 5 min      → InCooldown(remaining_seconds)       │
//! │       ├── quantity > remaining    → QuantityExceedsBalance              │
//! │       │                                                                 │
//! │       └── RedemptionPlan { remaining_after, status_after, now }         │
//! │              remaining_after == 0  ⇒  status_after = Used               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, NotRedeemableReason};
use crate::validation::validate_redeem_quantity;

/// Minimum interval between two redemptions of the same ticket.
pub const REDEMPTION_COOLDOWN_SECS: i64 = 5 * 60;

/// [`REDEMPTION_COOLDOWN_SECS`] as a chrono duration.
pub fn redemption_cooldown() -> Duration {
    Duration::seconds(REDEMPTION_COOLDOWN_SECS)
}

// =============================================================================
// Ticket Status
// =============================================================================

/// Lifecycle status of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Active,
    /// All uses consumed. Implies `remaining_uses == 0`.
    Used,
    Expired,
}

// =============================================================================
// Ticket
// =============================================================================

/// A member's ticket.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Ticket {
    pub id: i64,
    pub member_id: i64,
    pub ticket_type: String,
    pub remaining_uses: i64,
    pub status: TicketStatus,
    #[ts(as = "String")]
    pub expires_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub last_redeemed_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// The state a ticket moves to after a successful redemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedemptionPlan {
    pub quantity: i64,
    pub remaining_after: i64,
    pub status_after: TicketStatus,
    pub redeemed_at: DateTime<Utc>,
}

impl Ticket {
    /// Eligibility predicate, reporting the first failing condition.
    pub fn check_redeemable(&self, now: DateTime<Utc>) -> Result<(), NotRedeemableReason> {
        if self.status != TicketStatus::Active {
            return Err(NotRedeemableReason::Inactive);
        }
        if self.remaining_uses <= 0 {
            return Err(NotRedeemableReason::Exhausted);
        }
        if self.expires_at <= now {
            return Err(NotRedeemableReason::Expired);
        }
        Ok(())
    }

    /// `status == active AND remaining_uses > 0 AND expires_at > now`.
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        self.check_redeemable(now).is_ok()
    }

    /// Seconds left until the next redemption is allowed, or `None` when the
    /// ticket is not cooling down.
    ///
    /// Rounded up, so a ticket that is still cooling down never reports 0.
    pub fn cooldown_remaining_secs(&self, now: DateTime<Utc>) -> Option<i64> {
        let last = self.last_redeemed_at?;
        let ready_at = last + redemption_cooldown();
        if now >= ready_at {
            return None;
        }

        let millis = (ready_at - now).num_milliseconds();
        Some((millis + 999) / 1000)
    }

    /// Decides whether `quantity` uses can be redeemed at `now`.
    pub fn plan_redemption(&self, quantity: i64, now: DateTime<Utc>) -> CoreResult<RedemptionPlan> {
        validate_redeem_quantity(quantity)?;

        self.check_redeemable(now)
            .map_err(|reason| CoreError::NotRedeemable {
                ticket_id: self.id,
                reason,
            })?;

        if let Some(remaining_seconds) = self.cooldown_remaining_secs(now) {
            return Err(CoreError::InCooldown {
                ticket_id: self.id,
                remaining_seconds,
            });
        }

        if quantity > self.remaining_uses {
            return Err(CoreError::QuantityExceedsBalance {
                ticket_id: self.id,
                remaining: self.remaining_uses,
                requested: quantity,
            });
        }

        let remaining_after = self.remaining_uses - quantity;
        let status_after = if remaining_after <= 0 {
            TicketStatus::Used
        } else {
            TicketStatus::Active
        };

        Ok(RedemptionPlan {
            quantity,
            remaining_after,
            status_after,
            redeemed_at: now,
        })
    }
}

// =============================================================================
// Redemption Log
// =============================================================================

/// Append-only audit row, one per unit of use consumed.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct RedemptionLog {
    pub id: i64,
    pub ticket_id: i64,
    pub member_id: i64,
    /// `None` for self-service redemption.
    pub staff_id: Option<i64>,
    pub store_id: Option<i64>,
    #[ts(as = "String")]
    pub redeemed_at: DateTime<Utc>,
}

/// Result of a committed redemption.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Redemption {
    pub ticket: Ticket,
    pub quantity: i64,
    #[ts(as = "String")]
    pub redeemed_at: DateTime<Utc>,
    pub log_ids: Vec<i64>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn ticket(remaining: i64, status: TicketStatus) -> Ticket {
        Ticket {
            id: 1,
            member_id: 7,
            ticket_type: "10-visit pass".to_string(),
            remaining_uses: remaining,
            status,
            expires_at: now() + Duration::days(30),
            last_redeemed_at: None,
            created_at: now() - Duration::days(1),
        }
    }

    #[test]
    fn test_redeem_all_uses_marks_used() {
        let plan = ticket(2, TicketStatus::Active).plan_redemption(2, now()).unwrap();
        assert_eq!(plan.remaining_after, 0);
        assert_eq!(plan.status_after, TicketStatus::Used);
        assert_eq!(plan.redeemed_at, now());
    }

    #[test]
    fn test_partial_redeem_stays_active() {
        let plan = ticket(5, TicketStatus::Active).plan_redemption(1, now()).unwrap();
        assert_eq!(plan.remaining_after, 4);
        assert_eq!(plan.status_after, TicketStatus::Active);
    }

    #[test]
    fn test_not_redeemable_reasons_in_order() {
        let t = ticket(0, TicketStatus::Used);
        assert_eq!(t.check_redeemable(now()), Err(NotRedeemableReason::Inactive));

        let t = ticket(0, TicketStatus::Active);
        assert_eq!(t.check_redeemable(now()), Err(NotRedeemableReason::Exhausted));

        let mut t = ticket(3, TicketStatus::Active);
        t.expires_at = now();
        assert_eq!(t.check_redeemable(now()), Err(NotRedeemableReason::Expired));
        assert!(!t.is_redeemable(now()));

        let err = t.plan_redemption(1, now()).unwrap_err();
        assert!(matches!(
            err,
            CoreError::NotRedeemable { reason: NotRedeemableReason::Expired, .. }
        ));
    }

    #[test]
    fn test_quantity_exceeds_balance() {
        let err = ticket(2, TicketStatus::Active).plan_redemption(3, now()).unwrap_err();
        assert!(matches!(
            err,
            CoreError::QuantityExceedsBalance { remaining: 2, requested: 3, .. }
        ));
    }

    #[test]
    fn test_zero_quantity_is_validation_error() {
        let err = ticket(2, TicketStatus::Active).plan_redemption(0, now()).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_cooldown_counts_down_strictly() {
        let mut t = ticket(5, TicketStatus::Active);
        t.last_redeemed_at = Some(now());

        let mut previous = i64::MAX;
        for elapsed in [0, 1, 30, 120, 299] {
            let at = now() + Duration::seconds(elapsed);
            let remaining = t.cooldown_remaining_secs(at).unwrap();
            assert!(remaining < previous, "elapsed={}", elapsed);
            assert!(remaining >= 1);
            previous = remaining;

            assert!(matches!(
                t.plan_redemption(1, at),
                Err(CoreError::InCooldown { remaining_seconds, .. }) if remaining_seconds == remaining
            ));
        }

        assert_eq!(t.cooldown_remaining_secs(now()), Some(300));
        assert_eq!(t.cooldown_remaining_secs(now() + Duration::seconds(300)), None);
        assert!(t.plan_redemption(1, now() + Duration::seconds(300)).is_ok());
    }

    #[test]
    fn test_cooldown_rounds_up_sub_second() {
        let mut t = ticket(5, TicketStatus::Active);
        t.last_redeemed_at = Some(now());
        let at = now() + Duration::milliseconds(299_500);
        assert_eq!(t.cooldown_remaining_secs(at), Some(1));
    }

    #[test]
    fn test_eligibility_checked_before_cooldown() {
        let mut t = ticket(0, TicketStatus::Active);
        t.last_redeemed_at = Some(now());
        assert!(matches!(
            t.plan_redemption(1, now()),
            Err(CoreError::NotRedeemable { reason: NotRedeemableReason::Exhausted, .. })
        ));
    }
}
