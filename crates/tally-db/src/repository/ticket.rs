//! # Ticket Repository
//!
//! Ticket issue, lookup, and redemption.
//!
//! ## Two Redemption Paths
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  redeem_self_service(member, ticket, qty)                               │
//! │       member redeems their own ticket, unattended                       │
//! │       logs: staff_id = NULL, store_id = NULL                            │
//! │                                                                         │
//! │  redeem_at_counter(staff, ticket, member, store, qty)                   │
//! │       staff redeems on the member's behalf at their store               │
//! │       logs: staff_id = staff, store_id = store                          │
//! │                                                                         │
//! │  Both:                                                                  │
//! │   BEGIN IMMEDIATE ──► read ticket ──► owner check (NotFound)            │
//! │        ──► plan_redemption (status, uses, expiry, cooldown, balance)    │
//! │        ──► UPDATE ticket ──► INSERT qty × redemption_logs ──► COMMIT    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The write lock is held from the first read, so two concurrent redemptions
//! of the same ticket are serialized and the second one sees the first one's
//! decrement and cooldown.

use chrono::{DateTime, Utc};
use sqlx::{Executor, Sqlite, SqlitePool};
use tracing::{debug, info};

use super::begin_write;
use super::catalog::store_exists;
use crate::error::EngineResult;
use tally_core::validation::{validate_free_text, validate_ticket_uses};
use tally_core::{Actor, CoreError, Redemption, RedemptionLog, Ticket, TicketStatus, ValidationError};

/// Who performs a redemption, already checked against the actor.
#[derive(Debug, Clone, Copy)]
struct Redeemer {
    member_id: i64,
    staff_id: Option<i64>,
    store_id: Option<i64>,
}

/// Repository for tickets and redemption logs.
#[derive(Debug, Clone)]
pub struct TicketRepository {
    pool: SqlitePool,
}

impl TicketRepository {
    /// Creates a new TicketRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TicketRepository { pool }
    }

    /// Issues a ticket to a member.
    ///
    /// Purchasing is handled elsewhere; this is the seeding entry point.
    pub async fn issue(
        &self,
        member_id: i64,
        ticket_type: &str,
        uses: i64,
        expires_at: DateTime<Utc>,
    ) -> EngineResult<Ticket> {
        let ticket_type = validate_free_text("ticket_type", Some(ticket_type))?.ok_or_else(|| {
            ValidationError::Required {
                field: "ticket_type".to_string(),
            }
        })?;
        validate_ticket_uses(uses)?;

        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO tickets (member_id, ticket_type, remaining_uses, status, expires_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(member_id)
        .bind(&ticket_type)
        .bind(uses)
        .bind(TicketStatus::Active)
        .bind(expires_at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let ticket = Ticket {
            id: result.last_insert_rowid(),
            member_id,
            ticket_type,
            remaining_uses: uses,
            status: TicketStatus::Active,
            expires_at,
            last_redeemed_at: None,
            created_at: now,
        };

        info!(ticket_id = ticket.id, member_id, uses, "Ticket issued");
        Ok(ticket)
    }

    /// Gets a ticket by id.
    pub async fn get(&self, ticket_id: i64) -> EngineResult<Ticket> {
        fetch_ticket(&self.pool, ticket_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Ticket", ticket_id).into())
    }

    /// All tickets of a member, newest first.
    pub async fn list_for_member(&self, member_id: i64) -> EngineResult<Vec<Ticket>> {
        let tickets = sqlx::query_as::<_, Ticket>(
            r#"
            SELECT id, member_id, ticket_type, remaining_uses, status, expires_at,
                   last_redeemed_at, created_at
            FROM tickets
            WHERE member_id = ?1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(member_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(tickets)
    }

    /// Audit rows of a ticket, oldest first.
    pub async fn redemption_logs(&self, ticket_id: i64) -> EngineResult<Vec<RedemptionLog>> {
        let logs = sqlx::query_as::<_, RedemptionLog>(
            r#"
            SELECT id, ticket_id, member_id, staff_id, store_id, redeemed_at
            FROM redemption_logs
            WHERE ticket_id = ?1
            ORDER BY id
            "#,
        )
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(logs)
    }

    /// A member redeems their own ticket.
    pub async fn redeem_self_service(
        &self,
        actor: &Actor,
        ticket_id: i64,
        quantity: i64,
    ) -> EngineResult<Redemption> {
        self.redeem_self_service_at(actor, ticket_id, quantity, Utc::now())
            .await
    }

    /// [`redeem_self_service`](Self::redeem_self_service) with an explicit clock.
    pub async fn redeem_self_service_at(
        &self,
        actor: &Actor,
        ticket_id: i64,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> EngineResult<Redemption> {
        let result = match actor.require_member("redeem tickets") {
            Ok(member_id) => {
                let redeemer = Redeemer {
                    member_id,
                    staff_id: None,
                    store_id: None,
                };
                self.redeem(redeemer, ticket_id, quantity, now).await
            }
            Err(err) => Err(err.into()),
        };

        result.inspect_err(|e| e.log("redeem_self_service"))
    }

    /// Staff redeem a member's ticket at their store.
    pub async fn redeem_at_counter(
        &self,
        actor: &Actor,
        ticket_id: i64,
        member_id: i64,
        store_id: i64,
        quantity: i64,
    ) -> EngineResult<Redemption> {
        self.redeem_at_counter_at(actor, ticket_id, member_id, store_id, quantity, Utc::now())
            .await
    }

    /// [`redeem_at_counter`](Self::redeem_at_counter) with an explicit clock.
    pub async fn redeem_at_counter_at(
        &self,
        actor: &Actor,
        ticket_id: i64,
        member_id: i64,
        store_id: i64,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> EngineResult<Redemption> {
        let result = match actor.require_employee_for(store_id, "redeem tickets") {
            Ok(()) => {
                let redeemer = Redeemer {
                    member_id,
                    staff_id: Some(actor.id),
                    store_id: Some(store_id),
                };
                self.redeem(redeemer, ticket_id, quantity, now).await
            }
            Err(err) => Err(err.into()),
        };

        result.inspect_err(|e| e.log("redeem_at_counter"))
    }

    async fn redeem(
        &self,
        redeemer: Redeemer,
        ticket_id: i64,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> EngineResult<Redemption> {
        debug!(ticket_id, member_id = redeemer.member_id, quantity, "Redeeming ticket");

        let mut tx = begin_write(&self.pool).await?;

        if let Some(store_id) = redeemer.store_id {
            if !store_exists(&mut *tx, store_id).await? {
                return Err(CoreError::not_found("Store", store_id).into());
            }
        }

        // A ticket owned by someone else is reported exactly like a missing one.
        let ticket = fetch_ticket(&mut *tx, ticket_id)
            .await?
            .filter(|t| t.member_id == redeemer.member_id)
            .ok_or_else(|| CoreError::not_found("Ticket", ticket_id))?;

        let plan = ticket.plan_redemption(quantity, now)?;

        sqlx::query(
            r#"
            UPDATE tickets
            SET remaining_uses = ?2, status = ?3, last_redeemed_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(ticket.id)
        .bind(plan.remaining_after)
        .bind(plan.status_after)
        .bind(plan.redeemed_at)
        .execute(&mut *tx)
        .await?;

        // One audit row per unit consumed, all with the same timestamp.
        let mut log_ids = Vec::with_capacity(plan.quantity as usize);
        for _ in 0..plan.quantity {
            let result = sqlx::query(
                r#"
                INSERT INTO redemption_logs (ticket_id, member_id, staff_id, store_id, redeemed_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(ticket.id)
            .bind(ticket.member_id)
            .bind(redeemer.staff_id)
            .bind(redeemer.store_id)
            .bind(plan.redeemed_at)
            .execute(&mut *tx)
            .await?;
            log_ids.push(result.last_insert_rowid());
        }

        tx.commit().await?;

        info!(
            ticket_id,
            member_id = ticket.member_id,
            staff_id = ?redeemer.staff_id,
            quantity = plan.quantity,
            remaining = plan.remaining_after,
            status = ?plan.status_after,
            "Ticket redeemed"
        );

        Ok(Redemption {
            ticket: Ticket {
                remaining_uses: plan.remaining_after,
                status: plan.status_after,
                last_redeemed_at: Some(plan.redeemed_at),
                ..ticket
            },
            quantity: plan.quantity,
            redeemed_at: plan.redeemed_at,
            log_ids,
        })
    }
}

async fn fetch_ticket<'e, E>(executor: E, ticket_id: i64) -> Result<Option<Ticket>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Ticket>(
        r#"
        SELECT id, member_id, ticket_type, remaining_uses, status, expires_at,
               last_redeemed_at, created_at
        FROM tickets
        WHERE id = ?1
        "#,
    )
    .bind(ticket_id)
    .fetch_optional(executor)
    .await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use tally_core::NotRedeemableReason;

    use super::*;
    use crate::testing::{test_db, Fixture};
    use crate::EngineError;

    fn in_days(days: i64) -> DateTime<Utc> {
        Utc::now() + Duration::days(days)
    }

    #[tokio::test]
    async fn test_redeem_all_uses_marks_used_and_logs_per_unit() {
        let t = test_db().await;
        let f = Fixture::new(&t.db).await;
        let tickets = t.db.tickets();
        let ticket = tickets.issue(f.member.id, "Sauna 2-pack", 2, in_days(30)).await.unwrap();

        let redemption = tickets
            .redeem_at_counter(&f.staff, ticket.id, f.member.id, f.store.id, 2)
            .await
            .unwrap();
        assert_eq!(redemption.ticket.remaining_uses, 0);
        assert_eq!(redemption.ticket.status, TicketStatus::Used);
        assert_eq!(redemption.log_ids.len(), 2);

        let logs = tickets.redemption_logs(ticket.id).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].redeemed_at, logs[1].redeemed_at);
        assert_eq!(logs[0].redeemed_at, redemption.redeemed_at);
        assert_eq!(logs[0].staff_id, Some(f.staff.id));
        assert_eq!(logs[0].store_id, Some(f.store.id));

        let stored = tickets.get(ticket.id).await.unwrap();
        assert_eq!(stored.status, TicketStatus::Used);
        assert_eq!(stored.last_redeemed_at, Some(redemption.redeemed_at));

        // Used tickets stay used, even after the cooldown
        let later = redemption.redeemed_at + Duration::minutes(10);
        let err = tickets
            .redeem_self_service_at(&f.member, ticket.id, 1, later)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Business(CoreError::NotRedeemable {
                reason: NotRedeemableReason::Inactive,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_self_service_logs_without_staff_or_store() {
        let t = test_db().await;
        let f = Fixture::new(&t.db).await;
        let tickets = t.db.tickets();
        let ticket = tickets.issue(f.member.id, "Yoga 10", 10, in_days(30)).await.unwrap();

        let redemption = tickets.redeem_self_service(&f.member, ticket.id, 1).await.unwrap();
        assert_eq!(redemption.ticket.remaining_uses, 9);
        assert_eq!(redemption.ticket.status, TicketStatus::Active);

        let logs = tickets.redemption_logs(ticket.id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].staff_id, None);
        assert_eq!(logs[0].store_id, None);
        assert_eq!(logs[0].member_id, f.member.id);
    }

    #[tokio::test]
    async fn test_cooldown_countdown_then_release() {
        let t = test_db().await;
        let f = Fixture::new(&t.db).await;
        let tickets = t.db.tickets();
        let ticket = tickets.issue(f.member.id, "Gym 10", 10, in_days(30)).await.unwrap();

        let t0 = Utc::now();
        tickets.redeem_self_service_at(&f.member, ticket.id, 1, t0).await.unwrap();

        let mut previous = i64::MAX;
        for elapsed in [1, 60, 180, 299] {
            let err = tickets
                .redeem_self_service_at(&f.member, ticket.id, 1, t0 + Duration::seconds(elapsed))
                .await
                .unwrap_err();
            match err {
                EngineError::Business(CoreError::InCooldown { remaining_seconds, .. }) => {
                    assert!(remaining_seconds < previous);
                    assert!(remaining_seconds >= 1);
                    previous = remaining_seconds;
                }
                other => panic!("expected cooldown, got {other}"),
            }
        }

        let ok = tickets
            .redeem_self_service_at(&f.member, ticket.id, 1, t0 + Duration::seconds(300))
            .await
            .unwrap();
        assert_eq!(ok.ticket.remaining_uses, 8);
        // Rejected attempts wrote nothing
        assert_eq!(tickets.redemption_logs(ticket.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rejections() {
        let t = test_db().await;
        let f = Fixture::new(&t.db).await;
        let tickets = t.db.tickets();
        let ticket = tickets.issue(f.member.id, "Spa 3", 3, in_days(1)).await.unwrap();

        // Someone else's ticket looks missing
        let err = tickets
            .redeem_self_service(&Actor::member(f.member.id + 1), ticket.id, 1)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");

        let err = tickets.redeem_self_service(&f.member, ticket.id, 4).await.unwrap_err();
        assert_eq!(err.code(), "QUANTITY_EXCEEDS_BALANCE");

        let err = tickets
            .redeem_self_service(&f.member, ticket.id, tally_core::MAX_TICKET_USES + 1)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let err = tickets
            .redeem_self_service_at(&f.member, ticket.id, 1, in_days(2))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Business(CoreError::NotRedeemable {
                reason: NotRedeemableReason::Expired,
                ..
            })
        ));

        // Wrong roles and stores
        let err = tickets.redeem_self_service(&f.staff, ticket.id, 1).await.unwrap_err();
        assert_eq!(err.code(), "ACTOR_NOT_PERMITTED");
        let err = tickets
            .redeem_at_counter(&f.member, ticket.id, f.member.id, f.store.id, 1)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ACTOR_NOT_PERMITTED");
        let err = tickets
            .redeem_at_counter(&Actor::staff(11, f.store.id + 1), ticket.id, f.member.id, f.store.id, 1)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ACTOR_NOT_PERMITTED");

        let untouched = tickets.get(ticket.id).await.unwrap();
        assert_eq!(untouched.remaining_uses, 3);
        assert!(untouched.last_redeemed_at.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_redemptions_do_not_double_spend() {
        let t = test_db().await;
        let f = Fixture::new(&t.db).await;
        let tickets = Arc::new(t.db.tickets());
        let ticket = tickets.issue(f.member.id, "Single", 1, in_days(30)).await.unwrap();
        let ticket_id = ticket.id;

        let now = Utc::now();
        let mut handles = Vec::new();
        for _ in 0..4 {
            let tickets = Arc::clone(&tickets);
            let member = f.member;
            handles.push(tokio::spawn(async move {
                tickets.redeem_self_service_at(&member, ticket_id, 1, now).await
            }));
        }

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(err) => assert!(err.is_business(), "unexpected: {err}"),
            }
        }

        assert_eq!(successes, 1);
        let stored = tickets.get(ticket.id).await.unwrap();
        assert_eq!(stored.remaining_uses, 0);
        assert_eq!(stored.status, TicketStatus::Used);
        assert_eq!(tickets.redemption_logs(ticket.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_issue_and_list() {
        let t = test_db().await;
        let tickets = t.db.tickets();
        tickets.issue(7, "A", 1, in_days(1)).await.unwrap();
        tickets.issue(7, "B", 5, in_days(1)).await.unwrap();
        tickets.issue(8, "C", 5, in_days(1)).await.unwrap();

        assert_eq!(tickets.list_for_member(7).await.unwrap().len(), 2);
        assert!(tickets.issue(7, "", 1, in_days(1)).await.is_err());
        assert!(tickets.issue(7, "D", 0, in_days(1)).await.is_err());
        assert!(tickets.issue(7, "E", tally_core::MAX_TICKET_USES, in_days(1)).await.is_ok());
        let err = tickets
            .issue(7, "F", tally_core::MAX_TICKET_USES + 1, in_days(1))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(tickets.list_for_member(7).await.unwrap().len(), 3);
        assert_eq!(tickets.get(999).await.unwrap_err().code(), "NOT_FOUND");
    }
}
