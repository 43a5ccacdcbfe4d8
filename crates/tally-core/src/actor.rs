//! # Actor
//!
//! The caller identity, resolved once at the request boundary and passed
//! explicitly into every engine operation.
//!
//! ## Resolution
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Request boundary (HTTP handler, desktop command, CLI)                  │
//! │       │                                                                 │
//! │       │  staff session?  → Actor::staff(id, store)                      │
//! │       │  admin session?  → Actor::admin(id)                             │
//! │       │  member session? → Actor::member(id)                            │
//! │       ▼                                                                 │
//! │  Engine call(actor, ...)                                                │
//! │       │                                                                 │
//! │       └── never re-derives identity, only asks the Actor               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};

/// The role an actor acts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    /// Store employee, bound to one store.
    Staff,
    /// Back-office administrator, may act on any store.
    Admin,
    /// Member using the storefront or self-service flows.
    Member,
}

/// Who is calling the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Actor {
    pub kind: ActorKind,
    pub id: i64,
    /// Home store for staff. `None` for admins and members.
    pub store_id: Option<i64>,
}

impl Actor {
    /// A staff member working at `store_id`.
    pub const fn staff(id: i64, store_id: i64) -> Self {
        Actor {
            kind: ActorKind::Staff,
            id,
            store_id: Some(store_id),
        }
    }

    /// An administrator.
    pub const fn admin(id: i64) -> Self {
        Actor {
            kind: ActorKind::Admin,
            id,
            store_id: None,
        }
    }

    /// A member.
    pub const fn member(id: i64) -> Self {
        Actor {
            kind: ActorKind::Member,
            id,
            store_id: None,
        }
    }

    /// True for staff and admins.
    pub fn is_employee(&self) -> bool {
        matches!(self.kind, ActorKind::Staff | ActorKind::Admin)
    }

    /// Requires an employee allowed to operate `store_id`.
    ///
    /// Admins may operate any store. Staff only their own; staff without a
    /// store binding may operate none.
    pub fn require_employee_for(&self, store_id: i64, action: &str) -> CoreResult<()> {
        match self.kind {
            ActorKind::Admin => Ok(()),
            ActorKind::Staff if self.store_id == Some(store_id) => Ok(()),
            _ => Err(CoreError::not_permitted(
                self.id,
                format!("{} at store {}", action, store_id),
            )),
        }
    }

    /// Requires a member actor and returns the member id.
    pub fn require_member(&self, action: &str) -> CoreResult<i64> {
        match self.kind {
            ActorKind::Member => Ok(self.id),
            _ => Err(CoreError::not_permitted(self.id, action)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staff_bound_to_store() {
        let staff = Actor::staff(10, 1);
        assert!(staff.require_employee_for(1, "sell").is_ok());
        assert!(matches!(
            staff.require_employee_for(2, "sell"),
            Err(CoreError::ActorNotPermitted { actor_id: 10, .. })
        ));
    }

    #[test]
    fn test_admin_any_store() {
        let admin = Actor::admin(1);
        assert!(admin.require_employee_for(1, "count").is_ok());
        assert!(admin.require_employee_for(99, "count").is_ok());
        assert!(admin.is_employee());
    }

    #[test]
    fn test_member_rules() {
        let member = Actor::member(7);
        assert!(!member.is_employee());
        assert_eq!(member.require_member("redeem").unwrap(), 7);
        assert!(member.require_employee_for(1, "count").is_err());
        assert!(Actor::staff(3, 1).require_member("redeem").is_err());
    }
}
