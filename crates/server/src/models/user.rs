//! Local user accounts.
//!
//! The identity provider owns authentication; this table only maps a
//! provider subject to a numeric id, a display name and a role set.

use chrono::{DateTime, Utc};
use serde::Serialize;

use forkline_core::{Actor, Email, RoleSet, UserId};

/// A verified identity, as returned by the token verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Stable external identifier (`sub` claim).
    pub subject: String,
    /// Contact email reported by the provider.
    pub email: Email,
}

/// A local user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub subject: String,
    pub email: Email,
    pub display_name: String,
    pub roles: RoleSet,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// The actor this user acts as in engine calls.
    #[must_use]
    pub const fn actor(&self) -> Actor {
        Actor::new(self.id, self.roles)
    }
}
