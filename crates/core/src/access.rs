//! Role-based access decisions.
//!
//! Every function here is a pure predicate over an [`Actor`] and the facts
//! it needs (an order's owner, a status edge). Denials carry a
//! [`DenyReason`] for logging; [`Decision::into_result`] turns them into a
//! bare [`DomainError::Forbidden`] so the reason never reaches a client.

use serde::Serialize;

use crate::error::DomainError;
use crate::types::{OrderStatus, Role, RoleSet, UserId};

/// The authenticated user on whose behalf an operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Actor {
    pub id: UserId,
    pub roles: RoleSet,
}

impl Actor {
    #[must_use]
    pub const fn new(id: UserId, roles: RoleSet) -> Self {
        Self { id, roles }
    }

    /// Whether the actor holds any staff role.
    #[must_use]
    pub const fn is_staff(&self) -> bool {
        self.roles.intersects(RoleSet::STAFF)
    }
}

/// Why access was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// None of the required roles is held.
    MissingRole { required: RoleSet },
    /// The actor neither owns the resource nor holds a staff role.
    NotOwner,
}

/// Outcome of an access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Map a denial to `Forbidden`, logging the reason at debug level.
    ///
    /// # Errors
    ///
    /// `DomainError::Forbidden` when the decision is a denial.
    pub fn into_result(self, actor: &Actor) -> Result<(), DomainError> {
        match self {
            Self::Allow => Ok(()),
            Self::Deny(reason) => {
                tracing::debug!(actor = %actor.id, ?reason, "access denied");
                Err(DomainError::Forbidden)
            }
        }
    }
}

fn require_any(actor: &Actor, required: RoleSet) -> Decision {
    if has_any_role(actor, required) {
        Decision::Allow
    } else {
        Decision::Deny(DenyReason::MissingRole { required })
    }
}

#[must_use]
pub const fn has_role(actor: &Actor, role: Role) -> bool {
    actor.roles.contains(role)
}

#[must_use]
pub const fn has_any_role(actor: &Actor, roles: RoleSet) -> bool {
    actor.roles.intersects(roles)
}

/// Roles allowed to take a lifecycle edge, and whether the order's owner
/// may take it too. `None` for pairs that are not edges.
#[must_use]
pub const fn edge_permissions(from: OrderStatus, to: OrderStatus) -> Option<(RoleSet, bool)> {
    use OrderStatus::{Accepted, Cancelled, Delivered, OutForDelivery, Pending, Preparing};

    const KITCHEN: RoleSet = RoleSet::of(&[Role::Manager, Role::Admin]);
    const FLEET: RoleSet = RoleSet::of(&[Role::Manager, Role::Delivery, Role::Admin]);

    match (from, to) {
        (Pending, Accepted) | (Accepted, Preparing) => Some((KITCHEN, false)),
        (Preparing, OutForDelivery) | (OutForDelivery, Delivered) => Some((FLEET, false)),
        (Pending | Accepted, Cancelled) => Some((KITCHEN, true)),
        _ => None,
    }
}

/// May the actor see an order owned by `owner`?
#[must_use]
pub const fn authorize_view(actor: &Actor, owner: UserId) -> Decision {
    if actor.id.as_i32() == owner.as_i32() || actor.is_staff() {
        Decision::Allow
    } else {
        Decision::Deny(DenyReason::NotOwner)
    }
}

/// May the actor move an order owned by `owner` from `from` to `to`?
///
/// Pairs that are not lifecycle edges are denied; callers check legality
/// first so those never reach here.
#[must_use]
pub fn authorize_transition(
    actor: &Actor,
    owner: UserId,
    from: OrderStatus,
    to: OrderStatus,
) -> Decision {
    let Some((roles, owner_allowed)) = edge_permissions(from, to) else {
        return Decision::Deny(DenyReason::MissingRole {
            required: RoleSet::EMPTY,
        });
    };
    if owner_allowed && actor.id == owner {
        return Decision::Allow;
    }
    require_any(actor, roles)
}

/// Staff-wide queries such as the order queue.
#[must_use]
pub fn authorize_staff(actor: &Actor) -> Decision {
    require_any(actor, RoleSet::STAFF)
}

/// Setting delivery estimates.
#[must_use]
pub fn authorize_dispatch(actor: &Actor) -> Decision {
    require_any(actor, RoleSet::of(&[Role::Manager, Role::Admin]))
}

/// Role grants, payment settlement and order deletion.
#[must_use]
pub fn authorize_admin(actor: &Actor) -> Decision {
    require_any(actor, Role::Admin.into())
}
