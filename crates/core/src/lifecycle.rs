//! The order status state machine.
//!
//! [`transition`] runs its checks in a fixed order:
//!
//! 1. visibility: the actor owns the order or holds a staff role, else
//!    `Forbidden`, so outsiders learn nothing about the order's state;
//! 2. re-submitting the current status succeeds without a history entry;
//! 3. the pair must be a lifecycle edge, else `FailedPrecondition`;
//! 4. the actor must hold a role allowed on that edge, else `Forbidden`.
//!
//! Only after all checks pass is the order touched.

use chrono::{DateTime, Utc};

use crate::access::{self, Actor};
use crate::error::DomainError;
use crate::order::{Order, StatusHistoryEntry};
use crate::types::OrderStatus;

/// Move `order` to `to` on behalf of `actor`.
///
/// Returns the history entry to append, or `None` for the no-op
/// self-transition.
///
/// # Errors
///
/// `Forbidden` or `FailedPrecondition` as described in the module docs. On
/// error the order is unchanged.
pub fn transition(
    order: &mut Order,
    to: OrderStatus,
    actor: &Actor,
    note: Option<String>,
    now: DateTime<Utc>,
) -> Result<Option<StatusHistoryEntry>, DomainError> {
    access::authorize_view(actor, order.user_id).into_result(actor)?;

    let from = order.status;
    if from == to {
        return Ok(None);
    }
    if !from.can_transition_to(to) {
        return Err(DomainError::FailedPrecondition(format!(
            "cannot move order from {from} to {to}"
        )));
    }
    access::authorize_transition(actor, order.user_id, from, to).into_result(actor)?;

    order.status = to;
    order.updated_at = now;
    Ok(Some(StatusHistoryEntry::record(
        order.id, to, actor.id, note, now,
    )))
}

/// Cancel an order, recording `reason` on the history entry.
///
/// # Errors
///
/// As [`transition`].
pub fn cancel(
    order: &mut Order,
    actor: &Actor,
    reason: Option<String>,
    now: DateTime<Utc>,
) -> Result<Option<StatusHistoryEntry>, DomainError> {
    transition(order, OrderStatus::Cancelled, actor, reason, now)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::order::{NewOrder, OrderLine, Pricing};
    use crate::types::{
        MenuItemId, Money, OrderNumber, OrderType, PaymentMethod, RestaurantId, Role, RoleSet,
        UserId,
    };

    const OWNER: UserId = UserId::new(1);

    fn placed() -> (Order, Vec<StatusHistoryEntry>) {
        let unit = Money::from_cents(500);
        let line_total = unit.checked_times(2).unwrap();
        let new = NewOrder {
            user_id: OWNER,
            restaurant_id: RestaurantId::new(3),
            delivery_address_id: None,
            order_type: OrderType::Pickup,
            items: vec![OrderLine {
                menu_item_id: MenuItemId::new(7),
                name: "dish".into(),
                quantity: 2,
                unit_price: unit,
                line_total,
                notes: None,
            }],
            pricing: Pricing::derive(line_total, Money::ZERO, Money::ZERO, Money::ZERO).unwrap(),
            payment_method: PaymentMethod::Card,
            special_instructions: None,
            scheduled_time: None,
        };
        let (order, first) = Order::place(new, OrderNumber::from_entropy(9), Utc::now()).unwrap();
        (order, vec![first])
    }

    fn admin() -> Actor {
        Actor::new(UserId::new(99), Role::Admin.into())
    }

    fn owner() -> Actor {
        Actor::new(OWNER, Role::Customer.into())
    }

    /// Apply a transition and append any entry, like a store would.
    fn apply(
        order: &mut Order,
        history: &mut Vec<StatusHistoryEntry>,
        to: OrderStatus,
        actor: &Actor,
    ) -> Result<(), DomainError> {
        if let Some(entry) = transition(order, to, actor, None, Utc::now())? {
            history.push(entry);
        }
        Ok(())
    }

    /// Drive a fresh order to `target` along the happy path (or cancel).
    fn order_at(target: OrderStatus) -> (Order, Vec<StatusHistoryEntry>) {
        let (mut order, mut history) = placed();
        let path: &[OrderStatus] = match target {
            OrderStatus::Pending => &[],
            OrderStatus::Accepted => &[OrderStatus::Accepted],
            OrderStatus::Preparing => &[OrderStatus::Accepted, OrderStatus::Preparing],
            OrderStatus::OutForDelivery => &[
                OrderStatus::Accepted,
                OrderStatus::Preparing,
                OrderStatus::OutForDelivery,
            ],
            OrderStatus::Delivered => &[
                OrderStatus::Accepted,
                OrderStatus::Preparing,
                OrderStatus::OutForDelivery,
                OrderStatus::Delivered,
            ],
            OrderStatus::Cancelled => &[OrderStatus::Cancelled],
        };
        for &step in path {
            apply(&mut order, &mut history, step, &admin()).unwrap();
        }
        (order, history)
    }

    #[test]
    fn test_every_pair_against_the_graph() {
        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                let (mut order, mut history) = order_at(from);
                let before = (order.clone(), history.len());
                let result = apply(&mut order, &mut history, to, &admin());

                if from == to {
                    assert!(result.is_ok());
                    assert_eq!((order, history.len()), before, "{from} -> {to} no-op");
                } else if from.can_transition_to(to) {
                    assert!(result.is_ok(), "{from} -> {to}");
                    assert_eq!(order.status, to);
                    assert_eq!(history.len(), before.1 + 1);
                    assert_eq!(history.last().unwrap().status, to);
                } else {
                    assert!(
                        matches!(result, Err(DomainError::FailedPrecondition(_))),
                        "{from} -> {to}: {result:?}"
                    );
                    assert_eq!((order, history.len()), before);
                }
            }
        }
    }

    #[test]
    fn test_skipping_ahead_is_rejected() {
        let (mut order, mut history) = placed();
        let result = apply(&mut order, &mut history, OrderStatus::OutForDelivery, &admin());
        assert!(matches!(result, Err(DomainError::FailedPrecondition(_))));
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_owner_cancels_accepted_order() {
        let (mut order, mut history) = order_at(OrderStatus::Accepted);
        let before = history.len();

        let entry = cancel(&mut order, &owner(), Some("changed my mind".into()), Utc::now())
            .unwrap()
            .unwrap();
        history.push(entry);

        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(history.len(), before + 1);
        let last = history.last().unwrap();
        assert_eq!(last.actor, OWNER);
        assert_eq!(last.note.as_deref(), Some("changed my mind"));
    }

    #[test]
    fn test_other_customer_cannot_cancel() {
        let (mut order, _) = order_at(OrderStatus::Accepted);
        let before = order.clone();
        let stranger = Actor::new(UserId::new(2), Role::Customer.into());

        assert_eq!(
            cancel(&mut order, &stranger, None, Utc::now()),
            Err(DomainError::Forbidden)
        );
        assert_eq!(order, before);
    }

    #[test]
    fn test_visibility_is_checked_before_legality() {
        // a stranger probing an illegal edge must not learn the status
        let (mut order, _) = order_at(OrderStatus::Delivered);
        let stranger = Actor::new(UserId::new(2), Role::Customer.into());
        assert_eq!(
            transition(&mut order, OrderStatus::Pending, &stranger, None, Utc::now()),
            Err(DomainError::Forbidden)
        );
    }

    #[test]
    fn test_owner_cannot_accept_own_order() {
        let (mut order, _) = placed();
        assert_eq!(
            transition(&mut order, OrderStatus::Accepted, &owner(), None, Utc::now()),
            Err(DomainError::Forbidden)
        );
    }

    #[test]
    fn test_courier_delivers_but_cannot_accept() {
        let courier = Actor::new(UserId::new(5), RoleSet::of(&[Role::Delivery]));
        let (mut order, _) = placed();
        assert_eq!(
            transition(&mut order, OrderStatus::Accepted, &courier, None, Utc::now()),
            Err(DomainError::Forbidden)
        );

        let (mut order, _) = order_at(OrderStatus::Preparing);
        transition(&mut order, OrderStatus::OutForDelivery, &courier, None, Utc::now()).unwrap();
        let entry = transition(&mut order, OrderStatus::Delivered, &courier, None, Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(entry.actor, courier.id);
    }

    #[test]
    fn test_terminal_states_only_allow_noop() {
        for terminal in [OrderStatus::Delivered, OrderStatus::Cancelled] {
            for to in OrderStatus::ALL {
                let (mut order, _) = order_at(terminal);
                let result = transition(&mut order, to, &admin(), None, Utc::now());
                if to == terminal {
                    assert_eq!(result, Ok(None));
                } else {
                    assert!(matches!(result, Err(DomainError::FailedPrecondition(_))));
                }
                assert_eq!(order.status, terminal);
            }
        }
    }
}
