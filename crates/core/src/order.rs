//! Order factory: validation and immutable order snapshots.
//!
//! An [`Order`] is built once from a [`NewOrder`]. After that only
//! `status`, `payment_status`, `estimated_delivery_time` and `updated_at`
//! change, and only through [`crate::lifecycle`] and the setters here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cart::MenuItemQuote;
use crate::error::DomainError;
use crate::types::{
    AddressId, HistoryEntryId, MenuItemId, Money, OrderId, OrderNumber, OrderStatus, OrderType,
    PaymentMethod, PaymentStatus, RestaurantId, UserId,
};

/// A frozen copy of one ordered item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub menu_item_id: MenuItemId,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Money,
    pub line_total: Money,
    pub notes: Option<String>,
}

impl OrderLine {
    /// Freeze `quantity` units of a quoted menu item sold by `restaurant_id`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the item is unavailable, `InvalidArgument` if the
    /// quantity is below 1, the item belongs to another restaurant, or the
    /// line total is out of range.
    pub fn from_quote(
        quote: &MenuItemQuote,
        restaurant_id: RestaurantId,
        quantity: i32,
        notes: Option<String>,
    ) -> Result<Self, DomainError> {
        if quantity < 1 {
            return Err(DomainError::invalid(
                "quantity",
                format!("menu item {} has quantity {quantity}", quote.id),
            ));
        }
        if !quote.is_available {
            return Err(DomainError::NotFound("menu item"));
        }
        if quote.restaurant_id != restaurant_id {
            return Err(DomainError::invalid(
                "restaurant_id",
                format!("menu item {} is not sold by restaurant {restaurant_id}", quote.id),
            ));
        }
        let line_total = quote
            .price
            .checked_times(quantity)
            .ok_or_else(|| DomainError::invalid("quantity", "line total too large"))?;
        Ok(Self {
            menu_item_id: quote.id,
            name: quote.name.clone(),
            quantity,
            unit_price: quote.price,
            line_total,
            notes,
        })
    }
}

/// Sum of line totals.
///
/// # Errors
///
/// `InvalidArgument` on `subtotal` if the sum is out of range.
pub fn lines_subtotal(lines: &[OrderLine]) -> Result<Money, DomainError> {
    Money::checked_sum(lines.iter().map(|l| l.line_total))
        .ok_or_else(|| DomainError::invalid("subtotal", "too large"))
}

/// Order amounts. `total` must equal `subtotal - discount + delivery_fee + tax`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pricing {
    pub subtotal: Money,
    pub discount: Money,
    pub delivery_fee: Money,
    pub tax: Money,
    pub total: Money,
}

impl Pricing {
    /// Build a pricing whose total is derived from the other amounts.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` on `total` if the result is out of range.
    pub fn derive(
        subtotal: Money,
        discount: Money,
        delivery_fee: Money,
        tax: Money,
    ) -> Result<Self, DomainError> {
        let mut pricing = Self {
            subtotal,
            discount,
            delivery_fee,
            tax,
            total: Money::ZERO,
        };
        pricing.total = pricing.expected_total()?;
        Ok(pricing)
    }

    /// The total implied by the other amounts.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` on `total` if any intermediate sum is out of range.
    pub fn expected_total(&self) -> Result<Money, DomainError> {
        self.subtotal
            .checked_sub(self.discount)
            .and_then(|m| m.checked_add(self.delivery_fee))
            .and_then(|m| m.checked_add(self.tax))
            .ok_or_else(|| DomainError::invalid("total", "too large"))
    }

    /// Check the amounts against each other and against `lines`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` naming the first offending field.
    pub fn validate(&self, lines: &[OrderLine]) -> Result<(), DomainError> {
        for (field, amount) in [
            ("subtotal", self.subtotal),
            ("discount", self.discount),
            ("delivery_fee", self.delivery_fee),
            ("tax", self.tax),
            ("total", self.total),
        ] {
            if amount.is_negative() {
                return Err(DomainError::invalid(field, "must not be negative"));
            }
            if !amount.is_in_range() {
                return Err(DomainError::invalid(field, "too large"));
            }
        }

        let lines_sum = lines_subtotal(lines)?;
        if self.subtotal != lines_sum {
            return Err(DomainError::invalid(
                "subtotal",
                format!("expected {lines_sum} (sum of line totals), got {}", self.subtotal),
            ));
        }

        let expected = self.expected_total()?;
        if self.total != expected {
            return Err(DomainError::invalid(
                "total",
                format!(
                    "expected {expected} (subtotal - discount + delivery_fee + tax), got {}",
                    self.total
                ),
            ));
        }
        Ok(())
    }
}

/// Everything the caller supplies to place an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub user_id: UserId,
    pub restaurant_id: RestaurantId,
    pub delivery_address_id: Option<AddressId>,
    pub order_type: OrderType,
    pub items: Vec<OrderLine>,
    pub pricing: Pricing,
    pub payment_method: PaymentMethod,
    pub special_instructions: Option<String>,
    pub scheduled_time: Option<DateTime<Utc>>,
}

impl NewOrder {
    /// Validate the request without building anything.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the item list is empty, a line is inconsistent,
    /// the amounts do not add up, or a delivery order has no address.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.items.is_empty() {
            return Err(DomainError::invalid("items", "order must contain at least one item"));
        }
        for line in &self.items {
            if line.quantity < 1 {
                return Err(DomainError::invalid(
                    "quantity",
                    format!("menu item {} has quantity {}", line.menu_item_id, line.quantity),
                ));
            }
            if line.unit_price.is_negative() {
                return Err(DomainError::invalid("unit_price", "must not be negative"));
            }
            let expected = line
                .unit_price
                .checked_times(line.quantity)
                .ok_or_else(|| DomainError::invalid("line_total", "too large"))?;
            if line.line_total != expected {
                return Err(DomainError::invalid(
                    "line_total",
                    format!(
                        "menu item {}: expected {expected}, got {}",
                        line.menu_item_id, line.line_total
                    ),
                ));
            }
        }
        self.pricing.validate(&self.items)?;

        if self.order_type.requires_address() && self.delivery_address_id.is_none() {
            return Err(DomainError::invalid(
                "delivery_address_id",
                "required for delivery orders",
            ));
        }
        Ok(())
    }
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub user_id: UserId,
    pub restaurant_id: RestaurantId,
    pub delivery_address_id: Option<AddressId>,
    pub order_type: OrderType,
    pub items: Vec<OrderLine>,
    #[serde(flatten)]
    pub pricing: Pricing,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub status: OrderStatus,
    pub special_instructions: Option<String>,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub estimated_delivery_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One row of an order's append-only status log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub id: HistoryEntryId,
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub actor: UserId,
    pub note: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl StatusHistoryEntry {
    #[must_use]
    pub fn record(
        order_id: OrderId,
        status: OrderStatus,
        actor: UserId,
        note: Option<String>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: HistoryEntryId::generate(),
            order_id,
            status,
            actor,
            note,
            recorded_at,
        }
    }
}

impl Order {
    /// Validate `new` and build a pending, unpaid order together with its
    /// first history entry (actor = the placing user).
    ///
    /// # Errors
    ///
    /// Whatever [`NewOrder::validate`] rejects.
    pub fn place(
        new: NewOrder,
        order_number: OrderNumber,
        now: DateTime<Utc>,
    ) -> Result<(Self, StatusHistoryEntry), DomainError> {
        new.validate()?;

        let order = Self {
            id: OrderId::generate(),
            order_number,
            user_id: new.user_id,
            restaurant_id: new.restaurant_id,
            delivery_address_id: new.delivery_address_id,
            order_type: new.order_type,
            items: new.items,
            pricing: new.pricing,
            payment_method: new.payment_method,
            payment_status: PaymentStatus::Unpaid,
            status: OrderStatus::Pending,
            special_instructions: new.special_instructions,
            scheduled_time: new.scheduled_time,
            estimated_delivery_time: None,
            created_at: now,
            updated_at: now,
        };
        let entry =
            StatusHistoryEntry::record(order.id, OrderStatus::Pending, order.user_id, None, now);
        Ok((order, entry))
    }

    /// Set the estimated delivery time to `minutes` from `now`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `minutes < 1`, `FailedPrecondition` if the order
    /// is in a terminal status.
    pub fn set_estimated_delivery(
        &mut self,
        minutes: i64,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if minutes < 1 {
            return Err(DomainError::invalid("minutes", "must be positive"));
        }
        if self.status.is_terminal() {
            return Err(DomainError::FailedPrecondition(format!(
                "order is {}",
                self.status
            )));
        }
        let eta = chrono::Duration::try_minutes(minutes)
            .and_then(|d| now.checked_add_signed(d))
            .ok_or_else(|| DomainError::invalid("minutes", "too large"))?;
        self.estimated_delivery_time = Some(eta);
        self.updated_at = now;
        Ok(())
    }

    /// Record out-of-band settlement.
    pub fn set_payment_status(&mut self, payment_status: PaymentStatus, now: DateTime<Utc>) {
        if self.payment_status != payment_status {
            self.payment_status = payment_status;
            self.updated_at = now;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn line(menu_item: i32, quantity: i32, cents: i64) -> OrderLine {
        let unit_price = Money::from_cents(cents);
        OrderLine {
            menu_item_id: MenuItemId::new(menu_item),
            name: format!("dish {menu_item}"),
            quantity,
            unit_price,
            line_total: unit_price.checked_times(quantity).unwrap(),
            notes: None,
        }
    }

    fn new_order(pricing: Pricing) -> NewOrder {
        NewOrder {
            user_id: UserId::new(1),
            restaurant_id: RestaurantId::new(3),
            delivery_address_id: Some(AddressId::new(11)),
            order_type: OrderType::Delivery,
            items: vec![line(7, 2, 500)],
            pricing,
            payment_method: PaymentMethod::CashOnDelivery,
            special_instructions: None,
            scheduled_time: None,
        }
    }

    fn pricing(total_cents: i64) -> Pricing {
        Pricing {
            subtotal: Money::from_cents(1000),
            discount: Money::ZERO,
            delivery_fee: Money::from_cents(200),
            tax: Money::from_cents(100),
            total: Money::from_cents(total_cents),
        }
    }

    #[test]
    fn test_total_must_add_up() {
        assert!(new_order(pricing(1300)).validate().is_ok());
        for wrong in [0, 1000, 1299, 1301, 1500] {
            let err = new_order(pricing(wrong)).validate().unwrap_err();
            assert!(
                matches!(err, DomainError::InvalidArgument { field: "total", .. }),
                "{wrong}: {err:?}"
            );
        }
    }

    #[test]
    fn test_derive_computes_total() {
        let p = Pricing::derive(
            Money::from_cents(1000),
            Money::from_cents(150),
            Money::from_cents(200),
            Money::from_cents(100),
        )
        .unwrap();
        assert_eq!(p.total, Money::from_cents(1150));
    }

    #[test]
    fn test_rejects_inconsistent_lines() {
        let mut order = new_order(pricing(1300));
        order.items.clear();
        assert!(matches!(
            order.validate(),
            Err(DomainError::InvalidArgument { field: "items", .. })
        ));

        let mut order = new_order(pricing(1300));
        order.items[0].quantity = 0;
        assert!(matches!(
            order.validate(),
            Err(DomainError::InvalidArgument { field: "quantity", .. })
        ));

        let mut order = new_order(pricing(1300));
        order.items[0].line_total = Money::from_cents(999);
        assert!(matches!(
            order.validate(),
            Err(DomainError::InvalidArgument { field: "line_total", .. })
        ));

        let mut order = new_order(pricing(1300));
        order.pricing.subtotal = Money::from_cents(900);
        order.pricing.total = Money::from_cents(1200);
        assert!(matches!(
            order.validate(),
            Err(DomainError::InvalidArgument { field: "subtotal", .. })
        ));
    }

    #[test]
    fn test_rejects_negative_amounts() {
        let mut order = new_order(pricing(1400));
        order.pricing.discount = Money::from_cents(-100);
        assert!(matches!(
            order.validate(),
            Err(DomainError::InvalidArgument { field: "discount", .. })
        ));
    }

    #[test]
    fn test_delivery_needs_address() {
        let mut order = new_order(pricing(1300));
        order.delivery_address_id = None;
        assert!(matches!(
            order.validate(),
            Err(DomainError::InvalidArgument { field: "delivery_address_id", .. })
        ));

        order.order_type = OrderType::Pickup;
        assert!(order.validate().is_ok());
    }

    #[test]
    fn test_place_starts_pending_with_one_history_entry() {
        let now = Utc::now();
        let number = OrderNumber::from_entropy(42);
        let (order, entry) = Order::place(new_order(pricing(1300)), number.clone(), now).unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment_status, PaymentStatus::Unpaid);
        assert_eq!(order.order_number, number);
        assert_eq!(order.pricing.total, Money::from_cents(1300));
        assert_eq!(entry.order_id, order.id);
        assert_eq!(entry.status, OrderStatus::Pending);
        assert_eq!(entry.actor, UserId::new(1));
    }

    #[test]
    fn test_estimated_delivery() {
        let now = Utc::now();
        let (mut order, _) =
            Order::place(new_order(pricing(1300)), OrderNumber::from_entropy(1), now).unwrap();

        assert!(order.set_estimated_delivery(0, now).is_err());
        order.set_estimated_delivery(30, now).unwrap();
        assert_eq!(
            order.estimated_delivery_time,
            Some(now + chrono::Duration::minutes(30))
        );

        order.status = OrderStatus::Delivered;
        assert!(matches!(
            order.set_estimated_delivery(10, now),
            Err(DomainError::FailedPrecondition(_))
        ));
    }

    #[test]
    fn test_huge_amounts_are_rejected_not_overflowed() {
        let huge = Money::new(rust_decimal::Decimal::MAX);
        assert!(matches!(
            Pricing::derive(Money::from_cents(500), Money::ZERO, huge, huge),
            Err(DomainError::InvalidArgument { field: "total", .. })
        ));
        assert!(matches!(
            Pricing::derive(Money::MAX, Money::ZERO, Money::from_cents(1), Money::ZERO),
            Err(DomainError::InvalidArgument { field: "total", .. })
        ));

        let mut order = new_order(pricing(1300));
        order.pricing.tax = huge;
        assert!(matches!(
            order.validate(),
            Err(DomainError::InvalidArgument { field: "tax", .. })
        ));

        let mut order = new_order(pricing(1300));
        order.items[0].unit_price = huge;
        order.items[0].quantity = i32::MAX;
        assert!(matches!(
            order.validate(),
            Err(DomainError::InvalidArgument { field: "line_total", .. })
        ));

        let mut order = new_order(pricing(1300));
        let big = line(8, 1, 9_999_999_999);
        order.items = vec![big.clone(), big];
        assert!(matches!(
            order.validate(),
            Err(DomainError::InvalidArgument { field: "subtotal", .. })
        ));
    }

    #[test]
    fn test_line_from_quote() {
        let quote = MenuItemQuote {
            id: MenuItemId::new(7),
            restaurant_id: RestaurantId::new(3),
            name: "ramen".into(),
            price: Money::from_cents(500),
            is_available: true,
        };
        let line = OrderLine::from_quote(&quote, RestaurantId::new(3), 3, None).unwrap();
        assert_eq!(line.unit_price, Money::from_cents(500));
        assert_eq!(line.line_total, Money::from_cents(1500));
        assert_eq!(line.name, "ramen");

        assert!(matches!(
            OrderLine::from_quote(&quote, RestaurantId::new(4), 1, None),
            Err(DomainError::InvalidArgument { field: "restaurant_id", .. })
        ));
        assert!(matches!(
            OrderLine::from_quote(&quote, RestaurantId::new(3), 0, None),
            Err(DomainError::InvalidArgument { field: "quantity", .. })
        ));
        assert!(matches!(
            OrderLine::from_quote(&quote, RestaurantId::new(3), i32::MAX, None),
            Err(DomainError::InvalidArgument { field: "quantity", .. })
        ));

        let sold_out = MenuItemQuote {
            is_available: false,
            ..quote
        };
        assert_eq!(
            OrderLine::from_quote(&sold_out, RestaurantId::new(3), 1, None),
            Err(DomainError::NotFound("menu item"))
        );
    }

    #[test]
    fn test_order_json_flattens_pricing() {
        let (order, _) = Order::place(
            new_order(pricing(1300)),
            OrderNumber::from_entropy(7),
            Utc::now(),
        )
        .unwrap();
        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["total"], "13.00");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["order_type"], "delivery");
    }
}
