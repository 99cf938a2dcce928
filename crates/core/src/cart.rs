//! The per-user cart aggregate.
//!
//! A [`Cart`] owns its line items and two cached aggregates, `total_items`
//! and `total_amount`. The aggregates are private and recomputed by a full
//! fold over the items after every mutation, so they always equal the sum of
//! the current items, including when a cart is restored from storage.
//!
//! A mutation that would push a line or the cart total out of the
//! [`Money`] range fails and leaves the cart untouched. Every successful
//! mutation bumps [`Cart::version`].

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::order::OrderLine;
use crate::types::{CartId, CartItemId, MenuItemId, Money, RestaurantId, UserId};

/// What the menu catalog reports about an item at the moment it is added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItemQuote {
    pub id: MenuItemId,
    pub restaurant_id: RestaurantId,
    pub name: String,
    pub price: Money,
    pub is_available: bool,
}

/// One line of a cart.
///
/// `price_per_item` and `name` are snapshots taken when the line was first
/// added; later menu changes do not reach existing lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub menu_item_id: MenuItemId,
    pub restaurant_id: RestaurantId,
    pub name: String,
    pub quantity: i32,
    pub price_per_item: Money,
    pub total_price: Money,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartItem {
    fn key(&self) -> (MenuItemId, RestaurantId) {
        (self.menu_item_id, self.restaurant_id)
    }

    fn reprice(&mut self) -> Result<(), DomainError> {
        self.total_price = self
            .price_per_item
            .checked_times(self.quantity)
            .ok_or_else(|| DomainError::invalid("quantity", "line total too large"))?;
        Ok(())
    }
}

/// Full fold of item count and amount.
fn fold_totals<'a>(
    items: impl IntoIterator<Item = &'a CartItem>,
) -> Result<(i64, Money), DomainError> {
    let mut count = 0_i64;
    let mut amount = Money::ZERO;
    for item in items {
        count = count.saturating_add(i64::from(item.quantity));
        amount = amount
            .checked_add(item.total_price)
            .ok_or_else(|| DomainError::invalid("quantity", "cart total too large"))?;
    }
    Ok((count, amount))
}

/// A user's cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cart {
    id: CartId,
    user_id: UserId,
    items: Vec<CartItem>,
    total_items: i64,
    total_amount: Money,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn validate_quantity(quantity: i32) -> Result<(), DomainError> {
    if quantity < 1 {
        return Err(DomainError::invalid("quantity", "must be at least 1"));
    }
    Ok(())
}

impl Cart {
    /// A fresh, empty cart.
    #[must_use]
    pub const fn new(id: CartId, user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id,
            items: Vec::new(),
            total_items: 0,
            total_amount: Money::ZERO,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuild a cart from stored parts.
    ///
    /// Item totals and cart aggregates are recomputed from quantities and
    /// unit prices; stored cache columns are never trusted.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the stored lines add up to an out-of-range total.
    pub fn restore(
        id: CartId,
        user_id: UserId,
        mut items: Vec<CartItem>,
        version: i64,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        for item in &mut items {
            item.reprice()?;
        }
        let (total_items, total_amount) = fold_totals(&items)?;
        Ok(Self {
            id,
            user_id,
            items,
            total_items,
            total_amount,
            version,
            created_at,
            updated_at,
        })
    }

    #[must_use]
    pub const fn id(&self) -> CartId {
        self.id
    }

    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Items in insertion order.
    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    #[must_use]
    pub const fn total_items(&self) -> i64 {
        self.total_items
    }

    #[must_use]
    pub const fn total_amount(&self) -> Money {
        self.total_amount
    }

    #[must_use]
    pub const fn version(&self) -> i64 {
        self.version
    }

    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Look up an item by id.
    #[must_use]
    pub fn item(&self, item_id: CartItemId) -> Option<&CartItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    /// Add `quantity` units of a menu item.
    ///
    /// If the cart already has a line for the same menu item and restaurant,
    /// its quantity grows and its original unit price is kept. Otherwise a
    /// new line is appended at the quote's current price. `notes` replaces
    /// existing notes only when given.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `quantity < 1`, if the item belongs to another
    ///   restaurant, or if the resulting quantity overflows.
    /// - `NotFound` if the menu item is unavailable.
    pub fn add_item(
        &mut self,
        quote: &MenuItemQuote,
        restaurant_id: RestaurantId,
        quantity: i32,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<CartItem, DomainError> {
        validate_quantity(quantity)?;
        if !quote.is_available {
            return Err(DomainError::NotFound("menu item"));
        }
        if quote.restaurant_id != restaurant_id {
            return Err(DomainError::invalid(
                "restaurant_id",
                format!("menu item {} is not sold by restaurant {restaurant_id}", quote.id),
            ));
        }

        let key = (quote.id, restaurant_id);
        let mut staged = if let Some(existing) = self.items.iter().find(|i| i.key() == key) {
            let mut item = existing.clone();
            item.quantity = item
                .quantity
                .checked_add(quantity)
                .ok_or_else(|| DomainError::invalid("quantity", "too large"))?;
            if notes.is_some() {
                item.notes = notes;
            }
            item.updated_at = now;
            item
        } else {
            CartItem {
                id: CartItemId::generate(),
                menu_item_id: quote.id,
                restaurant_id,
                name: quote.name.clone(),
                quantity,
                price_per_item: quote.price,
                total_price: Money::ZERO,
                notes,
                created_at: now,
                updated_at: now,
            }
        };
        staged.reprice()?;

        self.upsert(staged.clone(), now)?;
        Ok(staged)
    }

    /// Set an item's quantity, and its notes when given.
    ///
    /// # Errors
    ///
    /// `NotFound` if the item is not in this cart, `InvalidArgument` if
    /// `quantity < 1`.
    pub fn update_item(
        &mut self,
        item_id: CartItemId,
        quantity: i32,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<CartItem, DomainError> {
        let mut staged = self
            .item(item_id)
            .cloned()
            .ok_or(DomainError::NotFound("cart item"))?;
        validate_quantity(quantity)?;

        staged.quantity = quantity;
        if notes.is_some() {
            staged.notes = notes;
        }
        staged.updated_at = now;
        staged.reprice()?;

        self.upsert(staged.clone(), now)?;
        Ok(staged)
    }

    /// Remove an item.
    ///
    /// # Errors
    ///
    /// `NotFound` if the item is not in this cart.
    pub fn remove_item(
        &mut self,
        item_id: CartItemId,
        now: DateTime<Utc>,
    ) -> Result<CartItem, DomainError> {
        let idx = self.position(item_id)?;
        let totals = fold_totals(self.items.iter().filter(|i| i.id != item_id))?;
        let removed = self.items.remove(idx);
        self.commit(totals, now);
        Ok(removed)
    }

    /// Remove every item. Returns `false` when the cart was already empty,
    /// in which case nothing changes.
    pub fn clear(&mut self, now: DateTime<Utc>) -> bool {
        if self.items.is_empty() {
            return false;
        }
        self.items.clear();
        self.commit((0, Money::ZERO), now);
        true
    }

    /// The single restaurant every item comes from.
    ///
    /// # Errors
    ///
    /// `FailedPrecondition` if the cart is empty or mixes restaurants.
    pub fn sole_restaurant(&self) -> Result<RestaurantId, DomainError> {
        let restaurants: BTreeSet<RestaurantId> =
            self.items.iter().map(|i| i.restaurant_id).collect();
        let mut iter = restaurants.into_iter();
        match (iter.next(), iter.next()) {
            (None, _) => Err(DomainError::FailedPrecondition("cart is empty".into())),
            (Some(r), None) => Ok(r),
            (Some(_), Some(_)) => Err(DomainError::FailedPrecondition(
                "cart contains items from more than one restaurant".into(),
            )),
        }
    }

    /// Frozen order lines for the current items.
    #[must_use]
    pub fn order_lines(&self) -> Vec<OrderLine> {
        self.items
            .iter()
            .map(|i| OrderLine {
                menu_item_id: i.menu_item_id,
                name: i.name.clone(),
                quantity: i.quantity,
                unit_price: i.price_per_item,
                line_total: i.total_price,
                notes: i.notes.clone(),
            })
            .collect()
    }

    fn position(&self, item_id: CartItemId) -> Result<usize, DomainError> {
        self.items
            .iter()
            .position(|i| i.id == item_id)
            .ok_or(DomainError::NotFound("cart item"))
    }

    /// Put `line` in place of the item with the same id, or append it.
    /// Totals are folded first, so an out-of-range total changes nothing.
    fn upsert(&mut self, line: CartItem, now: DateTime<Utc>) -> Result<(), DomainError> {
        let totals = fold_totals(
            self.items
                .iter()
                .filter(|i| i.id != line.id)
                .chain(std::iter::once(&line)),
        )?;
        match self.items.iter_mut().find(|i| i.id == line.id) {
            Some(slot) => *slot = line,
            None => self.items.push(line),
        }
        self.commit(totals, now);
        Ok(())
    }

    fn commit(&mut self, (total_items, total_amount): (i64, Money), now: DateTime<Utc>) {
        self.total_items = total_items;
        self.total_amount = total_amount;
        self.version += 1;
        self.updated_at = now;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn quote(id: i32, restaurant: i32, cents: i64) -> MenuItemQuote {
        MenuItemQuote {
            id: MenuItemId::new(id),
            restaurant_id: RestaurantId::new(restaurant),
            name: format!("dish {id}"),
            price: Money::from_cents(cents),
            is_available: true,
        }
    }

    fn empty_cart() -> Cart {
        Cart::new(CartId::generate(), UserId::new(1), Utc::now())
    }

    fn assert_totals_are_fold(cart: &Cart) {
        let items: i64 = cart.items().iter().map(|i| i64::from(i.quantity)).sum();
        let amount = Money::checked_sum(
            cart.items()
                .iter()
                .map(|i| i.price_per_item.checked_times(i.quantity).unwrap()),
        )
        .unwrap();
        assert_eq!(cart.total_items(), items);
        assert_eq!(cart.total_amount(), amount);
    }

    #[test]
    fn test_add_to_empty_cart() {
        let mut cart = empty_cart();
        let item = cart
            .add_item(&quote(7, 3, 500), RestaurantId::new(3), 2, None, Utc::now())
            .unwrap();

        assert_eq!(item.total_price, Money::from_cents(1000));
        assert_eq!(cart.total_items(), 2);
        assert_eq!(cart.total_amount(), Money::from_cents(1000));
        assert_eq!(cart.version(), 1);
    }

    #[test]
    fn test_readd_keeps_original_price() {
        let mut cart = empty_cart();
        let r = RestaurantId::new(3);
        cart.add_item(&quote(7, 3, 500), r, 2, None, Utc::now()).unwrap();

        // menu price changed since the first add
        let item = cart
            .add_item(&quote(7, 3, 900), r, 3, Some("no onions".into()), Utc::now())
            .unwrap();

        assert_eq!(cart.items().len(), 1);
        assert_eq!(item.quantity, 5);
        assert_eq!(item.price_per_item, Money::from_cents(500));
        assert_eq!(item.total_price, Money::from_cents(2500));
        assert_eq!(item.notes.as_deref(), Some("no onions"));
        assert_totals_are_fold(&cart);
    }

    #[test]
    fn test_add_rejects_bad_input() {
        let mut cart = empty_cart();
        let r = RestaurantId::new(3);

        let err = cart.add_item(&quote(7, 3, 500), r, 0, None, Utc::now());
        assert!(matches!(err, Err(DomainError::InvalidArgument { field: "quantity", .. })));

        let mut unavailable = quote(7, 3, 500);
        unavailable.is_available = false;
        let err = cart.add_item(&unavailable, r, 1, None, Utc::now());
        assert_eq!(err, Err(DomainError::NotFound("menu item")));

        let err = cart.add_item(&quote(7, 4, 500), r, 1, None, Utc::now());
        assert!(matches!(
            err,
            Err(DomainError::InvalidArgument { field: "restaurant_id", .. })
        ));

        assert!(cart.is_empty());
        assert_eq!(cart.version(), 0);
    }

    #[test]
    fn test_add_overflow_leaves_cart_unchanged() {
        let mut cart = empty_cart();
        let r = RestaurantId::new(3);
        cart.add_item(&quote(7, 3, 1), r, i32::MAX, None, Utc::now()).unwrap();
        let before = cart.clone();

        assert!(cart.add_item(&quote(7, 3, 1), r, 1, None, Utc::now()).is_err());
        assert_eq!(cart, before);
    }

    #[test]
    fn test_out_of_range_totals_leave_cart_unchanged() {
        let mut cart = empty_cart();
        let r = RestaurantId::new(3);
        let huge = MenuItemQuote {
            price: Money::from_cents(i64::MAX),
            ..quote(7, 3, 0)
        };
        assert!(matches!(
            cart.add_item(&huge, r, 1, None, Utc::now()),
            Err(DomainError::InvalidArgument { field: "quantity", .. })
        ));
        assert!(cart.is_empty());

        let item = cart
            .add_item(&quote(7, 3, 9_999_999_999), r, 1, None, Utc::now())
            .unwrap();
        let before = cart.clone();
        assert!(cart.add_item(&quote(8, 3, 1), r, 1, None, Utc::now()).is_err());
        assert!(cart.update_item(item.id, 2, None, Utc::now()).is_err());
        assert_eq!(cart, before);
        assert_totals_are_fold(&cart);
    }

    #[test]
    fn test_update_and_remove() {
        let mut cart = empty_cart();
        let r = RestaurantId::new(3);
        let a = cart.add_item(&quote(1, 3, 250), r, 1, None, Utc::now()).unwrap();
        let b = cart.add_item(&quote(2, 3, 400), r, 2, None, Utc::now()).unwrap();

        let updated = cart.update_item(a.id, 4, None, Utc::now()).unwrap();
        assert_eq!(updated.total_price, Money::from_cents(1000));
        assert_totals_are_fold(&cart);

        assert!(matches!(
            cart.update_item(a.id, 0, None, Utc::now()),
            Err(DomainError::InvalidArgument { .. })
        ));
        assert_eq!(
            cart.update_item(CartItemId::generate(), 1, None, Utc::now()),
            Err(DomainError::NotFound("cart item"))
        );

        cart.remove_item(b.id, Utc::now()).unwrap();
        assert_eq!(cart.total_items(), 4);
        assert_eq!(cart.total_amount(), Money::from_cents(1000));
        assert_eq!(
            cart.remove_item(b.id, Utc::now()),
            Err(DomainError::NotFound("cart item"))
        );
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut cart = empty_cart();
        cart.add_item(&quote(1, 3, 250), RestaurantId::new(3), 1, None, Utc::now())
            .unwrap();

        assert!(cart.clear(Utc::now()));
        let after_first = cart.clone();
        assert!(!cart.clear(Utc::now()));
        assert_eq!(cart, after_first);
        assert_eq!(cart.total_items(), 0);
        assert_eq!(cart.total_amount(), Money::ZERO);
    }

    #[test]
    fn test_totals_hold_over_a_mutation_sequence() {
        let mut cart = empty_cart();
        let r = RestaurantId::new(9);
        let mut ids = Vec::new();
        for n in 1..=6 {
            let item = cart
                .add_item(&quote(n % 4, 9, i64::from(n) * 125), r, n, None, Utc::now())
                .unwrap();
            ids.push(item.id);
            assert_totals_are_fold(&cart);
        }
        cart.update_item(ids[0], 9, None, Utc::now()).unwrap();
        assert_totals_are_fold(&cart);
        cart.remove_item(ids[1], Utc::now()).unwrap();
        assert_totals_are_fold(&cart);
    }

    #[test]
    fn test_restore_recomputes_totals() {
        let mut cart = empty_cart();
        let mut item = cart
            .add_item(&quote(1, 3, 300), RestaurantId::new(3), 2, None, Utc::now())
            .unwrap();
        item.total_price = Money::from_cents(1);

        let restored = Cart::restore(
            cart.id(),
            cart.user_id(),
            vec![item],
            7,
            cart.created_at(),
            cart.updated_at(),
        )
        .unwrap();
        assert_eq!(restored.total_amount(), Money::from_cents(600));
        assert_eq!(restored.items()[0].total_price, Money::from_cents(600));
        assert_eq!(restored.version(), 7);
    }

    #[test]
    fn test_sole_restaurant() {
        let mut cart = empty_cart();
        assert!(matches!(
            cart.sole_restaurant(),
            Err(DomainError::FailedPrecondition(_))
        ));

        cart.add_item(&quote(1, 3, 300), RestaurantId::new(3), 1, None, Utc::now())
            .unwrap();
        assert_eq!(cart.sole_restaurant().unwrap(), RestaurantId::new(3));

        cart.add_item(&quote(2, 4, 300), RestaurantId::new(4), 1, None, Utc::now())
            .unwrap();
        assert!(matches!(
            cart.sole_restaurant(),
            Err(DomainError::FailedPrecondition(_))
        ));
    }
}
