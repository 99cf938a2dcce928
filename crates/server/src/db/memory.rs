//! In-memory store for tests and local development.
//!
//! A single `tokio::sync::Mutex` guards all state, which gives every
//! operation the same isolation the `PostgreSQL` store gets from row locks:
//! closures passed to `mutate_cart` and `update_order` run while the lock is
//! held and their changes are discarded on error. `checkout_cart` builds,
//! inserts and clears under one hold of the lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use forkline_core::{
    Cart, CartId, MenuItemId, MenuItemQuote, Order, OrderId, OrderNumber, OrderStatus,
    RestaurantId, Role, RoleSet, StatusHistoryEntry, UserId,
};

use super::{CartStore, MenuCatalog, OrderStore, RepositoryError, UserDirectory};
use crate::models::{Identity, NewRestaurant, Restaurant, User};

#[derive(Default)]
struct State {
    carts: HashMap<UserId, Cart>,
    /// Insertion order; listings iterate in reverse for newest first.
    orders: Vec<Order>,
    order_numbers: HashSet<OrderNumber>,
    history: HashMap<OrderId, Vec<StatusHistoryEntry>>,
    users: Vec<User>,
    restaurants: Vec<Restaurant>,
    menu: HashMap<MenuItemId, MenuItemQuote>,
}

impl State {
    fn cart_entry(&mut self, user: UserId) -> &mut Cart {
        self.carts
            .entry(user)
            .or_insert_with(|| Cart::new(CartId::generate(), user, Utc::now()))
    }

    fn insert_order(
        &mut self,
        order: &Order,
        first_entry: &StatusHistoryEntry,
    ) -> Result<(), RepositoryError> {
        if !self.order_numbers.insert(order.order_number.clone()) {
            return Err(RepositoryError::Conflict(
                "order number already exists".to_owned(),
            ));
        }
        self.orders.push(order.clone());
        self.history.insert(order.id, vec![first_entry.clone()]);
        Ok(())
    }

    fn user_mut(&mut self, id: UserId) -> Option<&mut User> {
        self.users.iter_mut().find(|u| u.id == id)
    }
}

/// Mutex-guarded store. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a menu item.
    pub async fn seed_menu_item(&self, quote: MenuItemQuote) {
        self.state.lock().await.menu.insert(quote.id, quote);
    }

    /// Add a user with the given roles and return it.
    pub async fn seed_user(&self, identity: Identity, display_name: &str, roles: RoleSet) -> User {
        let mut state = self.state.lock().await;
        let user = User {
            id: next_user_id(&state.users),
            subject: identity.subject,
            email: identity.email,
            display_name: display_name.to_owned(),
            roles,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        state.users.push(user.clone());
        user
    }
}

fn next_user_id(users: &[User]) -> UserId {
    UserId::new(users.iter().map(|u| u.id.as_i32()).max().unwrap_or(0) + 1)
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn load_or_create_cart(&self, user: UserId) -> Result<Cart, RepositoryError> {
        Ok(self.state.lock().await.cart_entry(user).clone())
    }

    async fn mutate_cart<T, E, F>(&self, user: UserId, f: F) -> Result<T, E>
    where
        T: Send,
        E: From<RepositoryError> + Send,
        F: FnOnce(&mut Cart) -> Result<T, E> + Send,
    {
        let mut state = self.state.lock().await;
        let stored = state.cart_entry(user);
        let mut working = stored.clone();
        let out = f(&mut working)?;
        *stored = working;
        Ok(out)
    }

    async fn checkout_cart<E, F>(&self, user: UserId, attempts: u32, mut f: F) -> Result<Order, E>
    where
        E: From<RepositoryError> + Send,
        F: FnMut(&Cart) -> Result<(Order, StatusHistoryEntry), E> + Send,
    {
        let mut state = self.state.lock().await;
        for _ in 0..attempts.max(1) {
            let (order, first_entry) = f(state.cart_entry(user))?;
            match state.insert_order(&order, &first_entry) {
                Ok(()) => {
                    state.cart_entry(user).clear(order.created_at);
                    return Ok(order);
                }
                Err(RepositoryError::Conflict(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Err(RepositoryError::Conflict(format!(
            "no unique order number after {} attempts",
            attempts.max(1)
        ))
        .into())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert_order(
        &self,
        order: &Order,
        first_entry: &StatusHistoryEntry,
    ) -> Result<(), RepositoryError> {
        self.state.lock().await.insert_order(order, first_entry)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn list_orders_for_user(&self, user: UserId) -> Result<Vec<Order>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .orders
            .iter()
            .rev()
            .filter(|o| o.user_id == user)
            .cloned()
            .collect())
    }

    async fn list_orders(
        &self,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .orders
            .iter()
            .rev()
            .filter(|o| status.is_none_or(|s| o.status == s))
            .cloned()
            .collect())
    }

    async fn update_order<T, E, F>(&self, id: OrderId, f: F) -> Result<T, E>
    where
        T: Send,
        E: From<RepositoryError> + Send,
        F: FnOnce(&mut Order) -> Result<(T, Option<StatusHistoryEntry>), E> + Send,
    {
        let mut state = self.state.lock().await;
        let stored = state
            .orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or(RepositoryError::NotFound)?;

        let mut working = stored.clone();
        let (out, entry) = f(&mut working)?;
        *stored = working;

        if let Some(entry) = entry {
            state.history.entry(id).or_default().push(entry);
        }
        Ok(out)
    }

    async fn status_history(
        &self,
        id: OrderId,
    ) -> Result<Vec<StatusHistoryEntry>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.history.get(&id).cloned().unwrap_or_default())
    }

    async fn delete_order(&self, id: OrderId) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock().await;
        let Some(pos) = state.orders.iter().position(|o| o.id == id) else {
            return Ok(false);
        };
        let order = state.orders.remove(pos);
        state.order_numbers.remove(&order.order_number);
        state.history.remove(&id);
        Ok(true)
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_by_subject(&self, subject: &str) -> Result<Option<User>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.users.iter().find(|u| u.subject == subject).cloned())
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.users.iter().find(|u| u.id == id).cloned())
    }

    async fn register_user(
        &self,
        identity: &Identity,
        display_name: &str,
    ) -> Result<User, RepositoryError> {
        let mut state = self.state.lock().await;
        if state.users.iter().any(|u| u.subject == identity.subject) {
            return Err(RepositoryError::Conflict("user already exists".to_owned()));
        }
        let now = Utc::now();
        let user = User {
            id: next_user_id(&state.users),
            subject: identity.subject.clone(),
            email: identity.email.clone(),
            display_name: display_name.to_owned(),
            roles: Role::Customer.into(),
            created_at: now,
            updated_at: now,
        };
        state.users.push(user.clone());
        Ok(user)
    }

    async fn grant_role(&self, id: UserId, role: Role) -> Result<User, RepositoryError> {
        let mut state = self.state.lock().await;
        let user = state.user_mut(id).ok_or(RepositoryError::NotFound)?;
        if user.roles.insert(role) {
            user.updated_at = Utc::now();
        }
        Ok(user.clone())
    }

    async fn create_restaurant(
        &self,
        new: &NewRestaurant,
        slug: &str,
    ) -> Result<(Restaurant, User), RepositoryError> {
        let mut state = self.state.lock().await;
        if state.user_mut(new.owner_id).is_none() {
            return Err(RepositoryError::NotFound);
        }
        if state.restaurants.iter().any(|r| r.slug == slug) {
            return Err(RepositoryError::Conflict(
                "restaurant slug already exists".to_owned(),
            ));
        }

        let now = Utc::now();
        let next = state.restaurants.iter().map(|r| r.id.as_i32()).max().unwrap_or(0) + 1;
        let restaurant = Restaurant {
            id: RestaurantId::new(next),
            slug: slug.to_owned(),
            name: new.name.clone(),
            description: new.description.clone(),
            address: new.address.clone(),
            phone_number: new.phone_number.clone(),
            owner_id: new.owner_id,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        state.restaurants.push(restaurant.clone());

        let owner = state.user_mut(new.owner_id).ok_or(RepositoryError::NotFound)?;
        if owner.roles.insert(Role::Manager) {
            owner.updated_at = now;
        }
        Ok((restaurant, owner.clone()))
    }
}

#[async_trait]
impl MenuCatalog for MemoryStore {
    async fn quote(&self, id: MenuItemId) -> Result<Option<MenuItemQuote>, RepositoryError> {
        Ok(self.state.lock().await.menu.get(&id).cloned())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use forkline_core::{
        DomainError, Email, Money, NewOrder, OrderType, PaymentMethod, Pricing, RestaurantId,
    };

    use super::*;
    use crate::services::ServiceError;

    fn build_order(
        cart: &Cart,
        entropy: u64,
    ) -> Result<(Order, StatusHistoryEntry), ServiceError> {
        let new = NewOrder {
            user_id: cart.user_id(),
            restaurant_id: cart.sole_restaurant()?,
            delivery_address_id: None,
            order_type: OrderType::Pickup,
            items: cart.order_lines(),
            pricing: Pricing::derive(cart.total_amount(), Money::ZERO, Money::ZERO, Money::ZERO)?,
            payment_method: PaymentMethod::Card,
            special_instructions: None,
            scheduled_time: None,
        };
        Ok(Order::place(new, OrderNumber::from_entropy(entropy), Utc::now())?)
    }

    fn identity(subject: &str) -> Identity {
        Identity {
            subject: subject.to_owned(),
            email: Email::parse(&format!("{subject}@example.com")).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_failed_cart_mutation_is_discarded() {
        let store = MemoryStore::new();
        let quote = MenuItemQuote {
            id: MenuItemId::new(1),
            restaurant_id: RestaurantId::new(1),
            name: "soup".into(),
            price: Money::from_cents(450),
            is_available: true,
        };
        let user = UserId::new(1);

        let result: Result<(), ServiceError> = store
            .mutate_cart(user, |cart| {
                cart.add_item(&quote, RestaurantId::new(1), 1, None, Utc::now())?;
                Err(DomainError::Conflict("abort".into()).into())
            })
            .await;
        assert!(result.is_err());

        let cart = store.load_or_create_cart(user).await.unwrap();
        assert!(cart.is_empty());
        assert_eq!(cart.version(), 0);
    }

    #[tokio::test]
    async fn test_checkout_retries_numbers_and_clears_once() {
        let store = MemoryStore::new();
        let quote = MenuItemQuote {
            id: MenuItemId::new(1),
            restaurant_id: RestaurantId::new(1),
            name: "soup".into(),
            price: Money::from_cents(450),
            is_available: true,
        };
        let user = UserId::new(1);
        let add = |cart: &mut Cart| {
            cart.add_item(&quote, RestaurantId::new(1), 2, None, Utc::now())
                .map_err(ServiceError::from)
        };
        store.mutate_cart(user, add).await.unwrap();
        let cart = store.load_or_create_cart(user).await.unwrap();
        let (taken, entry) = build_order(&cart, 7).unwrap();
        store.insert_order(&taken, &entry).await.unwrap();

        let exhausted = store
            .checkout_cart(user, 3, |cart| build_order(cart, 7))
            .await;
        assert!(matches!(
            exhausted,
            Err(ServiceError::Domain(DomainError::Conflict(_)))
        ));
        assert_eq!(store.load_or_create_cart(user).await.unwrap().total_items(), 2);

        let mut draws = [7, 8].into_iter();
        let order = store
            .checkout_cart(user, 3, |cart| build_order(cart, draws.next().unwrap_or(9)))
            .await
            .unwrap();
        assert_eq!(order.order_number, OrderNumber::from_entropy(8));
        assert_eq!(order.pricing.total, Money::from_cents(900));
        assert!(store.load_or_create_cart(user).await.unwrap().is_empty());
        assert_eq!(store.status_history(order.id).await.unwrap().len(), 1);

        assert!(matches!(
            store.checkout_cart(user, 3, |cart| build_order(cart, 10)).await,
            Err(ServiceError::Domain(DomainError::FailedPrecondition(_)))
        ));
        assert_eq!(store.list_orders_for_user(user).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_register_and_grant() {
        let store = MemoryStore::new();
        let user = store.register_user(&identity("ana"), "Ana").await.unwrap();
        assert_eq!(user.roles, RoleSet::from(Role::Customer));
        assert_eq!(store.find_user(user.id).await.unwrap(), Some(user.clone()));

        assert!(matches!(
            store.register_user(&identity("ana"), "Ana again").await,
            Err(RepositoryError::Conflict(_))
        ));

        let granted = store.grant_role(user.id, Role::Manager).await.unwrap();
        let again = store.grant_role(user.id, Role::Manager).await.unwrap();
        assert_eq!(granted.roles, again.roles);
        assert!(granted.roles.contains(Role::Manager));

        assert!(matches!(
            store.grant_role(UserId::new(404), Role::Admin).await,
            Err(RepositoryError::NotFound)
        ));
    }
}
