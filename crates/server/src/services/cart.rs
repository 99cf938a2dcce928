//! Cart service.
//!
//! Menu quotes are read before the cart is locked; the mutation itself runs
//! inside [`CartStore::mutate_cart`], so concurrent requests for one user
//! apply one after another and a rejected mutation persists nothing.

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, instrument};

use forkline_core::{Actor, Cart, CartItem, CartItemId, DomainError, MenuItemId, RestaurantId};

use super::ServiceError;
use crate::db::{CartStore, MenuCatalog, Store};

/// Body of `POST /cart/items`.
#[derive(Debug, Clone, Deserialize)]
pub struct AddItemRequest {
    pub menu_item_id: MenuItemId,
    pub restaurant_id: RestaurantId,
    pub quantity: i32,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Body of `PATCH /cart/items/{item_id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: i32,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CartService<S> {
    store: S,
}

impl<S: Store> CartService<S> {
    #[must_use]
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// The actor's cart, created empty on first access.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Repository` if storage fails.
    pub async fn get_or_create(&self, actor: &Actor) -> Result<Cart, ServiceError> {
        Ok(self.store.load_or_create_cart(actor.id).await?)
    }

    /// Add an item at the current menu price, or grow an existing line.
    ///
    /// # Errors
    ///
    /// `NotFound` if the menu item does not exist or is unavailable,
    /// `InvalidArgument` for a bad quantity or restaurant.
    #[instrument(skip(self, request), fields(user_id = %actor.id, menu_item_id = %request.menu_item_id))]
    pub async fn add_item(
        &self,
        actor: &Actor,
        request: AddItemRequest,
    ) -> Result<CartItem, ServiceError> {
        let quote = self
            .store
            .quote(request.menu_item_id)
            .await?
            .ok_or(DomainError::NotFound("menu item"))?;

        let item = self
            .store
            .mutate_cart(actor.id, move |cart| {
                cart.add_item(
                    &quote,
                    request.restaurant_id,
                    request.quantity,
                    request.notes,
                    Utc::now(),
                )
                .map_err(ServiceError::from)
            })
            .await?;

        debug!(item_id = %item.id, quantity = item.quantity, "cart item added");
        Ok(item)
    }

    /// Set a line's quantity.
    ///
    /// # Errors
    ///
    /// `NotFound` if the line is not in the actor's cart, `InvalidArgument`
    /// if the quantity is below one.
    #[instrument(skip(self, request), fields(user_id = %actor.id, item_id = %item_id))]
    pub async fn update_item(
        &self,
        actor: &Actor,
        item_id: CartItemId,
        request: UpdateItemRequest,
    ) -> Result<CartItem, ServiceError> {
        self.store
            .mutate_cart(actor.id, move |cart| {
                cart.update_item(item_id, request.quantity, request.notes, Utc::now())
                    .map_err(ServiceError::from)
            })
            .await
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// `NotFound` if the line is not in the actor's cart.
    #[instrument(skip(self), fields(user_id = %actor.id, item_id = %item_id))]
    pub async fn remove_item(&self, actor: &Actor, item_id: CartItemId) -> Result<(), ServiceError> {
        self.store
            .mutate_cart(actor.id, move |cart| {
                cart.remove_item(item_id, Utc::now())
                    .map(drop)
                    .map_err(ServiceError::from)
            })
            .await
    }

    /// Empty the cart. Clearing an empty cart changes nothing.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Repository` if storage fails.
    #[instrument(skip(self), fields(user_id = %actor.id))]
    pub async fn clear(&self, actor: &Actor) -> Result<Cart, ServiceError> {
        self.store
            .mutate_cart(actor.id, |cart| {
                cart.clear(Utc::now());
                Ok::<_, ServiceError>(cart.clone())
            })
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use forkline_core::{MenuItemQuote, Money, Role, UserId};

    use super::*;
    use crate::db::MemoryStore;

    async fn service() -> CartService<MemoryStore> {
        let store = MemoryStore::new();
        store
            .seed_menu_item(MenuItemQuote {
                id: MenuItemId::new(7),
                restaurant_id: RestaurantId::new(3),
                name: "ramen".into(),
                price: Money::from_cents(500),
                is_available: true,
            })
            .await;
        store
            .seed_menu_item(MenuItemQuote {
                id: MenuItemId::new(8),
                restaurant_id: RestaurantId::new(3),
                name: "gyoza".into(),
                price: Money::from_cents(300),
                is_available: false,
            })
            .await;
        CartService::new(store)
    }

    fn customer() -> Actor {
        Actor::new(UserId::new(1), Role::Customer.into())
    }

    fn add(menu_item: i32, quantity: i32) -> AddItemRequest {
        AddItemRequest {
            menu_item_id: MenuItemId::new(menu_item),
            restaurant_id: RestaurantId::new(3),
            quantity,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_add_persists_totals() {
        let svc = service().await;
        let actor = customer();

        svc.add_item(&actor, add(7, 2)).await.unwrap();
        let cart = svc.get_or_create(&actor).await.unwrap();
        assert_eq!(cart.total_items(), 2);
        assert_eq!(cart.total_amount(), Money::from_cents(1000));
        assert_eq!(cart.version(), 1);
    }

    #[tokio::test]
    async fn test_missing_or_unavailable_item_is_not_found() {
        let svc = service().await;
        let actor = customer();

        for id in [8, 99] {
            assert!(matches!(
                svc.add_item(&actor, add(id, 1)).await,
                Err(ServiceError::Domain(DomainError::NotFound("menu item")))
            ));
        }
        assert!(svc.get_or_create(&actor).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_remove_and_clear() {
        let svc = service().await;
        let actor = customer();
        let item = svc.add_item(&actor, add(7, 1)).await.unwrap();

        let updated = svc
            .update_item(&actor, item.id, UpdateItemRequest { quantity: 4, notes: None })
            .await
            .unwrap();
        assert_eq!(updated.total_price, Money::from_cents(2000));

        assert!(matches!(
            svc.update_item(&actor, item.id, UpdateItemRequest { quantity: 0, notes: None })
                .await,
            Err(ServiceError::Domain(DomainError::InvalidArgument { .. }))
        ));

        svc.remove_item(&actor, item.id).await.unwrap();
        assert!(matches!(
            svc.remove_item(&actor, item.id).await,
            Err(ServiceError::Domain(DomainError::NotFound("cart item")))
        ));

        svc.add_item(&actor, add(7, 1)).await.unwrap();
        let cleared = svc.clear(&actor).await.unwrap();
        assert!(cleared.is_empty());
        let again = svc.clear(&actor).await.unwrap();
        assert_eq!(again.version(), cleared.version());
    }

    #[tokio::test]
    async fn test_carts_are_per_user() {
        let svc = service().await;
        let ana = customer();
        let bo = Actor::new(UserId::new(2), Role::Customer.into());

        let item = svc.add_item(&ana, add(7, 1)).await.unwrap();
        assert!(matches!(
            svc.remove_item(&bo, item.id).await,
            Err(ServiceError::Domain(DomainError::NotFound(_)))
        ));
        assert!(svc.get_or_create(&bo).await.unwrap().is_empty());
    }
}
