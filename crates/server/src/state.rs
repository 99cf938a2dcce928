//! Application state shared across handlers.

use std::sync::Arc;

use crate::db::Store;
use crate::services::{
    AccountService, CartService, IdentityVerifier, OrderNumberSource, OrderService,
};

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`. Generic over the store so the same router
/// serves `PostgreSQL` in production and the in-memory store in tests.
pub struct AppState<S> {
    inner: Arc<AppStateInner<S>>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct AppStateInner<S> {
    carts: CartService<S>,
    orders: OrderService<S>,
    accounts: AccountService<S>,
    verifier: Arc<dyn IdentityVerifier>,
}

impl<S: Store> AppState<S> {
    /// Create state with random order numbers.
    ///
    /// # Arguments
    ///
    /// * `store` - Persistence backend
    /// * `verifier` - Bearer-token verifier
    /// * `order_number_attempts` - Insert attempts before a collision surfaces
    #[must_use]
    pub fn new(store: S, verifier: Arc<dyn IdentityVerifier>, order_number_attempts: u32) -> Self {
        let orders = OrderService::new(store.clone(), order_number_attempts);
        Self::from_parts(store, verifier, orders)
    }

    /// Create state with a custom order number source.
    #[must_use]
    pub fn with_order_numbers(
        store: S,
        verifier: Arc<dyn IdentityVerifier>,
        numbers: Arc<dyn OrderNumberSource>,
        order_number_attempts: u32,
    ) -> Self {
        let orders = OrderService::with_numbers(store.clone(), numbers, order_number_attempts);
        Self::from_parts(store, verifier, orders)
    }

    fn from_parts(store: S, verifier: Arc<dyn IdentityVerifier>, orders: OrderService<S>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                carts: CartService::new(store.clone()),
                accounts: AccountService::new(store),
                orders,
                verifier,
            }),
        }
    }

    #[must_use]
    pub fn carts(&self) -> &CartService<S> {
        &self.inner.carts
    }

    #[must_use]
    pub fn orders(&self) -> &OrderService<S> {
        &self.inner.orders
    }

    #[must_use]
    pub fn accounts(&self) -> &AccountService<S> {
        &self.inner.accounts
    }

    #[must_use]
    pub fn verifier(&self) -> &dyn IdentityVerifier {
        self.inner.verifier.as_ref()
    }
}
