//! Persistence for the ordering engine.
//!
//! The engine's rules live in `forkline-core`; this module only loads
//! aggregates, hands them to those rules, and writes the result back. Each
//! concern is a trait so services can run against either backend:
//!
//! - [`PgStore`] - `PostgreSQL` via `sqlx`
//! - [`MemoryStore`] - a mutex-guarded map, for tests and local runs
//!
//! # Database: `forkline`
//!
//! ## Tables
//!
//! - `app_user` - Local accounts keyed by identity-provider subject
//! - `restaurant` - Restaurants and their managing owner
//! - `menu_item` - Read-only menu projection used for price quotes
//! - `cart` / `cart_item` - One cart per user with its line items
//! - `customer_order` - Placed orders with a JSONB item snapshot
//! - `order_status_history` - Append-only status log
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p forkline-cli -- migrate
//! ```
//!
//! # Mutation closures
//!
//! [`CartStore::mutate_cart`], [`CartStore::checkout_cart`] and
//! [`OrderStore::update_order`] take a closure. The store locks the row (`SELECT ... FOR UPDATE` or the mutex),
//! runs the closure on the loaded aggregate, and persists only if the
//! closure succeeds. A closure error rolls everything back.

mod carts;
pub mod memory;
mod menu;
mod orders;
mod restaurants;
mod users;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use forkline_core::{
    Cart, MenuItemId, MenuItemQuote, Order, OrderId, OrderStatus, Role, StatusHistoryEntry, UserId,
};

use crate::models::{Identity, NewRestaurant, Restaurant, User};

pub use memory::MemoryStore;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., duplicate order number).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Map a unique violation to `Conflict`, anything else to `Database`.
    pub(crate) fn from_insert(e: sqlx::Error, what: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.is_unique_violation()
        {
            return Self::Conflict(format!("{what} already exists"));
        }
        Self::Database(e)
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Per-user carts.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Fetch the user's cart, creating an empty one if absent.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    async fn load_or_create_cart(&self, user: UserId) -> Result<Cart, RepositoryError>;

    /// Run `f` on the user's locked cart (created if absent) and persist the
    /// result if `f` succeeds and changed the cart.
    ///
    /// # Errors
    ///
    /// Whatever `f` returns, or a `RepositoryError` converted into `E`.
    async fn mutate_cart<T, E, F>(&self, user: UserId, f: F) -> Result<T, E>
    where
        T: Send,
        E: From<RepositoryError> + Send,
        F: FnOnce(&mut Cart) -> Result<T, E> + Send;

    /// Turn the user's locked cart into an order in one unit of work.
    ///
    /// `f` builds the order and its first history entry from the cart. On
    /// an order number conflict `f` is called again, up to `attempts` times
    /// in total. On success the order is inserted and the cart cleared
    /// before the lock is released.
    ///
    /// # Errors
    ///
    /// Whatever `f` returns, or `RepositoryError::Conflict` (converted into
    /// `E`) once the attempts are used up.
    async fn checkout_cart<E, F>(&self, user: UserId, attempts: u32, f: F) -> Result<Order, E>
    where
        E: From<RepositoryError> + Send,
        F: FnMut(&Cart) -> Result<(Order, StatusHistoryEntry), E> + Send;
}

/// Orders and their status history.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert an order and its first history entry atomically.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the order number is taken.
    async fn insert_order(
        &self,
        order: &Order,
        first_entry: &StatusHistoryEntry,
    ) -> Result<(), RepositoryError>;

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// A user's orders, newest first.
    async fn list_orders_for_user(&self, user: UserId) -> Result<Vec<Order>, RepositoryError>;

    /// All orders, optionally filtered by status, newest first.
    async fn list_orders(
        &self,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, RepositoryError>;

    /// Run `f` on the locked order. If `f` succeeds, the order's mutable
    /// fields are written and the returned history entry (if any) appended,
    /// in one transaction.
    ///
    /// # Errors
    ///
    /// `RepositoryError::NotFound` (converted into `E`) if the order does not
    /// exist, or whatever `f` returns.
    async fn update_order<T, E, F>(&self, id: OrderId, f: F) -> Result<T, E>
    where
        T: Send,
        E: From<RepositoryError> + Send,
        F: FnOnce(&mut Order) -> Result<(T, Option<StatusHistoryEntry>), E> + Send;

    /// History entries in insertion order.
    async fn status_history(&self, id: OrderId)
    -> Result<Vec<StatusHistoryEntry>, RepositoryError>;

    /// Delete an order and its history. Returns `false` if it did not exist.
    async fn delete_order(&self, id: OrderId) -> Result<bool, RepositoryError>;
}

/// Local user accounts.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_subject(&self, subject: &str) -> Result<Option<User>, RepositoryError>;

    async fn find_user(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    /// Create a user with role set {customer}.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the subject is already registered.
    async fn register_user(
        &self,
        identity: &Identity,
        display_name: &str,
    ) -> Result<User, RepositoryError>;

    /// Add `role` to the user's role set. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    async fn grant_role(&self, id: UserId, role: Role) -> Result<User, RepositoryError>;

    /// Insert a restaurant under `slug` and grant its owner `Manager`, in
    /// one transaction. Returns the restaurant and the updated owner.
    ///
    /// # Errors
    ///
    /// `RepositoryError::NotFound` if the owner does not exist,
    /// `RepositoryError::Conflict` if the slug is taken. Nothing is written
    /// on error.
    async fn create_restaurant(
        &self,
        new: &NewRestaurant,
        slug: &str,
    ) -> Result<(Restaurant, User), RepositoryError>;
}

/// Current menu prices.
#[async_trait]
pub trait MenuCatalog: Send + Sync {
    async fn quote(&self, id: MenuItemId) -> Result<Option<MenuItemQuote>, RepositoryError>;
}

/// Everything a service needs from storage.
pub trait Store: CartStore + OrderStore + UserDirectory + MenuCatalog + Clone + 'static {}

impl<T> Store for T where T: CartStore + OrderStore + UserDirectory + MenuCatalog + Clone + 'static {}

/// `PostgreSQL`-backed store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool, for health checks.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}
