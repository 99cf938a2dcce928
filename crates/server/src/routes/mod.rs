//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! # Account
//! POST   /users/me                  - Register the verified identity
//! GET    /users/me                  - Current user
//!
//! # Cart
//! GET    /cart                      - Get or create cart
//! DELETE /cart                      - Clear cart
//! POST   /cart/items                - Add item
//! PATCH  /cart/items/{item_id}      - Update item
//! DELETE /cart/items/{item_id}      - Remove item
//! POST   /cart/checkout             - Checkout into an order
//!
//! # Orders
//! POST   /orders                    - Place order from an item list
//! GET    /orders                    - My orders
//! GET    /orders/queue?status=      - Staff order queue
//! GET    /orders/{id}               - Order detail
//! GET    /orders/{id}/history       - Status history
//! PATCH  /orders/{id}/status        - Transition
//! POST   /orders/{id}/cancel        - Cancel
//! PATCH  /orders/{id}/eta           - Set estimated delivery
//! PATCH  /orders/{id}/payment       - Set payment status (admin)
//!
//! # Admin
//! DELETE /admin/orders/{id}         - Delete order
//! POST   /admin/users/{id}/roles    - Grant role
//! POST   /admin/restaurants         - Create restaurant, owner becomes manager
//! ```
//!
//! Every route here requires a bearer token; `/health` lives in
//! [`crate::router`].

pub mod admin;
pub mod cart;
pub mod orders;
pub mod users;

use axum::{
    Router,
    routing::{delete, get, patch, post},
};

use crate::db::Store;
use crate::state::AppState;

/// Account routes.
pub fn user_routes<S: Store>() -> Router<AppState<S>> {
    Router::new().route("/me", get(users::me).post(users::register::<S>))
}

/// Cart routes.
pub fn cart_routes<S: Store>() -> Router<AppState<S>> {
    Router::new()
        .route("/", get(cart::show::<S>).delete(cart::clear::<S>))
        .route("/items", post(cart::add_item::<S>))
        .route(
            "/items/{item_id}",
            patch(cart::update_item::<S>).delete(cart::remove_item::<S>),
        )
        .route("/checkout", post(cart::checkout::<S>))
}

/// Order routes.
pub fn order_routes<S: Store>() -> Router<AppState<S>> {
    Router::new()
        .route("/", get(orders::mine::<S>).post(orders::place::<S>))
        .route("/queue", get(orders::queue::<S>))
        .route("/{id}", get(orders::show::<S>))
        .route("/{id}/history", get(orders::history::<S>))
        .route("/{id}/status", patch(orders::transition::<S>))
        .route("/{id}/cancel", post(orders::cancel::<S>))
        .route("/{id}/eta", patch(orders::set_eta::<S>))
        .route("/{id}/payment", patch(orders::set_payment::<S>))
}

/// Admin routes.
pub fn admin_routes<S: Store>() -> Router<AppState<S>> {
    Router::new()
        .route("/orders/{id}", delete(admin::delete_order::<S>))
        .route("/users/{id}/roles", post(admin::grant_role::<S>))
        .route("/restaurants", post(admin::create_restaurant::<S>))
}

/// All authenticated routes.
pub fn routes<S: Store>() -> Router<AppState<S>> {
    Router::new()
        .nest("/users", user_routes())
        .nest("/cart", cart_routes())
        .nest("/orders", order_routes())
        .nest("/admin", admin_routes())
}
