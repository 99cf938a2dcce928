//! `CartStore` over `forkline.cart` and `forkline.cart_item`.
//!
//! Every call runs in one transaction. The cart row is created if missing
//! (`ON CONFLICT DO NOTHING` keeps concurrent first accesses safe) and then
//! locked with `FOR UPDATE`, so mutations for the same user are serialized.
//! Item order is kept in `line_no`.
//!
//! Checkout inserts the order inside the cart's transaction. Each order
//! number attempt gets its own savepoint, so a unique violation rolls back
//! only that attempt.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Connection, PgConnection};
use uuid::Uuid;

use forkline_core::{
    Cart, CartId, CartItem, CartItemId, MenuItemId, Money, Order, RestaurantId,
    StatusHistoryEntry, UserId,
};

use super::orders::insert_order_rows;
use super::{CartStore, PgStore, RepositoryError};

#[derive(sqlx::FromRow)]
struct CartRow {
    id: CartId,
    user_id: UserId,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct CartItemRow {
    id: CartItemId,
    menu_item_id: MenuItemId,
    restaurant_id: RestaurantId,
    name: String,
    quantity: i32,
    price_per_item: Money,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CartItemRow> for CartItem {
    fn from(r: CartItemRow) -> Self {
        Self {
            id: r.id,
            menu_item_id: r.menu_item_id,
            restaurant_id: r.restaurant_id,
            name: r.name,
            quantity: r.quantity,
            price_per_item: r.price_per_item,
            // recomputed by Cart::restore
            total_price: Money::ZERO,
            notes: r.notes,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Create the cart if absent, lock it, and load its items.
async fn lock_cart(conn: &mut PgConnection, user: UserId) -> Result<Cart, RepositoryError> {
    sqlx::query(
        r"
        INSERT INTO forkline.cart (id, user_id)
        VALUES ($1, $2)
        ON CONFLICT (user_id) DO NOTHING
        ",
    )
    .bind(CartId::generate())
    .bind(user)
    .execute(&mut *conn)
    .await?;

    let cart = sqlx::query_as::<_, CartRow>(
        r"
        SELECT id, user_id, version, created_at, updated_at
        FROM forkline.cart
        WHERE user_id = $1
        FOR UPDATE
        ",
    )
    .bind(user)
    .fetch_one(&mut *conn)
    .await?;

    let items = sqlx::query_as::<_, CartItemRow>(
        r"
        SELECT id, menu_item_id, restaurant_id, name, quantity, price_per_item,
               notes, created_at, updated_at
        FROM forkline.cart_item
        WHERE cart_id = $1
        ORDER BY line_no
        ",
    )
    .bind(cart.id)
    .fetch_all(&mut *conn)
    .await?;

    Cart::restore(
        cart.id,
        cart.user_id,
        items.into_iter().map(CartItem::from).collect(),
        cart.version,
        cart.created_at,
        cart.updated_at,
    )
    .map_err(|e| RepositoryError::DataCorruption(format!("cart {}: {e}", cart.id)))
}

/// Write items, totals and version back.
async fn save_cart(conn: &mut PgConnection, cart: &Cart) -> Result<(), RepositoryError> {
    let keep: Vec<Uuid> = cart.items().iter().map(|i| i.id.as_uuid()).collect();
    sqlx::query("DELETE FROM forkline.cart_item WHERE cart_id = $1 AND NOT (id = ANY($2))")
        .bind(cart.id())
        .bind(&keep)
        .execute(&mut *conn)
        .await?;

    for (line_no, item) in (0_i32..).zip(cart.items()) {
        sqlx::query(
            r"
            INSERT INTO forkline.cart_item
                (id, cart_id, menu_item_id, restaurant_id, name, quantity,
                 price_per_item, total_price, notes, line_no, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO UPDATE SET
                quantity = EXCLUDED.quantity,
                total_price = EXCLUDED.total_price,
                notes = EXCLUDED.notes,
                line_no = EXCLUDED.line_no,
                updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(item.id)
        .bind(cart.id())
        .bind(item.menu_item_id)
        .bind(item.restaurant_id)
        .bind(&item.name)
        .bind(item.quantity)
        .bind(item.price_per_item)
        .bind(item.total_price)
        .bind(&item.notes)
        .bind(line_no)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| RepositoryError::from_insert(e, "cart item"))?;
    }

    sqlx::query(
        r"
        UPDATE forkline.cart
        SET total_items = $2, total_amount = $3, version = $4, updated_at = $5
        WHERE id = $1
        ",
    )
    .bind(cart.id())
    .bind(cart.total_items())
    .bind(cart.total_amount())
    .bind(cart.version())
    .bind(cart.updated_at())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[async_trait]
impl CartStore for PgStore {
    async fn load_or_create_cart(&self, user: UserId) -> Result<Cart, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let cart = lock_cart(&mut *tx, user).await?;
        tx.commit().await?;
        Ok(cart)
    }

    async fn mutate_cart<T, E, F>(&self, user: UserId, f: F) -> Result<T, E>
    where
        T: Send,
        E: From<RepositoryError> + Send,
        F: FnOnce(&mut Cart) -> Result<T, E> + Send,
    {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        let mut cart = lock_cart(&mut *tx, user).await?;
        let version = cart.version();

        // dropping `tx` without commit rolls back
        let out = f(&mut cart)?;

        if cart.version() != version {
            save_cart(&mut *tx, &cart).await?;
        }
        tx.commit().await.map_err(RepositoryError::from)?;
        Ok(out)
    }

    async fn checkout_cart<E, F>(&self, user: UserId, attempts: u32, mut f: F) -> Result<Order, E>
    where
        E: From<RepositoryError> + Send,
        F: FnMut(&Cart) -> Result<(Order, StatusHistoryEntry), E> + Send,
    {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        let mut cart = lock_cart(&mut *tx, user).await?;

        for _ in 0..attempts.max(1) {
            let (order, first_entry) = f(&cart)?;

            let mut attempt = Connection::begin(&mut *tx)
                .await
                .map_err(RepositoryError::from)?;
            match insert_order_rows(&mut *attempt, &order, &first_entry).await {
                Ok(()) => {
                    attempt.commit().await.map_err(RepositoryError::from)?;
                    cart.clear(order.created_at);
                    save_cart(&mut *tx, &cart).await?;
                    tx.commit().await.map_err(RepositoryError::from)?;
                    return Ok(order);
                }
                Err(RepositoryError::Conflict(_)) => {
                    attempt.rollback().await.map_err(RepositoryError::from)?;
                }
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
