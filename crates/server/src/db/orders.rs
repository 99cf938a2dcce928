//! `OrderStore` over `forkline.customer_order` and
//! `forkline.order_status_history`.
//!
//! The item snapshot is stored as JSONB so it stays frozen regardless of
//! later menu changes. History rows are ordered by an identity column.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use sqlx::types::Json;

use forkline_core::{
    AddressId, HistoryEntryId, Money, Order, OrderId, OrderLine, OrderNumber, OrderStatus,
    OrderType, PaymentMethod, PaymentStatus, Pricing, RestaurantId, StatusHistoryEntry, UserId,
};

use super::{OrderStore, PgStore, RepositoryError};

const ORDER_COLUMNS: &str = r"
    id, order_number, user_id, restaurant_id, delivery_address_id, order_type, items,
    subtotal, discount, delivery_fee, tax, total, payment_method, payment_status, status,
    special_instructions, scheduled_time, estimated_delivery_time, created_at, updated_at
";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    order_number: OrderNumber,
    user_id: UserId,
    restaurant_id: RestaurantId,
    delivery_address_id: Option<AddressId>,
    order_type: OrderType,
    items: Json<Vec<OrderLine>>,
    subtotal: Money,
    discount: Money,
    delivery_fee: Money,
    tax: Money,
    total: Money,
    payment_method: PaymentMethod,
    payment_status: PaymentStatus,
    status: OrderStatus,
    special_instructions: Option<String>,
    scheduled_time: Option<DateTime<Utc>>,
    estimated_delivery_time: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<OrderRow> for Order {
    fn from(r: OrderRow) -> Self {
        Self {
            id: r.id,
            order_number: r.order_number,
            user_id: r.user_id,
            restaurant_id: r.restaurant_id,
            delivery_address_id: r.delivery_address_id,
            order_type: r.order_type,
            items: r.items.0,
            pricing: Pricing {
                subtotal: r.subtotal,
                discount: r.discount,
                delivery_fee: r.delivery_fee,
                tax: r.tax,
                total: r.total,
            },
            payment_method: r.payment_method,
            payment_status: r.payment_status,
            status: r.status,
            special_instructions: r.special_instructions,
            scheduled_time: r.scheduled_time,
            estimated_delivery_time: r.estimated_delivery_time,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    id: HistoryEntryId,
    order_id: OrderId,
    status: OrderStatus,
    actor_id: UserId,
    note: Option<String>,
    recorded_at: DateTime<Utc>,
}

impl From<HistoryRow> for StatusHistoryEntry {
    fn from(r: HistoryRow) -> Self {
        Self {
            id: r.id,
            order_id: r.order_id,
            status: r.status,
            actor: r.actor_id,
            note: r.note,
            recorded_at: r.recorded_at,
        }
    }
}

async fn insert_history(
    conn: &mut PgConnection,
    entry: &StatusHistoryEntry,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        INSERT INTO forkline.order_status_history
            (id, order_id, status, actor_id, note, recorded_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ",
    )
    .bind(entry.id)
    .bind(entry.order_id)
    .bind(entry.status)
    .bind(entry.actor)
    .bind(&entry.note)
    .bind(entry.recorded_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Insert the order row and its first history row on `conn`.
pub(super) async fn insert_order_rows(
    conn: &mut PgConnection,
    order: &Order,
    first_entry: &StatusHistoryEntry,
) -> Result<(), RepositoryError> {
    sqlx::query(&format!(
        r"
        INSERT INTO forkline.customer_order ({ORDER_COLUMNS})
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
        "
    ))
    .bind(order.id)
    .bind(&order.order_number)
    .bind(order.user_id)
    .bind(order.restaurant_id)
    .bind(order.delivery_address_id)
    .bind(order.order_type)
    .bind(Json(&order.items))
    .bind(order.pricing.subtotal)
    .bind(order.pricing.discount)
    .bind(order.pricing.delivery_fee)
    .bind(order.pricing.tax)
    .bind(order.pricing.total)
    .bind(order.payment_method)
    .bind(order.payment_status)
    .bind(order.status)
    .bind(&order.special_instructions)
    .bind(order.scheduled_time)
    .bind(order.estimated_delivery_time)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| RepositoryError::from_insert(e, "order number"))?;

    insert_history(conn, first_entry).await
}

#[async_trait]
impl OrderStore for PgStore {
    async fn insert_order(
        &self,
        order: &Order,
        first_entry: &StatusHistoryEntry,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        insert_order_rows(&mut *tx, order, first_entry).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM forkline.customer_order WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Order::from))
    }

    async fn list_orders_for_user(&self, user: UserId) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            SELECT {ORDER_COLUMNS} FROM forkline.customer_order
            WHERE user_id = $1
            ORDER BY created_at DESC
            "
        ))
        .bind(user)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Order::from).collect())
    }

    async fn list_orders(
        &self,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            SELECT {ORDER_COLUMNS} FROM forkline.customer_order
            WHERE $1::text IS NULL OR status = $1
            ORDER BY created_at DESC
            "
        ))
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Order::from).collect())
    }

    async fn update_order<T, E, F>(&self, id: OrderId, f: F) -> Result<T, E>
    where
        T: Send,
        E: From<RepositoryError> + Send,
        F: FnOnce(&mut Order) -> Result<(T, Option<StatusHistoryEntry>), E> + Send,
    {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM forkline.customer_order WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(RepositoryError::from)?
        .ok_or(RepositoryError::NotFound)?;

        let mut order = Order::from(row);
        let before = order.clone();
        let (out, entry) = f(&mut order)?;

        if order != before {
            sqlx::query(
                r"
                UPDATE forkline.customer_order
                SET status = $2, payment_status = $3, estimated_delivery_time = $4,
                    updated_at = $5
                WHERE id = $1
                ",
            )
            .bind(order.id)
            .bind(order.status)
            .bind(order.payment_status)
            .bind(order.estimated_delivery_time)
            .bind(order.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(RepositoryError::from)?;
        }
        if let Some(entry) = entry {
            insert_history(&mut *tx, &entry).await?;
        }

        tx.commit().await.map_err(RepositoryError::from)?;
        Ok(out)
    }

    async fn status_history(
        &self,
        id: OrderId,
    ) -> Result<Vec<StatusHistoryEntry>, RepositoryError> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r"
            SELECT id, order_id, status, actor_id, note, recorded_at
            FROM forkline.order_status_history
            WHERE order_id = $1
            ORDER BY seq
            ",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(StatusHistoryEntry::from).collect())
    }

    async fn delete_order(&self, id: OrderId) -> Result<bool, RepositoryError> {
        // history rows go with ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM forkline.customer_order WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
