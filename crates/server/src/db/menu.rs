//! `MenuCatalog` over the read-only `forkline.menu_item` projection.

use async_trait::async_trait;

use forkline_core::{MenuItemId, MenuItemQuote, Money, RestaurantId};

use super::{MenuCatalog, PgStore, RepositoryError};

#[derive(sqlx::FromRow)]
struct MenuItemRow {
    id: MenuItemId,
    restaurant_id: RestaurantId,
    name: String,
    price: Money,
    is_available: bool,
}

#[async_trait]
impl MenuCatalog for PgStore {
    async fn quote(&self, id: MenuItemId) -> Result<Option<MenuItemQuote>, RepositoryError> {
        let row = sqlx::query_as::<_, MenuItemRow>(
            r"
            SELECT id, restaurant_id, name, price, is_available
            FROM forkline.menu_item
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| MenuItemQuote {
            id: r.id,
            restaurant_id: r.restaurant_id,
            name: r.name,
            price: r.price,
            is_available: r.is_available,
        }))
    }
}
