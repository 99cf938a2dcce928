//! Rows of `forkline.restaurant`.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use forkline_core::{RestaurantId, UserId};

use super::RepositoryError;
use crate::models::{NewRestaurant, Restaurant};

#[derive(sqlx::FromRow)]
struct RestaurantRow {
    id: RestaurantId,
    slug: String,
    name: String,
    description: Option<String>,
    address: String,
    phone_number: Option<String>,
    owner_id: UserId,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RestaurantRow> for Restaurant {
    fn from(r: RestaurantRow) -> Self {
        Self {
            id: r.id,
            slug: r.slug,
            name: r.name,
            description: r.description,
            address: r.address,
            phone_number: r.phone_number,
            owner_id: r.owner_id,
            is_active: r.is_active,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

pub(super) async fn insert_restaurant(
    conn: &mut PgConnection,
    new: &NewRestaurant,
    slug: &str,
) -> Result<Restaurant, RepositoryError> {
    let row = sqlx::query_as::<_, RestaurantRow>(
        r"
        INSERT INTO forkline.restaurant
            (slug, name, description, address, phone_number, owner_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, slug, name, description, address, phone_number, owner_id,
                  is_active, created_at, updated_at
        ",
    )
    .bind(slug)
    .bind(&new.name)
    .bind(&new.description)
    .bind(&new.address)
    .bind(&new.phone_number)
    .bind(new.owner_id)
    .fetch_one(conn)
    .await
    .map_err(|e| RepositoryError::from_insert(e, "restaurant slug"))?;

    Ok(row.into())
}
