//! `UserDirectory` over the `forkline.app_user` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use forkline_core::{Email, Role, RoleSet, UserId};

use super::restaurants::insert_restaurant;
use super::{PgStore, RepositoryError, UserDirectory};
use crate::models::{Identity, NewRestaurant, Restaurant, User};

const USER_COLUMNS: &str = "id, subject, email, display_name, roles, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: UserId,
    subject: String,
    email: String,
    display_name: String,
    roles: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&r.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;
        let roles = r
            .roles
            .iter()
            .map(|name| name.parse::<Role>())
            .collect::<Result<RoleSet, _>>()
            .map_err(|e| RepositoryError::DataCorruption(format!("invalid role in database: {e}")))?;

        Ok(Self {
            id: r.id,
            subject: r.subject,
            email,
            display_name: r.display_name,
            roles,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

async fn select_user_for_update(
    conn: &mut PgConnection,
    id: UserId,
) -> Result<Option<UserRow>, RepositoryError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM forkline.app_user WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(row)
}

/// Add `role` to a user on `conn`, writing only if it was missing.
async fn grant_role_on(
    conn: &mut PgConnection,
    id: UserId,
    role: Role,
) -> Result<User, RepositoryError> {
    let row = select_user_for_update(&mut *conn, id)
        .await?
        .ok_or(RepositoryError::NotFound)?;
    let mut user = User::try_from(row)?;

    if user.roles.insert(role) {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r"
            UPDATE forkline.app_user
            SET roles = $2, updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(user.roles.names())
        .fetch_one(&mut *conn)
        .await?;
        user = User::try_from(row)?;
    }
    Ok(user)
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn find_by_subject(&self, subject: &str) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM forkline.app_user WHERE subject = $1"
        ))
        .bind(subject)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM forkline.app_user WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn register_user(
        &self,
        identity: &Identity,
        display_name: &str,
    ) -> Result<User, RepositoryError> {
        let roles = RoleSet::from(Role::Customer).names();
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r"
            INSERT INTO forkline.app_user (subject, email, display_name, roles)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(&identity.subject)
        .bind(&identity.email)
        .bind(display_name)
        .bind(&roles)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_insert(e, "user"))?;

        User::try_from(row)
    }

    async fn grant_role(&self, id: UserId, role: Role) -> Result<User, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let user = grant_role_on(&mut *tx, id, role).await?;
        tx.commit().await?;
        Ok(user)
    }

    async fn create_restaurant(
        &self,
        new: &NewRestaurant,
        slug: &str,
    ) -> Result<(Restaurant, User), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let owner = grant_role_on(&mut *tx, new.owner_id, Role::Manager).await?;
        let restaurant = insert_restaurant(&mut *tx, new, slug).await?;
        tx.commit().await?;
        Ok((restaurant, owner))
    }
}
