//! User account commands.
//!
//! `grant-role` writes directly through the store, so it works before any
//! admin exists. The HTTP endpoint for the same operation is admin-only.

use forkline_core::{ParseEnumError, Role, UserId};
use forkline_server::config::{self, ConfigError};
use forkline_server::db::{self, PgStore, RepositoryError, UserDirectory};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UserError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Database connection error: {0}")]
    Connect(#[from] sqlx::Error),

    #[error(transparent)]
    InvalidRole(#[from] ParseEnumError),

    #[error("No user with id {0}")]
    NotFound(UserId),

    #[error(transparent)]
    Repository(RepositoryError),
}

/// Add `role` to user `user_id`.
///
/// # Errors
///
/// Returns `UserError` if the role is unknown, the user does not exist, or
/// the database fails.
pub async fn grant_role(user_id: i32, role: &str) -> Result<(), UserError> {
    let role: Role = role.parse()?;
    let user_id = UserId::new(user_id);

    let pool = db::create_pool(&config::database_url_from_env()?).await?;
    let store = PgStore::new(pool);

    let user = store
        .grant_role(user_id, role)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => UserError::NotFound(user_id),
            other => UserError::Repository(other),
        })?;

    tracing::info!(
        user_id = %user.id,
        roles = ?user.roles.names(),
        "Role granted"
    );
    Ok(())
}
