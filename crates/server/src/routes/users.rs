//! Account route handlers.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::Deserialize;

use crate::db::Store;
use crate::error::Result;
use crate::middleware::{CurrentUser, VerifiedIdentity};
use crate::models::User;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub display_name: String,
}

/// `POST /users/me`
pub async fn register<S: Store>(
    State(state): State<AppState<S>>,
    VerifiedIdentity(identity): VerifiedIdentity,
    body: std::result::Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<User>)> {
    let Json(body) = body?;
    let user = state
        .accounts()
        .register(&identity, &body.display_name)
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// `GET /users/me`
pub async fn me(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}
