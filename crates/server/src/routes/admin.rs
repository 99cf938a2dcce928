//! Admin route handlers. Authorization happens in the services.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::Deserialize;

use forkline_core::{DomainError, OrderId, Role, UserId};

use crate::db::Store;
use crate::error::Result;
use crate::middleware::CurrentUser;
use crate::models::{NewRestaurant, Restaurant, User};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GrantRoleRequest {
    pub role: String,
}

/// `DELETE /admin/orders/{id}`
pub async fn delete_order<S: Store>(
    State(state): State<AppState<S>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<OrderId>,
) -> Result<StatusCode> {
    state.orders().delete_order(&user.actor(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /admin/users/{id}/roles`
pub async fn grant_role<S: Store>(
    State(state): State<AppState<S>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i32>,
    body: std::result::Result<Json<GrantRoleRequest>, JsonRejection>,
) -> Result<Json<User>> {
    let Json(request) = body?;
    let role: Role = request.role.parse().map_err(DomainError::from)?;
    let granted = state
        .accounts()
        .grant_role(&user.actor(), UserId::new(id), role)
        .await?;
    Ok(Json(granted))
}

/// `POST /admin/restaurants`
pub async fn create_restaurant<S: Store>(
    State(state): State<AppState<S>>,
    CurrentUser(user): CurrentUser,
    body: std::result::Result<Json<NewRestaurant>, JsonRejection>,
) -> Result<(StatusCode, Json<Restaurant>)> {
    let Json(request) = body?;
    let restaurant = state
        .accounts()
        .create_restaurant_for_user(&user.actor(), request)
        .await?;
    Ok((StatusCode::CREATED, Json(restaurant)))
}
