//! Cart route handlers.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};

use forkline_core::{Cart, CartItem, CartItemId, Order};

use crate::db::Store;
use crate::error::Result;
use crate::middleware::CurrentUser;
use crate::services::{AddItemRequest, CheckoutRequest, UpdateItemRequest};
use crate::state::AppState;

type Body<T> = std::result::Result<Json<T>, JsonRejection>;

/// `GET /cart`
pub async fn show<S: Store>(
    State(state): State<AppState<S>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Cart>> {
    Ok(Json(state.carts().get_or_create(&user.actor()).await?))
}

/// `DELETE /cart`
pub async fn clear<S: Store>(
    State(state): State<AppState<S>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Cart>> {
    Ok(Json(state.carts().clear(&user.actor()).await?))
}

/// `POST /cart/items`
pub async fn add_item<S: Store>(
    State(state): State<AppState<S>>,
    CurrentUser(user): CurrentUser,
    body: Body<AddItemRequest>,
) -> Result<(StatusCode, Json<CartItem>)> {
    let Json(request) = body?;
    let item = state.carts().add_item(&user.actor(), request).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// `PATCH /cart/items/{item_id}`
pub async fn update_item<S: Store>(
    State(state): State<AppState<S>>,
    CurrentUser(user): CurrentUser,
    Path(item_id): Path<CartItemId>,
    body: Body<UpdateItemRequest>,
) -> Result<Json<CartItem>> {
    let Json(request) = body?;
    let item = state
        .carts()
        .update_item(&user.actor(), item_id, request)
        .await?;
    Ok(Json(item))
}

/// `DELETE /cart/items/{item_id}`
pub async fn remove_item<S: Store>(
    State(state): State<AppState<S>>,
    CurrentUser(user): CurrentUser,
    Path(item_id): Path<CartItemId>,
) -> Result<StatusCode> {
    state.carts().remove_item(&user.actor(), item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /cart/checkout`
pub async fn checkout<S: Store>(
    State(state): State<AppState<S>>,
    CurrentUser(user): CurrentUser,
    body: Body<CheckoutRequest>,
) -> Result<(StatusCode, Json<Order>)> {
    let Json(request) = body?;
    let order = state.orders().checkout(&user.actor(), request).await?;
    Ok((StatusCode::CREATED, Json(order)))
}
