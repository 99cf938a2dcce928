//! Order route handlers.
//!
//! Status values arrive as strings and are parsed here, so an unknown
//! status is a 400 `InvalidArgument` rather than a body decoding error.

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
};
use serde::Deserialize;

use forkline_core::{DomainError, Order, OrderId, OrderStatus, PaymentStatus, StatusHistoryEntry};

use crate::db::Store;
use crate::error::Result;
use crate::middleware::CurrentUser;
use crate::services::PlaceOrderRequest;
use crate::state::AppState;

type Body<T> = std::result::Result<Json<T>, JsonRejection>;

#[derive(Debug, Deserialize)]
pub struct QueueQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub status: String,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EtaRequest {
    pub minutes: i64,
}

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub payment_status: String,
}

fn parse<T>(value: &str) -> std::result::Result<T, DomainError>
where
    T: std::str::FromStr<Err = forkline_core::ParseEnumError>,
{
    value.parse::<T>().map_err(DomainError::from)
}

/// `POST /orders`
pub async fn place<S: Store>(
    State(state): State<AppState<S>>,
    CurrentUser(user): CurrentUser,
    body: Body<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<Order>)> {
    let Json(request) = body?;
    let order = state.orders().place_order(&user.actor(), request).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// `GET /orders`
pub async fn mine<S: Store>(
    State(state): State<AppState<S>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<Order>>> {
    Ok(Json(state.orders().list_my_orders(&user.actor()).await?))
}

/// `GET /orders/queue?status=`
pub async fn queue<S: Store>(
    State(state): State<AppState<S>>,
    CurrentUser(user): CurrentUser,
    query: std::result::Result<Query<QueueQuery>, QueryRejection>,
) -> Result<Json<Vec<Order>>> {
    let Query(query) = query?;
    let status = query
        .status
        .as_deref()
        .map(parse::<OrderStatus>)
        .transpose()?;
    Ok(Json(state.orders().list_orders(&user.actor(), status).await?))
}

/// `GET /orders/{id}`
pub async fn show<S: Store>(
    State(state): State<AppState<S>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>> {
    Ok(Json(state.orders().get_order(&user.actor(), id).await?))
}

/// `GET /orders/{id}/history`
pub async fn history<S: Store>(
    State(state): State<AppState<S>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<OrderId>,
) -> Result<Json<Vec<StatusHistoryEntry>>> {
    Ok(Json(state.orders().order_history(&user.actor(), id).await?))
}

/// `PATCH /orders/{id}/status`
pub async fn transition<S: Store>(
    State(state): State<AppState<S>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<OrderId>,
    body: Body<TransitionRequest>,
) -> Result<Json<Order>> {
    let Json(request) = body?;
    let to = parse::<OrderStatus>(&request.status)?;
    let order = state
        .orders()
        .transition(&user.actor(), id, to, request.note)
        .await?;
    Ok(Json(order))
}

/// `POST /orders/{id}/cancel`
///
/// The body is optional.
pub async fn cancel<S: Store>(
    State(state): State<AppState<S>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<OrderId>,
    body: Body<CancelRequest>,
) -> Result<Json<Order>> {
    let request = match body {
        Ok(Json(request)) => request,
        Err(JsonRejection::MissingJsonContentType(_)) => CancelRequest::default(),
        Err(rejection) => return Err(rejection.into()),
    };
    let order = state
        .orders()
        .cancel(&user.actor(), id, request.reason)
        .await?;
    Ok(Json(order))
}

/// `PATCH /orders/{id}/eta`
pub async fn set_eta<S: Store>(
    State(state): State<AppState<S>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<OrderId>,
    body: Body<EtaRequest>,
) -> Result<Json<Order>> {
    let Json(request) = body?;
    let order = state
        .orders()
        .set_estimated_delivery(&user.actor(), id, request.minutes)
        .await?;
    Ok(Json(order))
}

/// `PATCH /orders/{id}/payment`
pub async fn set_payment<S: Store>(
    State(state): State<AppState<S>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<OrderId>,
    body: Body<PaymentRequest>,
) -> Result<Json<Order>> {
    let Json(request) = body?;
    let payment_status = parse::<PaymentStatus>(&request.payment_status)?;
    let order = state
        .orders()
        .set_payment_status(&user.actor(), id, payment_status)
        .await?;
    Ok(Json(order))
}
