//! Order service: placement, checkout and the status lifecycle.
//!
//! Order numbers are random, so two orders can draw the same one. The store
//! enforces uniqueness; a `Conflict` on insert draws a fresh number, up to a
//! configurable number of attempts.
//!
//! `POST /orders` carries only menu item ids and quantities. Names and unit
//! prices come from the menu catalog, never from the request.
//!
//! Checkout runs inside [`CartStore::checkout_cart`]: the cart stays locked
//! while the order is built and inserted and the cart is cleared, so two
//! concurrent checkouts of one cart produce one order.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, instrument, warn};

use forkline_core::order::lines_subtotal;
use forkline_core::{
    Actor, AddressId, DomainError, MenuItemId, Money, NewOrder, Order, OrderId, OrderLine,
    OrderNumber, OrderStatus, OrderType, PaymentMethod, PaymentStatus, Pricing, RestaurantId,
    StatusHistoryEntry, access, lifecycle,
};

use super::ServiceError;
use crate::db::{CartStore, MenuCatalog, OrderStore, RepositoryError, Store};

/// Default number of order numbers tried before giving up.
pub const DEFAULT_ORDER_NUMBER_ATTEMPTS: u32 = 5;

/// Supplies candidate order numbers.
pub trait OrderNumberSource: Send + Sync + 'static {
    fn next_number(&self) -> OrderNumber;
}

/// Draws order numbers from the thread-local CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomOrderNumbers;

impl OrderNumberSource for RandomOrderNumbers {
    fn next_number(&self) -> OrderNumber {
        OrderNumber::from_entropy(rand::random())
    }
}

/// One requested item of `POST /orders`.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaceOrderItem {
    pub menu_item_id: MenuItemId,
    pub quantity: i32,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Body of `POST /orders`.
///
/// `total` is checked against the quoted subtotal and the given discount,
/// delivery fee and tax.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaceOrderRequest {
    pub restaurant_id: RestaurantId,
    #[serde(default)]
    pub delivery_address_id: Option<AddressId>,
    pub order_type: OrderType,
    pub items: Vec<PlaceOrderItem>,
    #[serde(default)]
    pub discount: Money,
    #[serde(default)]
    pub delivery_fee: Money,
    #[serde(default)]
    pub tax: Money,
    pub total: Money,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub special_instructions: Option<String>,
    #[serde(default)]
    pub scheduled_time: Option<DateTime<Utc>>,
}

impl PlaceOrderRequest {
    fn into_new_order(self, actor: &Actor, items: Vec<OrderLine>, subtotal: Money) -> NewOrder {
        NewOrder {
            user_id: actor.id,
            restaurant_id: self.restaurant_id,
            delivery_address_id: self.delivery_address_id,
            order_type: self.order_type,
            items,
            pricing: Pricing {
                subtotal,
                discount: self.discount,
                delivery_fee: self.delivery_fee,
                tax: self.tax,
                total: self.total,
            },
            payment_method: self.payment_method,
            special_instructions: self.special_instructions,
            scheduled_time: self.scheduled_time,
        }
    }
}

/// Body of `POST /cart/checkout`. The subtotal comes from the cart.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub delivery_address_id: Option<AddressId>,
    pub order_type: OrderType,
    #[serde(default)]
    pub discount: Money,
    #[serde(default)]
    pub delivery_fee: Money,
    #[serde(default)]
    pub tax: Money,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub special_instructions: Option<String>,
    #[serde(default)]
    pub scheduled_time: Option<DateTime<Utc>>,
}

pub struct OrderService<S> {
    store: S,
    numbers: Arc<dyn OrderNumberSource>,
    attempts: u32,
}

impl<S: Clone> Clone for OrderService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            numbers: Arc::clone(&self.numbers),
            attempts: self.attempts,
        }
    }
}

impl<S> std::fmt::Debug for OrderService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderService")
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}

impl<S: Store> OrderService<S> {
    /// Create a service drawing random order numbers.
    #[must_use]
    pub fn new(store: S, attempts: u32) -> Self {
        Self::with_numbers(store, Arc::new(RandomOrderNumbers), attempts)
    }

    /// Create a service with a custom order number source.
    #[must_use]
    pub fn with_numbers(store: S, numbers: Arc<dyn OrderNumberSource>, attempts: u32) -> Self {
        Self {
            store,
            numbers,
            attempts: attempts.max(1),
        }
    }

    /// Place an order from an explicit item list, priced from the menu.
    ///
    /// # Errors
    ///
    /// - `NotFound` if a menu item does not exist or is unavailable.
    /// - `InvalidArgument` if an item belongs to another restaurant or the
    ///   amounts do not add up.
    /// - `Conflict` if no unique order number was found within the
    ///   configured attempts.
    #[instrument(skip(self, request), fields(user_id = %actor.id, restaurant_id = %request.restaurant_id))]
    pub async fn place_order(
        &self,
        actor: &Actor,
        mut request: PlaceOrderRequest,
    ) -> Result<Order, ServiceError> {
        let mut lines = Vec::with_capacity(request.items.len());
        for item in std::mem::take(&mut request.items) {
            let quote = self
                .store
                .quote(item.menu_item_id)
                .await?
                .ok_or(DomainError::NotFound("menu item"))?;
            lines.push(OrderLine::from_quote(
                &quote,
                request.restaurant_id,
                item.quantity,
                item.notes,
            )?);
        }
        let subtotal = lines_subtotal(&lines)?;
        self.place(request.into_new_order(actor, lines, subtotal)).await
    }

    async fn place(&self, new: NewOrder) -> Result<Order, ServiceError> {
        let (mut order, entry) = Order::place(new, self.numbers.next_number(), Utc::now())?;

        for attempt in 1..=self.attempts {
            match self.store.insert_order(&order, &entry).await {
                Ok(()) => {
                    info!(
                        order_id = %order.id,
                        order_number = %order.order_number,
                        total = %order.pricing.total,
                        "order placed"
                    );
                    return Ok(order);
                }
                Err(RepositoryError::Conflict(_)) => {
                    warn!(
                        attempt,
                        order_number = %order.order_number,
                        "order number collision, drawing another"
                    );
                    order.order_number = self.numbers.next_number();
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(DomainError::Conflict(format!(
            "no unique order number after {} attempts",
            self.attempts
        ))
        .into())
    }

    /// Turn the actor's cart into an order and empty the cart.
    ///
    /// # Errors
    ///
    /// `FailedPrecondition` if the cart is empty or spans several
    /// restaurants, `InvalidArgument` if the amounts are out of range,
    /// `Conflict` as for [`Self::place_order`].
    #[instrument(skip(self, request), fields(user_id = %actor.id))]
    pub async fn checkout(
        &self,
        actor: &Actor,
        request: CheckoutRequest,
    ) -> Result<Order, ServiceError> {
        let user_id = actor.id;
        let numbers = Arc::clone(&self.numbers);
        let mut drawn = 0_u32;

        let order = self
            .store
            .checkout_cart(user_id, self.attempts, move |cart| {
                drawn += 1;
                if drawn > 1 {
                    warn!(attempt = drawn, "order number collision, drawing another");
                }
                let new = NewOrder {
                    user_id,
                    restaurant_id: cart.sole_restaurant()?,
                    delivery_address_id: request.delivery_address_id,
                    order_type: request.order_type,
                    items: cart.order_lines(),
                    pricing: Pricing::derive(
                        cart.total_amount(),
                        request.discount,
                        request.delivery_fee,
                        request.tax,
                    )?,
                    payment_method: request.payment_method,
                    special_instructions: request.special_instructions.clone(),
                    scheduled_time: request.scheduled_time,
                };
                Ok::<_, ServiceError>(Order::place(new, numbers.next_number(), Utc::now())?)
            })
            .await?;

        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.pricing.total,
            "cart checked out"
        );
        Ok(order)
    }

    /// # Errors
    ///
    /// `Forbidden` if the actor neither owns the order nor holds a staff
    /// role. A missing order is `NotFound` for staff and `Forbidden` for
    /// everyone else.
    pub async fn get_order(&self, actor: &Actor, id: OrderId) -> Result<Order, ServiceError> {
        let order = self
            .store
            .get_order(id)
            .await?
            .ok_or_else(|| missing_order(actor))?;
        access::authorize_view(actor, order.user_id).into_result(actor)?;
        Ok(order)
    }

    /// The actor's own orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Repository` if storage fails.
    pub async fn list_my_orders(&self, actor: &Actor) -> Result<Vec<Order>, ServiceError> {
        Ok(self.store.list_orders_for_user(actor.id).await?)
    }

    /// All orders, optionally in one status. Staff only.
    ///
    /// # Errors
    ///
    /// `Forbidden` for non-staff actors.
    pub async fn list_orders(
        &self,
        actor: &Actor,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, ServiceError> {
        access::authorize_staff(actor).into_result(actor)?;
        Ok(self.store.list_orders(status).await?)
    }

    /// Status history in the order it was recorded.
    ///
    /// # Errors
    ///
    /// As [`Self::get_order`].
    pub async fn order_history(
        &self,
        actor: &Actor,
        id: OrderId,
    ) -> Result<Vec<StatusHistoryEntry>, ServiceError> {
        self.get_order(actor, id).await?;
        Ok(self.store.status_history(id).await?)
    }

    /// Move an order to `to`.
    ///
    /// Re-submitting the current status returns the order unchanged and
    /// records nothing.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Forbidden` or `FailedPrecondition`; the order and its
    /// history are unchanged on error.
    #[instrument(skip(self, note), fields(user_id = %actor.id, order_id = %id, to = %to))]
    pub async fn transition(
        &self,
        actor: &Actor,
        id: OrderId,
        to: OrderStatus,
        note: Option<String>,
    ) -> Result<Order, ServiceError> {
        self.apply(actor, id, move |order, actor, now| {
            lifecycle::transition(order, to, actor, note, now)
        })
        .await
    }

    /// Cancel an order with an optional reason.
    ///
    /// # Errors
    ///
    /// As [`Self::transition`].
    #[instrument(skip(self, reason), fields(user_id = %actor.id, order_id = %id))]
    pub async fn cancel(
        &self,
        actor: &Actor,
        id: OrderId,
        reason: Option<String>,
    ) -> Result<Order, ServiceError> {
        self.apply(actor, id, move |order, actor, now| {
            lifecycle::cancel(order, actor, reason, now)
        })
        .await
    }

    /// Run a lifecycle step on the locked order and append its entry.
    async fn apply<F>(&self, actor: &Actor, id: OrderId, step: F) -> Result<Order, ServiceError>
    where
        F: FnOnce(
                &mut Order,
                &Actor,
                DateTime<Utc>,
            ) -> Result<Option<StatusHistoryEntry>, DomainError>
            + Send,
    {
        let actor = *actor;
        self.store
            .update_order(id, move |order| {
                let from = order.status;
                let entry = step(order, &actor, Utc::now())?;
                if entry.is_some() {
                    info!(
                        order_number = %order.order_number,
                        %from,
                        to = %order.status,
                        "order status changed"
                    );
                }
                Ok::<_, ServiceError>((order.clone(), entry))
            })
            .await
            .map_err(|e| hide_missing(&actor, e))
    }

    /// Set the estimated delivery time `minutes` from now. Manager or admin.
    ///
    /// # Errors
    ///
    /// `Forbidden`, `NotFound`, `InvalidArgument` for non-positive minutes,
    /// `FailedPrecondition` for terminal orders.
    #[instrument(skip(self), fields(user_id = %actor.id, order_id = %id))]
    pub async fn set_estimated_delivery(
        &self,
        actor: &Actor,
        id: OrderId,
        minutes: i64,
    ) -> Result<Order, ServiceError> {
        access::authorize_dispatch(actor).into_result(actor)?;
        self.store
            .update_order(id, move |order| {
                order.set_estimated_delivery(minutes, Utc::now())?;
                Ok::<_, ServiceError>((order.clone(), None))
            })
            .await
            .map_err(|e| e.not_found_as("order"))
    }

    /// Record out-of-band settlement. Admin only.
    ///
    /// # Errors
    ///
    /// `Forbidden` or `NotFound`.
    #[instrument(skip(self), fields(user_id = %actor.id, order_id = %id, payment_status = %payment_status))]
    pub async fn set_payment_status(
        &self,
        actor: &Actor,
        id: OrderId,
        payment_status: PaymentStatus,
    ) -> Result<Order, ServiceError> {
        access::authorize_admin(actor).into_result(actor)?;
        let order = self
            .store
            .update_order(id, move |order| {
                order.set_payment_status(payment_status, Utc::now());
                Ok::<_, ServiceError>((order.clone(), None))
            })
            .await
            .map_err(|e| e.not_found_as("order"))?;
        info!(order_number = %order.order_number, "payment status recorded");
        Ok(order)
    }

    /// Delete an order and its history. Admin only.
    ///
    /// # Errors
    ///
    /// `Forbidden` or `NotFound`.
    #[instrument(skip(self), fields(user_id = %actor.id, order_id = %id))]
    pub async fn delete_order(&self, actor: &Actor, id: OrderId) -> Result<(), ServiceError> {
        access::authorize_admin(actor).into_result(actor)?;
        if !self.store.delete_order(id).await? {
            return Err(DomainError::NotFound("order").into());
        }
        info!("order deleted");
        Ok(())
    }
}

/// What a caller learns about an order that does not exist. Only staff
/// can tell a missing order from someone else's.
fn missing_order(actor: &Actor) -> DomainError {
    if actor.is_staff() {
        DomainError::NotFound("order")
    } else {
        DomainError::Forbidden
    }
}

fn hide_missing(actor: &Actor, e: ServiceError) -> ServiceError {
    match e {
        ServiceError::Domain(DomainError::NotFound(_)) => missing_order(actor).into(),
        other => other,
    }
}
