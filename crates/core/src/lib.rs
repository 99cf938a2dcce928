//! Forkline Core - the order lifecycle and cart-consistency engine.
//!
//! This crate holds every rule of the ordering domain:
//! - [`cart`] - the per-user cart aggregate and its totals invariant
//! - [`order`] - the order factory (validation and immutable snapshots)
//! - [`lifecycle`] - the order status state machine
//! - [`access`] - role-based authorization decisions
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no
//! database access, no HTTP. Storage implementations in `forkline-server`
//! load an aggregate under a lock, hand it to the functions here, and persist
//! the result. Every call takes the acting user explicitly; nothing is read
//! from ambient request state.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod access;
pub mod cart;
pub mod error;
pub mod lifecycle;
pub mod order;
pub mod types;

pub use access::{Actor, Decision, DenyReason};
pub use cart::{Cart, CartItem, MenuItemQuote};
pub use error::DomainError;
pub use order::{NewOrder, Order, OrderLine, Pricing, StatusHistoryEntry};
pub use types::*;
