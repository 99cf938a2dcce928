//! Core types for Forkline.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod money;
pub mod order_number;
pub mod role;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use money::{Money, MoneyRangeError};
pub use order_number::{OrderNumber, OrderNumberError};
pub use role::{Role, RoleSet};
pub use status::*;
