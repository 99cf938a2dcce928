//! Application services.
//!
//! Services load aggregates through the [`crate::db`] traits, apply the
//! engine's pure rules from `forkline-core`, and log what changed. They are
//! generic over [`crate::db::Store`] so the same code runs against
//! `PostgreSQL` and the in-memory store.
//!
//! # Services
//!
//! - `accounts` - Registration and role grants
//! - `auth` - Bearer-token identity verification
//! - `cart` - Per-user cart mutations
//! - `orders` - Order placement, checkout and the status lifecycle

pub mod accounts;
pub mod auth;
pub mod cart;
pub mod orders;

pub use accounts::{AccountService, ResolveError};
pub use auth::{AuthError, IdentityVerifier, JwtVerifier};
pub use cart::{AddItemRequest, CartService, UpdateItemRequest};
pub use orders::{
    CheckoutRequest, OrderNumberSource, OrderService, PlaceOrderItem, PlaceOrderRequest,
    RandomOrderNumbers,
};

use thiserror::Error;

use forkline_core::DomainError;

use crate::db::RepositoryError;

/// Errors returned by services.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// An engine rule rejected the operation.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Storage failed.
    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for ServiceError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound => Self::Domain(DomainError::NotFound("record")),
            RepositoryError::Conflict(msg) => Self::Domain(DomainError::Conflict(msg)),
            other => Self::Repository(other),
        }
    }
}

impl ServiceError {
    /// Name the missing entity in a `NotFound` coming from storage.
    #[must_use]
    pub fn not_found_as(self, what: &'static str) -> Self {
        match self {
            Self::Domain(DomainError::NotFound(_)) => Self::Domain(DomainError::NotFound(what)),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_errors_map_to_domain() {
        assert!(matches!(
            ServiceError::from(RepositoryError::NotFound).not_found_as("order"),
            ServiceError::Domain(DomainError::NotFound("order"))
        ));
        assert!(matches!(
            ServiceError::from(RepositoryError::Conflict("dup".into())),
            ServiceError::Domain(DomainError::Conflict(_))
        ));
        assert!(matches!(
            ServiceError::from(RepositoryError::DataCorruption("bad".into())),
            ServiceError::Repository(_)
        ));
    }
}
