//! Identity verification error types.

use thiserror::Error;

/// Errors that can occur while verifying or issuing bearer tokens.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No `Authorization: Bearer` header was supplied.
    #[error("missing bearer token")]
    MissingToken,

    /// The token has expired.
    #[error("token expired")]
    Expired,

    /// The signature, issuer or structure is invalid.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// The token's email claim is not a valid address.
    #[error("invalid email claim: {0}")]
    InvalidEmail(#[from] forkline_core::EmailError),

    /// The identity is valid but has no local account yet.
    #[error("user not registered")]
    NotRegistered,

    /// Signing a new token failed.
    #[error("token generation failed: {0}")]
    Issue(String),
}
