//! Bearer-token extractors.
//!
//! - [`VerifiedIdentity`] only checks the token. Used by registration.
//! - [`CurrentUser`] also resolves the local account and rejects unknown
//!   identities with 401.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::Span;

use crate::db::Store;
use crate::error::{AppError, set_sentry_user};
use crate::models::{Identity, User};
use crate::services::{AuthError, JwtVerifier};
use crate::state::AppState;

/// A verified identity that may not have a local account yet.
///
/// # Example
///
/// ```rust,ignore
/// async fn register(VerifiedIdentity(identity): VerifiedIdentity) -> impl IntoResponse {
///     identity.subject
/// }
/// ```
pub struct VerifiedIdentity(pub Identity);

/// The registered user behind the bearer token.
pub struct CurrentUser(pub User);

fn bearer_token(parts: &Parts) -> Result<&str, AuthError> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(JwtVerifier::extract_from_header)
        .ok_or(AuthError::MissingToken)
}

impl<S: Store> FromRequestParts<AppState<S>> for VerifiedIdentity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<S>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let identity = state.verifier().verify(token).inspect_err(|e| {
            tracing::debug!(error = %e, "bearer token rejected");
        })?;
        Ok(Self(identity))
    }
}

impl<S: Store> FromRequestParts<AppState<S>> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<S>,
    ) -> Result<Self, Self::Rejection> {
        let VerifiedIdentity(identity) = VerifiedIdentity::from_request_parts(parts, state).await?;
        let user = state.accounts().resolve(&identity).await?;

        Span::current().record("user_id", user.id.as_i32());
        set_sentry_user(&user.id, Some(user.email.as_str()));

        Ok(Self(user))
    }
}
