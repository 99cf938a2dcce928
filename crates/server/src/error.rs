//! Unified error handling with Sentry integration.
//!
//! Route handlers return `Result<T, AppError>`. Engine errors map onto HTTP
//! status codes one to one; storage and other internal failures are
//! captured to Sentry and answered with a generic body.

use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use forkline_core::DomainError;

use crate::services::{AuthError, ResolveError, ServiceError};

/// Application-level error type for the HTTP surface.
#[derive(Debug, Error)]
pub enum AppError {
    /// A service rejected or failed the operation.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// The bearer credential was missing or invalid.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The request body or query could not be decoded.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<DomainError> for AppError {
    fn from(e: DomainError) -> Self {
        Self::Service(e.into())
    }
}

impl From<ResolveError> for AppError {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::Auth(e) => Self::Auth(e),
            ResolveError::Service(e) => Self::Service(e),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl AppError {
    const fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::Service(ServiceError::Repository(_))
                | Self::Auth(AuthError::Issue(_))
                | Self::Internal(_)
        )
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Service(ServiceError::Domain(e)) => match e {
                DomainError::NotFound(_) => StatusCode::NOT_FOUND,
                DomainError::InvalidArgument { .. } => StatusCode::BAD_REQUEST,
                DomainError::FailedPrecondition(_) | DomainError::Conflict(_) => {
                    StatusCode::CONFLICT
                }
                DomainError::Forbidden => StatusCode::FORBIDDEN,
            },
            Self::Auth(AuthError::Issue(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Service(ServiceError::Repository(_)) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn client_message(&self) -> String {
        if self.is_internal() {
            return "internal server error".to_owned();
        }
        match self {
            Self::Auth(AuthError::InvalidToken(_)) => "invalid token".to_owned(),
            Self::Auth(AuthError::InvalidEmail(_)) => "invalid email claim".to_owned(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.is_internal() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let body = Json(json!({ "error": self.client_message() }));
        (self.status(), body).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context for the current request.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

#[cfg(test)]
mod tests {
    use crate::db::RepositoryError;

    use super::*;

    fn status_of(err: impl Into<AppError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn test_domain_error_status_codes() {
        assert_eq!(status_of(DomainError::NotFound("order")), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(DomainError::invalid("quantity", "must be at least 1")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(DomainError::FailedPrecondition("cart is empty".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(status_of(DomainError::Forbidden), StatusCode::FORBIDDEN);
        assert_eq!(
            status_of(DomainError::Conflict("dup".into())),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_auth_and_internal_status_codes() {
        assert_eq!(status_of(AuthError::MissingToken), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(AuthError::Expired), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(AuthError::NotRegistered), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_of(ServiceError::Repository(RepositoryError::DataCorruption(
                "bad row".into()
            ))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(AppError::BadRequest("nope".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let err = AppError::Service(ServiceError::Repository(RepositoryError::DataCorruption(
            "role column".into(),
        )));
        assert_eq!(err.client_message(), "internal server error");

        let err = AppError::Auth(AuthError::InvalidToken("InvalidSignature".into()));
        assert_eq!(err.client_message(), "invalid token");

        assert_eq!(
            AppError::from(DomainError::Forbidden).client_message(),
            "not authorized"
        );
    }
}
