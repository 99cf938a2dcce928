//! Error taxonomy shared by every engine operation.

use crate::types::ParseEnumError;

/// Why an engine operation was rejected.
///
/// All validation happens before any state changes, so a `DomainError`
/// always means nothing was mutated.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The named entity does not exist (or is not visible as existing).
    #[error("{0} not found")]
    NotFound(&'static str),

    /// An input value breaks a rule.
    #[error("invalid {field}: {reason}")]
    InvalidArgument {
        field: &'static str,
        reason: String,
    },

    /// The entity's current state does not permit the operation.
    #[error("{0}")]
    FailedPrecondition(String),

    /// The actor may not perform the operation. The reason is never exposed.
    #[error("not authorized")]
    Forbidden,

    /// A uniqueness rule would be broken.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    /// Shorthand for [`DomainError::InvalidArgument`].
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field,
            reason: reason.into(),
        }
    }
}

impl From<ParseEnumError> for DomainError {
    fn from(err: ParseEnumError) -> Self {
        Self::InvalidArgument {
            field: err.field,
            reason: format!("unknown value {:?}", err.value),
        }
    }
}
