//! Development bearer tokens.
//!
//! # Environment Variables
//!
//! - `FORKLINE_TOKEN_SECRET` - Signing secret (same validation as the server)
//! - `FORKLINE_TOKEN_ISSUER` - `iss` claim (default: forkline)

use chrono::Duration;
use forkline_core::{Email, EmailError};
use forkline_server::config::{ConfigError, TokenConfig};
use forkline_server::services::{AuthError, JwtVerifier};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    #[error("TTL must be positive (got {0} minutes)")]
    InvalidTtl(i64),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Print a signed token to stdout.
///
/// # Errors
///
/// Returns `TokenError` if the configuration, email or TTL is invalid.
pub fn issue(subject: &str, email: &str, ttl_minutes: i64) -> Result<(), TokenError> {
    if ttl_minutes < 1 {
        return Err(TokenError::InvalidTtl(ttl_minutes));
    }
    let ttl = Duration::try_minutes(ttl_minutes).ok_or(TokenError::InvalidTtl(ttl_minutes))?;
    let email = Email::parse(email)?;

    let verifier = JwtVerifier::new(&TokenConfig::from_env()?);
    let token = verifier.issue(subject, &email, ttl)?;

    #[allow(clippy::print_stdout)]
    {
        println!("{token}");
    }
    Ok(())
}
