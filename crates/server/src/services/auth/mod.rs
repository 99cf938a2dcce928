//! Bearer-token identity verification.
//!
//! The identity provider is a collaborator: all the engine needs is a
//! verified `(subject, email)` pair. [`IdentityVerifier`] is that seam;
//! [`JwtVerifier`] implements it with HS256 tokens carrying `sub`, `email`,
//! `exp`, `iat` and `iss` claims. It can also mint tokens, which the CLI
//! and tests use.

mod error;

pub use error::AuthError;

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use forkline_core::Email;

use crate::config::TokenConfig;
use crate::models::Identity;

/// Claims carried by a bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
}

/// Turns a bearer credential into a verified identity.
pub trait IdentityVerifier: Send + Sync + 'static {
    /// # Errors
    ///
    /// Returns an `AuthError` if the token is expired, forged or malformed.
    fn verify(&self, token: &str) -> Result<Identity, AuthError>;
}

/// HS256 token verifier and issuer.
#[derive(Clone)]
pub struct JwtVerifier {
    issuer: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

impl JwtVerifier {
    #[must_use]
    pub fn new(config: &TokenConfig) -> Self {
        let secret = config.secret.expose_secret().as_bytes();
        Self {
            issuer: config.issuer.clone(),
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    /// Mint a token for `subject` valid for `ttl`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Issue` if signing fails.
    pub fn issue(&self, subject: &str, email: &Email, ttl: Duration) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_owned(),
            email: email.as_str().to_owned(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Issue(e.to_string()))
    }

    /// Extract the token from an `Authorization` header value.
    #[must_use]
    pub fn extract_from_header(header: &str) -> Option<&str> {
        header.strip_prefix("Bearer ").map(str::trim).filter(|t| !t.is_empty())
    }
}

impl IdentityVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken(e.to_string()),
            }
        })?;

        Ok(Identity {
            subject: data.claims.sub,
            email: Email::parse(&data.claims.email)?,
        })
    }
}
