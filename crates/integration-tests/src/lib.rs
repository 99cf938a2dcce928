//! Test harness for Forkline end-to-end tests.
//!
//! [`TestApp`] builds the real router over a [`MemoryStore`] seeded with a
//! small menu, and signs bearer tokens with a fixed test secret. Requests go
//! through `tower::ServiceExt::oneshot`, so no socket or database is needed.
//!
//! # Seeded menu
//!
//! | id | restaurant | name | price | available |
//! |---|---|---|---|---|
//! | 7 | 3 | ramen | 5.00 | yes |
//! | 8 | 3 | gyoza | 3.00 | yes |
//! | 20 | 4 | burrito | 9.50 | yes |
//! | 21 | 4 | churros | 4.00 | no |

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::sync::{Arc, Mutex};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use chrono::Duration;
use secrecy::SecretString;
use serde_json::Value;
use tower::ServiceExt;

use forkline_core::{Email, MenuItemId, MenuItemQuote, Money, OrderNumber, RestaurantId, RoleSet};
use forkline_server::config::TokenConfig;
use forkline_server::db::MemoryStore;
use forkline_server::models::{Identity, User};
use forkline_server::services::{JwtVerifier, OrderNumberSource};
use forkline_server::state::AppState;

pub const TEST_SECRET: &str = "q8Zr$1vLm#T4pWx9&Nc2@Hk7!Ys5Fb3J";
pub const TEST_ISSUER: &str = "forkline-test";

/// Replays fixed entropy values, repeating the last one forever.
pub struct ScriptedNumbers(Mutex<Vec<u64>>);

impl ScriptedNumbers {
    #[must_use]
    pub fn new(values: &[u64]) -> Arc<Self> {
        Arc::new(Self(Mutex::new(values.to_vec())))
    }
}

impl OrderNumberSource for ScriptedNumbers {
    fn next_number(&self) -> OrderNumber {
        let mut values = self.0.lock().unwrap();
        let value = if values.len() > 1 {
            values.remove(0)
        } else {
            values.first().copied().unwrap_or(0)
        };
        OrderNumber::from_entropy(value)
    }
}

pub struct TestApp {
    pub store: MemoryStore,
    pub state: AppState<MemoryStore>,
    router: Router,
    verifier: Arc<JwtVerifier>,
}

impl TestApp {
    pub async fn new() -> Self {
        let store = seeded_store().await;
        let verifier = Arc::new(test_verifier());
        let state = AppState::new(store.clone(), verifier.clone(), 5);
        Self::assemble(store, state, verifier)
    }

    /// An app whose order numbers come from `numbers`.
    pub async fn with_order_numbers(numbers: Arc<dyn OrderNumberSource>, attempts: u32) -> Self {
        let store = seeded_store().await;
        let verifier = Arc::new(test_verifier());
        let state = AppState::with_order_numbers(store.clone(), verifier.clone(), numbers, attempts);
        Self::assemble(store, state, verifier)
    }

    fn assemble(store: MemoryStore, state: AppState<MemoryStore>, verifier: Arc<JwtVerifier>) -> Self {
        Self {
            router: forkline_server::router(state.clone()),
            store,
            state,
            verifier,
        }
    }

    /// A valid token for `subject`.
    #[must_use]
    pub fn token(&self, subject: &str) -> String {
        self.verifier
            .issue(subject, &identity(subject).email, Duration::minutes(10))
            .unwrap()
    }

    /// A token that expired ten minutes ago.
    #[must_use]
    pub fn expired_token(&self, subject: &str) -> String {
        self.verifier
            .issue(subject, &identity(subject).email, Duration::minutes(-10))
            .unwrap()
    }

    /// Seed a registered user with `roles` and return it with a token.
    pub async fn user(&self, subject: &str, roles: RoleSet) -> (User, String) {
        let user = self.store.seed_user(identity(subject), subject, roles).await;
        (user, self.token(subject))
    }

    /// Send a request and return the status and JSON body (`Null` if empty).
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn patch(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::PATCH, uri, Some(token), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.send(Method::DELETE, uri, Some(token), None).await
    }
}

#[must_use]
pub fn identity(subject: &str) -> Identity {
    Identity {
        subject: subject.to_owned(),
        email: Email::parse(&format!("{subject}@example.com")).unwrap(),
    }
}

#[must_use]
pub fn test_verifier() -> JwtVerifier {
    JwtVerifier::new(&TokenConfig {
        secret: SecretString::from(TEST_SECRET),
        issuer: TEST_ISSUER.to_owned(),
    })
}

/// A fresh store with the menu from the module docs.
pub async fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    for (id, restaurant, name, cents, available) in [
        (7, 3, "ramen", 500, true),
        (8, 3, "gyoza", 300, true),
        (20, 4, "burrito", 950, true),
        (21, 4, "churros", 400, false),
    ] {
        store
            .seed_menu_item(MenuItemQuote {
                id: MenuItemId::new(id),
                restaurant_id: RestaurantId::new(restaurant),
                name: name.to_owned(),
                price: Money::from_cents(cents),
                is_available: available,
            })
            .await;
    }
    store
}
