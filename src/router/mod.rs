//! HTTP handlers.
pub mod chats;
pub mod login;
pub mod messages;
pub mod news;
pub mod signup;
pub mod stats;
pub mod support;
pub mod upload;
pub mod users;

use std::sync::LazyLock;

use axum::Json;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::extract::rejection::JsonRejection;
use regex_lite::Regex;
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationError};

use crate::error::ServerError;

static USERNAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").unwrap());

/// JSON body validated with [`Validate`] before reaching the handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct Valid<T>(pub T);

impl<T, S> FromRequest<S> for Valid<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Valid(value))
    }
}

/// [`axum::extract::Path`] rejecting with a JSON [`ServerError`].
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ServerError))]
pub struct Path<T>(pub T);

/// [`axum::extract::Query`] rejecting with a JSON [`ServerError`].
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ServerError))]
pub struct Query<T>(pub T);

/// Usernames are ASCII letters, digits, `_`, `.` and `-`.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if USERNAME.is_match(username) {
        Ok(())
    } else {
        Err(ValidationError::new("username"))
    }
}

/// Reject blank strings.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::new("blank"))
    } else {
        Ok(())
    }
}

/// Build a state for tests, with cheap Argon2 parameters.
#[cfg(test)]
pub fn state(pool: sqlx::Pool<sqlx::Postgres>) -> crate::AppState {
    use std::sync::Arc;

    use crate::config::{Argon2, Configuration};
    use crate::crypto::Crypto;
    use crate::database::Database;
    use crate::token::TokenManager;

    let mut config = Configuration::default();
    config.name = "chatdesk".into();
    config.url = "http://localhost:8080/".into();
    config.upload.directory = std::env::temp_dir().join("chatdesk-uploads");
    config.upload.max_size = 1024;

    let argon2 = Argon2 {
        memory_cost: 1024,
        iterations: 1,
        parallelism: 1,
        hash_length: 32,
    };

    crate::AppState {
        token: TokenManager::new(&config.url, b"chatdesk test secret"),
        config: Arc::new(config),
        db: Database { postgres: pool },
        crypto: Arc::new(Crypto::new(Some(argon2), "pepper").unwrap()),
    }
}

/// Token of the `admin` fixture user.
#[cfg(test)]
pub fn admin_token(state: &crate::AppState) -> String {
    state.token.create(1, "admin", true).unwrap()
}

/// Token of the `jane` fixture user.
#[cfg(test)]
pub fn user_token(state: &crate::AppState) -> String {
    state.token.create(2, "jane", false).unwrap()
}
