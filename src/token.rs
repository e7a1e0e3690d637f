//! Manage json web tokens.

use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServerError};

const DEFAULT_AUDIENCE: &str = "chatdesk";
pub const EXPIRATION_DAYS: u64 = 7;
const SECONDS_PER_DAY: u64 = 60 * 60 * 24;

/// Pieces of information asserted on a JWT.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Recipients that the JWT is intended for.
    pub aud: String,
    /// Identifies the expiration time on or after which the JWT must not be
    /// accepted for processing.
    pub exp: u64,
    /// Identifies the time at which the JWT was issued.
    pub iat: u64,
    /// Identifies the organization that issued the JWT.
    pub iss: String,
    /// User ID.
    pub sub: String,
    pub username: String,
    pub is_admin: bool,
}

impl Claims {
    /// Numeric user ID carried by `sub`.
    pub fn user_id(&self) -> Result<i64> {
        self.sub.parse().map_err(|_| ServerError::Unauthorized)
    }
}

/// Manage JWT tokens.
#[derive(Clone)]
pub struct TokenManager {
    algorithm: Algorithm,
    decoding_key: DecodingKey,
    encoding_key: EncodingKey,
    name: String,
    audience: String,
    expiration: u64,
}

impl TokenManager {
    /// Create a new [`TokenManager`] instance.
    pub fn new(name: &str, secret: &[u8]) -> Self {
        Self {
            algorithm: Algorithm::HS256,
            decoding_key: DecodingKey::from_secret(secret),
            encoding_key: EncodingKey::from_secret(secret),
            name: name.to_owned(),
            audience: DEFAULT_AUDIENCE.to_string(),
            expiration: EXPIRATION_DAYS * SECONDS_PER_DAY,
        }
    }

    /// Set `audience` field on JWT.
    pub fn audience(&mut self, audience: &str) {
        self.audience = audience.to_owned();
    }

    /// Set token lifetime in days.
    pub fn expiration_days(&mut self, days: u64) {
        self.expiration = days * SECONDS_PER_DAY;
    }

    /// Token lifetime in seconds.
    pub fn expires_in(&self) -> u64 {
        self.expiration
    }

    /// Create a new [`jsonwebtoken`].
    pub fn create(&self, user_id: i64, username: &str, is_admin: bool) -> Result<String> {
        let time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|err| ServerError::Internal {
                details: "system clock is before unix epoch".into(),
                source: Some(Box::new(err)),
            })?
            .as_secs();
        let header = Header::new(self.algorithm);
        let claims = Claims {
            aud: self.audience.clone(),
            exp: time + self.expiration,
            iat: time,
            iss: self.name.clone(),
            sub: user_id.to_string(),
            username: username.to_owned(),
            is_admin,
        };

        Ok(encode(&header, &claims, &self.encoding_key)?)
    }

    /// Decode and check a token.
    pub fn decode(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(self.algorithm);
        validation.set_audience(&[&self.audience]);
        validation.leeway = 0;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| ServerError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> TokenManager {
        TokenManager::new("chatdesk-test", b"0123456789abcdef0123456789abcdef")
    }

    #[test]
    fn test_create_then_decode() {
        let manager = manager();
        let token = manager.create(42, "jane", true).unwrap();
        let claims = manager.decode(&token).unwrap();

        assert_eq!(claims.sub, "42");
        assert_eq!(claims.user_id().unwrap(), 42);
        assert_eq!(claims.username, "jane");
        assert!(claims.is_admin);
        assert_eq!(claims.exp - claims.iat, EXPIRATION_DAYS * SECONDS_PER_DAY);
    }

    #[test]
    fn test_foreign_secret_is_rejected() {
        let token = manager().create(1, "admin", true).unwrap();
        let other = TokenManager::new("chatdesk-test", b"another-secret-another-secret!!!");

        assert!(matches!(other.decode(&token), Err(ServerError::Unauthorized)));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(
            manager().decode("not.a.jwt"),
            Err(ServerError::Unauthorized)
        ));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let manager = manager();
        let claims = Claims {
            aud: DEFAULT_AUDIENCE.into(),
            exp: 1,
            iat: 0,
            iss: "chatdesk-test".into(),
            sub: "1".into(),
            username: "admin".into(),
            is_admin: true,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &manager.encoding_key).unwrap();

        assert!(manager.decode(&token).is_err());
    }
}
