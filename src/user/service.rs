use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use zeroize::Zeroizing;

use crate::crypto::{Crypto, generate_api_key};
use crate::error::{Result, ServerError};
use crate::user::{BanStatus, NewUser, User, UserRepository};

/// Credential store: users, their password hashes and login lifecycle.
#[derive(Clone)]
pub struct UserService {
    pub repo: UserRepository,
    pub crypto: Arc<Crypto>,
}

impl UserService {
    /// Create a new [`UserService`].
    pub fn new(pool: Pool<Postgres>, crypto: Arc<Crypto>) -> Self {
        Self {
            repo: UserRepository::new(pool),
            crypto,
        }
    }

    /// Store a new user. Only the Argon2 hash of the password is kept.
    pub async fn create(&self, user: NewUser) -> Result<User> {
        let password_hash = self.crypto.pwd.hash_password(user.password.as_bytes())?;

        let user = self
            .repo
            .insert(&user.fullname, &user.email, &user.username, &password_hash)
            .await?;

        tracing::info!(user_id = user.id, username = %user.username, "user created");
        Ok(user)
    }

    /// Find the user owning `username` if `password` matches its hash.
    pub async fn find_by_credentials(&self, username: &str, password: &str) -> Result<User> {
        let Some(user) = self.repo.find_by_username(username).await? else {
            // Unknown usernames cost one hash too.
            self.crypto.pwd.verify_decoy(password);
            return Err(ServerError::InvalidCredentials);
        };

        self.crypto
            .pwd
            .verify_password(password, &user.password_hash)
            .map_err(|_| ServerError::InvalidCredentials)?;

        Ok(user)
    }

    /// Check credentials then ban state, and record the login time.
    pub async fn login(&self, username: &str, password: &str, now: DateTime<Utc>) -> Result<User> {
        let mut user = self.find_by_credentials(username, password).await?;

        if let Err(err) = BanStatus::evaluate(&user, now).ensure_active() {
            tracing::info!(user_id = user.id, "login refused to banned user");
            return Err(err);
        }

        self.repo.touch_last_login(user.id, now).await?;
        user.last_login = Some(now);

        Ok(user)
    }

    /// Generate a new API key for a user, keep its digest and return it.
    pub async fn rotate_api_key(&self, user_id: i64) -> Result<Zeroizing<String>> {
        let key = generate_api_key();
        let digest = self.crypto.hasher.digest(key.as_bytes());

        self.repo.set_api_key(user_id, &digest).await?;
        tracing::info!(user_id, "api key rotated");

        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Argon2;
    use crate::user::UserBuilder;
    use chrono::TimeDelta;

    fn service(pool: Pool<Postgres>) -> UserService {
        let config = Argon2 {
            memory_cost: 1024,
            iterations: 1,
            parallelism: 1,
            hash_length: 32,
        };
        UserService::new(pool, Arc::new(Crypto::new(Some(config), "pepper").unwrap()))
    }

    fn jane() -> NewUser {
        UserBuilder::new()
            .fullname("Jane Doe")
            .email("jane@chatdesk.local")
            .username("jane")
            .password("correct horse")
            .build()
    }

    #[sqlx::test]
    async fn test_create_and_find(pool: Pool<Postgres>) {
        let service = service(pool);
        let created = service.create(jane()).await.unwrap();
        assert_ne!(created.password_hash, "correct horse");

        let found = service.find_by_credentials("jane", "correct horse").await.unwrap();
        assert_eq!(found.id, created.id);

        assert!(matches!(
            service.find_by_credentials("jane", "wrong horse").await,
            Err(ServerError::InvalidCredentials)
        ));
        assert!(matches!(
            service.find_by_credentials("nobody", "correct horse").await,
            Err(ServerError::InvalidCredentials)
        ));
    }

    #[sqlx::test]
    async fn test_duplicate_signup(pool: Pool<Postgres>) {
        let service = service(pool.clone());
        service.create(jane()).await.unwrap();

        let result = service.create(jane()).await;
        assert!(matches!(result, Err(ServerError::DuplicateIdentity)));

        let other_email = UserBuilder::new()
            .fullname("Jane Again")
            .email("other@chatdesk.local")
            .username("jane")
            .password("whatever1")
            .build();
        assert!(matches!(
            service.create(other_email).await,
            Err(ServerError::DuplicateIdentity)
        ));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[sqlx::test]
    async fn test_login_lifecycle(pool: Pool<Postgres>) {
        let service = service(pool.clone());
        let user = service.create(jane()).await.unwrap();
        let now = Utc::now();

        let until = (now + TimeDelta::hours(2)).format("%Y-%m-%d %H:%M:%S").to_string();
        sqlx::query("UPDATE users SET banned_until = $1 WHERE id = $2")
            .bind(&until)
            .bind(user.id)
            .execute(&pool)
            .await
            .unwrap();

        assert!(matches!(
            service.login("jane", "correct horse", now).await,
            Err(ServerError::Banned(_))
        ));

        // Once the ban is over the same credentials work.
        let later = now + TimeDelta::hours(3);
        let logged = service.login("jane", "correct horse", later).await.unwrap();
        assert_eq!(logged.last_login, Some(later));

        let stored = service.repo.find_by_id(user.id).await.unwrap();
        assert!(stored.last_login.is_some());

        sqlx::query("UPDATE users SET permanently_banned = TRUE, banned_until = NULL WHERE id = $1")
            .bind(user.id)
            .execute(&pool)
            .await
            .unwrap();
        assert!(matches!(
            service.login("jane", "correct horse", later).await,
            Err(ServerError::Banned(_))
        ));
    }

    #[sqlx::test(fixtures("../../fixtures/users.sql"))]
    async fn test_rotate_api_key(pool: Pool<Postgres>) {
        let service = service(pool);
        let key = service.rotate_api_key(2).await.unwrap();

        let stored = service.repo.find_by_id(2).await.unwrap();
        assert_eq!(stored.api_key, Some(service.crypto.hasher.digest(key.as_bytes())));

        assert!(matches!(
            service.rotate_api_key(999).await,
            Err(ServerError::NotFound("user"))
        ));
    }
}
