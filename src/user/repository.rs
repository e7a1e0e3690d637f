//! Handle database requests.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{Pool, Postgres};

use crate::error::{Result, ServerError};
use crate::user::User;

const USER_COLUMNS: &str = r#"id, fullname, email, username, password_hash, last_login,
    banned_until, permanently_banned, is_admin, profile_image, api_key, created_at"#;

/// Moderation fields an administrator may change. `None` keeps the stored
/// value; an empty `banned_until` lifts a temporary ban.
#[derive(Debug, Default, Deserialize)]
pub struct ModerationUpdate {
    pub fullname: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub banned_until: Option<String>,
    pub permanently_banned: Option<bool>,
    pub is_admin: Option<bool>,
}

/// Profile fields a user may change on its own account.
#[derive(Debug, Default, Deserialize)]
pub struct ProfileUpdate {
    pub fullname: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub profile_image: Option<String>,
}

#[derive(Clone)]
pub struct UserRepository {
    pool: Pool<Postgres>,
}

impl UserRepository {
    /// Create a new [`UserRepository`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Insert a user whose password is already hashed.
    pub async fn insert(
        &self,
        fullname: &str,
        email: &str,
        username: &str,
        password_hash: &str,
    ) -> Result<User> {
        let query = format!(
            r#"INSERT INTO users (fullname, email, username, password_hash)
                VALUES ($1, $2, $3, $4)
                RETURNING {USER_COLUMNS}"#
        );

        sqlx::query_as::<_, User>(&query)
            .bind(fullname)
            .bind(email)
            .bind(username)
            .bind(password_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| ServerError::from_constraint(err, "user"))
    }

    /// Find a user using `id` field.
    pub async fn find_by_id(&self, user_id: i64) -> Result<User> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");

        sqlx::query_as::<_, User>(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServerError::NotFound("user"))
    }

    /// Find a user using `username` field.
    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");

        Ok(sqlx::query_as::<_, User>(&query)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// List every user.
    pub async fn list(&self) -> Result<Vec<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users ORDER BY id");

        Ok(sqlx::query_as::<_, User>(&query)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Partially update moderation fields.
    pub async fn update_moderation(
        &self,
        user_id: i64,
        update: &ModerationUpdate,
    ) -> Result<User> {
        let query = format!(
            r#"UPDATE users SET
                fullname = COALESCE($2, fullname),
                email = COALESCE($3, email),
                username = COALESCE($4, username),
                banned_until = CASE
                    WHEN $5::TEXT IS NULL THEN banned_until
                    WHEN $5::TEXT = '' THEN NULL
                    ELSE $5::TEXT
                END,
                permanently_banned = COALESCE($6, permanently_banned),
                is_admin = COALESCE($7, is_admin)
            WHERE id = $1
            RETURNING {USER_COLUMNS}"#
        );

        sqlx::query_as::<_, User>(&query)
            .bind(user_id)
            .bind(update.fullname.as_deref())
            .bind(update.email.as_deref())
            .bind(update.username.as_deref())
            .bind(update.banned_until.as_deref().map(str::trim))
            .bind(update.permanently_banned)
            .bind(update.is_admin)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| ServerError::from_constraint(err, "user"))?
            .ok_or(ServerError::NotFound("user"))
    }

    /// Partially update profile fields.
    pub async fn update_profile(
        &self,
        user_id: i64,
        update: &ProfileUpdate,
    ) -> Result<User> {
        let query = format!(
            r#"UPDATE users SET
                fullname = COALESCE($2, fullname),
                email = COALESCE($3, email),
                username = COALESCE($4, username),
                profile_image = COALESCE($5, profile_image)
            WHERE id = $1
            RETURNING {USER_COLUMNS}"#
        );

        sqlx::query_as::<_, User>(&query)
            .bind(user_id)
            .bind(update.fullname.as_deref())
            .bind(update.email.as_deref())
            .bind(update.username.as_deref())
            .bind(update.profile_image.as_deref())
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| ServerError::from_constraint(err, "user"))?
            .ok_or(ServerError::NotFound("user"))
    }

    /// Flip administrator role, returning the new value.
    pub async fn toggle_admin(&self, user_id: i64) -> Result<bool> {
        sqlx::query_scalar::<_, bool>(
            "UPDATE users SET is_admin = NOT is_admin WHERE id = $1 RETURNING is_admin",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ServerError::NotFound("user"))
    }

    /// Record a successful login.
    pub async fn touch_last_login(&self, user_id: i64, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE users SET last_login = $1 WHERE id = $2")
            .bind(at)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Replace API key digest.
    pub async fn set_api_key(&self, user_id: i64, digest: &str) -> Result<()> {
        let result = sqlx::query("UPDATE users SET api_key = $1 WHERE id = $2")
            .bind(digest)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ServerError::NotFound("user"));
        }

        Ok(())
    }

    /// Delete a user. Chats, messages and support tickets follow through
    /// `ON DELETE CASCADE`. Deleting an absent user is not an error.
    pub async fn delete(&self, user_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test(fixtures("../../fixtures/users.sql"))]
    async fn test_update_moderation_is_partial(pool: Pool<Postgres>) {
        let repo = UserRepository::new(pool);

        let update = ModerationUpdate {
            banned_until: Some("2999-01-01 00:00:00".into()),
            ..Default::default()
        };
        let user = repo.update_moderation(2, &update).await.unwrap();
        assert_eq!(user.fullname, "Jane Doe");
        assert_eq!(user.banned_until.as_deref(), Some("2999-01-01 00:00:00"));

        let update = ModerationUpdate {
            banned_until: Some(String::new()),
            fullname: Some("Jane D.".into()),
            ..Default::default()
        };
        let user = repo.update_moderation(2, &update).await.unwrap();
        assert_eq!(user.fullname, "Jane D.");
        assert_eq!(user.banned_until, None);
    }

    #[sqlx::test(fixtures("../../fixtures/users.sql"))]
    async fn test_update_moderation_unknown_user(pool: Pool<Postgres>) {
        let repo = UserRepository::new(pool);

        let result = repo.update_moderation(999, &ModerationUpdate::default()).await;
        assert!(matches!(result, Err(ServerError::NotFound("user"))));
    }

    #[sqlx::test(fixtures("../../fixtures/users.sql"))]
    async fn test_update_to_taken_username(pool: Pool<Postgres>) {
        let repo = UserRepository::new(pool);

        let update = ProfileUpdate {
            username: Some("admin".into()),
            ..Default::default()
        };
        let result = repo.update_profile(2, &update).await;
        assert!(matches!(result, Err(ServerError::DuplicateIdentity)));
    }

    #[sqlx::test(fixtures("../../fixtures/users.sql"))]
    async fn test_toggle_admin(pool: Pool<Postgres>) {
        let repo = UserRepository::new(pool);

        assert!(repo.toggle_admin(2).await.unwrap());
        assert!(!repo.toggle_admin(2).await.unwrap());
        assert!(matches!(
            repo.toggle_admin(999).await,
            Err(ServerError::NotFound("user"))
        ));
    }

    #[sqlx::test(fixtures("../../fixtures/users.sql", "../../fixtures/chats.sql"))]
    async fn test_delete_cascades(pool: Pool<Postgres>) {
        let repo = UserRepository::new(pool.clone());

        assert!(repo.delete(2).await.unwrap());
        // Idempotent.
        assert!(!repo.delete(2).await.unwrap());

        let chats: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chats WHERE user_id = 2")
            .fetch_one(&pool)
            .await
            .unwrap();
        let messages: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE chat_id IN ('c1', 'c2')")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(chats, 0);
        assert_eq!(messages, 0);
    }
}
