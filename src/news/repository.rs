//! Handle news requests.

use serde::Deserialize;
use sqlx::{Pool, Postgres};

use crate::error::{Result, ServerError};
use crate::news::NewsPost;

const NEWS_COLUMNS: &str = "id, author_id, title, body, image_url, created_at, updated_at";

/// Fields of a post an administrator may change. `None` keeps the stored
/// value; an empty `image_url` removes the image.
#[derive(Debug, Default, Deserialize)]
pub struct NewsUpdate {
    pub title: Option<String>,
    pub body: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Clone)]
pub struct NewsRepository {
    pool: Pool<Postgres>,
}

impl NewsRepository {
    /// Create a new [`NewsRepository`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Every post, newest first.
    pub async fn list(&self) -> Result<Vec<NewsPost>> {
        let query = format!("SELECT {NEWS_COLUMNS} FROM news ORDER BY created_at DESC, id DESC");

        Ok(sqlx::query_as::<_, NewsPost>(&query)
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn create(
        &self,
        author_id: i64,
        title: &str,
        body: &str,
        image_url: Option<&str>,
    ) -> Result<NewsPost> {
        let query = format!(
            r#"INSERT INTO news (author_id, title, body, image_url)
                VALUES ($1, $2, $3, $4)
                RETURNING {NEWS_COLUMNS}"#
        );

        let post = sqlx::query_as::<_, NewsPost>(&query)
            .bind(author_id)
            .bind(title)
            .bind(body)
            .bind(image_url)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| ServerError::from_constraint(err, "user"))?;

        tracing::info!(news_id = post.id, author_id, "news published");
        Ok(post)
    }

    /// Partially update a post.
    pub async fn update(&self, news_id: i64, update: &NewsUpdate) -> Result<NewsPost> {
        let query = format!(
            r#"UPDATE news SET
                title = COALESCE($2, title),
                body = COALESCE($3, body),
                image_url = CASE
                    WHEN $4::TEXT IS NULL THEN image_url
                    WHEN $4::TEXT = '' THEN NULL
                    ELSE $4::TEXT
                END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {NEWS_COLUMNS}"#
        );

        sqlx::query_as::<_, NewsPost>(&query)
            .bind(news_id)
            .bind(update.title.as_deref())
            .bind(update.body.as_deref())
            .bind(update.image_url.as_deref())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServerError::NotFound("news"))
    }

    /// Deleting an absent post is not an error.
    pub async fn delete(&self, news_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM news WHERE id = $1")
            .bind(news_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test(fixtures("../../fixtures/users.sql"))]
    async fn test_news_lifecycle(pool: Pool<Postgres>) {
        let repo = NewsRepository::new(pool);

        let first = repo
            .create(1, "Maintenance", "Down on Sunday.", Some("https://chatdesk.local/uploads/m.png"))
            .await
            .unwrap();
        let second = repo.create(1, "New models", "Faster answers.", None).await.unwrap();

        let posts = repo.list().await.unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].id, second.id);

        let update = NewsUpdate {
            body: Some("Down on Saturday.".into()),
            image_url: Some(String::new()),
            ..Default::default()
        };
        let updated = repo.update(first.id, &update).await.unwrap();
        assert_eq!(updated.title, "Maintenance");
        assert_eq!(updated.body, "Down on Saturday.");
        assert_eq!(updated.image_url, None);
        assert!(updated.updated_at >= first.updated_at);

        assert!(repo.delete(first.id).await.unwrap());
        assert!(!repo.delete(first.id).await.unwrap());
        assert!(matches!(
            repo.update(first.id, &NewsUpdate::default()).await,
            Err(ServerError::NotFound("news"))
        ));
    }

    #[sqlx::test(fixtures("../../fixtures/users.sql"))]
    async fn test_author_removal_keeps_post(pool: Pool<Postgres>) {
        let repo = NewsRepository::new(pool.clone());
        let post = repo.create(2, "Hello", "World", None).await.unwrap();

        sqlx::query("DELETE FROM users WHERE id = 2")
            .execute(&pool)
            .await
            .unwrap();

        let posts = repo.list().await.unwrap();
        assert_eq!(posts[0].id, post.id);
        assert_eq!(posts[0].author_id, None);
    }
}
