//! Handle support ticket requests.

use sqlx::{Pool, Postgres};

use crate::error::{Result, ServerError};
use crate::support::{STATUS_CLOSED, STATUS_OPEN, SupportChat, SupportMessage};

const SUPPORT_CHATS: &str = r#"SELECT s.id, s.user_id, u.fullname, s.status, s.created_at, s.updated_at
    FROM support_chats s
    JOIN users u ON u.id = s.user_id"#;

const SUPPORT_MESSAGE_COLUMNS: &str = r#"m.id, m.support_chat_id, m.sender_id, m.content,
    m.image_url, m."timestamp",
    u.fullname AS sender_name,
    u.profile_image AS sender_image,
    COALESCE(u.is_admin, FALSE) AS sender_is_admin"#;

#[derive(Clone)]
pub struct SupportRepository {
    pool: Pool<Postgres>,
}

impl SupportRepository {
    /// Create a new [`SupportRepository`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Return the open ticket of a user, opening one if there is none.
    pub async fn open_or_get(&self, user_id: i64) -> Result<SupportChat> {
        let query = format!(
            "{SUPPORT_CHATS} WHERE s.user_id = $1 AND s.status = $2 ORDER BY s.updated_at DESC, s.id DESC LIMIT 1"
        );
        if let Some(ticket) = sqlx::query_as::<_, SupportChat>(&query)
            .bind(user_id)
            .bind(STATUS_OPEN)
            .fetch_optional(&self.pool)
            .await?
        {
            return Ok(ticket);
        }

        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO support_chats (user_id, status) VALUES ($1, $2) RETURNING id",
        )
        .bind(user_id)
        .bind(STATUS_OPEN)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| ServerError::from_constraint(err, "user"))?;

        tracing::info!(ticket_id = id, user_id, "support ticket opened");
        self.find(id).await
    }

    /// Tickets of one user, most recent activity first.
    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<SupportChat>> {
        let query =
            format!("{SUPPORT_CHATS} WHERE s.user_id = $1 ORDER BY s.updated_at DESC, s.id DESC");

        Ok(sqlx::query_as::<_, SupportChat>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Every ticket, most recent activity first.
    pub async fn list_all(&self) -> Result<Vec<SupportChat>> {
        let query = format!("{SUPPORT_CHATS} ORDER BY s.updated_at DESC, s.id DESC");

        Ok(sqlx::query_as::<_, SupportChat>(&query)
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn find(&self, ticket_id: i64) -> Result<SupportChat> {
        let query = format!("{SUPPORT_CHATS} WHERE s.id = $1");

        sqlx::query_as::<_, SupportChat>(&query)
            .bind(ticket_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServerError::NotFound("ticket"))
    }

    /// Append a message and put the ticket back to `open`.
    pub async fn add_message(
        &self,
        ticket_id: i64,
        sender_id: i64,
        content: &str,
        image_url: Option<&str>,
    ) -> Result<SupportMessage> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE support_chats SET status = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(STATUS_OPEN)
        .bind(ticket_id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(ServerError::NotFound("ticket"));
        }

        let query = format!(
            r#"WITH m AS (
                INSERT INTO support_messages (support_chat_id, sender_id, content, image_url)
                VALUES ($1, $2, $3, $4)
                RETURNING *
            )
            SELECT {SUPPORT_MESSAGE_COLUMNS}
            FROM m LEFT JOIN users u ON u.id = m.sender_id"#
        );
        let message = sqlx::query_as::<_, SupportMessage>(&query)
            .bind(ticket_id)
            .bind(sender_id)
            .bind(content)
            .bind(image_url)
            .fetch_one(&mut *tx)
            .await
            .map_err(|err| ServerError::from_constraint(err, "user"))?;

        tx.commit().await?;

        tracing::debug!(ticket_id, sender_id, "support message added");
        Ok(message)
    }

    /// Messages of a ticket, oldest first.
    pub async fn messages(&self, ticket_id: i64) -> Result<Vec<SupportMessage>> {
        let query = format!(
            r#"SELECT {SUPPORT_MESSAGE_COLUMNS}
            FROM support_messages m
            LEFT JOIN users u ON u.id = m.sender_id
            WHERE m.support_chat_id = $1
            ORDER BY m."timestamp", m.id"#
        );

        Ok(sqlx::query_as::<_, SupportMessage>(&query)
            .bind(ticket_id)
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn close(&self, ticket_id: i64) -> Result<SupportChat> {
        let result = sqlx::query(
            "UPDATE support_chats SET status = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(STATUS_CLOSED)
        .bind(ticket_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ServerError::NotFound("ticket"));
        }

        tracing::info!(ticket_id, "support ticket closed");
        self.find(ticket_id).await
    }
}
