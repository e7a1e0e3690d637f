//! Handle conversation requests.

use sqlx::{PgConnection, Pool, Postgres};

use crate::chat::{Chat, IncomingMessage, Message};
use crate::error::{Result, ServerError};

const MESSAGE_COLUMNS: &str =
    r#"id, chat_id, role, content, sender_id, image_url, "timestamp""#;

/// Select chats with their messages nested as a JSON array, oldest message
/// first. A chat without messages carries `[]`.
const CHATS_WITH_MESSAGES: &str = r#"SELECT
        c.id,
        c.user_id,
        c.title,
        c.created_at,
        COALESCE(
            JSONB_AGG(
                JSONB_BUILD_OBJECT(
                    'id', m.id,
                    'chat_id', m.chat_id,
                    'role', m.role,
                    'content', m.content,
                    'sender_id', m.sender_id,
                    'image_url', m.image_url,
                    'timestamp', m."timestamp"
                )
                ORDER BY m."timestamp", m.id
            ) FILTER (WHERE m.id IS NOT NULL),
            '[]'::JSONB
        ) AS messages
    FROM chats c
    LEFT JOIN messages m ON m.chat_id = c.id"#;

#[derive(Clone)]
pub struct ChatRepository {
    pool: Pool<Postgres>,
}

impl ChatRepository {
    /// Create a new [`ChatRepository`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Make the stored conversation `chat_id` exactly match a client snapshot.
    ///
    /// The chat is created or renamed, then every stored message is replaced
    /// by `messages` in array order. Everything runs in one transaction: on
    /// error nothing is applied.
    pub async fn save(
        &self,
        user_id: i64,
        chat_id: &str,
        title: &str,
        messages: &[IncomingMessage],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let owned = sqlx::query_scalar::<_, String>(
            r#"INSERT INTO chats (id, user_id, title) VALUES ($1, $2, $3)
                ON CONFLICT (id) DO UPDATE SET title = EXCLUDED.title
                WHERE chats.user_id = EXCLUDED.user_id
                RETURNING id"#,
        )
        .bind(chat_id)
        .bind(user_id)
        .bind(title)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|err| ServerError::from_constraint(err, "user"))?;

        if owned.is_none() {
            // Conflict on a chat of another user.
            return Err(ServerError::Forbidden);
        }

        sqlx::query("DELETE FROM messages WHERE chat_id = $1")
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;

        for message in messages {
            insert_message(&mut *tx, chat_id, message).await?;
        }

        tx.commit().await?;

        tracing::debug!(chat_id, user_id, messages = messages.len(), "chat saved");
        Ok(())
    }

    /// Every chat of a user, newest first, messages included.
    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<Chat>> {
        let query = format!(
            "{CHATS_WITH_MESSAGES} WHERE c.user_id = $1 GROUP BY c.id ORDER BY c.created_at DESC, c.id DESC"
        );

        Ok(sqlx::query_as::<_, Chat>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?)
    }

    /// One chat, messages included.
    pub async fn find(&self, chat_id: &str) -> Result<Chat> {
        let query = format!("{CHATS_WITH_MESSAGES} WHERE c.id = $1 GROUP BY c.id");

        sqlx::query_as::<_, Chat>(&query)
            .bind(chat_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServerError::NotFound("chat"))
    }

    /// Create an empty chat.
    pub async fn create(&self, user_id: i64, chat_id: &str, title: &str) -> Result<Chat> {
        let result = sqlx::query(r#"INSERT INTO chats (id, user_id, title) VALUES ($1, $2, $3)"#)
            .bind(chat_id)
            .bind(user_id)
            .bind(title)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => self.find(chat_id).await,
            Err(err) => match ServerError::from_constraint(err, "user") {
                ServerError::DuplicateIdentity => Err(ServerError::AlreadyExists("chat")),
                err => Err(err),
            },
        }
    }

    /// Update chat title.
    pub async fn rename(&self, chat_id: &str, title: &str) -> Result<()> {
        let result = sqlx::query("UPDATE chats SET title = $1 WHERE id = $2")
            .bind(title)
            .bind(chat_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ServerError::NotFound("chat"));
        }

        Ok(())
    }

    /// Delete a chat, its messages first. Deleting an absent chat is not an
    /// error.
    ///
    /// The chat row is locked before its messages, the same order [`save`]
    /// and message inserts take.
    ///
    /// [`save`]: ChatRepository::save
    pub async fn delete(&self, chat_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT 1 FROM chats WHERE id = $1 FOR UPDATE")
            .bind(chat_id)
            .fetch_optional(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM messages WHERE chat_id = $1")
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM chats WHERE id = $1")
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    /// Owner of a chat, if the chat exists.
    pub async fn owner(&self, chat_id: &str) -> Result<Option<i64>> {
        Ok(sqlx::query_scalar::<_, i64>("SELECT user_id FROM chats WHERE id = $1")
            .bind(chat_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Append one message to an existing chat.
    pub async fn add_message(&self, chat_id: &str, message: &IncomingMessage) -> Result<Message> {
        let mut conn = self.pool.acquire().await?;
        insert_message(&mut conn, chat_id, message).await
    }

    /// Messages of a chat, oldest first.
    pub async fn messages(&self, chat_id: &str) -> Result<Vec<Message>> {
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM chats WHERE id = $1)")
            .bind(chat_id)
            .fetch_one(&self.pool)
            .await?;
        if !exists {
            return Err(ServerError::NotFound("chat"));
        }

        let query = format!(
            r#"SELECT {MESSAGE_COLUMNS} FROM messages WHERE chat_id = $1 ORDER BY "timestamp", id"#
        );
        Ok(sqlx::query_as::<_, Message>(&query)
            .bind(chat_id)
            .fetch_all(&self.pool)
            .await?)
    }
}

async fn insert_message(
    conn: &mut PgConnection,
    chat_id: &str,
    message: &IncomingMessage,
) -> Result<Message> {
    let query = format!(
        r#"INSERT INTO messages (chat_id, role, content, sender_id, image_url, "timestamp")
            VALUES ($1, $2, $3, $4, $5, COALESCE($6, NOW()))
            RETURNING {MESSAGE_COLUMNS}"#
    );

    sqlx::query_as::<_, Message>(&query)
        .bind(chat_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(message.sender_id)
        .bind(message.image_url.as_deref())
        .bind(message.timestamp)
        .fetch_one(&mut *conn)
        .await
        .map_err(|err| {
            let constraint = err
                .as_database_error()
                .and_then(|db| db.constraint())
                .map(str::to_owned);

            match constraint.as_deref() {
                Some("messages_sender_id_fkey") => ServerError::NotFound("user"),
                Some("messages_chat_id_fkey") => ServerError::NotFound("chat"),
                _ => ServerError::Sql(err),
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::Role;

    fn message(role: Role, content: &str) -> IncomingMessage {
        IncomingMessage {
            role,
            content: content.into(),
            sender_id: None,
            image_url: None,
            timestamp: None,
        }
    }

    #[sqlx::test(fixtures("../../fixtures/users.sql"))]
    async fn test_save_then_list(pool: Pool<Postgres>) {
        let repo = ChatRepository::new(pool);
        let messages = [message(Role::User, "hi"), message(Role::Assistant, "yo")];

        repo.save(2, "c1", "T", &messages).await.unwrap();

        let chats = repo.list_for_user(2).await.unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].id, "c1");
        assert_eq!(chats[0].title, "T");
        let contents: Vec<_> = chats[0].messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["hi", "yo"]);
        assert_eq!(chats[0].messages[0].role, "user");
        assert_eq!(chats[0].messages[1].role, "assistant");
    }

    #[sqlx::test(fixtures("../../fixtures/users.sql"))]
    async fn test_save_replaces_messages(pool: Pool<Postgres>) {
        let repo = ChatRepository::new(pool);
        let first = [
            message(Role::User, "one"),
            message(Role::Assistant, "two"),
            message(Role::User, "three"),
        ];
        repo.save(2, "c1", "Draft", &first).await.unwrap();
        repo.save(2, "c1", "Final", &[message(Role::User, "only")]).await.unwrap();

        let chat = repo.find("c1").await.unwrap();
        assert_eq!(chat.title, "Final");
        assert_eq!(chat.messages.len(), 1);
        assert_eq!(chat.messages[0].content, "only");
    }

    #[sqlx::test(fixtures("../../fixtures/users.sql"))]
    async fn test_save_rolls_back_on_failure(pool: Pool<Postgres>) {
        let repo = ChatRepository::new(pool);
        repo.save(2, "c1", "Original", &[message(Role::User, "kept")]).await.unwrap();

        // Unknown sender fails the third statement of the sequence.
        let mut broken = message(Role::User, "lost");
        broken.sender_id = Some(999);
        let result = repo
            .save(2, "c1", "Renamed", &[message(Role::User, "new"), broken])
            .await;
        assert!(matches!(result, Err(ServerError::NotFound("user"))));

        let chat = repo.find("c1").await.unwrap();
        assert_eq!(chat.title, "Original");
        assert_eq!(chat.messages.len(), 1);
        assert_eq!(chat.messages[0].content, "kept");
    }

    #[sqlx::test(fixtures("../../fixtures/users.sql"))]
    async fn test_save_refuses_foreign_chat(pool: Pool<Postgres>) {
        let repo = ChatRepository::new(pool);
        repo.save(2, "c1", "Mine", &[]).await.unwrap();

        let result = repo.save(1, "c1", "Stolen", &[]).await;
        assert!(matches!(result, Err(ServerError::Forbidden)));
        assert_eq!(repo.find("c1").await.unwrap().title, "Mine");
    }

    #[sqlx::test(fixtures("../../fixtures/users.sql"))]
    async fn test_save_for_unknown_user(pool: Pool<Postgres>) {
        let repo = ChatRepository::new(pool);
        let result = repo.save(999, "c1", "T", &[]).await;
        assert!(matches!(result, Err(ServerError::NotFound("user"))));
    }

    #[sqlx::test(fixtures("../../fixtures/users.sql", "../../fixtures/chats.sql"))]
    async fn test_list_newest_first(pool: Pool<Postgres>) {
        let repo = ChatRepository::new(pool);
        repo.create(2, "c3", "Empty").await.unwrap();

        let chats = repo.list_for_user(2).await.unwrap();
        let ids: Vec<_> = chats.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["c3", "c2", "c1"]);
        assert!(chats[0].messages.is_empty());
        assert_eq!(chats[2].messages[1].content, "How about Lisbon?");
    }

    #[sqlx::test(fixtures("../../fixtures/users.sql", "../../fixtures/chats.sql"))]
    async fn test_delete_removes_messages(pool: Pool<Postgres>) {
        let repo = ChatRepository::new(pool.clone());

        assert!(repo.delete("c1").await.unwrap());
        assert!(!repo.delete("c1").await.unwrap());

        let ids: Vec<_> = repo
            .list_for_user(2)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, ["c2"]);

        let left: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE chat_id = 'c1'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(left, 0);
        assert!(matches!(repo.messages("c1").await, Err(ServerError::NotFound("chat"))));
    }

    #[sqlx::test(fixtures("../../fixtures/users.sql", "../../fixtures/chats.sql"))]
    async fn test_concurrent_save_and_delete(pool: Pool<Postgres>) {
        let repo = ChatRepository::new(pool.clone());
        let snapshot: Vec<_> = (0..20)
            .map(|i| message(Role::User, &format!("message {i}")))
            .collect();

        for _ in 0..50 {
            let (saved, deleted) =
                tokio::join!(repo.save(2, "c1", "T2", &snapshot), repo.delete("c1"));
            saved.unwrap();
            deleted.unwrap();

            // Either order is fine, but never a chat with half its messages.
            let left: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE chat_id = 'c1'")
                .fetch_one(&pool)
                .await
                .unwrap();
            match repo.owner("c1").await.unwrap() {
                Some(_) => assert_eq!(left, 20),
                None => assert_eq!(left, 0),
            }
        }
    }

    #[sqlx::test(fixtures("../../fixtures/users.sql", "../../fixtures/chats.sql"))]
    async fn test_owner(pool: Pool<Postgres>) {
        let repo = ChatRepository::new(pool);

        assert_eq!(repo.owner("c1").await.unwrap(), Some(2));
        assert_eq!(repo.owner("missing").await.unwrap(), None);
    }

    #[sqlx::test(fixtures("../../fixtures/users.sql", "../../fixtures/chats.sql"))]
    async fn test_add_message(pool: Pool<Postgres>) {
        let repo = ChatRepository::new(pool);

        let added = repo.add_message("c2", &message(Role::Assistant, "Dal?")).await.unwrap();
        assert_eq!(added.chat_id, "c2");

        let messages = repo.messages("c2").await.unwrap();
        assert_eq!(messages.last().unwrap().content, "Dal?");

        assert!(matches!(
            repo.add_message("missing", &message(Role::User, "?")).await,
            Err(ServerError::NotFound("chat"))
        ));
    }

    #[sqlx::test(fixtures("../../fixtures/users.sql", "../../fixtures/chats.sql"))]
    async fn test_rename_and_create_conflict(pool: Pool<Postgres>) {
        let repo = ChatRepository::new(pool);

        repo.rename("c1", "Lisbon trip").await.unwrap();
        assert_eq!(repo.find("c1").await.unwrap().title, "Lisbon trip");
        assert!(matches!(repo.rename("nope", "x").await, Err(ServerError::NotFound("chat"))));
        assert!(matches!(
            repo.create(2, "c1", "again").await,
            Err(ServerError::AlreadyExists("chat"))
        ));
    }
}
