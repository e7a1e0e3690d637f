//! Conversations and their ordered messages.
mod repository;

pub use repository::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sender category of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// Conversation as saved on database, with its messages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Chat {
    pub id: String,
    pub user_id: i64,
    pub title: String,
    pub created_at: DateTime<Utc>,
    #[sqlx(json)]
    pub messages: Vec<Message>,
}

/// Message as saved on database.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: i64,
    pub chat_id: String,
    pub role: String,
    pub content: String,
    pub sender_id: Option<i64>,
    pub image_url: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Message sent by a client, before it gets an ID.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub sender_id: Option<i64>,
    #[serde(default)]
    pub image_url: Option<String>,
    /// Kept when provided, otherwise assigned on insert.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}
