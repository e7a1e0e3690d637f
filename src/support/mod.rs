//! Support tickets between a user and the administrators.
mod repository;

pub use repository::*;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Status of a ticket awaiting an answer.
pub const STATUS_OPEN: &str = "open";
/// Status of a ticket closed by an administrator.
pub const STATUS_CLOSED: &str = "closed";

/// Support ticket, with the display name of the user who opened it.
#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct SupportChat {
    pub id: i64,
    pub user_id: i64,
    pub fullname: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Ticket message enriched with its sender's profile.
#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct SupportMessage {
    pub id: i64,
    pub support_chat_id: i64,
    pub sender_id: Option<i64>,
    pub content: String,
    pub image_url: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub sender_name: Option<String>,
    pub sender_image: Option<String>,
    pub sender_is_admin: bool,
}
