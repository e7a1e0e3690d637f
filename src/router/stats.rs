use axum::Json;
use axum::extract::State;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Postgres};

use crate::database::Database;
use crate::error::Result;
use crate::support::STATUS_OPEN;
use crate::user::parse_ban_timestamp;

/// Usage figures shown on the moderation dashboard.
#[derive(Debug, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Stats {
    pub users: i64,
    pub admins: i64,
    pub permanently_banned: i64,
    #[sqlx(skip)]
    pub temporarily_banned: i64,
    pub chats: i64,
    pub messages: i64,
    pub open_tickets: i64,
    pub news: i64,
    pub active_last_24h: i64,
}

async fn collect(pool: &Pool<Postgres>) -> Result<Stats> {
    let mut stats = sqlx::query_as::<_, Stats>(
        r#"SELECT
            (SELECT COUNT(*) FROM users) AS users,
            (SELECT COUNT(*) FROM users WHERE is_admin) AS admins,
            (SELECT COUNT(*) FROM users WHERE permanently_banned) AS permanently_banned,
            (SELECT COUNT(*) FROM chats) AS chats,
            (SELECT COUNT(*) FROM messages) AS messages,
            (SELECT COUNT(*) FROM support_chats WHERE status = $1) AS open_tickets,
            (SELECT COUNT(*) FROM news) AS news,
            (SELECT COUNT(*) FROM users WHERE last_login > NOW() - INTERVAL '24 hours') AS active_last_24h"#,
    )
    .bind(STATUS_OPEN)
    .fetch_one(pool)
    .await?;

    // `banned_until` is free text: evaluate it the same way login does.
    let bans = sqlx::query_scalar::<_, String>(
        "SELECT banned_until FROM users WHERE NOT permanently_banned AND banned_until IS NOT NULL",
    )
    .fetch_all(pool)
    .await?;

    let now = Utc::now();
    stats.temporarily_banned = bans
        .iter()
        .filter_map(|raw| parse_ban_timestamp(raw.trim()))
        .filter(|until| *until > now)
        .count() as i64;

    Ok(stats)
}

/// Handler for `GET /stats`.
pub async fn handler(State(db): State<Database>) -> Result<Json<Stats>> {
    Ok(Json(collect(&db.postgres).await?))
}
