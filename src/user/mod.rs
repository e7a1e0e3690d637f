mod ban;
mod builder;
mod repository;
mod service;

pub use ban::*;
pub use builder::*;
pub use repository::*;
pub use service::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User as saved on database.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub fullname: String,
    pub email: String,
    pub username: String,
    #[serde(skip)]
    pub password_hash: String,
    pub last_login: Option<DateTime<Utc>>,
    pub banned_until: Option<String>,
    pub permanently_banned: bool,
    pub is_admin: bool,
    pub profile_image: Option<String>,
    #[serde(skip)]
    pub api_key: Option<String>,
    pub created_at: DateTime<Utc>,
}
