use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::AppState;
use crate::error::Result;
use crate::router::{Path, Valid};
use crate::user::{ModerationUpdate, User, UserRepository, parse_ban_timestamp};

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct Body {
    #[validate(length(min = 1, max = 100, message = "Full name must be 1 to 100 characters long."))]
    fullname: Option<String>,
    #[validate(email(message = "Email must be formatted."))]
    email: Option<String>,
    #[validate(
        length(min = 3, max = 32, message = "Username must be 3 to 32 characters long."),
        custom(
            function = "crate::router::validate_username",
            message = "Username must only contain letters, digits, '_', '.' or '-'."
        )
    )]
    username: Option<String>,
    /// `YYYY-MM-DD HH:MM:SS` (UTC) or RFC 3339. Empty lifts the ban.
    #[validate(custom(
        function = "validate_ban_timestamp",
        message = "Ban expiry must be formatted as 'YYYY-MM-DD HH:MM:SS'."
    ))]
    banned_until: Option<String>,
    permanently_banned: Option<bool>,
    is_admin: Option<bool>,
}

fn validate_ban_timestamp(value: &str) -> std::result::Result<(), ValidationError> {
    let value = value.trim();
    if value.is_empty() || parse_ban_timestamp(value).is_some() {
        Ok(())
    } else {
        Err(ValidationError::new("banned_until"))
    }
}

impl From<Body> for ModerationUpdate {
    fn from(body: Body) -> Self {
        ModerationUpdate {
            fullname: body.fullname.map(|name| name.trim().to_owned()),
            email: body.email.map(|email| email.trim().to_lowercase()),
            username: body.username.map(|username| username.trim().to_owned()),
            banned_until: body.banned_until,
            permanently_banned: body.permanently_banned,
            is_admin: body.is_admin,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Response {
    success: bool,
    user: User,
}

/// Partially update a user. Absent fields are kept as they are.
pub async fn handler(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Valid(body): Valid<Body>,
) -> Result<Json<Response>> {
    let user = UserRepository::new(state.db.postgres)
        .update_moderation(user_id, &body.into())
        .await?;

    tracing::info!(
        user_id,
        permanently_banned = user.permanently_banned,
        banned_until = ?user.banned_until,
        "user moderated"
    );

    Ok(Json(Response {
        success: true,
        user,
    }))
}
