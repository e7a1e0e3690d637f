use axum::Json;
use axum::extract::State;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::Result;
use crate::router::Valid;
use crate::user::UserService;

pub const TOKEN_TYPE: &str = "Bearer";

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Body {
    #[validate(length(min = 1, message = "Username is required."))]
    pub username: String,
    #[validate(length(min = 1, message = "Password is required."))]
    pub password: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    pub user_id: i64,
    pub is_admin: bool,
    pub token_type: String,
    pub token: String,
    pub expires_in: u64,
}

/// Handler to log a user in.
///
/// Credentials are checked first, then the ban state; only then is
/// `last_login` updated and a token issued.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<Json<Response>> {
    let user = UserService::new(state.db.postgres.clone(), state.crypto.clone())
        .login(body.username.trim(), &body.password, Utc::now())
        .await?;

    let token = state.token.create(user.id, &user.username, user.is_admin)?;

    tracing::info!(user_id = user.id, "user logged in");

    Ok(Json(Response {
        success: true,
        user_id: user.id,
        is_admin: user.is_admin,
        token_type: TOKEN_TYPE.to_owned(),
        token,
        expires_in: state.token.expires_in(),
    }))
}
