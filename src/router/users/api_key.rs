use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::Result;
use crate::router::Path;
use crate::user::UserService;

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    /// Only shown once; the server keeps a digest.
    pub api_key: String,
}

/// Generate a new API key for a user, replacing the previous one.
pub async fn handler(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Response>> {
    let key = UserService::new(state.db.postgres.clone(), state.crypto.clone())
        .rotate_api_key(user_id)
        .await?;

    Ok(Json(Response {
        success: true,
        api_key: key.to_string(),
    }))
}
