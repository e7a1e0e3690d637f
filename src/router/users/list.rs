use axum::Json;
use axum::extract::State;

use crate::AppState;
use crate::error::Result;
use crate::user::{User, UserRepository};

/// Every user, password hashes and API keys excluded.
pub async fn handler(State(state): State<AppState>) -> Result<Json<Vec<User>>> {
    Ok(Json(UserRepository::new(state.db.postgres).list().await?))
}
