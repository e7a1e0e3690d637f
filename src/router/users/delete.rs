use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::AppState;
use crate::error::Result;
use crate::router::Path;
use crate::user::UserRepository;

#[derive(Debug, Serialize)]
pub struct Response {
    success: bool,
}

/// Delete a user with its conversations. Succeeds even if the user is
/// already gone.
pub async fn handler(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Response>> {
    let deleted = UserRepository::new(state.db.postgres).delete(user_id).await?;
    tracing::info!(user_id, deleted, "user deletion requested");

    Ok(Json(Response { success: true }))
}
