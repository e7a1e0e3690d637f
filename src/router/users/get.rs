use axum::Json;
use axum::extract::State;

use crate::AppState;
use crate::error::Result;
use crate::router::Path;
use crate::user::{User, UserRepository};

pub async fn handler(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<User>> {
    Ok(Json(UserRepository::new(state.db.postgres).find_by_id(user_id).await?))
}
