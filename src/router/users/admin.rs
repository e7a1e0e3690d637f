use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::Result;
use crate::router::Path;
use crate::user::UserRepository;

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    pub is_admin: bool,
}

/// Toggle administrator role.
pub async fn handler(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Response>> {
    let is_admin = UserRepository::new(state.db.postgres)
        .toggle_admin(user_id)
        .await?;
    tracing::info!(user_id, is_admin, "administrator role toggled");

    Ok(Json(Response {
        success: true,
        is_admin,
    }))
}
