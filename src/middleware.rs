//! Middlewares for routes.

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::token::Claims;

const BEARER: &str = "Bearer ";

/// Decode the `Authorization` header. The `Bearer ` prefix is optional.
fn claims(state: &AppState, req: &Request) -> Result<Claims> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .map(|header| header.strip_prefix(BEARER).unwrap_or(header).trim())
        .filter(|token| !token.is_empty())
        .ok_or(ServerError::Unauthorized)?;

    state.token.decode(token)
}

/// Reject requests without a valid token, and make [`Claims`] available to
/// handlers through `Extension<Claims>`.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let claims = claims(&state, &req)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Same as [`require_auth`], but only administrators pass.
pub async fn require_admin(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let claims = claims(&state, &req)?;

    if !claims.is_admin {
        tracing::debug!(user_id = %claims.sub, "administrator route refused");
        return Err(ServerError::Forbidden);
    }

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
