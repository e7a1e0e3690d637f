//! Users-related HTTP API.
mod admin;
mod api_key;
mod delete;
mod get;
mod list;
mod me;
mod update;

use axum::routing::{get, post};
use axum::{Router, middleware};

use crate::AppState;
use crate::middleware::{require_admin, require_auth};

pub fn router(state: AppState) -> Router<AppState> {
    let moderation = Router::new()
        // `GET /users` goes to `list`. Administrator only.
        .route("/", get(list::handler))
        .route(
            "/{user_id}",
            get(get::handler)
                .put(update::handler)
                .delete(delete::handler),
        )
        .route("/{user_id}/admin", post(admin::handler))
        .route("/{user_id}/api-key", post(api_key::handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    let me = Router::new()
        // `GET` and `PATCH /users/@me`. Authorization required.
        .route("/@me", get(me::get).patch(me::update))
        .route_layer(middleware::from_fn_with_state(state, require_auth));

    moderation.merge(me)
}
