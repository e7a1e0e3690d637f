//! News HTTP API. Reading is public, writing is for administrators.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router, middleware};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::database::Database;
use crate::error::Result;
use crate::middleware::require_admin;
use crate::news::{NewsPost, NewsRepository, NewsUpdate};
use crate::router::{Path, Valid};
use crate::token::Claims;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateBody {
    #[validate(
        length(min = 1, max = 255, message = "Title must be 1 to 255 characters long."),
        custom(function = "crate::router::validate_not_blank", message = "Title is required.")
    )]
    pub title: String,
    #[validate(custom(function = "crate::router::validate_not_blank", message = "Body is required."))]
    pub body: String,
    #[validate(url(message = "Image must be an URL."))]
    pub image_url: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct UpdateBody {
    #[validate(length(min = 1, max = 255, message = "Title must be 1 to 255 characters long."))]
    pub title: Option<String>,
    #[validate(length(min = 1, message = "Body is required."))]
    pub body: Option<String>,
    /// Empty removes the image.
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PostResponse {
    pub success: bool,
    pub post: NewsPost,
}

pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/", get(list));

    let moderation = Router::new()
        .route("/", post(create))
        .route("/{news_id}", put(update).delete(delete))
        .route_layer(middleware::from_fn_with_state(state, require_admin));

    public.merge(moderation)
}

/// Handler for `GET /news`. Newest first.
async fn list(State(db): State<Database>) -> Result<Json<Vec<NewsPost>>> {
    Ok(Json(NewsRepository::new(db.postgres).list().await?))
}

/// Handler for `POST /news`.
async fn create(
    State(db): State<Database>,
    Extension(claims): Extension<Claims>,
    Valid(body): Valid<CreateBody>,
) -> Result<(StatusCode, Json<PostResponse>)> {
    let post = NewsRepository::new(db.postgres)
        .create(
            claims.user_id()?,
            body.title.trim(),
            &body.body,
            body.image_url.as_deref(),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(PostResponse {
            success: true,
            post,
        }),
    ))
}

/// Handler for `PUT /news/{news_id}`.
async fn update(
    State(db): State<Database>,
    Path(news_id): Path<i64>,
    Valid(body): Valid<UpdateBody>,
) -> Result<Json<PostResponse>> {
    let update = NewsUpdate {
        title: body.title.map(|title| title.trim().to_owned()),
        body: body.body,
        image_url: body.image_url,
    };

    let post = NewsRepository::new(db.postgres).update(news_id, &update).await?;

    Ok(Json(PostResponse {
        success: true,
        post,
    }))
}

/// Handler for `DELETE /news/{news_id}`. Deleting an absent post succeeds.
async fn delete(
    State(db): State<Database>,
    Path(news_id): Path<i64>,
) -> Result<Json<Response>> {
    let deleted = NewsRepository::new(db.postgres).delete(news_id).await?;
    tracing::info!(news_id, deleted, "news deletion requested");

    Ok(Json(Response { success: true }))
}
