//! Conversations HTTP API. Every route requires a token; users reach their
//! own conversations, administrators reach all of them.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router, middleware};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use crate::chat::{Chat, ChatRepository, IncomingMessage, Message};
use crate::config::Configuration;
use crate::database::Database;
use crate::error::{Result, ServerError};
use crate::middleware::require_auth;
use crate::router::{Path, Query, Valid};
use crate::token::Claims;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    user_id: Option<i64>,
}

/// Snapshot of a conversation sent by a client.
#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct SaveBody {
    /// Defaults to the caller.
    pub user_id: Option<i64>,
    pub chat_id: Option<String>,
    pub title: Option<String>,
    #[serde(default)]
    pub messages: Vec<IncomingMessage>,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct CreateBody {
    pub user_id: Option<i64>,
    #[validate(length(min = 1, max = 128, message = "Chat ID must be 1 to 128 characters long."))]
    pub chat_id: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct RenameBody {
    #[validate(length(min = 1, max = 255, message = "Title must be 1 to 255 characters long."))]
    pub title: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct SaveResponse {
    pub success: bool,
    pub chat_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateResponse {
    pub success: bool,
    pub chat_id: String,
    pub chat: Chat,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
}

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/chats", get(list).post(create))
        .route("/save-chat", post(save))
        .route("/chats/{chat_id}", put(rename).delete(delete))
        .route("/chats/{chat_id}/messages", get(messages))
        .route("/messages", post(super::messages::handler))
        .route_layer(middleware::from_fn_with_state(state, require_auth))
}

/// User a request acts for: `user_id` when given, the caller otherwise.
/// Only administrators act for someone else.
pub(crate) fn acting_user(claims: &Claims, user_id: Option<i64>) -> Result<i64> {
    let caller = claims.user_id()?;

    match user_id {
        Some(user_id) if user_id != caller && !claims.is_admin => Err(ServerError::Forbidden),
        Some(user_id) => Ok(user_id),
        None => Ok(caller),
    }
}

/// Refuse a chat owned by another user to non-administrators. Returns
/// whether the chat exists.
pub(crate) async fn check_owner(repo: &ChatRepository, claims: &Claims, chat_id: &str) -> Result<bool> {
    match repo.owner(chat_id).await? {
        Some(owner) if owner != claims.user_id()? && !claims.is_admin => Err(ServerError::Forbidden),
        Some(_) => Ok(true),
        None => Ok(false),
    }
}

/// Reject absent or blank values.
fn required(value: Option<String>, field: &'static str) -> Result<String> {
    value
        .filter(|value| !value.trim().is_empty())
        .ok_or(ServerError::MissingField(field))
}

/// Handler for `GET /chats?user_id=`. Newest conversation first.
pub async fn list(
    State(db): State<Database>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Chat>>> {
    let user_id = acting_user(&claims, query.user_id)?;

    Ok(Json(ChatRepository::new(db.postgres).list_for_user(user_id).await?))
}

/// Handler for `POST /save-chat`: the stored conversation becomes exactly
/// the snapshot in the body.
pub async fn save(
    State(db): State<Database>,
    Extension(claims): Extension<Claims>,
    Valid(body): Valid<SaveBody>,
) -> Result<Json<SaveResponse>> {
    let user_id = acting_user(&claims, body.user_id)?;
    let chat_id = required(body.chat_id, "chat_id")?;
    let title = body.title.ok_or(ServerError::MissingField("title"))?;

    ChatRepository::new(db.postgres)
        .save(user_id, &chat_id, &title, &body.messages)
        .await?;

    Ok(Json(SaveResponse {
        success: true,
        chat_id,
    }))
}

/// Handler for `POST /chats`: create an empty conversation.
pub async fn create(
    State(db): State<Database>,
    State(config): State<Arc<Configuration>>,
    Extension(claims): Extension<Claims>,
    Valid(body): Valid<CreateBody>,
) -> Result<(StatusCode, Json<CreateResponse>)> {
    let user_id = acting_user(&claims, body.user_id)?;
    let chat_id = body.chat_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let title = body
        .title
        .filter(|title| !title.trim().is_empty())
        .unwrap_or_else(|| config.chat.default_title.clone());

    let chat = ChatRepository::new(db.postgres)
        .create(user_id, &chat_id, &title)
        .await?;

    tracing::debug!(chat_id, user_id, "chat created");
    Ok((
        StatusCode::CREATED,
        Json(CreateResponse {
            success: true,
            chat_id,
            chat,
        }),
    ))
}

/// Handler for `PUT /chats/{chat_id}`.
pub async fn rename(
    State(db): State<Database>,
    Extension(claims): Extension<Claims>,
    Path(chat_id): Path<String>,
    Valid(body): Valid<RenameBody>,
) -> Result<Json<Response>> {
    let repo = ChatRepository::new(db.postgres);
    if !check_owner(&repo, &claims, &chat_id).await? {
        return Err(ServerError::NotFound("chat"));
    }

    repo.rename(&chat_id, &body.title).await?;

    Ok(Json(Response { success: true }))
}

/// Handler for `DELETE /chats/{chat_id}`. Deleting an absent chat succeeds.
pub async fn delete(
    State(db): State<Database>,
    Extension(claims): Extension<Claims>,
    Path(chat_id): Path<String>,
) -> Result<Json<Response>> {
    let repo = ChatRepository::new(db.postgres);
    let deleted = check_owner(&repo, &claims, &chat_id).await? && repo.delete(&chat_id).await?;
    tracing::debug!(chat_id, deleted, "chat deletion requested");

    Ok(Json(Response { success: true }))
}

/// Handler for `GET /chats/{chat_id}/messages`.
pub async fn messages(
    State(db): State<Database>,
    Extension(claims): Extension<Claims>,
    Path(chat_id): Path<String>,
) -> Result<Json<Vec<Message>>> {
    let repo = ChatRepository::new(db.postgres);
    if !check_owner(&repo, &claims, &chat_id).await? {
        return Err(ServerError::NotFound("chat"));
    }

    Ok(Json(repo.messages(&chat_id).await?))
}
