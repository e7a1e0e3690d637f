use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::chat::{ChatRepository, IncomingMessage, Message, Role};
use crate::database::Database;
use crate::error::{Result, ServerError};
use crate::router::Valid;
use crate::router::chats::{acting_user, check_owner};
use crate::token::Claims;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Body {
    #[validate(length(min = 1, message = "Chat ID is required."))]
    pub chat_id: String,
    pub role: Role,
    pub content: String,
    /// Only administrators send on behalf of another user.
    pub sender_id: Option<i64>,
    #[validate(url(message = "Image must be an URL."))]
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    pub message: Message,
}

/// Handler for `POST /messages`: append one message to an existing chat.
pub async fn handler(
    State(db): State<Database>,
    Extension(claims): Extension<Claims>,
    Valid(body): Valid<Body>,
) -> Result<(StatusCode, Json<Response>)> {
    let sender_id = body
        .sender_id
        .map(|sender_id| acting_user(&claims, Some(sender_id)))
        .transpose()?;

    let repo = ChatRepository::new(db.postgres);
    if !check_owner(&repo, &claims, &body.chat_id).await? {
        return Err(ServerError::NotFound("chat"));
    }

    let message = IncomingMessage {
        role: body.role,
        content: body.content,
        sender_id,
        image_url: body.image_url,
        timestamp: None,
    };

    let message = repo.add_message(&body.chat_id, &message).await?;

    Ok((
        StatusCode::CREATED,
        Json(Response {
            success: true,
            message,
        }),
    ))
}
