//! Support tickets HTTP API. Every route requires a token.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Extension, Json, Router, middleware};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::database::Database;
use crate::error::{Result, ServerError};
use crate::middleware::{require_admin, require_auth};
use crate::router::{Path, Valid};
use crate::support::{SupportChat, SupportMessage, SupportRepository};
use crate::token::Claims;

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct Body {
    #[serde(default)]
    #[validate(length(max = 4000, message = "Message must be at most 4000 characters long."))]
    pub content: String,
    #[validate(url(message = "Image must be an URL."))]
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TicketResponse {
    pub success: bool,
    pub ticket: SupportChat,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: SupportMessage,
}

pub fn router(state: AppState) -> Router<AppState> {
    let tickets = Router::new()
        .route("/support-chats", get(list).post(open))
        .route("/support-messages/{ticket_id}", get(messages).post(send))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let moderation = Router::new()
        .route("/support-chats/{ticket_id}/close", post(close))
        .route_layer(middleware::from_fn_with_state(state, require_admin));

    tickets.merge(moderation)
}

/// Load a ticket the caller may access: its owner or any administrator.
async fn accessible(repo: &SupportRepository, claims: &Claims, ticket_id: i64) -> Result<SupportChat> {
    let ticket = repo.find(ticket_id).await?;

    if !claims.is_admin && ticket.user_id != claims.user_id()? {
        return Err(ServerError::Forbidden);
    }

    Ok(ticket)
}

/// Handler for `POST /support-chats`.
async fn open(
    State(db): State<Database>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<TicketResponse>> {
    let ticket = SupportRepository::new(db.postgres)
        .open_or_get(claims.user_id()?)
        .await?;

    Ok(Json(TicketResponse {
        success: true,
        ticket,
    }))
}

/// Handler for `GET /support-chats`: own tickets, or all of them for
/// administrators.
async fn list(
    State(db): State<Database>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<SupportChat>>> {
    let repo = SupportRepository::new(db.postgres);

    let tickets = if claims.is_admin {
        repo.list_all().await?
    } else {
        repo.list_for_user(claims.user_id()?).await?
    };

    Ok(Json(tickets))
}

/// Handler for `GET /support-messages/{ticket_id}`.
async fn messages(
    State(db): State<Database>,
    Extension(claims): Extension<Claims>,
    Path(ticket_id): Path<i64>,
) -> Result<Json<Vec<SupportMessage>>> {
    let repo = SupportRepository::new(db.postgres);
    accessible(&repo, &claims, ticket_id).await?;

    Ok(Json(repo.messages(ticket_id).await?))
}

/// Handler for `POST /support-messages/{ticket_id}`. Reopens the ticket.
async fn send(
    State(db): State<Database>,
    Extension(claims): Extension<Claims>,
    Path(ticket_id): Path<i64>,
    Valid(body): Valid<Body>,
) -> Result<Json<MessageResponse>> {
    if body.content.trim().is_empty() && body.image_url.is_none() {
        return Err(ServerError::MissingField("content"));
    }

    let repo = SupportRepository::new(db.postgres);
    accessible(&repo, &claims, ticket_id).await?;

    let message = repo
        .add_message(
            ticket_id,
            claims.user_id()?,
            body.content.trim(),
            body.image_url.as_deref(),
        )
        .await?;

    Ok(Json(MessageResponse {
        success: true,
        message,
    }))
}

/// Handler for `POST /support-chats/{ticket_id}/close`.
async fn close(
    State(db): State<Database>,
    Path(ticket_id): Path<i64>,
) -> Result<Json<TicketResponse>> {
    let ticket = SupportRepository::new(db.postgres).close(ticket_id).await?;

    Ok(Json(TicketResponse {
        success: true,
        ticket,
    }))
}

#[cfg(test)]
mod tests {
    use crate::*;
    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::json;
    use sqlx::{Pool, Postgres};

    async fn json_body(response: axum::http::Response<axum::body::Body>) -> serde_json::Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[sqlx::test(fixtures("../../fixtures/users.sql"))]
    async fn test_support_flow(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let jane = router::user_token(&state);
        let admin = router::admin_token(&state);

        let response =
            make_request(Some(&jane), app(state.clone()), Method::POST, "/support-chats", String::default())
                .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        let ticket = &body["ticket"];
        assert_eq!(ticket["status"], "open");
        let path = format!("/support-messages/{}", ticket["id"]);

        let response = make_request(
            Some(&jane),
            app(state.clone()),
            Method::POST,
            &path,
            json!({ "content": "I cannot upload images" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let sent = json_body(response).await;
        assert_eq!(sent["success"], true);
        assert_eq!(sent["message"]["content"], "I cannot upload images");

        let close = format!("/support-chats/{}/close", ticket["id"]);
        let response =
            make_request(Some(&jane), app(state.clone()), Method::POST, &close, String::default()).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let response =
            make_request(Some(&admin), app(state.clone()), Method::POST, &close, String::default()).await;
        let closed = json_body(response).await;
        assert_eq!(closed["success"], true);
        assert_eq!(closed["ticket"]["status"], "closed");

        // An answer reopens the ticket.
        let response = make_request(
            Some(&admin),
            app(state.clone()),
            Method::POST,
            &path,
            json!({ "content": "Which format?" }).to_string(),
        )
        .await;
        let reply = json_body(response).await;
        assert_eq!(reply["message"]["sender_name"], "Admin User");
        assert_eq!(reply["message"]["sender_is_admin"], true);

        let response =
            make_request(Some(&jane), app(state.clone()), Method::GET, "/support-chats", String::default())
                .await;
        let tickets = json_body(response).await;
        assert_eq!(tickets[0]["status"], "open");

        let response =
            make_request(Some(&jane), app(state), Method::GET, &path, String::default()).await;
        let messages = json_body(response).await;
        assert_eq!(messages.as_array().unwrap().len(), 2);
        assert_eq!(messages[0]["sender_name"], "Jane Doe");
    }

    #[sqlx::test(fixtures("../../fixtures/users.sql"))]
    async fn test_support_access(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let admin = router::admin_token(&state);
        let spammer = state.token.create(3, "spammer", false).unwrap();

        let response = make_request(
            Some(&admin),
            app(state.clone()),
            Method::POST,
            "/support-chats",
            String::default(),
        )
        .await;
        let ticket = json_body(response).await;
        let path = format!("/support-messages/{}", ticket["ticket"]["id"]);

        let response =
            make_request(Some(&spammer), app(state.clone()), Method::GET, &path, String::default()).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = make_request(
            Some(&admin),
            app(state.clone()),
            Method::POST,
            &path,
            json!({ "content": "  " }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = make_request(
            Some(&admin),
            app(state.clone()),
            Method::GET,
            "/support-messages/abc",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["success"], false);

        let response =
            make_request(None, app(state), Method::GET, "/support-chats", String::default()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
