use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::Result;
use crate::router::Valid;
use crate::user::{UserBuilder, UserService};

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Body {
    #[validate(
        length(min = 1, max = 100, message = "Full name must be 1 to 100 characters long."),
        custom(function = "crate::router::validate_not_blank", message = "Full name is required.")
    )]
    pub fullname: String,
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
    #[validate(
        length(min = 3, max = 32, message = "Username must be 3 to 32 characters long."),
        custom(
            function = "crate::router::validate_username",
            message = "Username must only contain letters, digits, '_', '.' or '-'."
        )
    )]
    pub username: String,
    #[validate(length(
        min = 8,
        max = 255,
        message = "Password must contain at least 8 characters."
    ))]
    pub password: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    pub user_id: i64,
}

/// Handler to create user.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<(StatusCode, Json<Response>)> {
    let user = UserBuilder::new()
        .fullname(body.fullname)
        .email(body.email)
        .username(body.username)
        .password(body.password)
        .build();

    let user = UserService::new(state.db.postgres.clone(), state.crypto.clone())
        .create(user)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(Response {
            success: true,
            user_id: user.id,
        }),
    ))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::*;
    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::json;
    use sqlx::{Pool, Postgres};

    pub(crate) fn jane() -> Body {
        Body {
            fullname: "Jane Doe".into(),
            email: "Jane@Chatdesk.local".into(),
            username: "jane".into(),
            password: "correct horse".into(),
        }
    }

    #[sqlx::test]
    async fn test_signup_handler(pool: Pool<Postgres>) {
        let state = router::state(pool.clone());
        let app = app(state);

        let response = make_request(None, app, Method::POST, "/signup", json!(jane()).to_string()).await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: Response = serde_json::from_slice(&body).unwrap();
        assert!(body.success);

        let (email, hash): (String, String) =
            sqlx::query_as("SELECT email, password_hash FROM users WHERE id = $1")
                .bind(body.user_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(email, "jane@chatdesk.local");
        assert!(hash.starts_with("$argon2id$"));
    }

    #[sqlx::test]
    async fn test_signup_duplicate(pool: Pool<Postgres>) {
        let state = router::state(pool.clone());

        let first =
            make_request(None, app(state.clone()), Method::POST, "/signup", json!(jane()).to_string()).await;
        assert_eq!(first.status(), StatusCode::CREATED);

        let second =
            make_request(None, app(state), Method::POST, "/signup", json!(jane()).to_string()).await;
        assert_eq!(second.status(), StatusCode::CONFLICT);

        let body = second.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["success"], false);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[sqlx::test]
    async fn test_signup_validation(pool: Pool<Postgres>) {
        let state = router::state(pool.clone());

        let body = Body {
            username: "jane doe".into(),
            password: "short".into(),
            ..jane()
        };
        let response =
            make_request(None, app(state.clone()), Method::POST, "/signup", json!(body).to_string()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["errors"].as_array().unwrap().len(), 2);

        // Missing field.
        let response = make_request(
            None,
            app(state),
            Method::POST,
            "/signup",
            json!({ "username": "jane", "password": "correct horse" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
