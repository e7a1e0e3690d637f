//! Connected user.

use axum::extract::State;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::Result;
use crate::router::Valid;
use crate::token::Claims;
use crate::user::{ProfileUpdate, User, UserRepository};

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct Body {
    #[validate(length(min = 1, max = 100, message = "Full name must be 1 to 100 characters long."))]
    fullname: Option<String>,
    #[validate(email(message = "Email must be formatted."))]
    email: Option<String>,
    #[validate(
        length(min = 3, max = 32, message = "Username must be 3 to 32 characters long."),
        custom(
            function = "crate::router::validate_username",
            message = "Username must only contain letters, digits, '_', '.' or '-'."
        )
    )]
    username: Option<String>,
    #[validate(url(message = "Profile image must be an URL."))]
    profile_image: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Response {
    success: bool,
    user: User,
}

/// Handler for `GET /users/@me`.
pub async fn get(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<User>> {
    let user = UserRepository::new(state.db.postgres)
        .find_by_id(claims.user_id()?)
        .await?;

    Ok(Json(user))
}

/// Handler for `PATCH /users/@me`.
pub async fn update(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Valid(body): Valid<Body>,
) -> Result<Json<Response>> {
    let update = ProfileUpdate {
        fullname: body.fullname.map(|name| name.trim().to_owned()),
        email: body.email.map(|email| email.trim().to_lowercase()),
        username: body.username.map(|username| username.trim().to_owned()),
        profile_image: body.profile_image,
    };

    let user = UserRepository::new(state.db.postgres)
        .update_profile(claims.user_id()?, &update)
        .await?;

    Ok(Json(Response {
        success: true,
        user,
    }))
}
