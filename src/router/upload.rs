//! Image upload.
//!
//! Files are written under the configured upload directory with a random
//! name and served back from `/uploads/`.

use std::path::Path;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Multipart, State};
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::Configuration;
use crate::error::Result;

/// Slack given to the request body on top of the file size limit, for
/// multipart boundaries and headers.
pub const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Errors that can occur during file upload operations.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("no file provided")]
    NoFile,

    #[error("file too large (max: {max_size} bytes)")]
    TooLarge { max_size: usize },

    #[error("invalid file type: {mime_type}")]
    InvalidMimeType { mime_type: String },

    #[error("invalid filename")]
    InvalidFilename,

    #[error("malformed multipart body: {0}")]
    Multipart(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl UploadError {
    pub fn status(&self) -> StatusCode {
        match self {
            UploadError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            UploadError::InvalidMimeType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            UploadError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            UploadError::NoFile | UploadError::InvalidFilename | UploadError::Multipart(_) => {
                StatusCode::BAD_REQUEST
            },
        }
    }

    fn from_multipart(err: MultipartError, max_size: usize) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            UploadError::TooLarge { max_size }
        } else {
            UploadError::Multipart(err.body_text())
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    pub image_url: String,
}

/// Lowercase extension of `file_name` if the configuration accepts it.
fn allowed_extension(config: &Configuration, file_name: &str) -> std::result::Result<String, UploadError> {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .ok_or(UploadError::InvalidFilename)?;

    let guessed = mime_guess::from_ext(&extension).first_or_octet_stream();
    if !config.upload.extensions.contains(&extension) || guessed.type_() != mime_guess::mime::IMAGE {
        return Err(UploadError::InvalidMimeType {
            mime_type: guessed.essence_str().to_owned(),
        });
    }

    Ok(extension)
}

/// Handler for `POST /upload`. The first file of the form is kept.
pub async fn handler(
    State(config): State<Arc<Configuration>>,
    mut multipart: Multipart,
) -> Result<Json<Response>> {
    let max_size = config.upload.max_size;

    let field = loop {
        match multipart
            .next_field()
            .await
            .map_err(|err| UploadError::from_multipart(err, max_size))?
        {
            Some(field) if field.file_name().is_some() => break field,
            Some(_) => continue,
            None => return Err(UploadError::NoFile.into()),
        }
    };

    let file_name = field.file_name().unwrap_or_default().to_owned();
    let content_type = field.content_type().unwrap_or_default().to_owned();
    if !content_type.starts_with("image/") {
        return Err(UploadError::InvalidMimeType {
            mime_type: content_type,
        }
        .into());
    }
    let extension = allowed_extension(&config, &file_name)?;

    let data = field
        .bytes()
        .await
        .map_err(|err| UploadError::from_multipart(err, max_size))?;
    if data.is_empty() {
        return Err(UploadError::NoFile.into());
    }
    if data.len() > max_size {
        return Err(UploadError::TooLarge { max_size }.into());
    }

    let stored_name = format!("{}.{extension}", Uuid::new_v4());
    tokio::fs::create_dir_all(&config.upload.directory)
        .await
        .map_err(|err| UploadError::Storage(err.to_string()))?;
    tokio::fs::write(config.upload.directory.join(&stored_name), &data)
        .await
        .map_err(|err| UploadError::Storage(err.to_string()))?;

    tracing::info!(file = %stored_name, size = data.len(), %content_type, "image uploaded");

    Ok(Json(Response {
        success: true,
        image_url: config.upload_url(&stored_name),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::*;
    use axum::body::Body;
    use axum::extract::Request;
    use axum::http::{Method, header};
    use http_body_util::BodyExt;
    use sqlx::{Pool, Postgres};
    use tower::util::ServiceExt;

    const BOUNDARY: &str = "chatdeskboundary";

    fn form(file_name: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n\
             --{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
             Content-Type: {content_type}\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    async fn upload(state: &AppState, body: Vec<u8>) -> axum::http::Response<Body> {
        let token = router::user_token(state);

        app(state.clone())
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/upload")
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/form-data; boundary={BOUNDARY}"),
                    )
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    #[sqlx::test]
    async fn test_upload_image(pool: Pool<Postgres>) {
        let state = router::state(pool);

        let response = upload(&state, form("Avatar.PNG", "image/png", b"\x89PNG\r\n\x1a\nfake")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: super::Response = serde_json::from_slice(&body).unwrap();
        assert!(body.success);
        assert!(body.image_url.starts_with("http://localhost:8080/uploads/"));
        assert!(body.image_url.ends_with(".png"));

        let stored = body.image_url.rsplit('/').next().unwrap();
        let data = std::fs::read(state.config.upload.directory.join(stored)).unwrap();
        assert_eq!(data, b"\x89PNG\r\n\x1a\nfake");
    }

    #[sqlx::test]
    async fn test_upload_rejections(pool: Pool<Postgres>) {
        let state = router::state(pool);

        let response = upload(&state, form("notes.txt", "text/plain", b"hello")).await;
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let response = upload(&state, form("script.exe", "image/png", b"MZ")).await;
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let response = upload(&state, form("noextension", "image/png", b"data")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let big = vec![0u8; state.config.upload.max_size + 1];
        let response = upload(&state, form("big.png", "image/png", &big)).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let empty = format!("--{BOUNDARY}--\r\n").into_bytes();
        let response = upload(&state, empty).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
