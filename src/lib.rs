//! chatdesk is a backend for chat applications: accounts, conversations,
//! moderation, support tickets and announcements.

#![forbid(unsafe_code)]
mod chat;
pub mod config;
mod crypto;
mod database;
pub mod error;
mod middleware;
mod news;
mod router;
mod status;
mod support;
pub mod telemetry;
mod token;
mod user;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode, header};
use axum::routing::{get, post};
use axum::{Router, middleware as AxumMiddleware};
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};

const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    token: Option<&str>,
    app: Router,
    method: Method,
    path: &str,
    body: String,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, token);
    }

    app.oneshot(request.body(axum::body::Body::from(body)).unwrap())
        .await
        .unwrap()
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub db: database::Database,
    pub crypto: Arc<crypto::Crypto>,
    pub token: token::TokenManager,
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(10)))
        // Remove senstive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers(Any)
                .vary([header::AUTHORIZATION]),
        );

    let upload_limit = state.config.upload.max_size + router::upload::MULTIPART_OVERHEAD;
    let uploads = ServeDir::new(&state.config.upload.directory);

    Router::new()
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(status::handler))
        .route("/signup", post(router::signup::handler))
        .route("/login", post(router::login::handler))
        // `POST /upload` goes to `upload`. Authorization required.
        .route(
            "/upload",
            post(router::upload::handler)
                .layer(DefaultBodyLimit::max(upload_limit))
                .route_layer(AxumMiddleware::from_fn_with_state(
                    state.clone(),
                    middleware::require_auth,
                )),
        )
        // `GET /stats` goes to `stats`. Administrator only.
        .route(
            "/stats",
            get(router::stats::handler).route_layer(AxumMiddleware::from_fn_with_state(
                state.clone(),
                middleware::require_admin,
            )),
        )
        .nest("/users", router::users::router(state.clone()))
        // Conversations. Authorization required.
        .merge(router::chats::router(state.clone()))
        .nest("/news", router::news::router(state.clone()))
        .merge(router::support::router(state.clone()))
        .with_state(state)
        .nest_service("/uploads", uploads)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Initialize the application state.
pub async fn initialize_state() -> Result<AppState, Box<dyn std::error::Error>> {
    // read configuration file. let it in memory.
    let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_owned());
    let config = config::Configuration::default().path(path.into()).read()?;

    let db = if let Ok(url) = std::env::var("DATABASE_URL") {
        let pool_size = config
            .postgres
            .as_ref()
            .and_then(|postgres| postgres.pool_size)
            .unwrap_or(database::DEFAULT_POOL_SIZE);
        database::Database::from_url(&url, pool_size).await?
    } else {
        let Some(postgres) = &config.postgres else {
            return Err("missing `postgres` entry on `config.yaml` file or `DATABASE_URL` variable".into());
        };

        database::Database::new(
            &postgres.address,
            postgres.username.as_deref().unwrap_or(database::DEFAULT_CREDENTIALS),
            postgres.password.as_deref().unwrap_or(database::DEFAULT_CREDENTIALS),
            postgres.database.as_deref().unwrap_or(database::DEFAULT_DATABASE_NAME),
            postgres.pool_size.unwrap_or(database::DEFAULT_POOL_SIZE),
        )
        .await?
    };

    // execute migrations scripts on start.
    sqlx::migrate!().run(&db.postgres).await?;

    let salt = std::env::var("SALT").map_err(|_| "missing `SALT` environment variable")?;
    let crypto = Arc::new(crypto::Crypto::new(config.argon2.clone(), salt)?);

    // handle jwt.
    let secret = config
        .token
        .as_ref()
        .and_then(|token| token.secret.clone())
        .or_else(|| std::env::var("TOKEN_SECRET").ok())
        .ok_or("missing `token.secret` entry on `config.yaml` file or `TOKEN_SECRET` variable")?;
    let mut token = token::TokenManager::new(&config.url, secret.as_bytes());

    if let Some(cfg) = &config.token {
        if let Some(audience) = &cfg.audience {
            token.audience(audience);
        }
        if let Some(days) = cfg.expiration_days {
            token.expiration_days(days);
        }
    }

    Ok(AppState {
        config,
        db,
        crypto,
        token,
    })
}
