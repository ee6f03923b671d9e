mod media;
mod messages;
mod notifications;
mod posts;
pub mod session;
mod socket;
mod users;

use crate::config::SocialenzConfig;
use crate::content::ContentService;
use crate::conversations::ConversationService;
use crate::database::Database;
use crate::error::SocialError;
use crate::identity::IdentityService;
use crate::mailer::WelcomeMailer;
use crate::media::MediaStore;
use crate::notifications::{NotificationService, NotificationView};
use crate::realtime::{RealtimeEvent, RealtimeHub};
use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, FromRequest, Request, State};
use axum::middleware::{self, Next};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: SocialenzConfig,
    pub database: Database,
    pub hub: RealtimeHub,
    pub media: MediaStore,
    pub mailer: WelcomeMailer,
}

impl AppState {
    pub fn new(config: SocialenzConfig, database: Database) -> Result<Self> {
        let media = MediaStore::from_config(&config.paths, &config.media)?;
        let mailer = WelcomeMailer::new(config.mail.clone());
        Ok(Self {
            config,
            database,
            hub: RealtimeHub::new(),
            media,
            mailer,
        })
    }

    pub(crate) fn identity(&self) -> IdentityService {
        IdentityService::new(self.database.clone(), self.config.auth.clone())
    }

    pub(crate) fn content(&self) -> ContentService {
        ContentService::new(self.database.clone())
    }

    pub(crate) fn conversations(&self) -> ConversationService {
        ConversationService::new(self.database.clone())
    }

    pub(crate) fn notifications(&self) -> NotificationService {
        NotificationService::new(self.database.clone())
    }

    /// Removes files stored earlier in a request that did not complete.
    pub(crate) async fn discard_uploads(&self, urls: &[String]) {
        for url in urls {
            self.media.discard(url).await;
        }
    }

    /// Pushes a committed notification to its receiver's room, if anyone is listening.
    pub(crate) fn push_notification(&self, notification: Option<NotificationView>) {
        if let Some(notification) = notification {
            let receiver = notification.receiver_id.clone();
            let delivered = self
                .hub
                .emit(&receiver, RealtimeEvent::NewNotification(notification));
            tracing::debug!(receiver = %receiver, delivered, "pushed notification");
        }
    }
}

pub(crate) type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Unprocessable(String),
    Internal(anyhow::Error),
}

/// Detail of an internal error, carried on the response so the development-mode
/// layer can reveal it. Never serialized by default.
#[derive(Debug, Clone)]
struct InternalErrorDetail(String);

impl ApiError {
    fn into_response_parts(self) -> (StatusCode, ErrorResponse, Option<InternalErrorDetail>) {
        let plain = |status: StatusCode, message: String| {
            (
                status,
                ErrorResponse {
                    message,
                    error: None,
                },
                None,
            )
        };
        match self {
            ApiError::BadRequest(msg) => plain(StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => plain(StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => plain(StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => plain(StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => plain(StatusCode::CONFLICT, msg),
            ApiError::Unprocessable(msg) => plain(StatusCode::UNPROCESSABLE_ENTITY, msg),
            ApiError::Internal(err) => {
                tracing::error!(error = ?err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse {
                        message: "Internal server error".into(),
                        error: None,
                    },
                    Some(InternalErrorDetail(format!("{err:#}"))),
                )
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body, detail) = self.into_response_parts();
        let mut response = (status, Json(body)).into_response();
        if let Some(detail) = detail {
            response.extensions_mut().insert(detail);
        }
        response
    }
}

/// Rewrites internal-error bodies to include their detail when `expose` is set.
fn reveal_error_detail(mut response: Response, expose: bool) -> Response {
    let Some(InternalErrorDetail(detail)) = response.extensions_mut().remove::<InternalErrorDetail>()
    else {
        return response;
    };
    if !expose {
        return response;
    }
    let (parts, _) = response.into_parts();
    let body = Json(ErrorResponse {
        message: "Internal server error".into(),
        error: Some(detail),
    })
    .into_response()
    .into_body();
    Response::from_parts(parts, body)
}

async fn error_detail_layer(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    reveal_error_detail(response, state.config.environment.is_development())
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl From<SocialError> for ApiError {
    fn from(err: SocialError) -> Self {
        match err {
            SocialError::BadRequest(msg) => ApiError::BadRequest(msg),
            SocialError::Unauthorized(msg) => ApiError::Unauthorized(msg),
            SocialError::Forbidden(msg) => ApiError::Forbidden(msg),
            SocialError::NotFound(msg) => ApiError::NotFound(msg),
            SocialError::Conflict(msg) => ApiError::Conflict(msg),
            SocialError::Internal(err) => ApiError::Internal(err),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Unprocessable(rejection.body_text())
    }
}

/// `Json` extractor whose rejections render as [`ApiError`] (422 for unreadable bodies).
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub(crate) struct ApiJson<T>(pub T);

#[derive(Debug, Serialize)]
struct ErrorResponse {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub(crate) fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "service": crate::utils::APP_NAME }))
}

async fn fallback_handler() -> ApiError {
    ApiError::NotFound("Route not found".into())
}

pub fn build_router(state: AppState) -> Result<Router> {
    let origin = HeaderValue::from_str(&state.config.cors_origin)
        .with_context(|| format!("invalid CORS origin {}", state.config.cors_origin))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION]);

    let api = Router::new()
        .route("/user/register", post(users::register))
        .route("/user/login", post(users::login))
        .route("/user/logout", post(users::logout))
        .route("/user/profile/:id", get(users::get_profile))
        .route("/user/edit-profile/:id", put(users::edit_profile))
        .route("/user/follow/:id", put(users::follow_or_unfollow))
        .route("/user/search", get(users::search))
        .route("/user/suggested-users", get(users::suggested_users))
        .route("/post/createPost", post(posts::create_post))
        .route("/post/AllPost", get(posts::list_posts))
        .route("/post/likes", get(posts::list_liked_posts))
        .route("/post/bookmark", get(posts::list_bookmarks))
        .route("/post/user/:user_id/posts", get(posts::list_posts_by_author))
        .route("/post/posts/:post_id/like", put(posts::toggle_like))
        .route("/post/posts/:post_id/comment", post(posts::add_comment))
        .route("/post/posts/:post_id/comments", get(posts::list_comments))
        .route("/post/posts/:post_id/deletePost", delete(posts::delete_post))
        .route("/post/posts/:post_id/bookmark", put(posts::toggle_bookmark))
        .route("/message/send/:id", post(messages::send_message))
        .route("/message/all/:id", get(messages::list_messages))
        .route("/message/conversations", get(messages::list_conversations))
        .route("/message/seen/:id", put(messages::mark_seen))
        .route("/notification", get(notifications::list_notifications))
        .route("/notification/:id/read", put(notifications::mark_read))
        .route("/socket", get(socket::socket_handler));

    let max_upload_bytes = state.config.media.max_upload_bytes;
    let router = Router::new()
        .route("/", get(health_handler))
        .route("/health", get(health_handler))
        .route("/media/:name", get(media::serve_media))
        .nest("/api/v1", api)
        .fallback(fallback_handler)
        .layer(middleware::from_fn_with_state(state.clone(), error_detail_layer))
        .layer(DefaultBodyLimit::max(max_upload_bytes as usize))
        .layer(cors)
        .with_state(state);

    tracing::info!(
        max_body_limit_mb = max_upload_bytes / (1024 * 1024),
        "configured upload body limit"
    );
    Ok(router)
}

/// Tries to bind to the given port, or finds the next available port
async fn find_available_port(start_port: u16) -> Result<(TcpListener, u16)> {
    const MAX_PORT_ATTEMPTS: u16 = 100;

    for offset in 0..MAX_PORT_ATTEMPTS {
        let port = start_port.saturating_add(offset);
        let addr = SocketAddr::from(([0, 0, 0, 0], port));

        match TcpListener::bind(addr).await {
            Ok(listener) => return Ok((listener, port)),
            Err(e) => {
                if offset == 0 {
                    tracing::debug!(port, error = %e, "port in use, trying next port");
                }
                continue;
            }
        }
    }

    anyhow::bail!(
        "could not find available port in range {}-{}",
        start_port,
        start_port.saturating_add(MAX_PORT_ATTEMPTS - 1)
    )
}

pub async fn serve_http(state: AppState) -> Result<()> {
    let requested_port = state.config.api_port;
    let router = build_router(state)?;

    let (listener, actual_port) = find_available_port(requested_port).await?;
    let addr = SocketAddr::from(([0, 0, 0, 0], actual_port));

    if actual_port != requested_port {
        tracing::warn!(
            requested_port,
            actual_port,
            "configured port was in use, bound to next available port"
        );
    }

    tracing::info!(?addr, "HTTP server listening");
    axum::serve(listener, router.into_make_service()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn social_errors_map_to_statuses() {
        let cases = [
            (SocialError::bad_request("x"), StatusCode::BAD_REQUEST),
            (SocialError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (SocialError::forbidden("x"), StatusCode::FORBIDDEN),
            (SocialError::not_found("x"), StatusCode::NOT_FOUND),
            (SocialError::Conflict("x".into()), StatusCode::CONFLICT),
            (
                SocialError::Internal(anyhow::anyhow!("disk on fire")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn internal_errors_hide_detail_by_default() {
        let (_, body, detail) =
            ApiError::Internal(anyhow::anyhow!("secret detail")).into_response_parts();
        assert_eq!(body.message, "Internal server error");
        assert!(body.error.is_none());
        assert_eq!(detail.map(|d| d.0).as_deref(), Some("secret detail"));
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn error_detail_is_revealed_only_when_exposed() {
        let internal = || ApiError::Internal(anyhow::anyhow!("disk on fire")).into_response();

        let hidden = reveal_error_detail(internal(), false);
        assert_eq!(hidden.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(hidden.extensions().get::<InternalErrorDetail>().is_none());
        let body = body_json(hidden).await;
        assert!(body.get("error").is_none());

        let shown = reveal_error_detail(internal(), true);
        assert_eq!(shown.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(shown).await;
        assert_eq!(body["message"], "Internal server error");
        assert_eq!(body["error"], "disk on fire");

        let plain = reveal_error_detail(ApiError::NotFound("nope".into()).into_response(), true);
        assert_eq!(body_json(plain).await["message"], "nope");
    }
}
