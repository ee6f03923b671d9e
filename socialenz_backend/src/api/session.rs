use super::{ApiError, AppState};
use crate::auth::verify_token;
use crate::config::AuthConfig;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

pub const TOKEN_COOKIE: &str = "token";

/// Caller identity resolved from the `token` cookie, or an `Authorization: Bearer` header
/// for non-browser clients.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar
            .get(TOKEN_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .filter(|value| !value.is_empty())
            .or_else(|| bearer_token(&parts.headers))
            .ok_or_else(|| ApiError::Unauthorized("Unauthorized - No token provided".into()))?;

        let claims = verify_token(&state.config.auth, &token).map_err(|err| {
            tracing::debug!(error = %err, "rejected session token");
            ApiError::Unauthorized("Unauthorized - Invalid token".into())
        })?;

        let user = state
            .identity()
            .find_user(&claims.user_id)?
            .ok_or_else(|| ApiError::Unauthorized("Unauthorized - User not found".into()))?;
        Ok(AuthUser { id: user.id })
    }
}

/// The session cookie expires after a day even though the token inside stays valid for a week.
pub(crate) fn session_cookie(auth: &AuthConfig, token: String) -> Cookie<'static> {
    Cookie::build((TOKEN_COOKIE, token))
        .http_only(true)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(time::Duration::seconds(auth.cookie_max_age.as_secs() as i64))
        .build()
}

pub(crate) fn cleared_cookie() -> Cookie<'static> {
    Cookie::build((TOKEN_COOKIE, ""))
        .http_only(true)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(time::Duration::ZERO)
        .build()
}
