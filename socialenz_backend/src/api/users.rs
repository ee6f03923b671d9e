use super::session::{cleared_cookie, session_cookie, AuthUser};
use super::{ApiError, ApiJson, ApiResult, AppState, MessageResponse};
use crate::identity::{
    FollowOutcome, LoginInput, Patch, ProfilePatch, ProfileView, RegisterInput, UserSummary,
};
use crate::media::{MediaKind, MediaUpload};
use axum::extract::{FromRequest, Multipart, Path, Query, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub(crate) struct RegisterResponse {
    message: String,
    user: UserSummary,
}

#[derive(Debug, Serialize)]
pub(crate) struct LoginResponse {
    message: String,
    token: String,
    user: UserSummary,
}

#[derive(Debug, Serialize)]
pub(crate) struct FollowResponse {
    message: String,
    #[serde(flatten)]
    outcome: FollowOutcome,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchParams {
    #[serde(default)]
    keyword: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct UsersResponse {
    users: Vec<UserSummary>,
}

pub(crate) async fn register(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<RegisterInput>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let email = input.email.trim().to_lowercase();
    let service = state.identity();
    let user = tokio::task::spawn_blocking(move || service.register(input))
        .await
        .map_err(|err| ApiError::Internal(err.into()))??;

    state.mailer.send_welcome(&email, &user.username);
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User registered successfully".into(),
            user,
        }),
    ))
}

pub(crate) async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    ApiJson(input): ApiJson<LoginInput>,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    let service = state.identity();
    let outcome = tokio::task::spawn_blocking(move || service.authenticate(input))
        .await
        .map_err(|err| ApiError::Internal(err.into()))??;

    tracing::info!(user_id = %outcome.user.id, "user logged in");
    let jar = jar.add(session_cookie(&state.config.auth, outcome.token.clone()));
    Ok((
        jar,
        Json(LoginResponse {
            message: "Login successful".into(),
            token: outcome.token,
            user: outcome.user,
        }),
    ))
}

pub(crate) async fn logout(jar: CookieJar) -> (CookieJar, Json<MessageResponse>) {
    (
        jar.add(cleared_cookie()),
        MessageResponse::new("Logged out successfully"),
    )
}

pub(crate) async fn get_profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<ProfileView> {
    Ok(Json(state.identity().get_profile(&user_id)?))
}

/// Accepts either a JSON patch or a multipart form with an optional `profilePicture` file.
pub(crate) async fn edit_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Path(user_id): Path<String>,
    request: Request,
) -> ApiResult<ProfileView> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("multipart/form-data"))
        .unwrap_or(false);

    let mut uploaded = Vec::new();
    let edited = async {
        let patch = if is_multipart {
            let multipart = Multipart::from_request(request, &state)
                .await
                .map_err(|err| ApiError::BadRequest(err.body_text()))?;
            read_profile_form(&state, multipart, &mut uploaded).await?
        } else {
            let ApiJson(patch) = ApiJson::<ProfilePatch>::from_request(request, &state).await?;
            patch
        };
        Ok::<_, ApiError>(state.identity().edit_profile(&user.id, &user_id, patch)?)
    }
    .await;

    match edited {
        Ok(update) => {
            if let Some(old) = update.replaced_picture.as_deref() {
                if state.media.is_managed(old) {
                    state.media.discard(old).await;
                }
            }
            Ok(Json(update.profile))
        }
        Err(err) => {
            state.discard_uploads(&uploaded).await;
            Err(err)
        }
    }
}

/// Stored pictures are pushed onto `uploaded` as soon as they exist.
async fn read_profile_form(
    state: &AppState,
    mut multipart: Multipart,
    uploaded: &mut Vec<String>,
) -> Result<ProfilePatch, ApiError> {
    let mut patch = ProfilePatch::default();
    let mut picture = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::BadRequest(err.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "profilePicture" && field.file_name().is_some() {
            let file_name = field.file_name().map(str::to_string);
            let data = field
                .bytes()
                .await
                .map_err(|err| ApiError::BadRequest(err.body_text()))?;
            if data.is_empty() {
                continue;
            }
            let url = state
                .media
                .upload(MediaUpload {
                    kind: MediaKind::ProfilePicture,
                    file_name,
                    data,
                })
                .await?;
            uploaded.push(url.clone());
            picture = Some(url);
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|err| ApiError::BadRequest(err.body_text()))?;
        let value = Patch::Set(value).non_blank();
        match name.as_str() {
            "fullName" => patch.full_name = value,
            "bio" => patch.bio = value,
            "website" => patch.website = value,
            "location" => patch.location = value,
            "gender" => patch.gender = value,
            "phoneNumber" => patch.phone_number = value,
            "dateOfBirth" => patch.date_of_birth = value,
            "profilePicture" => patch.profile_picture = value,
            other => tracing::debug!(field = other, "ignoring unknown profile field"),
        }
    }
    if let Some(url) = picture {
        patch.profile_picture = Patch::Set(url);
    }
    Ok(patch)
}

pub(crate) async fn follow_or_unfollow(
    State(state): State<AppState>,
    user: AuthUser,
    Path(target_id): Path<String>,
) -> ApiResult<FollowResponse> {
    let mut outcome = state.identity().follow_or_unfollow(&user.id, &target_id)?;
    state.push_notification(outcome.notification.take());
    let message = if outcome.following {
        "User followed successfully"
    } else {
        "User unfollowed successfully"
    };
    Ok(Json(FollowResponse {
        message: message.into(),
        outcome,
    }))
}

pub(crate) async fn search(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(params): Query<SearchParams>,
) -> ApiResult<UsersResponse> {
    let users = state.identity().search_users(&params.keyword)?;
    Ok(Json(UsersResponse { users }))
}

pub(crate) async fn suggested_users(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<UsersResponse> {
    let users = state.identity().suggested_users(&user.id)?;
    Ok(Json(UsersResponse { users }))
}
