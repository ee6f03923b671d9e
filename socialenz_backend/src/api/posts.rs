use super::session::AuthUser;
use super::{ApiError, ApiJson, ApiResult, AppState, MessageResponse};
use crate::content::{
    validate_post_input, BookmarkOutcome, CommentView, LikeOutcome, NewPost, PostPage, PostView,
};
use crate::media::{MediaKind, MediaUpload};
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub(crate) struct PageParams {
    page: Option<usize>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommentRequest {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct PostResponse {
    message: String,
    post: PostView,
}

#[derive(Debug, Serialize)]
pub(crate) struct PostsResponse {
    posts: Vec<PostView>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CommentResponse {
    message: String,
    comment: CommentView,
}

#[derive(Debug, Serialize)]
pub(crate) struct CommentsResponse {
    comments: Vec<CommentView>,
}

#[derive(Debug, Serialize)]
pub(crate) struct LikeResponse {
    message: String,
    #[serde(flatten)]
    outcome: LikeOutcome,
}

#[derive(Debug, Serialize)]
pub(crate) struct BookmarkResponse {
    message: String,
    #[serde(flatten)]
    outcome: BookmarkOutcome,
}

struct UploadedFile {
    file_name: Option<String>,
    data: Bytes,
}

#[derive(Default)]
struct PostForm {
    caption: String,
    location: Option<String>,
    images: Vec<UploadedFile>,
    music: Option<UploadedFile>,
}

async fn read_post_form(mut multipart: Multipart) -> Result<PostForm, ApiError> {
    let mut form = PostForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::BadRequest(err.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        match name.as_str() {
            "images" | "image" | "music" => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|err| ApiError::BadRequest(err.body_text()))?;
                if data.is_empty() {
                    continue;
                }
                let file = UploadedFile { file_name, data };
                if name == "music" {
                    form.music = Some(file);
                } else {
                    form.images.push(file);
                }
            }
            "caption" | "location" => {
                let value = field
                    .text()
                    .await
                    .map_err(|err| ApiError::BadRequest(err.body_text()))?;
                if name == "caption" {
                    form.caption = value;
                } else {
                    form.location = Some(value);
                }
            }
            other => tracing::debug!(field = other, "ignoring unknown post field"),
        }
    }
    Ok(form)
}

pub(crate) async fn create_post(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<PostResponse>), ApiError> {
    let form = read_post_form(multipart).await?;
    validate_post_input(&form.caption, form.images.len())?;

    let mut uploaded: Vec<String> = Vec::with_capacity(form.images.len());
    let upload_result = async {
        let mut images = Vec::with_capacity(form.images.len());
        for image in form.images {
            let url = state
                .media
                .upload(MediaUpload {
                    kind: MediaKind::PostImage,
                    file_name: image.file_name,
                    data: image.data,
                })
                .await?;
            uploaded.push(url.clone());
            images.push(url);
        }
        let music = match form.music {
            Some(track) => {
                let url = state
                    .media
                    .upload(MediaUpload {
                        kind: MediaKind::Music,
                        file_name: track.file_name,
                        data: track.data,
                    })
                    .await?;
                uploaded.push(url.clone());
                Some(url)
            }
            None => None,
        };
        state.content().create_post(NewPost {
            author_id: user.id.clone(),
            caption: form.caption,
            images,
            music,
            location: form.location,
        })
    }
    .await;

    match upload_result {
        Ok(post) => {
            tracing::info!(post_id = %post.id, author = %user.id, images = post.images.len(), "created post");
            Ok((
                StatusCode::CREATED,
                Json(PostResponse {
                    message: "Post created successfully".into(),
                    post,
                }),
            ))
        }
        Err(err) => {
            state.discard_uploads(&uploaded).await;
            Err(err.into())
        }
    }
}

pub(crate) async fn list_posts(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(params): Query<PageParams>,
) -> ApiResult<PostPage> {
    Ok(Json(state.content().list_posts(params.page, params.limit)?))
}

pub(crate) async fn list_posts_by_author(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(author_id): Path<String>,
    Query(params): Query<PageParams>,
) -> ApiResult<PostPage> {
    Ok(Json(state.content().list_posts_by_author(
        &author_id,
        params.page,
        params.limit,
    )?))
}

pub(crate) async fn list_liked_posts(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<PostsResponse> {
    let posts = state.content().list_liked_posts(&user.id)?;
    Ok(Json(PostsResponse { posts }))
}

pub(crate) async fn toggle_like(
    State(state): State<AppState>,
    user: AuthUser,
    Path(post_id): Path<String>,
) -> ApiResult<LikeResponse> {
    let mut outcome = state.content().toggle_like(&post_id, &user.id)?;
    state.push_notification(outcome.notification.take());
    let message = if outcome.liked {
        "Post liked successfully"
    } else {
        "Post unliked successfully"
    };
    Ok(Json(LikeResponse {
        message: message.into(),
        outcome,
    }))
}

pub(crate) async fn add_comment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(post_id): Path<String>,
    ApiJson(request): ApiJson<CommentRequest>,
) -> Result<(StatusCode, Json<CommentResponse>), ApiError> {
    let outcome = state.content().add_comment(&post_id, &user.id, &request.text)?;
    state.push_notification(outcome.notification);
    Ok((
        StatusCode::CREATED,
        Json(CommentResponse {
            message: "Comment added successfully".into(),
            comment: outcome.comment,
        }),
    ))
}

pub(crate) async fn list_comments(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(post_id): Path<String>,
) -> ApiResult<CommentsResponse> {
    let comments = state.content().list_comments(&post_id)?;
    Ok(Json(CommentsResponse { comments }))
}

pub(crate) async fn delete_post(
    State(state): State<AppState>,
    user: AuthUser,
    Path(post_id): Path<String>,
) -> ApiResult<MessageResponse> {
    state.content().delete_post(&post_id, &user.id)?;
    Ok(MessageResponse::new("Post deleted successfully"))
}

pub(crate) async fn toggle_bookmark(
    State(state): State<AppState>,
    user: AuthUser,
    Path(post_id): Path<String>,
) -> ApiResult<BookmarkResponse> {
    let outcome = state.content().toggle_bookmark(&post_id, &user.id)?;
    let message = if outcome.bookmarked {
        "Post bookmarked successfully"
    } else {
        "Post removed from bookmarks"
    };
    Ok(Json(BookmarkResponse {
        message: message.into(),
        outcome,
    }))
}

pub(crate) async fn list_bookmarks(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<PostsResponse> {
    let posts = state.content().list_bookmarks(&user.id)?;
    Ok(Json(PostsResponse { posts }))
}
