use super::session::AuthUser;
use super::{ApiError, ApiJson, ApiResult, AppState};
use crate::conversations::{ConversationView, MessageType, MessageView, NewMessage, SeenOutcome};
use crate::media::{MediaKind, MediaUpload};
use crate::realtime::RealtimeEvent;
use axum::extract::{FromRequest, Multipart, Path, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub(crate) struct MessagesResponse {
    messages: Vec<MessageView>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ConversationsResponse {
    conversations: Vec<ConversationView>,
}

/// Form variant of [`NewMessage`]: text fields plus an optional `media` file.
/// Stored files are pushed onto `uploaded` as soon as they exist.
async fn read_message_form(
    state: &AppState,
    mut multipart: Multipart,
    uploaded: &mut Vec<String>,
) -> Result<NewMessage, ApiError> {
    let mut message = NewMessage::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::BadRequest(err.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "media" {
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
                    kind: MediaKind::Attachment,
                    file_name,
                    data,
                })
                .await?;
            uploaded.push(url.clone());
            message.media_url = Some(url);
            continue;
        }
        let value = field
            .text()
            .await
            .map_err(|err| ApiError::BadRequest(err.body_text()))?;
        match name.as_str() {
            "content" | "message" => message.content = Some(value),
            "type" => {
                let parsed = MessageType::parse(&value).ok_or_else(|| {
                    ApiError::BadRequest(format!("Unsupported message type {value}"))
                })?;
                message.message_type = Some(parsed);
            }
            other => tracing::debug!(field = other, "ignoring unknown message field"),
        }
    }
    Ok(message)
}

pub(crate) async fn send_message(
    State(state): State<AppState>,
    user: AuthUser,
    Path(receiver_id): Path<String>,
    request: Request,
) -> ApiResult<MessageView> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("multipart/form-data"))
        .unwrap_or(false);

    let mut uploaded = Vec::new();
    let stored = async {
        let input = if is_multipart {
            let multipart = Multipart::from_request(request, &state)
                .await
                .map_err(|err| ApiError::BadRequest(err.body_text()))?;
            read_message_form(&state, multipart, &mut uploaded).await?
        } else {
            let ApiJson(input) = ApiJson::<NewMessage>::from_request(request, &state).await?;
            input
        };
        Ok::<_, ApiError>(
            state
                .conversations()
                .send_message(&user.id, &receiver_id, input)?,
        )
    }
    .await;

    let message = match stored {
        Ok(message) => message,
        Err(err) => {
            state.discard_uploads(&uploaded).await;
            return Err(err);
        }
    };

    let delivered = state
        .hub
        .emit(&receiver_id, RealtimeEvent::NewMessage(message.clone()));
    tracing::debug!(
        message_id = %message.id,
        receiver = %receiver_id,
        delivered,
        "message stored"
    );
    Ok(Json(message))
}

pub(crate) async fn list_messages(
    State(state): State<AppState>,
    user: AuthUser,
    Path(other_id): Path<String>,
) -> ApiResult<MessagesResponse> {
    let messages = state.conversations().list_messages(&user.id, &other_id)?;
    Ok(Json(MessagesResponse { messages }))
}

pub(crate) async fn list_conversations(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<ConversationsResponse> {
    let conversations = state.conversations().list_conversations(&user.id)?;
    Ok(Json(ConversationsResponse { conversations }))
}

pub(crate) async fn mark_seen(
    State(state): State<AppState>,
    user: AuthUser,
    Path(other_id): Path<String>,
) -> ApiResult<SeenOutcome> {
    Ok(Json(
        state
            .conversations()
            .mark_conversation_seen(&user.id, &other_id)?,
    ))
}
