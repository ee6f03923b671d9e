use super::{ApiError, AppState};
use crate::media::safe_media_name;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use std::io::SeekFrom;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

/// Streams a file from the local media directory.
pub(crate) async fn serve_media(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let not_found = || ApiError::NotFound("Media not found".into());
    let dir = state.media.local_dir().ok_or_else(not_found)?;
    let name = safe_media_name(&name).ok_or_else(not_found)?;
    let path = dir.join(name);

    let mut file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
        Err(err) => return Err(ApiError::Internal(err.into())),
    };

    let mut head = [0u8; 64];
    let read = file
        .read(&mut head)
        .await
        .map_err(|err| ApiError::Internal(err.into()))?;
    file.seek(SeekFrom::Start(0))
        .await
        .map_err(|err| ApiError::Internal(err.into()))?;
    let mime = infer::get(&head[..read])
        .map(|kind| kind.mime_type())
        .unwrap_or("application/octet-stream");

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(mime));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("public, max-age=86400"));

    let body = Body::from_stream(ReaderStream::new(file));
    Ok((headers, body).into_response())
}
