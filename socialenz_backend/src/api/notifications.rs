use super::session::AuthUser;
use super::{ApiResult, AppState};
use crate::notifications::{NotificationList, NotificationView};
use axum::extract::{Path, State};
use axum::Json;

pub(crate) async fn list_notifications(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<NotificationList> {
    Ok(Json(state.notifications().list(&user.id)?))
}

pub(crate) async fn mark_read(
    State(state): State<AppState>,
    user: AuthUser,
    Path(notification_id): Path<String>,
) -> ApiResult<NotificationView> {
    Ok(Json(
        state
            .notifications()
            .mark_read(&notification_id, &user.id)?,
    ))
}
