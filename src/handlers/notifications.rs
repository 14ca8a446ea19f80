use crate::auth::AuthUser;
use crate::db::now_unix;
use crate::errors::{AppError, AppResult};
use crate::models::{Notification, NotificationKind, RegisterDeviceRequest, SendNotificationRequest};
use crate::notify::notify_user;
use crate::state::AppState;
use crate::store::{messages, users};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct InboxFilter {
    #[serde(default)]
    pub unread: bool,
}

pub async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(filter): Query<InboxFilter>,
) -> AppResult<Json<Vec<Notification>>> {
    let conn = state.db.lock().await;
    Ok(Json(messages::list_notifications(&conn, auth.id(), filter.unread)?))
}

pub async fn mark_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(notification_id): Path<String>,
) -> AppResult<Json<Notification>> {
    let conn = state.db.lock().await;
    Ok(Json(messages::mark_read(&conn, auth.id(), &notification_id)?))
}

/// Sends to a single user, or broadcasts to every active user of a role.
pub async fn send(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<SendNotificationRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    auth.require_admin()?;
    let conn = state.db.lock().await;

    let recipients = match (&payload.user_id, payload.role) {
        (Some(user_id), None) => vec![users::find_user(&conn, user_id)?.id],
        (None, Some(role)) => users::active_user_ids_with_role(&conn, role)?,
        _ => {
            return Err(AppError::bad_request("give exactly one of user_id or role"));
        }
    };

    let now = now_unix();
    for user_id in &recipients {
        notify_user(
            &conn,
            state.notifier.as_ref(),
            user_id,
            &payload.title,
            &payload.body,
            NotificationKind::General,
            now,
        )?;
    }
    info!(recipients = recipients.len(), sent_by = %auth.id(), "sent notification");
    Ok((StatusCode::CREATED, Json(json!({ "sent": recipients.len() }))))
}

pub async fn register_device(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<RegisterDeviceRequest>,
) -> AppResult<StatusCode> {
    let conn = state.db.lock().await;
    messages::register_device(&conn, auth.id(), &payload.token, payload.platform, now_unix())?;
    Ok(StatusCode::NO_CONTENT)
}
