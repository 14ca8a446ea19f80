use crate::auth::AuthUser;
use crate::db::now_unix;
use crate::errors::AppResult;
use crate::models::{ContactMessage, ContactRequest, MessageStatus};
use crate::state::AppState;
use crate::store::messages;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

pub async fn submit(
    State(state): State<AppState>,
    Json(payload): Json<ContactRequest>,
) -> AppResult<(StatusCode, Json<ContactMessage>)> {
    let conn = state.db.lock().await;
    let message = messages::submit_contact(&conn, &payload, now_unix())?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[derive(Debug, Deserialize)]
pub struct ContactFilter {
    pub status: Option<MessageStatus>,
}

pub async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(filter): Query<ContactFilter>,
) -> AppResult<Json<Vec<ContactMessage>>> {
    auth.require_admin()?;
    let conn = state.db.lock().await;
    Ok(Json(messages::list_contact(&conn, filter.status)?))
}

pub async fn handle(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(message_id): Path<String>,
) -> AppResult<Json<ContactMessage>> {
    auth.require_admin()?;
    let conn = state.db.lock().await;
    Ok(Json(messages::handle_contact(&conn, &message_id, now_unix())?))
}
