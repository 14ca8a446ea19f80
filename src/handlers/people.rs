use crate::auth::AuthUser;
use crate::db::now_unix;
use crate::errors::{AppError, AppResult};
use crate::models::{
    CreateUserRequest, NewStudent, Parent, ParentDetail, QrResponse, RegisterParentRequest, Role,
    SetActiveRequest, Student, User,
};
use crate::qr;
use crate::state::AppState;
use crate::store::users;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;

pub async fn register_parent(
    State(state): State<AppState>,
    Json(payload): Json<RegisterParentRequest>,
) -> AppResult<(StatusCode, Json<ParentDetail>)> {
    let mut conn = state.db.lock().await;
    let detail = users::register_parent(&mut conn, &payload, now_unix())?;
    Ok((StatusCode::CREATED, Json(detail)))
}

pub async fn create_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    auth.require_admin()?;
    if !payload.role.is_staff() {
        return Err(AppError::bad_request(
            "parents register themselves and students are added to a parent",
        ));
    }
    let conn = state.db.lock().await;
    let user = users::insert_user(
        &conn,
        &payload.email,
        &payload.password,
        &payload.full_name,
        payload.phone.as_deref(),
        payload.role,
        now_unix(),
    )?;
    info!(user_id = %user.id, role = user.role.as_str(), created_by = %auth.id(), "created staff user");
    Ok((StatusCode::CREATED, Json(user)))
}

#[derive(Debug, Deserialize)]
pub struct UserFilter {
    pub role: Option<Role>,
}

pub async fn list_users(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(filter): Query<UserFilter>,
) -> AppResult<Json<Vec<User>>> {
    auth.require_admin()?;
    let conn = state.db.lock().await;
    Ok(Json(users::list_users(&conn, filter.role)?))
}

pub async fn set_user_active(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<String>,
    Json(payload): Json<SetActiveRequest>,
) -> AppResult<Json<User>> {
    auth.require_admin()?;
    if user_id == auth.id() && !payload.active {
        return Err(AppError::bad_request("you cannot deactivate your own account"));
    }
    let conn = state.db.lock().await;
    let user = users::set_user_active(&conn, &user_id, payload.active)?;
    info!(user_id = %user.id, active = user.active, "changed account status");
    Ok(Json(user))
}

pub async fn list_parents(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<Parent>>> {
    auth.require_admin()?;
    let conn = state.db.lock().await;
    Ok(Json(users::list_parents(&conn)?))
}

fn ensure_parent_access(auth: &AuthUser, parent: &Parent) -> AppResult<()> {
    if auth.user.role == Role::Admin || parent.user_id == auth.user.id {
        Ok(())
    } else {
        Err(AppError::forbidden("not your family record"))
    }
}

pub async fn get_parent(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(parent_id): Path<String>,
) -> AppResult<Json<ParentDetail>> {
    let conn = state.db.lock().await;
    let detail = users::find_parent(&conn, &parent_id)?;
    ensure_parent_access(&auth, &detail.parent)?;
    Ok(Json(detail))
}

pub async fn add_student(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(parent_id): Path<String>,
    Json(payload): Json<NewStudent>,
) -> AppResult<(StatusCode, Json<Student>)> {
    let mut conn = state.db.lock().await;
    let parent = users::find_parent(&conn, &parent_id)?.parent;
    ensure_parent_access(&auth, &parent)?;
    let student = users::add_student(&mut conn, &parent_id, &payload, now_unix())?;
    Ok((StatusCode::CREATED, Json(student)))
}

pub async fn list_students(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<Student>>> {
    auth.require_staff()?;
    let conn = state.db.lock().await;
    Ok(Json(users::list_students(&conn)?))
}

pub(crate) fn visible_student(
    conn: &rusqlite::Connection,
    auth: &AuthUser,
    student_id: &str,
) -> AppResult<Student> {
    let student = users::find_student(conn, student_id)?;
    if !users::can_view_student(conn, &auth.user, &student)? {
        return Err(AppError::forbidden("not your student"));
    }
    Ok(student)
}

pub async fn get_student(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(student_id): Path<String>,
) -> AppResult<Json<Student>> {
    let conn = state.db.lock().await;
    Ok(Json(visible_student(&conn, &auth, &student_id)?))
}

pub async fn student_qr(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(student_id): Path<String>,
) -> AppResult<Json<QrResponse>> {
    let conn = state.db.lock().await;
    let student = visible_student(&conn, &auth, &student_id)?;
    Ok(Json(QrResponse {
        payload: qr::payload_for(&state.config.qr_secret, &student.id)?,
        student_id: student.id,
    }))
}
