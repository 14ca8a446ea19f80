use crate::auth::AuthUser;
use crate::db::now_unix;
use crate::errors::{AppError, AppResult};
use crate::models::{
    Class, Course, CreateClassRequest, CreateCourseRequest, EnrollRequest, Enrollment, Role,
    Student,
};
use crate::state::AppState;
use crate::store::scheduling;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

pub async fn create_course(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreateCourseRequest>,
) -> AppResult<(StatusCode, Json<Course>)> {
    auth.require_admin()?;
    let conn = state.db.lock().await;
    Ok((StatusCode::CREATED, Json(scheduling::create_course(&conn, &payload)?)))
}

pub async fn list_courses(State(state): State<AppState>, _auth: AuthUser) -> AppResult<Json<Vec<Course>>> {
    let conn = state.db.lock().await;
    Ok(Json(scheduling::list_courses(&conn)?))
}

pub async fn create_class(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreateClassRequest>,
) -> AppResult<(StatusCode, Json<Class>)> {
    auth.require_admin()?;
    let conn = state.db.lock().await;
    Ok((StatusCode::CREATED, Json(scheduling::create_class(&conn, &payload)?)))
}

/// Teachers only see their own classes.
pub async fn list_classes(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<Class>>> {
    let teacher = (auth.user.role == Role::Teacher).then(|| auth.id());
    let conn = state.db.lock().await;
    Ok(Json(scheduling::list_classes(&conn, teacher)?))
}

#[derive(Debug, Deserialize)]
pub struct ScheduleFilter {
    pub teacher_id: Option<String>,
}

pub async fn schedule(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(filter): Query<ScheduleFilter>,
) -> AppResult<Json<Vec<Class>>> {
    let conn = state.db.lock().await;
    Ok(Json(scheduling::list_classes(&conn, filter.teacher_id.as_deref())?))
}

pub(crate) fn ensure_teaches(auth: &AuthUser, class: &Class) -> AppResult<()> {
    match auth.user.role {
        Role::Admin => Ok(()),
        Role::Teacher if class.teacher_id == auth.user.id => Ok(()),
        _ => Err(AppError::forbidden("not your class")),
    }
}

pub async fn roster(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(class_id): Path<String>,
) -> AppResult<Json<Vec<Student>>> {
    auth.require_staff()?;
    let conn = state.db.lock().await;
    let class = scheduling::find_class(&conn, &class_id)?;
    ensure_teaches(&auth, &class)?;
    Ok(Json(scheduling::roster(&conn, &class_id)?))
}

pub async fn enroll(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<EnrollRequest>,
) -> AppResult<(StatusCode, Json<Enrollment>)> {
    auth.require_admin()?;
    let conn = state.db.lock().await;
    let enrollment = scheduling::enroll(&conn, &payload.student_id, &payload.class_id, now_unix())?;
    Ok((StatusCode::CREATED, Json(enrollment)))
}

pub async fn unenroll(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(enrollment_id): Path<String>,
) -> AppResult<Json<Enrollment>> {
    auth.require_admin()?;
    let conn = state.db.lock().await;
    Ok(Json(scheduling::deactivate_enrollment(&conn, &enrollment_id)?))
}
