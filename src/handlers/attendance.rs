use super::session_date_or_today;
use crate::auth::AuthUser;
use crate::db::now_unix;
use crate::errors::{AppError, AppResult};
use crate::handlers::classes::ensure_teaches;
use crate::handlers::people::visible_student;
use crate::ledger::LedgerSummary;
use crate::models::{
    Attendance, AttendanceSource, AttendanceStatus, NotificationKind, RecordAttendanceRequest,
    ScanRequest, UpdateAttendanceRequest,
};
use crate::notify::notify_family_or_log;
use crate::qr;
use crate::state::AppState;
use crate::store::{attendance, scheduling, users};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct AttendanceResponse {
    pub attendance: Attendance,
    pub ledger: LedgerSummary,
}

fn mark(
    conn: &mut Connection,
    state: &AppState,
    auth: &AuthUser,
    enrollment_id: &str,
    session_date: NaiveDate,
    status: AttendanceStatus,
    source: AttendanceSource,
) -> AppResult<AttendanceResponse> {
    let enrollment = scheduling::find_enrollment(conn, enrollment_id)?;
    let class = scheduling::find_class(conn, &enrollment.class_id)?;
    ensure_teaches(auth, &class)?;
    let student = users::find_student(conn, &enrollment.student_id)?;

    let now = now_unix();
    let (attendance, ledger) = attendance::record(
        conn,
        &attendance::NewAttendance {
            enrollment_id,
            session_date,
            status,
            source,
            recorded_by: auth.id(),
        },
        now,
    )?;

    if status == AttendanceStatus::Present {
        notify_family_or_log(
            conn,
            state.notifier.as_ref(),
            &student,
            "Attendance recorded",
            &format!(
                "{} attended {} on {}",
                student.full_name, class.name, attendance.session_date
            ),
            NotificationKind::Attendance,
            now,
        );
    }

    Ok(AttendanceResponse { attendance, ledger })
}

pub async fn record(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<RecordAttendanceRequest>,
) -> AppResult<(StatusCode, Json<AttendanceResponse>)> {
    auth.require_staff()?;
    let session_date = session_date_or_today(payload.session_date.as_deref())?;
    let mut conn = state.db.lock().await;
    let response = mark(
        &mut conn,
        &state,
        &auth,
        &payload.enrollment_id,
        session_date,
        payload.status,
        AttendanceSource::Manual,
    )?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn scan(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<ScanRequest>,
) -> AppResult<(StatusCode, Json<AttendanceResponse>)> {
    auth.require_staff()?;
    let student_id = qr::verify_payload(&state.config.qr_secret, &payload.payload)?;
    let session_date = session_date_or_today(payload.session_date.as_deref())?;

    let mut conn = state.db.lock().await;
    let enrollment = scheduling::active_enrollment_for(&conn, &student_id, &payload.class_id)?
        .ok_or_else(|| AppError::not_found("student is not enrolled in this class"))?;
    let response = mark(
        &mut conn,
        &state,
        &auth,
        &enrollment.id,
        session_date,
        AttendanceStatus::Present,
        AttendanceSource::Qr,
    )?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(attendance_id): Path<String>,
    Json(payload): Json<UpdateAttendanceRequest>,
) -> AppResult<Json<AttendanceResponse>> {
    auth.require_staff()?;
    let mut conn = state.db.lock().await;
    let current = attendance::find_attendance(&conn, &attendance_id)?;
    let enrollment = scheduling::find_enrollment(&conn, &current.enrollment_id)?;
    ensure_teaches(&auth, &scheduling::find_class(&conn, &enrollment.class_id)?)?;

    let (attendance, ledger) = attendance::update_status(&mut conn, &attendance_id, payload.status)?;
    Ok(Json(AttendanceResponse { attendance, ledger }))
}

pub async fn list_for_enrollment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(enrollment_id): Path<String>,
) -> AppResult<Json<Vec<Attendance>>> {
    let conn = state.db.lock().await;
    let enrollment = scheduling::find_enrollment(&conn, &enrollment_id)?;
    visible_student(&conn, &auth, &enrollment.student_id)?;
    Ok(Json(attendance::list_for_enrollment(&conn, &enrollment_id)?))
}
