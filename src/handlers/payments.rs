use crate::auth::AuthUser;
use crate::db::now_unix;
use crate::errors::AppResult;
use crate::handlers::people::visible_student;
use crate::models::{NotificationKind, Payment, RecordPaymentRequest};
use crate::notify::notify_family_or_log;
use crate::state::AppState;
use crate::store::payments::{self, Debtor, PaymentReceipt, StudentBalance};
use crate::store::{scheduling, users};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

fn format_cents(cents: i64) -> String {
    format!("{}.{:02}", cents / 100, cents % 100)
}

pub async fn record(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<RecordPaymentRequest>,
) -> AppResult<(StatusCode, Json<PaymentReceipt>)> {
    auth.require_admin()?;
    let now = now_unix();
    let mut conn = state.db.lock().await;
    let enrollment = scheduling::find_enrollment(&conn, &payload.enrollment_id)?;
    let student = users::find_student(&conn, &enrollment.student_id)?;
    let receipt = payments::record_payment(&mut conn, &payload, auth.id(), now)?;

    notify_family_or_log(
        &conn,
        state.notifier.as_ref(),
        &student,
        "Payment received",
        &format!(
            "We received {} for {}. Outstanding balance: {}.",
            format_cents(receipt.payment.amount_cents),
            student.full_name,
            format_cents(receipt.summary.debt_cents)
        ),
        NotificationKind::Payment,
        now,
    );

    Ok((StatusCode::CREATED, Json(receipt)))
}

pub async fn list_for_enrollment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(enrollment_id): Path<String>,
) -> AppResult<Json<Vec<Payment>>> {
    let conn = state.db.lock().await;
    let enrollment = scheduling::find_enrollment(&conn, &enrollment_id)?;
    visible_student(&conn, &auth, &enrollment.student_id)?;
    Ok(Json(payments::list_for_enrollment(&conn, &enrollment_id)?))
}

pub async fn student_balance(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(student_id): Path<String>,
) -> AppResult<Json<StudentBalance>> {
    let conn = state.db.lock().await;
    visible_student(&conn, &auth, &student_id)?;
    Ok(Json(payments::student_balance(&conn, &student_id)?))
}

pub async fn debts(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<Debtor>>> {
    auth.require_admin()?;
    let conn = state.db.lock().await;
    Ok(Json(payments::debtors(&conn)?))
}
