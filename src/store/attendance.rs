use crate::db::new_id;
use crate::errors::{AppError, AppResult};
use crate::ledger::{self, LedgerSummary};
use crate::models::{Attendance, AttendanceSource, AttendanceStatus, Enrollment};
use crate::store::scheduling::find_enrollment;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

const ATTENDANCE_COLUMNS: &str =
    "id, enrollment_id, session_date, status, charge_cents, paid, source, recorded_by, recorded_at, cycle_slot";

fn attendance_from_row(row: &Row) -> rusqlite::Result<Attendance> {
    Ok(Attendance {
        id: row.get(0)?,
        enrollment_id: row.get(1)?,
        session_date: row.get(2)?,
        status: row.get(3)?,
        charge_cents: row.get(4)?,
        paid: row.get(5)?,
        source: row.get(6)?,
        recorded_by: row.get(7)?,
        recorded_at: row.get(8)?,
        cycle_slot: row.get(9)?,
    })
}

pub fn list_for_enrollment(conn: &Connection, enrollment_id: &str) -> AppResult<Vec<Attendance>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE enrollment_id = ? ORDER BY session_date"
    ))?;
    let rows = stmt.query_map([enrollment_id], attendance_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn recent_for_enrollment(
    conn: &Connection,
    enrollment_id: &str,
    limit: usize,
) -> AppResult<Vec<Attendance>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ATTENDANCE_COLUMNS} FROM attendance
         WHERE enrollment_id = ? ORDER BY session_date DESC LIMIT ?"
    ))?;
    let rows = stmt.query_map(params![enrollment_id, limit as i64], attendance_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn find_attendance(conn: &Connection, attendance_id: &str) -> AppResult<Attendance> {
    conn.query_row(
        &format!("SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE id = ?"),
        [attendance_id],
        attendance_from_row,
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("attendance record not found"))
}

pub fn summary_for(conn: &Connection, enrollment: &Enrollment) -> AppResult<LedgerSummary> {
    let rows = list_for_enrollment(conn, &enrollment.id)?;
    Ok(ledger::summarize(&rows, &enrollment.terms, enrollment.credit_cents))
}

/// Runs the ledger over an enrollment with `extra_credit` added and writes the
/// resulting charges, slots, paid flags and credit back.
pub fn reconcile_enrollment(
    conn: &Connection,
    enrollment_id: &str,
    extra_credit: i64,
) -> AppResult<LedgerSummary> {
    let enrollment = find_enrollment(conn, enrollment_id)?;
    let available = enrollment
        .credit_cents
        .checked_add(extra_credit)
        .ok_or_else(|| AppError::bad_request("amount exceeds what an enrollment can hold"))?;
    let mut rows = list_for_enrollment(conn, enrollment_id)?;
    let credit = ledger::reconcile(&mut rows, &enrollment.terms, available);

    let mut update = conn
        .prepare("UPDATE attendance SET charge_cents = ?, paid = ?, cycle_slot = ? WHERE id = ?")?;
    for row in &rows {
        update.execute(params![row.charge_cents, row.paid, row.cycle_slot, row.id])?;
    }
    conn.execute(
        "UPDATE enrollments SET credit_cents = ? WHERE id = ?",
        params![credit, enrollment_id],
    )?;

    Ok(ledger::summarize(&rows, &enrollment.terms, credit))
}

pub struct NewAttendance<'a> {
    pub enrollment_id: &'a str,
    pub session_date: NaiveDate,
    pub status: AttendanceStatus,
    pub source: AttendanceSource,
    pub recorded_by: &'a str,
}

pub fn record(
    conn: &mut Connection,
    new: &NewAttendance<'_>,
    now: i64,
) -> AppResult<(Attendance, LedgerSummary)> {
    let tx = conn.transaction()?;
    let enrollment = find_enrollment(&tx, new.enrollment_id)?;
    if !enrollment.active {
        return Err(AppError::conflict("enrollment is not active"));
    }

    let session_date = new.session_date.format("%Y-%m-%d").to_string();
    let duplicate: Option<i64> = tx
        .query_row(
            "SELECT 1 FROM attendance WHERE enrollment_id = ? AND session_date = ?",
            params![new.enrollment_id, session_date],
            |r| r.get(0),
        )
        .optional()?;
    if duplicate.is_some() {
        return Err(AppError::conflict("attendance already recorded for this date"));
    }

    let id = new_id();
    tx.execute(
        &format!("INSERT INTO attendance({ATTENDANCE_COLUMNS}) VALUES (?, ?, ?, ?, 0, 0, ?, ?, ?, NULL)"),
        params![
            id,
            new.enrollment_id,
            session_date,
            new.status,
            new.source,
            new.recorded_by,
            now
        ],
    )?;
    let summary = reconcile_enrollment(&tx, new.enrollment_id, 0)?;
    let attendance = find_attendance(&tx, &id)?;
    tx.commit()?;

    info!(
        enrollment_id = new.enrollment_id,
        date = %attendance.session_date,
        status = attendance.status.as_str(),
        source = attendance.source.as_str(),
        "recorded attendance"
    );
    Ok((attendance, summary))
}

/// Corrects the status of an unpaid session. Settled sessions are immutable.
pub fn update_status(
    conn: &mut Connection,
    attendance_id: &str,
    status: AttendanceStatus,
) -> AppResult<(Attendance, LedgerSummary)> {
    let tx = conn.transaction()?;
    let current = find_attendance(&tx, attendance_id)?;
    if current.paid {
        return Err(AppError::conflict("settled sessions cannot be changed"));
    }
    tx.execute(
        "UPDATE attendance SET status = ?, paid = 0 WHERE id = ?",
        params![status, attendance_id],
    )?;
    let summary = reconcile_enrollment(&tx, &current.enrollment_id, 0)?;
    let attendance = find_attendance(&tx, attendance_id)?;
    tx.commit()?;

    info!(
        attendance_id,
        from = current.status.as_str(),
        to = status.as_str(),
        "corrected attendance"
    );
    Ok((attendance, summary))
}
