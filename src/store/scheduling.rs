use crate::db::new_id;
use crate::errors::{AppError, AppResult};
use crate::models::{
    BillingMode, BillingTerms, Class, Course, CreateClassRequest, CreateCourseRequest, Enrollment,
    Role, Student,
};
use crate::store::users::{find_student, find_user, validate_name};
use chrono::NaiveTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

pub fn validate_terms(terms: &BillingTerms) -> AppResult<()> {
    match terms.billing_mode {
        BillingMode::PerSession if terms.session_price_cents < 0 => {
            Err(AppError::bad_request("session price must not be negative"))
        }
        BillingMode::Monthly if terms.sessions_per_cycle < 1 => {
            Err(AppError::bad_request("sessions_per_cycle must be at least 1"))
        }
        BillingMode::Monthly if terms.monthly_fee_cents < 0 => {
            Err(AppError::bad_request("monthly fee must not be negative"))
        }
        _ => Ok(()),
    }
}

fn course_from_row(row: &Row) -> rusqlite::Result<Course> {
    Ok(Course {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        terms: BillingTerms {
            billing_mode: row.get(3)?,
            session_price_cents: row.get(4)?,
            monthly_fee_cents: row.get(5)?,
            sessions_per_cycle: row.get(6)?,
        },
    })
}

const COURSE_COLUMNS: &str =
    "id, name, description, billing_mode, session_price_cents, monthly_fee_cents, sessions_per_cycle";

pub fn create_course(conn: &Connection, req: &CreateCourseRequest) -> AppResult<Course> {
    validate_name(&req.name)?;
    validate_terms(&req.terms)?;

    let course = Course {
        id: new_id(),
        name: req.name.trim().to_string(),
        description: req.description.clone().filter(|d| !d.trim().is_empty()),
        terms: req.terms,
    };
    conn.execute(
        &format!("INSERT INTO courses({COURSE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?)"),
        params![
            course.id,
            course.name,
            course.description,
            course.terms.billing_mode,
            course.terms.session_price_cents,
            course.terms.monthly_fee_cents,
            course.terms.sessions_per_cycle
        ],
    )?;
    info!(course_id = %course.id, name = %course.name, "created course");
    Ok(course)
}

pub fn find_course(conn: &Connection, course_id: &str) -> AppResult<Course> {
    conn.query_row(
        &format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = ?"),
        [course_id],
        course_from_row,
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("course not found"))
}

pub fn list_courses(conn: &Connection) -> AppResult<Vec<Course>> {
    let mut stmt = conn.prepare(&format!("SELECT {COURSE_COLUMNS} FROM courses ORDER BY name"))?;
    let rows = stmt.query_map([], course_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

const CLASS_SELECT: &str = "SELECT c.id, c.course_id, co.name, c.teacher_id, u.full_name, c.name,
            c.weekday, c.start_time, c.duration_minutes, c.room
     FROM classes c
     JOIN courses co ON co.id = c.course_id
     JOIN users u ON u.id = c.teacher_id";

fn class_from_row(row: &Row) -> rusqlite::Result<Class> {
    Ok(Class {
        id: row.get(0)?,
        course_id: row.get(1)?,
        course_name: row.get(2)?,
        teacher_id: row.get(3)?,
        teacher_name: row.get(4)?,
        name: row.get(5)?,
        weekday: row.get(6)?,
        start_time: row.get(7)?,
        duration_minutes: row.get(8)?,
        room: row.get(9)?,
    })
}

fn normalize_start_time(raw: &str) -> AppResult<String> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map(|t| t.format("%H:%M").to_string())
        .map_err(|_| AppError::bad_request("start_time must be HH:MM"))
}

pub fn create_class(conn: &Connection, req: &CreateClassRequest) -> AppResult<Class> {
    validate_name(&req.name)?;
    if req.weekday > 6 {
        return Err(AppError::bad_request("weekday must be 0 (Monday) to 6 (Sunday)"));
    }
    if !(1..=600).contains(&req.duration_minutes) {
        return Err(AppError::bad_request("duration_minutes must be between 1 and 600"));
    }
    let start_time = normalize_start_time(&req.start_time)?;

    find_course(conn, &req.course_id)?;
    let teacher = find_user(conn, &req.teacher_id)?;
    if teacher.role != Role::Teacher {
        return Err(AppError::bad_request("teacher_id must reference a teacher"));
    }

    let id = new_id();
    conn.execute(
        "INSERT INTO classes(id, course_id, teacher_id, name, weekday, start_time, duration_minutes, room)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            id,
            req.course_id,
            req.teacher_id,
            req.name.trim(),
            req.weekday,
            start_time,
            req.duration_minutes,
            req.room.as_deref().map(str::trim).filter(|r| !r.is_empty())
        ],
    )?;
    info!(class_id = %id, teacher_id = %req.teacher_id, "created class");
    find_class(conn, &id)
}

pub fn find_class(conn: &Connection, class_id: &str) -> AppResult<Class> {
    conn.query_row(&format!("{CLASS_SELECT} WHERE c.id = ?"), [class_id], class_from_row)
        .optional()?
        .ok_or_else(|| AppError::not_found("class not found"))
}

/// Weekly timetable, Monday first, then by start time.
pub fn list_classes(conn: &Connection, teacher_id: Option<&str>) -> AppResult<Vec<Class>> {
    let mut stmt = conn.prepare(&format!(
        "{CLASS_SELECT}
         WHERE ?1 IS NULL OR c.teacher_id = ?1
         ORDER BY c.weekday, c.start_time, c.name"
    ))?;
    let rows = stmt.query_map([teacher_id], class_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn roster(conn: &Connection, class_id: &str) -> AppResult<Vec<Student>> {
    find_class(conn, class_id)?;
    let mut stmt = conn.prepare(
        "SELECT s.id, s.parent_id, s.user_id, s.full_name, s.birth_date, s.created_at
         FROM enrollments e JOIN students s ON s.id = e.student_id
         WHERE e.class_id = ? AND e.active = 1
         ORDER BY s.full_name",
    )?;
    let rows = stmt.query_map([class_id], |r| {
        Ok(Student {
            id: r.get(0)?,
            parent_id: r.get(1)?,
            user_id: r.get(2)?,
            full_name: r.get(3)?,
            birth_date: r.get(4)?,
            created_at: r.get(5)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

const ENROLLMENT_COLUMNS: &str = "id, student_id, class_id, billing_mode, session_price_cents,
     monthly_fee_cents, sessions_per_cycle, credit_cents, active, enrolled_at";

fn enrollment_from_row(row: &Row) -> rusqlite::Result<Enrollment> {
    Ok(Enrollment {
        id: row.get(0)?,
        student_id: row.get(1)?,
        class_id: row.get(2)?,
        terms: BillingTerms {
            billing_mode: row.get(3)?,
            session_price_cents: row.get(4)?,
            monthly_fee_cents: row.get(5)?,
            sessions_per_cycle: row.get(6)?,
        },
        credit_cents: row.get(7)?,
        active: row.get(8)?,
        enrolled_at: row.get(9)?,
    })
}

/// Enrolls a student, snapshotting the course's current billing terms.
/// An inactive enrollment for the same pair is reactivated with fresh terms.
pub fn enroll(conn: &Connection, student_id: &str, class_id: &str, now: i64) -> AppResult<Enrollment> {
    find_student(conn, student_id)?;
    let class = find_class(conn, class_id)?;
    let terms = find_course(conn, &class.course_id)?.terms;

    let existing = conn
        .query_row(
            &format!("SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE student_id = ? AND class_id = ?"),
            params![student_id, class_id],
            enrollment_from_row,
        )
        .optional()?;

    let id = match existing {
        Some(enrollment) if enrollment.active => {
            return Err(AppError::conflict("student already enrolled in this class"));
        }
        Some(enrollment) => {
            conn.execute(
                "UPDATE enrollments
                 SET active = 1, billing_mode = ?, session_price_cents = ?,
                     monthly_fee_cents = ?, sessions_per_cycle = ?
                 WHERE id = ?",
                params![
                    terms.billing_mode,
                    terms.session_price_cents,
                    terms.monthly_fee_cents,
                    terms.sessions_per_cycle,
                    enrollment.id
                ],
            )?;
            enrollment.id
        }
        None => {
            let id = new_id();
            conn.execute(
                &format!("INSERT INTO enrollments({ENROLLMENT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, 0, 1, ?)"),
                params![
                    id,
                    student_id,
                    class_id,
                    terms.billing_mode,
                    terms.session_price_cents,
                    terms.monthly_fee_cents,
                    terms.sessions_per_cycle,
                    now
                ],
            )?;
            id
        }
    };

    info!(enrollment_id = %id, student_id, class_id, "enrolled student");
    find_enrollment(conn, &id)
}

pub fn find_enrollment(conn: &Connection, enrollment_id: &str) -> AppResult<Enrollment> {
    conn.query_row(
        &format!("SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE id = ?"),
        [enrollment_id],
        enrollment_from_row,
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("enrollment not found"))
}

pub fn active_enrollment_for(
    conn: &Connection,
    student_id: &str,
    class_id: &str,
) -> AppResult<Option<Enrollment>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {ENROLLMENT_COLUMNS} FROM enrollments
                 WHERE student_id = ? AND class_id = ? AND active = 1"
            ),
            params![student_id, class_id],
            enrollment_from_row,
        )
        .optional()?)
}

pub fn enrollments_of_student(conn: &Connection, student_id: &str) -> AppResult<Vec<Enrollment>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE student_id = ? ORDER BY enrolled_at"
    ))?;
    let rows = stmt.query_map([student_id], enrollment_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn deactivate_enrollment(conn: &Connection, enrollment_id: &str) -> AppResult<Enrollment> {
    let changed = conn.execute(
        "UPDATE enrollments SET active = 0 WHERE id = ?",
        [enrollment_id],
    )?;
    if changed == 0 {
        return Err(AppError::not_found("enrollment not found"));
    }
    info!(enrollment_id, "deactivated enrollment");
    find_enrollment(conn, enrollment_id)
}
