use crate::auth::{hash_password, revoke_user_sessions, validate_password};
use crate::db::new_id;
use crate::errors::{AppError, AppResult};
use crate::models::{
    NewStudent, Parent, ParentDetail, RegisterParentRequest, Role, Student, User,
};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

const USER_COLUMNS: &str = "id, email, full_name, phone, role, active, created_at";

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        full_name: row.get(2)?,
        phone: row.get(3)?,
        role: row.get(4)?,
        active: row.get(5)?,
        created_at: row.get(6)?,
    })
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn clean_optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn validate_email(email: &str) -> AppResult<()> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(AppError::bad_request("invalid email address")),
    }
}

pub fn validate_name(name: &str) -> AppResult<()> {
    if name.trim().is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }
    Ok(())
}

pub fn validate_date(date: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::bad_request(format!("invalid date: {date}")))
}

pub fn insert_user(
    conn: &Connection,
    email: &str,
    password: &str,
    full_name: &str,
    phone: Option<&str>,
    role: Role,
    now: i64,
) -> AppResult<User> {
    validate_email(email)?;
    validate_password(password)?;
    validate_name(full_name)?;

    let email = normalize_email(email);
    let taken: Option<i64> = conn
        .query_row("SELECT 1 FROM users WHERE email = ?", [&email], |r| r.get(0))
        .optional()?;
    if taken.is_some() {
        return Err(AppError::conflict("email already registered"));
    }

    let user = User {
        id: new_id(),
        email,
        full_name: full_name.trim().to_string(),
        phone: clean_optional(phone),
        role,
        active: true,
        created_at: now,
    };
    conn.execute(
        "INSERT INTO users(id, email, full_name, phone, role, password_hash, active, created_at)
         VALUES (?, ?, ?, ?, ?, ?, 1, ?)",
        params![
            user.id,
            user.email,
            user.full_name,
            user.phone,
            user.role,
            hash_password(password)?,
            user.created_at
        ],
    )?;
    Ok(user)
}

pub fn find_user(conn: &Connection, id: &str) -> AppResult<User> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"),
        [id],
        user_from_row,
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("user not found"))
}

/// Looks a user up by email or phone, returning the stored password hash too.
pub fn find_login(conn: &Connection, login: &str) -> AppResult<Option<(User, String)>> {
    let login = login.trim();
    if login.is_empty() {
        return Ok(None);
    }
    let found = conn
        .query_row(
            &format!(
                "SELECT {USER_COLUMNS}, password_hash FROM users
                 WHERE email = ?1 OR phone = ?2
                 ORDER BY CASE WHEN email = ?1 THEN 0 ELSE 1 END
                 LIMIT 1"
            ),
            params![normalize_email(login), login],
            |r| Ok((user_from_row(r)?, r.get::<_, String>(7)?)),
        )
        .optional()?;
    Ok(found)
}

pub fn password_hash(conn: &Connection, user_id: &str) -> AppResult<String> {
    conn.query_row(
        "SELECT password_hash FROM users WHERE id = ?",
        [user_id],
        |r| r.get(0),
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("user not found"))
}

pub fn set_password(conn: &Connection, user_id: &str, new_password: &str) -> AppResult<()> {
    validate_password(new_password)?;
    conn.execute(
        "UPDATE users SET password_hash = ? WHERE id = ?",
        params![hash_password(new_password)?, user_id],
    )?;
    Ok(())
}

pub fn list_users(conn: &Connection, role: Option<Role>) -> AppResult<Vec<User>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS} FROM users
         WHERE ?1 IS NULL OR role = ?1
         ORDER BY full_name, email"
    ))?;
    let rows = stmt.query_map([role], user_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn active_user_ids_with_role(conn: &Connection, role: Role) -> AppResult<Vec<String>> {
    let mut stmt = conn.prepare("SELECT id FROM users WHERE role = ? AND active = 1")?;
    let rows = stmt.query_map([role], |r| r.get(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn set_user_active(conn: &Connection, user_id: &str, active: bool) -> AppResult<User> {
    let changed = conn.execute(
        "UPDATE users SET active = ? WHERE id = ?",
        params![active, user_id],
    )?;
    if changed == 0 {
        return Err(AppError::not_found("user not found"));
    }
    if !active {
        revoke_user_sessions(conn, user_id, None)?;
    }
    find_user(conn, user_id)
}

/// Creates the bootstrap admin unless that email is already registered.
pub fn bootstrap_admin(conn: &Connection, email: &str, password: &str, now: i64) -> AppResult<bool> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM users WHERE email = ?",
            [normalize_email(email)],
            |r| r.get(0),
        )
        .optional()?;
    if exists.is_some() {
        return Ok(false);
    }
    insert_user(conn, email, password, "Administrator", None, Role::Admin, now)?;
    info!("created bootstrap admin {email}");
    Ok(true)
}

// Parents and students

const PARENT_SELECT: &str = "SELECT p.id, p.user_id, u.full_name, u.email, u.phone, p.address
     FROM parents p JOIN users u ON u.id = p.user_id";

fn parent_from_row(row: &Row) -> rusqlite::Result<Parent> {
    Ok(Parent {
        id: row.get(0)?,
        user_id: row.get(1)?,
        full_name: row.get(2)?,
        email: row.get(3)?,
        phone: row.get(4)?,
        address: row.get(5)?,
    })
}

const STUDENT_COLUMNS: &str = "id, parent_id, user_id, full_name, birth_date, created_at";

fn student_from_row(row: &Row) -> rusqlite::Result<Student> {
    Ok(Student {
        id: row.get(0)?,
        parent_id: row.get(1)?,
        user_id: row.get(2)?,
        full_name: row.get(3)?,
        birth_date: row.get(4)?,
        created_at: row.get(5)?,
    })
}

pub fn register_parent(
    conn: &mut Connection,
    req: &RegisterParentRequest,
    now: i64,
) -> AppResult<ParentDetail> {
    let tx = conn.transaction()?;
    let user = insert_user(
        &tx,
        &req.email,
        &req.password,
        &req.full_name,
        req.phone.as_deref(),
        Role::Parent,
        now,
    )?;
    let parent_id = new_id();
    tx.execute(
        "INSERT INTO parents(id, user_id, address) VALUES (?, ?, ?)",
        params![parent_id, user.id, clean_optional(req.address.as_deref())],
    )?;
    for student in &req.students {
        insert_student(&tx, &parent_id, student, now)?;
    }
    let detail = find_parent(&tx, &parent_id)?;
    tx.commit()?;

    info!(
        parent_id = %detail.parent.id,
        students = detail.students.len(),
        "registered parent"
    );
    Ok(detail)
}

pub fn find_parent(conn: &Connection, parent_id: &str) -> AppResult<ParentDetail> {
    let parent = conn
        .query_row(&format!("{PARENT_SELECT} WHERE p.id = ?"), [parent_id], parent_from_row)
        .optional()?
        .ok_or_else(|| AppError::not_found("parent not found"))?;
    let students = students_of_parent(conn, parent_id)?;
    Ok(ParentDetail { parent, students })
}

pub fn parent_for_user(conn: &Connection, user_id: &str) -> AppResult<Option<Parent>> {
    Ok(conn
        .query_row(&format!("{PARENT_SELECT} WHERE p.user_id = ?"), [user_id], parent_from_row)
        .optional()?)
}

pub fn list_parents(conn: &Connection) -> AppResult<Vec<Parent>> {
    let mut stmt = conn.prepare(&format!("{PARENT_SELECT} ORDER BY u.full_name"))?;
    let rows = stmt.query_map([], parent_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn insert_student(conn: &Connection, parent_id: &str, new: &NewStudent, now: i64) -> AppResult<Student> {
    validate_name(&new.full_name)?;
    let birth_date = match clean_optional(new.birth_date.as_deref()) {
        Some(raw) => Some(validate_date(&raw)?.to_string()),
        None => None,
    };

    let user_id = match (clean_optional(new.email.as_deref()), new.password.as_deref()) {
        (Some(email), Some(password)) => Some(
            insert_user(conn, &email, password, &new.full_name, None, Role::Student, now)?.id,
        ),
        (None, None) => None,
        _ => {
            return Err(AppError::bad_request(
                "student login needs both email and password",
            ))
        }
    };

    let student = Student {
        id: new_id(),
        parent_id: parent_id.to_string(),
        user_id,
        full_name: new.full_name.trim().to_string(),
        birth_date,
        created_at: now,
    };
    conn.execute(
        "INSERT INTO students(id, parent_id, user_id, full_name, birth_date, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
        params![
            student.id,
            student.parent_id,
            student.user_id,
            student.full_name,
            student.birth_date,
            student.created_at
        ],
    )?;
    Ok(student)
}

pub fn add_student(
    conn: &mut Connection,
    parent_id: &str,
    new: &NewStudent,
    now: i64,
) -> AppResult<Student> {
    let tx = conn.transaction()?;
    let exists: Option<i64> = tx
        .query_row("SELECT 1 FROM parents WHERE id = ?", [parent_id], |r| r.get(0))
        .optional()?;
    if exists.is_none() {
        return Err(AppError::not_found("parent not found"));
    }
    let student = insert_student(&tx, parent_id, new, now)?;
    tx.commit()?;
    info!(student_id = %student.id, parent_id, "added student");
    Ok(student)
}

pub fn find_student(conn: &Connection, student_id: &str) -> AppResult<Student> {
    conn.query_row(
        &format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?"),
        [student_id],
        student_from_row,
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("student not found"))
}

pub fn list_students(conn: &Connection) -> AppResult<Vec<Student>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {STUDENT_COLUMNS} FROM students ORDER BY full_name"
    ))?;
    let rows = stmt.query_map([], student_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn students_of_parent(conn: &Connection, parent_id: &str) -> AppResult<Vec<Student>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {STUDENT_COLUMNS} FROM students WHERE parent_id = ? ORDER BY full_name"
    ))?;
    let rows = stmt.query_map([parent_id], student_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn student_for_user(conn: &Connection, user_id: &str) -> AppResult<Option<Student>> {
    Ok(conn
        .query_row(
            &format!("SELECT {STUDENT_COLUMNS} FROM students WHERE user_id = ?"),
            [user_id],
            student_from_row,
        )
        .optional()?)
}

/// The students a caller may act for: a parent's children, or a student's own
/// record. Staff get an empty list; they are not tied to particular students.
pub fn students_for_account(conn: &Connection, user: &User) -> AppResult<Vec<Student>> {
    match user.role {
        Role::Parent => match parent_for_user(conn, &user.id)? {
            Some(parent) => students_of_parent(conn, &parent.id),
            None => Ok(Vec::new()),
        },
        Role::Student => Ok(student_for_user(conn, &user.id)?.into_iter().collect()),
        Role::Admin | Role::Teacher => Ok(Vec::new()),
    }
}

pub fn can_view_student(conn: &Connection, user: &User, student: &Student) -> AppResult<bool> {
    if user.role.is_staff() {
        return Ok(true);
    }
    Ok(students_for_account(conn, user)?
        .iter()
        .any(|s| s.id == student.id))
}
