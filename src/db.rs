use crate::errors::AppResult;
use rusqlite::Connection;
use std::path::Path;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users(
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    full_name TEXT NOT NULL,
    phone TEXT,
    role TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_users_phone ON users(phone);
CREATE INDEX IF NOT EXISTS idx_users_role ON users(role);

CREATE TABLE IF NOT EXISTS sessions(
    token_hash TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    client TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL,
    FOREIGN KEY(user_id) REFERENCES users(id)
);
CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);

CREATE TABLE IF NOT EXISTS parents(
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL UNIQUE,
    address TEXT,
    FOREIGN KEY(user_id) REFERENCES users(id)
);

CREATE TABLE IF NOT EXISTS students(
    id TEXT PRIMARY KEY,
    parent_id TEXT NOT NULL,
    user_id TEXT UNIQUE,
    full_name TEXT NOT NULL,
    birth_date TEXT,
    created_at INTEGER NOT NULL,
    FOREIGN KEY(parent_id) REFERENCES parents(id),
    FOREIGN KEY(user_id) REFERENCES users(id)
);
CREATE INDEX IF NOT EXISTS idx_students_parent ON students(parent_id);

CREATE TABLE IF NOT EXISTS courses(
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    billing_mode TEXT NOT NULL,
    session_price_cents INTEGER NOT NULL DEFAULT 0,
    monthly_fee_cents INTEGER NOT NULL DEFAULT 0,
    sessions_per_cycle INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS classes(
    id TEXT PRIMARY KEY,
    course_id TEXT NOT NULL,
    teacher_id TEXT NOT NULL,
    name TEXT NOT NULL,
    weekday INTEGER NOT NULL,
    start_time TEXT NOT NULL,
    duration_minutes INTEGER NOT NULL,
    room TEXT,
    FOREIGN KEY(course_id) REFERENCES courses(id),
    FOREIGN KEY(teacher_id) REFERENCES users(id)
);
CREATE INDEX IF NOT EXISTS idx_classes_teacher ON classes(teacher_id);

CREATE TABLE IF NOT EXISTS enrollments(
    id TEXT PRIMARY KEY,
    student_id TEXT NOT NULL,
    class_id TEXT NOT NULL,
    billing_mode TEXT NOT NULL,
    session_price_cents INTEGER NOT NULL,
    monthly_fee_cents INTEGER NOT NULL,
    sessions_per_cycle INTEGER NOT NULL,
    credit_cents INTEGER NOT NULL DEFAULT 0,
    active INTEGER NOT NULL DEFAULT 1,
    enrolled_at INTEGER NOT NULL,
    UNIQUE(student_id, class_id),
    FOREIGN KEY(student_id) REFERENCES students(id),
    FOREIGN KEY(class_id) REFERENCES classes(id)
);
CREATE INDEX IF NOT EXISTS idx_enrollments_class ON enrollments(class_id);

CREATE TABLE IF NOT EXISTS attendance(
    id TEXT PRIMARY KEY,
    enrollment_id TEXT NOT NULL,
    session_date TEXT NOT NULL,
    status TEXT NOT NULL,
    charge_cents INTEGER NOT NULL DEFAULT 0,
    paid INTEGER NOT NULL DEFAULT 0,
    source TEXT NOT NULL,
    recorded_by TEXT NOT NULL,
    recorded_at INTEGER NOT NULL,
    cycle_slot INTEGER,
    UNIQUE(enrollment_id, session_date),
    FOREIGN KEY(enrollment_id) REFERENCES enrollments(id)
);

CREATE TABLE IF NOT EXISTS payments(
    id TEXT PRIMARY KEY,
    enrollment_id TEXT NOT NULL,
    amount_cents INTEGER NOT NULL,
    method TEXT NOT NULL,
    note TEXT,
    recorded_by TEXT NOT NULL,
    paid_at INTEGER NOT NULL,
    FOREIGN KEY(enrollment_id) REFERENCES enrollments(id)
);
CREATE INDEX IF NOT EXISTS idx_payments_enrollment ON payments(enrollment_id);

CREATE TABLE IF NOT EXISTS contact_messages(
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT NOT NULL,
    phone TEXT,
    subject TEXT NOT NULL,
    body TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    handled_at INTEGER
);

CREATE TABLE IF NOT EXISTS notifications(
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    title TEXT NOT NULL,
    body TEXT NOT NULL,
    kind TEXT NOT NULL,
    read INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    FOREIGN KEY(user_id) REFERENCES users(id)
);
CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id);

CREATE TABLE IF NOT EXISTS device_tokens(
    token TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    platform TEXT NOT NULL,
    registered_at INTEGER NOT NULL,
    FOREIGN KEY(user_id) REFERENCES users(id)
);
";

pub fn open_db(path: &Path) -> AppResult<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> AppResult<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> AppResult<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}
