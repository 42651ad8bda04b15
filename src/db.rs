use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

use crate::error::{CoreError, CoreResult};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("attendance.sqlite3");
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS contacts(
            id TEXT PRIMARY KEY,
            full_name TEXT NOT NULL,
            photo_url TEXT,
            email TEXT,
            phone TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            full_name TEXT NOT NULL,
            photo_url TEXT,
            linked_contact_id TEXT,
            email TEXT,
            phone TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_teachers_contact ON teachers(linked_contact_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            full_name TEXT NOT NULL,
            photo_url TEXT,
            date_of_birth TEXT NOT NULL,
            guardian_name TEXT NOT NULL,
            guardian_phone TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_teachers(
            class_id TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            PRIMARY KEY(class_id, teacher_id),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(teacher_id) REFERENCES teachers(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_class_teachers_teacher ON class_teachers(teacher_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_students(
            class_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            PRIMARY KEY(class_id, student_id),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_class_students_student ON class_students(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS checkin_sessions(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            name TEXT NOT NULL,
            session_date TEXT NOT NULL,
            is_active INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            ended_at TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    // At most one active session per class, enforced by the store as well.
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_checkin_sessions_one_active
         ON checkin_sessions(class_id) WHERE is_active = 1",
        [],
    )?;

    // No foreign keys here: records outlive the student/class rows they name.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_records(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            date TEXT NOT NULL,
            status TEXT NOT NULL,
            taken_by TEXT,
            updated_at TEXT NOT NULL,
            UNIQUE(student_id, class_id, date)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_records_class_date ON attendance_records(class_id, date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_records_date ON attendance_records(date)",
        [],
    )?;

    Ok(())
}

pub fn class_exists(conn: &Connection, class_id: &str) -> CoreResult<bool> {
    row_exists(conn, "SELECT 1 FROM classes WHERE id = ?", class_id)
}

pub fn student_exists(conn: &Connection, student_id: &str) -> CoreResult<bool> {
    row_exists(conn, "SELECT 1 FROM students WHERE id = ?", student_id)
}

pub fn teacher_exists(conn: &Connection, teacher_id: &str) -> CoreResult<bool> {
    row_exists(conn, "SELECT 1 FROM teachers WHERE id = ?", teacher_id)
}

pub fn require_class(conn: &Connection, class_id: &str) -> CoreResult<()> {
    if class_exists(conn, class_id)? {
        Ok(())
    } else {
        Err(CoreError::not_found("class", class_id))
    }
}

fn row_exists(conn: &Connection, sql: &str, id: &str) -> CoreResult<bool> {
    Ok(conn
        .query_row(sql, [id], |r| r.get::<_, i64>(0))
        .optional()?
        .is_some())
}

pub fn format_date(d: NaiveDate) -> String {
    d.format(DATE_FORMAT).to_string()
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).ok()
}

pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
pub fn test_conn() -> Connection {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    init_schema(&conn).expect("init schema");
    conn
}
