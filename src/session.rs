use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::attendance::{self, AttendanceRecord, AttendanceStatus, StatusMap};
use crate::db;
use crate::error::{CoreError, CoreResult};
use crate::roster::{self, Class, Student};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckinSession {
    pub id: String,
    pub class_id: String,
    pub name: String,
    pub session_date: NaiveDate,
    pub is_active: bool,
}

/// Per-class state of the check-in machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SessionState {
    NoSession,
    #[serde(rename_all = "camelCase")]
    SessionActive { session_id: String },
}

impl SessionState {
    pub fn of(active: Option<&CheckinSession>) -> Self {
        match active {
            Some(s) => SessionState::SessionActive {
                session_id: s.id.clone(),
            },
            None => SessionState::NoSession,
        }
    }
}

const SESSION_COLUMNS: &str = "id, class_id, name, session_date, is_active";

fn session_from_row(r: &Row<'_>) -> rusqlite::Result<CheckinSession> {
    let date_raw: String = r.get(3)?;
    let session_date = db::parse_date(&date_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("bad session date {:?}", date_raw).into(),
        )
    })?;
    Ok(CheckinSession {
        id: r.get(0)?,
        class_id: r.get(1)?,
        name: r.get(2)?,
        session_date,
        is_active: r.get::<_, i64>(4)? != 0,
    })
}

pub fn session_name(class_name: &str, date: NaiveDate) -> String {
    format!("{} - {}", class_name, date.format("%B %-d, %Y"))
}

pub fn active_session(conn: &Connection, class_id: &str) -> CoreResult<Option<CheckinSession>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {} FROM checkin_sessions WHERE class_id = ? AND is_active = 1",
                SESSION_COLUMNS
            ),
            [class_id],
            session_from_row,
        )
        .optional()?)
}

pub fn get_session(conn: &Connection, session_id: &str) -> CoreResult<CheckinSession> {
    conn.query_row(
        &format!("SELECT {} FROM checkin_sessions WHERE id = ?", SESSION_COLUMNS),
        [session_id],
        session_from_row,
    )
    .optional()?
    .ok_or_else(|| CoreError::not_found("session", session_id))
}

/// All sessions for a class, newest first. Ended sessions are never removed.
pub fn list_sessions(conn: &Connection, class_id: &str) -> CoreResult<Vec<CheckinSession>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM checkin_sessions WHERE class_id = ? ORDER BY session_date DESC, created_at DESC",
        SESSION_COLUMNS
    ))?;
    let rows = stmt
        .query_map([class_id], session_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(rows)
}

/// `NoSession -> SessionActive`. Fails with `Conflict` when the class already
/// has an active session; the store's partial unique index backs the check.
pub fn start(conn: &Connection, class_id: &str, date: NaiveDate) -> CoreResult<CheckinSession> {
    let class = roster::get_class(conn, class_id)?;
    if let Some(existing) = active_session(conn, class_id)? {
        return Err(CoreError::conflict(format!(
            "class already has an active check-in session ({})",
            existing.id
        )));
    }
    let session = CheckinSession {
        id: Uuid::new_v4().to_string(),
        class_id: class.id.clone(),
        name: session_name(&class.name, date),
        session_date: date,
        is_active: true,
    };
    conn.execute(
        "INSERT INTO checkin_sessions(id, class_id, name, session_date, is_active, created_at)
         VALUES(?, ?, ?, ?, 1, ?)",
        (
            &session.id,
            &session.class_id,
            &session.name,
            db::format_date(date),
            db::now_timestamp(),
        ),
    )?;
    info!(class_id, session_id = %session.id, name = %session.name, "check-in session started");
    Ok(session)
}

/// `SessionActive -> NoSession`. The row stays in place with `is_active = 0`.
pub fn end(conn: &Connection, session_id: &str) -> CoreResult<CheckinSession> {
    let mut session = get_session(conn, session_id)?;
    if !session.is_active {
        return Err(CoreError::conflict(format!(
            "check-in session {} has already ended",
            session_id
        )));
    }
    conn.execute(
        "UPDATE checkin_sessions SET is_active = 0, ended_at = ? WHERE id = ?",
        (db::now_timestamp(), session_id),
    )?;
    session.is_active = false;
    info!(session_id, class_id = %session.class_id, "check-in session ended");
    Ok(session)
}

/// Working state for the class currently selected on the check-in screen.
///
/// `records` mirrors the persisted rows for (class, date); `working` holds
/// marks that only reach the store on [`CheckinView::submit`]. `students` is
/// re-read from the link tables before every mark and submit.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckinView {
    pub class: Class,
    pub date: NaiveDate,
    pub active_session: Option<CheckinSession>,
    pub students: Vec<Student>,
    pub records: Vec<AttendanceRecord>,
    pub working: StatusMap,
}

impl CheckinView {
    /// Builds a fresh view. Nothing from a previously selected class carries over.
    pub fn select(conn: &Connection, class_id: &str, date: NaiveDate) -> CoreResult<Self> {
        let class = roster::get_class(conn, class_id)?;
        let view = CheckinView {
            active_session: active_session(conn, class_id)?,
            students: roster::class_students(conn, class_id)?,
            records: attendance::records_for_day(conn, class_id, date)?,
            working: StatusMap::new(),
            class,
            date,
        };
        debug!(
            class_id,
            students = view.students.len(),
            records = view.records.len(),
            active = view.active_session.is_some(),
            "check-in view selected"
        );
        Ok(view)
    }

    pub fn state(&self) -> SessionState {
        SessionState::of(self.active_session.as_ref())
    }

    /// Re-reads the class roster. Working marks for students who left the
    /// class are dropped.
    pub fn refresh_roster(&mut self, conn: &Connection) -> CoreResult<()> {
        self.students = roster::class_students(conn, &self.class.id)?;
        let students = &self.students;
        self.working.retain(|id, _| students.iter().any(|s| &s.id == id));
        Ok(())
    }

    /// Re-reads roster, active session and the day's records. Working marks
    /// survive for students still on the roster.
    pub fn reload(&mut self, conn: &Connection) -> CoreResult<()> {
        self.refresh_roster(conn)?;
        self.active_session = active_session(conn, &self.class.id)?;
        self.records = attendance::records_for_day(conn, &self.class.id, self.date)?;
        Ok(())
    }

    pub fn start_session(&mut self, conn: &Connection, date: NaiveDate) -> CoreResult<&CheckinSession> {
        let session = start(conn, &self.class.id, date)?;
        Ok(&*self.active_session.insert(session))
    }

    /// Ends `session_id` and clears the view's session when it was that one.
    pub fn end_session(&mut self, conn: &Connection, session_id: &str) -> CoreResult<CheckinSession> {
        let ended = end(conn, session_id)?;
        if self.active_session.as_ref().map(|s| s.id.as_str()) == Some(session_id) {
            self.active_session = None;
        }
        Ok(ended)
    }

    pub fn mark(&mut self, conn: &Connection, student_id: &str, status: AttendanceStatus) -> CoreResult<()> {
        self.refresh_roster(conn)?;
        if !self.students.iter().any(|s| s.id == student_id) {
            return Err(CoreError::not_found("student", student_id));
        }
        self.working.insert(student_id.to_string(), status);
        Ok(())
    }

    pub fn mark_all_present(&mut self, conn: &Connection) -> CoreResult<usize> {
        self.refresh_roster(conn)?;
        Ok(attendance::mark_all_present(&mut self.working, &self.students))
    }

    /// Upserts one row and swaps it into `records`.
    pub fn set_status(
        &mut self,
        conn: &Connection,
        student_id: &str,
        status: AttendanceStatus,
        taken_by: Option<&str>,
    ) -> CoreResult<&[AttendanceRecord]> {
        let record = attendance::set_status(conn, &self.class.id, student_id, self.date, status, taken_by)?;
        attendance::replace_entry(&mut self.records, record);
        Ok(&self.records)
    }

    /// Persists the working map as the full day, then reloads `records`.
    pub fn submit(&mut self, conn: &Connection, taken_by: Option<&str>) -> CoreResult<usize> {
        self.refresh_roster(conn)?;
        let saved = attendance::bulk_replace(conn, &self.class.id, self.date, &self.working, taken_by)?;
        self.records = attendance::records_for_day(conn, &self.class.id, self.date)?;
        Ok(saved)
    }
}
