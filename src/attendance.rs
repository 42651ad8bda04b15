use chrono::NaiveDate;
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

use crate::db;
use crate::error::{CoreError, CoreResult};
use crate::roster::Student;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Late => "late",
            AttendanceStatus::Excused => "excused",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "present" => Ok(AttendanceStatus::Present),
            "absent" => Ok(AttendanceStatus::Absent),
            "late" => Ok(AttendanceStatus::Late),
            "excused" => Ok(AttendanceStatus::Excused),
            other => Err(CoreError::validation(format!(
                "status must be one of present, absent, late, excused (got {:?})",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    pub student_id: String,
    pub class_id: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub taken_by: Option<String>,
}

/// Student id to status, as collected before a bulk save.
pub type StatusMap = BTreeMap<String, AttendanceStatus>;

/// Positive-outcome tallies shared by every reporting scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub total: u32,
    pub present: u32,
    pub absent: u32,
    pub late: u32,
    pub excused: u32,
}

impl StatusCounts {
    pub fn add(&mut self, status: AttendanceStatus) {
        self.total += 1;
        match status {
            AttendanceStatus::Present => self.present += 1,
            AttendanceStatus::Absent => self.absent += 1,
            AttendanceStatus::Late => self.late += 1,
            AttendanceStatus::Excused => self.excused += 1,
        }
    }

    pub fn rate(&self) -> u32 {
        attendance_rate(self.present, self.late, self.total)
    }
}

/// `round(100 * (present + late) / total)`, or 0 when there is nothing to count.
/// Excused and absent only widen the denominator.
pub fn attendance_rate(present: u32, late: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let positive = u64::from(present) + u64::from(late);
    let total = u64::from(total);
    // Integer round-half-up of 100 * positive / total.
    ((200 * positive + total) / (2 * total)) as u32
}

fn record_from_row(r: &Row<'_>) -> rusqlite::Result<AttendanceRecord> {
    let date_raw: String = r.get(3)?;
    let status_raw: String = r.get(4)?;
    let date = db::parse_date(&date_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("bad attendance date {:?}", date_raw).into(),
        )
    })?;
    let status = status_raw.parse::<AttendanceStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(AttendanceRecord {
        id: r.get(0)?,
        student_id: r.get(1)?,
        class_id: r.get(2)?,
        date,
        status,
        taken_by: r.get(5)?,
    })
}

pub(crate) const RECORD_COLUMNS: &str = "id, student_id, class_id, date, status, taken_by";

pub(crate) fn read_records(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> CoreResult<Vec<AttendanceRecord>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, record_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(rows)
}

pub fn records_for_day(conn: &Connection, class_id: &str, date: NaiveDate) -> CoreResult<Vec<AttendanceRecord>> {
    read_records(
        conn,
        &format!(
            "SELECT {} FROM attendance_records WHERE class_id = ? AND date = ? ORDER BY student_id",
            RECORD_COLUMNS
        ),
        (class_id, db::format_date(date)),
    )
}

/// Single-row upsert keyed by (class, student, date). An existing row keeps its
/// id and `taken_by`; only the status changes.
pub fn set_status(
    conn: &Connection,
    class_id: &str,
    student_id: &str,
    date: NaiveDate,
    status: AttendanceStatus,
    taken_by: Option<&str>,
) -> CoreResult<AttendanceRecord> {
    db::require_class(conn, class_id)?;
    if !db::student_exists(conn, student_id)? {
        return Err(CoreError::not_found("student", student_id));
    }
    let date_key = db::format_date(date);
    conn.execute(
        "INSERT INTO attendance_records(id, student_id, class_id, date, status, taken_by, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id, class_id, date) DO UPDATE SET
           status = excluded.status,
           updated_at = excluded.updated_at",
        (
            Uuid::new_v4().to_string(),
            student_id,
            class_id,
            &date_key,
            status.as_str(),
            taken_by,
            db::now_timestamp(),
        ),
    )?;
    info!(class_id, student_id, date = %date_key, status = %status, "attendance status set");

    let mut rows = read_records(
        conn,
        &format!(
            "SELECT {} FROM attendance_records WHERE class_id = ? AND student_id = ? AND date = ?",
            RECORD_COLUMNS
        ),
        (class_id, student_id, &date_key),
    )?;
    rows.pop()
        .ok_or_else(|| CoreError::not_found("attendance record", format!("{}/{}", student_id, date_key)))
}

/// Replaces the whole day for a class: every existing row for (class, date) is
/// deleted and one row per map entry is inserted. Re-running with the same map
/// converges to the same rows. Every student must exist; class membership is
/// not required, matching [`set_status`].
pub fn bulk_replace(
    conn: &Connection,
    class_id: &str,
    date: NaiveDate,
    statuses: &StatusMap,
    taken_by: Option<&str>,
) -> CoreResult<usize> {
    if statuses.is_empty() {
        return Err(CoreError::validation(
            "mark at least one student before saving attendance",
        ));
    }
    db::require_class(conn, class_id)?;
    for student_id in statuses.keys() {
        if !db::student_exists(conn, student_id)? {
            return Err(CoreError::not_found("student", student_id.as_str()));
        }
    }
    let date_key = db::format_date(date);
    let now = db::now_timestamp();

    let tx = conn.unchecked_transaction()?;
    let removed = tx.execute(
        "DELETE FROM attendance_records WHERE class_id = ? AND date = ?",
        (class_id, &date_key),
    )?;
    {
        let mut insert = tx.prepare(
            "INSERT INTO attendance_records(id, student_id, class_id, date, status, taken_by, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
        )?;
        for (student_id, status) in statuses {
            insert.execute((
                Uuid::new_v4().to_string(),
                student_id,
                class_id,
                &date_key,
                status.as_str(),
                taken_by,
                &now,
            ))?;
        }
    }
    tx.commit()?;

    info!(
        class_id,
        date = %date_key,
        removed,
        saved = statuses.len(),
        "attendance day replaced"
    );
    Ok(statuses.len())
}

/// Fills every roster student without an entry in `working` with Present.
/// Existing entries are left alone. Returns how many entries were added.
pub fn mark_all_present(working: &mut StatusMap, roster: &[Student]) -> usize {
    let mut added = 0;
    for s in roster {
        if !working.contains_key(&s.id) {
            working.insert(s.id.clone(), AttendanceStatus::Present);
            added += 1;
        }
    }
    added
}

/// Replaces the entry for `record.student_id` in `list`, appending when absent.
pub fn replace_entry(list: &mut Vec<AttendanceRecord>, record: AttendanceRecord) {
    match list.iter_mut().find(|r| r.student_id == record.student_id) {
        Some(slot) => *slot = record,
        None => list.push(record),
    }
}
