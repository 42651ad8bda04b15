//! Range-scoped attendance aggregation and CSV export.
//!
//! Records are fetched once per window, joined to students and classes by id
//! in memory, and every summary is a pure function over that slice.

use chrono::{Datelike, NaiveDate};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::debug;

use crate::attendance::{self, attendance_rate, AttendanceRecord, StatusCounts, RECORD_COLUMNS};
use crate::db;
use crate::error::{CoreError, CoreResult};
use crate::roster::{self, Class, Student};

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportMode {
    Monthly,
    Yearly,
}

/// A calendar month or a calendar year, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportWindow {
    Month { year: i32, month: u32 },
    Year { year: i32 },
}

impl ReportWindow {
    pub fn month(year: i32, month: u32) -> CoreResult<Self> {
        if !(1..=12).contains(&month) {
            return Err(CoreError::validation("month must be between 1 and 12"));
        }
        Ok(ReportWindow::Month { year, month })
    }

    pub fn year(year: i32) -> Self {
        ReportWindow::Year { year }
    }

    pub fn mode(&self) -> ReportMode {
        match self {
            ReportWindow::Month { .. } => ReportMode::Monthly,
            ReportWindow::Year { .. } => ReportMode::Yearly,
        }
    }

    pub fn start(&self) -> NaiveDate {
        match *self {
            ReportWindow::Month { year, month } => first_of_month(year, month),
            ReportWindow::Year { year } => first_of_month(year, 1),
        }
    }

    pub fn end(&self) -> NaiveDate {
        match *self {
            ReportWindow::Month { year, month } => last_of_month(year, month),
            ReportWindow::Year { year } => last_of_month(year, 12),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start() && date <= self.end()
    }

    /// Human label, e.g. `March 2024` or `2024`.
    pub fn period_label(&self) -> String {
        match *self {
            ReportWindow::Month { year, month } => format!("{} {}", month_name(month), year),
            ReportWindow::Year { year } => year.to_string(),
        }
    }

    /// File-name period, e.g. `March_2024` or `2024`.
    pub fn period_key(&self) -> String {
        match *self {
            ReportWindow::Month { year, month } => format!("{}_{}", month_name(month), year),
            ReportWindow::Year { year } => year.to_string(),
        }
    }

    pub fn export_file_name(&self) -> String {
        format!("attendance-report-{}.csv", self.period_key())
    }
}

pub fn month_name(month: u32) -> &'static str {
    MONTH_NAMES
        .get(month.saturating_sub(1) as usize)
        .copied()
        .unwrap_or("Unknown")
}

fn first_of_month(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN)
}

fn last_of_month(year: i32, month: u32) -> NaiveDate {
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    next.and_then(|d| d.pred_opt()).unwrap_or(NaiveDate::MAX)
}

/// An attendance row with its student and class resolved for display.
/// Either side is `None` when the referenced row no longer exists.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRecord {
    #[serde(flatten)]
    pub record: AttendanceRecord,
    pub student: Option<Student>,
    pub class: Option<Class>,
}

pub fn fetch_records(conn: &Connection, window: &ReportWindow) -> CoreResult<Vec<ReportRecord>> {
    let rows = attendance::read_records(
        conn,
        &format!(
            "SELECT {} FROM attendance_records
             WHERE date >= ? AND date <= ?
             ORDER BY date, class_id, student_id",
            RECORD_COLUMNS
        ),
        (db::format_date(window.start()), db::format_date(window.end())),
    )?;
    let students: HashMap<String, Student> = roster::list_students(conn)?
        .into_iter()
        .map(|s| (s.id.clone(), s))
        .collect();
    let classes: HashMap<String, Class> = roster::list_classes(conn)?
        .into_iter()
        .map(|c| (c.id.clone(), c))
        .collect();

    let records: Vec<ReportRecord> = rows
        .into_iter()
        .map(|record| ReportRecord {
            student: students.get(&record.student_id).cloned(),
            class: classes.get(&record.class_id).cloned(),
            record,
        })
        .collect();
    debug!(
        period = %window.period_label(),
        records = records.len(),
        "report records fetched"
    );
    Ok(records)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallStats {
    pub total_records: u32,
    pub present: u32,
    pub absent: u32,
    pub late: u32,
    pub excused: u32,
    pub attendance_rate: u32,
    pub unique_students: u32,
    pub days_with_attendance: u32,
}

pub fn compute_overall_stats(records: &[ReportRecord]) -> OverallStats {
    let mut counts = StatusCounts::default();
    let mut students = HashSet::new();
    let mut days = HashSet::new();
    for r in records {
        counts.add(r.record.status);
        students.insert(r.record.student_id.as_str());
        days.insert(r.record.date);
    }
    OverallStats {
        total_records: counts.total,
        present: counts.present,
        absent: counts.absent,
        late: counts.late,
        excused: counts.excused,
        attendance_rate: counts.rate(),
        unique_students: students.len() as u32,
        days_with_attendance: days.len() as u32,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthBucket {
    pub month: u32,
    pub label: String,
    pub total: u32,
    pub present: u32,
    pub absent: u32,
    pub late: u32,
    pub excused: u32,
    pub attendance_rate: u32,
}

/// Exactly twelve buckets for the window's year; empty months report rate 0.
pub fn compute_monthly_breakdown(records: &[ReportRecord], window: &ReportWindow) -> Vec<MonthBucket> {
    let mut counts = [StatusCounts::default(); 12];
    for r in records {
        if !window.contains(r.record.date) {
            continue;
        }
        counts[r.record.date.month0() as usize].add(r.record.status);
    }
    counts
        .iter()
        .enumerate()
        .map(|(i, c)| MonthBucket {
            month: i as u32 + 1,
            label: month_name(i as u32 + 1)[..3].to_string(),
            total: c.total,
            present: c.present,
            absent: c.absent,
            late: c.late,
            excused: c.excused,
            attendance_rate: c.rate(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayRow {
    pub date: NaiveDate,
    pub total: u32,
    pub present: u32,
    pub absent: u32,
    pub late: u32,
    pub excused: u32,
    pub attendance_rate: u32,
}

/// One row per date that has records, oldest first.
pub fn compute_daily_breakdown(records: &[ReportRecord]) -> Vec<DayRow> {
    let mut by_day: BTreeMap<NaiveDate, StatusCounts> = BTreeMap::new();
    for r in records {
        by_day.entry(r.record.date).or_default().add(r.record.status);
    }
    by_day
        .into_iter()
        .map(|(date, c)| DayRow {
            date,
            total: c.total,
            present: c.present,
            absent: c.absent,
            late: c.late,
            excused: c.excused,
            attendance_rate: c.rate(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSummary {
    pub class_id: String,
    pub class_name: String,
    pub total_records: u32,
    pub present: u32,
    pub absent: u32,
    pub late: u32,
    pub excused: u32,
    pub unique_students: u32,
    pub attendance_rate: u32,
}

/// Per-class totals, highest attendance rate first. Records whose class row is
/// gone are skipped.
pub fn compute_class_summary(records: &[ReportRecord]) -> Vec<ClassSummary> {
    let mut groups: HashMap<&str, (&Class, StatusCounts, BTreeSet<&str>)> = HashMap::new();
    for r in records {
        let Some(class) = r.class.as_ref() else {
            continue;
        };
        let entry = groups
            .entry(class.id.as_str())
            .or_insert_with(|| (class, StatusCounts::default(), BTreeSet::new()));
        entry.1.add(r.record.status);
        entry.2.insert(r.record.student_id.as_str());
    }
    let mut rows: Vec<ClassSummary> = groups
        .into_values()
        .map(|(class, c, students)| ClassSummary {
            class_id: class.id.clone(),
            class_name: class.name.clone(),
            total_records: c.total,
            present: c.present,
            absent: c.absent,
            late: c.late,
            excused: c.excused,
            unique_students: students.len() as u32,
            attendance_rate: c.rate(),
        })
        .collect();
    rows.sort_by(|a, b| {
        b.attendance_rate
            .cmp(&a.attendance_rate)
            .then_with(|| a.class_name.cmp(&b.class_name))
            .then_with(|| a.class_id.cmp(&b.class_id))
    });
    rows
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummary {
    pub student_id: String,
    pub name: String,
    pub class_name: String,
    pub total_days: u32,
    pub present: u32,
    pub late: u32,
    pub absent: u32,
    pub excused: u32,
    pub attendance_rate: u32,
}

/// Per-student totals sorted by name for lookup. A student seen in several
/// classes lists them in name order, joined with `"; "`.
pub fn compute_student_summary(records: &[ReportRecord]) -> Vec<StudentSummary> {
    let mut groups: HashMap<&str, (&Student, StatusCounts, BTreeSet<&str>)> = HashMap::new();
    for r in records {
        let Some(student) = r.student.as_ref() else {
            continue;
        };
        let entry = groups
            .entry(student.id.as_str())
            .or_insert_with(|| (student, StatusCounts::default(), BTreeSet::new()));
        entry.1.add(r.record.status);
        if let Some(class) = r.class.as_ref() {
            entry.2.insert(class.name.as_str());
        }
    }
    let mut rows: Vec<StudentSummary> = groups
        .into_values()
        .map(|(student, c, class_names)| StudentSummary {
            student_id: student.id.clone(),
            name: student.full_name.clone(),
            class_name: class_names.into_iter().collect::<Vec<_>>().join("; "),
            total_days: c.total,
            present: c.present,
            late: c.late,
            absent: c.absent,
            excused: c.excused,
            attendance_rate: attendance_rate(c.present, c.late, c.total),
        })
        .collect();
    rows.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.student_id.cmp(&b.student_id))
    });
    rows
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub mode: ReportMode,
    pub period: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub overall: OverallStats,
    pub class_summary: Vec<ClassSummary>,
    pub student_summary: Vec<StudentSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly_breakdown: Option<Vec<MonthBucket>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_breakdown: Option<Vec<DayRow>>,
}

pub fn build_report(records: &[ReportRecord], window: &ReportWindow) -> Report {
    let (monthly_breakdown, daily_breakdown) = match window.mode() {
        ReportMode::Yearly => (Some(compute_monthly_breakdown(records, window)), None),
        ReportMode::Monthly => (None, Some(compute_daily_breakdown(records))),
    };
    Report {
        mode: window.mode(),
        period: window.period_label(),
        start: window.start(),
        end: window.end(),
        overall: compute_overall_stats(records),
        class_summary: compute_class_summary(records),
        student_summary: compute_student_summary(records),
        monthly_breakdown,
        daily_breakdown,
    }
}

pub fn fetch_report(conn: &Connection, window: &ReportWindow) -> CoreResult<Report> {
    let records = fetch_records(conn, window)?;
    Ok(build_report(&records, window))
}

pub const CSV_COLUMNS: &str = "Student Name,Class,Total Days,Present,Late,Absent,Attendance Rate";

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

pub fn export_csv(students: &[StudentSummary], overall: &OverallStats, period: &str) -> String {
    let mut csv = String::new();
    csv.push_str(&format!("{}\n", csv_quote(&format!("Attendance Report - {}", period))));
    csv.push_str(&format!("Overall Attendance Rate,{}%\n", overall.attendance_rate));
    csv.push_str(&format!("Total Records,{}\n", overall.total_records));
    csv.push_str(&format!("Unique Students,{}\n", overall.unique_students));
    csv.push('\n');
    csv.push_str(CSV_COLUMNS);
    csv.push('\n');
    for s in students {
        csv.push_str(&format!(
            "{},{},{},{},{},{},{}%\n",
            csv_quote(&s.name),
            csv_quote(&s.class_name),
            s.total_days,
            s.present,
            s.late,
            s.absent,
            s.attendance_rate
        ));
    }
    csv
}
