use crate::attendance::{self, AttendanceStatus, StatusMap};
use crate::ipc::error::err;
use crate::ipc::helpers::{
    db_conn, map_core, required_date, required_status, required_str, respond, taken_by, to_value,
    HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn parse_status_map(req: &Request) -> HandlerResult<StatusMap> {
    let Some(obj) = req.params.get("statuses").and_then(|v| v.as_object()) else {
        return Err(err(
            &req.id,
            "bad_params",
            "statuses must be an object of studentId -> status",
            None,
        ));
    };
    let mut map = StatusMap::new();
    for (student_id, raw) in obj {
        let Some(s) = raw.as_str() else {
            return Err(err(
                &req.id,
                "bad_params",
                "status must be a string",
                Some(json!({ "studentId": student_id })),
            ));
        };
        let status = s.parse::<AttendanceStatus>().map_err(|e| {
            err(
                &req.id,
                "bad_params",
                e.to_string(),
                Some(json!({ "studentId": student_id })),
            )
        })?;
        map.insert(student_id.clone(), status);
    }
    Ok(map)
}

/// Upserts one status and returns the day's list with that student's entry
/// replaced. When the check-in view shows the same class and day, its list is
/// the one updated.
fn attendance_set_status(state: &mut AppState, req: &Request) -> HandlerResult<serde_json::Value> {
    let class_id = required_str(req, "classId")?;
    let student_id = required_str(req, "studentId")?;
    let date = required_date(req, "date")?;
    let status = required_status(req, "status")?;
    let taken_by = taken_by(state, req);

    let AppState {
        db, view, retry, ..
    } = state;
    let conn = db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))?;

    match view
        .as_mut()
        .filter(|v| v.class.id == class_id && v.date == date)
    {
        Some(view) => {
            let records = map_core(
                req,
                retry.run("attendance.setStatus", || {
                    view.set_status(conn, &student_id, status, taken_by.as_deref())
                        .map(|r| r.to_vec())
                }),
            )?;
            let record = records.iter().find(|r| r.student_id == student_id);
            Ok(json!({
                "record": to_value(req, &record)?,
                "records": to_value(req, &records)?
            }))
        }
        None => {
            let record = map_core(
                req,
                retry.run("attendance.setStatus", || {
                    attendance::set_status(conn, &class_id, &student_id, date, status, taken_by.as_deref())
                }),
            )?;
            let records = map_core(req, attendance::records_for_day(conn, &class_id, date))?;
            Ok(json!({
                "record": to_value(req, &record)?,
                "records": to_value(req, &records)?
            }))
        }
    }
}

fn attendance_bulk_replace(state: &mut AppState, req: &Request) -> HandlerResult<serde_json::Value> {
    let class_id = required_str(req, "classId")?;
    let date = required_date(req, "date")?;
    let statuses = parse_status_map(req)?;
    let taken_by = taken_by(state, req);
    let conn = db_conn(state, req)?;

    let saved = map_core(
        req,
        state.retry.run("attendance.bulkReplace", || {
            attendance::bulk_replace(conn, &class_id, date, &statuses, taken_by.as_deref())
        }),
    )?;
    let records = map_core(req, attendance::records_for_day(conn, &class_id, date))?;
    if let Some(view) = state
        .view
        .as_mut()
        .filter(|v| v.class.id == class_id && v.date == date)
    {
        view.records = records;
    }
    Ok(json!({ "savedCount": saved }))
}

fn attendance_for_day(state: &AppState, req: &Request) -> HandlerResult<serde_json::Value> {
    let conn = db_conn(state, req)?;
    let class_id = required_str(req, "classId")?;
    let date = required_date(req, "date")?;
    let records = map_core(
        req,
        state
            .retry
            .run("attendance.forDay", || attendance::records_for_day(conn, &class_id, date)),
    )?;
    Ok(json!({ "records": to_value(req, &records)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "attendance.setStatus" => attendance_set_status(state, req),
        "attendance.bulkReplace" => attendance_bulk_replace(state, req),
        "attendance.forDay" => attendance_for_day(state, req),
        _ => return None,
    };
    Some(respond(req, res))
}
