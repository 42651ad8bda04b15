use crate::ipc::error::err;
use crate::ipc::helpers::{
    date_or_today, db_conn, map_core, open_conn, optional_date, required_status, required_str,
    respond, taken_by, to_value, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::session::{self, CheckinView, SessionState};
use serde_json::json;

fn no_selection(req: &Request) -> serde_json::Value {
    err(
        &req.id,
        "validation_failed",
        "select a class for check-in first",
        None,
    )
}

/// Goes through the check-in view when it shows the same class, so the view's
/// session state and the store move together. Without a `date` the view's day
/// is used, otherwise today.
fn sessions_start(state: &mut AppState, req: &Request) -> HandlerResult<serde_json::Value> {
    let class_id = required_str(req, "classId")?;
    let date = optional_date(req, "date")?;
    let AppState { db, view, .. } = state;
    let conn = open_conn(db, req)?;
    let started = match view.as_mut().filter(|v| v.class.id == class_id) {
        Some(view) => {
            let date = date.unwrap_or(view.date);
            map_core(req, view.start_session(conn, date))?.clone()
        }
        None => {
            let date = date.unwrap_or_else(|| chrono::Local::now().date_naive());
            map_core(req, session::start(conn, &class_id, date))?
        }
    };
    Ok(json!({ "session": to_value(req, &started)? }))
}

fn sessions_end(state: &mut AppState, req: &Request) -> HandlerResult<serde_json::Value> {
    let session_id = required_str(req, "sessionId")?;
    let AppState { db, view, .. } = state;
    let conn = open_conn(db, req)?;
    let viewed = view.as_mut().filter(|v| {
        v.active_session.as_ref().map(|s| s.id.as_str()) == Some(session_id.as_str())
    });
    let ended = match viewed {
        Some(view) => map_core(req, view.end_session(conn, &session_id))?,
        None => map_core(req, session::end(conn, &session_id))?,
    };
    Ok(json!({ "session": to_value(req, &ended)? }))
}

fn sessions_active(state: &AppState, req: &Request) -> HandlerResult<serde_json::Value> {
    let conn = db_conn(state, req)?;
    let class_id = required_str(req, "classId")?;
    let active = map_core(
        req,
        state
            .retry
            .run("sessions.active", || session::active_session(conn, &class_id)),
    )?;
    Ok(json!({
        "state": to_value(req, &SessionState::of(active.as_ref()))?,
        "session": to_value(req, &active)?
    }))
}

fn sessions_list(state: &AppState, req: &Request) -> HandlerResult<serde_json::Value> {
    let conn = db_conn(state, req)?;
    let class_id = required_str(req, "classId")?;
    let sessions = map_core(
        req,
        state
            .retry
            .run("sessions.list", || session::list_sessions(conn, &class_id)),
    )?;
    Ok(json!({ "sessions": to_value(req, &sessions)? }))
}

fn view_json(req: &Request, view: &CheckinView) -> HandlerResult<serde_json::Value> {
    Ok(json!({
        "view": to_value(req, view)?,
        "state": to_value(req, &view.state())?
    }))
}

/// Switching classes throws away the previous working marks.
fn checkin_select_class(state: &mut AppState, req: &Request) -> HandlerResult<serde_json::Value> {
    let class_id = required_str(req, "classId")?;
    let date = date_or_today(req, "date")?;
    let conn = db_conn(state, req)?;
    let fresh = map_core(
        req,
        state
            .retry
            .run("checkin.selectClass", || CheckinView::select(conn, &class_id, date)),
    )?;
    let view = state.view.insert(fresh);
    view_json(req, view)
}

/// Re-reads the selected view from the store before returning it.
fn checkin_view(state: &mut AppState, req: &Request) -> HandlerResult<serde_json::Value> {
    let AppState {
        db, view, retry, ..
    } = state;
    let conn = open_conn(db, req)?;
    let view = view.as_mut().ok_or_else(|| no_selection(req))?;
    map_core(req, retry.run("checkin.view", || view.reload(conn)))?;
    view_json(req, view)
}

fn checkin_mark(state: &mut AppState, req: &Request) -> HandlerResult<serde_json::Value> {
    let student_id = required_str(req, "studentId")?;
    let status = required_status(req, "status")?;
    let AppState { db, view, .. } = state;
    let conn = open_conn(db, req)?;
    let view = view.as_mut().ok_or_else(|| no_selection(req))?;
    map_core(req, view.mark(conn, &student_id, status))?;
    Ok(json!({ "working": to_value(req, &view.working)? }))
}

fn checkin_mark_all_present(state: &mut AppState, req: &Request) -> HandlerResult<serde_json::Value> {
    let AppState { db, view, .. } = state;
    let conn = open_conn(db, req)?;
    let view = view.as_mut().ok_or_else(|| no_selection(req))?;
    let added = map_core(req, view.mark_all_present(conn))?;
    Ok(json!({
        "added": added,
        "working": to_value(req, &view.working)?
    }))
}

fn checkin_submit(state: &mut AppState, req: &Request) -> HandlerResult<serde_json::Value> {
    let taken_by = taken_by(state, req);
    let AppState {
        db, view, retry, ..
    } = state;
    let conn = open_conn(db, req)?;
    let view = view.as_mut().ok_or_else(|| no_selection(req))?;
    let saved = map_core(
        req,
        retry.run("checkin.submit", || view.submit(conn, taken_by.as_deref())),
    )?;
    Ok(json!({
        "savedCount": saved,
        "records": to_value(req, &view.records)?
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "sessions.start" => sessions_start(state, req),
        "sessions.end" => sessions_end(state, req),
        "sessions.active" => sessions_active(state, req),
        "sessions.list" => sessions_list(state, req),
        "checkin.selectClass" => checkin_select_class(state, req),
        "checkin.view" => checkin_view(state, req),
        "checkin.mark" => checkin_mark(state, req),
        "checkin.markAllPresent" => checkin_mark_all_present(state, req),
        "checkin.submit" => checkin_submit(state, req),
        _ => return None,
    };
    Some(respond(req, res))
}
