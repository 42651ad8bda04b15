use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;

use crate::attendance::AttendanceStatus;
use crate::db;
use crate::ipc::error::{core_err, err, ok};
use crate::ipc::types::{AppState, Request};

pub type HandlerResult<T> = Result<T, serde_json::Value>;

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> HandlerResult<&'a Connection> {
    open_conn(&state.db, req)
}

/// For handlers that split `AppState` into disjoint borrows.
pub fn open_conn<'a>(db: &'a Option<Connection>, req: &Request) -> HandlerResult<&'a Connection> {
    db.as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str(req: &Request, key: &str) -> HandlerResult<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn optional_date(req: &Request, key: &str) -> HandlerResult<Option<NaiveDate>> {
    match optional_str(req, key) {
        None => Ok(None),
        Some(raw) => db::parse_date(&raw).map(Some).ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                format!("{} must be YYYY-MM-DD", key),
                Some(json!({ key: raw })),
            )
        }),
    }
}

/// `params[key]` as `YYYY-MM-DD`, defaulting to today when absent.
pub fn date_or_today(req: &Request, key: &str) -> HandlerResult<NaiveDate> {
    Ok(optional_date(req, key)?.unwrap_or_else(|| chrono::Local::now().date_naive()))
}

pub fn required_date(req: &Request, key: &str) -> HandlerResult<NaiveDate> {
    let raw = required_str(req, key)?;
    db::parse_date(&raw).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            format!("{} must be YYYY-MM-DD", key),
            Some(json!({ key: raw })),
        )
    })
}

pub fn required_status(req: &Request, key: &str) -> HandlerResult<AttendanceStatus> {
    let raw = required_str(req, key)?;
    raw.parse::<AttendanceStatus>()
        .map_err(|e| err(&req.id, "bad_params", e.to_string(), Some(json!({ key: raw }))))
}

pub fn taken_by(state: &AppState, req: &Request) -> Option<String> {
    optional_str(req, "takenBy").or_else(|| state.default_taken_by.clone())
}

pub fn to_value<T: Serialize>(req: &Request, value: &T) -> HandlerResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| err(&req.id, "serialize_failed", e.to_string(), None))
}

pub fn map_core<T>(req: &Request, res: crate::error::CoreResult<T>) -> HandlerResult<T> {
    res.map_err(|e| core_err(&req.id, e))
}

/// Collapses a handler body into the response envelope.
pub fn respond(req: &Request, res: HandlerResult<serde_json::Value>) -> serde_json::Value {
    match res {
        Ok(result) => ok(&req.id, result),
        Err(resp) => resp,
    }
}
