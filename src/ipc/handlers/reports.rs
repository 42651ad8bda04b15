use crate::ipc::error::err;
use crate::ipc::helpers::{db_conn, map_core, optional_str, respond, to_value, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::report::{self, ReportMode, ReportWindow};
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

fn parse_window(req: &Request) -> HandlerResult<ReportWindow> {
    let mode = match req
        .params
        .get("mode")
        .and_then(|v| v.as_str())
        .map(|s| s.to_ascii_lowercase())
        .as_deref()
    {
        None | Some("monthly") => ReportMode::Monthly,
        Some("yearly") => ReportMode::Yearly,
        Some(other) => {
            return Err(err(
                &req.id,
                "bad_params",
                "mode must be one of: monthly, yearly",
                Some(json!({ "mode": other })),
            ))
        }
    };
    let year = req
        .params
        .get("year")
        .and_then(|v| v.as_i64())
        .and_then(|y| i32::try_from(y).ok())
        .filter(|y| (1..=9999).contains(y))
        .ok_or_else(|| err(&req.id, "bad_params", "missing year", None))?;
    match mode {
        ReportMode::Yearly => Ok(ReportWindow::year(year)),
        ReportMode::Monthly => {
            let raw = req
                .params
                .get("month")
                .and_then(|v| v.as_u64())
                .ok_or_else(|| err(&req.id, "bad_params", "missing month", None))?;
            let month = u32::try_from(raw).map_err(|_| {
                err(
                    &req.id,
                    "bad_params",
                    "month must be between 1 and 12",
                    Some(json!({ "month": raw })),
                )
            })?;
            ReportWindow::month(year, month)
                .map_err(|e| err(&req.id, "bad_params", e.to_string(), Some(json!({ "month": raw }))))
        }
    }
}

fn reports_fetch(state: &AppState, req: &Request) -> HandlerResult<serde_json::Value> {
    let conn = db_conn(state, req)?;
    let window = parse_window(req)?;
    let built = map_core(
        req,
        state
            .retry
            .run("reports.fetch", || report::fetch_report(conn, &window)),
    )?;
    to_value(req, &built)
}

fn write_text_file(req: &Request, path: &str, contents: &str) -> HandlerResult<()> {
    let out = PathBuf::from(path);
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            err(
                &req.id,
                "export_failed",
                e.to_string(),
                Some(json!({ "path": path })),
            )
        })?;
    }
    std::fs::write(&out, contents).map_err(|e| {
        err(
            &req.id,
            "export_failed",
            e.to_string(),
            Some(json!({ "path": path })),
        )
    })
}

fn reports_export_csv(state: &AppState, req: &Request) -> HandlerResult<serde_json::Value> {
    let conn = db_conn(state, req)?;
    let window = parse_window(req)?;
    let built = map_core(
        req,
        state
            .retry
            .run("reports.exportCsv", || report::fetch_report(conn, &window)),
    )?;
    let csv = report::export_csv(&built.student_summary, &built.overall, &built.period);
    let file_name = window.export_file_name();

    let out_path = optional_str(req, "outPath");
    if let Some(path) = out_path.as_deref() {
        write_text_file(req, path, &csv)?;
        info!(path, rows = built.student_summary.len(), "attendance csv exported");
    }
    Ok(json!({
        "fileName": file_name,
        "csv": csv,
        "rowsExported": built.student_summary.len(),
        "path": out_path
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "reports.fetch" => reports_fetch(state, req),
        "reports.exportCsv" => reports_export_csv(state, req),
        _ => return None,
    };
    Some(respond(req, res))
}
