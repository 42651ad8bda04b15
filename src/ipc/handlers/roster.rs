use crate::assign::{self, DropTarget, PickedUp};
use crate::ipc::error::err;
use crate::ipc::helpers::{db_conn, map_core, required_str, respond, to_value, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::roster;
use serde_json::json;

/// The full roster plus the ids of students linked to no class.
fn roster_load(state: &AppState, req: &Request) -> HandlerResult<serde_json::Value> {
    let conn = db_conn(state, req)?;
    let loaded = map_core(req, state.retry.run("roster.load", || roster::load_roster(conn)))?;
    let unassigned: Vec<&str> = loaded
        .unassigned_students()
        .iter()
        .map(|s| s.id.as_str())
        .collect();
    let mut result = to_value(req, &loaded)?;
    result["unassignedStudentIds"] = json!(unassigned);
    Ok(result)
}

fn roster_class_view(state: &AppState, req: &Request) -> HandlerResult<serde_json::Value> {
    let conn = db_conn(state, req)?;
    let class_id = required_str(req, "classId")?;
    let loaded = map_core(req, state.retry.run("roster.load", || roster::load_roster(conn)))?;
    let Some(view) = loaded.class_roster(&class_id) else {
        return Err(err(
            &req.id,
            "not_found",
            "class not found",
            Some(json!({ "classId": class_id })),
        ));
    };
    to_value(req, &view)
}

#[derive(Clone, Copy)]
enum LinkOp {
    AssignTeacher,
    RemoveTeacher,
    AssignStudent,
    RemoveStudent,
}

/// Explicit assign/unassign. The response carries the re-fetched roster so the
/// caller never has to patch its copy locally.
fn roster_link(state: &AppState, req: &Request, op: LinkOp) -> HandlerResult<serde_json::Value> {
    let conn = db_conn(state, req)?;
    let class_id = required_str(req, "classId")?;
    let (member_key, name) = match op {
        LinkOp::AssignTeacher => ("teacherId", "roster.assignTeacher"),
        LinkOp::RemoveTeacher => ("teacherId", "roster.removeTeacher"),
        LinkOp::AssignStudent => ("studentId", "roster.assignStudent"),
        LinkOp::RemoveStudent => ("studentId", "roster.removeStudent"),
    };
    let member_id = required_str(req, member_key)?;
    let changed = map_core(
        req,
        state.retry.run(name, || match op {
            LinkOp::AssignTeacher => roster::assign_teacher(conn, &class_id, &member_id),
            LinkOp::RemoveTeacher => roster::remove_teacher(conn, &class_id, &member_id),
            LinkOp::AssignStudent => roster::assign_student(conn, &class_id, &member_id),
            LinkOp::RemoveStudent => roster::remove_student(conn, &class_id, &member_id),
        }),
    )?;
    let loaded = map_core(req, state.retry.run("roster.load", || roster::load_roster(conn)))?;
    Ok(json!({
        "changed": changed,
        "roster": to_value(req, &loaded)?
    }))
}

fn roster_drop(state: &AppState, req: &Request) -> HandlerResult<serde_json::Value> {
    let conn = db_conn(state, req)?;
    let item: PickedUp = req
        .params
        .get("item")
        .cloned()
        .ok_or_else(|| err(&req.id, "bad_params", "missing item", None))
        .and_then(|v| {
            serde_json::from_value(v)
                .map_err(|e| err(&req.id, "bad_params", format!("invalid item: {}", e), None))
        })?;
    let target: DropTarget = req
        .params
        .get("target")
        .cloned()
        .ok_or_else(|| err(&req.id, "bad_params", "missing target", None))
        .and_then(|v| {
            serde_json::from_value(v)
                .map_err(|e| err(&req.id, "bad_params", format!("invalid target: {}", e), None))
        })?;

    let outcome = map_core(
        req,
        state
            .retry
            .run("roster.drop", || assign::resolve_drop(conn, &item, &target)),
    )?;
    let mut result = json!({ "outcome": to_value(req, &outcome)? });
    if outcome.mutated() {
        let loaded = map_core(req, state.retry.run("roster.load", || roster::load_roster(conn)))?;
        result["roster"] = to_value(req, &loaded)?;
    }
    Ok(result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "roster.load" => roster_load(state, req),
        "roster.classView" => roster_class_view(state, req),
        "roster.assignTeacher" => roster_link(state, req, LinkOp::AssignTeacher),
        "roster.removeTeacher" => roster_link(state, req, LinkOp::RemoveTeacher),
        "roster.assignStudent" => roster_link(state, req, LinkOp::AssignStudent),
        "roster.removeStudent" => roster_link(state, req, LinkOp::RemoveStudent),
        "roster.drop" => roster_drop(state, req),
        _ => return None,
    };
    Some(respond(req, res))
}
