//! Thin record editors for the entities the attendance core consumes.

use crate::ipc::error::err;
use crate::ipc::helpers::{
    db_conn, map_core, optional_str, required_str, respond, to_value, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::roster;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

fn classes_list(state: &AppState, req: &Request) -> HandlerResult<serde_json::Value> {
    let conn = db_conn(state, req)?;
    let classes = map_core(req, roster::list_classes(conn))?;
    Ok(json!({ "classes": to_value(req, &classes)? }))
}

fn classes_create(state: &AppState, req: &Request) -> HandlerResult<serde_json::Value> {
    let conn = db_conn(state, req)?;
    let name = required_str(req, "name")?;
    let description = optional_str(req, "description");
    let class_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO classes(id, name, description) VALUES(?, ?, ?)",
        (&class_id, &name, &description),
    )
    .map_err(|e| {
        err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "classes" })),
        )
    })?;
    info!(class_id = %class_id, name = %name, "class created");
    Ok(json!({ "classId": class_id, "name": name }))
}

fn teachers_create(state: &AppState, req: &Request) -> HandlerResult<serde_json::Value> {
    let conn = db_conn(state, req)?;
    let full_name = required_str(req, "fullName")?;
    let teacher_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO teachers(id, full_name, photo_url, linked_contact_id, email, phone)
         VALUES(?, ?, ?, NULL, ?, ?)",
        (
            &teacher_id,
            &full_name,
            optional_str(req, "photoUrl"),
            optional_str(req, "email"),
            optional_str(req, "phone"),
        ),
    )
    .map_err(|e| {
        err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "teachers" })),
        )
    })?;
    Ok(json!({ "teacherId": teacher_id }))
}

fn students_create(state: &AppState, req: &Request) -> HandlerResult<serde_json::Value> {
    let conn = db_conn(state, req)?;
    let full_name = required_str(req, "fullName")?;
    let date_of_birth = required_str(req, "dateOfBirth")?;
    let guardian_name = required_str(req, "guardianName")?;
    let guardian_phone = required_str(req, "guardianPhone")?;
    let student_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, full_name, photo_url, date_of_birth, guardian_name, guardian_phone)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &student_id,
            &full_name,
            optional_str(req, "photoUrl"),
            &date_of_birth,
            &guardian_name,
            &guardian_phone,
        ),
    )
    .map_err(|e| {
        err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        )
    })?;
    Ok(json!({ "studentId": student_id }))
}

/// Removes the student and its class links. Attendance rows stay behind and
/// report with no resolved student.
fn students_delete(state: &mut AppState, req: &Request) -> HandlerResult<serde_json::Value> {
    let student_id = required_str(req, "studentId")?;
    let conn = db_conn(state, req)?;
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| err(&req.id, "db_tx_failed", e.to_string(), None))?;
    tx.execute("DELETE FROM class_students WHERE student_id = ?", [&student_id])
        .map_err(|e| {
            err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": "class_students" })),
            )
        })?;
    let n = tx
        .execute("DELETE FROM students WHERE id = ?", [&student_id])
        .map_err(|e| {
            err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": "students" })),
            )
        })?;
    if n == 0 {
        return Err(err(&req.id, "not_found", "student not found", None));
    }
    tx.commit()
        .map_err(|e| err(&req.id, "db_commit_failed", e.to_string(), None))?;
    if let Some(view) = state.view.as_mut() {
        view.students.retain(|s| s.id != student_id);
        view.working.remove(&student_id);
    }
    info!(student_id = %student_id, "student deleted");
    Ok(json!({ "ok": true }))
}

fn contacts_create(state: &AppState, req: &Request) -> HandlerResult<serde_json::Value> {
    let conn = db_conn(state, req)?;
    let full_name = required_str(req, "fullName")?;
    let contact_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO contacts(id, full_name, photo_url, email, phone) VALUES(?, ?, ?, ?, ?)",
        (
            &contact_id,
            &full_name,
            optional_str(req, "photoUrl"),
            optional_str(req, "email"),
            optional_str(req, "phone"),
        ),
    )
    .map_err(|e| {
        err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "contacts" })),
        )
    })?;
    Ok(json!({ "contactId": contact_id }))
}

fn contacts_list(state: &AppState, req: &Request) -> HandlerResult<serde_json::Value> {
    let conn = db_conn(state, req)?;
    let contacts = map_core(req, roster::list_contacts(conn))?;
    Ok(json!({ "contacts": to_value(req, &contacts)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "classes.list" => classes_list(state, req),
        "classes.create" => classes_create(state, req),
        "teachers.create" => teachers_create(state, req),
        "students.create" => students_create(state, req),
        "students.delete" => students_delete(state, req),
        "contacts.create" => contacts_create(state, req),
        "contacts.list" => contacts_list(state, req),
        _ => return None,
    };
    Some(respond(req, res))
}
