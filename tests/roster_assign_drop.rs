use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_attendanced");
    let mut child = Command::new(exe)
        .env_remove("ATTENDANCED_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn attendanced");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

fn create_class(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, id: &str, name: &str) -> String {
    request_ok(stdin, reader, id, "classes.create", json!({ "name": name }))
        .get("classId")
        .and_then(|v| v.as_str())
        .expect("classId")
        .to_string()
}

fn link_count(roster: &serde_json::Value, table: &str, class_id: &str, key: &str, member_id: &str) -> usize {
    roster
        .get(table)
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .filter(|l| {
            l.get("classId").and_then(|v| v.as_str()) == Some(class_id)
                && l.get(key).and_then(|v| v.as_str()) == Some(member_id)
        })
        .count()
}

#[test]
fn assign_is_idempotent_and_remove_is_explicit() {
    let workspace = temp_dir("attendanced-roster-assign");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let class_id = create_class(&mut stdin, &mut reader, "2", "K-1");
    let teacher_id = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "teachers.create",
        json!({ "fullName": "Grace Park", "email": "grace@example.org" }),
    )
    .get("teacherId")
    .and_then(|v| v.as_str())
    .expect("teacherId")
    .to_string();
    let student_id = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.create",
        json!({
            "fullName": "Ann Lee",
            "dateOfBirth": "2018-04-02",
            "guardianName": "Mo Lee",
            "guardianPhone": "555-0101"
        }),
    )
    .get("studentId")
    .and_then(|v| v.as_str())
    .expect("studentId")
    .to_string();

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "roster.assignTeacher",
        json!({ "classId": class_id, "teacherId": teacher_id }),
    );
    assert_eq!(first.get("changed").and_then(|v| v.as_bool()), Some(true));
    let again = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "roster.assignTeacher",
        json!({ "classId": class_id, "teacherId": teacher_id }),
    );
    assert_eq!(again.get("changed").and_then(|v| v.as_bool()), Some(false));
    let roster = again.get("roster").cloned().expect("roster");
    assert_eq!(
        link_count(&roster, "classTeacherLinks", &class_id, "teacherId", &teacher_id),
        1
    );

    for id in ["7", "8"] {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            id,
            "roster.assignStudent",
            json!({ "classId": class_id, "studentId": student_id }),
        );
    }
    let loaded = request_ok(&mut stdin, &mut reader, "9", "roster.load", json!({}));
    assert_eq!(
        link_count(&loaded, "classStudentLinks", &class_id, "studentId", &student_id),
        1
    );
    assert_eq!(
        loaded
            .get("unassignedStudentIds")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(0)
    );

    let view = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "roster.classView",
        json!({ "classId": class_id }),
    );
    assert_eq!(
        view.get("students")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(1)
    );

    let removed = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "roster.removeStudent",
        json!({ "classId": class_id, "studentId": student_id }),
    );
    assert_eq!(removed.get("changed").and_then(|v| v.as_bool()), Some(true));
    let roster = removed.get("roster").cloned().expect("roster");
    assert_eq!(
        link_count(&roster, "classStudentLinks", &class_id, "studentId", &student_id),
        0
    );
    let reloaded = request_ok(&mut stdin, &mut reader, "11b", "roster.load", json!({}));
    assert_eq!(
        reloaded.get("unassignedStudentIds"),
        Some(&json!([student_id]))
    );
    assert_eq!(
        link_count(&roster, "classTeacherLinks", &class_id, "teacherId", &teacher_id),
        1
    );

    let missing = request(
        &mut stdin,
        &mut reader,
        "12",
        "roster.assignStudent",
        json!({ "classId": "no-such-class", "studentId": student_id }),
    );
    assert_eq!(error_code(&missing), Some("not_found"));
}

#[test]
fn drop_resolves_typed_pairs_and_ignores_the_rest() {
    let workspace = temp_dir("attendanced-roster-drop");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let class_id = create_class(&mut stdin, &mut reader, "2", "K-1");
    let contact_id = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "contacts.create",
        json!({
            "fullName": "Ida Moss",
            "email": "ida@example.org",
            "phone": "555-0142",
            "photoUrl": "https://img.example.org/ida.png"
        }),
    )
    .get("contactId")
    .and_then(|v| v.as_str())
    .expect("contactId")
    .to_string();
    let student_id = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.create",
        json!({
            "fullName": "Bo Diaz",
            "dateOfBirth": "2017-09-30",
            "guardianName": "Lu Diaz",
            "guardianPhone": "555-0102"
        }),
    )
    .get("studentId")
    .and_then(|v| v.as_str())
    .expect("studentId")
    .to_string();

    // Contact onto the student zone: no mapping, nothing changes.
    let ignored = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "roster.drop",
        json!({
            "item": { "kind": "contact", "id": contact_id },
            "target": { "zone": "studentRoster", "classId": class_id }
        }),
    );
    assert_eq!(
        ignored
            .get("outcome")
            .and_then(|o| o.get("action"))
            .and_then(|v| v.as_str()),
        Some("ignored")
    );
    assert!(ignored.get("roster").is_none());

    let card = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "roster.drop",
        json!({
            "item": { "kind": "student", "id": student_id },
            "target": { "zone": "classCard", "classId": class_id }
        }),
    );
    assert_eq!(
        card.get("outcome")
            .and_then(|o| o.get("action"))
            .and_then(|v| v.as_str()),
        Some("ignored")
    );

    let promoted = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "roster.drop",
        json!({
            "item": { "kind": "contact", "id": contact_id },
            "target": { "zone": "teacherRoster", "classId": class_id }
        }),
    );
    let outcome = promoted.get("outcome").cloned().expect("outcome");
    assert_eq!(
        outcome.get("action").and_then(|v| v.as_str()),
        Some("contactPromoted")
    );
    let teacher_id = outcome
        .get("teacherId")
        .and_then(|v| v.as_str())
        .expect("teacherId")
        .to_string();
    let roster = promoted.get("roster").cloned().expect("re-fetched roster");
    let teacher = roster
        .get("teachers")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .find(|t| t.get("id").and_then(|v| v.as_str()) == Some(teacher_id.as_str()))
        .expect("promoted teacher");
    assert_eq!(teacher.get("fullName").and_then(|v| v.as_str()), Some("Ida Moss"));
    assert_eq!(
        teacher.get("linkedContactId").and_then(|v| v.as_str()),
        Some(contact_id.as_str())
    );
    assert_eq!(
        link_count(&roster, "classTeacherLinks", &class_id, "teacherId", &teacher_id),
        1
    );

    let student_drop = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "roster.drop",
        json!({
            "item": { "kind": "student", "id": student_id },
            "target": { "zone": "studentRoster", "classId": class_id }
        }),
    );
    let roster = student_drop.get("roster").cloned().expect("roster");
    assert_eq!(
        link_count(&roster, "classStudentLinks", &class_id, "studentId", &student_id),
        1
    );

    let failed = request(
        &mut stdin,
        &mut reader,
        "9",
        "roster.drop",
        json!({
            "item": { "kind": "teacher", "id": "no-such-teacher" },
            "target": { "zone": "teacherRoster", "classId": class_id }
        }),
    );
    assert_eq!(failed.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(error_code(&failed), Some("not_found"));

    let bad = request(
        &mut stdin,
        &mut reader,
        "10",
        "roster.drop",
        json!({ "item": { "kind": "parent", "id": "x" }, "target": { "zone": "teacherRoster", "classId": class_id } }),
    );
    assert_eq!(error_code(&bad), Some("bad_params"));
}
