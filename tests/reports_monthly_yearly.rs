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

fn created_id(res: serde_json::Value, key: &str) -> String {
    res.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("missing {key}: {res}"))
        .to_string()
}

struct Fixture {
    k1: String,
    ann: String,
    bo: String,
    cy: String,
}

/// K-1: Ann (present, present, late, absent) and Cy (present).
/// Pre-K: Bo (absent, absent). One extra record for Ann in February.
fn seed(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) -> Fixture {
    let k1 = created_id(
        request_ok(stdin, reader, "c1", "classes.create", json!({ "name": "K-1" })),
        "classId",
    );
    let pre_k = created_id(
        request_ok(stdin, reader, "c2", "classes.create", json!({ "name": "Pre-K" })),
        "classId",
    );
    let mut student = |name: &str| {
        created_id(
            request_ok(
                stdin,
                reader,
                "s",
                "students.create",
                json!({
                    "fullName": name,
                    "dateOfBirth": "2018-05-05",
                    "guardianName": "Guardian",
                    "guardianPhone": "555-0100"
                }),
            ),
            "studentId",
        )
    };
    let bo = student("Bo Diaz");
    let ann = student("Ann Lee");
    let cy = student("Cy Ott");

    let marks = [
        (&k1, &ann, "2024-03-04", "present"),
        (&k1, &ann, "2024-03-05", "present"),
        (&k1, &ann, "2024-03-06", "late"),
        (&k1, &ann, "2024-03-07", "absent"),
        (&k1, &cy, "2024-03-04", "present"),
        (&pre_k, &bo, "2024-03-04", "absent"),
        (&pre_k, &bo, "2024-03-05", "absent"),
        (&k1, &ann, "2024-02-20", "present"),
    ];
    for (class_id, student_id, date, status) in marks {
        let _ = request_ok(
            stdin,
            reader,
            "m",
            "attendance.setStatus",
            json!({ "classId": class_id, "studentId": student_id, "date": date, "status": status }),
        );
    }
    Fixture { k1, ann, bo, cy }
}

#[test]
fn monthly_report_counts_orphans_but_skips_them_in_student_summary() {
    let workspace = temp_dir("attendanced-reports-monthly");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let fx = seed(&mut stdin, &mut reader);
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.delete",
        json!({ "studentId": fx.cy }),
    );
    let deleted_again = request(
        &mut stdin,
        &mut reader,
        "2b",
        "students.delete",
        json!({ "studentId": fx.cy }),
    );
    assert_eq!(error_code(&deleted_again), Some("not_found"));

    let report = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "reports.fetch",
        json!({ "mode": "monthly", "year": 2024, "month": 3 }),
    );
    assert_eq!(report.get("period").and_then(|v| v.as_str()), Some("March 2024"));
    assert_eq!(report.get("start").and_then(|v| v.as_str()), Some("2024-03-01"));
    assert_eq!(report.get("end").and_then(|v| v.as_str()), Some("2024-03-31"));

    let overall = report.get("overall").cloned().unwrap_or_default();
    assert_eq!(overall.get("totalRecords").and_then(|v| v.as_u64()), Some(7));
    assert_eq!(overall.get("uniqueStudents").and_then(|v| v.as_u64()), Some(3));
    assert_eq!(overall.get("daysWithAttendance").and_then(|v| v.as_u64()), Some(4));
    assert_eq!(overall.get("attendanceRate").and_then(|v| v.as_u64()), Some(57));

    let classes = report
        .get("classSummary")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    assert_eq!(classes.len(), 2);
    assert_eq!(classes[0].get("classId").and_then(|v| v.as_str()), Some(fx.k1.as_str()));
    assert_eq!(classes[0].get("totalRecords").and_then(|v| v.as_u64()), Some(5));
    assert_eq!(classes[0].get("attendanceRate").and_then(|v| v.as_u64()), Some(80));
    assert_eq!(classes[1].get("className").and_then(|v| v.as_str()), Some("Pre-K"));
    assert_eq!(classes[1].get("attendanceRate").and_then(|v| v.as_u64()), Some(0));

    let students = report
        .get("studentSummary")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    let ids: Vec<&str> = students
        .iter()
        .filter_map(|s| s.get("studentId").and_then(|v| v.as_str()))
        .collect();
    assert_eq!(ids, vec![fx.ann.as_str(), fx.bo.as_str()]);
    assert_eq!(students[0].get("attendanceRate").and_then(|v| v.as_u64()), Some(75));

    let days = report
        .get("dailyBreakdown")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    assert_eq!(days.len(), 4);
    assert_eq!(days[0].get("date").and_then(|v| v.as_str()), Some("2024-03-04"));
    assert_eq!(days[0].get("total").and_then(|v| v.as_u64()), Some(3));
    assert!(report.get("monthlyBreakdown").is_none());
}

#[test]
fn yearly_report_has_twelve_buckets() {
    let workspace = temp_dir("attendanced-reports-yearly");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = seed(&mut stdin, &mut reader);

    let report = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "reports.fetch",
        json!({ "mode": "yearly", "year": 2024 }),
    );
    assert_eq!(report.get("period").and_then(|v| v.as_str()), Some("2024"));
    assert_eq!(
        report
            .get("overall")
            .and_then(|o| o.get("totalRecords"))
            .and_then(|v| v.as_u64()),
        Some(8)
    );
    let buckets = report
        .get("monthlyBreakdown")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    assert_eq!(buckets.len(), 12);
    assert_eq!(buckets[0].get("label").and_then(|v| v.as_str()), Some("Jan"));
    assert_eq!(buckets[0].get("total").and_then(|v| v.as_u64()), Some(0));
    assert_eq!(buckets[0].get("attendanceRate").and_then(|v| v.as_u64()), Some(0));
    assert_eq!(buckets[1].get("total").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(buckets[2].get("total").and_then(|v| v.as_u64()), Some(7));
    assert!(report.get("dailyBreakdown").is_none());

    let empty_year = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "reports.fetch",
        json!({ "mode": "yearly", "year": 2023 }),
    );
    assert_eq!(
        empty_year
            .get("overall")
            .and_then(|o| o.get("attendanceRate"))
            .and_then(|v| v.as_u64()),
        Some(0)
    );

    let bad_month = request(
        &mut stdin,
        &mut reader,
        "4",
        "reports.fetch",
        json!({ "mode": "monthly", "year": 2024, "month": 13 }),
    );
    assert_eq!(error_code(&bad_month), Some("bad_params"));

    // 2^32 + 3 must not wrap around to March.
    let wrapped_month = request(
        &mut stdin,
        &mut reader,
        "5",
        "reports.fetch",
        json!({ "mode": "monthly", "year": 2024, "month": 4294967299u64 }),
    );
    assert_eq!(error_code(&wrapped_month), Some("bad_params"));
}

#[test]
fn export_csv_writes_student_rows() {
    let workspace = temp_dir("attendanced-reports-export");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let fx = seed(&mut stdin, &mut reader);
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.delete",
        json!({ "studentId": fx.cy }),
    );

    let out_path = workspace.join("exports").join("march.csv");
    let res = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "reports.exportCsv",
        json!({ "mode": "monthly", "year": 2024, "month": 3, "outPath": out_path.to_string_lossy() }),
    );
    assert_eq!(
        res.get("fileName").and_then(|v| v.as_str()),
        Some("attendance-report-March_2024.csv")
    );
    assert_eq!(res.get("rowsExported").and_then(|v| v.as_u64()), Some(2));

    let written = std::fs::read_to_string(&out_path).expect("read csv");
    assert_eq!(res.get("csv").and_then(|v| v.as_str()), Some(written.as_str()));
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(
        lines,
        vec![
            "Attendance Report - March 2024",
            "Overall Attendance Rate,57%",
            "Total Records,7",
            "Unique Students,3",
            "",
            "Student Name,Class,Total Days,Present,Late,Absent,Attendance Rate",
            "Ann Lee,K-1,4,2,1,1,75%",
            "Bo Diaz,Pre-K,2,0,0,2,0%",
        ]
    );

    let yearly = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "reports.exportCsv",
        json!({ "mode": "yearly", "year": 2024 }),
    );
    assert_eq!(
        yearly.get("fileName").and_then(|v| v.as_str()),
        Some("attendance-report-2024.csv")
    );
    assert!(yearly.get("path").map(|v| v.is_null()).unwrap_or(false));
}
