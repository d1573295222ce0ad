mod common;

use common::{bootstrap, Sidecar};
use serde_json::json;

#[test]
fn health_and_workspace_select_need_no_token() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut sc = Sidecar::spawn(None);

    let health = sc.ok("health", json!({}));
    assert!(health["version"].is_string());
    assert!(health["workspacePath"].is_null());

    // Record methods need a workspace before anything else.
    assert_eq!(sc.err_code("schools.get", json!({})), "no_workspace");

    let ws = dir.path().to_string_lossy().to_string();
    let selected = sc.ok("workspace.select", json!({ "path": ws }));
    assert_eq!(selected["workspacePath"], ws);
    assert!(dir.path().join("school.sqlite3").is_file());

    assert_eq!(sc.err_code("workspace.select", json!({})), "bad_params");
}

#[test]
fn envelope_errors_carry_code_and_status() {
    let dir = tempfile::tempdir().expect("tempdir");
    let token = bootstrap(dir.path(), "Hill View", "admin@example.org");
    let mut sc = Sidecar::spawn(Some(dir.path()));

    let bad = sc.send_line("{not json");
    assert_eq!(bad["ok"], false);
    assert_eq!(bad["error"]["code"], "bad_json");
    assert_eq!(bad["error"]["status"], 400);

    let missing = sc.call("schools.get", json!({}));
    assert_eq!(missing["error"]["code"], "unauthorized");
    assert_eq!(missing["error"]["status"], 401);

    let unknown = sc.call_as(Some("not-a-real-token"), "schools.get", json!({}));
    assert_eq!(unknown["error"]["code"], "unauthorized");

    let nope = sc.call_as(Some(&token), "timetable.build", json!({}));
    assert_eq!(nope["error"]["code"], "not_implemented");
    assert_eq!(nope["error"]["status"], 404);

    // "Bearer " prefixes are accepted.
    let bearer = format!("Bearer {}", token);
    let school = sc.ok_as(&bearer, "schools.get", json!({}));
    assert_eq!(school["school"]["name"], "Hill View");
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let (_dir, mut sc) = common::admin_session("Smoke School");
    let seeded = common::seed_class(&mut sc);
    let student = common::add_student(&mut sc, &seeded.class_id, "Amos", "Kato");

    let methods = [
        ("auth.whoami", json!({})),
        ("users.list", json!({})),
        ("schools.get", json!({})),
        ("teachers.list", json!({})),
        ("classes.list", json!({})),
        ("students.list", json!({ "classId": seeded.class_id })),
        ("terms.list", json!({})),
        ("subjects.list", json!({ "classId": seeded.class_id })),
        ("exams.list", json!({ "termId": seeded.term_id })),
        ("grading.bandsGet", json!({})),
        ("comments.bandsGet", json!({ "kind": "head-teacher" })),
        ("attendance.list", json!({ "classId": seeded.class_id, "date": "2026-02-03" })),
        ("attendance.summary", json!({ "studentId": student, "termId": seeded.term_id })),
        ("notices.list", json!({})),
        ("payments.list", json!({})),
        ("settings.reportsGet", json!({})),
        ("reports.studentTermReport", json!({ "studentId": student, "termId": seeded.term_id })),
        ("reports.classTermReport", json!({ "classId": seeded.class_id, "termId": seeded.term_id })),
    ];
    for (method, params) in methods {
        sc.ok(method, params);
    }

    sc.ok("auth.revoke", json!({}));
    assert_eq!(sc.err_code("schools.get", json!({})), "unauthorized");
}
