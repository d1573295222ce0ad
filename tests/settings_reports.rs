mod common;

use common::admin_session;
use serde_json::json;

#[test]
fn report_settings_merge_over_defaults() {
    let (_dir, mut sc) = admin_session("Hill View");

    let defaults = sc.ok("settings.reportsGet", json!({}));
    assert_eq!(defaults["reports"]["fallbackGrade"], "F");
    assert_eq!(defaults["reports"]["missingGrade"], "N/A");
    assert_eq!(defaults["reports"]["noComment"], "No comment available");
    assert_eq!(defaults["reports"]["defaultPhases"], "midEnd");

    let updated = sc.ok(
        "settings.reportsUpdate",
        json!({ "patch": { "noComment": "See class teacher", "defaultPhases": "botMid" } }),
    );
    assert_eq!(updated["reports"]["noComment"], "See class teacher");
    assert_eq!(updated["reports"]["fallbackGrade"], "F");

    let again = sc.ok("settings.reportsGet", json!({}));
    assert_eq!(again["reports"]["defaultPhases"], "botMid");

    assert_eq!(
        sc.err_code(
            "settings.reportsUpdate",
            json!({ "patch": { "defaultPhases": "allYear" } })
        ),
        "bad_params"
    );
    assert_eq!(
        sc.err_code("settings.reportsUpdate", json!({ "patch": { "theme": "dark" } })),
        "bad_params"
    );
}

#[test]
fn saved_default_phases_drive_reports() {
    let (_dir, mut sc) = admin_session("Hill View");
    let s = common::seed_class(&mut sc);
    let student = common::add_student(&mut sc, &s.class_id, "Amos", "Kato");
    sc.ok(
        "settings.reportsUpdate",
        json!({ "patch": { "defaultPhases": "botMid", "noComment": "-" } }),
    );
    let out = sc.ok(
        "reports.studentTermReport",
        json!({ "studentId": student, "termId": s.term_id }),
    );
    assert_eq!(out["phases"], "botMid");
    assert_eq!(out["report"]["comments"]["headTeacher"], "-");
}

#[test]
fn grading_bands_replace_and_warn_on_overlap() {
    let (_dir, mut sc) = admin_session("Hill View");
    let set = sc.ok(
        "grading.bandsSet",
        json!({ "bands": [
            { "from": 0, "to": 60, "grade": "D" },
            { "from": 50, "to": 100, "grade": "A" }
        ]}),
    );
    assert_eq!(set["bands"][0]["grade"], "A");
    assert_eq!(set["warnings"].as_array().expect("warnings").len(), 1);

    sc.ok(
        "grading.bandsSet",
        json!({ "bands": [{ "from": 0, "to": 100, "grade": "P" }] }),
    );
    let got = sc.ok("grading.bandsGet", json!({}));
    assert_eq!(got["bands"], json!([{ "from": 0.0, "to": 100.0, "grade": "P" }]));

    assert_eq!(
        sc.err_code("comments.bandsSet", json!({ "kind": "principal", "bands": [] })),
        "bad_params"
    );
}
