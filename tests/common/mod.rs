#![allow(dead_code)]

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

pub fn exe() -> &'static str {
    env!("CARGO_BIN_EXE_schoold")
}

/// Runs `schoold bootstrap` against `workspace` and returns the admin token.
pub fn bootstrap(workspace: &Path, school: &str, admin_email: &str) -> String {
    let out = Command::new(exe())
        .arg("--workspace")
        .arg(workspace)
        .args([
            "bootstrap",
            "--school",
            school,
            "--admin-name",
            "Head Admin",
            "--admin-email",
            admin_email,
        ])
        .env_remove("SCHOOLD_WORKSPACE")
        .output()
        .expect("run bootstrap");
    assert!(
        out.status.success(),
        "bootstrap failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    let v: Value = serde_json::from_slice(&out.stdout).expect("bootstrap json");
    v["token"].as_str().expect("token").to_string()
}

pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
    pub token: Option<String>,
}

impl Sidecar {
    pub fn spawn(workspace: Option<&Path>) -> Self {
        let mut cmd = Command::new(exe());
        if let Some(ws) = workspace {
            cmd.arg("--workspace").arg(ws);
        }
        let mut child = cmd
            .env_remove("SCHOOLD_WORKSPACE")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn schoold");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
            token: None,
        }
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn send_line(&mut self, line: &str) -> Value {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");
        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(!out.trim().is_empty(), "empty response for {}", line);
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    pub fn call_as(&mut self, token: Option<&str>, method: &str, params: Value) -> Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({
            "id": id,
            "method": method,
            "params": params,
            "token": token,
        });
        let v = self.send_line(&payload.to_string());
        assert_eq!(v.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        v
    }

    pub fn call(&mut self, method: &str, params: Value) -> Value {
        let token = self.token.clone();
        self.call_as(token.as_deref(), method, params)
    }

    pub fn ok(&mut self, method: &str, params: Value) -> Value {
        let v = self.call(method, params);
        assert_eq!(v["ok"], true, "{} failed: {}", method, v);
        v["result"].clone()
    }

    pub fn ok_as(&mut self, token: &str, method: &str, params: Value) -> Value {
        let v = self.call_as(Some(token), method, params);
        assert_eq!(v["ok"], true, "{} failed: {}", method, v);
        v["result"].clone()
    }

    /// Error code of a call that must fail.
    pub fn err_code(&mut self, method: &str, params: Value) -> String {
        let v = self.call(method, params);
        error_code(method, &v)
    }

    pub fn err_code_as(&mut self, token: Option<&str>, method: &str, params: Value) -> String {
        let v = self.call_as(token, method, params);
        error_code(method, &v)
    }
}

fn error_code(method: &str, v: &Value) -> String {
    assert_eq!(v["ok"], false, "{} unexpectedly succeeded: {}", method, v);
    v["error"]["code"].as_str().expect("error code").to_string()
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// A workspace with one bootstrapped school and a daemon holding its admin token.
pub fn admin_session(school: &str) -> (tempfile::TempDir, Sidecar) {
    let dir = tempfile::tempdir().expect("tempdir");
    let token = bootstrap(dir.path(), school, "admin@example.org");
    let sc = Sidecar::spawn(Some(dir.path())).with_token(&token);
    (dir, sc)
}

pub struct Seeded {
    pub class_id: String,
    pub term_id: String,
    pub math_id: String,
    pub english_id: String,
    pub teacher_id: String,
}

/// A class with two subjects, a term, and the standard A/B/C grading bands.
pub fn seed_class(sc: &mut Sidecar) -> Seeded {
    let teacher_id = sc.ok(
        "teachers.create",
        json!({ "firstName": "Jane", "lastName": "Doe", "email": "jane@example.org" }),
    )["teacherId"]
        .as_str()
        .expect("teacherId")
        .to_string();
    let class_id = sc.ok(
        "classes.create",
        json!({ "name": "P7 Blue", "classTeacherId": teacher_id }),
    )["classId"]
        .as_str()
        .expect("classId")
        .to_string();
    let term_id = sc.ok(
        "terms.create",
        json!({ "name": "Term 1", "year": 2026, "startDate": "2026-02-02", "endDate": "2026-04-30" }),
    )["termId"]
        .as_str()
        .expect("termId")
        .to_string();
    let math_id = sc.ok(
        "subjects.create",
        json!({ "classId": class_id, "name": "Mathematics", "teacherId": teacher_id }),
    )["subjectId"]
        .as_str()
        .expect("subjectId")
        .to_string();
    let english_id = sc.ok(
        "subjects.create",
        json!({ "classId": class_id, "name": "English" }),
    )["subjectId"]
        .as_str()
        .expect("subjectId")
        .to_string();
    sc.ok(
        "grading.bandsSet",
        json!({ "bands": [
            { "from": 90, "to": 100, "grade": "A" },
            { "from": 80, "to": 89.99, "grade": "B" },
            { "from": 0, "to": 79.99, "grade": "C" }
        ]}),
    );
    Seeded {
        class_id,
        term_id,
        math_id,
        english_id,
        teacher_id,
    }
}

pub fn add_student(sc: &mut Sidecar, class_id: &str, first: &str, last: &str) -> String {
    sc.ok(
        "students.create",
        json!({ "classId": class_id, "firstName": first, "lastName": last }),
    )["studentId"]
        .as_str()
        .expect("studentId")
        .to_string()
}

pub fn add_exam(sc: &mut Sidecar, term_id: &str, subject_id: &str, exam_type: &str, total: f64) -> String {
    sc.ok(
        "exams.create",
        json!({ "termId": term_id, "subjectId": subject_id, "examType": exam_type, "totalMarks": total }),
    )["examId"]
        .as_str()
        .expect("examId")
        .to_string()
}

pub fn record(sc: &mut Sidecar, exam_id: &str, student_id: &str, marks: f64) {
    sc.ok(
        "results.upsert",
        json!({ "examId": exam_id, "studentId": student_id, "marksObtained": marks }),
    );
}

/// Issues a token for a new user of `role` and returns it.
pub fn user_token(sc: &mut Sidecar, role: &str, email: &str, student_id: Option<&str>) -> (String, String) {
    let user_id = sc.ok(
        "users.create",
        json!({ "name": email, "email": email, "role": role, "studentId": student_id }),
    )["userId"]
        .as_str()
        .expect("userId")
        .to_string();
    let token = sc.ok("auth.issueToken", json!({ "userId": user_id }))["token"]
        .as_str()
        .expect("token")
        .to_string();
    (user_id, token)
}
