use crate::auth::{AuthContext, Role};
use crate::ipc::error::ApiError;
use crate::ipc::helpers::{
    db_conn, ensure_in_school, optional_str, require_admin, required_str, respond,
    teacher_initials, RowPatch,
};
use crate::ipc::types::{AppState, Request};
use crate::report::SubjectInfo;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use uuid::Uuid;

/// Subjects of a class in report order, with the subject teacher's initials.
pub fn load_subjects(conn: &Connection, class_id: &str) -> Result<Vec<SubjectInfo>, ApiError> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.name, t.first_name, t.last_name
         FROM subjects s
         LEFT JOIN teachers t ON t.id = s.teacher_id
         WHERE s.class_id = ?
         ORDER BY s.name",
    )?;
    let subjects = stmt
        .query_map([class_id], |r| {
            let first: Option<String> = r.get(2)?;
            let last: Option<String> = r.get(3)?;
            Ok(SubjectInfo {
                id: r.get(0)?,
                name: r.get(1)?,
                teacher_initials: match (first, last) {
                    (Some(f), Some(l)) => Some(teacher_initials(&f, &l)),
                    _ => None,
                },
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(subjects)
}

fn can_view_class(conn: &Connection, ctx: &AuthContext, class_id: &str) -> Result<bool, ApiError> {
    let visible: Vec<&String> = match ctx.role {
        Role::Admin | Role::Teacher => return Ok(true),
        Role::Student => ctx.student_id.iter().collect(),
        Role::Parent => ctx.child_ids.iter().collect(),
    };
    for sid in visible {
        let cid: Option<String> = conn
            .query_row("SELECT class_id FROM students WHERE id = ?", [sid], |r| {
                r.get(0)
            })
            .optional()?;
        if cid.as_deref() == Some(class_id) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn list(state: &AppState, ctx: &AuthContext, params: &Value) -> Result<Value, ApiError> {
    let conn = db_conn(state)?;
    let class_id = required_str(params, "classId")?;
    ensure_in_school(conn, ctx, "classes", &class_id, "class")?;
    if !can_view_class(conn, ctx, &class_id)? {
        return Err(ApiError::forbidden("not allowed to view this class"));
    }

    let mut stmt = conn.prepare(
        "SELECT s.id, s.name, s.code, s.teacher_id, t.first_name, t.last_name
         FROM subjects s
         LEFT JOIN teachers t ON t.id = s.teacher_id
         WHERE s.class_id = ?
         ORDER BY s.name",
    )?;
    let subjects = stmt
        .query_map([&class_id], |r| {
            let id: String = r.get(0)?;
            let name: String = r.get(1)?;
            let code: Option<String> = r.get(2)?;
            let teacher_id: Option<String> = r.get(3)?;
            let first: Option<String> = r.get(4)?;
            let last: Option<String> = r.get(5)?;
            let teacher_name = match (first, last) {
                (Some(f), Some(l)) => Some(format!("{} {}", f, l)),
                _ => None,
            };
            Ok(json!({
                "id": id,
                "name": name,
                "code": code,
                "teacherId": teacher_id,
                "teacherName": teacher_name,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "subjects": subjects }))
}

fn create(state: &AppState, ctx: &AuthContext, params: &Value) -> Result<Value, ApiError> {
    require_admin(ctx)?;
    let conn = db_conn(state)?;
    let class_id = required_str(params, "classId")?;
    ensure_in_school(conn, ctx, "classes", &class_id, "class")?;
    let name = required_str(params, "name")?;
    let code = optional_str(params, "code")?;
    let teacher_id = optional_str(params, "teacherId")?;
    if let Some(tid) = &teacher_id {
        ensure_in_school(conn, ctx, "teachers", tid, "teacher")?;
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO subjects(id, school_id, class_id, name, code, teacher_id)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&id, &ctx.school_id, &class_id, &name, &code, &teacher_id),
    )?;
    Ok(json!({ "subjectId": id }))
}

fn update(state: &AppState, ctx: &AuthContext, params: &Value) -> Result<Value, ApiError> {
    require_admin(ctx)?;
    let conn = db_conn(state)?;
    let id = required_str(params, "subjectId")?;
    ensure_in_school(conn, ctx, "subjects", &id, "subject")?;

    let mut patch = RowPatch::default();
    if let Some(name) = optional_str(params, "name")? {
        patch.set("name", Some(name));
    }
    if params.get("code").is_some() {
        patch.set("code", optional_str(params, "code")?);
    }
    if params.get("teacherId").is_some() {
        let tid = optional_str(params, "teacherId")?;
        if let Some(t) = &tid {
            ensure_in_school(conn, ctx, "teachers", t, "teacher")?;
        }
        patch.set("teacher_id", tid);
    }
    patch.apply(conn, "subjects", &id)?;
    Ok(json!({ "subjectId": id }))
}

fn delete(state: &AppState, ctx: &AuthContext, params: &Value) -> Result<Value, ApiError> {
    require_admin(ctx)?;
    let conn = db_conn(state)?;
    let id = required_str(params, "subjectId")?;
    ensure_in_school(conn, ctx, "subjects", &id, "subject")?;
    let exams: i64 = conn.query_row(
        "SELECT COUNT(*) FROM exams WHERE subject_id = ?",
        [&id],
        |r| r.get(0),
    )?;
    if exams > 0 {
        return Err(ApiError::Conflict(format!(
            "subject still has {} exams",
            exams
        )));
    }
    conn.execute("DELETE FROM subjects WHERE id = ?", [&id])?;
    Ok(json!({ "deleted": true }))
}

pub fn try_handle(state: &AppState, ctx: &AuthContext, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "subjects.list" => list(state, ctx, &req.params),
        "subjects.create" => create(state, ctx, &req.params),
        "subjects.update" => update(state, ctx, &req.params),
        "subjects.delete" => delete(state, ctx, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
