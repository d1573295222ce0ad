use crate::auth::AuthContext;
use crate::ipc::error::ApiError;
use crate::ipc::helpers::{
    db_conn, ensure_in_school, optional_str, require_admin, require_staff, required_str, respond,
    RowPatch,
};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};
use uuid::Uuid;

fn list(state: &AppState, ctx: &AuthContext) -> Result<Value, ApiError> {
    require_staff(ctx)?;
    let conn = db_conn(state)?;

    // Correlated subqueries keep the counts from multiplying through joins.
    let mut stmt = conn.prepare(
        "SELECT
           c.id,
           c.name,
           c.class_teacher_id,
           (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id) AS student_count,
           (SELECT COUNT(*) FROM subjects sb WHERE sb.class_id = c.id) AS subject_count
         FROM classes c
         WHERE c.school_id = ?
         ORDER BY c.name",
    )?;
    let classes = stmt
        .query_map([&ctx.school_id], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let class_teacher_id: Option<String> = row.get(2)?;
            let student_count: i64 = row.get(3)?;
            let subject_count: i64 = row.get(4)?;
            Ok(json!({
                "id": id,
                "name": name,
                "classTeacherId": class_teacher_id,
                "studentCount": student_count,
                "subjectCount": subject_count
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "classes": classes }))
}

fn create(state: &AppState, ctx: &AuthContext, params: &Value) -> Result<Value, ApiError> {
    require_admin(ctx)?;
    let conn = db_conn(state)?;
    let name = required_str(params, "name")?;
    let class_teacher_id = optional_str(params, "classTeacherId")?;
    if let Some(tid) = &class_teacher_id {
        ensure_in_school(conn, ctx, "teachers", tid, "teacher")?;
    }

    let class_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO classes(id, school_id, name, class_teacher_id) VALUES(?, ?, ?, ?)",
        (&class_id, &ctx.school_id, &name, &class_teacher_id),
    )?;
    Ok(json!({ "classId": class_id, "name": name }))
}

fn update(state: &AppState, ctx: &AuthContext, params: &Value) -> Result<Value, ApiError> {
    require_admin(ctx)?;
    let conn = db_conn(state)?;
    let class_id = required_str(params, "classId")?;
    ensure_in_school(conn, ctx, "classes", &class_id, "class")?;

    let mut patch = RowPatch::default();
    if let Some(name) = optional_str(params, "name")? {
        patch.set("name", Some(name));
    }
    if params.get("classTeacherId").is_some() {
        let tid = optional_str(params, "classTeacherId")?;
        if let Some(t) = &tid {
            ensure_in_school(conn, ctx, "teachers", t, "teacher")?;
        }
        patch.set("class_teacher_id", tid);
    }
    patch.apply(conn, "classes", &class_id)?;
    Ok(json!({ "classId": class_id }))
}

fn delete(state: &AppState, ctx: &AuthContext, params: &Value) -> Result<Value, ApiError> {
    require_admin(ctx)?;
    let conn = db_conn(state)?;
    let class_id = required_str(params, "classId")?;
    ensure_in_school(conn, ctx, "classes", &class_id, "class")?;

    let (students, subjects): (i64, i64) = conn.query_row(
        "SELECT
           (SELECT COUNT(*) FROM students WHERE class_id = ?1),
           (SELECT COUNT(*) FROM subjects WHERE class_id = ?1)",
        [&class_id],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    if students > 0 || subjects > 0 {
        return Err(ApiError::Conflict(format!(
            "class still has {} students and {} subjects",
            students, subjects
        )));
    }
    // Attendance stays with the student; its class_id is cleared by the foreign key.
    conn.execute("DELETE FROM classes WHERE id = ?", [&class_id])?;
    Ok(json!({ "deleted": true }))
}

pub fn try_handle(state: &AppState, ctx: &AuthContext, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "classes.list" => list(state, ctx),
        "classes.create" => create(state, ctx, &req.params),
        "classes.update" => update(state, ctx, &req.params),
        "classes.delete" => delete(state, ctx, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
