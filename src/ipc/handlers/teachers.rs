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
    let mut stmt = conn.prepare(
        "SELECT
           t.id, t.first_name, t.last_name, t.email, t.phone,
           (SELECT COUNT(*) FROM subjects s WHERE s.teacher_id = t.id) AS subject_count
         FROM teachers t
         WHERE t.school_id = ?
         ORDER BY t.last_name, t.first_name",
    )?;
    let teachers = stmt
        .query_map([&ctx.school_id], |r| {
            let id: String = r.get(0)?;
            let first: String = r.get(1)?;
            let last: String = r.get(2)?;
            let email: Option<String> = r.get(3)?;
            let phone: Option<String> = r.get(4)?;
            let subject_count: i64 = r.get(5)?;
            Ok(json!({
                "id": id,
                "firstName": first,
                "lastName": last,
                "email": email,
                "phone": phone,
                "subjectCount": subject_count,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "teachers": teachers }))
}

fn create(state: &AppState, ctx: &AuthContext, params: &Value) -> Result<Value, ApiError> {
    require_admin(ctx)?;
    let conn = db_conn(state)?;
    let first = required_str(params, "firstName")?;
    let last = required_str(params, "lastName")?;
    let email = optional_str(params, "email")?;
    let phone = optional_str(params, "phone")?;
    let user_id = optional_str(params, "userId")?;
    if let Some(uid) = &user_id {
        ensure_in_school(conn, ctx, "users", uid, "user")?;
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO teachers(id, school_id, first_name, last_name, email, phone, user_id)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (&id, &ctx.school_id, &first, &last, &email, &phone, &user_id),
    )?;
    Ok(json!({ "teacherId": id }))
}

fn update(state: &AppState, ctx: &AuthContext, params: &Value) -> Result<Value, ApiError> {
    require_admin(ctx)?;
    let conn = db_conn(state)?;
    let id = required_str(params, "teacherId")?;
    ensure_in_school(conn, ctx, "teachers", &id, "teacher")?;

    let mut patch = RowPatch::default();
    for (key, column) in [("firstName", "first_name"), ("lastName", "last_name")] {
        if let Some(v) = optional_str(params, key)? {
            patch.set(column, Some(v));
        }
    }
    for (key, column) in [("email", "email"), ("phone", "phone")] {
        if params.get(key).is_some() {
            patch.set(column, optional_str(params, key)?);
        }
    }
    patch.apply(conn, "teachers", &id)?;
    Ok(json!({ "teacherId": id }))
}

fn delete(state: &AppState, ctx: &AuthContext, params: &Value) -> Result<Value, ApiError> {
    require_admin(ctx)?;
    let conn = db_conn(state)?;
    let id = required_str(params, "teacherId")?;
    ensure_in_school(conn, ctx, "teachers", &id, "teacher")?;
    conn.execute("DELETE FROM teachers WHERE id = ?", [&id])?;
    Ok(json!({ "deleted": true }))
}

pub fn try_handle(state: &AppState, ctx: &AuthContext, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "teachers.list" => list(state, ctx),
        "teachers.create" => create(state, ctx, &req.params),
        "teachers.update" => update(state, ctx, &req.params),
        "teachers.delete" => delete(state, ctx, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
