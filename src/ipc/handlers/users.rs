use crate::auth::{AuthContext, Role};
use crate::ipc::error::ApiError;
use crate::ipc::helpers::{
    db_conn, ensure_in_school, now_rfc3339, optional_str, require_admin, required_str, respond,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::{json, Value};
use uuid::Uuid;

fn list(state: &AppState, ctx: &AuthContext) -> Result<Value, ApiError> {
    require_admin(ctx)?;
    let conn = db_conn(state)?;
    let mut stmt = conn.prepare(
        "SELECT id, name, email, role, student_id
         FROM users
         WHERE school_id = ?
         ORDER BY name, email",
    )?;
    let users = stmt
        .query_map([&ctx.school_id], |r| {
            let id: String = r.get(0)?;
            let name: String = r.get(1)?;
            let email: String = r.get(2)?;
            let role: String = r.get(3)?;
            let student_id: Option<String> = r.get(4)?;
            Ok(json!({
                "id": id,
                "name": name,
                "email": email,
                "role": role,
                "studentId": student_id,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "users": users }))
}

fn create(state: &AppState, ctx: &AuthContext, params: &Value) -> Result<Value, ApiError> {
    require_admin(ctx)?;
    let conn = db_conn(state)?;
    let name = required_str(params, "name")?;
    let email = required_str(params, "email")?.to_ascii_lowercase();
    if !email.contains('@') {
        return Err(ApiError::bad_params("email must contain @"));
    }
    let role_raw = required_str(params, "role")?;
    let Some(role) = Role::parse(&role_raw) else {
        return Err(ApiError::bad_params(
            "role must be one of: admin, teacher, student, parent",
        ));
    };
    let student_id = optional_str(params, "studentId")?;
    match (role, &student_id) {
        (Role::Student, None) => {
            return Err(ApiError::bad_params("student users need studentId"));
        }
        (Role::Student, Some(sid)) => ensure_in_school(conn, ctx, "students", sid, "student")?,
        (_, Some(_)) => {
            return Err(ApiError::bad_params("studentId is only valid for student users"));
        }
        (_, None) => {}
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO users(id, school_id, name, email, role, student_id, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &ctx.school_id,
            &name,
            &email,
            role.as_str(),
            &student_id,
            now_rfc3339(),
        ),
    )?;
    Ok(json!({ "userId": id, "role": role.as_str() }))
}

fn link_child(state: &AppState, ctx: &AuthContext, params: &Value) -> Result<Value, ApiError> {
    require_admin(ctx)?;
    let conn = db_conn(state)?;
    let user_id = required_str(params, "userId")?;
    let student_id = required_str(params, "studentId")?;

    let role: Option<String> = conn
        .query_row(
            "SELECT role FROM users WHERE id = ? AND school_id = ?",
            (&user_id, &ctx.school_id),
            |r| r.get(0),
        )
        .optional()?;
    match role.as_deref() {
        None => return Err(ApiError::not_found("user")),
        Some("parent") => {}
        Some(_) => return Err(ApiError::bad_params("only parent users can be linked")),
    }
    ensure_in_school(conn, ctx, "students", &student_id, "student")?;

    conn.execute(
        "INSERT OR IGNORE INTO guardians(user_id, student_id) VALUES(?, ?)",
        (&user_id, &student_id),
    )?;
    Ok(json!({ "userId": user_id, "studentId": student_id }))
}

pub fn try_handle(state: &AppState, ctx: &AuthContext, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "users.list" => list(state, ctx),
        "users.create" => create(state, ctx, &req.params),
        "users.linkChild" => link_child(state, ctx, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
