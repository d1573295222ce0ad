use crate::auth::{AuthContext, Role};
use crate::ipc::error::ApiError;
use crate::ipc::helpers::{
    date_key, db_conn, ensure_in_school, now_rfc3339, optional_date, optional_str,
    require_admin, require_staff, required_str, respond, visible_student_class, RowPatch,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, Row};
use serde_json::{json, Value};
use uuid::Uuid;

const STUDENT_COLUMNS: &str = "id, class_id, first_name, last_name, admission_no, gender,
    birth_date, discipline, time_management, smartness, attendance_remarks";

const CONDUCT_FIELDS: [(&str, &str); 4] = [
    ("discipline", "discipline"),
    ("timeManagement", "time_management"),
    ("smartness", "smartness"),
    ("attendanceRemarks", "attendance_remarks"),
];

fn student_row_json(r: &Row<'_>) -> rusqlite::Result<Value> {
    let id: String = r.get(0)?;
    let class_id: String = r.get(1)?;
    let first: String = r.get(2)?;
    let last: String = r.get(3)?;
    let admission_no: Option<String> = r.get(4)?;
    let gender: Option<String> = r.get(5)?;
    let birth_date: Option<String> = r.get(6)?;
    let discipline: Option<String> = r.get(7)?;
    let time_management: Option<String> = r.get(8)?;
    let smartness: Option<String> = r.get(9)?;
    let attendance_remarks: Option<String> = r.get(10)?;
    Ok(json!({
        "id": id,
        "classId": class_id,
        "firstName": first,
        "lastName": last,
        "displayName": format!("{}, {}", last, first),
        "admissionNo": admission_no,
        "gender": gender,
        "birthDate": birth_date,
        "conduct": {
            "discipline": discipline,
            "timeManagement": time_management,
            "smartness": smartness,
            "attendanceRemarks": attendance_remarks,
        }
    }))
}

fn query_students(conn: &Connection, where_sql: &str, args: &[&str]) -> Result<Vec<Value>, ApiError> {
    let sql = format!(
        "SELECT {} FROM students WHERE {} ORDER BY last_name, first_name",
        STUDENT_COLUMNS, where_sql
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(args.iter()), student_row_json)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn list(state: &AppState, ctx: &AuthContext, params: &Value) -> Result<Value, ApiError> {
    let conn = db_conn(state)?;
    let class_id = optional_str(params, "classId")?;

    let students = match ctx.role {
        Role::Admin | Role::Teacher => match &class_id {
            Some(cid) => {
                ensure_in_school(conn, ctx, "classes", cid, "class")?;
                query_students(conn, "school_id = ? AND class_id = ?", &[ctx.school_id.as_str(), cid.as_str()])?
            }
            None => query_students(conn, "school_id = ?", &[ctx.school_id.as_str()])?,
        },
        Role::Student => match &ctx.student_id {
            Some(sid) => query_students(conn, "school_id = ? AND id = ?", &[ctx.school_id.as_str(), sid.as_str()])?,
            None => Vec::new(),
        },
        Role::Parent => {
            let mut out = Vec::new();
            for sid in &ctx.child_ids {
                out.extend(query_students(
                    conn,
                    "school_id = ? AND id = ?",
                    &[ctx.school_id.as_str(), sid.as_str()],
                )?);
            }
            out
        }
    };
    Ok(json!({ "students": students }))
}

fn get(state: &AppState, ctx: &AuthContext, params: &Value) -> Result<Value, ApiError> {
    let conn = db_conn(state)?;
    let student_id = required_str(params, "studentId")?;
    visible_student_class(conn, ctx, &student_id)?;
    let mut rows = query_students(conn, "id = ?", &[student_id.as_str()])?;
    match rows.pop() {
        Some(student) => Ok(json!({ "student": student })),
        None => Err(ApiError::not_found("student")),
    }
}

fn create(state: &AppState, ctx: &AuthContext, params: &Value) -> Result<Value, ApiError> {
    require_admin(ctx)?;
    let conn = db_conn(state)?;
    let class_id = required_str(params, "classId")?;
    ensure_in_school(conn, ctx, "classes", &class_id, "class")?;
    let first = required_str(params, "firstName")?;
    let last = required_str(params, "lastName")?;
    let admission_no = optional_str(params, "admissionNo")?;
    let gender = optional_str(params, "gender")?;
    let birth_date = optional_date(params, "birthDate")?.map(date_key);

    let mut conduct = RowPatch::default();
    for (key, column) in CONDUCT_FIELDS {
        if let Some(v) = optional_str(params, key)? {
            conduct.set(column, Some(v));
        }
    }

    let id = Uuid::new_v4().to_string();
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO students(id, school_id, class_id, first_name, last_name, admission_no,
                              gender, birth_date, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &ctx.school_id,
            &class_id,
            &first,
            &last,
            &admission_no,
            &gender,
            &birth_date,
            now_rfc3339(),
        ),
    )?;
    conduct.apply(&tx, "students", &id)?;
    tx.commit()?;
    Ok(json!({ "studentId": id }))
}

/// Admins may change anything; teachers only the conduct fields.
fn update(state: &AppState, ctx: &AuthContext, params: &Value) -> Result<Value, ApiError> {
    require_staff(ctx)?;
    let conn = db_conn(state)?;
    let student_id = required_str(params, "studentId")?;
    ensure_in_school(conn, ctx, "students", &student_id, "student")?;

    let identity_keys = [
        "classId",
        "firstName",
        "lastName",
        "admissionNo",
        "gender",
        "birthDate",
    ];
    let touches_identity = identity_keys.iter().any(|k| params.get(*k).is_some());
    if touches_identity && !ctx.is_admin() {
        return Err(ApiError::forbidden("teachers may only update conduct fields"));
    }

    // Everything is validated before the single write below.
    let mut patch = RowPatch::default();
    if let Some(class_id) = optional_str(params, "classId")? {
        ensure_in_school(conn, ctx, "classes", &class_id, "class")?;
        patch.set("class_id", Some(class_id));
    }
    for (key, column) in [("firstName", "first_name"), ("lastName", "last_name")] {
        if let Some(v) = optional_str(params, key)? {
            patch.set(column, Some(v));
        }
    }
    for (key, column) in [("admissionNo", "admission_no"), ("gender", "gender")] {
        if params.get(key).is_some() {
            patch.set(column, optional_str(params, key)?);
        }
    }
    if params.get("birthDate").is_some() {
        patch.set("birth_date", optional_date(params, "birthDate")?.map(date_key));
    }
    // Clearing a conduct field brings back the report default.
    for (key, column) in CONDUCT_FIELDS {
        if params.get(key).is_some() {
            patch.set(column, optional_str(params, key)?);
        }
    }
    patch.apply(conn, "students", &student_id)?;

    let mut rows = query_students(conn, "id = ?", &[student_id.as_str()])?;
    match rows.pop() {
        Some(student) => Ok(json!({ "student": student })),
        None => Err(ApiError::not_found("student")),
    }
}

fn delete(state: &AppState, ctx: &AuthContext, params: &Value) -> Result<Value, ApiError> {
    require_admin(ctx)?;
    let conn = db_conn(state)?;
    let student_id = required_str(params, "studentId")?;
    ensure_in_school(conn, ctx, "students", &student_id, "student")?;
    // Results, attendance, payments and guardian links cascade.
    conn.execute("DELETE FROM students WHERE id = ?", [&student_id])?;
    Ok(json!({ "deleted": true }))
}

pub fn try_handle(state: &AppState, ctx: &AuthContext, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "students.list" => list(state, ctx, &req.params),
        "students.get" => get(state, ctx, &req.params),
        "students.create" => create(state, ctx, &req.params),
        "students.update" => update(state, ctx, &req.params),
        "students.delete" => delete(state, ctx, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
