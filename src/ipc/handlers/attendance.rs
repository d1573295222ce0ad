use crate::auth::AuthContext;
use crate::ipc::error::ApiError;
use crate::ipc::helpers::{
    date_key, db_conn, ensure_in_school, require_staff, required_date, required_str, respond,
    visible_student_class,
};
use crate::ipc::types::{AppState, Request};
use crate::report::{self, AttendanceStatus};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use std::collections::HashMap;
use uuid::Uuid;

use super::terms::{self, TermRow};

/// Attendance statuses for one student between the term's start and end dates, inclusive.
pub fn load_term_attendance(
    conn: &Connection,
    student_id: &str,
    term: &TermRow,
) -> Result<Vec<AttendanceStatus>, ApiError> {
    let mut stmt = conn.prepare(
        "SELECT status FROM attendance
         WHERE student_id = ? AND date >= ? AND date <= ?
         ORDER BY date",
    )?;
    let raw = stmt
        .query_map(
            (
                student_id,
                date_key(term.start_date),
                date_key(term.end_date),
            ),
            |r| r.get::<_, String>(0),
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(raw
        .iter()
        .filter_map(|s| AttendanceStatus::parse(s))
        .collect())
}

fn mark(state: &AppState, ctx: &AuthContext, params: &Value) -> Result<Value, ApiError> {
    require_staff(ctx)?;
    let conn = db_conn(state)?;
    let class_id = required_str(params, "classId")?;
    ensure_in_school(conn, ctx, "classes", &class_id, "class")?;
    let date = date_key(required_date(params, "date")?);
    let Some(records) = params.get("records").and_then(|v| v.as_array()) else {
        return Err(ApiError::bad_params("records must be an array"));
    };

    let mut parsed: Vec<(String, AttendanceStatus)> = Vec::with_capacity(records.len());
    for (i, rec) in records.iter().enumerate() {
        let student_id = rec.get("studentId").and_then(|v| v.as_str());
        let status = rec
            .get("status")
            .and_then(|v| v.as_str())
            .and_then(AttendanceStatus::parse);
        let (Some(student_id), Some(status)) = (student_id, status) else {
            return Err(ApiError::bad_params(format!(
                "records[{}] needs studentId and status (Present, Absent or Late)",
                i
            )));
        };
        let in_class: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM students WHERE id = ? AND class_id = ?",
                (student_id, &class_id),
                |r| r.get(0),
            )
            .optional()?;
        if in_class.is_none() {
            return Err(ApiError::bad_params(format!(
                "records[{}]: student is not in this class",
                i
            )));
        }
        parsed.push((student_id.to_string(), status));
    }

    let tx = conn.unchecked_transaction()?;
    for (student_id, status) in &parsed {
        tx.execute(
            "INSERT INTO attendance(id, school_id, class_id, student_id, date, status)
             VALUES(?, ?, ?, ?, ?, ?)
             ON CONFLICT(student_id, date) DO UPDATE SET
               status = excluded.status,
               class_id = excluded.class_id",
            (
                Uuid::new_v4().to_string(),
                &ctx.school_id,
                &class_id,
                student_id,
                &date,
                status.as_str(),
            ),
        )?;
    }
    tx.commit()?;

    Ok(json!({ "classId": class_id, "date": date, "marked": parsed.len() }))
}

fn list(state: &AppState, ctx: &AuthContext, params: &Value) -> Result<Value, ApiError> {
    require_staff(ctx)?;
    let conn = db_conn(state)?;
    let class_id = required_str(params, "classId")?;
    ensure_in_school(conn, ctx, "classes", &class_id, "class")?;
    let date = date_key(required_date(params, "date")?);

    let mut stmt = conn.prepare(
        "SELECT st.id, st.last_name, st.first_name, a.status
         FROM students st
         LEFT JOIN attendance a ON a.student_id = st.id AND a.date = ?
         WHERE st.class_id = ?
         ORDER BY st.last_name, st.first_name",
    )?;
    let rows = stmt
        .query_map((&date, &class_id), |r| {
            let id: String = r.get(0)?;
            let last: String = r.get(1)?;
            let first: String = r.get(2)?;
            let status: Option<String> = r.get(3)?;
            Ok(json!({
                "studentId": id,
                "displayName": format!("{}, {}", last, first),
                "status": status,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "classId": class_id, "date": date, "students": rows }))
}

fn summary(state: &AppState, ctx: &AuthContext, params: &Value) -> Result<Value, ApiError> {
    let conn = db_conn(state)?;
    let student_id = required_str(params, "studentId")?;
    let term_id = required_str(params, "termId")?;
    visible_student_class(conn, ctx, &student_id)?;
    let term = terms::load_term(conn, ctx, &term_id)?;

    let records = load_term_attendance(conn, &student_id, &term)?;
    let mut counts: HashMap<&'static str, usize> = HashMap::new();
    for s in &records {
        *counts.entry(s.as_str()).or_insert(0) += 1;
    }
    Ok(json!({
        "studentId": student_id,
        "term": term.to_json(),
        "present": counts.get("Present").copied().unwrap_or(0),
        "absent": counts.get("Absent").copied().unwrap_or(0),
        "late": counts.get("Late").copied().unwrap_or(0),
        "totalDays": records.len(),
        "percentage": report::attendance_percentage(&records),
    }))
}

pub fn try_handle(state: &AppState, ctx: &AuthContext, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "attendance.mark" => mark(state, ctx, &req.params),
        "attendance.list" => list(state, ctx, &req.params),
        "attendance.summary" => summary(state, ctx, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
