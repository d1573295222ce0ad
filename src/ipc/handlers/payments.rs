use crate::auth::AuthContext;
use crate::ipc::error::ApiError;
use crate::ipc::helpers::{
    date_key, db_conn, ensure_in_school, optional_date, optional_str, require_admin,
    required_f64, required_str, respond, visible_student_class,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Value};
use uuid::Uuid;

fn payment_rows(
    conn: &Connection,
    school_id: &str,
    student_id: Option<&str>,
) -> Result<Vec<Value>, ApiError> {
    let mut stmt = conn.prepare(
        "SELECT p.id, p.student_id, st.last_name, st.first_name, p.term_id, p.amount,
                p.method, p.reference, p.paid_on
         FROM payments p
         JOIN students st ON st.id = p.student_id
         WHERE p.school_id = ?1 AND (?2 IS NULL OR p.student_id = ?2)
         ORDER BY p.paid_on DESC, p.rowid DESC",
    )?;
    let rows = stmt
        .query_map((school_id, student_id), |r| {
            let id: String = r.get(0)?;
            let student_id: String = r.get(1)?;
            let last: String = r.get(2)?;
            let first: String = r.get(3)?;
            let term_id: Option<String> = r.get(4)?;
            let amount: f64 = r.get(5)?;
            let method: String = r.get(6)?;
            let reference: Option<String> = r.get(7)?;
            let paid_on: String = r.get(8)?;
            Ok(json!({
                "id": id,
                "studentId": student_id,
                "displayName": format!("{}, {}", last, first),
                "termId": term_id,
                "amount": amount,
                "method": method,
                "reference": reference,
                "paidOn": paid_on,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn list(state: &AppState, ctx: &AuthContext, params: &Value) -> Result<Value, ApiError> {
    let conn = db_conn(state)?;
    let student_id = optional_str(params, "studentId")?;
    let payments = match &student_id {
        Some(sid) => {
            visible_student_class(conn, ctx, sid)?;
            payment_rows(conn, &ctx.school_id, Some(sid))?
        }
        None if ctx.is_staff() => payment_rows(conn, &ctx.school_id, None)?,
        None => {
            // Students and parents get the payments of every student they can see.
            let mut visible: Vec<String> = ctx.student_id.iter().cloned().collect();
            visible.extend(ctx.child_ids.iter().cloned());
            let mut out = Vec::new();
            for sid in &visible {
                out.extend(payment_rows(conn, &ctx.school_id, Some(sid))?);
            }
            out
        }
    };
    let total: f64 = payments
        .iter()
        .filter_map(|p| p.get("amount").and_then(|v| v.as_f64()))
        .sum();
    Ok(json!({ "payments": payments, "total": total }))
}

fn record(state: &AppState, ctx: &AuthContext, params: &Value) -> Result<Value, ApiError> {
    require_admin(ctx)?;
    let conn = db_conn(state)?;
    let student_id = required_str(params, "studentId")?;
    ensure_in_school(conn, ctx, "students", &student_id, "student")?;
    let term_id = optional_str(params, "termId")?;
    if let Some(tid) = &term_id {
        ensure_in_school(conn, ctx, "terms", tid, "term")?;
    }
    let amount = required_f64(params, "amount")?;
    if amount <= 0.0 {
        return Err(ApiError::bad_params("amount must be positive"));
    }
    let method = required_str(params, "method")?;
    let reference = optional_str(params, "reference")?;
    let paid_on = optional_date(params, "paidOn")?
        .unwrap_or_else(|| chrono::Local::now().date_naive());

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO payments(id, school_id, student_id, term_id, amount, method, reference, paid_on, recorded_by)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &ctx.school_id,
            &student_id,
            &term_id,
            amount,
            &method,
            &reference,
            date_key(paid_on),
            &ctx.user_id,
        ),
    )?;
    tracing::info!(payment_id = %id, student_id = %student_id, amount, "payment recorded");
    Ok(json!({ "paymentId": id, "paidOn": date_key(paid_on) }))
}

pub fn try_handle(state: &AppState, ctx: &AuthContext, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "payments.list" => list(state, ctx, &req.params),
        "payments.record" => record(state, ctx, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
