use crate::auth::AuthContext;
use crate::ipc::error::ApiError;
use crate::ipc::helpers::{
    date_key, db_conn, ensure_in_school, optional_date, optional_str, parse_date, require_admin,
    required_date, required_i64, required_str, respond,
};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct TermRow {
    pub id: String,
    pub name: String,
    pub year: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl TermRow {
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "year": self.year,
            "startDate": date_key(self.start_date),
            "endDate": date_key(self.end_date),
        })
    }
}

pub fn load_term(conn: &Connection, ctx: &AuthContext, term_id: &str) -> Result<TermRow, ApiError> {
    let row: Option<(String, i64, String, String)> = conn
        .query_row(
            "SELECT name, year, start_date, end_date FROM terms WHERE id = ? AND school_id = ?",
            (term_id, &ctx.school_id),
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()?;
    let Some((name, year, start, end)) = row else {
        return Err(ApiError::not_found("term"));
    };
    Ok(TermRow {
        id: term_id.to_string(),
        name,
        year,
        start_date: parse_date(&start, "startDate")?,
        end_date: parse_date(&end, "endDate")?,
    })
}

fn check_range(start: NaiveDate, end: NaiveDate) -> Result<(), ApiError> {
    if start > end {
        return Err(ApiError::bad_params("startDate must not be after endDate"));
    }
    Ok(())
}

fn list(state: &AppState, ctx: &AuthContext) -> Result<Value, ApiError> {
    let conn = db_conn(state)?;
    let mut stmt = conn.prepare(
        "SELECT id FROM terms WHERE school_id = ? ORDER BY year DESC, start_date DESC",
    )?;
    let ids = stmt
        .query_map([&ctx.school_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    let mut terms = Vec::with_capacity(ids.len());
    for id in ids {
        terms.push(load_term(conn, ctx, &id)?.to_json());
    }
    Ok(json!({ "terms": terms }))
}

fn create(state: &AppState, ctx: &AuthContext, params: &Value) -> Result<Value, ApiError> {
    require_admin(ctx)?;
    let conn = db_conn(state)?;
    let name = required_str(params, "name")?;
    let year = required_i64(params, "year")?;
    if !(1900..=2200).contains(&year) {
        return Err(ApiError::bad_params("year out of range"));
    }
    let start = required_date(params, "startDate")?;
    let end = required_date(params, "endDate")?;
    check_range(start, end)?;

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO terms(id, school_id, name, year, start_date, end_date)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &id,
            &ctx.school_id,
            &name,
            year,
            date_key(start),
            date_key(end),
        ),
    )?;
    Ok(json!({ "termId": id }))
}

fn update(state: &AppState, ctx: &AuthContext, params: &Value) -> Result<Value, ApiError> {
    require_admin(ctx)?;
    let conn = db_conn(state)?;
    let id = required_str(params, "termId")?;
    let current = load_term(conn, ctx, &id)?;

    let name = optional_str(params, "name")?.unwrap_or(current.name);
    let year = match params.get("year") {
        None | Some(Value::Null) => current.year,
        Some(_) => required_i64(params, "year")?,
    };
    let start = optional_date(params, "startDate")?.unwrap_or(current.start_date);
    let end = optional_date(params, "endDate")?.unwrap_or(current.end_date);
    check_range(start, end)?;

    conn.execute(
        "UPDATE terms SET name = ?, year = ?, start_date = ?, end_date = ? WHERE id = ?",
        (&name, year, date_key(start), date_key(end), &id),
    )?;
    Ok(json!({ "term": load_term(conn, ctx, &id)?.to_json() }))
}

fn delete(state: &AppState, ctx: &AuthContext, params: &Value) -> Result<Value, ApiError> {
    require_admin(ctx)?;
    let conn = db_conn(state)?;
    let id = required_str(params, "termId")?;
    ensure_in_school(conn, ctx, "terms", &id, "term")?;
    let exams: i64 = conn.query_row(
        "SELECT COUNT(*) FROM exams WHERE term_id = ?",
        [&id],
        |r| r.get(0),
    )?;
    if exams > 0 {
        return Err(ApiError::Conflict(format!("term still has {} exams", exams)));
    }
    conn.execute("DELETE FROM terms WHERE id = ?", [&id])?;
    Ok(json!({ "deleted": true }))
}

pub fn try_handle(state: &AppState, ctx: &AuthContext, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "terms.list" => list(state, ctx),
        "terms.create" => create(state, ctx, &req.params),
        "terms.update" => update(state, ctx, &req.params),
        "terms.delete" => delete(state, ctx, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
