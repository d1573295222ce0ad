use chrono::NaiveDate;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::Value;

use crate::auth::AuthContext;
use crate::ipc::error::{ok, ApiError};
use crate::ipc::types::{AppState, Request};

pub fn respond(req: &Request, result: Result<Value, ApiError>) -> Value {
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

pub fn db_conn(state: &AppState) -> Result<&Connection, ApiError> {
    state.db.as_ref().ok_or(ApiError::NoWorkspace)
}

pub fn required_str(params: &Value, key: &str) -> Result<String, ApiError> {
    match optional_str(params, key)? {
        Some(v) => Ok(v),
        None => Err(ApiError::bad_params(format!("missing {}", key))),
    }
}

/// Missing, null and blank all read as `None`.
pub fn optional_str(params: &Value, key: &str) -> Result<Option<String>, ApiError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let t = s.trim();
            Ok((!t.is_empty()).then(|| t.to_string()))
        }
        Some(_) => Err(ApiError::bad_params(format!("{} must be a string", key))),
    }
}

pub fn required_f64(params: &Value, key: &str) -> Result<f64, ApiError> {
    match params.get(key) {
        None | Some(Value::Null) => Err(ApiError::bad_params(format!("missing {}", key))),
        Some(v) => v
            .as_f64()
            .filter(|n| n.is_finite())
            .ok_or_else(|| ApiError::bad_params(format!("{} must be a number", key))),
    }
}

pub fn required_i64(params: &Value, key: &str) -> Result<i64, ApiError> {
    match params.get(key) {
        None | Some(Value::Null) => Err(ApiError::bad_params(format!("missing {}", key))),
        Some(v) => v
            .as_i64()
            .ok_or_else(|| ApiError::bad_params(format!("{} must be an integer", key))),
    }
}

pub fn parse_date(raw: &str, key: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::bad_params(format!("{} must be a YYYY-MM-DD date", key)))
}

pub fn required_date(params: &Value, key: &str) -> Result<NaiveDate, ApiError> {
    parse_date(&required_str(params, key)?, key)
}

pub fn optional_date(params: &Value, key: &str) -> Result<Option<NaiveDate>, ApiError> {
    optional_str(params, key)?
        .map(|s| parse_date(&s, key))
        .transpose()
}

pub fn date_key(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub fn require_admin(ctx: &AuthContext) -> Result<(), ApiError> {
    if ctx.is_admin() {
        Ok(())
    } else {
        Err(ApiError::forbidden("admin role required"))
    }
}

pub fn require_staff(ctx: &AuthContext) -> Result<(), ApiError> {
    if ctx.is_staff() {
        Ok(())
    } else {
        Err(ApiError::forbidden("admin or teacher role required"))
    }
}

/// Fails with `not_found` unless `id` names a row of `table` owned by the
/// caller's school. `table` is always a literal from the handlers.
pub fn ensure_in_school(
    conn: &Connection,
    ctx: &AuthContext,
    table: &str,
    id: &str,
    what: &str,
) -> Result<(), ApiError> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ? AND school_id = ?", table);
    let found = conn
        .query_row(&sql, (id, &ctx.school_id), |r| r.get::<_, i64>(0))
        .optional()?;
    match found {
        Some(_) => Ok(()),
        None => Err(ApiError::not_found(what)),
    }
}

/// Class id of a student in the caller's school, after checking the caller may see them.
pub fn visible_student_class(
    conn: &Connection,
    ctx: &AuthContext,
    student_id: &str,
) -> Result<String, ApiError> {
    let class_id: Option<String> = conn
        .query_row(
            "SELECT class_id FROM students WHERE id = ? AND school_id = ?",
            (student_id, &ctx.school_id),
            |r| r.get(0),
        )
        .optional()?;
    let Some(class_id) = class_id else {
        return Err(ApiError::not_found("student"));
    };
    if !ctx.can_view_student(student_id) {
        return Err(ApiError::forbidden("not allowed to view this student"));
    }
    Ok(class_id)
}

/// Column assignments gathered from an already validated patch, written with
/// a single `UPDATE` so a rejected request leaves the row untouched.
#[derive(Debug, Default)]
pub struct RowPatch {
    set_parts: Vec<String>,
    bind_values: Vec<SqlValue>,
}

impl RowPatch {
    /// `column` is always a literal from the handlers.
    pub fn set(&mut self, column: &str, value: Option<String>) {
        self.set_parts.push(format!("{} = ?", column));
        self.bind_values.push(match value {
            Some(v) => SqlValue::Text(v),
            None => SqlValue::Null,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.set_parts.is_empty()
    }

    pub fn apply(mut self, conn: &Connection, table: &str, id: &str) -> Result<usize, ApiError> {
        if self.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?",
            table,
            self.set_parts.join(", ")
        );
        self.bind_values.push(SqlValue::Text(id.to_string()));
        Ok(conn.execute(&sql, params_from_iter(self.bind_values.iter()))?)
    }
}

pub fn teacher_initials(first: &str, last: &str) -> String {
    [first, last]
        .iter()
        .filter_map(|s| s.trim().chars().next())
        .map(|c| c.to_uppercase().to_string())
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn optional_str_treats_blank_as_missing() {
        let p = json!({ "a": "  ", "b": " x ", "c": 3 });
        assert_eq!(optional_str(&p, "a").expect("a"), None);
        assert_eq!(optional_str(&p, "b").expect("b"), Some("x".to_string()));
        assert!(optional_str(&p, "c").is_err());
        assert!(required_str(&p, "zzz").is_err());
    }

    #[test]
    fn dates_must_be_iso() {
        let p = json!({ "d": "2026-02-30", "e": "2026-02-28" });
        assert!(required_date(&p, "d").is_err());
        assert_eq!(date_key(required_date(&p, "e").expect("e")), "2026-02-28");
    }

    #[test]
    fn row_patch_writes_all_columns_at_once() {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute("CREATE TABLE t(id TEXT PRIMARY KEY, a TEXT, b TEXT)", [])
            .expect("create");
        conn.execute("INSERT INTO t VALUES('x', 'a0', 'b0')", [])
            .expect("insert");

        assert_eq!(RowPatch::default().apply(&conn, "t", "x").expect("noop"), 0);

        let mut patch = RowPatch::default();
        patch.set("a", Some("a1".into()));
        patch.set("b", None);
        assert_eq!(patch.apply(&conn, "t", "x").expect("apply"), 1);
        let (a, b): (String, Option<String>) = conn
            .query_row("SELECT a, b FROM t WHERE id = 'x'", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .expect("row");
        assert_eq!(a, "a1");
        assert_eq!(b, None);
    }

    #[test]
    fn initials_from_names() {
        assert_eq!(teacher_initials("jane", "Doe"), "J.D");
        assert_eq!(teacher_initials("", "Okello"), "O");
    }
}
