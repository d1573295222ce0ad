use crate::auth::AuthContext;
use crate::ipc::error::ApiError;
use crate::ipc::helpers::{db_conn, require_admin, required_str, respond};
use crate::ipc::types::{AppState, Request};
use crate::report::{CommentBand, GradingBand};
use rusqlite::Connection;
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentKind {
    ClassTeacher,
    HeadTeacher,
}

impl CommentKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "class-teacher" => Some(Self::ClassTeacher),
            "head-teacher" => Some(Self::HeadTeacher),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClassTeacher => "class-teacher",
            Self::HeadTeacher => "head-teacher",
        }
    }
}

/// Grading bands ordered descending by lower bound.
pub fn load_grading_bands(conn: &Connection, school_id: &str) -> Result<Vec<GradingBand>, ApiError> {
    let mut stmt = conn.prepare(
        "SELECT range_from, range_to, grade
         FROM grading_bands
         WHERE school_id = ?
         ORDER BY range_from DESC, rowid",
    )?;
    let bands = stmt
        .query_map([school_id], |r| {
            Ok(GradingBand {
                from: r.get(0)?,
                to: r.get(1)?,
                grade: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(bands)
}

pub fn load_comment_bands(
    conn: &Connection,
    school_id: &str,
    kind: CommentKind,
) -> Result<Vec<CommentBand>, ApiError> {
    let mut stmt = conn.prepare(
        "SELECT range_from, range_to, comment
         FROM comment_bands
         WHERE school_id = ? AND kind = ?
         ORDER BY range_from DESC, rowid",
    )?;
    let bands = stmt
        .query_map((school_id, kind.as_str()), |r| {
            Ok(CommentBand {
                from: r.get(0)?,
                to: r.get(1)?,
                comment: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(bands)
}

/// Parses `[{from, to, <label_key>}]`, checks ranges, and returns the bands
/// sorted descending by `from`.
fn parse_bands(params: &Value, label_key: &str) -> Result<Vec<(f64, f64, String)>, ApiError> {
    let Some(items) = params.get("bands").and_then(|v| v.as_array()) else {
        return Err(ApiError::bad_params("bands must be an array"));
    };
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let from = item.get("from").and_then(|v| v.as_f64());
        let to = item.get("to").and_then(|v| v.as_f64());
        let label = item
            .get(label_key)
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let (Some(from), Some(to), Some(label)) = (from, to, label) else {
            return Err(ApiError::bad_params(format!(
                "bands[{}] needs numeric from/to and a non-empty {}",
                i, label_key
            )));
        };
        if !(0.0..=100.0).contains(&from) || !(0.0..=100.0).contains(&to) || from > to {
            return Err(ApiError::bad_params(format!(
                "bands[{}] must satisfy 0 <= from <= to <= 100",
                i
            )));
        }
        out.push((from, to, label));
    }
    out.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    Ok(out)
}

/// Pairs of bands whose ranges intersect. Not an error: lookups take the first match.
fn overlap_warnings(bands: &[(f64, f64, String)]) -> Vec<String> {
    let mut out = Vec::new();
    for (i, a) in bands.iter().enumerate() {
        for b in &bands[i + 1..] {
            if a.0 <= b.1 && b.0 <= a.1 {
                out.push(format!("{} overlaps {}", a.2, b.2));
            }
        }
    }
    out
}

fn grading_get(state: &AppState, ctx: &AuthContext) -> Result<Value, ApiError> {
    let conn = db_conn(state)?;
    Ok(json!({ "bands": load_grading_bands(conn, &ctx.school_id)? }))
}

fn grading_set(state: &AppState, ctx: &AuthContext, params: &Value) -> Result<Value, ApiError> {
    require_admin(ctx)?;
    let conn = db_conn(state)?;
    let bands = parse_bands(params, "grade")?;

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM grading_bands WHERE school_id = ?",
        [&ctx.school_id],
    )?;
    for (from, to, grade) in &bands {
        tx.execute(
            "INSERT INTO grading_bands(id, school_id, range_from, range_to, grade)
             VALUES(?, ?, ?, ?, ?)",
            (Uuid::new_v4().to_string(), &ctx.school_id, from, to, grade),
        )?;
    }
    tx.commit()?;

    Ok(json!({
        "bands": load_grading_bands(conn, &ctx.school_id)?,
        "warnings": overlap_warnings(&bands),
    }))
}

fn comment_kind(params: &Value) -> Result<CommentKind, ApiError> {
    let raw = required_str(params, "kind")?;
    CommentKind::parse(&raw)
        .ok_or_else(|| ApiError::bad_params("kind must be one of: class-teacher, head-teacher"))
}

fn comments_get(state: &AppState, ctx: &AuthContext, params: &Value) -> Result<Value, ApiError> {
    let conn = db_conn(state)?;
    let kind = comment_kind(params)?;
    Ok(json!({
        "kind": kind.as_str(),
        "bands": load_comment_bands(conn, &ctx.school_id, kind)?,
    }))
}

fn comments_set(state: &AppState, ctx: &AuthContext, params: &Value) -> Result<Value, ApiError> {
    require_admin(ctx)?;
    let conn = db_conn(state)?;
    let kind = comment_kind(params)?;
    let bands = parse_bands(params, "comment")?;

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM comment_bands WHERE school_id = ? AND kind = ?",
        (&ctx.school_id, kind.as_str()),
    )?;
    for (from, to, comment) in &bands {
        tx.execute(
            "INSERT INTO comment_bands(id, school_id, kind, range_from, range_to, comment)
             VALUES(?, ?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                &ctx.school_id,
                kind.as_str(),
                from,
                to,
                comment,
            ),
        )?;
    }
    tx.commit()?;

    Ok(json!({
        "kind": kind.as_str(),
        "bands": load_comment_bands(conn, &ctx.school_id, kind)?,
        "warnings": overlap_warnings(&bands),
    }))
}

pub fn try_handle(state: &AppState, ctx: &AuthContext, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "grading.bandsGet" => grading_get(state, ctx),
        "grading.bandsSet" => grading_set(state, ctx, &req.params),
        "comments.bandsGet" => comments_get(state, ctx, &req.params),
        "comments.bandsSet" => comments_set(state, ctx, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
