use crate::auth::{self, AuthContext};
use crate::ipc::error::ApiError;
use crate::ipc::helpers::{db_conn, require_admin, required_str, respond};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::{json, Value};

const MAX_TTL_HOURS: i64 = 24 * 365;

fn whoami(state: &AppState, ctx: &AuthContext) -> Result<Value, ApiError> {
    let conn = db_conn(state)?;
    let (name, email): (String, String) = conn.query_row(
        "SELECT name, email FROM users WHERE id = ?",
        [&ctx.user_id],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    Ok(json!({
        "userId": ctx.user_id,
        "schoolId": ctx.school_id,
        "name": name,
        "email": email,
        "role": ctx.role.as_str(),
        "studentId": ctx.student_id,
        "childIds": ctx.child_ids,
    }))
}

fn issue_token(state: &AppState, ctx: &AuthContext, params: &Value) -> Result<Value, ApiError> {
    require_admin(ctx)?;
    let conn = db_conn(state)?;
    let user_id = required_str(params, "userId")?;
    let ttl_hours = match params.get("ttlHours") {
        None | Some(Value::Null) => None,
        Some(v) => {
            let h = v
                .as_i64()
                .filter(|h| (1..=MAX_TTL_HOURS).contains(h))
                .ok_or_else(|| {
                    ApiError::bad_params(format!(
                        "ttlHours must be an integer between 1 and {}",
                        MAX_TTL_HOURS
                    ))
                })?;
            Some(h)
        }
    };

    let role: Option<String> = conn
        .query_row(
            "SELECT role FROM users WHERE id = ? AND school_id = ?",
            (&user_id, &ctx.school_id),
            |r| r.get(0),
        )
        .optional()?;
    let Some(role) = role else {
        return Err(ApiError::not_found("user"));
    };

    let token = auth::issue_token(conn, &user_id, ttl_hours.map(chrono::Duration::hours))?;
    tracing::info!(user_id = %user_id, role = %role, "token issued");
    Ok(json!({ "userId": user_id, "role": role, "token": token }))
}

fn revoke(state: &AppState, ctx: &AuthContext) -> Result<Value, ApiError> {
    let conn = db_conn(state)?;
    auth::revoke(conn, &ctx.token_hash)?;
    Ok(json!({ "revoked": true }))
}

pub fn try_handle(state: &AppState, ctx: &AuthContext, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "auth.whoami" => whoami(state, ctx),
        "auth.issueToken" => issue_token(state, ctx, &req.params),
        "auth.revoke" => revoke(state, ctx),
        _ => return None,
    };
    Some(respond(req, result))
}
