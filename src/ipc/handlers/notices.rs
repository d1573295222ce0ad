use crate::auth::{AuthContext, Role};
use crate::ipc::error::ApiError;
use crate::ipc::helpers::{
    db_conn, ensure_in_school, now_rfc3339, optional_str, require_admin, required_str, respond,
};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};
use uuid::Uuid;

const AUDIENCES: [&str; 4] = ["all", "teachers", "students", "parents"];

/// The audience a role reads in addition to `all`. Admins read everything.
fn role_audience(role: Role) -> Option<&'static str> {
    match role {
        Role::Admin => None,
        Role::Teacher => Some("teachers"),
        Role::Student => Some("students"),
        Role::Parent => Some("parents"),
    }
}

fn list(state: &AppState, ctx: &AuthContext) -> Result<Value, ApiError> {
    let conn = db_conn(state)?;
    let audience = role_audience(ctx.role);
    let mut stmt = conn.prepare(
        "SELECT n.id, n.title, n.body, n.audience, n.created_at, u.name
         FROM notices n
         LEFT JOIN users u ON u.id = n.author_user_id
         WHERE n.school_id = ?1
           AND (?2 IS NULL OR n.audience = 'all' OR n.audience = ?2)
         ORDER BY n.created_at DESC, n.rowid DESC",
    )?;
    let notices = stmt
        .query_map((&ctx.school_id, audience), |r| {
            let id: String = r.get(0)?;
            let title: String = r.get(1)?;
            let body: String = r.get(2)?;
            let audience: String = r.get(3)?;
            let created_at: String = r.get(4)?;
            let author: Option<String> = r.get(5)?;
            Ok(json!({
                "id": id,
                "title": title,
                "body": body,
                "audience": audience,
                "createdAt": created_at,
                "author": author,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "notices": notices }))
}

fn create(state: &AppState, ctx: &AuthContext, params: &Value) -> Result<Value, ApiError> {
    require_admin(ctx)?;
    let conn = db_conn(state)?;
    let title = required_str(params, "title")?;
    let body = required_str(params, "body")?;
    let audience = optional_str(params, "audience")?.unwrap_or_else(|| "all".to_string());
    if !AUDIENCES.contains(&audience.as_str()) {
        return Err(ApiError::bad_params(format!(
            "audience must be one of: {}",
            AUDIENCES.join(", ")
        )));
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO notices(id, school_id, title, body, audience, author_user_id, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &ctx.school_id,
            &title,
            &body,
            &audience,
            &ctx.user_id,
            now_rfc3339(),
        ),
    )?;
    tracing::info!(notice_id = %id, audience = %audience, "notice posted");
    Ok(json!({ "noticeId": id }))
}

fn delete(state: &AppState, ctx: &AuthContext, params: &Value) -> Result<Value, ApiError> {
    require_admin(ctx)?;
    let conn = db_conn(state)?;
    let id = required_str(params, "noticeId")?;
    ensure_in_school(conn, ctx, "notices", &id, "notice")?;
    conn.execute("DELETE FROM notices WHERE id = ?", [&id])?;
    Ok(json!({ "deleted": true }))
}

pub fn try_handle(state: &AppState, ctx: &AuthContext, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "notices.list" => list(state, ctx),
        "notices.create" => create(state, ctx, &req.params),
        "notices.delete" => delete(state, ctx, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
