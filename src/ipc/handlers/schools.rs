use crate::auth::{self, AuthContext};
use crate::ipc::error::ApiError;
use crate::ipc::helpers::{db_conn, now_rfc3339, optional_str, require_admin, respond, RowPatch};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Bootstrapped {
    pub school_id: String,
    pub user_id: String,
    pub token: String,
}

/// Creates a school with its first admin user and returns an admin token.
pub fn bootstrap_school(
    conn: &mut Connection,
    school_name: &str,
    admin_name: &str,
    admin_email: &str,
) -> anyhow::Result<Bootstrapped> {
    let school_name = school_name.trim();
    let admin_name = admin_name.trim();
    let admin_email = admin_email.trim().to_ascii_lowercase();
    if school_name.is_empty() || admin_name.is_empty() || !admin_email.contains('@') {
        anyhow::bail!("school name, admin name and a valid admin email are required");
    }

    let tx = conn.transaction()?;
    let school_id = Uuid::new_v4().to_string();
    let user_id = Uuid::new_v4().to_string();
    let now = now_rfc3339();
    tx.execute(
        "INSERT INTO schools(id, name, created_at) VALUES(?, ?, ?)",
        (&school_id, school_name, &now),
    )?;
    tx.execute(
        "INSERT INTO users(id, school_id, name, email, role, created_at)
         VALUES(?, ?, ?, ?, 'admin', ?)",
        (&user_id, &school_id, admin_name, &admin_email, &now),
    )?;
    let token = auth::issue_token(&tx, &user_id, None)?;
    tx.commit()?;

    Ok(Bootstrapped {
        school_id,
        user_id,
        token,
    })
}

fn school_json(conn: &Connection, school_id: &str) -> Result<Value, ApiError> {
    let (name, address, motto): (String, Option<String>, Option<String>) = conn.query_row(
        "SELECT name, address, motto FROM schools WHERE id = ?",
        [school_id],
        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
    )?;
    Ok(json!({
        "id": school_id,
        "name": name,
        "address": address,
        "motto": motto,
    }))
}

fn get(state: &AppState, ctx: &AuthContext) -> Result<Value, ApiError> {
    let conn = db_conn(state)?;
    Ok(json!({ "school": school_json(conn, &ctx.school_id)? }))
}

fn update(state: &AppState, ctx: &AuthContext, params: &Value) -> Result<Value, ApiError> {
    require_admin(ctx)?;
    let conn = db_conn(state)?;
    let mut patch = RowPatch::default();
    if let Some(name) = optional_str(params, "name")? {
        patch.set("name", Some(name));
    }
    // address and motto may be cleared with an explicit null.
    for key in ["address", "motto"] {
        if params.get(key).is_some() {
            patch.set(key, optional_str(params, key)?);
        }
    }
    patch.apply(conn, "schools", &ctx.school_id)?;
    Ok(json!({ "school": school_json(conn, &ctx.school_id)? }))
}

pub fn try_handle(state: &AppState, ctx: &AuthContext, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "schools.get" => get(state, ctx),
        "schools.update" => update(state, ctx, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
