use super::handlers;
use super::types::{AppState, Request};
use crate::auth::{self, AuthContext};
use crate::ipc::error::{err, ApiError};
use crate::ipc::helpers::db_conn;

fn authenticate(state: &AppState, req: &Request) -> Result<AuthContext, ApiError> {
    let conn = db_conn(state)?;
    Ok(auth::authenticate(conn, req.token.as_deref())?)
}

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    tracing::debug!(request_id = %req.id, method = %req.method, "request");

    // health and workspace.select run before any workspace or token exists.
    if let Some(resp) = handlers::core::try_handle(state, &req) {
        return resp;
    }

    let ctx = match authenticate(state, &req) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let state: &AppState = state;

    if let Some(resp) = handlers::sessions::try_handle(state, &ctx, &req) {
        return resp;
    }
    if let Some(resp) = handlers::users::try_handle(state, &ctx, &req) {
        return resp;
    }
    if let Some(resp) = handlers::schools::try_handle(state, &ctx, &req) {
        return resp;
    }
    if let Some(resp) = handlers::teachers::try_handle(state, &ctx, &req) {
        return resp;
    }
    if let Some(resp) = handlers::classes::try_handle(state, &ctx, &req) {
        return resp;
    }
    if let Some(resp) = handlers::students::try_handle(state, &ctx, &req) {
        return resp;
    }
    if let Some(resp) = handlers::terms::try_handle(state, &ctx, &req) {
        return resp;
    }
    if let Some(resp) = handlers::subjects::try_handle(state, &ctx, &req) {
        return resp;
    }
    if let Some(resp) = handlers::exams::try_handle(state, &ctx, &req) {
        return resp;
    }
    if let Some(resp) = handlers::grading::try_handle(state, &ctx, &req) {
        return resp;
    }
    if let Some(resp) = handlers::attendance::try_handle(state, &ctx, &req) {
        return resp;
    }
    if let Some(resp) = handlers::notices::try_handle(state, &ctx, &req) {
        return resp;
    }
    if let Some(resp) = handlers::payments::try_handle(state, &ctx, &req) {
        return resp;
    }
    if let Some(resp) = handlers::settings::try_handle(state, &ctx, &req) {
        return resp;
    }
    if let Some(resp) = handlers::reports::try_handle(state, &ctx, &req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
