use serde_json::json;
use thiserror::Error;

use crate::auth::AuthError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
        "status": status_for(code),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// HTTP-equivalent status for an error code.
pub fn status_for(code: &str) -> u16 {
    match code {
        "bad_params" | "bad_json" => 400,
        "unauthorized" => 401,
        "forbidden" => 403,
        "not_found" | "not_implemented" => 404,
        "conflict" | "no_workspace" => 409,
        _ => 500,
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadParams(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("select a workspace first")]
    NoWorkspace,
    #[error("{0}")]
    Db(rusqlite::Error),
    #[error("failed to encode result: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ApiError {
    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::BadParams(message.into())
    }

    pub fn not_found(what: &str) -> Self {
        Self::NotFound(format!("{} not found", what))
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::BadParams(_) => "bad_params",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::NoWorkspace => "no_workspace",
            Self::Db(_) => "db_query_failed",
            Self::Encode(_) => "encode_failed",
        }
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        let code = self.code();
        if status_for(code) >= 500 {
            tracing::warn!(request_id = id, code, error = %self, "request failed");
        } else {
            tracing::debug!(request_id = id, code, error = %self, "request rejected");
        }
        err(id, code, self.to_string(), None)
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(f, _)
                if f.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Self::Conflict(e.to_string())
            }
            _ => Self::Db(e),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Db(db) => Self::Db(db),
            other => Self::Unauthorized(other.to_string()),
        }
    }
}
