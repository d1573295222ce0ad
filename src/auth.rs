use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Teacher,
    Student,
    Parent,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "teacher" => Some(Self::Teacher),
            "student" => Some(Self::Student),
            "parent" => Some(Self::Parent),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Teacher => "teacher",
            Self::Student => "student",
            Self::Parent => "parent",
        }
    }
}

/// Who is making the current request. Built once per request from the bearer
/// token and handed to every handler.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: String,
    pub school_id: String,
    pub role: Role,
    pub student_id: Option<String>,
    pub child_ids: Vec<String>,
    pub token_hash: String,
}

impl AuthContext {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_staff(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Teacher)
    }

    /// Staff see every student of their school; students see themselves and
    /// parents see linked children.
    pub fn can_view_student(&self, student_id: &str) -> bool {
        match self.role {
            Role::Admin | Role::Teacher => true,
            Role::Student => self.student_id.as_deref() == Some(student_id),
            Role::Parent => self.child_ids.iter().any(|c| c == student_id),
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("unknown token")]
    UnknownToken,
    #[error("token revoked")]
    Revoked,
    #[error("token expired")]
    Expired,
    #[error(transparent)]
    Db(#[from] rusqlite::Error),
}

pub fn hash_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

pub fn new_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

/// Stores the hash of a fresh token for `user_id` and returns the plain token.
pub fn issue_token(
    conn: &Connection,
    user_id: &str,
    ttl: Option<Duration>,
) -> rusqlite::Result<String> {
    let token = new_token();
    let now = Utc::now();
    let expires_at = ttl.map(|d| (now + d).to_rfc3339());
    conn.execute(
        "INSERT INTO sessions(token_hash, user_id, created_at, expires_at, revoked)
         VALUES(?, ?, ?, ?, 0)",
        (hash_token(&token), user_id, now.to_rfc3339(), expires_at),
    )?;
    Ok(token)
}

pub fn revoke(conn: &Connection, token_hash: &str) -> rusqlite::Result<bool> {
    let n = conn.execute(
        "UPDATE sessions SET revoked = 1 WHERE token_hash = ?",
        [token_hash],
    )?;
    Ok(n > 0)
}

pub fn authenticate(conn: &Connection, token: Option<&str>) -> Result<AuthContext, AuthError> {
    let token = token
        .map(|t| t.trim().trim_start_matches("Bearer ").trim())
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken)?;
    let token_hash = hash_token(token);

    let row: Option<(String, String, String, Option<String>, Option<String>, i64)> = conn
        .query_row(
            "SELECT u.id, u.school_id, u.role, u.student_id, s.expires_at, s.revoked
             FROM sessions s
             JOIN users u ON u.id = s.user_id
             WHERE s.token_hash = ?",
            [&token_hash],
            |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get(2)?,
                    r.get(3)?,
                    r.get(4)?,
                    r.get(5)?,
                ))
            },
        )
        .optional()?;
    let Some((user_id, school_id, role_raw, student_id, expires_at, revoked)) = row else {
        return Err(AuthError::UnknownToken);
    };
    if revoked != 0 {
        return Err(AuthError::Revoked);
    }
    if let Some(exp) = expires_at {
        // An unparseable expiry is treated as already expired.
        let expired = DateTime::parse_from_rfc3339(&exp)
            .map(|t| t.with_timezone(&Utc) <= Utc::now())
            .unwrap_or(true);
        if expired {
            return Err(AuthError::Expired);
        }
    }
    let role = Role::parse(&role_raw).ok_or(AuthError::UnknownToken)?;

    let child_ids = if role == Role::Parent {
        let mut stmt = conn.prepare("SELECT student_id FROM guardians WHERE user_id = ?")?;
        let ids = stmt
            .query_map([&user_id], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        ids
    } else {
        Vec::new()
    };

    Ok(AuthContext {
        user_id,
        school_id,
        role,
        student_id,
        child_ids,
        token_hash,
    })
}
