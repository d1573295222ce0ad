use crate::auth::AuthContext;
use crate::db;
use crate::ipc::error::ApiError;
use crate::ipc::helpers::{db_conn, require_admin, respond};
use crate::ipc::types::{AppState, Request};
use crate::report::{PhaseSet, ReportOptions};
use rusqlite::Connection;
use serde_json::{json, Map, Value};

const REPORTS_KEY: &str = "reports";
const MAX_LABEL_CHARS: usize = 120;

#[derive(Debug, Clone, Default)]
pub struct ReportSettings {
    pub options: ReportOptions,
    pub default_phases: PhaseSet,
}

impl ReportSettings {
    fn to_json(&self) -> Value {
        json!({
            "fallbackGrade": self.options.fallback_grade,
            "missingGrade": self.options.missing_grade,
            "noComment": self.options.no_comment,
            "defaultConduct": self.options.default_conduct,
            "defaultAttendanceRemarks": self.options.default_attendance_remarks,
            "defaultPhases": self.default_phases.as_str(),
        })
    }
}

fn parse_label(v: &Value, key: &str) -> Result<String, String> {
    let Some(s) = v.as_str() else {
        return Err(format!("{} must be a string", key));
    };
    let t = s.trim();
    if t.is_empty() {
        return Err(format!("{} must not be empty", key));
    }
    if t.chars().count() > MAX_LABEL_CHARS {
        return Err(format!("{} must be at most {} characters", key, MAX_LABEL_CHARS));
    }
    Ok(t.to_string())
}

fn merge_patch(current: &mut ReportSettings, patch: &Map<String, Value>) -> Result<(), String> {
    for (k, v) in patch {
        match k.as_str() {
            "fallbackGrade" => current.options.fallback_grade = parse_label(v, k)?,
            "missingGrade" => current.options.missing_grade = parse_label(v, k)?,
            "noComment" => current.options.no_comment = parse_label(v, k)?,
            "defaultConduct" => current.options.default_conduct = parse_label(v, k)?,
            "defaultAttendanceRemarks" => {
                current.options.default_attendance_remarks = parse_label(v, k)?
            }
            "defaultPhases" => {
                current.default_phases = v
                    .as_str()
                    .and_then(PhaseSet::parse)
                    .ok_or_else(|| "defaultPhases must be midEnd or botMid".to_string())?;
            }
            _ => return Err(format!("unknown reports field: {}", k)),
        }
    }
    Ok(())
}

pub fn load_report_settings(conn: &Connection, school_id: &str) -> Result<ReportSettings, ApiError> {
    let mut current = ReportSettings::default();
    if let Some(saved) = db::settings_get_json(conn, school_id, REPORTS_KEY)? {
        if let Some(obj) = saved.as_object() {
            // Malformed stored values fall back to defaults rather than blocking reports.
            let mut candidate = current.clone();
            match merge_patch(&mut candidate, obj) {
                Ok(()) => current = candidate,
                Err(e) => tracing::warn!(school_id, error = %e, "ignoring stored report settings"),
            }
        }
    }
    Ok(current)
}

fn get(state: &AppState, ctx: &AuthContext) -> Result<Value, ApiError> {
    let conn = db_conn(state)?;
    Ok(json!({ "reports": load_report_settings(conn, &ctx.school_id)?.to_json() }))
}

fn update(state: &AppState, ctx: &AuthContext, params: &Value) -> Result<Value, ApiError> {
    require_admin(ctx)?;
    let conn = db_conn(state)?;
    let Some(patch) = params.get("patch").and_then(|v| v.as_object()) else {
        return Err(ApiError::bad_params("patch must be an object"));
    };
    let mut current = load_report_settings(conn, &ctx.school_id)?;
    merge_patch(&mut current, patch).map_err(ApiError::BadParams)?;
    let value = current.to_json();
    db::settings_set_json(conn, &ctx.school_id, REPORTS_KEY, &value)?;
    Ok(json!({ "reports": value }))
}

pub fn try_handle(state: &AppState, ctx: &AuthContext, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "settings.reportsGet" => get(state, ctx),
        "settings.reportsUpdate" => update(state, ctx, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_overrides_defaults_and_rejects_unknown_keys() {
        let mut s = ReportSettings::default();
        let patch = json!({ "fallbackGrade": "U", "defaultPhases": "botMid" });
        merge_patch(&mut s, patch.as_object().expect("obj")).expect("merge");
        assert_eq!(s.options.fallback_grade, "U");
        assert_eq!(s.options.missing_grade, "N/A");
        assert_eq!(s.default_phases, PhaseSet::BotMid);

        let bad = json!({ "colour": "red" });
        assert!(merge_patch(&mut s, bad.as_object().expect("obj")).is_err());
        let empty = json!({ "noComment": "  " });
        assert!(merge_patch(&mut s, empty.as_object().expect("obj")).is_err());
    }
}
