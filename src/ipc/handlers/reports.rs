use crate::auth::AuthContext;
use crate::ipc::error::ApiError;
use crate::ipc::helpers::{
    db_conn, ensure_in_school, optional_str, require_staff, required_str, respond,
    visible_student_class,
};
use crate::ipc::types::{AppState, Request};
use crate::report::{
    self, ConductInput, PhaseSet, ReportCard, ReportContext, StudentHeader, StudentInput,
};
use rusqlite::Connection;
use serde_json::{json, Value};

use super::grading::{self, CommentKind};
use super::settings::{self, ReportSettings};
use super::terms::{self, TermRow};
use super::{attendance, exams, subjects};

/// Everything a class's report cards share: bands, subjects, settings.
struct ReportInputs {
    school_name: String,
    class_id: String,
    class_name: String,
    term: TermRow,
    phases: PhaseSet,
    settings: ReportSettings,
    subjects: Vec<report::SubjectInfo>,
    grading: Vec<report::GradingBand>,
    class_teacher_comments: Vec<report::CommentBand>,
    head_teacher_comments: Vec<report::CommentBand>,
}

impl ReportInputs {
    fn context(&self) -> ReportContext<'_> {
        ReportContext {
            subjects: &self.subjects,
            grading: &self.grading,
            class_teacher_comments: &self.class_teacher_comments,
            head_teacher_comments: &self.head_teacher_comments,
            phases: self.phases,
            options: &self.settings.options,
        }
    }

    fn envelope(&self) -> Value {
        json!({
            "school": { "name": self.school_name },
            "class": { "id": self.class_id, "name": self.class_name },
            "term": self.term.to_json(),
            "phases": self.phases.as_str(),
        })
    }
}

fn parse_phases(params: &Value, default: PhaseSet) -> Result<PhaseSet, ApiError> {
    match optional_str(params, "phases")? {
        None => Ok(default),
        Some(raw) => PhaseSet::parse(&raw)
            .ok_or_else(|| ApiError::bad_params("phases must be one of: midEnd, botMid")),
    }
}

fn load_inputs(
    conn: &Connection,
    ctx: &AuthContext,
    class_id: &str,
    params: &Value,
) -> Result<ReportInputs, ApiError> {
    let term_id = required_str(params, "termId")?;
    let settings = settings::load_report_settings(conn, &ctx.school_id)?;
    let phases = parse_phases(params, settings.default_phases)?;
    let term = terms::load_term(conn, ctx, &term_id)?;

    let school_name: String = conn.query_row(
        "SELECT name FROM schools WHERE id = ?",
        [&ctx.school_id],
        |r| r.get(0),
    )?;
    let class_name: String = conn.query_row(
        "SELECT name FROM classes WHERE id = ?",
        [class_id],
        |r| r.get(0),
    )?;

    Ok(ReportInputs {
        school_name,
        class_id: class_id.to_string(),
        class_name,
        term,
        phases,
        subjects: subjects::load_subjects(conn, class_id)?,
        grading: grading::load_grading_bands(conn, &ctx.school_id)?,
        class_teacher_comments: grading::load_comment_bands(
            conn,
            &ctx.school_id,
            CommentKind::ClassTeacher,
        )?,
        head_teacher_comments: grading::load_comment_bands(
            conn,
            &ctx.school_id,
            CommentKind::HeadTeacher,
        )?,
        settings,
    })
}

/// Report inputs for every student of the class, ordered by last then first name.
fn load_class_students(
    conn: &Connection,
    class_id: &str,
    term: &TermRow,
) -> Result<Vec<StudentInput>, ApiError> {
    let mut stmt = conn.prepare(
        "SELECT id, first_name, last_name, admission_no,
                discipline, time_management, smartness, attendance_remarks
         FROM students
         WHERE class_id = ?
         ORDER BY last_name, first_name, id",
    )?;
    let rows = stmt
        .query_map([class_id], |r| {
            let id: String = r.get(0)?;
            let first: String = r.get(1)?;
            let last: String = r.get(2)?;
            Ok((
                StudentHeader {
                    student_id: id,
                    name: format!("{} {}", first, last),
                    admission_no: r.get(3)?,
                },
                ConductInput {
                    discipline: r.get(4)?,
                    time_management: r.get(5)?,
                    smartness: r.get(6)?,
                    attendance_remarks: r.get(7)?,
                },
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::with_capacity(rows.len());
    for (header, conduct) in rows {
        let results = exams::load_term_results(conn, &header.student_id, &term.id)?;
        let attendance = attendance::load_term_attendance(conn, &header.student_id, term)?;
        out.push(StudentInput {
            header,
            results,
            attendance,
            conduct,
        });
    }
    Ok(out)
}

fn class_cards(conn: &Connection, inputs: &ReportInputs) -> Result<Vec<ReportCard>, ApiError> {
    let students = load_class_students(conn, &inputs.class_id, &inputs.term)?;
    Ok(report::build_class_reports(&inputs.context(), &students))
}

fn student_term_report(
    state: &AppState,
    ctx: &AuthContext,
    params: &Value,
) -> Result<Value, ApiError> {
    let conn = db_conn(state)?;
    let student_id = required_str(params, "studentId")?;
    required_str(params, "termId")?;
    let class_id = visible_student_class(conn, ctx, &student_id)?;
    let inputs = load_inputs(conn, ctx, &class_id, params)?;

    // Built alongside classmates so the card carries its class position.
    let Some(card) = class_cards(conn, &inputs)?
        .into_iter()
        .find(|c| c.student.student_id == student_id)
    else {
        return Err(ApiError::not_found("student"));
    };
    tracing::debug!(
        student_id = %student_id,
        term_id = %inputs.term.id,
        subjects = card.subjects.len(),
        "student term report built"
    );

    let mut out = inputs.envelope();
    out["report"] = serde_json::to_value(&card)?;
    Ok(out)
}

fn class_term_report(
    state: &AppState,
    ctx: &AuthContext,
    params: &Value,
) -> Result<Value, ApiError> {
    require_staff(ctx)?;
    let conn = db_conn(state)?;
    let class_id = required_str(params, "classId")?;
    required_str(params, "termId")?;
    ensure_in_school(conn, ctx, "classes", &class_id, "class")?;
    let inputs = load_inputs(conn, ctx, &class_id, params)?;

    let cards = class_cards(conn, &inputs)?;
    tracing::info!(
        class_id = %class_id,
        term_id = %inputs.term.id,
        students = cards.len(),
        "class term report built"
    );

    let mut out = inputs.envelope();
    out["reports"] = serde_json::to_value(&cards)?;
    Ok(out)
}

pub fn try_handle(state: &AppState, ctx: &AuthContext, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "reports.studentTermReport" => student_term_report(state, ctx, &req.params),
        "reports.classTermReport" => class_term_report(state, ctx, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_default_from_settings_and_reject_unknown() {
        let none = json!({});
        assert_eq!(
            parse_phases(&none, PhaseSet::BotMid).expect("default"),
            PhaseSet::BotMid
        );
        let mid = json!({ "phases": "midEnd" });
        assert_eq!(
            parse_phases(&mid, PhaseSet::BotMid).expect("explicit"),
            PhaseSet::MidEnd
        );
        let bad = json!({ "phases": "endOnly" });
        assert!(parse_phases(&bad, PhaseSet::MidEnd).is_err());
    }
}
