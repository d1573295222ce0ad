use crate::auth::AuthContext;
use crate::ipc::error::ApiError;
use crate::ipc::helpers::{
    db_conn, ensure_in_school, now_rfc3339, optional_str, require_staff, required_f64,
    required_str, respond,
};
use crate::ipc::types::{AppState, Request};
use crate::report::{self, ExamType, ResultRow};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use uuid::Uuid;

use super::{grading, settings};

/// A student's results for one term joined with their exams. Rows come back in
/// exam creation order so a later exam of the same type replaces an earlier one
/// during aggregation.
pub fn load_term_results(
    conn: &Connection,
    student_id: &str,
    term_id: &str,
) -> Result<Vec<ResultRow>, ApiError> {
    let mut stmt = conn.prepare(
        "SELECT e.subject_id, e.exam_type, r.marks_obtained, e.total_marks
         FROM exam_results r
         JOIN exams e ON e.id = r.exam_id
         WHERE r.student_id = ? AND e.term_id = ?
         ORDER BY e.created_at, e.rowid, r.rowid",
    )?;
    let rows = stmt
        .query_map((student_id, term_id), |r| {
            let exam_type: String = r.get(1)?;
            Ok((r.get::<_, String>(0)?, exam_type, r.get::<_, f64>(2)?, r.get::<_, f64>(3)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    // The CHECK constraint keeps exam_type valid; anything else is skipped.
    Ok(rows
        .into_iter()
        .filter_map(|(subject_id, exam_type, marks, total)| {
            ExamType::parse(&exam_type).map(|t| ResultRow {
                subject_id,
                exam_type: t,
                marks_obtained: marks,
                total_marks: total,
            })
        })
        .collect())
}

struct ExamInfo {
    subject_id: String,
    class_id: String,
    total_marks: f64,
}

fn load_exam(conn: &Connection, ctx: &AuthContext, exam_id: &str) -> Result<ExamInfo, ApiError> {
    let row: Option<(String, String, f64)> = conn
        .query_row(
            "SELECT e.subject_id, s.class_id, e.total_marks
             FROM exams e
             JOIN subjects s ON s.id = e.subject_id
             WHERE e.id = ? AND e.school_id = ?",
            (exam_id, &ctx.school_id),
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()?;
    let Some((subject_id, class_id, total_marks)) = row else {
        return Err(ApiError::not_found("exam"));
    };
    Ok(ExamInfo {
        subject_id,
        class_id,
        total_marks,
    })
}

fn list(state: &AppState, ctx: &AuthContext, params: &Value) -> Result<Value, ApiError> {
    require_staff(ctx)?;
    let conn = db_conn(state)?;
    let term_id = required_str(params, "termId")?;
    ensure_in_school(conn, ctx, "terms", &term_id, "term")?;
    let class_id = optional_str(params, "classId")?;
    if let Some(cid) = &class_id {
        ensure_in_school(conn, ctx, "classes", cid, "class")?;
    }

    let mut stmt = conn.prepare(
        "SELECT e.id, e.subject_id, s.name, s.class_id, e.exam_type, e.total_marks, e.title,
                (SELECT COUNT(*) FROM exam_results r WHERE r.exam_id = e.id) AS result_count
         FROM exams e
         JOIN subjects s ON s.id = e.subject_id
         WHERE e.term_id = ?1 AND (?2 IS NULL OR s.class_id = ?2)
         ORDER BY s.name, e.created_at, e.rowid",
    )?;
    let exams = stmt
        .query_map((&term_id, &class_id), |r| {
            let id: String = r.get(0)?;
            let subject_id: String = r.get(1)?;
            let subject_name: String = r.get(2)?;
            let class_id: String = r.get(3)?;
            let exam_type: String = r.get(4)?;
            let total_marks: f64 = r.get(5)?;
            let title: Option<String> = r.get(6)?;
            let result_count: i64 = r.get(7)?;
            Ok(json!({
                "id": id,
                "subjectId": subject_id,
                "subjectName": subject_name,
                "classId": class_id,
                "examType": exam_type,
                "totalMarks": total_marks,
                "title": title,
                "resultCount": result_count,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "exams": exams }))
}

fn create(state: &AppState, ctx: &AuthContext, params: &Value) -> Result<Value, ApiError> {
    require_staff(ctx)?;
    let conn = db_conn(state)?;
    let term_id = required_str(params, "termId")?;
    ensure_in_school(conn, ctx, "terms", &term_id, "term")?;
    let subject_id = required_str(params, "subjectId")?;
    ensure_in_school(conn, ctx, "subjects", &subject_id, "subject")?;
    let exam_type_raw = required_str(params, "examType")?;
    let Some(exam_type) = ExamType::parse(&exam_type_raw) else {
        return Err(ApiError::bad_params(
            "examType must be one of: beginning-of-term, mid-term, end-of-term",
        ));
    };
    let total_marks = required_f64(params, "totalMarks")?;
    if total_marks <= 0.0 {
        return Err(ApiError::bad_params("totalMarks must be positive"));
    }
    let title = optional_str(params, "title")?;

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO exams(id, school_id, term_id, subject_id, exam_type, total_marks, title, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &ctx.school_id,
            &term_id,
            &subject_id,
            exam_type.as_str(),
            total_marks,
            &title,
            now_rfc3339(),
        ),
    )?;
    Ok(json!({ "examId": id, "examType": exam_type.as_str() }))
}

fn delete(state: &AppState, ctx: &AuthContext, params: &Value) -> Result<Value, ApiError> {
    require_staff(ctx)?;
    let conn = db_conn(state)?;
    let id = required_str(params, "examId")?;
    ensure_in_school(conn, ctx, "exams", &id, "exam")?;
    // Results cascade.
    conn.execute("DELETE FROM exams WHERE id = ?", [&id])?;
    Ok(json!({ "deleted": true }))
}

fn results_list(state: &AppState, ctx: &AuthContext, params: &Value) -> Result<Value, ApiError> {
    require_staff(ctx)?;
    let conn = db_conn(state)?;
    let exam_id = required_str(params, "examId")?;
    let exam = load_exam(conn, ctx, &exam_id)?;

    let mut stmt = conn.prepare(
        "SELECT st.id, st.last_name, st.first_name, r.id, r.marks_obtained, r.grade, r.remarks
         FROM students st
         LEFT JOIN exam_results r ON r.student_id = st.id AND r.exam_id = ?
         WHERE st.class_id = ?
         ORDER BY st.last_name, st.first_name",
    )?;
    let rows = stmt
        .query_map((&exam_id, &exam.class_id), |r| {
            let student_id: String = r.get(0)?;
            let last: String = r.get(1)?;
            let first: String = r.get(2)?;
            let result_id: Option<String> = r.get(3)?;
            let marks: Option<f64> = r.get(4)?;
            let grade: Option<String> = r.get(5)?;
            let remarks: Option<String> = r.get(6)?;
            Ok(json!({
                "studentId": student_id,
                "displayName": format!("{}, {}", last, first),
                "resultId": result_id,
                "marksObtained": marks,
                "percentage": marks.map(|m| report::percentage(m, exam.total_marks)),
                "grade": grade,
                "remarks": remarks,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({
        "examId": exam_id,
        "subjectId": exam.subject_id,
        "totalMarks": exam.total_marks,
        "results": rows,
    }))
}

fn results_upsert(state: &AppState, ctx: &AuthContext, params: &Value) -> Result<Value, ApiError> {
    require_staff(ctx)?;
    let conn = db_conn(state)?;
    let exam_id = required_str(params, "examId")?;
    let exam = load_exam(conn, ctx, &exam_id)?;
    let student_id = required_str(params, "studentId")?;

    let student_class: Option<String> = conn
        .query_row(
            "SELECT class_id FROM students WHERE id = ? AND school_id = ?",
            (&student_id, &ctx.school_id),
            |r| r.get(0),
        )
        .optional()?;
    match student_class {
        None => return Err(ApiError::not_found("student")),
        Some(cid) if cid != exam.class_id => {
            return Err(ApiError::bad_params(
                "student is not in the class this exam belongs to",
            ));
        }
        Some(_) => {}
    }

    let marks = required_f64(params, "marksObtained")?;
    if marks < 0.0 || marks > exam.total_marks {
        return Err(ApiError::bad_params(format!(
            "marksObtained must be between 0 and {}",
            exam.total_marks
        )));
    }
    let remarks = optional_str(params, "remarks")?;

    let bands = grading::load_grading_bands(conn, &ctx.school_id)?;
    let options = settings::load_report_settings(conn, &ctx.school_id)?.options;
    let pct = report::percentage(marks, exam.total_marks);
    let grade = report::grade_for(pct, &bands, &options.fallback_grade).to_string();

    conn.execute(
        "INSERT INTO exam_results(id, exam_id, student_id, marks_obtained, grade, remarks, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(exam_id, student_id) DO UPDATE SET
           marks_obtained = excluded.marks_obtained,
           grade = excluded.grade,
           remarks = excluded.remarks,
           updated_at = excluded.updated_at",
        (
            Uuid::new_v4().to_string(),
            &exam_id,
            &student_id,
            marks,
            &grade,
            &remarks,
            now_rfc3339(),
        ),
    )?;
    Ok(json!({
        "examId": exam_id,
        "studentId": student_id,
        "marksObtained": marks,
        "percentage": pct,
        "grade": grade,
    }))
}

fn results_delete(state: &AppState, ctx: &AuthContext, params: &Value) -> Result<Value, ApiError> {
    require_staff(ctx)?;
    let conn = db_conn(state)?;
    let exam_id = required_str(params, "examId")?;
    load_exam(conn, ctx, &exam_id)?;
    let student_id = required_str(params, "studentId")?;
    let n = conn.execute(
        "DELETE FROM exam_results WHERE exam_id = ? AND student_id = ?",
        (&exam_id, &student_id),
    )?;
    Ok(json!({ "deleted": n > 0 }))
}

pub fn try_handle(state: &AppState, ctx: &AuthContext, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "exams.list" => list(state, ctx, &req.params),
        "exams.create" => create(state, ctx, &req.params),
        "exams.delete" => delete(state, ctx, &req.params),
        "results.list" => results_list(state, ctx, &req.params),
        "results.upsert" => results_upsert(state, ctx, &req.params),
        "results.delete" => results_delete(state, ctx, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
