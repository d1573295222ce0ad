use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExamType {
    BeginningOfTerm,
    MidTerm,
    EndOfTerm,
}

impl ExamType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beginning-of-term" | "bot" => Some(Self::BeginningOfTerm),
            "mid-term" | "mid" => Some(Self::MidTerm),
            "end-of-term" | "end" => Some(Self::EndOfTerm),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::BeginningOfTerm => "beginning-of-term",
            Self::MidTerm => "mid-term",
            Self::EndOfTerm => "end-of-term",
        }
    }
}

/// Which pair of term phases a report covers. The second phase is the
/// "final" one: it drives the trend comment and the class/head teacher remarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhaseSet {
    #[default]
    MidEnd,
    BotMid,
}

impl PhaseSet {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "midEnd" => Some(Self::MidEnd),
            "botMid" => Some(Self::BotMid),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::MidEnd => "midEnd",
            Self::BotMid => "botMid",
        }
    }

    pub fn previous(self) -> ExamType {
        match self {
            Self::MidEnd => ExamType::MidTerm,
            Self::BotMid => ExamType::BeginningOfTerm,
        }
    }

    pub fn last(self) -> ExamType {
        match self {
            Self::MidEnd => ExamType::EndOfTerm,
            Self::BotMid => ExamType::MidTerm,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

impl AttendanceStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "present" => Some(Self::Present),
            "absent" => Some(Self::Absent),
            "late" => Some(Self::Late),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "Present",
            Self::Absent => "Absent",
            Self::Late => "Late",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingBand {
    pub from: f64,
    pub to: f64,
    pub grade: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentBand {
    pub from: f64,
    pub to: f64,
    pub comment: String,
}

#[derive(Debug, Clone)]
pub struct SubjectInfo {
    pub id: String,
    pub name: String,
    pub teacher_initials: Option<String>,
}

/// One exam result already joined with its exam.
#[derive(Debug, Clone)]
pub struct ResultRow {
    pub subject_id: String,
    pub exam_type: ExamType,
    pub marks_obtained: f64,
    pub total_marks: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ConductInput {
    pub discipline: Option<String>,
    pub time_management: Option<String>,
    pub smartness: Option<String>,
    pub attendance_remarks: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentHeader {
    pub student_id: String,
    pub name: String,
    pub admission_no: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StudentInput {
    pub header: StudentHeader,
    pub results: Vec<ResultRow>,
    pub attendance: Vec<AttendanceStatus>,
    pub conduct: ConductInput,
}

/// Labels used when a lookup has nothing to go on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportOptions {
    pub fallback_grade: String,
    pub missing_grade: String,
    pub no_comment: String,
    pub default_conduct: String,
    pub default_attendance_remarks: String,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            fallback_grade: "F".to_string(),
            missing_grade: "N/A".to_string(),
            no_comment: "No comment available".to_string(),
            default_conduct: "Good".to_string(),
            default_attendance_remarks: "Regular".to_string(),
        }
    }
}

/// Class-wide inputs shared by every student of one report run.
#[derive(Debug, Clone, Copy)]
pub struct ReportContext<'a> {
    pub subjects: &'a [SubjectInfo],
    pub grading: &'a [GradingBand],
    pub class_teacher_comments: &'a [CommentBand],
    pub head_teacher_comments: &'a [CommentBand],
    pub phases: PhaseSet,
    pub options: &'a ReportOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseCell {
    pub marks: f64,
    pub grade: String,
    pub percentage: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agg: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRow {
    pub subject_id: String,
    pub name: String,
    pub full_marks: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_term: Option<PhaseCell>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mid_term: Option<PhaseCell>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_term: Option<PhaseCell>,
    pub teacher_comment: String,
    pub teacher_initials: String,
}

impl SubjectRow {
    pub fn cell(&self, phase: ExamType) -> Option<&PhaseCell> {
        match phase {
            ExamType::BeginningOfTerm => self.bot_term.as_ref(),
            ExamType::MidTerm => self.mid_term.as_ref(),
            ExamType::EndOfTerm => self.end_term.as_ref(),
        }
    }

    fn cell_mut(&mut self, phase: ExamType) -> &mut Option<PhaseCell> {
        match phase {
            ExamType::BeginningOfTerm => &mut self.bot_term,
            ExamType::MidTerm => &mut self.mid_term,
            ExamType::EndOfTerm => &mut self.end_term,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TermStats {
    pub total: f64,
    pub average: f64,
    pub grade: String,
    pub subject_count: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseStats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_term: Option<TermStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mid_term: Option<TermStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_term: Option<TermStats>,
}

impl PhaseStats {
    pub fn get(&self, phase: ExamType) -> Option<&TermStats> {
        match phase {
            ExamType::BeginningOfTerm => self.bot_term.as_ref(),
            ExamType::MidTerm => self.mid_term.as_ref(),
            ExamType::EndOfTerm => self.end_term.as_ref(),
        }
    }

    fn set(&mut self, phase: ExamType, stats: TermStats) {
        match phase {
            ExamType::BeginningOfTerm => self.bot_term = Some(stats),
            ExamType::MidTerm => self.mid_term = Some(stats),
            ExamType::EndOfTerm => self.end_term = Some(stats),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conduct {
    pub discipline: String,
    pub time_management: String,
    pub smartness: String,
    pub attendance_remarks: String,
    pub attendance_percentage: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comments {
    pub class_teacher: String,
    pub head_teacher: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCard {
    pub student: StudentHeader,
    pub subjects: Vec<SubjectRow>,
    pub term_stats: PhaseStats,
    pub conduct: Conduct,
    pub comments: Comments,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_size: Option<usize>,
}

impl ReportCard {
    pub fn final_stats(&self, phases: PhaseSet) -> Option<&TermStats> {
        self.term_stats.get(phases.last())
    }
}

/// First band (in iteration order) whose closed range contains `p`.
fn first_band<T>(bands: &[T], p: f64, range: impl Fn(&T) -> (f64, f64)) -> Option<&T> {
    bands.iter().find(|b| {
        let (from, to) = range(b);
        from <= p && p <= to
    })
}

pub fn grade_for<'a>(percentage: f64, bands: &'a [GradingBand], fallback: &'a str) -> &'a str {
    first_band(bands, percentage, |b| (b.from, b.to))
        .map(|b| b.grade.as_str())
        .unwrap_or(fallback)
}

pub fn comment_for(score: f64, bands: &[CommentBand]) -> Option<&str> {
    first_band(bands, score, |b| (b.from, b.to)).map(|b| b.comment.as_str())
}

pub fn percentage(marks: f64, total_marks: f64) -> f64 {
    if total_marks > 0.0 {
        marks / total_marks * 100.0
    } else {
        0.0
    }
}

/// Present days over recorded days, rounded. No records reads as full attendance.
pub fn attendance_percentage(records: &[AttendanceStatus]) -> u32 {
    if records.is_empty() {
        return 100;
    }
    let present = records
        .iter()
        .filter(|s| **s == AttendanceStatus::Present)
        .count();
    (present as f64 / records.len() as f64 * 100.0).round() as u32
}

pub fn trend_comment(previous: Option<f64>, current: Option<f64>) -> &'static str {
    match (previous, current) {
        (Some(prev), Some(cur)) if prev > 0.0 && cur > 0.0 => match cur.partial_cmp(&prev) {
            Some(Ordering::Greater) => "Improved",
            Some(Ordering::Less) => "Needs improvement",
            _ => "Consistent",
        },
        _ => "Good",
    }
}

/// Competition ranking, highest first: equal values share the rank of the
/// first of them and the next distinct value skips ahead (1, 2, 2, 4).
/// `None` entries are left unranked.
pub fn competition_ranks(values: &[Option<f64>]) -> Vec<Option<u32>> {
    let mut order: Vec<(usize, f64)> = values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|v| (i, v)))
        .collect();
    order.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    let mut ranks = vec![None; values.len()];
    let mut prev: Option<(f64, u32)> = None;
    for (pos, (i, v)) in order.into_iter().enumerate() {
        let rank = match prev {
            Some((pv, pr)) if pv == v => pr,
            _ => pos as u32 + 1,
        };
        ranks[i] = Some(rank);
        prev = Some((v, rank));
    }
    ranks
}

#[derive(Default)]
struct PhaseSlots<'a> {
    bot: Option<&'a ResultRow>,
    mid: Option<&'a ResultRow>,
    end: Option<&'a ResultRow>,
}

impl<'a> PhaseSlots<'a> {
    fn get(&self, phase: ExamType) -> Option<&'a ResultRow> {
        match phase {
            ExamType::BeginningOfTerm => self.bot,
            ExamType::MidTerm => self.mid,
            ExamType::EndOfTerm => self.end,
        }
    }

    fn put(&mut self, row: &'a ResultRow) {
        match row.exam_type {
            ExamType::BeginningOfTerm => self.bot = Some(row),
            ExamType::MidTerm => self.mid = Some(row),
            ExamType::EndOfTerm => self.end = Some(row),
        }
    }
}

// Later rows for the same (subject, phase) replace earlier ones.
fn group_results(rows: &[ResultRow]) -> HashMap<&str, PhaseSlots<'_>> {
    let mut out: HashMap<&str, PhaseSlots<'_>> = HashMap::new();
    for row in rows {
        out.entry(row.subject_id.as_str()).or_default().put(row);
    }
    out
}

fn phase_cell(row: Option<&ResultRow>, ctx: &ReportContext<'_>) -> PhaseCell {
    match row {
        Some(r) => {
            let pct = percentage(r.marks_obtained, r.total_marks);
            PhaseCell {
                marks: r.marks_obtained,
                grade: grade_for(pct, ctx.grading, &ctx.options.fallback_grade).to_string(),
                percentage: pct,
                agg: None,
            }
        }
        None => PhaseCell {
            marks: 0.0,
            grade: ctx.options.missing_grade.clone(),
            percentage: 0.0,
            agg: None,
        },
    }
}

fn term_stats<'r>(cells: impl Iterator<Item = &'r PhaseCell>, ctx: &ReportContext<'_>) -> TermStats {
    let (total, count) = cells
        .filter(|c| c.marks > 0.0)
        .fold((0.0_f64, 0_usize), |(t, n), c| (t + c.marks, n + 1));
    if count == 0 {
        return TermStats {
            total: 0.0,
            average: 0.0,
            grade: ctx.options.missing_grade.clone(),
            subject_count: 0,
        };
    }
    let average = (total / count as f64).round();
    TermStats {
        total,
        average,
        grade: grade_for(average, ctx.grading, &ctx.options.fallback_grade).to_string(),
        subject_count: count,
    }
}

fn or_default(v: &Option<String>, default: &str) -> String {
    match v.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => default.to_string(),
    }
}

pub fn build_report_card(ctx: &ReportContext<'_>, student: &StudentInput) -> ReportCard {
    let by_subject = group_results(&student.results);
    let prev = ctx.phases.previous();
    let last = ctx.phases.last();

    let mut rows: Vec<SubjectRow> = ctx
        .subjects
        .iter()
        .map(|subject| {
            let slots = by_subject.get(subject.id.as_str());
            let prev_row = slots.and_then(|s| s.get(prev));
            let last_row = slots.and_then(|s| s.get(last));

            let prev_cell = phase_cell(prev_row, ctx);
            let last_cell = phase_cell(last_row, ctx);
            let teacher_comment = trend_comment(
                prev_row.map(|_| prev_cell.percentage),
                last_row.map(|_| last_cell.percentage),
            );
            let full_marks = last_row
                .or(prev_row)
                .map(|r| r.total_marks)
                .unwrap_or(100.0);

            let mut row = SubjectRow {
                subject_id: subject.id.clone(),
                name: subject.name.clone(),
                full_marks,
                bot_term: None,
                mid_term: None,
                end_term: None,
                teacher_comment: teacher_comment.to_string(),
                teacher_initials: subject.teacher_initials.clone().unwrap_or_default(),
            };
            *row.cell_mut(prev) = Some(prev_cell);
            *row.cell_mut(last) = Some(last_cell);
            row
        })
        .collect();

    let mut term_stats_by_phase = PhaseStats::default();
    for phase in [prev, last] {
        let marked: Vec<Option<f64>> = rows
            .iter()
            .map(|r| r.cell(phase).filter(|c| c.marks > 0.0).map(|c| c.percentage))
            .collect();
        for (row, agg) in rows.iter_mut().zip(competition_ranks(&marked)) {
            if let Some(cell) = row.cell_mut(phase).as_mut() {
                cell.agg = agg;
            }
        }
        let stats = term_stats(rows.iter().filter_map(|r| r.cell(phase)), ctx);
        term_stats_by_phase.set(phase, stats);
    }

    // Nothing counted in the final phase means there is no average to comment on.
    let final_average = term_stats_by_phase
        .get(last)
        .filter(|s| s.subject_count > 0)
        .map(|s| s.average);
    let banded = |bands: &[CommentBand]| {
        final_average
            .and_then(|avg| comment_for(avg, bands))
            .unwrap_or(ctx.options.no_comment.as_str())
            .to_string()
    };
    let comments = Comments {
        class_teacher: banded(ctx.class_teacher_comments),
        head_teacher: banded(ctx.head_teacher_comments),
    };

    let conduct = Conduct {
        discipline: or_default(&student.conduct.discipline, &ctx.options.default_conduct),
        time_management: or_default(
            &student.conduct.time_management,
            &ctx.options.default_conduct,
        ),
        smartness: or_default(&student.conduct.smartness, &ctx.options.default_conduct),
        attendance_remarks: or_default(
            &student.conduct.attendance_remarks,
            &ctx.options.default_attendance_remarks,
        ),
        attendance_percentage: attendance_percentage(&student.attendance),
    };

    ReportCard {
        student: student.header.clone(),
        subjects: rows,
        term_stats: term_stats_by_phase,
        conduct,
        comments,
        position: None,
        class_size: None,
    }
}

/// Builds every student's card independently, then ranks the class on the
/// final phase average. Students with nothing marked in that phase get no position.
pub fn build_class_reports(ctx: &ReportContext<'_>, students: &[StudentInput]) -> Vec<ReportCard> {
    let mut cards: Vec<ReportCard> = students
        .iter()
        .map(|s| build_report_card(ctx, s))
        .collect();

    let finals: Vec<Option<f64>> = cards
        .iter()
        .map(|c| {
            c.final_stats(ctx.phases)
                .filter(|s| s.subject_count > 0)
                .map(|s| s.average)
        })
        .collect();
    let class_size = cards.len();
    for (card, position) in cards.iter_mut().zip(competition_ranks(&finals)) {
        card.position = position;
        card.class_size = Some(class_size);
    }
    cards
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bands() -> Vec<GradingBand> {
        vec![
            GradingBand { from: 90.0, to: 100.0, grade: "A".into() },
            GradingBand { from: 80.0, to: 89.0, grade: "B".into() },
            GradingBand { from: 0.0, to: 79.0, grade: "C".into() },
        ]
    }

    fn subject(id: &str, name: &str) -> SubjectInfo {
        SubjectInfo {
            id: id.into(),
            name: name.into(),
            teacher_initials: Some("J.D".into()),
        }
    }

    fn result(subject_id: &str, exam_type: ExamType, marks: f64) -> ResultRow {
        ResultRow {
            subject_id: subject_id.into(),
            exam_type,
            marks_obtained: marks,
            total_marks: 100.0,
        }
    }

    fn student(id: &str, results: Vec<ResultRow>) -> StudentInput {
        StudentInput {
            header: StudentHeader {
                student_id: id.into(),
                name: format!("Student {}", id),
                admission_no: None,
            },
            results,
            attendance: vec![],
            conduct: ConductInput::default(),
        }
    }

    #[test]
    fn grade_lookup_uses_first_containing_band() {
        let b = bands();
        assert_eq!(grade_for(85.0, &b, "F"), "B");
        assert_eq!(grade_for(90.0, &b, "F"), "A");
        assert_eq!(grade_for(89.0, &b, "F"), "B");
        // 89.5 sits in the gap between B and A.
        assert_eq!(grade_for(89.5, &b, "F"), "F");
        assert_eq!(grade_for(85.0, &b, "F"), grade_for(85.0, &b, "F"));
        assert_eq!(grade_for(50.0, &[], "F"), "F");

        let overlapping = vec![
            GradingBand { from: 50.0, to: 100.0, grade: "P".into() },
            GradingBand { from: 70.0, to: 100.0, grade: "D".into() },
        ];
        assert_eq!(grade_for(75.0, &overlapping, "F"), "P");
    }

    #[test]
    fn attendance_without_records_is_full() {
        assert_eq!(attendance_percentage(&[]), 100);
        let recs = [
            AttendanceStatus::Present,
            AttendanceStatus::Late,
            AttendanceStatus::Absent,
        ];
        assert_eq!(attendance_percentage(&recs), 33);
        let recs = [AttendanceStatus::Present, AttendanceStatus::Present, AttendanceStatus::Late];
        assert_eq!(attendance_percentage(&recs), 67);
    }

    #[test]
    fn trend_comment_classifies_direction() {
        assert_eq!(trend_comment(Some(70.0), Some(90.0)), "Improved");
        assert_eq!(trend_comment(Some(80.0), Some(60.0)), "Needs improvement");
        assert_eq!(trend_comment(Some(75.0), Some(75.0)), "Consistent");
        assert_eq!(trend_comment(None, Some(75.0)), "Good");
        assert_eq!(trend_comment(Some(0.0), Some(75.0)), "Good");
    }

    #[test]
    fn competition_ranks_share_ties() {
        let r = competition_ranks(&[Some(90.0), Some(70.0), Some(90.0), Some(50.0)]);
        assert_eq!(r, vec![Some(1), Some(3), Some(1), Some(4)]);
        let r = competition_ranks(&[None, Some(10.0)]);
        assert_eq!(r, vec![None, Some(1)]);
    }

    #[test]
    fn single_subject_percentage_and_grade() {
        let subjects = vec![subject("math", "Math")];
        let b = bands();
        let opts = ReportOptions::default();
        let ctx = ReportContext {
            subjects: &subjects,
            grading: &b,
            class_teacher_comments: &[],
            head_teacher_comments: &[],
            phases: PhaseSet::MidEnd,
            options: &opts,
        };
        let card = build_report_card(&ctx, &student("s1", vec![result("math", ExamType::EndOfTerm, 85.0)]));
        let end = card.subjects[0].end_term.as_ref().expect("end cell");
        assert_eq!(end.percentage, 85.0);
        assert_eq!(end.grade, "B");
        assert!(card.subjects[0].bot_term.is_none());
    }

    #[test]
    fn term_average_skips_unmarked_subjects() {
        let subjects = vec![subject("math", "Math"), subject("eng", "English"), subject("art", "Art")];
        let b = bands();
        let opts = ReportOptions::default();
        let ctx = ReportContext {
            subjects: &subjects,
            grading: &b,
            class_teacher_comments: &[],
            head_teacher_comments: &[],
            phases: PhaseSet::MidEnd,
            options: &opts,
        };
        let card = build_report_card(
            &ctx,
            &student(
                "s1",
                vec![
                    result("math", ExamType::MidTerm, 70.0),
                    result("math", ExamType::EndOfTerm, 90.0),
                    result("eng", ExamType::EndOfTerm, 60.0),
                ],
            ),
        );

        let mid = card.term_stats.mid_term.as_ref().expect("mid stats");
        assert_eq!(mid.average, 70.0);
        assert_eq!(mid.subject_count, 1);
        let end = card.term_stats.end_term.as_ref().expect("end stats");
        assert_eq!(end.total, 150.0);
        assert_eq!(end.average, 75.0);
        assert_eq!(end.grade, "C");

        // Art has nothing recorded in either phase.
        let art = &card.subjects[2];
        let art_mid = art.mid_term.as_ref().expect("art mid");
        assert_eq!(art_mid.marks, 0.0);
        assert_eq!(art_mid.grade, "N/A");
        assert_eq!(art_mid.agg, None);
        assert_eq!(art.full_marks, 100.0);

        assert_eq!(card.subjects[0].teacher_comment, "Improved");
        assert_eq!(card.subjects[1].teacher_comment, "Good");
        assert_eq!(card.subjects[0].end_term.as_ref().and_then(|c| c.agg), Some(1));
        assert_eq!(card.subjects[1].end_term.as_ref().and_then(|c| c.agg), Some(2));
    }

    #[test]
    fn empty_phase_has_zero_average_and_missing_grade() {
        let subjects = vec![subject("math", "Math")];
        let opts = ReportOptions::default();
        let ctx = ReportContext {
            subjects: &subjects,
            grading: &[],
            class_teacher_comments: &[],
            head_teacher_comments: &[],
            phases: PhaseSet::BotMid,
            options: &opts,
        };
        let card = build_report_card(&ctx, &student("s1", vec![]));
        let mid = card.term_stats.mid_term.as_ref().expect("mid stats");
        assert_eq!(mid.average, 0.0);
        assert_eq!(mid.grade, "N/A");
        assert!(card.term_stats.end_term.is_none());
        assert!(card.term_stats.bot_term.is_some());
        assert_eq!(card.comments.class_teacher, "No comment available");
        assert_eq!(card.conduct.discipline, "Good");
        assert_eq!(card.conduct.attendance_remarks, "Regular");
        assert_eq!(card.conduct.attendance_percentage, 100);
    }

    #[test]
    fn later_result_for_same_phase_wins() {
        let subjects = vec![subject("math", "Math")];
        let b = bands();
        let opts = ReportOptions::default();
        let ctx = ReportContext {
            subjects: &subjects,
            grading: &b,
            class_teacher_comments: &[],
            head_teacher_comments: &[],
            phases: PhaseSet::MidEnd,
            options: &opts,
        };
        let card = build_report_card(
            &ctx,
            &student(
                "s1",
                vec![
                    result("math", ExamType::EndOfTerm, 40.0),
                    result("math", ExamType::EndOfTerm, 95.0),
                ],
            ),
        );
        assert_eq!(card.subjects[0].end_term.as_ref().map(|c| c.marks), Some(95.0));
    }

    #[test]
    fn comments_follow_final_phase_average() {
        let subjects = vec![subject("math", "Math")];
        let b = bands();
        let opts = ReportOptions::default();
        let class_bands = vec![
            CommentBand { from: 80.0, to: 100.0, comment: "Excellent work".into() },
            CommentBand { from: 0.0, to: 79.0, comment: "Work harder".into() },
        ];
        let head_bands = vec![CommentBand { from: 90.0, to: 100.0, comment: "Promoted with honours".into() }];
        let ctx = ReportContext {
            subjects: &subjects,
            grading: &b,
            class_teacher_comments: &class_bands,
            head_teacher_comments: &head_bands,
            phases: PhaseSet::MidEnd,
            options: &opts,
        };
        let card = build_report_card(
            &ctx,
            &student(
                "s1",
                vec![
                    result("math", ExamType::MidTerm, 95.0),
                    result("math", ExamType::EndOfTerm, 85.0),
                ],
            ),
        );
        assert_eq!(card.comments.class_teacher, "Excellent work");
        assert_eq!(card.comments.head_teacher, "No comment available");
        assert_eq!(card.subjects[0].teacher_comment, "Needs improvement");
    }

    #[test]
    fn class_positions_rank_final_averages() {
        let subjects = vec![subject("math", "Math")];
        let b = bands();
        let opts = ReportOptions::default();
        let ctx = ReportContext {
            subjects: &subjects,
            grading: &b,
            class_teacher_comments: &[],
            head_teacher_comments: &[],
            phases: PhaseSet::MidEnd,
            options: &opts,
        };
        let students = vec![
            student("a", vec![result("math", ExamType::EndOfTerm, 60.0)]),
            student("b", vec![result("math", ExamType::EndOfTerm, 80.0)]),
            student("c", vec![result("math", ExamType::EndOfTerm, 60.0)]),
            student("d", vec![]),
        ];
        let cards = build_class_reports(&ctx, &students);
        let positions: Vec<Option<u32>> = cards.iter().map(|c| c.position).collect();
        assert_eq!(positions, vec![Some(2), Some(1), Some(2), None]);
        assert!(cards.iter().all(|c| c.class_size == Some(4)));
    }

    #[test]
    fn comments_fall_back_when_final_phase_has_nothing_counted() {
        let subjects = vec![subject("math", "Math")];
        let b = bands();
        let comments = vec![
            CommentBand { from: 50.0, to: 100.0, comment: "Well done".into() },
            CommentBand { from: 0.0, to: 49.0, comment: "Work harder".into() },
        ];
        let opts = ReportOptions::default();
        let ctx = ReportContext {
            subjects: &subjects,
            grading: &b,
            class_teacher_comments: &comments,
            head_teacher_comments: &comments,
            phases: PhaseSet::MidEnd,
            options: &opts,
        };

        // Only a mid-term mark: the end-of-term phase counts no subject.
        let card = build_report_card(&ctx, &student("s1", vec![result("math", ExamType::MidTerm, 95.0)]));
        assert_eq!(card.comments.class_teacher, opts.no_comment);
        assert_eq!(card.comments.head_teacher, opts.no_comment);

        let card = build_report_card(&ctx, &student("s2", vec![result("math", ExamType::EndOfTerm, 30.0)]));
        assert_eq!(card.comments.class_teacher, "Work harder");
    }

    #[test]
    fn report_card_serializes_selected_phases_only() {
        let subjects = vec![subject("math", "Math")];
        let opts = ReportOptions::default();
        let ctx = ReportContext {
            subjects: &subjects,
            grading: &[],
            class_teacher_comments: &[],
            head_teacher_comments: &[],
            phases: PhaseSet::BotMid,
            options: &opts,
        };
        let card = build_report_card(&ctx, &student("s1", vec![]));
        let v = serde_json::to_value(&card).expect("serialize");
        let row = &v["subjects"][0];
        assert!(row.get("botTerm").is_some());
        assert!(row.get("midTerm").is_some());
        assert!(row.get("endTerm").is_none());
        assert_eq!(row["teacherInitials"], "J.D");
        assert!(v["termStats"].get("endTerm").is_none());
    }
}
