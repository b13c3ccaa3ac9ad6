use std::collections::HashSet;

use tracing::warn;

use crate::canvas::CanvasClient;
use crate::models::{CourseInfo, Enrollment, Measure, Percent, Quiz, Submission, SurveyResult};

/// Response-rate rows for one course, plus the problems met while fetching.
#[derive(Debug, Clone)]
pub struct CourseResults {
    pub info: CourseInfo,
    pub enrolled: usize,
    pub rows: Vec<SurveyResult>,
    pub warnings: Vec<String>,
}

impl CourseResults {
    pub fn has_students(&self) -> bool {
        self.enrolled > 0
    }
}

/// Fetches enrollments once, then submissions survey by survey, in the order
/// the surveys were selected.
pub async fn compute_results(client: &CanvasClient, info: &CourseInfo, surveys: &[Quiz]) -> CourseResults {
    let mut warnings = Vec::new();

    let enrollments = client.student_enrollments(&info.course_id).await;
    if let Some(err) = &enrollments.error {
        warn!(course_id = %info.course_id, error = %err, "enrollments incomplete");
        warnings.push(format!(
            "Error fetching enrollments for course {}: {err}",
            info.name
        ));
    }

    let students = active_student_ids(&enrollments.items);
    if students.is_empty() {
        return CourseResults {
            info: info.clone(),
            enrolled: 0,
            rows: Vec::new(),
            warnings,
        };
    }

    let mut rows = Vec::with_capacity(surveys.len());
    for survey in surveys {
        let submissions = client.quiz_submissions(&info.course_id, survey.id).await;
        if let Some(err) = &submissions.error {
            warn!(course_id = %info.course_id, quiz_id = survey.id, error = %err, "submissions incomplete");
            warnings.push(format!(
                "Error fetching responses for survey '{}' in course '{}': {err}",
                survey.title, info.name
            ));
        }
        rows.push(summarize_survey(survey, &students, &submissions.items));
    }

    CourseResults {
        info: info.clone(),
        enrolled: students.len(),
        rows,
        warnings,
    }
}

pub fn active_student_ids(enrollments: &[Enrollment]) -> HashSet<u64> {
    enrollments
        .iter()
        .filter(|enrollment| enrollment.is_active_student())
        .map(|enrollment| enrollment.user_id)
        .collect()
}

pub fn summarize_survey(
    survey: &Quiz,
    students: &HashSet<u64>,
    submissions: &[Submission],
) -> SurveyResult {
    let enrolled = students.len();
    let submitters: HashSet<u64> = submissions
        .iter()
        .map(|submission| submission.user_id)
        .filter(|user_id| students.contains(user_id))
        .collect();
    let submitted = submitters.len();

    let (submitted, submitted_pct, not_submitted, not_submitted_pct) = if submitted == 0 {
        (
            Measure::NotApplicable,
            Measure::NotApplicable,
            Measure::NotApplicable,
            Measure::NotApplicable,
        )
    } else {
        let pct = percent_of(submitted, enrolled);
        (
            Measure::Value(submitted),
            Measure::Value(Percent(pct)),
            Measure::Value(enrolled - submitted),
            Measure::Value(Percent(100 - pct)),
        )
    };

    SurveyResult {
        survey_title: survey.title.clone(),
        enrolled,
        submitted,
        submitted_pct,
        not_submitted,
        not_submitted_pct,
    }
}

/// Share of `whole`, rounded to a whole percent with ties going to the even
/// neighbour.
pub fn percent_of(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        return 0;
    }
    ((part as f64 / whole as f64) * 100.0).round_ties_even() as u32
}
