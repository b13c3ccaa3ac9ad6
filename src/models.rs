use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

/// Marker shown instead of a count or percentage when nobody has answered.
pub const NOT_APPLICABLE: &str = "---";

/// Enrollment name Canvas gives to the student-view test account.
pub const TEST_STUDENT_NAME: &str = "Test Student";

#[derive(Debug, Clone, Deserialize)]
pub struct Course {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub account_id: Option<u64>,
    #[serde(default)]
    pub start_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizType {
    PracticeQuiz,
    Assignment,
    GradedSurvey,
    Survey,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Quiz {
    pub id: u64,
    pub title: String,
    pub quiz_type: QuizType,
}

impl Quiz {
    pub fn is_survey(&self) -> bool {
        matches!(self.quiz_type, QuizType::Survey | QuizType::GradedSurvey)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnrollmentUser {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Enrollment {
    pub user_id: u64,
    #[serde(rename = "type")]
    pub enrollment_type: String,
    pub enrollment_state: String,
    pub user: EnrollmentUser,
}

impl Enrollment {
    pub fn is_active_student(&self) -> bool {
        self.enrollment_type == "StudentEnrollment"
            && self.enrollment_state == "active"
            && self.user.name != TEST_STUDENT_NAME
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Submission {
    pub id: u64,
    pub user_id: u64,
    pub quiz_id: u64,
    #[serde(default)]
    pub attempt: Option<u32>,
    #[serde(default)]
    pub workflow_state: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Assignment {
    pub id: u64,
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
}

/// What the UI shows for a course before any survey is selected.
#[derive(Debug, Clone)]
pub struct CourseInfo {
    pub course_id: String,
    pub name: String,
    pub program_name: String,
    pub link: String,
    pub start_date: Option<NaiveDate>,
    pub close_date: Option<NaiveDate>,
}

/// A computed value, or the explicit "nobody answered" marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measure<T> {
    Value(T),
    NotApplicable,
}

impl<T: Copy> Measure<T> {
    pub fn value(&self) -> Option<T> {
        match self {
            Measure::Value(value) => Some(*value),
            Measure::NotApplicable => None,
        }
    }
}

impl<T: fmt::Display> fmt::Display for Measure<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Measure::Value(value) => write!(f, "{value}"),
            Measure::NotApplicable => f.write_str(NOT_APPLICABLE),
        }
    }
}

/// Whole-number percentage, rendered as `40%`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Percent(pub u32);

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SurveyResult {
    pub survey_title: String,
    pub enrolled: usize,
    pub submitted: Measure<usize>,
    pub submitted_pct: Measure<Percent>,
    pub not_submitted: Measure<usize>,
    pub not_submitted_pct: Measure<Percent>,
}

/// Spreadsheet produced from a quiz report job.
#[derive(Debug, Clone)]
pub struct GeneratedReport {
    pub content: Vec<u8>,
    pub file_name: String,
}
