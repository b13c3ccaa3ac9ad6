use std::collections::{HashMap, HashSet};

use tracing::{info, warn};

use crate::aggregate::{self, CourseResults};
use crate::canvas::CanvasClient;
use crate::config::PollPolicy;
use crate::error::{Result, SurveyError};
use crate::export;
use crate::models::{CourseInfo, GeneratedReport, Quiz};
use crate::quiz_report;

pub const UNKNOWN_PROGRAM: &str = "Not specified";

/// Splits course IDs on commas and whitespace, dropping repeats while
/// keeping first-seen order.
pub fn parse_course_ids(input: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    input
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .filter(|id| seen.insert(id.to_string()))
        .map(str::to_string)
        .collect()
}

/// A course as listed for selection.
#[derive(Debug)]
pub struct CourseOverview {
    pub info: CourseInfo,
    pub surveys: Result<Vec<Quiz>>,
}

/// Everything derived from the current course-ID text.
#[derive(Debug, Default)]
struct SessionState {
    input: String,
    course_ids: Vec<String>,
    overviews: HashMap<String, CourseOverview>,
    selections: HashMap<String, Vec<u64>>,
    results: Vec<CourseResults>,
    generated_reports: HashMap<(String, u64), GeneratedReport>,
}

/// Interaction context: holds the client, its response cache, and all
/// selection state for one course-ID input.
pub struct Session {
    client: CanvasClient,
    poll: PollPolicy,
    state: SessionState,
}

impl Session {
    pub fn new(client: CanvasClient, poll: PollPolicy) -> Self {
        Self {
            client,
            poll,
            state: SessionState::default(),
        }
    }

    /// Applies new input text. A change drops every selection, result,
    /// generated report and cached response in one step; returns whether
    /// that happened.
    pub fn set_input(&mut self, input: &str) -> bool {
        if input == self.state.input {
            return false;
        }

        self.state = SessionState {
            input: input.to_string(),
            course_ids: parse_course_ids(input),
            ..SessionState::default()
        };
        let dropped = self.client.cache().len();
        self.client.clear_cache();
        info!(
            courses = self.state.course_ids.len(),
            dropped_responses = dropped,
            "session reset for new course list"
        );
        true
    }

    pub fn course_ids(&self) -> &[String] {
        &self.state.course_ids
    }

    pub fn results(&self) -> &[CourseResults] {
        &self.state.results
    }

    /// Loads (once per session) the heading data and survey list of every
    /// input course, in input order.
    pub async fn overviews(&mut self) -> Vec<&CourseOverview> {
        for course_id in self.state.course_ids.clone() {
            if !self.state.overviews.contains_key(&course_id) {
                let overview = self.load_overview(&course_id).await;
                self.state.overviews.insert(course_id, overview);
            }
        }
        self.state
            .course_ids
            .iter()
            .filter_map(|id| self.state.overviews.get(id))
            .collect()
    }

    async fn load_overview(&mut self, course_id: &str) -> CourseOverview {
        let link = self.client.course_link(course_id);
        let (name, program_name, start_date) = match self.client.course(course_id).await {
            Ok(course) => {
                let program_name = match course.account_id {
                    Some(account_id) => match self.client.account(account_id).await {
                        Ok(account) => account.name,
                        Err(err) => {
                            warn!(course_id, account_id, error = %err, "account lookup failed");
                            UNKNOWN_PROGRAM.to_string()
                        }
                    },
                    None => UNKNOWN_PROGRAM.to_string(),
                };
                (course.name, program_name, course.start_at.map(|d| d.date_naive()))
            }
            Err(err) => {
                warn!(course_id, error = %err, "course lookup failed");
                (format!("Course ID: {course_id}"), UNKNOWN_PROGRAM.to_string(), None)
            }
        };

        let close_date = match self.client.last_assignment_due_at(course_id).await {
            Ok(due) => due.map(|d| d.date_naive()),
            Err(err) => {
                warn!(course_id, error = %err, "assignment dates unavailable");
                None
            }
        };

        let surveys = self.client.survey_quizzes(course_id).await;
        if let Err(err) = &surveys {
            warn!(course_id, error = %err, "quiz lookup failed");
        }

        CourseOverview {
            info: CourseInfo {
                course_id: course_id.to_string(),
                name,
                program_name,
                link,
                start_date,
                close_date,
            },
            surveys,
        }
    }

    /// Marks surveys of a course as selected. Unknown quiz IDs are rejected.
    pub async fn select(&mut self, course_id: &str, quiz_ids: &[u64]) -> Result<()> {
        self.overviews().await;
        let surveys = self.surveys_of(course_id)?;
        for quiz_id in quiz_ids {
            if !surveys.iter().any(|quiz| quiz.id == *quiz_id) {
                return Err(SurveyError::UnknownSurvey {
                    course_id: course_id.to_string(),
                    quiz_id: *quiz_id,
                });
            }
        }

        let selection = self.state.selections.entry(course_id.to_string()).or_default();
        for quiz_id in quiz_ids {
            if !selection.contains(quiz_id) {
                selection.push(*quiz_id);
            }
        }
        Ok(())
    }

    /// Selects every survey of every course that listed successfully.
    pub async fn select_all(&mut self) {
        self.overviews().await;
        for course_id in self.state.course_ids.clone() {
            let quiz_ids: Vec<u64> = match self.surveys_of(&course_id) {
                Ok(surveys) => surveys.iter().map(|quiz| quiz.id).collect(),
                Err(_) => continue,
            };
            if !quiz_ids.is_empty() {
                self.state.selections.insert(course_id, quiz_ids);
            }
        }
    }

    pub fn clear_selection(&mut self) {
        self.state.selections.clear();
        self.state.results.clear();
    }

    /// Selected surveys per course, in input order, each in listing order.
    pub fn selected(&self) -> Vec<(&CourseInfo, Vec<&Quiz>)> {
        self.state
            .course_ids
            .iter()
            .filter_map(|course_id| {
                let chosen = self.state.selections.get(course_id)?;
                let overview = self.state.overviews.get(course_id)?;
                let surveys = overview.surveys.as_ref().ok()?;
                let quizzes: Vec<&Quiz> = surveys
                    .iter()
                    .filter(|quiz| chosen.contains(&quiz.id))
                    .collect();
                (!quizzes.is_empty()).then_some((&overview.info, quizzes))
            })
            .collect()
    }

    /// Computes response rates for every course with a selection.
    pub async fn compute(&mut self) -> &[CourseResults] {
        let work: Vec<(CourseInfo, Vec<Quiz>)> = self
            .selected()
            .into_iter()
            .map(|(info, quizzes)| (info.clone(), quizzes.into_iter().cloned().collect()))
            .collect();

        let mut results = Vec::with_capacity(work.len());
        for (info, surveys) in &work {
            results.push(aggregate::compute_results(&self.client, info, surveys).await);
        }
        self.state.results = results;
        &self.state.results
    }

    /// Returns the cached report for a survey, generating it on first use.
    pub async fn report(&mut self, course_id: &str, quiz_id: u64) -> Result<&GeneratedReport> {
        let key = (course_id.to_string(), quiz_id);
        if !self.state.generated_reports.contains_key(&key) {
            self.overviews().await;
            let title = self
                .surveys_of(course_id)?
                .iter()
                .find(|quiz| quiz.id == quiz_id)
                .map(|quiz| quiz.title.clone())
                .ok_or_else(|| SurveyError::UnknownSurvey {
                    course_id: course_id.to_string(),
                    quiz_id,
                })?;

            let report =
                quiz_report::generate_report(&self.client, self.poll, course_id, quiz_id, &title).await?;
            self.state.generated_reports.insert(key.clone(), report);
        }

        self.state
            .generated_reports
            .get(&key)
            .ok_or_else(|| SurveyError::UnknownSurvey {
                course_id: course_id.to_string(),
                quiz_id,
            })
    }

    /// Combined workbook of the last computed results, if any course has rows.
    pub fn export(&self) -> Result<Option<Vec<u8>>> {
        if !self
            .state
            .results
            .iter()
            .any(|course| course.has_students() && !course.rows.is_empty())
        {
            return Ok(None);
        }
        export::build_workbook(&self.state.results).map(Some)
    }

    fn surveys_of(&self, course_id: &str) -> Result<&[Quiz]> {
        match self.state.overviews.get(course_id) {
            Some(CourseOverview { surveys: Ok(surveys), .. }) => Ok(surveys),
            Some(CourseOverview { surveys: Err(_), .. }) => Err(SurveyError::SurveysUnavailable {
                course_id: course_id.to_string(),
            }),
            None => Err(SurveyError::UnknownCourse {
                course_id: course_id.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;

    use super::*;
    use crate::models::{Measure, QuizType};
    use crate::test_support;

    #[test]
    fn duplicate_ids_are_dropped_in_order() {
        assert_eq!(parse_course_ids("101, 101 202 202"), vec!["101", "202"]);
        assert_eq!(parse_course_ids("  7,8\n9\t7 ,,"), vec!["7", "8", "9"]);
        assert!(parse_course_ids(" , ").is_empty());
    }

    fn seeded_session() -> Session {
        let config = test_support::config("http://127.0.0.1:9");
        let client = CanvasClient::new(&config).unwrap();
        let mut session = Session::new(client, config.poll);
        session.set_input("101");

        let info = CourseInfo {
            course_id: "101".to_string(),
            name: "Algebra I".to_string(),
            program_name: "Engineering".to_string(),
            link: "http://127.0.0.1:9/courses/101".to_string(),
            start_date: None,
            close_date: None,
        };
        session.state.overviews.insert(
            "101".to_string(),
            CourseOverview {
                info: info.clone(),
                surveys: Ok(vec![Quiz {
                    id: 5,
                    title: "Opening".to_string(),
                    quiz_type: QuizType::Survey,
                }]),
            },
        );
        session.state.selections.insert("101".to_string(), vec![5]);
        session.state.generated_reports.insert(
            ("101".to_string(), 5),
            GeneratedReport {
                content: vec![1, 2, 3],
                file_name: "Reporte_Opening.xlsx".to_string(),
            },
        );
        session.state.results.push(CourseResults {
            info,
            enrolled: 3,
            rows: Vec::new(),
            warnings: Vec::new(),
        });
        session
            .client
            .cache_mut()
            .insert("http://127.0.0.1:9/api/v1/courses/101", &[], serde_json::json!({}));
        session
    }

    #[test]
    fn unchanged_input_keeps_state() {
        let mut session = seeded_session();
        assert!(!session.set_input("101"));
        assert_eq!(session.selected().len(), 1);
        assert_eq!(session.state.generated_reports.len(), 1);
        assert_eq!(session.client.cache().len(), 1);
    }

    #[test]
    fn changed_input_resets_everything_at_once() {
        let mut session = seeded_session();
        assert!(session.set_input("101 202"));

        assert_eq!(session.course_ids(), ["101", "202"]);
        assert!(session.selected().is_empty());
        assert!(session.results().is_empty());
        assert!(session.state.generated_reports.is_empty());
        assert!(session.state.overviews.is_empty());
        assert_eq!(session.client.cache().len(), 0);
    }

    #[tokio::test]
    async fn cached_report_is_reused() {
        let mut session = seeded_session();
        let report = session.report("101", 5).await.unwrap();
        assert_eq!(report.file_name, "Reporte_Opening.xlsx");
        assert_eq!(report.content, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn selecting_an_unknown_survey_is_rejected() {
        let mut session = seeded_session();
        let err = session.select("101", &[6]).await.unwrap_err();
        assert!(matches!(err, SurveyError::UnknownSurvey { quiz_id: 6, .. }));
    }

    #[tokio::test]
    async fn failed_course_lookup_falls_back_to_placeholders() {
        let app = Router::new()
            .route(
                "/api/v1/courses/{id}/assignments",
                get(|| async {
                    Json(json!([
                        {"id": 1, "due_at": "2024-06-01T23:59:00Z"},
                        {"id": 2, "due_at": null},
                        {"id": 3, "due_at": "2024-07-15T12:00:00Z"}
                    ]))
                }),
            )
            .route(
                "/api/v1/courses/{id}/quizzes",
                get(|| async {
                    Json(json!([
                        {"id": 5, "title": "Opening", "quiz_type": "survey"},
                        {"id": 6, "title": "Midterm", "quiz_type": "assignment"}
                    ]))
                }),
            );
        let (listener, base) = test_support::bind().await;
        test_support::serve(listener, app);

        let config = test_support::config(&base);
        let mut session = Session::new(CanvasClient::new(&config).unwrap(), config.poll);
        session.set_input("404");

        let overviews = session.overviews().await;
        assert_eq!(overviews.len(), 1);
        let info = &overviews[0].info;
        assert_eq!(info.name, "Course ID: 404");
        assert_eq!(info.program_name, UNKNOWN_PROGRAM);
        assert_eq!(info.link, format!("{base}/courses/404"));
        assert_eq!(info.start_date, None);
        assert_eq!(info.close_date, chrono::NaiveDate::from_ymd_opt(2024, 7, 15));

        let surveys = overviews[0].surveys.as_ref().unwrap();
        assert_eq!(surveys.len(), 1);
        assert_eq!(surveys[0].id, 5);
    }

    #[test]
    fn export_needs_rows() {
        let mut session = seeded_session();
        assert!(session.export().unwrap().is_none());

        let quiz = Quiz {
            id: 5,
            title: "Opening".to_string(),
            quiz_type: QuizType::Survey,
        };
        let students: HashSet<u64> = (1..=3).collect();
        let row = aggregate::summarize_survey(&quiz, &students, &[]);
        assert_eq!(row.submitted, Measure::NotApplicable);
        session.state.results[0].rows.push(row);

        let bytes = session.export().unwrap().unwrap();
        assert!(!bytes.is_empty());
    }
}
