use std::fmt;

use thiserror::Error;

/// Step of a quiz report job that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStep {
    Create,
    Progress,
    Status,
    Download,
    Failed,
}

impl fmt::Display for ReportStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            ReportStep::Create => "report generation failed",
            ReportStep::Progress => "error checking report progress",
            ReportStep::Status => "error obtaining report status",
            ReportStep::Download => "error downloading report file",
            ReportStep::Failed => "the report job failed on the server",
        };
        f.write_str(message)
    }
}

#[derive(Debug, Error)]
pub enum SurveyError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to fetch {resource}: HTTP {status}")]
    Fetch { resource: String, status: u16 },

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected {resource} payload: {source}")]
    Schema {
        resource: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0}")]
    ReportGeneration(ReportStep),

    #[error("report was not ready after {attempts} polls")]
    Timeout { attempts: u32 },

    #[error("report file is not valid CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to build workbook: {0}")]
    Workbook(#[from] rust_xlsxwriter::XlsxError),

    #[error("course {course_id} is not in the current course list")]
    UnknownCourse { course_id: String },

    #[error("surveys of course {course_id} could not be listed")]
    SurveysUnavailable { course_id: String },

    #[error("quiz {quiz_id} is not a survey of course {course_id}")]
    UnknownSurvey { course_id: String, quiz_id: u64 },
}

impl SurveyError {
    pub fn schema(resource: impl Into<String>, source: serde_json::Error) -> Self {
        SurveyError::Schema {
            resource: resource.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SurveyError>;
