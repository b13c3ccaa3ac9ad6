use rust_xlsxwriter::{Workbook, Worksheet};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::canvas::CanvasClient;
use crate::config::PollPolicy;
use crate::error::{ReportStep, Result, SurveyError};
use crate::models::GeneratedReport;

pub const REPORT_SHEET: &str = "Reporte";

#[derive(Debug, Deserialize)]
struct CreatedReport {
    id: u64,
    progress_url: String,
}

#[derive(Debug, Deserialize)]
struct Progress {
    workflow_state: String,
}

#[derive(Debug, Deserialize)]
struct ReportFile {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ReportStatus {
    file: ReportFile,
}

/// Runs a `student_analysis` report job for a quiz and converts the CSV it
/// produces into a one-sheet workbook.
///
/// Every call starts a new job on Canvas; callers keep the result.
pub async fn generate_report(
    client: &CanvasClient,
    poll: PollPolicy,
    course_id: &str,
    quiz_id: u64,
    quiz_title: &str,
) -> Result<GeneratedReport> {
    let reports_url = client.api_url(&format!("courses/{course_id}/quizzes/{quiz_id}/reports"));
    let payload = json!({
        "quiz_report": {
            "report_type": "student_analysis",
            "includes_all_versions": true
        }
    });

    let response = client.post_json(&reports_url, &payload).await?;
    if !response.status().is_success() {
        warn!(course_id, quiz_id, status = response.status().as_u16(), "report creation rejected");
        return Err(SurveyError::ReportGeneration(ReportStep::Create));
    }
    let created: CreatedReport = read_json("quiz report", response).await?;
    info!(course_id, quiz_id, report_id = created.id, "report job started");

    wait_until_completed(client, poll, &created.progress_url).await?;

    let status_url = format!("{reports_url}/{}", created.id);
    let response = client.get(&status_url, &[]).await?;
    if !response.status().is_success() {
        warn!(course_id, quiz_id, status = response.status().as_u16(), "report status unavailable");
        return Err(SurveyError::ReportGeneration(ReportStep::Status));
    }
    let status: ReportStatus = read_json("quiz report status", response).await?;

    let response = client.get(&status.file.url, &[]).await?;
    if !response.status().is_success() {
        warn!(course_id, quiz_id, status = response.status().as_u16(), "report download failed");
        return Err(SurveyError::ReportGeneration(ReportStep::Download));
    }
    let csv_bytes = response.bytes().await?;

    let content = csv_to_workbook(&csv_bytes)?;
    info!(course_id, quiz_id, bytes = content.len(), "report converted");

    Ok(GeneratedReport {
        content,
        file_name: report_file_name(quiz_title),
    })
}

pub fn report_file_name(quiz_title: &str) -> String {
    format!("Reporte_{}.xlsx", quiz_title.replace(' ', "_"))
}

/// Longest text Excel keeps in one cell.
const MAX_CELL_CHARS: usize = 32_767;

/// Copies delimited rows into a sheet named `Reporte`. The first row stays
/// text. Below it, a column is written as numbers only when every non-empty
/// field in it parses as one.
pub fn csv_to_workbook(data: &[u8]) -> Result<Vec<u8>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(data);
    let records = reader.records().collect::<std::result::Result<Vec<_>, _>>()?;
    let numeric = numeric_columns(&records);

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(REPORT_SHEET)?;

    for (row, record) in records.iter().enumerate() {
        for (col, field) in record.iter().enumerate() {
            let as_number = row > 0 && numeric[col];
            write_field(sheet, row as u32, col as u16, field, as_number)?;
        }
    }

    Ok(workbook.save_to_buffer()?)
}

fn parse_number(field: &str) -> Option<f64> {
    field.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

fn numeric_columns(records: &[csv::StringRecord]) -> Vec<bool> {
    let width = records.iter().map(|r| r.len()).max().unwrap_or(0);
    let mut numeric = vec![true; width];
    let mut seen = vec![false; width];

    for record in records.iter().skip(1) {
        for (col, field) in record.iter().enumerate() {
            if field.is_empty() {
                continue;
            }
            seen[col] = true;
            if parse_number(field).is_none() {
                numeric[col] = false;
            }
        }
    }

    numeric.iter().zip(&seen).map(|(n, s)| *n && *s).collect()
}

fn write_field(sheet: &mut Worksheet, row: u32, col: u16, field: &str, as_number: bool) -> Result<()> {
    if field.is_empty() {
        return Ok(());
    }
    match parse_number(field) {
        Some(number) if as_number => {
            sheet.write_number(row, col, number)?;
        }
        _ => {
            let text: String = field.chars().take(MAX_CELL_CHARS).collect();
            sheet.write_string(row, col, text)?;
        }
    }
    Ok(())
}

async fn wait_until_completed(client: &CanvasClient, poll: PollPolicy, progress_url: &str) -> Result<()> {
    for attempt in 1..=poll.max_attempts {
        let response = client.get(progress_url, &[]).await?;
        if !response.status().is_success() {
            return Err(SurveyError::ReportGeneration(ReportStep::Progress));
        }
        let progress: Progress = read_json("report progress", response).await?;

        match progress.workflow_state.as_str() {
            "completed" => return Ok(()),
            "failed" => return Err(SurveyError::ReportGeneration(ReportStep::Failed)),
            state => debug!(attempt, state, "report not ready"),
        }

        if attempt < poll.max_attempts {
            tokio::time::sleep(poll.interval).await;
        }
    }

    Err(SurveyError::Timeout {
        attempts: poll.max_attempts,
    })
}

async fn read_json<T: DeserializeOwned>(resource: &str, response: reqwest::Response) -> Result<T> {
    let body: Value = response.json().await?;
    serde_json::from_value(body).map_err(|err| SurveyError::schema(resource, err))
}
