use std::fmt::Write;

use chrono::NaiveDate;

use crate::aggregate::CourseResults;
use crate::export::HEADERS;
use crate::models::{CourseInfo, SurveyResult};
use crate::session::CourseOverview;

pub fn course_heading(info: &CourseInfo) -> String {
    format!(
        "{} (ID: {}) (Start: {} | Close: {})",
        info.name,
        info.course_id,
        format_date(info.start_date),
        format_date(info.close_date)
    )
}

fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Course heading plus its survey list, marking the selected ones.
pub fn overview(overview: &CourseOverview, selected: &[u64]) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "## {}", course_heading(&overview.info));
    let _ = writeln!(output, "Program: {}", overview.info.program_name);

    match &overview.surveys {
        Err(err) => {
            let _ = writeln!(
                output,
                "! Error fetching the surveys of course {}: {err}",
                overview.info.course_id
            );
        }
        Ok(surveys) if surveys.is_empty() => {
            let _ = writeln!(output, "No surveys found in this course.");
        }
        Ok(surveys) => {
            for survey in surveys {
                let mark = if selected.contains(&survey.id) { "x" } else { " " };
                let _ = writeln!(output, "  [{mark}] {} (ID: {})", survey.title, survey.id);
            }
        }
    }

    output
}

/// Per-course block: heading, inline warnings, then the response-rate table.
pub fn course_results(course: &CourseResults) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "## {}", course_heading(&course.info));

    for warning in &course.warnings {
        let _ = writeln!(output, "! {warning}");
    }

    if !course.has_students() {
        let _ = writeln!(output, "No enrolled students found in this course.");
        return output;
    }

    let rows: Vec<[String; 6]> = course.rows.iter().map(table_row).collect();
    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (col, cell) in row.iter().enumerate() {
            widths[col] = widths[col].max(cell.chars().count());
        }
    }

    let header: Vec<String> = HEADERS.iter().map(|h| h.to_string()).collect();
    write_table_line(&mut output, &header, &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    write_table_line(&mut output, &rule, &widths);
    for row in &rows {
        write_table_line(&mut output, row, &widths);
    }

    output
}

fn table_row(result: &SurveyResult) -> [String; 6] {
    [
        result.survey_title.clone(),
        result.enrolled.to_string(),
        result.submitted.to_string(),
        result.submitted_pct.to_string(),
        result.not_submitted.to_string(),
        result.not_submitted_pct.to_string(),
    ]
}

fn write_table_line(output: &mut String, cells: &[String], widths: &[usize; 6]) {
    let mut line = String::new();
    for (col, cell) in cells.iter().enumerate() {
        let pad = widths[col].saturating_sub(cell.chars().count());
        if col == 0 {
            line.push_str(cell);
            line.push_str(&" ".repeat(pad));
        } else {
            line.push_str("  ");
            line.push_str(&" ".repeat(pad));
            line.push_str(cell);
        }
    }
    let _ = writeln!(output, "{}", line.trim_end());
}
