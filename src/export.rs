use rust_xlsxwriter::{Color, Format, FormatAlign, FormatUnderline, Workbook, Worksheet};

use crate::aggregate::CourseResults;
use crate::error::Result;
use crate::models::{Measure, SurveyResult};

pub const RESULTS_SHEET: &str = "Resultados";
pub const DEFAULT_EXPORT_FILE: &str = "survey_results.xlsx";

pub const HEADERS: [&str; 6] = [
    "Survey",
    "#Enrolled",
    "#Submitted",
    "%Submitted",
    "#NotSubmitted",
    "%NotSubmitted",
];

const COLUMN_WIDTHS: [f64; 6] = [30.0, 12.0, 15.0, 15.0, 15.0, 17.0];

/// Stacks every course block on one sheet:
///
/// ```text
/// Program: | <program>
/// Course:  | <course>
/// Link:    | <hyperlink>
/// <blank>
/// Survey | #Enrolled | #Submitted | %Submitted | #NotSubmitted | %NotSubmitted
/// <one row per survey>
/// <blank>
/// <blank>
/// ```
///
/// Courses without students are left out.
pub fn build_workbook(courses: &[CourseResults]) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();

    let header_format = Format::new().set_bold().set_font_size(12);
    let label_format = Format::new().set_bold();
    let center_format = Format::new().set_align(FormatAlign::Center);
    let link_format = Format::new()
        .set_font_color(Color::Blue)
        .set_underline(FormatUnderline::Single);

    let sheet = workbook.add_worksheet();
    sheet.set_name(RESULTS_SHEET)?;

    let mut row = 0u32;
    for course in courses.iter().filter(|c| c.has_students() && !c.rows.is_empty()) {
        sheet.write_string_with_format(row, 0, "Program:", &label_format)?;
        sheet.write_string(row, 1, &course.info.program_name)?;
        row += 1;

        sheet.write_string_with_format(row, 0, "Course:", &label_format)?;
        sheet.write_string(row, 1, &course.info.name)?;
        row += 1;

        sheet.write_string_with_format(row, 0, "Link:", &label_format)?;
        sheet.write_url_with_format(row, 1, course.info.link.as_str(), &link_format)?;
        row += 2;

        for (col, title) in HEADERS.iter().enumerate() {
            sheet.write_string_with_format(row, col as u16, *title, &header_format)?;
        }
        row += 1;

        for result in &course.rows {
            write_result_row(sheet, row, result)?;
            row += 1;
        }

        row += 2;
    }

    for (col, width) in COLUMN_WIDTHS.iter().enumerate() {
        sheet.set_column_width(col as u16, *width)?;
        if col > 0 {
            sheet.set_column_format(col as u16, &center_format)?;
        }
    }

    Ok(workbook.save_to_buffer()?)
}

fn write_result_row(sheet: &mut Worksheet, row: u32, result: &SurveyResult) -> Result<()> {
    sheet.write_string(row, 0, &result.survey_title)?;
    sheet.write_number(row, 1, result.enrolled as f64)?;
    write_count(sheet, row, 2, result.submitted)?;
    write_text(sheet, row, 3, result.submitted_pct)?;
    write_count(sheet, row, 4, result.not_submitted)?;
    write_text(sheet, row, 5, result.not_submitted_pct)?;
    Ok(())
}

// The "nobody answered" marker becomes an empty cell.
fn write_count(sheet: &mut Worksheet, row: u32, col: u16, value: Measure<usize>) -> Result<()> {
    if let Some(count) = value.value() {
        sheet.write_number(row, col, count as f64)?;
    }
    Ok(())
}

fn write_text<T: std::fmt::Display>(sheet: &mut Worksheet, row: u32, col: u16, value: Measure<T>) -> Result<()> {
    if let Measure::Value(_) = &value {
        sheet.write_string(row, col, value.to_string())?;
    }
    Ok(())
}
