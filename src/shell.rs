use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::export::DEFAULT_EXPORT_FILE;
use crate::models::GeneratedReport;
use crate::render;
use crate::session::Session;

const HELP: &str = "\
Commands:
  courses <ids>               set the course IDs (comma or space separated)
  list                        show courses and their surveys
  select <course> <quiz>...   select surveys of a course
  select all                  select every survey listed
  clear                       drop the current selection
  results                     compute response rates for the selection
  report <course> <quiz>      generate and save the quiz report
  export [path]               save every result to one workbook
  help                        show this text
  quit                        leave";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Courses(String),
    List,
    Select { course_id: String, quiz_ids: Vec<u64> },
    SelectAll,
    Clear,
    Results,
    Report { course_id: String, quiz_id: u64 },
    Export(Option<PathBuf>),
    Help,
    Quit,
}

fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    let args: Vec<&str> = rest.split_whitespace().collect();

    let command = match verb {
        "" => return Ok(None),
        "courses" => Command::Courses(rest.to_string()),
        "list" => Command::List,
        "select" if args == ["all"] => Command::SelectAll,
        "select" => match args.split_first() {
            Some((course_id, quiz_ids)) if !quiz_ids.is_empty() => Command::Select {
                course_id: course_id.to_string(),
                quiz_ids: quiz_ids
                    .iter()
                    .map(|id| parse_quiz_id(id))
                    .collect::<Result<_, _>>()?,
            },
            _ => return Err("usage: select <course> <quiz>... | select all".to_string()),
        },
        "clear" => Command::Clear,
        "results" => Command::Results,
        "report" => match args.as_slice() {
            [course_id, quiz_id] => Command::Report {
                course_id: course_id.to_string(),
                quiz_id: parse_quiz_id(quiz_id)?,
            },
            _ => return Err("usage: report <course> <quiz>".to_string()),
        },
        "export" => Command::Export(args.first().map(|path| PathBuf::from(*path))),
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("unknown command {other:?}; type help")),
    };
    Ok(Some(command))
}

fn parse_quiz_id(raw: &str) -> Result<u64, String> {
    raw.parse()
        .map_err(|_| format!("{raw:?} is not a quiz ID"))
}

/// Reads commands from stdin until `quit` or end of input. Each line is one
/// interaction round against the same session.
pub async fn run(session: &mut Session, out_dir: &Path) -> anyhow::Result<()> {
    println!("{HELP}");
    let stdin = io::stdin();
    let mut line = String::new();

    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        match parse_command(&line) {
            Ok(None) => {}
            Ok(Some(Command::Quit)) => break,
            Ok(Some(command)) => execute(session, command, out_dir).await?,
            Err(message) => println!("{message}"),
        }
    }

    Ok(())
}

async fn execute(session: &mut Session, command: Command, out_dir: &Path) -> anyhow::Result<()> {
    match command {
        Command::Courses(input) => {
            if session.set_input(&input) {
                println!("Course list set to {} course(s).", session.course_ids().len());
            }
            list(session).await;
        }
        Command::List => list(session).await,
        Command::Select { course_id, quiz_ids } => {
            if let Err(err) = session.select(&course_id, &quiz_ids).await {
                println!("! {err}");
            }
        }
        Command::SelectAll => {
            session.select_all().await;
            println!("{} course(s) with selected surveys.", session.selected().len());
        }
        Command::Clear => session.clear_selection(),
        Command::Results => {
            if session.selected().is_empty() {
                println!("No surveys selected.");
                return Ok(());
            }
            for course in session.compute().await {
                println!("{}", render::course_results(course));
            }
        }
        Command::Report { course_id, quiz_id } => match session.report(&course_id, quiz_id).await {
            Ok(report) => {
                let path = save_report(out_dir, report)?;
                println!("Report saved to {}.", path.display());
            }
            Err(err) => println!("! {err}"),
        },
        Command::Export(path) => match session.export()? {
            Some(bytes) => {
                let path = path.unwrap_or_else(|| out_dir.join(DEFAULT_EXPORT_FILE));
                std::fs::write(&path, bytes)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!("Results written to {}.", path.display());
            }
            None => println!("Nothing to export; run results first."),
        },
        Command::Help => println!("{HELP}"),
        Command::Quit => {}
    }
    Ok(())
}

async fn list(session: &mut Session) {
    let selected: Vec<(String, Vec<u64>)> = session
        .selected()
        .into_iter()
        .map(|(info, quizzes)| (info.course_id.clone(), quizzes.iter().map(|q| q.id).collect()))
        .collect();

    for overview in session.overviews().await {
        let chosen = selected
            .iter()
            .find(|(course_id, _)| *course_id == overview.info.course_id)
            .map(|(_, ids)| ids.as_slice())
            .unwrap_or(&[]);
        println!("{}", render::overview(overview, chosen));
    }
}

/// Writes a generated report under `dir`, keeping the file name inside it.
pub fn save_report(dir: &Path, report: &GeneratedReport) -> anyhow::Result<PathBuf> {
    let file_name = report.file_name.replace(['/', '\\'], "_");
    let path = dir.join(file_name);
    std::fs::write(&path, &report.content)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_parse() {
        assert_eq!(
            parse_command("courses 101, 202\n").unwrap(),
            Some(Command::Courses("101, 202".to_string()))
        );
        assert_eq!(
            parse_command("select 101 5 6").unwrap(),
            Some(Command::Select {
                course_id: "101".to_string(),
                quiz_ids: vec![5, 6]
            })
        );
        assert_eq!(parse_command("select all").unwrap(), Some(Command::SelectAll));
        assert_eq!(
            parse_command("report 101 5").unwrap(),
            Some(Command::Report {
                course_id: "101".to_string(),
                quiz_id: 5
            })
        );
        assert_eq!(parse_command("export").unwrap(), Some(Command::Export(None)));
        assert_eq!(
            parse_command("export out.xlsx").unwrap(),
            Some(Command::Export(Some(PathBuf::from("out.xlsx"))))
        );
        assert_eq!(parse_command("   ").unwrap(), None);
        assert_eq!(parse_command("exit").unwrap(), Some(Command::Quit));
    }

    #[test]
    fn bad_commands_explain_themselves() {
        assert!(parse_command("select 101").unwrap_err().starts_with("usage"));
        assert!(parse_command("report 101 five").unwrap_err().contains("five"));
        assert!(parse_command("frobnicate").unwrap_err().contains("unknown command"));
    }

    #[test]
    fn report_names_cannot_escape_the_directory() {
        let dir = std::env::temp_dir();
        let report = GeneratedReport {
            content: vec![0, 1],
            file_name: "Reporte_Pre/Post.xlsx".to_string(),
        };
        let path = save_report(&dir, &report).unwrap();
        assert_eq!(path, dir.join("Reporte_Pre_Post.xlsx"));
        assert_eq!(std::fs::read(&path).unwrap(), vec![0, 1]);
        std::fs::remove_file(path).unwrap();
    }
}
