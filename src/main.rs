use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod aggregate;
mod canvas;
mod config;
mod error;
mod export;
mod models;
mod quiz_report;
mod render;
mod session;
mod shell;
#[cfg(test)]
mod test_support;

use canvas::CanvasClient;
use config::Config;
use session::Session;

#[derive(Parser)]
#[command(name = "survey-rates")]
#[command(about = "Survey response rates for Canvas courses", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List courses with their survey quizzes
    Surveys {
        /// Course IDs, separated by commas or spaces
        #[arg(long)]
        courses: String,
    },
    /// Compute response rates and export them to a workbook
    Results {
        #[arg(long)]
        courses: String,
        /// Only these quiz IDs (default: every survey of every course)
        #[arg(long = "quiz")]
        quizzes: Vec<u64>,
        #[arg(long, default_value = export::DEFAULT_EXPORT_FILE)]
        out: PathBuf,
    },
    /// Generate the Canvas student-analysis report of one survey
    Report {
        #[arg(long)]
        course: String,
        #[arg(long)]
        quiz: u64,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Interactive session: pick courses and surveys over several rounds
    Shell {
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env().context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_level))
        .with_writer(std::io::stderr)
        .init();

    let client = CanvasClient::new(&config).context("failed to build HTTP client")?;
    let mut session = Session::new(client, config.poll);

    match cli.command {
        Commands::Surveys { courses } => {
            session.set_input(&courses);
            if session.course_ids().is_empty() {
                println!("No course IDs given.");
                return Ok(());
            }
            for overview in session.overviews().await {
                println!("{}", render::overview(overview, &[]));
            }
        }
        Commands::Results {
            courses,
            quizzes,
            out,
        } => {
            session.set_input(&courses);
            select_surveys(&mut session, &quizzes).await;

            if session.selected().is_empty() {
                println!("No surveys found for these courses.");
                return Ok(());
            }

            for course in session.compute().await {
                println!("{}", render::course_results(course));
            }

            match session.export()? {
                Some(bytes) => {
                    std::fs::write(&out, bytes)
                        .with_context(|| format!("failed to write {}", out.display()))?;
                    println!("Results written to {}.", out.display());
                }
                None => println!("No course had enrolled students; nothing exported."),
            }
        }
        Commands::Report {
            course,
            quiz,
            out_dir,
        } => {
            let course_id = single_course(&mut session, &course)?;
            let report = session
                .report(&course_id, quiz)
                .await
                .with_context(|| format!("report for quiz {quiz} of course {course_id}"))?;
            let path = shell::save_report(&out_dir, report)?;
            println!("Report written to {}.", path.display());
        }
        Commands::Shell { out_dir } => {
            shell::run(&mut session, &out_dir).await?;
        }
    }

    Ok(())
}

async fn select_surveys(session: &mut Session, quizzes: &[u64]) {
    if quizzes.is_empty() {
        session.select_all().await;
        return;
    }

    let wanted: Vec<(String, Vec<u64>)> = session
        .overviews()
        .await
        .into_iter()
        .filter_map(|overview| {
            let surveys = overview.surveys.as_ref().ok()?;
            let ids: Vec<u64> = surveys
                .iter()
                .map(|quiz| quiz.id)
                .filter(|id| quizzes.contains(id))
                .collect();
            (!ids.is_empty()).then(|| (overview.info.course_id.clone(), ids))
        })
        .collect();

    for (course_id, ids) in wanted {
        if let Err(err) = session.select(&course_id, &ids).await {
            println!("! {err}");
        }
    }
}

/// Applies `--course` as the session input and returns the parsed ID.
fn single_course(session: &mut Session, input: &str) -> anyhow::Result<String> {
    session.set_input(input);
    match session.course_ids() {
        [course_id] => Ok(course_id.clone()),
        [] => anyhow::bail!("no course ID given"),
        _ => anyhow::bail!("--course takes exactly one course ID, got {input:?}"),
    }
}
