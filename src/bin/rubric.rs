#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::Value;

use rubric_harness::gateway::{data_url, ImageRef, ProviderGateway, TracingUsageSink};
use rubric_harness::grader::{generate_rubric, grade_submission, GenerationRequest, GradingRequest};
use rubric_harness::grading::{reconcile, score_selections};
use rubric_harness::logging::init_tracing;
use rubric_harness::prompts::{answer_page, prompt_image, solution_image};
use rubric_harness::rubric::{assess, normalize_json, PointsBreakdown};
use rubric_harness::store::{
    record_grade, save_rubric, AssignmentRecord, RecordStore, SqliteRecordStore, SubmissionRecord,
};
use rubric_harness::GraderConfig;

#[derive(Parser)]
#[command(name = "rubric", version, about = "Rubric normalization and grading CLI")]
struct Cli {
    /// Debug-level logging (overridden by RUBRIC_LOG / RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Record store path
    #[arg(long, global = true, env = "RUBRIC_STORE_PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the canonical form of a rubric (legacy or hierarchical)
    Normalize {
        /// Rubric JSON file (default: stdin)
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Check a rubric's point total against the assignment total
    Check {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        total: u64,
    },
    /// Points per section, per part and for the whole rubric
    Points {
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Reconcile a raw model grading response against a rubric
    Reconcile {
        #[arg(long)]
        rubric: PathBuf,
        #[arg(long)]
        total: u64,
        /// Model response text (default: stdin)
        #[arg(long)]
        response: Option<PathBuf>,
    },
    /// Score a set of manually selected rubric item ids
    Score {
        #[arg(long)]
        rubric: PathBuf,
        /// Selected item id (repeatable)
        #[arg(long = "select")]
        selected: Vec<String>,
    },
    /// Grade answer pages with the vision model
    Grade {
        /// Rubric JSON file; required unless --submission is given
        #[arg(long)]
        rubric: Option<PathBuf>,
        #[arg(long)]
        total: Option<u64>,
        /// Grade a stored submission and persist the outcome
        #[arg(long)]
        submission: Option<String>,
        #[arg(long)]
        prompt_image: Option<PathBuf>,
        /// Student answer page image (repeatable)
        #[arg(long = "page")]
        pages: Vec<PathBuf>,
        #[arg(long)]
        model: Option<String>,
    },
    /// Draft a rubric from the prompt and solution images
    Generate {
        #[arg(long)]
        total: Option<u64>,
        /// Save the draft onto a stored assignment (uses its total)
        #[arg(long)]
        assignment: Option<String>,
        #[arg(long)]
        prompt_image: Option<PathBuf>,
        /// Reference solution image (repeatable)
        #[arg(long = "solution")]
        solutions: Vec<PathBuf>,
        #[arg(long)]
        model: Option<String>,
    },
    /// Normalize and store a rubric on an assignment
    SaveRubric {
        #[arg(long)]
        assignment: String,
        #[arg(long)]
        input: Option<PathBuf>,
        /// Create the assignment with this total if it does not exist
        #[arg(long)]
        total: Option<u64>,
        #[arg(long, default_value = "")]
        title: String,
    },
    /// Register a submission for an assignment
    AddSubmission {
        #[arg(long)]
        id: String,
        #[arg(long)]
        assignment: String,
    },
    /// Print a stored assignment or submission
    Show {
        #[arg(long, conflicts_with = "submission")]
        assignment: Option<String>,
        #[arg(long)]
        submission: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, None)?;
    let mut config = GraderConfig::from_env()?;
    if let Some(db) = cli.db {
        config.store_path = db;
    }

    match cli.command {
        Commands::Normalize { input } => {
            let rubric = normalize_json(&read_input(input.as_deref())?);
            print_json(&rubric)?;
        }
        Commands::Check { input, total } => {
            let rubric = normalize_json(&read_input(input.as_deref())?);
            print_json(&assess(&rubric, total))?;
        }
        Commands::Points { input } => {
            let rubric = normalize_json(&read_input(input.as_deref())?);
            print_json(&PointsBreakdown::of(&rubric))?;
        }
        Commands::Reconcile {
            rubric,
            total,
            response,
        } => {
            let rubric = normalize_json(&std::fs::read_to_string(rubric)?);
            let text = read_input(response.as_deref())?;
            print_json(&reconcile(&text, &rubric, total))?;
        }
        Commands::Score { rubric, selected } => {
            let rubric = normalize_json(&std::fs::read_to_string(rubric)?);
            let selected: BTreeSet<String> = selected.into_iter().collect();
            print_json(&score_selections(&selected, &rubric))?;
        }
        Commands::Grade {
            rubric,
            total,
            submission,
            prompt_image: prompt,
            pages,
            model,
        } => {
            if let Some(model) = model {
                config.model = model;
            }
            let mut images = Vec::new();
            if let Some(path) = prompt {
                images.push(load_image(&path, prompt_image)?);
            }
            for path in &pages {
                images.push(load_image(path, answer_page)?);
            }

            let gateway = ProviderGateway::from_env(Arc::new(TracingUsageSink))?;
            match submission {
                Some(submission_id) => {
                    let store = SqliteRecordStore::new(&config.store_path)?;
                    let record = store
                        .load_submission(&submission_id)
                        .await?
                        .ok_or_else(|| format!("submission not found: {submission_id}"))?;
                    let assignment = store
                        .load_assignment(&record.assignment_id)
                        .await?
                        .ok_or_else(|| format!("assignment not found: {}", record.assignment_id))?;
                    let req = GradingRequest::new(
                        assignment.canonical_rubric(),
                        assignment.total_points,
                    )
                    .with_config(&config)
                    .with_images(images)
                    .for_submission(&assignment.id, &submission_id);
                    let outcome = grade_submission(&gateway, &req).await;
                    record_grade(&store, &submission_id, &outcome).await?;
                    print_json(&outcome)?;
                }
                None => {
                    let (Some(rubric), Some(total)) = (rubric, total) else {
                        return Err("grade requires --rubric and --total, or --submission".into());
                    };
                    let rubric = normalize_json(&std::fs::read_to_string(rubric)?);
                    let req = GradingRequest::new(rubric, total)
                        .with_config(&config)
                        .with_images(images);
                    print_json(&grade_submission(&gateway, &req).await)?;
                }
            }
        }
        Commands::Generate {
            total,
            assignment,
            prompt_image: prompt,
            solutions,
            model,
        } => {
            if let Some(model) = model {
                config.model = model;
            }
            let mut images = Vec::new();
            if let Some(path) = prompt {
                images.push(load_image(&path, prompt_image)?);
            }
            for (idx, path) in solutions.iter().enumerate() {
                images.push(load_image(path, |url| solution_image(idx + 1, url))?);
            }

            let gateway = ProviderGateway::from_env(Arc::new(TracingUsageSink))?;
            match assignment {
                Some(assignment_id) => {
                    let store = SqliteRecordStore::new(&config.store_path)?;
                    let record = store
                        .load_assignment(&assignment_id)
                        .await?
                        .ok_or_else(|| format!("assignment not found: {assignment_id}"))?;
                    let req = GenerationRequest::new(record.total_points)
                        .with_config(&config)
                        .with_images(images)
                        .for_assignment(&assignment_id);
                    let generated = generate_rubric(&gateway, &req).await;
                    let raw = serde_json::to_value(&generated.rubric)?;
                    let (rubric, status) = save_rubric(&store, &assignment_id, Some(&raw)).await?;
                    print_json(&serde_json::json!({
                        "rubric": rubric,
                        "rubricValid": status.rubric_valid,
                        "rubricPoints": status.rubric_points,
                        "fallback": generated.fallback,
                    }))?;
                }
                None => {
                    let total = total.ok_or("generate requires --total or --assignment")?;
                    let req = GenerationRequest::new(total)
                        .with_config(&config)
                        .with_images(images);
                    let generated = generate_rubric(&gateway, &req).await;
                    print_json(&serde_json::json!({
                        "rubric": generated.rubric,
                        "rubricValid": generated.status.rubric_valid,
                        "rubricPoints": generated.status.rubric_points,
                        "fallback": generated.fallback,
                    }))?;
                }
            }
        }
        Commands::SaveRubric {
            assignment,
            input,
            total,
            title,
        } => {
            let store = SqliteRecordStore::new(&config.store_path)?;
            if store.load_assignment(&assignment).await?.is_none() {
                let total = total
                    .ok_or_else(|| format!("assignment not found: {assignment} (pass --total to create it)"))?;
                store
                    .save_assignment(&AssignmentRecord::new(&assignment, title, total))
                    .await?;
            }
            let text = read_input(input.as_deref())?;
            let raw: Option<Value> = serde_json::from_str(&text).ok();
            let (_, status) = save_rubric(&store, &assignment, raw.as_ref()).await?;
            print_json(&status)?;
        }
        Commands::AddSubmission { id, assignment } => {
            let store = SqliteRecordStore::new(&config.store_path)?;
            if store.load_assignment(&assignment).await?.is_none() {
                return Err(format!("assignment not found: {assignment}").into());
            }
            let record = SubmissionRecord::new(id, assignment);
            store.save_submission(&record).await?;
            print_json(&record)?;
        }
        Commands::Show {
            assignment,
            submission,
        } => {
            let store = SqliteRecordStore::new(&config.store_path)?;
            match (assignment, submission) {
                (Some(id), _) => {
                    let record = store
                        .load_assignment(&id)
                        .await?
                        .ok_or_else(|| format!("assignment not found: {id}"))?;
                    print_json(&record)?;
                }
                (None, Some(id)) => {
                    let record = store
                        .load_submission(&id)
                        .await?
                        .ok_or_else(|| format!("submission not found: {id}"))?;
                    print_json(&record)?;
                }
                (None, None) => return Err("show requires --assignment or --submission".into()),
            }
        }
    }

    Ok(())
}

fn read_input(path: Option<&Path>) -> Result<String, io::Error> {
    match path {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path),
        _ => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Read an image file into a captioned data URL.
fn load_image(
    path: &Path,
    caption: impl FnOnce(String) -> ImageRef,
) -> Result<ImageRef, io::Error> {
    let bytes = std::fs::read(path)?;
    let mime = match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/png",
    };
    Ok(caption(data_url(mime, &bytes)))
}
