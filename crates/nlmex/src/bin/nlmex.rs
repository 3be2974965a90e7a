//! nlmex CLI: extract NLM metadata from documents on the worker pool.
//!
//! Usage:
//!   nlmex [--config path] [--workers N] [--output-dir dir] [--json] FILE...

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::{info, warn};
use nlmex::config::load_config_or_default;
use nlmex::telemetry::init_logging;
use nlmex::{ExtractionTask, NlmexError, ResultType, TaskError, TaskManager, TaskStatus};

#[derive(Parser)]
#[command(
    name = "nlmex",
    version,
    about = "Extract NLM-XML metadata from PDF documents"
)]
struct Cli {
    /// Documents to extract
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Path to a JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured worker count
    #[arg(long)]
    workers: Option<usize>,

    /// Write each NLM document into this directory
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Print task snapshots as JSON instead of a summary
    #[arg(long)]
    json: bool,

    /// Seconds to wait for each task before reporting it as-is
    #[arg(long, default_value_t = 300)]
    wait_secs: u64,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every task finished.
fn run(cli: &Cli) -> Result<bool, NlmexError> {
    let mut config = load_config_or_default(cli.config.as_deref())?;
    if let Some(workers) = cli.workers {
        config.worker_count = workers;
    }
    init_logging(&config.logging)?;

    if let Some(dir) = &cli.output_dir {
        fs::create_dir_all(dir)?;
    }

    let manager = TaskManager::with_pdf_engine(&config)?;
    let outcome = extract_all(&manager, cli);
    manager.shutdown();
    outcome
}

fn extract_all(manager: &TaskManager, cli: &Cli) -> Result<bool, NlmexError> {
    // Subscribed before submitting, so tasks evicted by the retention
    // policy are still reported.
    let mut watcher = manager.watcher();

    let mut submitted = Vec::with_capacity(cli.files.len());
    for path in &cli.files {
        let content = match fs::read(path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Skipping {:?}: {}", path, e);
                eprintln!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };
        match manager.submit_upload(content, &path.to_string_lossy()) {
            Ok(id) => submitted.push(id),
            Err(TaskError::InvalidInput(reason)) => {
                eprintln!("Skipping {}: {}", path.display(), reason);
            }
            Err(e) => return Err(e.into()),
        }
    }

    let wait = Duration::from_secs(cli.wait_secs);
    let mut tasks = Vec::with_capacity(submitted.len());
    let mut expired = Vec::new();
    for id in submitted {
        match watcher.wait_for(id, wait) {
            Ok(task) => tasks.push(task),
            Err(TaskError::Expired(id)) => {
                warn!("Task {} was evicted before its result was read", id);
                expired.push(id);
            }
            Err(e) => return Err(e.into()),
        }
    }

    if let Some(dir) = &cli.output_dir {
        for task in &tasks {
            let Some(result) = &task.result else {
                continue;
            };
            let target = nlm_path(dir, task);
            if let Err(e) = fs::write(&target, result.payload(ResultType::Nlm)) {
                warn!("Failed to write {:?}: {}", target, e);
            } else {
                info!("Wrote {:?}", target);
            }
        }
    }

    if cli.json {
        let snapshots: Vec<&ExtractionTask> = tasks.iter().map(|t| t.as_ref()).collect();
        let json = serde_json::to_string_pretty(&snapshots)?;
        println!("{}", json);
    } else {
        print_summary(&tasks);
        for id in &expired {
            println!("{:>4}  expired", id);
        }
    }

    Ok(expired.is_empty()
        && tasks.len() == cli.files.len()
        && tasks.iter().all(|t| t.status == TaskStatus::Finished))
}

/// `<id>-<stem>.nlm.xml`; the id keeps same-named inputs apart.
fn nlm_path(dir: &Path, task: &ExtractionTask) -> PathBuf {
    let stem = Path::new(&task.filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    dir.join(format!("{}-{}.nlm.xml", task.id, stem))
}

fn print_summary(tasks: &[Arc<ExtractionTask>]) {
    for task in tasks {
        match task.status {
            TaskStatus::Finished => {
                let title = task
                    .result
                    .as_ref()
                    .and_then(|r| r.title())
                    .unwrap_or("(untitled)");
                println!("{:>4}  finished  {}  {}", task.id, task.filename, title);
            }
            TaskStatus::Failed => {
                let reason = task
                    .error
                    .as_ref()
                    .map(|e| e.message.as_str())
                    .unwrap_or("unknown error");
                println!("{:>4}  failed    {}  {}", task.id, task.filename, reason);
            }
            status => println!("{:>4}  {:<8}  {}", task.id, status, task.filename),
        }
    }
}
