//! Vibe Kanban job adapter.
//!
//! Reads a task description, creates an issue (and optionally starts a
//! workspace session) through the Vibe Kanban MCP server, and writes the
//! execution report artifacts for the host.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;
use tracing::debug;

use vk_runner::core::types::{ExecutionResult, OutcomeLabel};
use vk_runner::execute::run_task;
use vk_runner::exit_codes;
use vk_runner::io::config::{RunnerConfig, load_config};
use vk_runner::io::job::{
    Artifact, artifact_stem, read_job_input, write_output, write_report_artifacts,
};
use vk_runner::io::transport::StdioConnector;
use vk_runner::logging;
use vk_runner::report;

#[derive(Parser)]
#[command(
    name = "vk-runner",
    version,
    about = "Create a Vibe Kanban issue and workspace session from a task file"
)]
struct Cli {
    /// Job input JSON: the task itself, or an object naming a `task_file`.
    input: PathBuf,
    /// Where to write the JSON list of produced artifacts.
    output: PathBuf,
    /// Directory for report artifacts.
    #[arg(default_value = ".")]
    scratch_dir: PathBuf,
    /// Runner config (TOML). Built-in defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = match &cli.config {
        None => RunnerConfig::default(),
        Some(path) if !path.exists() => bail!("config file {} not found", path.display()),
        Some(path) => load_config(path)?,
    };
    debug!(command = %config.service.display_command(), "service configured");

    let input = read_job_input(&cli.input)?;
    let connector = StdioConnector::new(config.service);
    let result = run_task(&input, &connector);

    let files = report::render_all(&result)?;
    let stem = artifact_stem(result.task.task.as_deref());
    let artifacts = write_report_artifacts(&cli.scratch_dir, &stem, &files)?;
    write_output(&cli.output, &artifacts)?;
    print_summary(&result, &artifacts);

    if result.service_unreachable() {
        Ok(exit_codes::UNREACHABLE)
    } else {
        Ok(exit_codes::OK)
    }
}

fn print_summary(result: &ExecutionResult, artifacts: &[Artifact]) {
    let task = &result.task;
    println!("Task: {}", task.task.as_deref().unwrap_or("(missing)"));
    println!("Agent: {}", task.agent.as_deref().unwrap_or("(default)"));
    println!("Project: {}", task.project_id.as_deref().unwrap_or("(missing)"));
    println!("Repo: {}", task.repo_id.as_deref().unwrap_or("(none)"));
    if result.dry_run {
        println!("DRY RUN -- no remote calls made");
    }
    for error in &result.validation_errors {
        println!("Invalid task: {error}");
    }
    println!(
        "Status: {} ({} succeeded, {} degraded, {} failed)",
        result.status,
        result.count(OutcomeLabel::Succeeded),
        result.count(OutcomeLabel::Degraded),
        result.count(OutcomeLabel::Failed),
    );
    for artifact in artifacts {
        println!("Wrote {}: {}", artifact.name, artifact.path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_positional_arguments() {
        let cli = Cli::parse_from(["vk-runner", "input.json", "output.json"]);
        assert_eq!(cli.input, PathBuf::from("input.json"));
        assert_eq!(cli.output, PathBuf::from("output.json"));
        assert_eq!(cli.scratch_dir, PathBuf::from("."));
        assert!(cli.config.is_none());
    }

    #[test]
    fn parse_scratch_dir_and_config() {
        let cli = Cli::parse_from([
            "vk-runner",
            "input.json",
            "output.json",
            "/tmp/scratch",
            "--config",
            "vk.toml",
        ]);
        assert_eq!(cli.scratch_dir, PathBuf::from("/tmp/scratch"));
        assert_eq!(cli.config, Some(PathBuf::from("vk.toml")));
    }

    #[test]
    fn missing_output_argument_is_rejected() {
        assert!(Cli::try_parse_from(["vk-runner", "input.json"]).is_err());
    }
}
