//! Task file parsing and validation.
//!
//! Parsing runs the task JSON through the bundled JSON Schema (unknown keys and
//! wrong types are rejected) before deserializing it. Validation then enforces
//! the semantic rules and normalizes defaults. Both stages fail closed and
//! report every issue they find.

use jsonschema::Draft;
use serde_json::Value;
use thiserror::Error;

use crate::core::types::{Agent, DEFAULT_BASE_BRANCH, TaskDescription, TaskFile};

const TASK_SCHEMA: &str = include_str!("../../schemas/task.schema.json");

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationIssue {
    #[error("task file does not match schema: {0}")]
    Schema(String),
    #[error("missing required field '{0}'")]
    Missing(&'static str),
    #[error("field '{0}' must not be blank")]
    Blank(&'static str),
    #[error("unsupported agent '{value}' (expected one of: {expected})")]
    UnknownAgent { value: String, expected: String },
    #[error("dry_run value {0} is not a recognized boolean")]
    InvalidFlag(String),
}

/// Every reason a task description was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid task description:\n- {}", join_issues(.issues))]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub fn messages(&self) -> Vec<String> {
        self.issues.iter().map(ToString::to_string).collect()
    }
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n- ")
}

/// Check the raw task JSON against the task schema and deserialize it.
pub fn parse_task(value: &Value) -> Result<TaskFile, ValidationError> {
    let schema: Value =
        serde_json::from_str(TASK_SCHEMA).map_err(|err| schema_error(err.to_string()))?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .map_err(|err| schema_error(format!("compile task schema: {err}")))?;
    let issues: Vec<ValidationIssue> = compiled
        .iter_errors(value)
        .map(|err| ValidationIssue::Schema(err.to_string()))
        .collect();
    if !issues.is_empty() {
        return Err(ValidationError { issues });
    }
    serde_json::from_value(value.clone()).map_err(|err| schema_error(err.to_string()))
}

fn schema_error(message: String) -> ValidationError {
    ValidationError {
        issues: vec![ValidationIssue::Schema(message)],
    }
}

/// Enforce required fields and normalize optional ones.
///
/// Blank `agent`, `repo_id`, and `base_branch` are treated as absent.
/// An agent name outside [`Agent::ALL`] is rejected rather than replaced.
pub fn validate(file: &TaskFile) -> Result<TaskDescription, ValidationError> {
    let mut issues = Vec::new();

    let project_id = required_text("project_id", file.project_id.as_deref(), &mut issues);
    let task = required_text("task", file.task.as_deref(), &mut issues);

    let agent = match non_blank(file.agent.as_deref()) {
        None => Agent::default(),
        Some(name) => Agent::parse(name).unwrap_or_else(|| {
            issues.push(ValidationIssue::UnknownAgent {
                value: name.to_string(),
                expected: Agent::supported_list(),
            });
            Agent::default()
        }),
    };

    let repo_id = non_blank(file.repo_id.as_deref()).map(str::to_string);
    let base_branch = non_blank(file.base_branch.as_deref())
        .unwrap_or(DEFAULT_BASE_BRANCH)
        .to_string();

    let dry_run = match &file.dry_run {
        None => false,
        Some(flag) => flag.to_bool().unwrap_or_else(|| {
            let shown = serde_json::to_string(flag).unwrap_or_else(|_| format!("{flag:?}"));
            issues.push(ValidationIssue::InvalidFlag(shown));
            false
        }),
    };

    match (project_id, task) {
        (Some(project_id), Some(task)) if issues.is_empty() => Ok(TaskDescription {
            project_id,
            task,
            agent,
            repo_id,
            base_branch,
            dry_run,
        }),
        _ => Err(ValidationError { issues }),
    }
}

/// Parse and validate in one step.
pub fn validate_value(value: &Value) -> Result<TaskDescription, ValidationError> {
    let file = parse_task(value)?;
    validate(&file)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|text| !text.is_empty())
}

fn required_text(
    field: &'static str,
    value: Option<&str>,
    issues: &mut Vec<ValidationIssue>,
) -> Option<String> {
    match value {
        None => {
            issues.push(ValidationIssue::Missing(field));
            None
        }
        Some(text) if text.trim().is_empty() => {
            issues.push(ValidationIssue::Blank(field));
            None
        }
        Some(text) => Some(text.trim().to_string()),
    }
}
