//! Shared deterministic types for task validation, planning, and results.
//!
//! These types carry no I/O. The two types with construction invariants,
//! [`TaskDescription`] and [`ExecutionPlan`], can only be built through
//! `core::validate` and `core::plan`, so an unvalidated task can never reach
//! plan execution.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Branch used when the task file does not name one.
pub const DEFAULT_BASE_BRANCH: &str = "main";

/// Supported AI coding agents.
///
/// Task files use the kebab/snake spelling shown in `#[serde(rename)]`; the
/// service expects the SCREAMING_SNAKE form returned by [`Agent::wire_name`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Agent {
    #[default]
    #[serde(rename = "claude-code")]
    ClaudeCode,
    #[serde(rename = "codex")]
    Codex,
    #[serde(rename = "gemini")]
    Gemini,
    #[serde(rename = "amp")]
    Amp,
    #[serde(rename = "copilot")]
    Copilot,
    #[serde(rename = "cursor_agent")]
    CursorAgent,
    #[serde(rename = "qwen-code")]
    QwenCode,
    #[serde(rename = "droid")]
    Droid,
    #[serde(rename = "opencode")]
    Opencode,
}

impl Agent {
    pub const ALL: [Agent; 9] = [
        Agent::ClaudeCode,
        Agent::Codex,
        Agent::Gemini,
        Agent::Amp,
        Agent::Copilot,
        Agent::CursorAgent,
        Agent::QwenCode,
        Agent::Droid,
        Agent::Opencode,
    ];

    /// Task-file spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Agent::ClaudeCode => "claude-code",
            Agent::Codex => "codex",
            Agent::Gemini => "gemini",
            Agent::Amp => "amp",
            Agent::Copilot => "copilot",
            Agent::CursorAgent => "cursor_agent",
            Agent::QwenCode => "qwen-code",
            Agent::Droid => "droid",
            Agent::Opencode => "opencode",
        }
    }

    /// Executor name sent to the service.
    pub fn wire_name(self) -> String {
        self.as_str().replace('-', "_").to_uppercase()
    }

    /// Exact-match lookup. Unknown spellings return `None`; callers must not
    /// substitute a default.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|agent| agent.as_str() == value)
    }

    /// Comma-separated list of accepted spellings, sorted for stable messages.
    pub fn supported_list() -> String {
        let mut names: Vec<&str> = Self::ALL.iter().map(|agent| agent.as_str()).collect();
        names.sort_unstable();
        names.join(", ")
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Boolean-like flag as it may appear in a hand-written task file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl FlagValue {
    /// Interpret the flag, or `None` when the value is not recognizably boolean.
    pub fn to_bool(&self) -> Option<bool> {
        match self {
            FlagValue::Bool(value) => Some(*value),
            FlagValue::Int(0) => Some(false),
            FlagValue::Int(1) => Some(true),
            FlagValue::Int(_) => None,
            FlagValue::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Some(true),
                "false" | "0" | "no" | "" => Some(false),
                _ => None,
            },
        }
    }
}

/// Task file exactly as authored, after schema checks but before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskFile {
    pub project_id: Option<String>,
    pub task: Option<String>,
    pub agent: Option<String>,
    pub repo_id: Option<String>,
    pub base_branch: Option<String>,
    pub dry_run: Option<FlagValue>,
}

/// A validated task description. Built only by `core::validate::validate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskDescription {
    pub(crate) project_id: String,
    pub(crate) task: String,
    pub(crate) agent: Agent,
    pub(crate) repo_id: Option<String>,
    pub(crate) base_branch: String,
    pub(crate) dry_run: bool,
}

impl TaskDescription {
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn agent(&self) -> Agent {
        self.agent
    }

    /// Repository to attach to the workspace session. Never blank.
    pub fn repo_id(&self) -> Option<&str> {
        self.repo_id.as_deref()
    }

    pub fn base_branch(&self) -> &str {
        &self.base_branch
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }
}

/// Task fields as they appear in reports.
///
/// Holds the validated values when validation passed, otherwise whatever
/// string fields could be recovered from the rejected input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_branch: Option<String>,
    pub dry_run: bool,
}

impl TaskRecord {
    /// Best-effort record for input that failed validation.
    pub fn from_value(value: &Value) -> Self {
        let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
        let dry_run = value
            .get("dry_run")
            .cloned()
            .and_then(|raw| serde_json::from_value::<FlagValue>(raw).ok())
            .and_then(|flag| flag.to_bool())
            .unwrap_or(false);
        Self {
            project_id: text("project_id"),
            task: text("task"),
            agent: text("agent"),
            repo_id: text("repo_id"),
            base_branch: text("base_branch"),
            dry_run,
        }
    }
}

impl From<&TaskDescription> for TaskRecord {
    fn from(task: &TaskDescription) -> Self {
        Self {
            project_id: Some(task.project_id.clone()),
            task: Some(task.task.clone()),
            agent: Some(task.agent.as_str().to_string()),
            repo_id: task.repo_id.clone(),
            base_branch: Some(task.base_branch.clone()),
            dry_run: task.dry_run,
        }
    }
}

/// Remote operation performed by a plan step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    CreateIssue,
    StartWorkspaceSession,
}

impl StepKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StepKind::CreateIssue => "create_issue",
            StepKind::StartWorkspaceSession => "start_workspace_session",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateIssueParams {
    pub project_id: String,
    pub title: String,
    pub description: String,
    /// Carried for the report; the service assigns agents per session.
    pub agent: Agent,
}

/// Session parameters known at plan time. The issue id is supplied at
/// execution time from the `create_issue` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionParams {
    pub title: String,
    pub agent: Agent,
    pub repo_id: String,
    pub base_branch: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepParams {
    CreateIssue(CreateIssueParams),
    StartWorkspaceSession(SessionParams),
}

impl StepParams {
    pub fn kind(&self) -> StepKind {
        match self {
            StepParams::CreateIssue(_) => StepKind::CreateIssue,
            StepParams::StartWorkspaceSession(_) => StepKind::StartWorkspaceSession,
        }
    }
}

/// Error classification recorded on failed steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    StartupFailed,
    Timeout,
    RemoteError,
    ChannelClosed,
    /// The call succeeded but the payload lacked a required identifier.
    InvalidResponse,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::StartupFailed => "StartupFailed",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::RemoteError => "RemoteError",
            ErrorKind::ChannelClosed => "ChannelClosed",
            ErrorKind::InvalidResponse => "InvalidResponse",
        };
        f.write_str(label)
    }
}

/// Outcome of a single plan step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Planned but not yet executed.
    Pending,
    Succeeded {
        remote_id: String,
        response: Value,
    },
    /// Completed without error but functionally incomplete.
    Degraded {
        remote_id: String,
        warning: String,
        response: Value,
    },
    Failed {
        error_kind: ErrorKind,
        message: String,
    },
    /// Never reached because an earlier step failed.
    NotAttempted {
        reason: String,
    },
    /// Deliberately not executed (dry run).
    Skipped {
        reason: String,
    },
}

/// Serialized outcome tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeLabel {
    Pending,
    Succeeded,
    Degraded,
    Failed,
    NotAttempted,
    Skipped,
}

impl StepOutcome {
    pub fn label(&self) -> OutcomeLabel {
        match self {
            StepOutcome::Pending => OutcomeLabel::Pending,
            StepOutcome::Succeeded { .. } => OutcomeLabel::Succeeded,
            StepOutcome::Degraded { .. } => OutcomeLabel::Degraded,
            StepOutcome::Failed { .. } => OutcomeLabel::Failed,
            StepOutcome::NotAttempted { .. } => OutcomeLabel::NotAttempted,
            StepOutcome::Skipped { .. } => OutcomeLabel::Skipped,
        }
    }

    /// Degraded and dry-run skipped steps count as successful.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            StepOutcome::Succeeded { .. }
                | StepOutcome::Degraded { .. }
                | StepOutcome::Skipped { .. }
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, StepOutcome::Failed { .. })
    }

    pub fn remote_id(&self) -> Option<&str> {
        match self {
            StepOutcome::Succeeded { remote_id, .. } | StepOutcome::Degraded { remote_id, .. } => {
                Some(remote_id)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanStep {
    pub params: StepParams,
    pub outcome: StepOutcome,
}

impl PlanStep {
    pub fn pending(params: StepParams) -> Self {
        Self {
            params,
            outcome: StepOutcome::Pending,
        }
    }

    pub fn kind(&self) -> StepKind {
        self.params.kind()
    }
}

/// Ordered steps derived from one task. Built only by `core::plan::plan`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan {
    pub(crate) task: TaskDescription,
    pub(crate) steps: Vec<PlanStep>,
}

impl ExecutionPlan {
    pub fn task(&self) -> &TaskDescription {
        &self.task
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn kinds(&self) -> Vec<StepKind> {
        self.steps.iter().map(PlanStep::kind).collect()
    }
}

/// Overall status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    PartialFailure,
    Failure,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::PartialFailure => "partial_failure",
            RunStatus::Failure => "failure",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal state of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub task: TaskRecord,
    pub dry_run: bool,
    /// Non-empty only when the task was rejected; `steps` is then empty.
    pub validation_errors: Vec<String>,
    pub steps: Vec<PlanStep>,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionResult {
    /// True when the service process could not be started at all.
    pub fn service_unreachable(&self) -> bool {
        matches!(
            self.steps.first().map(|step| &step.outcome),
            Some(StepOutcome::Failed {
                error_kind: ErrorKind::StartupFailed,
                ..
            })
        )
    }

    pub fn count(&self, label: OutcomeLabel) -> usize {
        self.steps
            .iter()
            .filter(|step| step.outcome.label() == label)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn agent_parse_is_exact() {
        assert_eq!(Agent::parse("claude-code"), Some(Agent::ClaudeCode));
        assert_eq!(Agent::parse("cursor_agent"), Some(Agent::CursorAgent));
        assert_eq!(Agent::parse("Claude-Code"), None);
        assert_eq!(Agent::parse("claude_code"), None);
    }

    #[test]
    fn agent_wire_names_are_screaming_snake() {
        assert_eq!(Agent::ClaudeCode.wire_name(), "CLAUDE_CODE");
        assert_eq!(Agent::QwenCode.wire_name(), "QWEN_CODE");
        assert_eq!(Agent::CursorAgent.wire_name(), "CURSOR_AGENT");
        assert_eq!(Agent::Amp.wire_name(), "AMP");
    }

    #[test]
    fn flag_values_accept_common_spellings() {
        assert_eq!(FlagValue::Bool(true).to_bool(), Some(true));
        assert_eq!(FlagValue::Text("TRUE".into()).to_bool(), Some(true));
        assert_eq!(FlagValue::Text("no".into()).to_bool(), Some(false));
        assert_eq!(FlagValue::Int(1).to_bool(), Some(true));
        assert_eq!(FlagValue::Int(7).to_bool(), None);
        assert_eq!(FlagValue::Text("maybe".into()).to_bool(), None);
    }

    #[test]
    fn task_record_recovers_strings_from_rejected_input() {
        let record = TaskRecord::from_value(&json!({
            "project_id": "P1",
            "task": 42,
            "dry_run": "true",
        }));
        assert_eq!(record.project_id.as_deref(), Some("P1"));
        assert_eq!(record.task, None);
        assert!(record.dry_run);
    }

    #[test]
    fn step_params_serialize_with_kind_tag() {
        let params = StepParams::StartWorkspaceSession(SessionParams {
            title: "Fix bug".into(),
            agent: Agent::Codex,
            repo_id: "R1".into(),
            base_branch: "main".into(),
        });
        let value = serde_json::to_value(&params).expect("serialize");
        assert_eq!(value["kind"], "start_workspace_session");
        assert_eq!(value["agent"], "codex");
        assert_eq!(value["repo_id"], "R1");
    }
}
