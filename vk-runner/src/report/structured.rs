//! Machine-readable execution report.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::types::{
    ErrorKind, ExecutionResult, OutcomeLabel, RunStatus, StepKind, StepOutcome, StepParams,
    TaskRecord,
};

/// Bumped whenever a field changes meaning or disappears.
pub const REPORT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredReport {
    pub schema_version: u32,
    pub status: RunStatus,
    pub dry_run: bool,
    pub task: TaskRecord,
    pub validation_errors: Vec<String>,
    pub summary: ReportSummary,
    pub steps: Vec<StepRecord>,
    pub timing: Timing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_steps: usize,
    pub succeeded: usize,
    pub degraded: usize,
    pub failed: usize,
    pub not_attempted: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// 1-based position in the plan.
    pub index: usize,
    pub kind: StepKind,
    pub outcome: OutcomeLabel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Failure message, or the reason a step was not run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    /// Parameters the step was planned with.
    pub request: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    pub started_at: String,
    pub finished_at: String,
    pub duration_ms: i64,
}

/// Project an execution result into the report record.
pub fn to_structured(result: &ExecutionResult) -> StructuredReport {
    let issue_id = result.steps.iter().find_map(|step| match step.params {
        StepParams::CreateIssue(_) => step.outcome.remote_id().map(str::to_string),
        StepParams::StartWorkspaceSession(_) => None,
    });

    let steps = result
        .steps
        .iter()
        .enumerate()
        .map(|(position, step)| {
            let mut record = StepRecord {
                index: position + 1,
                kind: step.kind(),
                outcome: step.outcome.label(),
                issue_id: None,
                session_id: None,
                error_kind: None,
                message: None,
                warning: None,
                request: serde_json::to_value(&step.params).unwrap_or(Value::Null),
                response: None,
            };
            match step.kind() {
                StepKind::CreateIssue => {
                    record.issue_id = step.outcome.remote_id().map(str::to_string);
                }
                StepKind::StartWorkspaceSession => {
                    record.issue_id.clone_from(&issue_id);
                    record.session_id = step.outcome.remote_id().map(str::to_string);
                }
            }
            match &step.outcome {
                StepOutcome::Pending => {}
                StepOutcome::Succeeded { response, .. } => {
                    record.response = Some(response.clone());
                }
                StepOutcome::Degraded {
                    warning, response, ..
                } => {
                    record.warning = Some(warning.clone());
                    record.response = Some(response.clone());
                }
                StepOutcome::Failed {
                    error_kind,
                    message,
                } => {
                    record.error_kind = Some(*error_kind);
                    record.message = Some(message.clone());
                }
                StepOutcome::NotAttempted { reason } | StepOutcome::Skipped { reason } => {
                    record.message = Some(reason.clone());
                }
            }
            record
        })
        .collect();

    StructuredReport {
        schema_version: REPORT_SCHEMA_VERSION,
        status: result.status,
        dry_run: result.dry_run,
        task: result.task.clone(),
        validation_errors: result.validation_errors.clone(),
        summary: ReportSummary {
            total_steps: result.steps.len(),
            succeeded: result.count(OutcomeLabel::Succeeded),
            degraded: result.count(OutcomeLabel::Degraded),
            failed: result.count(OutcomeLabel::Failed),
            not_attempted: result.count(OutcomeLabel::NotAttempted),
            skipped: result.count(OutcomeLabel::Skipped),
        },
        steps,
        timing: Timing {
            started_at: timestamp(&result.started_at),
            finished_at: timestamp(&result.finished_at),
            duration_ms: (result.finished_at - result.started_at).num_milliseconds(),
        },
    }
}

/// Pretty-printed JSON with a trailing newline.
pub fn structured_json(report: &StructuredReport) -> Result<String> {
    let mut payload = serde_json::to_string_pretty(report).context("serialize report")?;
    payload.push('\n');
    Ok(payload)
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Agent, CreateIssueParams, PlanStep, SessionParams};
    use chrono::TimeZone;
    use serde_json::json;

    fn result(outcomes: Vec<StepOutcome>, status: RunStatus) -> ExecutionResult {
        let params = [
            StepParams::CreateIssue(CreateIssueParams {
                project_id: "P1".into(),
                title: "Fix bug".into(),
                description: "Fix bug".into(),
                agent: Agent::ClaudeCode,
            }),
            StepParams::StartWorkspaceSession(SessionParams {
                title: "Fix bug".into(),
                agent: Agent::ClaudeCode,
                repo_id: "R1".into(),
                base_branch: "main".into(),
            }),
        ];
        let started_at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        ExecutionResult {
            task: TaskRecord {
                project_id: Some("P1".into()),
                task: Some("Fix bug".into()),
                ..TaskRecord::default()
            },
            dry_run: false,
            validation_errors: Vec::new(),
            steps: params
                .into_iter()
                .zip(outcomes)
                .map(|(params, outcome)| PlanStep { params, outcome })
                .collect(),
            status,
            started_at,
            finished_at: started_at + chrono::Duration::milliseconds(1_250),
        }
    }

    #[test]
    fn partial_failure_records_both_steps() {
        let report = to_structured(&result(
            vec![
                StepOutcome::Succeeded {
                    remote_id: "ISSUE-2".into(),
                    response: json!({ "issue_id": "ISSUE-2" }),
                },
                StepOutcome::Failed {
                    error_kind: ErrorKind::RemoteError,
                    message: "repo R1 not found".into(),
                },
            ],
            RunStatus::PartialFailure,
        ));

        assert_eq!(report.schema_version, REPORT_SCHEMA_VERSION);
        assert_eq!(report.summary.succeeded, 1);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.steps[0].index, 1);
        assert_eq!(report.steps[0].issue_id.as_deref(), Some("ISSUE-2"));
        assert_eq!(report.steps[1].issue_id.as_deref(), Some("ISSUE-2"));
        assert_eq!(report.steps[1].error_kind, Some(ErrorKind::RemoteError));
        assert_eq!(report.steps[1].request["repo_id"], "R1");
        assert_eq!(report.timing.started_at, "2026-03-01T12:00:00.000Z");
        assert_eq!(report.timing.duration_ms, 1_250);
    }

    #[test]
    fn json_uses_snake_case_labels_and_omits_empty_fields() {
        let report = to_structured(&result(
            vec![
                StepOutcome::Succeeded {
                    remote_id: "ISSUE-1".into(),
                    response: json!({}),
                },
                StepOutcome::Degraded {
                    remote_id: "WS-1".into(),
                    warning: "no repository".into(),
                    response: json!({ "repos": [] }),
                },
            ],
            RunStatus::Success,
        ));
        let json: Value =
            serde_json::from_str(&structured_json(&report).expect("json")).expect("parse");

        assert_eq!(json["status"], "success");
        assert_eq!(json["steps"][1]["kind"], "start_workspace_session");
        assert_eq!(json["steps"][1]["outcome"], "degraded");
        assert_eq!(json["steps"][1]["session_id"], "WS-1");
        assert!(json["steps"][0].get("error_kind").is_none());
        assert!(json["steps"][0].get("warning").is_none());
    }
}
