//! End-to-end run scenarios driven through `run_task` with scripted services.
//!
//! Each test scripts the service replies, runs the whole pipeline
//! (validate, plan, open, execute, close), and checks both the execution
//! result and the rendered reports.

use serde_json::json;

use vk_runner::core::types::{ErrorKind, OutcomeLabel, RunStatus, StepOutcome};
use vk_runner::execute::{DRY_RUN_REASON, NO_REPO_WARNING, run_task};
use vk_runner::io::transport::TransportError;
use vk_runner::report::{self, to_html, to_narrative, to_structured};
use vk_runner::test_support::{ScriptedConnector, task_json, tool_result};

#[test]
fn issue_only_task_succeeds_with_one_call() {
    let connector =
        ScriptedConnector::new(vec![Ok(tool_result(json!({ "issue_id": "ISSUE-1" })))]);
    let result = run_task(&task_json("P1", "Fix bug", None), &connector);

    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.steps.len(), 1);
    assert_eq!(result.steps[0].outcome.remote_id(), Some("ISSUE-1"));

    let calls = connector.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].params["name"], "create_issue");
    assert_eq!(calls[0].params["arguments"]["project_id"], "P1");
    assert_eq!(connector.open_count(), 1);
    assert_eq!(connector.close_count(), 1);

    let report = to_structured(&result);
    assert_eq!(report.steps[0].issue_id.as_deref(), Some("ISSUE-1"));
}

#[test]
fn timeout_on_first_step_is_failure_without_session() {
    let connector = ScriptedConnector::new(vec![Err(TransportError::Timeout {
        method: "tools/call".to_string(),
        timeout: std::time::Duration::from_secs(60),
    })]);
    let result = run_task(&task_json("P1", "Fix bug", None), &connector);

    assert_eq!(result.status, RunStatus::Failure);
    assert_eq!(result.count(OutcomeLabel::Failed), 1);
    assert!(matches!(
        result.steps[0].outcome,
        StepOutcome::Failed {
            error_kind: ErrorKind::Timeout,
            ..
        }
    ));

    let narrative = to_narrative(&result).expect("narrative");
    assert!(!narrative.to_lowercase().contains("workspace"));
    assert!(narrative.contains("Timeout"));
}

#[test]
fn session_failure_after_issue_is_partial_failure() {
    let connector = ScriptedConnector::new(vec![
        Ok(tool_result(json!({ "issue_id": "ISSUE-2" }))),
        Err(TransportError::RemoteError {
            code: -32000,
            message: "repository R1 not found".to_string(),
        }),
    ]);
    let result = run_task(&task_json("P1", "Fix bug", Some("R1")), &connector);

    assert_eq!(result.status, RunStatus::PartialFailure);
    assert_eq!(result.steps[0].outcome.remote_id(), Some("ISSUE-2"));
    assert!(result.steps[1].outcome.is_failure());

    let calls = connector.calls();
    assert_eq!(calls.len(), 2);
    let arguments = &calls[1].params["arguments"];
    assert_eq!(arguments["issue_id"], "ISSUE-2");
    assert_eq!(arguments["repos"][0]["repo_id"], "R1");
    assert_eq!(arguments["repos"][0]["base_branch"], "main");
    assert_eq!(arguments["executor"], "CLAUDE_CODE");
}

#[test]
fn missing_task_is_rejected_before_any_call() {
    let connector = ScriptedConnector::new(Vec::new());
    let result = run_task(&json!({ "project_id": "P1" }), &connector);

    assert_eq!(result.status, RunStatus::Failure);
    assert!(result.steps.is_empty());
    assert_eq!(result.validation_errors.len(), 1);
    assert!(result.validation_errors[0].contains("'task'"));
    assert_eq!(connector.open_count(), 0);

    let report = to_structured(&result);
    assert_eq!(report.summary.total_steps, 0);
    assert_eq!(report.task.project_id.as_deref(), Some("P1"));
}

#[test]
fn unknown_agent_is_rejected() {
    let mut input = task_json("P1", "Fix bug", None);
    input["agent"] = json!("gpt-engineer");
    let connector = ScriptedConnector::new(Vec::new());
    let result = run_task(&input, &connector);

    assert_eq!(result.status, RunStatus::Failure);
    assert!(result.validation_errors[0].contains("gpt-engineer"));
    assert_eq!(connector.open_count(), 0);
}

#[test]
fn dry_run_never_opens_the_service() {
    let mut input = task_json("P1", "Fix bug", Some("R1"));
    input["dry_run"] = json!("true");
    let connector = ScriptedConnector::new(Vec::new());
    let result = run_task(&input, &connector);

    assert_eq!(result.status, RunStatus::Success);
    assert!(result.dry_run);
    assert_eq!(connector.open_count(), 0);
    assert!(result.steps.iter().all(|step| step.outcome
        == StepOutcome::Skipped {
            reason: DRY_RUN_REASON.to_string()
        }));
}

#[test]
fn unreachable_service_fails_first_step() {
    let connector = ScriptedConnector::failing(TransportError::StartupFailed(
        "spawn `npx -y vibe-kanban@latest --mcp`: No such file or directory".to_string(),
    ));
    let result = run_task(&task_json("P1", "Fix bug", Some("R1")), &connector);

    assert_eq!(result.status, RunStatus::Failure);
    assert!(result.service_unreachable());
    assert_eq!(result.steps[0].outcome.label(), OutcomeLabel::Failed);
    assert_eq!(result.steps[1].outcome.label(), OutcomeLabel::NotAttempted);
    assert!(connector.calls().is_empty());
}

#[test]
fn empty_repo_list_in_response_is_degraded_success() {
    let connector = ScriptedConnector::new(vec![
        Ok(tool_result(json!({ "issue_id": "ISSUE-3" }))),
        Ok(tool_result(json!({ "workspace_id": "WS-3", "repos": [] }))),
    ]);
    let result = run_task(&task_json("P1", "Fix bug", Some("R1")), &connector);

    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.count(OutcomeLabel::Degraded), 1);

    let report = to_structured(&result);
    assert_eq!(report.steps[1].warning.as_deref(), Some(NO_REPO_WARNING));
    assert_eq!(report.steps[1].session_id.as_deref(), Some("WS-3"));
    let narrative = to_narrative(&result).expect("narrative");
    assert!(narrative.contains(NO_REPO_WARNING));
}

#[test]
fn reports_are_repeatable_and_agree() {
    let connector = ScriptedConnector::new(vec![
        Ok(tool_result(json!({ "issue_id": "ISSUE-4" }))),
        Ok(tool_result(json!({ "workspace_id": "WS-4", "repos": [{ "repo_id": "R1" }] }))),
    ]);
    let result = run_task(&task_json("P1", "Fix bug", Some("R1")), &connector);

    let first = report::render_all(&result).expect("render");
    let second = report::render_all(&result).expect("render");
    assert_eq!(first, second);

    let structured = to_structured(&result);
    assert_eq!(
        report::render_narrative(&structured).expect("narrative"),
        to_narrative(&result).expect("narrative")
    );
    assert_eq!(
        report::render_html(&structured).expect("html"),
        to_html(&result).expect("html")
    );

    let parsed: report::StructuredReport =
        serde_json::from_str(&first.structured).expect("parse structured");
    assert_eq!(parsed, structured);
    assert!(first.narrative.contains("Session: WS-4 (issue ISSUE-4)"));
}
