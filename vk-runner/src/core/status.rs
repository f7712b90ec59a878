//! Overall run status classification.

use crate::core::types::{PlanStep, RunStatus};

/// Classify a finished run from its step outcomes.
///
/// No steps (validation rejected the task) or a failed first step is
/// `Failure`. Every step successful is `Success`. Anything else had at least
/// one success followed by a failure and is `PartialFailure`.
pub fn classify_status(steps: &[PlanStep]) -> RunStatus {
    let Some(first) = steps.first() else {
        return RunStatus::Failure;
    };
    if !first.outcome.is_success() {
        return RunStatus::Failure;
    }
    if steps.iter().all(|step| step.outcome.is_success()) {
        RunStatus::Success
    } else {
        RunStatus::PartialFailure
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{
        Agent, CreateIssueParams, ErrorKind, SessionParams, StepOutcome, StepParams,
    };
    use serde_json::Value;

    fn issue(outcome: StepOutcome) -> PlanStep {
        PlanStep {
            params: StepParams::CreateIssue(CreateIssueParams {
                project_id: "P1".into(),
                title: "t".into(),
                description: "t".into(),
                agent: Agent::ClaudeCode,
            }),
            outcome,
        }
    }

    fn session(outcome: StepOutcome) -> PlanStep {
        PlanStep {
            params: StepParams::StartWorkspaceSession(SessionParams {
                title: "t".into(),
                agent: Agent::ClaudeCode,
                repo_id: "R1".into(),
                base_branch: "main".into(),
            }),
            outcome,
        }
    }

    fn ok(id: &str) -> StepOutcome {
        StepOutcome::Succeeded {
            remote_id: id.into(),
            response: Value::Null,
        }
    }

    fn failed() -> StepOutcome {
        StepOutcome::Failed {
            error_kind: ErrorKind::Timeout,
            message: "timed out".into(),
        }
    }

    #[test]
    fn empty_is_failure() {
        assert_eq!(classify_status(&[]), RunStatus::Failure);
    }

    #[test]
    fn all_succeeded_is_success() {
        assert_eq!(
            classify_status(&[issue(ok("ISSUE-1")), session(ok("WS-1"))]),
            RunStatus::Success
        );
    }

    #[test]
    fn degraded_counts_as_success() {
        let degraded = StepOutcome::Degraded {
            remote_id: "WS-1".into(),
            warning: "no repo".into(),
            response: Value::Null,
        };
        assert_eq!(
            classify_status(&[issue(ok("ISSUE-1")), session(degraded)]),
            RunStatus::Success
        );
    }

    #[test]
    fn first_failure_is_failure() {
        let not_attempted = StepOutcome::NotAttempted {
            reason: "halted".into(),
        };
        assert_eq!(
            classify_status(&[issue(failed()), session(not_attempted)]),
            RunStatus::Failure
        );
    }

    #[test]
    fn later_failure_is_partial() {
        assert_eq!(
            classify_status(&[issue(ok("ISSUE-2")), session(failed())]),
            RunStatus::PartialFailure
        );
    }
}
