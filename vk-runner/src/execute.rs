//! Orchestration for a single job run: validate, plan, execute, classify.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::core::plan::plan;
use crate::core::status::classify_status;
use crate::core::types::{
    ErrorKind, ExecutionPlan, ExecutionResult, PlanStep, StepOutcome, StepParams,
    TaskRecord,
};
use crate::core::validate::{ValidationError, validate_value};
use crate::io::kanban::{self, StepError};
use crate::io::transport::{Connector, Transport, TransportError};

pub const DRY_RUN_REASON: &str = "skipped - dry run";
pub const NO_REPO_WARNING: &str =
    "workspace session started without a code repository; the agent has no code context";

/// Identifiers produced by earlier steps, handed to later ones.
#[derive(Debug, Default)]
struct PriorResults {
    issue_id: Option<String>,
}

/// Run the full pipeline for one raw task description.
///
/// Never fails: rejected input, an unreachable service, and failed calls all
/// come back as an [`ExecutionResult`] describing what happened. A dry run
/// never opens the connector.
#[instrument(skip_all)]
pub fn run_task<C: Connector>(input: &Value, connector: &C) -> ExecutionResult {
    let started_at = Utc::now();
    let task = match validate_value(input) {
        Ok(task) => task,
        Err(err) => {
            warn!(issues = err.issues.len(), "task rejected");
            return rejected(input, &err, started_at);
        }
    };

    let plan = plan(&task);
    info!(
        project_id = task.project_id(),
        agent = %task.agent(),
        steps = plan.steps().len(),
        dry_run = task.dry_run(),
        "planned task"
    );
    if task.dry_run() {
        return finish(&plan, skip_all(plan.steps()), started_at);
    }

    let mut transport = match connector.open() {
        Ok(transport) => transport,
        Err(err) => {
            warn!(err = %err, "service unavailable");
            return finish(&plan, startup_failed(plan.steps(), &err), started_at);
        }
    };
    let mut result = execute(&plan, &mut transport);
    transport.close();
    result.started_at = started_at;
    result
}

/// Execute the plan's steps in order through `transport`.
///
/// A failed first step halts the run and marks the rest `NotAttempted`;
/// later failures are recorded without touching earlier outcomes.
pub fn execute<T: Transport>(plan: &ExecutionPlan, transport: &mut T) -> ExecutionResult {
    let started_at = Utc::now();
    if plan.task().dry_run() {
        return finish(plan, skip_all(plan.steps()), started_at);
    }

    let mut prior = PriorResults::default();
    let mut halted: Option<String> = None;
    let mut steps = Vec::with_capacity(plan.steps().len());
    for (index, step) in plan.steps().iter().enumerate() {
        let outcome = match &halted {
            Some(reason) => StepOutcome::NotAttempted {
                reason: reason.clone(),
            },
            None => run_step(&step.params, &prior, transport),
        };

        match &outcome {
            StepOutcome::Failed { error_kind, message } => {
                warn!(step = %step.kind(), %error_kind, err = %message, "step failed");
                if index == 0 {
                    halted = Some(format!("{} failed", step.kind()));
                }
            }
            StepOutcome::Degraded { warning, .. } => {
                warn!(step = %step.kind(), %warning, "step degraded");
            }
            StepOutcome::Succeeded { remote_id, .. } => {
                info!(step = %step.kind(), %remote_id, "step succeeded");
            }
            _ => {}
        }
        if let StepParams::CreateIssue(_) = step.params {
            prior.issue_id = outcome.remote_id().map(str::to_string);
        }
        steps.push(PlanStep {
            params: step.params.clone(),
            outcome,
        });
    }
    finish(plan, steps, started_at)
}

fn run_step<T: Transport>(
    params: &StepParams,
    prior: &PriorResults,
    transport: &mut T,
) -> StepOutcome {
    match params {
        StepParams::CreateIssue(params) => match kanban::create_issue(transport, params) {
            Ok(created) => StepOutcome::Succeeded {
                remote_id: created.issue_id,
                response: created.response,
            },
            Err(err) => failed(err),
        },
        StepParams::StartWorkspaceSession(params) => {
            let Some(issue_id) = prior.issue_id.as_deref() else {
                return StepOutcome::NotAttempted {
                    reason: "no issue id from create_issue".to_string(),
                };
            };
            match kanban::start_workspace_session(transport, params, issue_id) {
                Ok(started) if started.repos_attached == Some(0) => {
                    StepOutcome::Degraded {
                        remote_id: started.session_id,
                        warning: NO_REPO_WARNING.to_string(),
                        response: started.response,
                    }
                }
                Ok(started) => StepOutcome::Succeeded {
                    remote_id: started.session_id,
                    response: started.response,
                },
                Err(err) => failed(err),
            }
        }
    }
}

fn failed(err: StepError) -> StepOutcome {
    StepOutcome::Failed {
        error_kind: err.kind,
        message: err.message,
    }
}

fn skip_all(steps: &[PlanStep]) -> Vec<PlanStep> {
    steps
        .iter()
        .map(|step| PlanStep {
            params: step.params.clone(),
            outcome: StepOutcome::Skipped {
                reason: DRY_RUN_REASON.to_string(),
            },
        })
        .collect()
}

fn startup_failed(steps: &[PlanStep], err: &TransportError) -> Vec<PlanStep> {
    steps
        .iter()
        .enumerate()
        .map(|(index, step)| PlanStep {
            params: step.params.clone(),
            outcome: if index == 0 {
                StepOutcome::Failed {
                    error_kind: ErrorKind::StartupFailed,
                    message: err.to_string(),
                }
            } else {
                StepOutcome::NotAttempted {
                    reason: "service unavailable".to_string(),
                }
            },
        })
        .collect()
}

fn finish(
    plan: &ExecutionPlan,
    steps: Vec<PlanStep>,
    started_at: DateTime<Utc>,
) -> ExecutionResult {
    let status = classify_status(&steps);
    info!(%status, "run finished");
    ExecutionResult {
        task: TaskRecord::from(plan.task()),
        dry_run: plan.task().dry_run(),
        validation_errors: Vec::new(),
        steps,
        status,
        started_at,
        finished_at: Utc::now(),
    }
}

fn rejected(input: &Value, err: &ValidationError, started_at: DateTime<Utc>) -> ExecutionResult {
    let steps = Vec::new();
    let task = TaskRecord::from_value(input);
    ExecutionResult {
        dry_run: task.dry_run,
        task,
        validation_errors: err.messages(),
        status: classify_status(&steps),
        steps,
        started_at,
        finished_at: Utc::now(),
    }
}
