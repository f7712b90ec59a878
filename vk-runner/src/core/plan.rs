//! Deterministic plan construction.

use crate::core::types::{
    CreateIssueParams, ExecutionPlan, PlanStep, SessionParams, StepParams, TaskDescription,
};

/// Longest issue title sent to the service, in characters.
pub const MAX_TITLE_CHARS: usize = 120;

/// Build the ordered steps for a validated task.
///
/// `create_issue` always comes first. `start_workspace_session` follows only
/// when the task names a repository. Pure: the same task always yields an
/// equal plan.
pub fn plan(task: &TaskDescription) -> ExecutionPlan {
    let title = issue_title(task.task());
    let mut steps = vec![PlanStep::pending(StepParams::CreateIssue(
        CreateIssueParams {
            project_id: task.project_id().to_string(),
            title: title.clone(),
            description: task.task().to_string(),
            agent: task.agent(),
        },
    ))];

    if let Some(repo_id) = task.repo_id() {
        steps.push(PlanStep::pending(StepParams::StartWorkspaceSession(
            SessionParams {
                title,
                agent: task.agent(),
                repo_id: repo_id.to_string(),
                base_branch: task.base_branch().to_string(),
            },
        )));
    }

    ExecutionPlan {
        task: task.clone(),
        steps,
    }
}

/// First non-empty line of the task, truncated on a char boundary.
pub fn issue_title(task: &str) -> String {
    let line = task
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();
    if line.chars().count() <= MAX_TITLE_CHARS {
        return line.to_string();
    }
    let mut title: String = line.chars().take(MAX_TITLE_CHARS - 3).collect();
    title.push_str("...");
    title
}
