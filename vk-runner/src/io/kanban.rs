//! Kanban service operations, invoked as MCP tools over a [`Transport`].

use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::core::types::{CreateIssueParams, ErrorKind, SessionParams};
use crate::io::transport::{Transport, TransportError};

pub const TOOLS_CALL: &str = "tools/call";
pub const CREATE_ISSUE_TOOL: &str = "create_issue";
pub const START_WORKSPACE_SESSION_TOOL: &str = "start_workspace_session";

/// Failure of one remote operation, already classified for the report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct StepError {
    pub kind: ErrorKind,
    pub message: String,
}

impl StepError {
    fn invalid_response(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::InvalidResponse,
            message: message.into(),
        }
    }
}

impl From<TransportError> for StepError {
    fn from(err: TransportError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IssueCreated {
    pub issue_id: String,
    pub response: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionStarted {
    pub session_id: String,
    /// Number of repositories the service reports as attached, when it says.
    pub repos_attached: Option<usize>,
    pub response: Value,
}

/// Invoke a tool and unwrap its payload.
///
/// `structuredContent` wins when present; otherwise the first text content
/// item is parsed as JSON, falling back to the raw string. A result flagged
/// `isError` is a remote error.
pub fn call_tool<T: Transport>(
    transport: &mut T,
    name: &str,
    arguments: Value,
) -> Result<Value, StepError> {
    let result = transport.call(TOOLS_CALL, json!({ "name": name, "arguments": arguments }))?;
    let text = result
        .get("content")
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .and_then(|item| item.get("text"))
        .and_then(Value::as_str);

    if result.get("isError").and_then(Value::as_bool) == Some(true) {
        return Err(StepError {
            kind: ErrorKind::RemoteError,
            message: format!("tool '{name}' failed: {}", text.unwrap_or("no details")),
        });
    }
    if let Some(structured) = result.get("structuredContent") {
        return Ok(structured.clone());
    }
    match text {
        Some(text) => Ok(serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.into()))),
        None => Ok(result),
    }
}

#[instrument(skip_all, fields(project_id = %params.project_id))]
pub fn create_issue<T: Transport>(
    transport: &mut T,
    params: &CreateIssueParams,
) -> Result<IssueCreated, StepError> {
    let arguments = json!({
        "project_id": params.project_id,
        "title": params.title,
        "description": params.description,
    });
    let response = call_tool(transport, CREATE_ISSUE_TOOL, arguments)?;
    let issue_id = identifier(&response, &["issue_id", "id"])
        .ok_or_else(|| StepError::invalid_response("create_issue response has no issue id"))?;
    debug!(issue_id = %issue_id, "issue created");
    Ok(IssueCreated { issue_id, response })
}

/// Tool arguments for starting a session on `issue_id`.
pub fn session_arguments(params: &SessionParams, issue_id: &str) -> Value {
    let repos = if params.repo_id.trim().is_empty() {
        Vec::new()
    } else {
        vec![json!({ "repo_id": params.repo_id, "base_branch": params.base_branch })]
    };
    json!({
        "title": params.title,
        "executor": params.agent.wire_name(),
        "repos": repos,
        "issue_id": issue_id,
    })
}

#[instrument(skip_all, fields(issue_id = %issue_id, repo_id = %params.repo_id))]
pub fn start_workspace_session<T: Transport>(
    transport: &mut T,
    params: &SessionParams,
    issue_id: &str,
) -> Result<SessionStarted, StepError> {
    let arguments = session_arguments(params, issue_id);
    let response = call_tool(transport, START_WORKSPACE_SESSION_TOOL, arguments)?;
    let session_id = identifier(&response, &["workspace_id", "session_id", "id"]).ok_or_else(
        || StepError::invalid_response("start_workspace_session response has no workspace id"),
    )?;
    let repos_attached = response
        .get("repos")
        .and_then(Value::as_array)
        .map(Vec::len);
    debug!(session_id = %session_id, ?repos_attached, "workspace session started");
    Ok(SessionStarted {
        session_id,
        repos_attached,
        response,
    })
}

/// First non-blank string or numeric identifier among `keys`.
fn identifier(response: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match response.get(*key)? {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    })
}
