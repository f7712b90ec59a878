//! Test-only scripted transports and task fixtures.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use serde_json::{Value, json};

use crate::io::transport::{Connector, Transport, TransportError};

/// One call observed by a scripted transport.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: String,
    pub params: Value,
}

/// Calls shared between a connector and every transport it opened.
pub type CallLog = Rc<RefCell<Vec<RecordedCall>>>;

/// Transport that replays scripted replies in order and records each call.
///
/// Once the script runs out every call fails with `ChannelClosed`.
pub struct ScriptedTransport {
    replies: VecDeque<Result<Value, TransportError>>,
    calls: CallLog,
    closes: Rc<Cell<usize>>,
}

impl ScriptedTransport {
    pub fn new(replies: Vec<Result<Value, TransportError>>) -> Self {
        Self {
            replies: replies.into(),
            calls: CallLog::default(),
            closes: Rc::default(),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.borrow().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closes.get()
    }
}

impl Transport for ScriptedTransport {
    fn call(&mut self, method: &str, params: Value) -> Result<Value, TransportError> {
        self.calls.borrow_mut().push(RecordedCall {
            method: method.to_string(),
            params,
        });
        self.replies.pop_front().unwrap_or_else(|| {
            Err(TransportError::ChannelClosed(
                "script exhausted".to_string(),
            ))
        })
    }

    fn close(&mut self) {
        self.closes.set(self.closes.get() + 1);
    }
}

/// Connector handing out one [`ScriptedTransport`], or a scripted open failure.
pub struct ScriptedConnector {
    replies: RefCell<Option<Vec<Result<Value, TransportError>>>>,
    open_error: Option<TransportError>,
    calls: CallLog,
    opens: Cell<usize>,
    closes: Rc<Cell<usize>>,
}

impl ScriptedConnector {
    pub fn new(replies: Vec<Result<Value, TransportError>>) -> Self {
        Self {
            replies: RefCell::new(Some(replies)),
            open_error: None,
            calls: CallLog::default(),
            opens: Cell::new(0),
            closes: Rc::default(),
        }
    }

    /// Connector whose `open` always fails with `err`.
    pub fn failing(err: TransportError) -> Self {
        Self {
            open_error: Some(err),
            ..Self::new(Vec::new())
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.borrow().clone()
    }

    pub fn open_count(&self) -> usize {
        self.opens.get()
    }

    pub fn close_count(&self) -> usize {
        self.closes.get()
    }
}

impl Connector for ScriptedConnector {
    type Transport = ScriptedTransport;

    fn open(&self) -> Result<ScriptedTransport, TransportError> {
        self.opens.set(self.opens.get() + 1);
        if let Some(err) = &self.open_error {
            return Err(err.clone());
        }
        let replies = self.replies.borrow_mut().take().unwrap_or_default();
        Ok(ScriptedTransport {
            replies: replies.into(),
            calls: Rc::clone(&self.calls),
            closes: Rc::clone(&self.closes),
        })
    }
}

/// `tools/call` result wrapping `payload` as JSON text content.
pub fn tool_result(payload: Value) -> Value {
    json!({
        "content": [{ "type": "text", "text": payload.to_string() }],
        "isError": false,
    })
}

/// Task JSON with the given project, task text, and optional repository.
pub fn task_json(project_id: &str, task: &str, repo_id: Option<&str>) -> Value {
    let mut value = json!({ "project_id": project_id, "task": task });
    if let Some(repo_id) = repo_id {
        value["repo_id"] = json!(repo_id);
    }
    value
}
