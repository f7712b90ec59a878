//! JSON-RPC 2.0 envelopes exchanged with the service, one message per line.

use anyhow::{Result, anyhow};
use serde::Deserialize;
use serde_json::{Value, json};

pub const JSONRPC_VERSION: &str = "2.0";

/// Standard "method not found" code.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Error object carried by a failed response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl RpcError {
    /// The message, followed by the `data` payload when the service sent one.
    pub fn describe(&self) -> String {
        match &self.data {
            None | Some(Value::Null) => self.message.clone(),
            Some(Value::String(data)) => format!("{} ({data})", self.message),
            Some(data) => format!("{} ({data})", self.message),
        }
    }
}

/// A decoded message written by the service.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Response {
        id: Value,
        outcome: std::result::Result<Value, RpcError>,
    },
    /// Server-initiated request that expects a reply (e.g. `ping`).
    Request { id: Value, method: String },
    Notification { method: String },
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

pub fn request_line(id: u64, method: &str, params: &Value) -> String {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "method": method,
        "params": params,
    })
    .to_string()
}

pub fn notification_line(method: &str) -> String {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "method": method,
    })
    .to_string()
}

pub fn result_line(id: &Value, result: &Value) -> String {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "result": result,
    })
    .to_string()
}

pub fn error_line(id: &Value, code: i64, message: &str) -> String {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "error": { "code": code, "message": message },
    })
    .to_string()
}

/// Decode one line. An `error` member takes precedence over `result`; a
/// response carrying neither resolves to `null`.
pub fn decode(line: &str) -> Result<Incoming> {
    let raw: RawMessage = serde_json::from_str(line)?;
    match (raw.id, raw.method) {
        (Some(id), Some(method)) => Ok(Incoming::Request { id, method }),
        (None, Some(method)) => Ok(Incoming::Notification { method }),
        (Some(id), None) => {
            let outcome = match raw.error {
                Some(error) => Err(error),
                None => Ok(raw.result.unwrap_or(Value::Null)),
            };
            Ok(Incoming::Response { id, outcome })
        }
        (None, None) => Err(anyhow!("message has neither id nor method")),
    }
}
