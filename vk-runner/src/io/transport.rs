//! Subprocess-backed JSON-RPC transport.
//!
//! [`Transport`] is the seam plan execution calls through. [`StdioTransport`]
//! spawns the service and speaks newline-delimited JSON-RPC over its stdio;
//! tests use scripted transports that return predetermined replies without
//! spawning processes.
//!
//! Reader threads drain the child's stdout and stderr so the pipes never
//! fill up. All waits are bounded: the handshake by the startup timeout,
//! each call by the call timeout, and shutdown by the shutdown timeout.

use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::types::ErrorKind;
use crate::io::config::ServiceConfig;
use crate::io::rpc::{self, Incoming};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("service failed to start: {0}")]
    StartupFailed(String),
    #[error("no response to '{method}' within {}s", .timeout.as_secs())]
    Timeout { method: String, timeout: Duration },
    #[error("service returned error {code}: {message}")]
    RemoteError { code: i64, message: String },
    #[error("channel closed: {0}")]
    ChannelClosed(String),
}

impl TransportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::StartupFailed(_) => ErrorKind::StartupFailed,
            TransportError::Timeout { .. } => ErrorKind::Timeout,
            TransportError::RemoteError { .. } => ErrorKind::RemoteError,
            TransportError::ChannelClosed(_) => ErrorKind::ChannelClosed,
        }
    }
}

/// Request/response channel to the service. One call in flight at a time.
pub trait Transport {
    fn call(&mut self, method: &str, params: Value) -> Result<Value, TransportError>;

    /// Release the channel. Must be safe to call more than once.
    fn close(&mut self) {}
}

/// Opens a ready-to-use transport (process started, handshake done).
pub trait Connector {
    type Transport: Transport;

    fn open(&self) -> Result<Self::Transport, TransportError>;
}

/// Connector that launches the configured service command.
#[derive(Debug, Clone)]
pub struct StdioConnector {
    config: ServiceConfig,
}

impl StdioConnector {
    pub fn new(config: ServiceConfig) -> Self {
        Self { config }
    }
}

impl Connector for StdioConnector {
    type Transport = StdioTransport;

    fn open(&self) -> Result<StdioTransport, TransportError> {
        StdioTransport::open(&self.config)
    }
}

type Line = io::Result<String>;

/// JSON-RPC over the stdin/stdout of a child process.
///
/// Owns the child exclusively. Dropping the transport closes it, so the
/// process is released on every exit path.
pub struct StdioTransport {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    incoming: Receiver<Line>,
    stderr_tail: Arc<Mutex<StderrTail>>,
    next_id: u64,
    call_timeout: Duration,
    shutdown_timeout: Duration,
}

impl StdioTransport {
    /// Spawn the service and complete the `initialize` handshake.
    #[instrument(skip_all, fields(command = %config.display_command()))]
    pub fn open(config: &ServiceConfig) -> Result<Self, TransportError> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!("spawning service process");
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                error!(err = %err, "failed to spawn service");
                return Err(TransportError::StartupFailed(format!(
                    "spawn `{}`: {err}",
                    config.display_command()
                )));
            }
        };

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            kill_and_reap(&mut child);
            return Err(TransportError::StartupFailed(
                "service stdio was not piped".to_string(),
            ));
        };

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || forward_lines(stdout, tx));
        let stderr_tail = Arc::new(Mutex::new(StderrTail::new(config.stderr_limit_bytes)));
        let stderr_sink = Arc::clone(&stderr_tail);
        thread::spawn(move || drain_stderr(stderr, stderr_sink));

        let mut transport = Self {
            child: Some(child),
            stdin: Some(stdin),
            incoming: rx,
            stderr_tail,
            next_id: 1,
            call_timeout: config.call_timeout(),
            shutdown_timeout: config.shutdown_timeout(),
        };
        // On failure `transport` is dropped here, which shuts the child down.
        transport.handshake(config)?;
        info!("service ready");
        Ok(transport)
    }

    fn handshake(&mut self, config: &ServiceConfig) -> Result<(), TransportError> {
        let params = json!({
            "protocolVersion": config.protocol_version,
            "capabilities": {},
            "clientInfo": {
                "name": config.client_name,
                "version": config.client_version,
            },
        });
        let ack = self
            .request("initialize", &params, config.startup_timeout())
            .map_err(|err| TransportError::StartupFailed(format!("initialize: {err}")))?;
        debug!(
            protocol_version = ?ack.get("protocolVersion"),
            server = ?ack.get("serverInfo"),
            "initialize acknowledged"
        );
        self.write_line(&rpc::notification_line("notifications/initialized"))
            .map_err(|err| TransportError::StartupFailed(format!("initialized: {err}")))
    }

    fn request(
        &mut self,
        method: &str,
        params: &Value,
        timeout: Duration,
    ) -> Result<Value, TransportError> {
        let id = self.next_id;
        self.next_id += 1;
        debug!(id, method, "sending request");
        self.write_line(&rpc::request_line(id, method, params))?;

        let expected = json!(id);
        // No representable deadline means waiting without one.
        let deadline = Instant::now().checked_add(timeout);
        loop {
            let received = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        Err(RecvTimeoutError::Timeout)
                    } else {
                        self.incoming.recv_timeout(deadline - now)
                    }
                }
                None => self
                    .incoming
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(Ok(line)) => {
                    if let Some(result) = self.handle_line(&line, &expected)? {
                        debug!(id, method, "response received");
                        return Ok(result);
                    }
                }
                Ok(Err(err)) => {
                    return Err(self.channel_closed(format!("read response to '{method}': {err}")));
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(id, method, timeout_secs = timeout.as_secs(), "request timed out");
                    return Err(TransportError::Timeout {
                        method: method.to_string(),
                        timeout,
                    });
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(self.channel_closed(format!(
                        "service closed its output before answering '{method}'"
                    )));
                }
            }
        }
    }

    /// Returns `Some` only for the response matching `expected`.
    fn handle_line(
        &mut self,
        line: &str,
        expected: &Value,
    ) -> Result<Option<Value>, TransportError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        match rpc::decode(line) {
            Err(err) => {
                debug!(err = %err, line, "skipping non JSON-RPC output");
                Ok(None)
            }
            Ok(Incoming::Response { id, outcome }) if &id == expected => match outcome {
                Ok(result) => Ok(Some(result)),
                Err(error) => Err(TransportError::RemoteError {
                    code: error.code,
                    message: error.describe(),
                }),
            },
            Ok(Incoming::Response { id, .. }) => {
                debug!(id = %id, "skipping response to an earlier request");
                Ok(None)
            }
            Ok(Incoming::Request { id, method }) => {
                let reply = if method == "ping" {
                    rpc::result_line(&id, &json!({}))
                } else {
                    debug!(method, "rejecting unsupported server request");
                    rpc::error_line(&id, rpc::METHOD_NOT_FOUND, "method not found")
                };
                self.write_line(&reply)?;
                Ok(None)
            }
            Ok(Incoming::Notification { method }) => {
                debug!(method, "service notification");
                Ok(None)
            }
        }
    }

    fn write_line(&mut self, line: &str) -> Result<(), TransportError> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(TransportError::ChannelClosed("transport is closed".to_string()));
        };
        let written = stdin
            .write_all(line.as_bytes())
            .and_then(|()| stdin.write_all(b"\n"))
            .and_then(|()| stdin.flush());
        written.map_err(|err| self.channel_closed(format!("write to service: {err}")))
    }

    fn channel_closed(&self, context: String) -> TransportError {
        let tail = self
            .stderr_tail
            .lock()
            .map(|tail| tail.render())
            .unwrap_or_default();
        if tail.is_empty() {
            TransportError::ChannelClosed(context)
        } else {
            TransportError::ChannelClosed(format!("{context}; service stderr: {tail}"))
        }
    }

    fn shutdown(&mut self) {
        // Closing stdin is the polite stop signal for stdio servers.
        drop(self.stdin.take());
        let Some(mut child) = self.child.take() else {
            return;
        };
        match child.wait_timeout(self.shutdown_timeout) {
            Ok(Some(status)) => debug!(exit_code = ?status.code(), "service exited"),
            Ok(None) => {
                warn!(
                    timeout_secs = self.shutdown_timeout.as_secs(),
                    "service still running after stdin closed, killing"
                );
                kill_and_reap(&mut child);
            }
            Err(err) => {
                warn!(err = %err, "wait for service failed, killing");
                kill_and_reap(&mut child);
            }
        }
    }
}

impl Transport for StdioTransport {
    #[instrument(skip(self, params), fields(id = self.next_id))]
    fn call(&mut self, method: &str, params: Value) -> Result<Value, TransportError> {
        let timeout = self.call_timeout;
        self.request(method, &params, timeout)
    }

    fn close(&mut self) {
        self.shutdown();
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn kill_and_reap(child: &mut Child) {
    if let Err(err) = child.kill() {
        warn!(err = %err, "failed to kill service");
    }
    if let Err(err) = child.wait() {
        warn!(err = %err, "failed to reap service");
    }
}

fn forward_lines<R: Read>(reader: R, tx: Sender<Line>) {
    for line in BufReader::new(reader).lines() {
        let failed = line.is_err();
        if tx.send(line).is_err() || failed {
            break;
        }
    }
}

fn drain_stderr<R: Read>(reader: R, tail: Arc<Mutex<StderrTail>>) {
    for line in BufReader::new(reader).lines() {
        let Ok(line) = line else {
            break;
        };
        debug!(target: "vk_runner::service", "{line}");
        if let Ok(mut tail) = tail.lock() {
            tail.push(line);
        }
    }
}

/// Most recent stderr lines, bounded by total bytes.
#[derive(Debug, Default)]
struct StderrTail {
    limit: usize,
    bytes: usize,
    lines: VecDeque<String>,
}

impl StderrTail {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    fn push(&mut self, line: String) {
        self.bytes += line.len();
        self.lines.push_back(line);
        while self.bytes > self.limit {
            let Some(dropped) = self.lines.pop_front() else {
                break;
            };
            self.bytes -= dropped.len();
        }
    }

    fn render(&self) -> String {
        self.lines
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
