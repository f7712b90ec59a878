//! Job adapter that turns a small task description into Vibe Kanban work.
//!
//! A run validates the task, plans the remote operations (create an issue,
//! optionally start a workspace session), executes them through a JSON-RPC
//! service spawned as a subprocess, and reports the outcome. The architecture
//! enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (validation, planning, status).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (config, subprocess transport,
//!   remote tool calls, job files). Isolated behind traits for tests.
//!
//! [`execute`] coordinates core logic with I/O; [`report`] renders the
//! result as JSON, Markdown, and HTML.

pub mod core;
pub mod execute;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod report;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
