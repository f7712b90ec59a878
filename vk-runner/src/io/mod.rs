//! Side-effecting operations: configuration, the service transport, remote
//! tool calls, and the host job files.

pub mod config;
pub mod job;
pub mod kanban;
pub mod rpc;
pub mod transport;
