//! Deterministic, pure logic: task validation, planning, and status rules.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod plan;
pub mod status;
pub mod types;
pub mod validate;
