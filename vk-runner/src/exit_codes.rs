//! Stable exit codes for the `vk-runner` binary.

/// A report was produced, whatever the run status.
pub const OK: i32 = 0;
/// Setup failed (unreadable input, bad config, unwritable output); no output file.
pub const INVALID: i32 = 1;
/// The service could not be started. Report and output file are still written.
pub const UNREACHABLE: i32 = 2;
