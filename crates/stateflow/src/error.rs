//! Programmer-visible interpreter failures.
//!
//! The typed surface callers are expected to `match` on lives in
//! `stateflow-core` (so that the machine collaborator can depend on it
//! without pulling in the whole runtime); it is re-exported here under its
//! usual name. Internal plumbing that always ends up as a log line or an
//! escalated event uses `anyhow::Error` instead, for context-chaining.

pub use stateflow_core::InterpreterError;
