use thiserror::Error;

/// Programmer-visible interpreter failures.
///
/// Internal plumbing that always ends up as a log line or an escalated
/// event uses `anyhow::Error` for context-chaining instead; this enum is
/// reserved for failures a caller is expected to `match` on.
#[derive(Debug, Error)]
pub enum InterpreterError {
    #[error("cannot send to an interpreter that has not been started")]
    NotStarted,

    #[error("attempted to forward an event to child `{child_id}`, which is not registered")]
    ForwardToMissing { child_id: String },

    #[error("no actor named `{target}` could be found to send an event to")]
    SendTargetMissing { target: String },

    #[error("event `{name}` was not handled by any listener")]
    Unhandled { name: String },
}
