//! Pure data model consumed by the `stateflow` interpreter.
//!
//! Everything in this crate is an inert, serializable description of a
//! statechart: the [`Machine`] and [`StateSnapshot`] traits describing the
//! (state, event) -> state' collaborator, the [`Action`] types a snapshot
//! carries, and the [`Event`] normalization rules. None of it schedules
//! anything, spawns an actor, or touches a clock — that is `stateflow`'s
//! job.

pub mod action;
pub mod error;
pub mod event;
pub mod machine;

pub use action::{Action, ActionExec, ActionKind, ActionMeta, ActionStateView, InvokeDescriptor};
pub use error::InterpreterError;
pub use event::{Event, IntoEvent, ACTION_ERROR_EVENT, INIT_EVENT, PLATFORM_ERROR_TOKEN};
pub use machine::{
    ActiveState, ChildMeta, ChildMirror, Configuration, Machine, SessionId, StateKind,
    StateSnapshot,
};
