//! Runtime interpreter for hierarchical statecharts and their embedded
//! actor hierarchy.
//!
//! The pure data model (`Machine`, `StateSnapshot`, `Action`, `Event`) lives
//! in `stateflow-core`; this crate is everything that schedules, executes,
//! and supervises around that model — the scheduler (`scheduler`), the
//! actor adapters (`actor`), the process registry (`registry`), the
//! ambient service-scope stack (`service_scope`), the abstract timer
//! (`clock`), and the interpreter core itself (`interpreter`). See
//! `SPEC_FULL.md` §2 for how these fit together.

mod actor;
mod clock;
mod config;
pub mod dst;
mod error;
mod interpreter;
mod registry;
mod scheduler;
mod service_scope;

pub use stateflow_core::{
    Action, ActionKind, ActionMeta, ActionStateView, ChildMeta, ChildMirror, Configuration, Event,
    IntoEvent, Machine, StateKind, StateSnapshot, ACTION_ERROR_EVENT, INIT_EVENT,
    PLATFORM_ERROR_TOKEN,
};

pub use self::actor::{
    ActorRef, CallbackActor, CallbackReceiver, CallbackSender, Disposer, ErasedObserver,
    FutureActor, MachineSpawnArgs, NullActor, SpawnOptions, Spawnable, StreamActor, Subscription,
};
pub use self::clock::{Clock, SystemClock};
pub use self::config::{InterpretOptions, Logger, ServiceFactory, TracingLogger};
pub use self::error::InterpreterError;
pub use self::interpreter::{interpret, Interpreter, Status, TypedSubscription};
pub use self::registry::Registry;
pub use self::service_scope::current as current_scope;

/// Free-function counterpart to [`Interpreter::spawn`], for call sites that
/// have no explicit parent handle threaded through (`SPEC_FULL.md` §4.6).
///
/// Attaches `entity` under the innermost currently-executing interpreter
/// (as tracked by [`service_scope`]). Called with an empty scope — the
/// common case being a host calling `spawn` at the top level rather than
/// from inside a `Machine::transition` — this returns a [`NullActor`] and
/// logs a warning (scenario 6 in `SPEC_FULL.md` §8).
pub fn spawn(entity: Spawnable, name: impl Into<String>, options: SpawnOptions) -> std::sync::Arc<dyn ActorRef> {
    let name = name.into();
    match service_scope::current() {
        Some(parent) => parent.spawn_child(entity, name, options),
        None => {
            tracing::warn!(actor = %name, "spawn() called with no interpreter in the current service scope; returning a null actor");
            std::sync::Arc::new(NullActor::new(name))
        }
    }
}
