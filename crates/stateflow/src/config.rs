//! Construction options for [`crate::interpreter::Interpreter`], and the
//! pluggable [`Logger`] sink for `log` actions.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use stateflow_core::{Event, InvokeDescriptor};

use crate::actor::{ActorRef, Spawnable};
use crate::clock::{Clock, SystemClock};

/// Sink for `log` actions. The default logs through `tracing::debug!`;
/// hosts can override this to capture log actions for assertions in
/// tests, or to route them to a different sink entirely.
pub trait Logger: Send + Sync {
    fn log(&self, label: Option<&str>, value: &Value);
}

/// The default logger, routing through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, label: Option<&str>, value: &Value) {
        match label {
            Some(label) => tracing::debug!(target: "stateflow::log", %label, %value),
            None => tracing::debug!(target: "stateflow::log", %value),
        }
    }
}

/// Hook for an attached devtools channel. Entirely compiled out unless
/// the `dev-tools` feature is enabled.
#[cfg(feature = "dev-tools")]
pub trait DevToolsSink: Send + Sync {
    fn notify<S: serde::Serialize + ?Sized>(&self, snapshot: &S);
}

/// Resolves the `service` named by a `Start` action's invoke descriptor
/// into something `Interpreter::spawn` can construct an adapter for.
///
/// `Err` models the service factory itself throwing during construction:
/// the executor turns it into a self-dispatched `error(id, err)` event
/// rather than spawning anything. `anyhow::Error` rather than a bare JSON
/// value, so a factory can chain context (`.context("...")`) the way the
/// rest of this crate's internal plumbing does. Resolving the
/// descriptor's `data` expression into arguments the factory can use is
/// the machine compiler's job (out of scope here); the factory sees the
/// already-resolved `InvokeDescriptor::data`.
pub type ServiceFactory =
    Arc<dyn Fn(&InvokeDescriptor, &Event) -> anyhow::Result<Spawnable> + Send + Sync>;

/// Construction options for `interpret`/`Interpreter::new`.
///
/// Builder-style via `derive_setters`. Every field has a sensible default
/// so `InterpretOptions::default()` is always a valid starting point.
#[derive(Clone, derive_setters::Setters)]
#[setters(strip_option, prefix = "with_")]
pub struct InterpretOptions {
    /// If `false`, actions are attached to the snapshot but never executed
    /// by the interpreter's action executor.
    pub execute: bool,
    /// Pre-start `send`s are queued rather than rejected.
    pub defer_events: bool,
    /// Timer primitive used for delayed sends.
    #[setters(skip)]
    pub clock: Arc<dyn Clock>,
    /// Sink for `log` actions.
    #[setters(skip)]
    pub logger: Arc<dyn Logger>,
    /// Parent actor, set automatically for spawned children.
    pub parent: Option<Arc<dyn ActorRef>>,
    /// Overrides the interpreter id (defaults to `machine.id()`).
    pub id: Option<String>,
    /// Factory map consulted by `Start` actions to resolve an invoke's
    /// named service. A service with no registered factory is a soft
    /// misconfiguration: the executor warns and skips it rather than
    /// failing the microstep.
    #[setters(skip)]
    pub services: Arc<HashMap<String, ServiceFactory>>,
}

impl InterpretOptions {
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Register a service factory under `name`, replacing any prior entry
    /// by that name. Builder-style, like the other `with_*` setters.
    pub fn with_service(mut self, name: impl Into<String>, factory: ServiceFactory) -> Self {
        Arc::make_mut(&mut self.services).insert(name.into(), factory);
        self
    }
}

impl Default for InterpretOptions {
    fn default() -> Self {
        Self {
            execute: true,
            defer_events: true,
            clock: Arc::new(SystemClock),
            logger: Arc::new(TracingLogger),
            parent: None,
            id: None,
            services: Arc::new(HashMap::new()),
        }
    }
}

impl std::fmt::Debug for InterpretOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterpretOptions")
            .field("execute", &self.execute)
            .field("defer_events", &self.defer_events)
            .field("parent", &self.parent.as_ref().map(|p| p.id().to_string()))
            .field("id", &self.id)
            .field("services", &self.services.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
