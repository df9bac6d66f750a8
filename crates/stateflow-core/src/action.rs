use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::event::Event;
use crate::machine::Configuration;

/// Read-only view of the snapshot a custom action is running against.
///
/// `StateSnapshot` itself can't be handed through as `&dyn` (it requires
/// `Clone`), so this carries the subset of it a custom action actually
/// has a legitimate use for: the context it produced, the configuration
/// it settled into, the event that drove the transition, and whether
/// that transition actually changed anything.
pub struct ActionStateView<'a, C> {
    pub context: &'a C,
    pub configuration: &'a Configuration,
    pub event: &'a Event,
    pub changed: bool,
}

/// Metadata passed to an action's executable alongside the context and
/// event data: which action is running, the state it's running against,
/// and the event that triggered it.
pub struct ActionMeta<'a, C> {
    pub action_id: &'a str,
    pub state: ActionStateView<'a, C>,
    pub event: &'a Event,
}

/// A closure invoked by the action executor for a `Custom` action whose
/// implementation was resolved either from the machine's option map or
/// from the action's own inline `exec`.
///
/// Generic over the machine's context type `C`, matching `Machine::Context`.
pub type ActionExec<C> = Arc<dyn Fn(&mut C, &Event, ActionMeta<'_, C>) + Send + Sync>;

/// Discriminates the recognized built-in action kinds plus an escape hatch
/// for machine-specific custom actions.
#[derive(Clone)]
pub enum ActionKind<C> {
    /// Schedule (or immediately dispatch, if `delay` is `None`) an event.
    Send {
        event: Event,
        to: Option<String>,
        delay: Option<std::time::Duration>,
    },
    /// Cancel a previously scheduled delayed send by id.
    Cancel { send_id: String },
    /// Spawn and start a child actor (an "invoke" or "activity").
    Start { descriptor: InvokeDescriptor },
    /// Stop a named child.
    Stop { child_id: String },
    /// Emit a log line through the configured logger.
    Log { label: Option<String>, value: Value },
    /// Applied by the machine collaborator during transition computation;
    /// a no-op for the interpreter's action executor.
    Assign,
    /// Anything else. Resolved against the machine's action implementation
    /// map, or executed via `exec` if present.
    Custom { kind: String, exec: Option<ActionExec<C>> },
}

impl<C> fmt::Debug for ActionKind<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Send { event, to, delay } => f
                .debug_struct("Send")
                .field("event", event)
                .field("to", to)
                .field("delay", delay)
                .finish(),
            ActionKind::Cancel { send_id } => {
                f.debug_struct("Cancel").field("send_id", send_id).finish()
            }
            ActionKind::Start { descriptor } => {
                f.debug_struct("Start").field("descriptor", descriptor).finish()
            }
            ActionKind::Stop { child_id } => {
                f.debug_struct("Stop").field("child_id", child_id).finish()
            }
            ActionKind::Log { label, value } => f
                .debug_struct("Log")
                .field("label", label)
                .field("value", value)
                .finish(),
            ActionKind::Assign => f.write_str("Assign"),
            ActionKind::Custom { kind, .. } => {
                f.debug_struct("Custom").field("kind", kind).finish()
            }
        }
    }
}

/// Describes a child actor to be spawned by a `Start` action.
#[derive(Clone, Debug)]
pub struct InvokeDescriptor {
    pub id: String,
    pub service: String,
    pub auto_forward: bool,
    pub data: Value,
}

/// One entry of a state's action list.
///
/// `id` distinguishes actions of the same kind within a single action
/// list (most importantly, the id used to correlate a `Send`/`Cancel`
/// pair in the delayed-events map).
#[derive(Clone)]
pub struct Action<C> {
    pub id: String,
    pub kind: ActionKind<C>,
}

impl<C> Action<C> {
    pub fn new(id: impl Into<String>, kind: ActionKind<C>) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    pub fn send(id: impl Into<String>, event: Event) -> Self {
        Self::new(
            id,
            ActionKind::Send {
                event,
                to: None,
                delay: None,
            },
        )
    }

    pub fn send_delayed(id: impl Into<String>, event: Event, delay: std::time::Duration) -> Self {
        Self::new(
            id,
            ActionKind::Send {
                event,
                to: None,
                delay: Some(delay),
            },
        )
    }

    pub fn cancel(id: impl Into<String>, send_id: impl Into<String>) -> Self {
        Self::new(
            id,
            ActionKind::Cancel {
                send_id: send_id.into(),
            },
        )
    }

    pub fn log(id: impl Into<String>, label: Option<String>, value: Value) -> Self {
        Self::new(id, ActionKind::Log { label, value })
    }
}

impl<C> fmt::Debug for Action<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}
