use std::collections::HashMap;

use serde_json::Value;

use crate::action::Action;
use crate::event::Event;

/// Identifies what role an active leaf state plays in terminality
/// detection.
#[derive(Copy, Clone, Debug, Eq, PartialEq, serde::Serialize)]
pub enum StateKind {
    Atomic,
    Compound,
    Parallel,
    Final,
    History,
}

/// One active leaf state in a configuration, with a back-reference to its
/// parent so the interpreter can decide whether the configuration as a
/// whole is terminal without needing to walk the machine definition
/// itself (which is an external collaborator, out of scope for this
/// crate).
#[derive(Clone, Debug, serde::Serialize)]
pub struct ActiveState {
    pub id: String,
    pub kind: StateKind,
    /// `None` means this state is a direct child of the machine root.
    pub parent: Option<String>,
}

/// The set of currently active leaf states of a [`StateSnapshot`].
#[derive(Clone, Debug, Default, serde::Serialize)]
pub struct Configuration(pub Vec<ActiveState>);

impl Configuration {
    pub fn new(states: Vec<ActiveState>) -> Self {
        Self(states)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActiveState> {
        self.0.iter()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.iter().any(|s| s.id == id)
    }

    /// True when every top-level active state (one whose `parent` is
    /// `None`, i.e. a direct child of the machine root) is a `Final`
    /// state. An empty configuration is never terminal.
    pub fn is_terminal(&self) -> bool {
        let top_level: Vec<&ActiveState> =
            self.0.iter().filter(|s| s.parent.is_none()).collect();

        !top_level.is_empty() && top_level.iter().all(|s| s.kind == StateKind::Final)
    }

    /// The first top-level `Final` descendant, used to build the
    /// `done.invoke.<id>` event when the configuration is terminal.
    pub fn top_level_final(&self) -> Option<&ActiveState> {
        self.0
            .iter()
            .find(|s| s.parent.is_none() && s.kind == StateKind::Final)
    }
}

/// Lightweight, serializable view of a spawned child actor, mirrored onto
/// the snapshot for observability (`state.children`).
#[derive(Clone, Debug, serde::Serialize)]
pub struct ChildMeta {
    pub id: String,
}

/// Mirror of the interpreter's child-actor set, carried on the snapshot so
/// consumers inspecting a past snapshot can still see what was spawned at
/// that point.
pub type ChildMirror = HashMap<String, ChildMeta>;

/// Process-unique handle assigned to a started interpreter.
pub type SessionId = u64;

/// Immutable record of machine state at one point in time.
///
/// This type is opaque to the interpreter beyond the shape required here:
/// the concrete representation of `value` (the hierarchical state label)
/// and the transition algorithm that produces snapshots are external
/// collaborators, out of scope for this crate.
pub trait StateSnapshot: Send + Sync + Clone + serde::Serialize + 'static {
    type Context: Send + Sync + Clone + 'static;

    fn context(&self) -> &Self::Context;
    fn event(&self) -> &Event;
    fn configuration(&self) -> &Configuration;
    fn actions(&self) -> &[Action<Self::Context>];
    fn changed(&self) -> bool;

    /// Overrides this snapshot's `changed` flag in place.
    ///
    /// `send_batch` OR-folds `changed` across every intermediate
    /// transition in the batch, but a later no-op transition can leave the
    /// final snapshot's own `changed()` at `false` even though the batch
    /// as a whole changed something; this writes the folded result back
    /// onto the snapshot that's actually handed to listeners.
    fn set_changed(&mut self, changed: bool);

    /// The context prior to this transition, if a history transition
    /// supplies one. Passed to context-listeners alongside the current
    /// context.
    fn history_context(&self) -> Option<&Self::Context> {
        None
    }

    fn children(&self) -> &ChildMirror;
    fn children_mut(&mut self) -> &mut ChildMirror;

    fn session_id(&self) -> Option<SessionId>;
    fn set_session_id(&mut self, id: SessionId);
}

/// A static hierarchical-state-chart definition.
///
/// `transition` and `initial_state` are pure: given the same inputs they
/// must produce the same output and must not perform I/O or spawn actors
/// directly (actors are spawned by the interpreter executing the
/// resulting `Start` actions).
pub trait Machine: Send + Sync + 'static {
    type Context: Send + Sync + Clone + 'static;
    type Snapshot: StateSnapshot<Context = Self::Context>;

    fn id(&self) -> &str;

    fn initial_state(&self) -> Self::Snapshot;

    fn transition(&self, state: &Self::Snapshot, event: &Event) -> Self::Snapshot;

    /// Resolve the `data` expression (if any) of the named final state
    /// against the final context and event. Evaluating expressions is a
    /// machine-compiler concern, out of scope for this crate; by default
    /// no data is produced.
    fn resolve_done_data(
        &self,
        _final_id: &str,
        _context: &Self::Context,
        _event: &Event,
    ) -> Option<Value> {
        None
    }
}
