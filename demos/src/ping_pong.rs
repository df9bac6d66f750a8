//! A parent ("rally") interpreter that spawns a nested child machine
//! ("ponger"), auto-forwards every event it receives down to it, and folds
//! the child's completion back into its own — exercising supervision,
//! auto-forward, and the final-state termination cascade in one demo
//! (`SPEC_FULL.md` §4.5, §4.3, scenarios 4 and 5).
//!
//! `cargo run --example ping_pong` drives the whole thing end to end.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use stateflow::{ActorRef, InterpretOptions, Interpreter, MachineSpawnArgs, ServiceFactory, Spawnable};
use stateflow_core::{
    Action, ActionKind, ActiveState, ChildMirror, Configuration, Event, InvokeDescriptor, Machine,
    SessionId, StateKind, StateSnapshot,
};

/// How many `PING`s the child needs to see before it reports done.
const TARGET_HITS: u64 = 3;
const PONGER_SERVICE: &str = "ponger";
const PONGER_ID: &str = "ponger";

// ---- Child: Ponger --------------------------------------------------------

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
enum PongerState {
    Bouncing,
    Done,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct PongerContext {
    pub hits: u64,
}

#[derive(Clone, Serialize)]
pub struct PongerSnapshot {
    state: PongerState,
    context: PongerContext,
    #[serde(skip)]
    event: Event,
    configuration: Configuration,
    #[serde(skip)]
    actions: Vec<Action<PongerContext>>,
    changed: bool,
    children: ChildMirror,
    session_id: Option<SessionId>,
}

impl PongerSnapshot {
    fn new(state: PongerState, context: PongerContext, event: Event, changed: bool) -> Self {
        let kind = match state {
            PongerState::Bouncing => StateKind::Atomic,
            PongerState::Done => StateKind::Final,
        };
        let id = match state {
            PongerState::Bouncing => "bouncing",
            PongerState::Done => "done",
        };
        let configuration = Configuration::new(vec![ActiveState {
            id: id.to_string(),
            kind,
            parent: None,
        }]);
        Self {
            state,
            context,
            event,
            configuration,
            actions: Vec::new(),
            changed,
            children: ChildMirror::default(),
            session_id: None,
        }
    }
}

impl StateSnapshot for PongerSnapshot {
    type Context = PongerContext;

    fn context(&self) -> &PongerContext {
        &self.context
    }

    fn event(&self) -> &Event {
        &self.event
    }

    fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    fn actions(&self) -> &[Action<PongerContext>] {
        &self.actions
    }

    fn changed(&self) -> bool {
        self.changed
    }

    fn set_changed(&mut self, changed: bool) {
        self.changed = changed;
    }

    fn children(&self) -> &ChildMirror {
        &self.children
    }

    fn children_mut(&mut self) -> &mut ChildMirror {
        &mut self.children
    }

    fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    fn set_session_id(&mut self, id: SessionId) {
        self.session_id = Some(id);
    }
}

/// Counts `PING`s and reports `done.invoke.<id>` with its hit count once
/// `TARGET_HITS` is reached.
pub struct Ponger;

impl Machine for Ponger {
    type Context = PongerContext;
    type Snapshot = PongerSnapshot;

    fn id(&self) -> &str {
        PONGER_ID
    }

    fn initial_state(&self) -> PongerSnapshot {
        PongerSnapshot::new(
            PongerState::Bouncing,
            PongerContext::default(),
            Event::new(stateflow_core::INIT_EVENT),
            true,
        )
    }

    fn transition(&self, state: &PongerSnapshot, event: &Event) -> PongerSnapshot {
        if event.name != "PING" || state.state == PongerState::Done {
            return PongerSnapshot::new(state.state, state.context.clone(), event.clone(), false);
        }

        let hits = state.context.hits + 1;
        let next_state = if hits >= TARGET_HITS {
            PongerState::Done
        } else {
            PongerState::Bouncing
        };
        PongerSnapshot::new(next_state, PongerContext { hits }, event.clone(), true)
    }

    fn resolve_done_data(&self, _final_id: &str, context: &PongerContext, _event: &Event) -> Option<Value> {
        Some(serde_json::json!({ "hits": context.hits }))
    }
}

// ---- Parent: Rally ---------------------------------------------------------

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
enum RallyState {
    Waiting,
    Finished,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct RallyContext {
    pub hits: Option<u64>,
}

#[derive(Clone, Serialize)]
pub struct RallySnapshot {
    state: RallyState,
    context: RallyContext,
    #[serde(skip)]
    event: Event,
    configuration: Configuration,
    #[serde(skip)]
    actions: Vec<Action<RallyContext>>,
    changed: bool,
    children: ChildMirror,
    session_id: Option<SessionId>,
}

impl RallySnapshot {
    fn new(
        state: RallyState,
        context: RallyContext,
        event: Event,
        actions: Vec<Action<RallyContext>>,
        changed: bool,
    ) -> Self {
        let kind = match state {
            RallyState::Waiting => StateKind::Atomic,
            RallyState::Finished => StateKind::Final,
        };
        let id = match state {
            RallyState::Waiting => "waiting",
            RallyState::Finished => "finished",
        };
        let configuration = Configuration::new(vec![ActiveState {
            id: id.to_string(),
            kind,
            parent: None,
        }]);
        Self {
            state,
            context,
            event,
            configuration,
            actions,
            changed,
            children: ChildMirror::default(),
            session_id: None,
        }
    }
}

impl StateSnapshot for RallySnapshot {
    type Context = RallyContext;

    fn context(&self) -> &RallyContext {
        &self.context
    }

    fn event(&self) -> &Event {
        &self.event
    }

    fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    fn actions(&self) -> &[Action<RallyContext>] {
        &self.actions
    }

    fn changed(&self) -> bool {
        self.changed
    }

    fn set_changed(&mut self, changed: bool) {
        self.changed = changed;
    }

    fn children(&self) -> &ChildMirror {
        &self.children
    }

    fn children_mut(&mut self) -> &mut ChildMirror {
        &mut self.children
    }

    fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    fn set_session_id(&mut self, id: SessionId) {
        self.session_id = Some(id);
    }
}

/// On `START`, spawns an auto-forwarded `Ponger` child. Every subsequent
/// event the parent receives (e.g. `PING`) reaches the child first, before
/// the parent's own (here, no-op) transition runs. When the child finishes
/// and its `done.invoke.<id>` reaches the parent, the parent folds the
/// child's hit count into its own context and moves to its own final
/// state, cascading its own `stop()`.
pub struct Rally;

impl Machine for Rally {
    type Context = RallyContext;
    type Snapshot = RallySnapshot;

    fn id(&self) -> &str {
        "rally"
    }

    fn initial_state(&self) -> RallySnapshot {
        RallySnapshot::new(
            RallyState::Waiting,
            RallyContext::default(),
            Event::new(stateflow_core::INIT_EVENT),
            Vec::new(),
            true,
        )
    }

    fn transition(&self, state: &RallySnapshot, event: &Event) -> RallySnapshot {
        if event.name == "START" && state.state == RallyState::Waiting {
            let descriptor = InvokeDescriptor {
                id: PONGER_ID.to_string(),
                service: PONGER_SERVICE.to_string(),
                auto_forward: true,
                data: Value::Null,
            };
            let actions = vec![Action::new(
                "start-ponger",
                ActionKind::Start { descriptor },
            )];
            return RallySnapshot::new(state.state, state.context.clone(), event.clone(), actions, false);
        }

        if event.name == format!("done.invoke.{PONGER_ID}") {
            let hits = event.data.get("hits").and_then(Value::as_u64);
            return RallySnapshot::new(
                RallyState::Finished,
                RallyContext { hits },
                event.clone(),
                Vec::new(),
                true,
            );
        }

        RallySnapshot::new(state.state, state.context.clone(), event.clone(), Vec::new(), false)
    }
}

/// The service factory the `Rally` machine's `start-ponger` action
/// resolves through [`stateflow::InterpretOptions::with_service`]: builds
/// (but does not start — `Interpreter::spawn` does that) a nested
/// `Ponger` interpreter parented to whoever is spawning it.
pub fn ponger_service() -> ServiceFactory {
    Arc::new(move |_descriptor: &InvokeDescriptor, _event: &Event| {
        Ok(Spawnable::Machine(Box::new(move |args: MachineSpawnArgs| {
            let options = InterpretOptions::default()
                .with_id(args.id)
                .with_parent(args.parent);
            Interpreter::new(Arc::new(Ponger), options) as Arc<dyn ActorRef>
        })))
    })
}

/// Convenience constructor wiring the `ponger` service factory into a
/// fresh `Rally` interpreter's options.
pub fn rally_options() -> InterpretOptions {
    InterpretOptions::default().with_service(PONGER_SERVICE, ponger_service())
}
