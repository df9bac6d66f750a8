//! A traffic light that advances itself on a timer and can be forced back
//! to red by an `EMERGENCY` event — demonstrating a delayed `send` and its
//! `cancel` (`SPEC_FULL.md` §4.4, scenario 2).

use std::time::Duration;

use serde::Serialize;
use stateflow_core::{
    Action, ActiveState, ChildMirror, Configuration, Event, Machine, SessionId, StateKind,
    StateSnapshot,
};

/// `send`/`cancel` id shared by every scheduled tick: at most one is ever
/// pending, so reusing the id is enough to let `EMERGENCY` cancel
/// whichever one is currently outstanding.
const TICK_SEND_ID: &str = "tick";
const ADVANCE_DELAY: Duration = Duration::from_millis(800);

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub enum Light {
    Red,
    Green,
    Yellow,
}

impl Light {
    fn next(self) -> Self {
        match self {
            Light::Red => Light::Green,
            Light::Green => Light::Yellow,
            Light::Yellow => Light::Red,
        }
    }

    fn state_id(self) -> &'static str {
        match self {
            Light::Red => "red",
            Light::Green => "green",
            Light::Yellow => "yellow",
        }
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct Context {
    /// Number of times the light has returned to red.
    pub cycles: u64,
}

#[derive(Clone, Serialize)]
pub struct Snapshot {
    pub light: Light,
    context: Context,
    #[serde(skip)]
    event: Event,
    configuration: Configuration,
    #[serde(skip)]
    actions: Vec<Action<Context>>,
    changed: bool,
    children: ChildMirror,
    session_id: Option<SessionId>,
}

impl Snapshot {
    fn new(
        light: Light,
        context: Context,
        event: Event,
        actions: Vec<Action<Context>>,
        changed: bool,
    ) -> Self {
        let configuration = Configuration::new(vec![ActiveState {
            id: light.state_id().to_string(),
            kind: StateKind::Atomic,
            parent: None,
        }]);
        Self {
            light,
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

impl StateSnapshot for Snapshot {
    type Context = Context;

    fn context(&self) -> &Context {
        &self.context
    }

    fn event(&self) -> &Event {
        &self.event
    }

    fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    fn actions(&self) -> &[Action<Context>] {
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

/// `Red -> Green -> Yellow -> Red`, advancing on its own `TICK` timer.
pub struct TrafficLight;

impl Machine for TrafficLight {
    type Context = Context;
    type Snapshot = Snapshot;

    fn id(&self) -> &str {
        "traffic-light"
    }

    fn initial_state(&self) -> Snapshot {
        let actions = vec![Action::send_delayed(
            TICK_SEND_ID,
            Event::new("TICK"),
            ADVANCE_DELAY,
        )];
        Snapshot::new(
            Light::Red,
            Context::default(),
            Event::new(stateflow_core::INIT_EVENT),
            actions,
            true,
        )
    }

    fn transition(&self, state: &Snapshot, event: &Event) -> Snapshot {
        match event.name.as_str() {
            "TICK" => {
                let next_light = state.light.next();
                let context = Context {
                    cycles: state.context.cycles + u64::from(next_light == Light::Red),
                };
                let actions = vec![Action::send_delayed(
                    TICK_SEND_ID,
                    Event::new("TICK"),
                    ADVANCE_DELAY,
                )];
                Snapshot::new(next_light, context, event.clone(), actions, true)
            }
            // Cancels whichever tick is outstanding and does not schedule a
            // replacement: the light stops advancing until restarted.
            "EMERGENCY" => {
                let actions = vec![Action::cancel("cancel-tick", TICK_SEND_ID)];
                let changed = state.light != Light::Red;
                Snapshot::new(Light::Red, state.context.clone(), event.clone(), actions, changed)
            }
            _ => Snapshot::new(state.light, state.context.clone(), event.clone(), Vec::new(), false),
        }
    }
}
