//! End-to-end tests for the interpreter lifecycle, action executor, and
//! supervision model, against the scenarios and invariants `SPEC_FULL.md`
//! §8 calls out by name. Each test machine here is a small, self-contained
//! fixture rather than a shared abstraction — they model genuinely
//! different shapes (a linear chain to a final state, a cancelable timer,
//! a parent/child pair) and keeping them separate is clearer than forcing
//! one generic harness to cover all of them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use stateflow::dst::ManualClock;
use stateflow::{
    Action, ActionKind, ChildMirror, Configuration, Event, InterpretOptions, Interpreter, Machine,
    MachineSpawnArgs, Spawnable, SpawnOptions, StateKind, StateSnapshot, Status,
};
use stateflow_core::{ActiveState, InvokeDescriptor, SessionId};

// ---- Fixture: Toggle (A -> B -> C[final]) ---------------------------------

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
enum ToggleState {
    A,
    B,
    C,
}

#[derive(Clone, Debug, Default, Serialize)]
struct ToggleContext {
    steps: u64,
}

#[derive(Clone, Serialize)]
struct ToggleSnapshot {
    state: ToggleState,
    context: ToggleContext,
    #[serde(skip)]
    event: Event,
    configuration: Configuration,
    #[serde(skip)]
    actions: Vec<Action<ToggleContext>>,
    changed: bool,
    children: ChildMirror,
    session_id: Option<SessionId>,
}

impl ToggleSnapshot {
    fn new(
        state: ToggleState,
        context: ToggleContext,
        event: Event,
        actions: Vec<Action<ToggleContext>>,
        changed: bool,
    ) -> Self {
        let kind = if state == ToggleState::C {
            StateKind::Final
        } else {
            StateKind::Atomic
        };
        let id = match state {
            ToggleState::A => "a",
            ToggleState::B => "b",
            ToggleState::C => "c",
        };
        Self {
            state,
            context,
            event,
            configuration: Configuration::new(vec![ActiveState {
                id: id.to_string(),
                kind,
                parent: None,
            }]),
            actions,
            changed,
            children: ChildMirror::default(),
            session_id: None,
        }
    }
}

impl StateSnapshot for ToggleSnapshot {
    type Context = ToggleContext;

    fn context(&self) -> &ToggleContext {
        &self.context
    }
    fn event(&self) -> &Event {
        &self.event
    }
    fn configuration(&self) -> &Configuration {
        &self.configuration
    }
    fn actions(&self) -> &[Action<ToggleContext>] {
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

struct Toggle;

impl Machine for Toggle {
    type Context = ToggleContext;
    type Snapshot = ToggleSnapshot;

    fn id(&self) -> &str {
        "toggle"
    }

    fn initial_state(&self) -> ToggleSnapshot {
        ToggleSnapshot::new(
            ToggleState::A,
            ToggleContext::default(),
            Event::new(stateflow::INIT_EVENT),
            Vec::new(),
            true,
        )
    }

    fn transition(&self, state: &ToggleSnapshot, event: &Event) -> ToggleSnapshot {
        let next = match (state.state, event.name.as_str()) {
            (ToggleState::A, "X") => Some(ToggleState::B),
            (ToggleState::B, "Y") => Some(ToggleState::C),
            _ => None,
        };

        match next {
            Some(next) => {
                let actions = vec![Action::log(
                    format!("log-{}", event.name),
                    Some(event.name.clone()),
                    Value::Null,
                )];
                ToggleSnapshot::new(
                    next,
                    ToggleContext {
                        steps: state.context.steps + 1,
                    },
                    event.clone(),
                    actions,
                    true,
                )
            }
            None => ToggleSnapshot::new(state.state, state.context.clone(), event.clone(), Vec::new(), false),
        }
    }
}

/// Captures every `log` action dispatched, in order.
#[derive(Clone, Default)]
struct RecordingLogger {
    entries: Arc<Mutex<Vec<String>>>,
}

impl stateflow::Logger for RecordingLogger {
    fn log(&self, label: Option<&str>, _value: &Value) {
        self.entries.lock().unwrap().push(label.unwrap_or_default().to_string());
    }
}

// ---- Fixture: Cancelable (Idle -> Ticked, via a delayed TICK) --------------

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
enum CancelableState {
    Idle,
    Ticked,
}

#[derive(Clone, Serialize)]
struct CancelableSnapshot {
    state: CancelableState,
    #[serde(skip)]
    event: Event,
    configuration: Configuration,
    #[serde(skip)]
    actions: Vec<Action<()>>,
    changed: bool,
    children: ChildMirror,
    session_id: Option<SessionId>,
}

impl CancelableSnapshot {
    fn new(state: CancelableState, event: Event, actions: Vec<Action<()>>, changed: bool) -> Self {
        let id = match state {
            CancelableState::Idle => "idle",
            CancelableState::Ticked => "ticked",
        };
        Self {
            state,
            event,
            configuration: Configuration::new(vec![ActiveState {
                id: id.to_string(),
                kind: StateKind::Atomic,
                parent: None,
            }]),
            actions,
            changed,
            children: ChildMirror::default(),
            session_id: None,
        }
    }
}

impl StateSnapshot for CancelableSnapshot {
    type Context = ();

    fn context(&self) -> &() {
        &()
    }
    fn event(&self) -> &Event {
        &self.event
    }
    fn configuration(&self) -> &Configuration {
        &self.configuration
    }
    fn actions(&self) -> &[Action<()>] {
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

/// A state's entry actions schedule a delayed `TICK` and immediately
/// cancel it again, so the timer must never fire (scenario 2).
struct Cancelable;

impl Machine for Cancelable {
    type Context = ();
    type Snapshot = CancelableSnapshot;

    fn id(&self) -> &str {
        "cancelable"
    }

    fn initial_state(&self) -> CancelableSnapshot {
        let actions = vec![
            Action::send_delayed("tick-1", Event::new("TICK"), Duration::from_millis(100)),
            Action::cancel("cancel-it", "tick-1"),
        ];
        CancelableSnapshot::new(CancelableState::Idle, Event::new(stateflow::INIT_EVENT), actions, true)
    }

    fn transition(&self, state: &CancelableSnapshot, event: &Event) -> CancelableSnapshot {
        if event.name == "TICK" {
            CancelableSnapshot::new(CancelableState::Ticked, event.clone(), Vec::new(), true)
        } else {
            CancelableSnapshot::new(state.state, event.clone(), Vec::new(), false)
        }
    }
}

// ---- Fixture: Supervisor / Bouncer (spawn, auto-forward, final cascade) ----

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
enum BouncerState {
    Active,
    Finished,
}

#[derive(Clone, Serialize)]
struct BouncerSnapshot {
    state: BouncerState,
    #[serde(skip)]
    event: Event,
    configuration: Configuration,
    #[serde(skip)]
    actions: Vec<Action<()>>,
    changed: bool,
    children: ChildMirror,
    session_id: Option<SessionId>,
}

impl BouncerSnapshot {
    fn new(state: BouncerState, event: Event, changed: bool) -> Self {
        let (id, kind) = match state {
            BouncerState::Active => ("active", StateKind::Atomic),
            BouncerState::Finished => ("finished", StateKind::Final),
        };
        Self {
            state,
            event,
            configuration: Configuration::new(vec![ActiveState {
                id: id.to_string(),
                kind,
                parent: None,
            }]),
            actions: Vec::new(),
            changed,
            children: ChildMirror::default(),
            session_id: None,
        }
    }
}

impl StateSnapshot for BouncerSnapshot {
    type Context = ();

    fn context(&self) -> &() {
        &()
    }
    fn event(&self) -> &Event {
        &self.event
    }
    fn configuration(&self) -> &Configuration {
        &self.configuration
    }
    fn actions(&self) -> &[Action<()>] {
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

/// Bumps `ticks` on every `Z` it receives (a side channel for asserting
/// auto-forward actually delivered the event) and moves to a final state
/// on `DONE_CHILD`.
struct Bouncer {
    ticks: Arc<AtomicUsize>,
}

impl Machine for Bouncer {
    type Context = ();
    type Snapshot = BouncerSnapshot;

    fn id(&self) -> &str {
        "bouncer"
    }

    fn initial_state(&self) -> BouncerSnapshot {
        BouncerSnapshot::new(BouncerState::Active, Event::new(stateflow::INIT_EVENT), true)
    }

    fn transition(&self, state: &BouncerSnapshot, event: &Event) -> BouncerSnapshot {
        match event.name.as_str() {
            "Z" => {
                self.ticks.fetch_add(1, Ordering::SeqCst);
                BouncerSnapshot::new(state.state, event.clone(), false)
            }
            "DONE_CHILD" => BouncerSnapshot::new(BouncerState::Finished, event.clone(), true),
            _ => BouncerSnapshot::new(state.state, event.clone(), false),
        }
    }

    fn resolve_done_data(&self, _final_id: &str, _context: &(), _event: &Event) -> Option<Value> {
        Some(Value::String("child-done".to_string()))
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
enum SupervisorState {
    Waiting,
    Finished,
}

#[derive(Clone, Serialize)]
struct SupervisorSnapshot {
    state: SupervisorState,
    #[serde(skip)]
    event: Event,
    configuration: Configuration,
    #[serde(skip)]
    actions: Vec<Action<()>>,
    changed: bool,
    children: ChildMirror,
    session_id: Option<SessionId>,
}

impl SupervisorSnapshot {
    fn new(state: SupervisorState, event: Event, actions: Vec<Action<()>>, changed: bool) -> Self {
        let (id, kind) = match state {
            SupervisorState::Waiting => ("waiting", StateKind::Atomic),
            SupervisorState::Finished => ("finished", StateKind::Final),
        };
        Self {
            state,
            event,
            configuration: Configuration::new(vec![ActiveState {
                id: id.to_string(),
                kind,
                parent: None,
            }]),
            actions,
            changed,
            children: ChildMirror::default(),
            session_id: None,
        }
    }
}

impl StateSnapshot for SupervisorSnapshot {
    type Context = ();

    fn context(&self) -> &() {
        &()
    }
    fn event(&self) -> &Event {
        &self.event
    }
    fn configuration(&self) -> &Configuration {
        &self.configuration
    }
    fn actions(&self) -> &[Action<()>] {
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

const BOUNCER_SERVICE: &str = "bouncer";
const BOUNCER_ID: &str = "child";

struct Supervisor;

impl Machine for Supervisor {
    type Context = ();
    type Snapshot = SupervisorSnapshot;

    fn id(&self) -> &str {
        "supervisor"
    }

    fn initial_state(&self) -> SupervisorSnapshot {
        SupervisorSnapshot::new(SupervisorState::Waiting, Event::new(stateflow::INIT_EVENT), Vec::new(), true)
    }

    fn transition(&self, state: &SupervisorSnapshot, event: &Event) -> SupervisorSnapshot {
        if event.name == "SPAWN" {
            let descriptor = InvokeDescriptor {
                id: BOUNCER_ID.to_string(),
                service: BOUNCER_SERVICE.to_string(),
                auto_forward: true,
                data: Value::Null,
            };
            let actions = vec![Action::new("spawn-child", ActionKind::Start { descriptor })];
            return SupervisorSnapshot::new(state.state, event.clone(), actions, false);
        }
        if event.name == format!("done.invoke.{BOUNCER_ID}") {
            return SupervisorSnapshot::new(SupervisorState::Finished, event.clone(), Vec::new(), true);
        }
        SupervisorSnapshot::new(state.state, event.clone(), Vec::new(), false)
    }
}

fn supervisor_options(ticks: Arc<AtomicUsize>) -> InterpretOptions {
    InterpretOptions::default().with_service(
        BOUNCER_SERVICE,
        Arc::new(move |_descriptor: &InvokeDescriptor, _event: &Event| {
            let ticks = ticks.clone();
            Ok(Spawnable::Machine(Box::new(move |args: MachineSpawnArgs| {
                let options = InterpretOptions::default()
                    .with_id(args.id)
                    .with_parent(args.parent);
                Interpreter::new(Arc::new(Bouncer { ticks }), options) as Arc<dyn stateflow::ActorRef>
            })))
        }),
    )
}

// ---- Scenario 1: deferred start --------------------------------------------

#[tokio::test]
async fn deferred_send_before_start_fires_after_initial_state() {
    let interpreter = stateflow::interpret(Toggle, InterpretOptions::default());

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_in_listener = seen.clone();
    interpreter.on_transition(move |s| seen_in_listener.lock().unwrap().push(s.state));

    // deferEvents defaults to true: sending before start() is queued, not
    // rejected.
    interpreter.send("X").expect("deferred send should be accepted");
    assert!(seen.lock().unwrap().is_empty(), "no listener should fire before start()");

    interpreter.start(None);

    let observed = seen.lock().unwrap().clone();
    assert_eq!(observed, vec![ToggleState::A, ToggleState::B]);
}

#[tokio::test]
async fn send_before_start_without_defer_events_fails() {
    let interpreter = stateflow::interpret(Toggle, InterpretOptions::default().with_defer_events(false));
    let err = interpreter.send("X").unwrap_err();
    assert!(matches!(err, stateflow::InterpreterError::NotStarted));
}

// ---- Scenario 2: delayed send + cancel -------------------------------------

#[tokio::test]
async fn cancel_removes_the_pending_timer_before_it_fires() {
    let clock = Arc::new(ManualClock::default());
    let interpreter = stateflow::interpret(
        Cancelable,
        InterpretOptions::default().with_clock(clock.clone()),
    );

    interpreter.start(None);
    tokio::task::yield_now().await;

    // Advance well past the delay; if cancellation failed, TICK would have
    // been delivered by now.
    clock.advance(Duration::from_secs(10));
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    let state = interpreter.current().expect("interpreter has started");
    assert_eq!(state.state, CancelableState::Idle);
}

// ---- Scenario 3: batch coalescing ------------------------------------------

#[tokio::test]
async fn batch_coalesces_into_a_single_transition_listener_call() {
    let logger = RecordingLogger::default();
    let interpreter = stateflow::interpret(
        Toggle,
        InterpretOptions::default().with_logger(Arc::new(logger.clone())),
    );

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_in_listener = calls.clone();
    let last_state = Arc::new(Mutex::new(None));
    let last_state_in_listener = last_state.clone();
    interpreter.on_transition(move |s| {
        calls_in_listener.fetch_add(1, Ordering::SeqCst);
        *last_state_in_listener.lock().unwrap() = Some(s.state);
    });

    interpreter.start(None);
    assert_eq!(calls.load(Ordering::SeqCst), 1, "start() fires once for the initial state");

    interpreter
        .send_batch(vec![Event::new("X"), Event::new("Y")])
        .expect("batch should be accepted");

    assert_eq!(calls.load(Ordering::SeqCst), 2, "the whole batch folds into one more call");
    assert_eq!(*last_state.lock().unwrap(), Some(ToggleState::C));
    assert_eq!(
        *logger.entries.lock().unwrap(),
        vec!["log-X".to_string(), "log-Y".to_string()],
        "the concatenated action list preserves per-transition order"
    );
}

// ---- Scenario 4 & 5: supervision, auto-forward, final-state cascade -------

#[tokio::test]
async fn auto_forwarded_child_observes_events_the_parent_does_not_handle() {
    let ticks = Arc::new(AtomicUsize::new(0));
    let interpreter = stateflow::interpret(Supervisor, supervisor_options(ticks.clone()));

    interpreter.start(None);
    interpreter.send("SPAWN").unwrap();
    interpreter.send("Z").unwrap();

    assert_eq!(ticks.load(Ordering::SeqCst), 1, "the child should have seen the forwarded Z");
    assert_eq!(interpreter.current().unwrap().state, SupervisorState::Waiting);
}

#[tokio::test]
async fn child_final_state_cascades_a_done_invoke_to_the_parent() {
    let ticks = Arc::new(AtomicUsize::new(0));
    let interpreter = stateflow::interpret(Supervisor, supervisor_options(ticks));

    interpreter.start(None);
    interpreter.send("SPAWN").unwrap();

    // Forwarded to the child, which reaches its own final state and
    // cascades `done.invoke.child` back to the parent within this same
    // call.
    interpreter.send("DONE_CHILD").unwrap();

    assert_eq!(interpreter.current().unwrap().state, SupervisorState::Finished);
    assert_eq!(interpreter.status(), Status::Stopped);
}

// ---- Scenario 6: spawn outside any service scope ---------------------------

#[test]
fn spawn_outside_a_service_scope_yields_a_null_actor() {
    struct Inert;
    impl stateflow::ActorRef for Inert {
        fn id(&self) -> &str {
            "inert"
        }
        fn send(&self, _event: Event) {}
        fn start(&self) {}
        fn subscribe(&self, _observer: stateflow::ErasedObserver) -> stateflow::Subscription {
            stateflow::Subscription::empty()
        }
        fn stop(&self) {}
        fn to_json(&self) -> Value {
            Value::Null
        }
    }

    let actor = stateflow::spawn(Spawnable::Actor(Box::new(Inert)), "orphan", SpawnOptions::default());
    assert_eq!(actor.to_json()["kind"].as_str(), Some("null"));

    // A null actor accepts sends and subscriptions as no-ops.
    actor.send(Event::new("PING"));
    let sub = actor.subscribe(stateflow::ErasedObserver::next(|_| {}));
    sub.unsubscribe();
    sub.unsubscribe(); // idempotent
}

// ---- Scenario 7: sibling id collision ---------------------------------------

#[tokio::test]
async fn spawning_under_a_taken_name_stops_the_previous_occupant() {
    struct Tracked {
        id: String,
        stopped: Arc<AtomicUsize>,
    }
    impl stateflow::ActorRef for Tracked {
        fn id(&self) -> &str {
            &self.id
        }
        fn send(&self, _event: Event) {}
        fn start(&self) {}
        fn subscribe(&self, _observer: stateflow::ErasedObserver) -> stateflow::Subscription {
            stateflow::Subscription::empty()
        }
        fn stop(&self) {
            self.stopped.fetch_add(1, Ordering::SeqCst);
        }
        fn to_json(&self) -> Value {
            Value::Null
        }
    }

    let interpreter = stateflow::interpret(Toggle, InterpretOptions::default());
    interpreter.start(None);

    let first_stopped = Arc::new(AtomicUsize::new(0));
    let second_stopped = Arc::new(AtomicUsize::new(0));

    let first = Box::new(Tracked {
        id: "sibling".to_string(),
        stopped: first_stopped.clone(),
    });
    Interpreter::spawn(&interpreter, Spawnable::Actor(first), "sibling", SpawnOptions::default());

    assert_eq!(first_stopped.load(Ordering::SeqCst), 0, "spawning under a free name stops nothing");

    let second = Box::new(Tracked {
        id: "sibling".to_string(),
        stopped: second_stopped.clone(),
    });
    Interpreter::spawn(&interpreter, Spawnable::Actor(second), "sibling", SpawnOptions::default());

    assert_eq!(first_stopped.load(Ordering::SeqCst), 1, "the previous occupant should have been stopped");
    assert_eq!(second_stopped.load(Ordering::SeqCst), 0, "the replacement is still running");

    assert!(
        interpreter.current().unwrap().children().contains_key("sibling"),
        "the replacement should be registered under the shared name"
    );

    // Stopping the interpreter cascades to every currently-registered
    // child; the replacement is still one, the stopped original is not.
    interpreter.stop();
    assert_eq!(first_stopped.load(Ordering::SeqCst), 1, "the replaced original isn't stopped twice");
    assert_eq!(second_stopped.load(Ordering::SeqCst), 1, "the replacement is stopped as a current child");
}

// ---- Invariants -------------------------------------------------------------

#[tokio::test]
async fn next_state_does_not_mutate_current_or_run_actions() {
    let logger = RecordingLogger::default();
    let interpreter = stateflow::interpret(
        Toggle,
        InterpretOptions::default().with_logger(Arc::new(logger.clone())),
    );
    interpreter.start(None);

    let before = interpreter.current().unwrap().state;
    let speculative = interpreter.next_state("X");

    assert_eq!(speculative.state, ToggleState::B);
    assert_eq!(interpreter.current().unwrap().state, before, "next_state must not mutate current()");
    assert!(logger.entries.lock().unwrap().is_empty(), "next_state must not execute actions");
}

#[tokio::test]
async fn send_after_stop_is_a_noop() {
    let interpreter = stateflow::interpret(Toggle, InterpretOptions::default());
    interpreter.start(None);
    interpreter.stop();

    assert_eq!(interpreter.status(), Status::Stopped);
    interpreter.send("X").expect("send to a stopped interpreter warns but does not error");
    assert_eq!(interpreter.current().unwrap().state, ToggleState::A, "a stopped interpreter never transitions again");
}
