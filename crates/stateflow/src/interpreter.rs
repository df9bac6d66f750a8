//! The interpreter core: state-update pipeline, listener dispatch,
//! delayed-event map, child supervision, and the action executor
//! (the update pipeline through subscription protocol).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use stateflow_core::{
    Action, ActionKind, ActionMeta, ActionStateView, Configuration, Event, InterpreterError,
    IntoEvent, Machine, SessionId, StateSnapshot, ACTION_ERROR_EVENT, INIT_EVENT,
    PLATFORM_ERROR_TOKEN,
};

use crate::actor::{
    ActorRef, CallbackActor, ErasedObserver, FutureActor, MachineSpawnArgs, Spawnable,
    SpawnOptions, StreamActor, Subscription,
};
use crate::config::InterpretOptions;
use crate::registry::Registry;
use crate::service_scope::ScopeGuard;

/// Lifecycle status of an [`Interpreter`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Status {
    NotStarted,
    Running,
    Stopped,
}

type Listener<F> = Arc<F>;

struct ListenerSet<F: ?Sized> {
    next_id: AtomicU64,
    items: Mutex<Vec<(u64, Listener<F>)>>,
}

impl<F: ?Sized> ListenerSet<F> {
    fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            items: Mutex::new(Vec::new()),
        }
    }

    fn add(&self, f: Listener<F>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.items.lock().push((id, f));
        id
    }

    fn remove(&self, id: u64) {
        self.items.lock().retain(|(item_id, _)| *item_id != id);
    }

    /// A cheap `Arc`-clone of every current listener, taken before
    /// iterating so that listeners added or removed mid-dispatch don't
    /// affect the pass in progress.
    fn snapshot(&self) -> Vec<Listener<F>> {
        self.items.lock().iter().map(|(_, f)| f.clone()).collect()
    }

    /// Atomically take every listener, for `stop()`'s one-shot drain.
    fn drain(&self) -> Vec<Listener<F>> {
        std::mem::take(&mut *self.items.lock())
            .into_iter()
            .map(|(_, f)| f)
            .collect()
    }
}

type TransitionFn<M> = dyn Fn(&<M as Machine>::Snapshot) + Send + Sync;
type ContextFn<M> =
    dyn Fn(&<M as Machine>::Context, Option<&<M as Machine>::Context>) + Send + Sync;
type EventFn = dyn Fn(&Event) + Send + Sync;
type StopFn = dyn Fn() + Send + Sync;

struct Listeners<M: Machine> {
    transition: ListenerSet<TransitionFn<M>>,
    context: ListenerSet<ContextFn<M>>,
    done: ListenerSet<EventFn>,
    stop: ListenerSet<StopFn>,
    error: ListenerSet<EventFn>,
    event: ListenerSet<EventFn>,
    send: ListenerSet<EventFn>,
}

impl<M: Machine> Default for Listeners<M> {
    fn default() -> Self {
        Self {
            transition: ListenerSet::new(),
            context: ListenerSet::new(),
            done: ListenerSet::new(),
            stop: ListenerSet::new(),
            error: ListenerSet::new(),
            event: ListenerSet::new(),
            send: ListenerSet::new(),
        }
    }
}

struct Core<M: Machine> {
    state: Option<M::Snapshot>,
    children: HashMap<String, Arc<dyn ActorRef>>,
    forward_to: HashSet<String>,
    delayed_events: HashMap<String, tokio::task::JoinHandle<()>>,
}

impl<M: Machine> Default for Core<M> {
    fn default() -> Self {
        Self {
            state: None,
            children: HashMap::new(),
            forward_to: HashSet::new(),
            delayed_events: HashMap::new(),
        }
    }
}

/// Drives a [`Machine`] through event-driven transitions.
///
/// Owns the machine reference, its
/// identity, the child actor set, the delayed-events map, and the seven
/// listener sets. Always lives behind an `Arc` (construct with
/// [`Interpreter::new`]) because spawned children, the scheduler's
/// microtasks, and the process registry all need to hold a handle back to
/// it independent of whatever local variable first created it.
pub struct Interpreter<M: Machine> {
    machine: Arc<M>,
    id: String,
    session_id: OnceLock<SessionId>,
    status: Mutex<Status>,
    core: Mutex<Core<M>>,
    scheduler: crate::scheduler::Scheduler,
    options: InterpretOptions,
    listeners: Listeners<M>,
    initial_state: OnceLock<M::Snapshot>,
    self_weak: Weak<Interpreter<M>>,
}

enum SendTarget {
    Parent,
    Actor(Arc<dyn ActorRef>),
    Id(String),
}

/// An action paired with the context, configuration, and event of the
/// transition that produced it.
///
/// `send_batch` folds several transitions' actions into one action list
/// before the executor runs; each action must still execute against the
/// state it was actually emitted from rather than the batch's final
/// state, so actions are bound to their producing snapshot at the point
/// they're collected, not at execution time.
struct BoundAction<C> {
    context: C,
    configuration: Configuration,
    event: Event,
    changed: bool,
    action: Action<C>,
}

fn bind_actions<S: StateSnapshot>(state: &S, event: &Event) -> Vec<BoundAction<S::Context>> {
    state
        .actions()
        .iter()
        .cloned()
        .map(|action| BoundAction {
            context: state.context().clone(),
            configuration: state.configuration().clone(),
            event: event.clone(),
            changed: state.changed(),
            action,
        })
        .collect()
}

impl<M: Machine> Interpreter<M> {
    pub fn new(machine: Arc<M>, options: InterpretOptions) -> Arc<Self> {
        let id = options
            .id
            .clone()
            .unwrap_or_else(|| machine.id().to_string());

        Arc::new_cyclic(|weak| Self {
            machine,
            id,
            session_id: OnceLock::new(),
            status: Mutex::new(Status::NotStarted),
            core: Mutex::new(Core::default()),
            scheduler: crate::scheduler::Scheduler::new(options.defer_events),
            options,
            listeners: Listeners::default(),
            initial_state: OnceLock::new(),
            self_weak: weak.clone(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> Status {
        *self.status.lock()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id.get().copied()
    }

    /// The machine's initial snapshot, computed once and cached.
    pub fn initial_state(&self) -> M::Snapshot {
        self.initial_state
            .get_or_init(|| self.machine.initial_state())
            .clone()
    }

    /// The most recently stored snapshot. `None` until `start()` has run.
    pub fn current(&self) -> Option<M::Snapshot> {
        self.core.lock().state.clone()
    }

    fn self_arc(&self) -> Arc<Self> {
        self.self_weak
            .upgrade()
            .expect("Interpreter outlived its own Arc; this is an internal bug")
    }

    fn self_as_actor(&self) -> Arc<dyn ActorRef> {
        self.self_arc()
    }

    /// Idempotent: a second call on an already-started interpreter is a
    /// no-op.
    pub fn start(&self, initial: Option<M::Snapshot>) -> &Self {
        {
            let mut status = self.status.lock();
            if *status != Status::NotStarted {
                return self;
            }
            *status = Status::Running;
        }

        let session_id = Registry::global().alloc_session_id();
        let _ = self.session_id.set(session_id);
        let actor = self.self_as_actor();
        Registry::global().register(session_id, &actor);

        let resolved = initial.unwrap_or_else(|| self.initial_state());
        let this = self.self_arc();
        self.scheduler.initialize(move || {
            let init_event = Event::new(INIT_EVENT);
            let actions = bind_actions(&resolved, &init_event);
            this.update(resolved, init_event, actions);
        });

        self
    }

    /// Clears every listener set (invoking each stop-listener exactly once,
    /// in insertion order, before the set is cleared), stops every child,
    /// cancels every pending timer, clears the scheduler queue, and frees
    /// the session id.
    pub fn stop(&self) {
        {
            let mut status = self.status.lock();
            if *status == Status::Stopped {
                return;
            }
            *status = Status::Stopped;
        }

        for listener in self.listeners.stop.drain() {
            listener();
        }
        self.listeners.transition.drain();
        self.listeners.context.drain();
        self.listeners.done.drain();

        let mut core = self.core.lock();
        for (_, child) in core.children.drain() {
            child.stop();
        }
        core.forward_to.clear();
        for (_, handle) in core.delayed_events.drain() {
            handle.abort();
        }
        drop(core);

        self.scheduler.clear();

        if let Some(session_id) = self.session_id.get() {
            Registry::global().unregister(*session_id, &self.id);
        }
    }

    /// Speculative, side-effect-free transition: does not mutate
    /// `current()`, run actions, or notify listeners.
    pub fn next_state(&self, event: impl IntoEvent) -> M::Snapshot {
        let event = event.into_event();
        let current = self.current().unwrap_or_else(|| self.initial_state());
        self.machine.transition(&current, &event)
    }

    /// Returns a closure that sends `event` and yields the resulting
    /// snapshot.
    pub fn sender(self: &Arc<Self>, event: Event) -> impl Fn() -> Option<M::Snapshot> {
        let this = self.clone();
        move || {
            let _ = this.send(event.clone());
            this.current()
        }
    }

    pub fn send(&self, event: impl IntoEvent) -> Result<(), InterpreterError> {
        let event = event.into_event();
        let status = *self.status.lock();

        match status {
            Status::Stopped => {
                tracing::warn!(
                    interpreter = %self.id, event = %event.name,
                    "send to a stopped interpreter is a no-op"
                );
                return Ok(());
            }
            Status::NotStarted if !self.options.defer_events => {
                return Err(InterpreterError::NotStarted);
            }
            Status::NotStarted => {
                tracing::warn!(
                    interpreter = %self.id, event = %event.name,
                    "send before start(); event is deferred until start() runs"
                );
            }
            Status::Running => {}
        }

        let this = self.self_arc();
        self.scheduler.schedule(move || {
            this.process_event(event);
        });
        Ok(())
    }

    /// One microtask processes the whole batch and `update` runs exactly
    /// once, with the concatenation of every intermediate transition's
    /// actions.
    pub fn send_batch(&self, events: Vec<Event>) -> Result<(), InterpreterError> {
        if events.is_empty() {
            tracing::warn!(interpreter = %self.id, "send_batch called with no events");
            return Ok(());
        }

        let status = *self.status.lock();
        match status {
            Status::Stopped => {
                tracing::warn!(interpreter = %self.id, "batch sent to a stopped interpreter is a no-op");
                return Ok(());
            }
            Status::NotStarted if !self.options.defer_events => {
                return Err(InterpreterError::NotStarted);
            }
            _ => {}
        }

        let this = self.self_arc();
        self.scheduler.schedule(move || {
            this.process_batch(events);
        });
        Ok(())
    }

    fn transition_scoped(&self, state: &M::Snapshot, event: &Event) -> M::Snapshot {
        let actor = self.self_as_actor();
        let _scope = ScopeGuard::enter(&actor);
        self.machine.transition(state, event)
    }

    fn process_event(&self, event: Event) {
        self.forward(&event);
        let current = self.core.lock().state.clone().unwrap_or_else(|| self.initial_state());
        let next = self.transition_scoped(&current, &event);

        if event.is_platform_error() && !next.changed() {
            self.escalate_error(&event);
        }

        let actions = bind_actions(&next, &event);
        self.update(next, event, actions);
    }

    fn process_batch(&self, events: Vec<Event>) {
        let mut current = self
            .core
            .lock()
            .state
            .clone()
            .unwrap_or_else(|| self.initial_state());
        let mut actions = Vec::new();
        let mut changed = false;
        let mut last_event = events[0].clone();

        for event in events {
            let next = self.transition_scoped(&current, &event);
            changed |= next.changed();
            if event.is_platform_error() && !next.changed() {
                self.escalate_error(&event);
            }
            actions.extend(bind_actions(&next, &event));
            last_event = event;
            current = next;
        }

        if changed {
            current.set_changed(true);
        }
        self.update(current, last_event, actions);
    }

    /// Escalates an incoming platform-error event the current state had no
    /// handler for: delivered to every
    /// registered error-listener, or logged as unhandled if none are
    /// registered.
    ///
    /// The source returns the wrapped error from the `send` call site in
    /// this situation; this interpreter processes events on a scheduled
    /// microtask that may run well after `send` has already returned to
    /// its caller, so there is no call site left to
    /// return into. `InterpreterError::Unhandled` is kept on the typed
    /// error surface for hosts that want to assert on it via an
    /// error-listener, but `send` itself always returns `Ok` once past the
    /// lifecycle checks — an intentional deviation, recorded in
    /// `DESIGN.md`.
    fn escalate_error(&self, event: &Event) {
        let listeners = self.listeners.error.snapshot();
        if listeners.is_empty() {
            tracing::error!(
                interpreter = %self.id, event = %event.name,
                "{}", InterpreterError::Unhandled { name: event.name.clone() }
            );
            return;
        }
        for listener in listeners {
            listener(event);
        }
    }

    fn update(&self, mut next_state: M::Snapshot, event: Event, actions: Vec<BoundAction<M::Context>>) {
        if let Some(session_id) = self.session_id.get() {
            next_state.set_session_id(*session_id);
        }
        self.core.lock().state = Some(next_state.clone());

        if self.options.execute {
            self.execute_actions(&actions);
        }

        for listener in self.listeners.event.snapshot() {
            listener(&event);
        }
        for listener in self.listeners.transition.snapshot() {
            listener(&next_state);
        }
        for listener in self.listeners.context.snapshot() {
            listener(next_state.context(), next_state.history_context());
        }

        if next_state.configuration().is_terminal() {
            self.handle_terminal(&next_state, &event);
        }
    }

    fn handle_terminal(&self, state: &M::Snapshot, event: &Event) {
        let Some(final_state) = state.configuration().top_level_final() else {
            return;
        };
        let data = self
            .machine
            .resolve_done_data(&final_state.id, state.context(), event);
        let done_event = Event::done_invoke(&self.id, data);

        for listener in self.listeners.done.snapshot() {
            listener(&done_event);
        }

        // Surfaces as a `done.invoke.<id>` event on whoever spawned us, the
        // same "parent" resolution `send_to` uses for any other send.
        let _ = self.send_to(done_event, SendTarget::Parent);

        self.stop();
    }

    // ---- Action executor -----------------------------------------------

    fn execute_actions(&self, actions: &[BoundAction<M::Context>]) {
        for bound in actions {
            self.execute_action(bound);
        }
    }

    fn execute_action(&self, bound: &BoundAction<M::Context>) {
        let action = &bound.action;

        if let ActionKind::Custom {
            exec: Some(exec), ..
        } = &action.kind
        {
            let mut context = bound.context.clone();

            let meta = ActionMeta {
                action_id: &action.id,
                state: ActionStateView {
                    context: &bound.context,
                    configuration: &bound.configuration,
                    event: &bound.event,
                    changed: bound.changed,
                },
                event: &bound.event,
            };

            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                exec(&mut context, &bound.event, meta);
            }));

            if let Err(payload) = result {
                let message = panic_message(&payload);
                let error_event = Event::with_data(
                    ACTION_ERROR_EVENT,
                    serde_json::json!({ "actionId": action.id.clone(), "message": message }),
                );
                let _ = self.send_to(error_event, SendTarget::Parent);
                std::panic::resume_unwind(payload);
            }
            return;
        }

        match &action.kind {
            ActionKind::Send { event: to_send, to, delay } => self.exec_send(action, to_send, to.as_deref(), *delay),
            ActionKind::Cancel { send_id } => self.exec_cancel(send_id),
            ActionKind::Start { descriptor } => self.exec_start(descriptor, &bound.event),
            ActionKind::Stop { child_id } => self.stop_child(child_id),
            ActionKind::Log { label, value } => self.options.logger.log(label.as_deref(), value),
            ActionKind::Assign => {}
            ActionKind::Custom { kind, .. } => {
                tracing::warn!(interpreter = %self.id, action = %kind, "no implementation registered for custom action");
            }
        }
    }

    fn exec_send(
        &self,
        action: &Action<M::Context>,
        event: &Event,
        to: Option<&str>,
        delay: Option<std::time::Duration>,
    ) {
        match delay {
            Some(delay) => {
                let this = self.self_arc();
                let event = event.clone();
                let to = to.map(|s| s.to_string());
                let clock = self.options.clock.clone();
                let send_id = action.id.clone();

                let handle = tokio::spawn(async move {
                    clock.sleep(delay).await;
                    match &to {
                        Some(target) => {
                            let _ = this.send_to(event, SendTarget::Id(target.clone()));
                        }
                        None => {
                            let _ = this.send(event);
                        }
                    }
                    this.core.lock().delayed_events.remove(&send_id);
                });

                self.core
                    .lock()
                    .delayed_events
                    .insert(action.id.clone(), handle);
            }
            None => match to {
                Some(target) => {
                    let _ = self.send_to(event.clone(), SendTarget::Id(target.to_string()));
                }
                None => {
                    let _ = self.send(event.clone());
                }
            },
        }
    }

    fn exec_cancel(&self, send_id: &str) {
        if let Some(handle) = self.core.lock().delayed_events.remove(send_id) {
            handle.abort();
        }
    }

    fn exec_start(&self, descriptor: &stateflow_core::InvokeDescriptor, event: &Event) {
        let Some(factory) = self.options.services.get(&descriptor.service).cloned() else {
            tracing::warn!(
                interpreter = %self.id,
                child = %descriptor.id,
                service = %descriptor.service,
                "no service factory registered for this invoke; skipping"
            );
            return;
        };

        match factory(descriptor, event) {
            Ok(spawnable) => {
                let this = self.self_arc();
                let options = SpawnOptions {
                    auto_forward: descriptor.auto_forward,
                };
                Interpreter::spawn(&this, spawnable, descriptor.id.clone(), options);
            }
            Err(err) => {
                let _ = self.send(Event::error(&descriptor.id, err));
            }
        }
    }

    // ---- Supervision --------------------------------------------------

    /// Spawn and adopt a new child actor under `name`.
    ///
    /// If a child is already registered under `name`, it is stopped and
    /// replaced — the sibling-id collision policy this implementation
    /// chose for sibling-id collisions.
    pub fn spawn(self: &Arc<Self>, entity: Spawnable, name: impl Into<String>, options: SpawnOptions) -> Arc<dyn ActorRef> {
        let name = name.into();
        let parent: Arc<dyn ActorRef> = self.clone();

        let actor: Arc<dyn ActorRef> = match entity {
            Spawnable::Future(fut) => Arc::new(FutureActor::new(name.clone(), parent.clone(), fut)),
            Spawnable::Callback(factory) => Arc::new(CallbackActor::new(name.clone(), parent.clone(), factory)),
            Spawnable::Actor(actor) => Arc::from(actor),
            Spawnable::Stream(stream) => Arc::new(StreamActor::new(name.clone(), parent.clone(), stream)),
            Spawnable::Machine(build) => build(MachineSpawnArgs {
                id: name.clone(),
                parent: parent.clone(),
            }),
        };

        {
            let mut core = self.core.lock();
            if let Some(previous) = core.children.remove(&name) {
                previous.stop();
            }
            core.forward_to.remove(&name);
            core.children.insert(name.clone(), actor.clone());
            if options.auto_forward {
                core.forward_to.insert(name.clone());
            }
            if let Some(state) = core.state.as_mut() {
                state
                    .children_mut()
                    .insert(name.clone(), stateflow_core::ChildMeta { id: name.clone() });
            }
        }

        actor.start();
        actor
    }

    pub fn remove_child(&self, id: &str) {
        let mut core = self.core.lock();
        core.children.remove(id);
        core.forward_to.remove(id);
        if let Some(state) = core.state.as_mut() {
            state.children_mut().remove(id);
        }
    }

    pub fn stop_child(&self, id: &str) {
        let mut core = self.core.lock();
        let child = core.children.remove(id);
        core.forward_to.remove(id);
        if let Some(state) = core.state.as_mut() {
            state.children_mut().remove(id);
        }
        drop(core);
        if let Some(child) = child {
            child.stop();
        }
    }

    /// Forwards `event` to every child in `forward_to`. A `forward_to`
    /// entry with no matching `children` entry violates the
    /// `forward_to ⊆ children` invariant this interpreter is supposed to
    /// maintain on every `spawn`/`remove_child`/`stop_child` call, so it is
    /// treated as the fatal bug `SPEC_FULL.md` §4.5 calls it rather than
    /// logged and skipped.
    fn forward(&self, event: &Event) {
        let core = self.core.lock();
        for id in &core.forward_to {
            match core.children.get(id) {
                Some(child) => child.send(event.clone()),
                None => panic!(
                    "{}",
                    InterpreterError::ForwardToMissing { child_id: id.clone() }
                ),
            }
        }
    }

    fn send_to(&self, event: Event, target: SendTarget) -> Result<(), InterpreterError> {
        let mut event = event;
        if event.name == PLATFORM_ERROR_TOKEN {
            event = Event::error(&self.id, "propagated platform error");
        }
        event.origin = Some(self.id.clone());

        let is_parent = matches!(target, SendTarget::Parent);
        let target_name = match &target {
            SendTarget::Id(id) => Some(id.clone()),
            _ => None,
        };

        let resolved = match target {
            SendTarget::Parent => self.options.parent.clone(),
            SendTarget::Actor(actor) => Some(actor),
            SendTarget::Id(id) => self
                .core
                .lock()
                .children
                .get(&id)
                .cloned()
                .or_else(|| Registry::global().lookup_by_id(&id)),
        };

        for listener in self.listeners.send.snapshot() {
            listener(&event);
        }

        match resolved {
            Some(actor) => {
                actor.send(event);
                Ok(())
            }
            None if is_parent => {
                tracing::warn!(interpreter = %self.id, "send to parent with no parent attached is a no-op");
                Ok(())
            }
            None => Err(InterpreterError::SendTargetMissing {
                target: target_name.unwrap_or_default(),
            }),
        }
    }

    // ---- Subscription protocol -----------------------------------------

    pub fn on_transition(&self, f: impl Fn(&M::Snapshot) + Send + Sync + 'static) -> u64 {
        self.listeners.transition.add(Arc::new(f))
    }

    pub fn on_change(&self, f: impl Fn(&M::Context, Option<&M::Context>) + Send + Sync + 'static) -> u64 {
        self.listeners.context.add(Arc::new(f))
    }

    pub fn on_event(&self, f: impl Fn(&Event) + Send + Sync + 'static) -> u64 {
        self.listeners.event.add(Arc::new(f))
    }

    pub fn on_send(&self, f: impl Fn(&Event) + Send + Sync + 'static) -> u64 {
        self.listeners.send.add(Arc::new(f))
    }

    pub fn on_done(&self, f: impl Fn(&Event) + Send + Sync + 'static) -> u64 {
        self.listeners.done.add(Arc::new(f))
    }

    pub fn on_stop(&self, f: impl Fn() + Send + Sync + 'static) -> u64 {
        self.listeners.stop.add(Arc::new(f))
    }

    pub fn on_error(&self, f: impl Fn(&Event) + Send + Sync + 'static) -> u64 {
        self.listeners.error.add(Arc::new(f))
    }

    /// Removes a listener registered through any of the `on_*` methods.
    /// `id`s are allocated from disjoint counters per listener set in this
    /// implementation, so this tries every set; callers that know which
    /// set a listener lives in can call the matching `ListenerSet::remove`
    /// directly via the set-specific `off_*` helpers below.
    pub fn off(&self, id: u64) {
        self.listeners.transition.remove(id);
        self.listeners.context.remove(id);
        self.listeners.event.remove(id);
        self.listeners.send.remove(id);
        self.listeners.done.remove(id);
        self.listeners.stop.remove(id);
        self.listeners.error.remove(id);
    }

    /// Typed subscribe overload for callers holding a concrete
    /// `Arc<Interpreter<M>>`. Delivers the current snapshot synchronously,
    /// once, if the interpreter is already running.
    pub fn subscribe(
        self: &Arc<Self>,
        next: impl Fn(&M::Snapshot) + Send + Sync + 'static,
        complete: Option<Box<dyn Fn() + Send + Sync>>,
    ) -> TypedSubscription<M> {
        let next = Arc::new(next);
        let transition_id = self.listeners.transition.add(next.clone());
        let done_id = complete
            .map(|complete| self.listeners.done.add(Arc::new(move |_event: &Event| complete())));

        if self.status() == Status::Running {
            if let Some(state) = self.current() {
                next(&state);
            }
        }

        TypedSubscription {
            interpreter: self.self_arc(),
            transition_id,
            done_id,
        }
    }
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "action panicked with a non-string payload".to_string()
    }
}

/// Handle returned by [`Interpreter::subscribe`]. `unsubscribe` is
/// idempotent.
pub struct TypedSubscription<M: Machine> {
    interpreter: Arc<Interpreter<M>>,
    transition_id: u64,
    done_id: Option<u64>,
}

impl<M: Machine> TypedSubscription<M> {
    pub fn unsubscribe(&self) {
        self.interpreter.listeners.transition.remove(self.transition_id);
        if let Some(id) = self.done_id {
            self.interpreter.listeners.done.remove(id);
        }
    }
}

impl<M: Machine> ActorRef for Interpreter<M> {
    fn id(&self) -> &str {
        &self.id
    }

    fn send(&self, event: Event) {
        let _ = Interpreter::send(self, event);
    }

    fn start(&self) {
        Interpreter::start(self, None);
    }

    fn subscribe(&self, observer: ErasedObserver) -> Subscription {
        // Wrap in an `Arc` up front so the same callable can both be
        // registered as a listener and invoked once, synchronously, below
        // for the "deliver current snapshot on subscribe" rule
        // — the typed overload above can call `next`
        // directly since it never moves it into the listener closure, but
        // this one does, so it needs a second handle.
        let next: Option<Arc<dyn Fn(Value) + Send + Sync>> = observer.next.map(Arc::from);
        let transition_id = next.clone().map(|next| {
            self.listeners.transition.add(Arc::new(move |snapshot: &M::Snapshot| {
                if let Ok(value) = serde_json::to_value(snapshot) {
                    next(value);
                }
            }))
        });

        let done_id = observer.complete.map(|complete| {
            self.listeners.done.add(Arc::new(move |_event: &Event| complete()))
        });

        if self.status() == Status::Running {
            if let (Some(next), Some(state)) = (&next, self.current()) {
                if let Ok(value) = serde_json::to_value(&state) {
                    next(value);
                }
            }
        }

        let this = self.self_arc();
        Subscription::new(move || {
            if let Some(id) = transition_id {
                this.listeners.transition.remove(id);
            }
            if let Some(id) = done_id {
                this.listeners.done.remove(id);
            }
        })
    }

    fn stop(&self) {
        Interpreter::stop(self);
    }

    fn to_json(&self) -> Value {
        match self.current() {
            Some(state) => serde_json::to_value(&state).unwrap_or(Value::Null),
            None => serde_json::json!({ "id": self.id, "status": "not_started" }),
        }
    }

    fn spawn_child(&self, entity: Spawnable, name: String, options: SpawnOptions) -> Arc<dyn ActorRef> {
        Interpreter::spawn(&self.self_arc(), entity, name, options)
    }
}

/// Constructs an inert `Interpreter`. Callers still invoke
/// `start()` explicitly — construction and starting are kept separate so
/// listeners can be attached (`on_transition`, `subscribe`, ...) before
/// the initial state fires.
pub fn interpret<M: Machine>(machine: M, options: InterpretOptions) -> Arc<Interpreter<M>> {
    Interpreter::new(Arc::new(machine), options)
}
