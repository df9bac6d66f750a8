//! Uniform actor interface and the adapters that implement it.
//!
//! A tagged [`Spawnable`] enum replaces runtime type inspection of
//! whatever got handed to `spawn`: callers declare what they are spawning
//! by constructing the matching variant, and
//! [`Interpreter::spawn`](crate::interpreter::Interpreter::spawn) builds
//! the matching [`ActorRef`] adapter. A nested interpreter is itself an
//! `ActorRef` (see the blanket impl in `interpreter.rs`), which is what
//! lets the actor hierarchy nest arbitrarily.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde_json::Value;
use stateflow_core::Event;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A handle through which any actor — a nested interpreter, a one-shot
/// producer, a callback worker, an observable stream — can be sent events,
/// subscribed to, and stopped.
///
/// `start` is a deliberate addition beyond the minimal `id`/`send`/
/// `subscribe`/`stop`/`to_json` shape: the `Start` action executor needs an
/// explicit entry point to start an arbitrary freshly-spawned child.
/// Documented in `DESIGN.md`.
pub trait ActorRef: Send + Sync {
    fn id(&self) -> &str;

    /// Deliver an event to this actor. Implementations that cannot receive
    /// events (e.g. a settled one-shot future) treat this as a no-op.
    fn send(&self, event: Event);

    /// Begin running this actor, if it has not already been started.
    /// Idempotent.
    fn start(&self);

    /// Register an observer, returning a handle whose `unsubscribe` is
    /// idempotent.
    fn subscribe(&self, observer: ErasedObserver) -> Subscription;

    /// Stop this actor, if it can be stopped. A no-op for actors with no
    /// notion of an explicit stop.
    fn stop(&self);

    /// A JSON snapshot of this actor's current state, for debugging and
    /// the `children` mirror on a parent's snapshot.
    fn to_json(&self) -> Value;

    /// Spawn `entity` as a child of this actor, if this actor kind can
    /// parent children at all.
    ///
    /// Only a nested interpreter overrides this (see the `ActorRef` impl
    /// in `interpreter.rs`): a future/callback/stream adapter has no
    /// notion of its own children. The default returns a [`NullActor`]
    /// and logs a warning, the same degraded behavior the free
    /// [`crate::spawn`] function falls back to when called outside any
    /// service scope at all.
    fn spawn_child(&self, entity: Spawnable, name: String, options: SpawnOptions) -> Arc<dyn ActorRef> {
        let _ = (entity, options);
        tracing::warn!(
            actor = %self.id(),
            child = %name,
            "spawn() called against an actor that cannot parent children; returning a null actor"
        );
        Arc::new(NullActor::new(name))
    }
}

/// A type-erased observer used across actor boundaries, where the concrete
/// snapshot type of the target actor isn't known to the subscriber.
/// `Interpreter<M>::subscribe` (the typed overload) is preferred when the
/// caller holds a concrete `Interpreter<M>`; this is the erased fallback
/// used by `ActorRef::subscribe`.
pub struct ErasedObserver {
    pub next: Option<Box<dyn Fn(Value) + Send + Sync>>,
    pub complete: Option<Box<dyn Fn() + Send + Sync>>,
}

impl ErasedObserver {
    pub fn next(f: impl Fn(Value) + Send + Sync + 'static) -> Self {
        Self {
            next: Some(Box::new(f)),
            complete: None,
        }
    }
}

/// A registered observer. Dropping this does not unsubscribe; call
/// [`Subscription::unsubscribe`] explicitly. Safe to call more than once.
pub struct Subscription {
    unsubscribe: Arc<dyn Fn() + Send + Sync>,
    done: Arc<AtomicBool>,
}

impl Subscription {
    pub(crate) fn new(unsubscribe: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            unsubscribe: Arc::new(unsubscribe),
            done: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn unsubscribe(&self) {
        if !self.done.swap(true, Ordering::AcqRel) {
            (self.unsubscribe)();
        }
    }

    pub fn empty() -> Self {
        Self::new(|| {})
    }
}

/// Options governing how a newly spawned child actor is attached.
#[derive(Clone, Debug, Default)]
pub struct SpawnOptions {
    /// Every event the parent receives is also forwarded to this child,
    /// before the parent's own transition is computed.
    pub auto_forward: bool,
}

/// A description of what `Interpreter::spawn` should construct an
/// `ActorRef` adapter for.
pub enum Spawnable {
    /// A one-shot producer. Resolving with `Ok` sends
    /// `done.invoke.<id>` to the parent; `Err` sends an `error.platform.<id>`
    /// event.
    Future(BoxFuture<'static, Result<Value, Value>>),
    /// A callback worker: given a sender bound to this actor's parent and a
    /// registrar for incoming events, optionally returns a disposer run on
    /// stop.
    Callback(
        Box<dyn FnOnce(CallbackSender, CallbackReceiver) -> Option<Disposer> + Send>,
    ),
    /// An already-constructed actor, adopted verbatim.
    Actor(Box<dyn ActorRef>),
    /// An observable stream: each item is forwarded to the parent as an
    /// event; stream completion stops the actor.
    Stream(BoxStream<'static, Event>),
    /// A nested machine. The closure receives the id assigned by `spawn`
    /// and a handle to the parent, and must construct (but not
    /// necessarily start) the child interpreter.
    ///
    /// Returns `Arc<dyn ActorRef>`, not `Box<dyn ActorRef>`: an
    /// `Interpreter<M>` is only ever valid behind the `Arc` it was built
    /// with via `Arc::new_cyclic` (its `self_weak` upgrade relies on that
    /// same allocation staying alive), so the closure is expected to end
    /// in `Interpreter::new(...) as Arc<dyn ActorRef>` rather than
    /// unwrapping into a `Box`.
    Machine(Box<dyn FnOnce(MachineSpawnArgs) -> Arc<dyn ActorRef> + Send>),
}

pub struct MachineSpawnArgs {
    pub id: String,
    pub parent: Arc<dyn ActorRef>,
}

pub type Disposer = Box<dyn FnOnce() + Send>;

/// Handle a callback worker uses to send events to its parent.
#[derive(Clone)]
pub struct CallbackSender {
    parent: Arc<dyn ActorRef>,
}

impl CallbackSender {
    pub fn send(&self, event: impl stateflow_core::IntoEvent) {
        self.parent.send(event.into_event());
    }
}

/// Handle a callback worker uses to register what happens when *it*
/// receives an event (i.e. when the parent sends to this child).
pub struct CallbackReceiver {
    slot: Arc<parking_lot::Mutex<Option<Box<dyn Fn(Event) + Send + Sync>>>>,
}

impl CallbackReceiver {
    pub fn on_receive(&self, f: impl Fn(Event) + Send + Sync + 'static) {
        *self.slot.lock() = Some(Box::new(f));
    }
}

/// Spawns nothing and accepts nothing. Returned in place of a real actor
/// when `spawn` is misused — called with an empty service scope, or
/// against an actor kind that cannot parent children.
pub struct NullActor {
    id: String,
}

impl NullActor {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl ActorRef for NullActor {
    fn id(&self) -> &str {
        &self.id
    }

    fn send(&self, _event: Event) {}

    fn start(&self) {}

    fn subscribe(&self, _observer: ErasedObserver) -> Subscription {
        Subscription::empty()
    }

    fn stop(&self) {}

    fn to_json(&self) -> Value {
        serde_json::json!({ "id": self.id, "kind": "null" })
    }
}

/// Adapter over a one-shot future/promise.
pub struct FutureActor {
    id: String,
    parent: Arc<dyn ActorRef>,
    started: AtomicBool,
    inner: parking_lot::Mutex<Option<BoxFuture<'static, Result<Value, Value>>>>,
}

impl FutureActor {
    pub fn new(id: String, parent: Arc<dyn ActorRef>, fut: BoxFuture<'static, Result<Value, Value>>) -> Self {
        Self {
            id,
            parent,
            started: AtomicBool::new(false),
            inner: parking_lot::Mutex::new(Some(fut)),
        }
    }
}

impl ActorRef for FutureActor {
    fn id(&self) -> &str {
        &self.id
    }

    fn send(&self, _event: Event) {
        // Promises don't receive events.
    }

    fn start(&self) {
        if self.started.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(fut) = self.inner.lock().take() else {
            return;
        };
        let id = self.id.clone();
        let parent = self.parent.clone();
        tokio::spawn(async move {
            match fut.await {
                Ok(value) => parent.send(Event::done_invoke(&id, Some(value))),
                Err(err) => parent.send(Event::error(&id, err)),
            }
        });
    }

    fn subscribe(&self, _observer: ErasedObserver) -> Subscription {
        Subscription::empty()
    }

    fn stop(&self) {
        self.inner.lock().take();
    }

    fn to_json(&self) -> Value {
        serde_json::json!({ "id": self.id, "kind": "future" })
    }
}

/// Adapter over a callback worker.
pub struct CallbackActor {
    id: String,
    parent: Arc<dyn ActorRef>,
    started: AtomicBool,
    factory: parking_lot::Mutex<Option<Box<dyn FnOnce(CallbackSender, CallbackReceiver) -> Option<Disposer> + Send>>>,
    receive_slot: Arc<parking_lot::Mutex<Option<Box<dyn Fn(Event) + Send + Sync>>>>,
    disposer: parking_lot::Mutex<Option<Disposer>>,
}

impl CallbackActor {
    pub fn new(
        id: String,
        parent: Arc<dyn ActorRef>,
        factory: Box<dyn FnOnce(CallbackSender, CallbackReceiver) -> Option<Disposer> + Send>,
    ) -> Self {
        Self {
            id,
            parent,
            started: AtomicBool::new(false),
            factory: parking_lot::Mutex::new(Some(factory)),
            receive_slot: Arc::new(parking_lot::Mutex::new(None)),
            disposer: parking_lot::Mutex::new(None),
        }
    }
}

impl ActorRef for CallbackActor {
    fn id(&self) -> &str {
        &self.id
    }

    fn send(&self, event: Event) {
        if let Some(handler) = self.receive_slot.lock().as_ref() {
            handler(event);
        }
    }

    fn start(&self) {
        if self.started.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(factory) = self.factory.lock().take() else {
            return;
        };
        let sender = CallbackSender {
            parent: self.parent.clone(),
        };
        let receiver = CallbackReceiver {
            slot: self.receive_slot.clone(),
        };
        if let Some(disposer) = factory(sender, receiver) {
            *self.disposer.lock() = Some(disposer);
        }
    }

    fn subscribe(&self, _observer: ErasedObserver) -> Subscription {
        Subscription::empty()
    }

    fn stop(&self) {
        if let Some(disposer) = self.disposer.lock().take() {
            disposer();
        }
    }

    fn to_json(&self) -> Value {
        serde_json::json!({ "id": self.id, "kind": "callback" })
    }
}

/// Adapter over an observable stream of events.
pub struct StreamActor {
    id: String,
    parent: Arc<dyn ActorRef>,
    started: AtomicBool,
    inner: parking_lot::Mutex<Option<BoxStream<'static, Event>>>,
    stopped: Arc<AtomicBool>,
}

impl StreamActor {
    pub fn new(id: String, parent: Arc<dyn ActorRef>, stream: BoxStream<'static, Event>) -> Self {
        Self {
            id,
            parent,
            started: AtomicBool::new(false),
            inner: parking_lot::Mutex::new(Some(stream)),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl ActorRef for StreamActor {
    fn id(&self) -> &str {
        &self.id
    }

    fn send(&self, _event: Event) {
        // Observables are not addressable; they only produce events.
    }

    fn start(&self) {
        if self.started.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(mut stream) = self.inner.lock().take() else {
            return;
        };
        let parent = self.parent.clone();
        let stopped = self.stopped.clone();
        tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                if stopped.load(Ordering::Acquire) {
                    break;
                }
                parent.send(event);
            }
        });
    }

    fn subscribe(&self, _observer: ErasedObserver) -> Subscription {
        Subscription::empty()
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.inner.lock().take();
    }

    fn to_json(&self) -> Value {
        serde_json::json!({ "id": self.id, "kind": "observable" })
    }
}
