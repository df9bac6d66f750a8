//! Ambient "currently executing interpreter" stack.
//!
//! Only consulted by the free [`crate::spawn`] function, for call sites
//! that spawn an actor without an explicit parent handle in scope. Pushed
//! around every `Machine::transition`/`Machine::initial_state` call this
//! crate itself issues; a machine implementation that is a pure function
//! never needs to know this stack exists.

use std::cell::RefCell;
use std::sync::{Arc, Weak};

use crate::actor::ActorRef;

thread_local! {
    static STACK: RefCell<Vec<Weak<dyn ActorRef>>> = const { RefCell::new(Vec::new()) };
}

/// RAII guard pushing `actor` onto the thread-local service-scope stack for
/// its lifetime. Pops on drop, including on an unwinding (panicking) exit,
/// so a panic inside `Machine::transition` never leaves a stale scope
/// behind.
#[must_use]
pub struct ScopeGuard(());

impl ScopeGuard {
    pub fn enter(actor: &Arc<dyn ActorRef>) -> Self {
        STACK.with(|stack| stack.borrow_mut().push(Arc::downgrade(actor)));
        Self(())
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// The innermost currently-executing interpreter on this thread, if any.
pub fn current() -> Option<Arc<dyn ActorRef>> {
    STACK.with(|stack| stack.borrow().last().and_then(Weak::upgrade))
}
