//! # Execution Contexts
//!
//! Every thread owns one [`ContextStack`] in a thread-local slot. Contexts
//! nest strictly with call depth: [`push`] opens a child of the current
//! context, [`pop`] closes the current one. Stacks of different threads
//! never see each other.
//!
//! ## Hand-off
//!
//! Nothing is inherited automatically when work moves to another thread.
//! The sending side captures [`current`] (or wraps its work in
//! [`Carried`]); the receiving thread calls [`adopt`] before opening its own
//! contexts, which makes the handed-over context the parent of its roots:
//!
//! ```ignore
//! let job = Carried::capture(work);
//! std::thread::spawn(move || {
//!     let _root = context::adopt_from(&job);
//!     // contexts pushed here are children of the sender's context
//! });
//! ```

mod stack;

pub use stack::ContextStack;

use std::cell::RefCell;
use std::marker::PhantomData;

use crate::domain::{Context, ContextId, Payload, Value};
use crate::identity;

thread_local! {
    static STACK: RefCell<ContextStack> = RefCell::new(ContextStack::new(identity::application_id()));
}

/// Run `f` against the calling thread's stack.
///
/// `f` must not call back into this module.
fn with_stack<R>(f: impl FnOnce(&mut ContextStack) -> R) -> R {
    STACK.with(|stack| f(&mut stack.borrow_mut()))
}

/// Open a context as a child of the current one. Returns a copy of it.
pub fn push(name: impl Into<String>, tag: impl Into<String>) -> Context {
    with_stack(|stack| stack.push(name, tag).clone())
}

/// Close the current context and hand it back. `None` when none is open.
pub fn pop() -> Option<Context> {
    with_stack(ContextStack::pop)
}

/// Copy of the current context, including an adopted root
pub fn current() -> Option<Context> {
    with_stack(|stack| stack.current().cloned())
}

pub fn current_id() -> Option<ContextId> {
    with_stack(|stack| stack.current_id())
}

/// Write a key into the current context's payload.
///
/// Returns false when no context of this thread is open; an adopted root is
/// read-only.
pub fn put(key: impl Into<String>, value: impl Into<Value>) -> bool {
    with_stack(|stack| match stack.current_mut() {
        // Contexts on the stack are never closed
        Some(ctx) => ctx.set(key, value).is_ok(),
        None => false,
    })
}

/// Payload of every open context on this thread, inner keys winning
pub fn flattened() -> Payload {
    with_stack(|stack| stack.flattened())
}

/// Number of contexts opened (and not yet closed) on this thread
pub fn depth() -> usize {
    with_stack(|stack| stack.depth())
}

// ============================================================================
// Cross-thread hand-off
// ============================================================================

/// Restores the previous root when dropped.
///
/// Bound to the adopting thread.
#[must_use = "dropping the guard immediately un-adopts the context; bind it with `let _root = ...`"]
pub struct AdoptedContext {
    previous: Option<Context>,
    _not_send: PhantomData<*const ()>,
}

impl Drop for AdoptedContext {
    fn drop(&mut self) {
        let previous = self.previous.take();
        // try_with: the guard may outlive the slot during thread teardown
        let _ = STACK.try_with(|stack| {
            if let Ok(mut stack) = stack.try_borrow_mut() {
                stack.adopt(previous);
            }
        });
    }
}

/// Make `root` the parent of contexts opened on this thread.
pub fn adopt(root: Context) -> AdoptedContext {
    let previous = with_stack(|stack| stack.adopt(Some(root)));
    AdoptedContext { previous, _not_send: PhantomData }
}

/// Something that carries a context across a thread boundary
pub trait ContextCarrier {
    fn carried_context(&self) -> Option<&Context>;
    fn carry_context(&mut self, context: Option<Context>);
}

/// A value bundled with the context current when it was captured
#[derive(Debug, Clone)]
pub struct Carried<T> {
    value: T,
    context: Option<Context>,
}

impl<T> Carried<T> {
    /// Bundle `value` with the calling thread's current context.
    pub fn capture(value: T) -> Self {
        Self { value, context: current() }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> ContextCarrier for Carried<T> {
    fn carried_context(&self) -> Option<&Context> {
        self.context.as_ref()
    }

    fn carry_context(&mut self, context: Option<Context>) {
        self.context = context;
    }
}

/// Adopt whatever `carrier` brought along. `None` if it carried nothing.
pub fn adopt_from<C: ContextCarrier + ?Sized>(carrier: &C) -> Option<AdoptedContext> {
    carrier.carried_context().cloned().map(adopt)
}
