//! Per-thread emission state: the node whose slot is currently running, and whether the
//! innermost emission on this thread was asked to stop.
//!
//! Both are scoped: [`with_current`] and [`abort_scope`] restore the previous state when they
//! return or unwind, so nested (including recursive) emissions on one thread stay independent.

use std::{cell::RefCell, rc::Rc, sync::Arc};

use scopeguard::guard;
use unwind_safe::try_eval;

use crate::{
	list::Node,
	policy::{ThreadSafe, ThreadUnsafe, ThreadingPolicy},
};

/// The node whose slot is running on this thread, tagged with its threading policy.
#[derive(Debug, Clone)]
pub enum Current {
	/// A node of a [`ThreadUnsafe`] list.
	ThreadUnsafe(Rc<Node<ThreadUnsafe>>),
	/// A node of a [`ThreadSafe`] list.
	ThreadSafe(Arc<Node<ThreadSafe>>),
}

#[derive(Default)]
struct Context {
	current: Option<Current>,
	aborted: bool,
}

thread_local! {
	static CONTEXT: RefCell<Context> = RefCell::default();
}

/// Runs `f` with `node` published as this thread's current connection.
pub fn with_current<TP: ThreadingPolicy, T>(node: &TP::Ptr<Node<TP>>, f: impl FnOnce() -> T) -> T {
	let previous = CONTEXT.with(|context| {
		context.borrow_mut().current.replace(TP::to_current(node))
	});
	try_eval(f).finally(|()| {
		// Dropped outside the borrow, in case this was the last reference.
		let _restored = CONTEXT
			.try_with(|context| std::mem::replace(&mut context.borrow_mut().current, previous));
	})
}

/// The node whose slot is running on this thread, if any.
#[must_use]
pub fn current() -> Option<Current> {
	CONTEXT.with(|context| context.borrow().current.clone())
}

/// Runs `f` as one emission: [`is_aborted`] starts out `false` inside and the outer value is restored afterwards.
pub fn abort_scope<T>(f: impl FnOnce() -> T) -> T {
	let previous = CONTEXT.with(|context| std::mem::take(&mut context.borrow_mut().aborted));
	let _restore = guard(previous, |previous| {
		let _ = CONTEXT.try_with(|context| context.borrow_mut().aborted = previous);
	});
	f()
}

/// Asks the innermost emission on this thread to stop after the running slot returns.
///
/// Returns `false` and does nothing if no slot is running on this thread.
pub fn abort_emission() -> bool {
	CONTEXT.with(|context| {
		let mut context = context.borrow_mut();
		if context.current.is_some() {
			context.aborted = true;
		}
		context.current.is_some()
	})
}

/// Whether [`abort_emission`] was called in the innermost [`abort_scope`].
#[must_use]
pub fn is_aborted() -> bool {
	CONTEXT.with(|context| context.borrow().aborted)
}
