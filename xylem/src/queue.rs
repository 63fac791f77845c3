//! Process-wide mailbox of deferred calls, one FIFO queue per [`ThreadKey`].
//!
//! Nothing drains a queue automatically: its owning thread has to call [`drain`].
//! When a thread exits, its queue is dropped, which cancels every call still waiting in it.

use std::{
	collections::{BTreeMap, VecDeque},
	time::Instant,
};

use parking_lot::{const_mutex, Mutex};
use tracing::{trace, warn};

use crate::policy::ThreadKey;

/// How a deferred call ended, as far as the draining thread is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
	/// The call ran, or its failure was already reported to whoever is waiting for it.
	Completed,
	/// The call failed and nobody else will hear about it.
	Failed,
}

/// A deferred call.
pub type Task = Box<dyn 'static + Send + FnOnce() -> Outcome>;

static PENDING: Mutex<BTreeMap<ThreadKey, VecDeque<Task>>> = const_mutex(BTreeMap::new());

/// Result of one [`drain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Drained {
	/// Number of tasks that ran.
	pub ran: usize,
	/// Number of those that reported [`Outcome::Failed`].
	pub failed: usize,
	/// Whether the deadline cut the drain short.
	pub interrupted: bool,
}

/// Appends `task` to `thread`'s queue.
///
/// Returns `false` if `thread` has exited (or never used a [`ThreadKey`]). The task is dropped
/// in that case, cancelling it.
#[allow(clippy::must_use_candidate)]
pub fn enqueue(thread: ThreadKey, task: Task) -> bool {
	let mut pending = PENDING.lock();
	let Some(queue) = pending.get_mut(&thread) else {
		drop(pending);
		// Dropped outside the lock, since that may run arbitrary destructors.
		drop(task);
		return false;
	};
	queue.push_back(task);
	trace!(?thread, queued = queue.len(), "deferred call enqueued");
	true
}

/// Number of calls waiting for `thread`.
#[must_use]
pub fn pending(thread: ThreadKey) -> usize {
	PENDING.lock().get(&thread).map_or(0, VecDeque::len)
}

/// Runs the calling thread's deferred calls in FIFO order.
///
/// Runs at most as many calls as were pending when it started, so calls enqueued meanwhile
/// usually wait for the next drain. Calls are taken from the queue one at a time, so a drain nested
/// in a running call continues with the calls after it, in order.
///
/// If `deadline` passes, draining stops after the running call. The remaining calls stay at the
/// front of the queue.
pub fn drain(deadline: Option<Instant>) -> Drained {
	let thread = ThreadKey::current();
	let mut budget = pending(thread);

	let mut drained = Drained::default();
	while budget > 0 {
		let Some(task) = PENDING.lock().get_mut(&thread).and_then(VecDeque::pop_front) else {
			break;
		};
		budget -= 1;
		drained.ran += 1;
		if task() == Outcome::Failed {
			drained.failed += 1;
		}

		if budget > 0 && deadline.is_some_and(|deadline| Instant::now() >= deadline) {
			let remaining = pending(thread);
			if remaining > 0 {
				drained.interrupted = true;
				warn!(?thread, remaining, "draining deferred calls ran out of time");
			}
			break;
		}
	}

	if drained.ran > 0 {
		trace!(?thread, ran = drained.ran, failed = drained.failed, "deferred calls drained");
	}
	drained
}

/// Opens `thread`'s queue.
pub(crate) fn register(thread: ThreadKey) {
	PENDING.lock().entry(thread).or_default();
}

/// Closes `thread`'s queue, cancelling the calls in it.
pub(crate) fn purge(thread: ThreadKey) {
	// Tasks are dropped outside the lock, since that may run arbitrary destructors.
	let purged = PENDING.lock().remove(&thread);
	if let Some(purged) = purged {
		if !purged.is_empty() {
			warn!(?thread, cancelled = purged.len(), "thread exited with deferred calls pending");
		}
	}
}
