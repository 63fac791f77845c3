//! Thread-local timers, run by [`dispatch_queued_calls`](`crate::dispatch_queued_calls`) on the thread that set them.

use std::{
	cell::Cell,
	panic::{catch_unwind, AssertUnwindSafe},
	rc::Rc,
	time::{Duration, Instant},
};

use tracing::{debug, trace};
use xylem::{
	context,
	list::{ConnectionList, Node},
	policy::ThreadUnsafe,
};

use crate::connection::Connection;

struct Timer {
	due: Cell<Instant>,
	interval: Option<Duration>,
	running: Cell<bool>,
	callback: Box<dyn Fn()>,
}

thread_local! {
	/// Sorted by due time. Timers due at the same time keep the order they were set in.
	static TIMERS: ConnectionList<ThreadUnsafe> = ConnectionList::new();
}

fn timer(node: &Node<ThreadUnsafe>) -> &Timer {
	node.slot()
		.and_then(|slot| slot.downcast_ref::<Timer>())
		.expect("unreachable")
}

fn schedule(callback: Box<dyn Fn()>, due: Instant, interval: Option<Duration>) -> Connection {
	TIMERS.with(|timers| {
		let node = timers.link_sorted(
			Rc::new(Timer {
				due: Cell::new(due),
				interval,
				running: Cell::new(false),
				callback,
			}),
			|other| timer(other).due.get() > due,
		);
		trace!(?due, ?interval, "timer set");
		Connection::new(&node)
	})
}

/// About 30 years, standing in for delays too large for [`Instant`].
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

fn after(instant: Instant, delay: Duration) -> Instant {
	instant
		.checked_add(delay)
		.or_else(|| instant.checked_add(FAR_FUTURE))
		.unwrap_or(instant)
}

/// Calls `callback` once, on this thread, during the first
/// [`dispatch_queued_calls`](`crate::dispatch_queued_calls`) at least `delay` from now.
///
/// Disconnecting the returned [`Connection`] cancels the timer, and blocking it postpones it.
pub fn set_timeout(callback: impl 'static + Fn(), delay: Duration) -> Connection {
	schedule(Box::new(callback), after(Instant::now(), delay), None)
}

/// Calls `callback` on this thread every `interval` until disconnected, during
/// [`dispatch_queued_calls`](`crate::dispatch_queued_calls`).
///
/// Each call schedules the next one `interval` after the start of the dispatch that made it.
/// Missed periods are not made up for.
pub fn set_interval(callback: impl 'static + Fn(), interval: Duration) -> Connection {
	schedule(Box::new(callback), after(Instant::now(), interval), Some(interval))
}

/// Runs the timers that are due, earliest first. Returns how many of them panicked.
///
/// Stops early if a callback calls [`abort_emission`](`crate::abort_emission`) or once `deadline` has passed.
pub(crate) fn dispatch(deadline: Option<Instant>) -> usize {
	let now = Instant::now();
	let Ok(due) = TIMERS.try_with(|timers| {
		timers
			.snapshot()
			.into_iter()
			.take_while(|node| timer(node).due.get() <= now)
			.collect::<Vec<_>>()
	}) else {
		return 0;
	};

	let mut failed = 0;
	context::abort_scope(|| {
		for node in due {
			let entry = timer(&node);
			// Running timers are skipped by dispatches nested in their callback.
			if !node.is_live() || entry.running.get() {
				continue;
			}

			// A nested dispatch must not find this timer due again.
			match entry.interval {
				None => {
					node.disconnect();
				}
				Some(interval) => {
					let due = after(now, interval);
					entry.due.set(due);
					TIMERS.with(|timers| {
						timers.reposition(&node, |other| timer(other).due.get() > due);
					});
				}
			}

			entry.running.set(true);
			let completed = context::with_current::<ThreadUnsafe, _>(&node, || {
				catch_unwind(AssertUnwindSafe(|| (entry.callback)())).is_ok()
			});
			entry.running.set(false);
			if !completed {
				debug!("timer callback panicked");
				failed += 1;
			}

			if context::is_aborted() || deadline.is_some_and(|deadline| Instant::now() >= deadline) {
				break;
			}
		}
	});
	failed
}
