use std::time::{Duration, Instant};

use tracing::trace;
use xylem::{policy::ThreadKey, queue};

use crate::error::InvocationSlotError;

/// Runs the calls that emissions on other threads deferred to this thread, in the order they were made,
/// then this thread's due timers (with the `"timers"` feature).
///
/// Nothing else runs them, so threads that connect [queued](`crate::ConnectFlags::QUEUED`) slots
/// have to call this regularly. Emitters of non-`()` signals are blocked until their call ran.
///
/// With `max_duration`, stops once that much time has passed. At least one call or timer
/// still runs, and deferred calls that were skipped run first next time.
///
/// # Errors
///
/// Iff any of the calls that no emitter is waiting for panicked. Those are the deferred calls
/// of `()`-returning signals and the timers. The others report to their emitter instead.
pub fn dispatch_queued_calls(max_duration: Option<Duration>) -> Result<(), InvocationSlotError> {
	let deadline = max_duration.and_then(|max_duration| Instant::now().checked_add(max_duration));

	let drained = queue::drain(deadline);
	#[allow(unused_mut)]
	let mut failed = drained.failed;

	#[cfg(feature = "timers")]
	if !drained.interrupted {
		failed += crate::timer::dispatch(deadline);
	}

	if failed > 0 {
		trace!(failed, "failures while dispatching queued calls");
	}
	InvocationSlotError::check(failed)
}

/// Number of deferred calls waiting for this thread's [`dispatch_queued_calls`].
#[must_use]
pub fn queued_call_count() -> usize {
	queue::pending(ThreadKey::current())
}
