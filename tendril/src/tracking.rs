use std::{
	fmt::{self, Debug, Formatter},
	mem,
};

use xylem::policy::{ThreadUnsafe, ThreadingPolicy};

use crate::connection::{Connection, ScopedConnections};

/// Opt-in for automatic disconnection.
///
/// Slots connected through [`connect_tracked`](`crate::SignalTP::connect_tracked`) are registered
/// with the instance's [`Tracker`], which disconnects them when the instance is dropped.
///
/// ```
/// use std::{cell::Cell, rc::Rc};
///
/// use tendril::{Signal, Trackable, Tracker};
///
/// #[derive(Default)]
/// struct Counter {
/// 	count: Cell<usize>,
/// 	tracker: Tracker,
/// }
///
/// impl Trackable for Counter {
/// 	fn tracker(&self) -> &Tracker {
/// 		&self.tracker
/// 	}
/// }
///
/// let signal = Signal::<()>::new();
/// let counter = Rc::new(Counter::default());
/// signal.connect_tracked(&counter, |counter, _| counter.count.set(counter.count.get() + 1));
///
/// signal.invoke(&()).unwrap();
/// assert_eq!(counter.count.get(), 1);
///
/// drop(counter);
/// assert_eq!(signal.slot_count(), 0);
/// ```
pub trait Trackable<TP: ThreadingPolicy = ThreadUnsafe> {
	/// The instance's tracker.
	fn tracker(&self) -> &Tracker<TP>;
}

/// Owns the connections made to one [`Trackable`] instance, and disconnects them when dropped.
pub struct Tracker<TP: ThreadingPolicy = ThreadUnsafe>(TP::Cell<ScopedConnections<TP>>);

impl<TP: ThreadingPolicy> Tracker<TP> {
	/// Creates a tracker without connections.
	#[must_use]
	pub fn new() -> Self {
		Self(TP::new_cell(ScopedConnections::new()))
	}

	/// Disconnects `connection` when this tracker is dropped (or [cleared](`Tracker::disconnect_all`)).
	pub fn track(&self, connection: Connection<TP>) {
		TP::with_cell::<ScopedConnections<TP>, _>(&self.0, |connections| connections.push(connection));
	}

	/// Disconnects every tracked connection now.
	pub fn disconnect_all(&self) {
		let mut connections = TP::with_cell::<ScopedConnections<TP>, _>(&self.0, mem::take);
		// Outside the cell, in case a slot's destructor tracks another connection here.
		connections.disconnect();
	}

	/// Number of tracked connections that may still be connected.
	#[must_use]
	pub fn len(&self) -> usize {
		TP::with_cell::<ScopedConnections<TP>, _>(&self.0, |connections| connections.len())
	}

	/// Whether no connection is tracked.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl<TP: ThreadingPolicy> Default for Tracker<TP> {
	fn default() -> Self {
		Self::new()
	}
}

impl<TP: ThreadingPolicy> Drop for Tracker<TP> {
	fn drop(&mut self) {
		self.disconnect_all();
	}
}

impl<TP: ThreadingPolicy> Debug for Tracker<TP> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Tracker")
			.field("len", &self.len())
			.finish()
	}
}
