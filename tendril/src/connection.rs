use std::{
	fmt::{self, Debug, Formatter},
	mem,
	ops::{AddAssign, BitOr, BitOrAssign, Deref},
};

use tracing::trace;
use xylem::{
	context::{self, Current},
	list::Node,
	policy::{ThreadSafe, ThreadUnsafe, ThreadingPolicy},
};

/// Options for [`connect_with`](`crate::SignalTP::connect_with`) and friends.
///
/// Combine them with `|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ConnectFlags {
	/// Link the slot ahead of every slot connected so far, instead of behind them.
	pub first: bool,
	/// Run the slot on the thread that connected it, even when emitted elsewhere.
	///
	/// Only valid for [`ThreadSafe`] signals.
	/// Calls from other threads are deferred until the connecting thread calls
	/// [`dispatch_queued_calls`](`crate::dispatch_queued_calls`).
	pub queued: bool,
}

impl ConnectFlags {
	/// Append, call synchronously.
	pub const NONE: Self = Self {
		first: false,
		queued: false,
	};
	/// See [`ConnectFlags::first`].
	pub const FIRST: Self = Self {
		first: true,
		queued: false,
	};
	/// See [`ConnectFlags::queued`].
	pub const QUEUED: Self = Self {
		first: false,
		queued: true,
	};
}

impl BitOr for ConnectFlags {
	type Output = Self;

	fn bitor(self, rhs: Self) -> Self::Output {
		Self {
			first: self.first | rhs.first,
			queued: self.queued | rhs.queued,
		}
	}
}

impl BitOrAssign for ConnectFlags {
	fn bitor_assign(&mut self, rhs: Self) {
		*self = *self | rhs;
	}
}

/// A weak handle to one connected slot.
///
/// Holding it doesn't keep the slot alive. Dropping it doesn't disconnect anything:
/// see [`ScopedConnection`] for that.
///
/// [`Connection<ThreadSafe>`] is [`Send`] and [`Sync`].
pub struct Connection<TP: ThreadingPolicy = ThreadUnsafe> {
	node: Option<TP::Weak<Node<TP>>>,
}

impl<TP: ThreadingPolicy> Connection<TP> {
	pub(crate) fn new(node: &TP::Ptr<Node<TP>>) -> Self {
		Self {
			node: Some(TP::downgrade(node)),
		}
	}

	fn node(&self) -> Option<TP::Ptr<Node<TP>>> {
		self.node.as_ref().and_then(TP::upgrade)
	}

	/// Whether the slot is still connected to its signal.
	#[must_use]
	pub fn connected(&self) -> bool {
		self.node().is_some_and(|node| node.connected())
	}

	/// Disconnects the slot. Idempotent, and safe to call from inside any slot, including this one.
	///
	/// A slot disconnected during an emission it wasn't reached by yet is skipped by that emission.
	///
	/// Returns whether this call disconnected it.
	#[allow(clippy::must_use_candidate)]
	pub fn disconnect(&self) -> bool {
		let disconnected = self.node().is_some_and(|node| node.disconnect());
		if disconnected {
			trace!(thread_safe = TP::THREAD_SAFE, "slot disconnected");
		}
		disconnected
	}

	/// Suspends delivery to the slot without disconnecting it.
	///
	/// Blocks nest: each one needs its own [`Connection::unblock`].
	pub fn block(&self) {
		if let Some(node) = self.node() {
			node.block();
		}
	}

	/// Undoes one [`Connection::block`].
	pub fn unblock(&self) {
		if let Some(node) = self.node() {
			node.unblock();
		}
	}

	/// Whether the slot is currently blocked.
	#[must_use]
	pub fn is_blocked(&self) -> bool {
		self.node().is_some_and(|node| node.is_blocked())
	}
}

impl<TP: ThreadingPolicy> Default for Connection<TP> {
	/// A handle that never was connected.
	fn default() -> Self {
		Self { node: None }
	}
}

impl<TP: ThreadingPolicy> Clone for Connection<TP> {
	fn clone(&self) -> Self {
		Self {
			node: self.node.clone(),
		}
	}
}

impl<TP: ThreadingPolicy> PartialEq for Connection<TP> {
	/// Identity.
	fn eq(&self, other: &Self) -> bool {
		match (&self.node, &other.node) {
			(None, None) => true,
			(Some(a), Some(b)) => TP::weak_ptr_eq(a, b),
			_ => false,
		}
	}
}

impl<TP: ThreadingPolicy> Eq for Connection<TP> {}

impl<TP: ThreadingPolicy> Debug for Connection<TP> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Connection")
			.field("connected", &self.connected())
			.field("blocked", &self.is_blocked())
			.finish()
	}
}

/// A [`Connection`] that disconnects when dropped.
#[must_use = "Dropping a `ScopedConnection` disconnects its slot."]
pub struct ScopedConnection<TP: ThreadingPolicy = ThreadUnsafe>(Connection<TP>);

impl<TP: ThreadingPolicy> ScopedConnection<TP> {
	/// Takes the handle back out without disconnecting.
	#[must_use]
	pub fn release(mut self) -> Connection<TP> {
		mem::take(&mut self.0)
	}
}

impl<TP: ThreadingPolicy> From<Connection<TP>> for ScopedConnection<TP> {
	fn from(connection: Connection<TP>) -> Self {
		Self(connection)
	}
}

impl<TP: ThreadingPolicy> Default for ScopedConnection<TP> {
	fn default() -> Self {
		Self(Connection::default())
	}
}

impl<TP: ThreadingPolicy> Deref for ScopedConnection<TP> {
	type Target = Connection<TP>;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

impl<TP: ThreadingPolicy> Drop for ScopedConnection<TP> {
	fn drop(&mut self) {
		self.0.disconnect();
	}
}

impl<TP: ThreadingPolicy> Debug for ScopedConnection<TP> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_tuple("ScopedConnection").field(&self.0).finish()
	}
}

/// Owns any number of connections and disconnects all of them when dropped.
///
/// Handles whose slot was already disconnected are pruned as new ones are added.
#[must_use = "Dropping `ScopedConnections` disconnects all of its slots."]
pub struct ScopedConnections<TP: ThreadingPolicy = ThreadUnsafe>(Vec<ScopedConnection<TP>>);

impl<TP: ThreadingPolicy> ScopedConnections<TP> {
	/// Creates an empty set.
	pub fn new() -> Self {
		Self(Vec::new())
	}

	/// Takes ownership of `connection`.
	pub fn push(&mut self, connection: impl Into<ScopedConnection<TP>>) {
		self.0.retain(|connection| connection.connected());
		self.0.push(connection.into());
	}

	/// Disconnects and forgets every owned connection.
	pub fn disconnect(&mut self) {
		// Dropped one by one, so a slot destructor may safely touch this set's signals.
		for connection in mem::take(&mut self.0) {
			drop(connection);
		}
	}

	/// Number of owned handles.
	#[must_use]
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Whether no handle is owned.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl<TP: ThreadingPolicy> Default for ScopedConnections<TP> {
	fn default() -> Self {
		Self::new()
	}
}

impl<TP: ThreadingPolicy, C: Into<ScopedConnection<TP>>> Extend<C> for ScopedConnections<TP> {
	fn extend<I: IntoIterator<Item = C>>(&mut self, iter: I) {
		for connection in iter {
			self.push(connection);
		}
	}
}

impl<TP: ThreadingPolicy, C: Into<ScopedConnection<TP>>> FromIterator<C> for ScopedConnections<TP> {
	fn from_iter<I: IntoIterator<Item = C>>(iter: I) -> Self {
		let mut connections = Self::new();
		connections.extend(iter);
		connections
	}
}

impl<TP: ThreadingPolicy> AddAssign<Connection<TP>> for ScopedConnections<TP> {
	fn add_assign(&mut self, connection: Connection<TP>) {
		self.push(connection);
	}
}

impl<TP: ThreadingPolicy> Drop for ScopedConnections<TP> {
	fn drop(&mut self) {
		self.disconnect();
	}
}

impl<TP: ThreadingPolicy> Debug for ScopedConnections<TP> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_list().entries(&self.0).finish()
	}
}

/// The connection whose slot is running on this thread, as returned by [`current_connection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CurrentConnection {
	/// A slot of a [`ThreadUnsafe`] signal (or a timer).
	ThreadUnsafe(Connection<ThreadUnsafe>),
	/// A slot of a [`ThreadSafe`] signal.
	ThreadSafe(Connection<ThreadSafe>),
}

impl CurrentConnection {
	/// See [`Connection::connected`].
	#[must_use]
	pub fn connected(&self) -> bool {
		match self {
			Self::ThreadUnsafe(connection) => connection.connected(),
			Self::ThreadSafe(connection) => connection.connected(),
		}
	}

	/// See [`Connection::disconnect`].
	#[allow(clippy::must_use_candidate)]
	pub fn disconnect(&self) -> bool {
		match self {
			Self::ThreadUnsafe(connection) => connection.disconnect(),
			Self::ThreadSafe(connection) => connection.disconnect(),
		}
	}

	/// See [`Connection::block`].
	pub fn block(&self) {
		match self {
			Self::ThreadUnsafe(connection) => connection.block(),
			Self::ThreadSafe(connection) => connection.block(),
		}
	}

	/// See [`Connection::unblock`].
	pub fn unblock(&self) {
		match self {
			Self::ThreadUnsafe(connection) => connection.unblock(),
			Self::ThreadSafe(connection) => connection.unblock(),
		}
	}

	/// See [`Connection::is_blocked`].
	#[must_use]
	pub fn is_blocked(&self) -> bool {
		match self {
			Self::ThreadUnsafe(connection) => connection.is_blocked(),
			Self::ThreadSafe(connection) => connection.is_blocked(),
		}
	}
}

impl From<Connection<ThreadUnsafe>> for CurrentConnection {
	fn from(connection: Connection<ThreadUnsafe>) -> Self {
		Self::ThreadUnsafe(connection)
	}
}

impl From<Connection<ThreadSafe>> for CurrentConnection {
	fn from(connection: Connection<ThreadSafe>) -> Self {
		Self::ThreadSafe(connection)
	}
}

impl PartialEq<Connection<ThreadUnsafe>> for CurrentConnection {
	fn eq(&self, other: &Connection<ThreadUnsafe>) -> bool {
		matches!(self, Self::ThreadUnsafe(connection) if connection == other)
	}
}

impl PartialEq<Connection<ThreadSafe>> for CurrentConnection {
	fn eq(&self, other: &Connection<ThreadSafe>) -> bool {
		matches!(self, Self::ThreadSafe(connection) if connection == other)
	}
}

/// The connection whose slot is running on this thread.
///
/// [`None`] outside of slots (and timer callbacks).
#[must_use]
pub fn current_connection() -> Option<CurrentConnection> {
	context::current().map(|current| match current {
		Current::ThreadUnsafe(node) => CurrentConnection::ThreadUnsafe(Connection::new(&node)),
		Current::ThreadSafe(node) => CurrentConnection::ThreadSafe(Connection::new(&node)),
	})
}

/// Stops the emission that is calling the running slot once it returns.
///
/// Slots not reached yet are skipped by that emission only. Nothing is disconnected,
/// and calls that were already deferred to other threads still run.
///
/// Does nothing outside of slots.
pub fn abort_emission() {
	if context::abort_emission() {
		trace!("emission aborted");
	}
}
