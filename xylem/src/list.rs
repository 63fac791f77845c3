//! Sentinel-bounded, reference-counted doubly-linked list of connection nodes.
//!
//! # Liveness
//!
//! A node is connected exactly while its `prev` link is set.
//! Disconnecting clears `prev` but keeps `next`, so a [`Cursor`] that currently holds the node
//! can still advance past it after it was unlinked mid-emission.
//!
//! `next` links are strong and `prev` links are weak, so the list can never form a cycle.

use std::{
	fmt::{self, Debug, Formatter},
	mem,
};

use crate::policy::ThreadingPolicy;

struct Links<TP: ThreadingPolicy> {
	prev: Option<TP::Weak<Node<TP>>>,
	next: Option<TP::Ptr<Node<TP>>>,
	blocked: usize,
}

/// One subscription: a type-erased slot plus its links into the owning list.
pub struct Node<TP: ThreadingPolicy> {
	slot: Option<TP::AnySlot>,
	links: TP::Cell<Links<TP>>,
	lock: TP::Lock,
	thread: TP::ThreadTag,
	queued: bool,
}

impl<TP: ThreadingPolicy> Debug for Node<TP> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Node")
			.field("connected", &self.connected())
			.field("blocked", &self.is_blocked())
			.field("thread", &self.thread)
			.field("queued", &self.queued)
			.finish_non_exhaustive()
	}
}

impl<TP: ThreadingPolicy> Node<TP> {
	fn new(slot: Option<TP::AnySlot>, lock: TP::Lock, thread: TP::ThreadTag, queued: bool) -> Self {
		Self {
			slot,
			links: TP::new_cell(Links {
				prev: None,
				next: None,
				blocked: 0,
			}),
			lock,
			thread,
			queued,
		}
	}

	/// The type-erased slot. [`None`] only for sentinels, which are never handed out.
	#[must_use]
	pub fn slot(&self) -> Option<&TP::AnySlot> {
		self.slot.as_ref()
	}

	/// The thread that connected this node.
	#[must_use]
	pub fn thread(&self) -> TP::ThreadTag {
		self.thread
	}

	/// Whether calls from other threads than [`Node::thread`] must be deferred to it.
	#[must_use]
	pub fn is_queued(&self) -> bool {
		self.queued
	}

	/// Whether the node is still linked into its list.
	#[must_use]
	pub fn connected(&self) -> bool {
		TP::with_lock(&self.lock, || self.with_links(|links| links.prev.is_some()))
	}

	/// Whether the node is connected and not blocked, i.e. would be visited by an emission.
	#[must_use]
	pub fn is_live(&self) -> bool {
		TP::with_lock(&self.lock, || {
			self.with_links(|links| links.prev.is_some() && links.blocked == 0)
		})
	}

	/// Unlinks the node. Idempotent.
	///
	/// Returns whether this call disconnected the node.
	pub fn disconnect(&self) -> bool {
		let released = TP::with_lock(&self.lock, || {
			let prev = self.with_links(|links| links.prev.take())?;
			let next = self.with_links(|links| links.next.clone())
				.expect("unreachable");
			// The predecessor can only be gone while it is being dropped by `clear`.
			let Some(prev) = TP::upgrade(&prev) else {
				return Some(None);
			};
			next.with_links(|links| links.prev = Some(TP::downgrade(&prev)));
			Some(prev.with_links(|links| {
				mem::replace(&mut links.next, Some(next))
			}))
		});
		let disconnected = released.is_some();
		// The list's reference to this node drops here, outside of any cell borrow.
		drop(released);
		disconnected
	}

	/// Suspends delivery without disconnecting. Blocks nest.
	pub fn block(&self) {
		TP::with_lock(&self.lock, || {
			self.with_links(|links| {
				links.blocked = links.blocked.checked_add(1).expect("too many blocks");
			});
		});
	}

	/// Undoes one [`Node::block`]. Extra calls are ignored.
	pub fn unblock(&self) {
		TP::with_lock(&self.lock, || {
			self.with_links(|links| links.blocked = links.blocked.saturating_sub(1));
		});
	}

	/// Whether at least one [`Node::block`] is outstanding.
	#[must_use]
	pub fn is_blocked(&self) -> bool {
		TP::with_lock(&self.lock, || self.with_links(|links| links.blocked > 0))
	}

	fn next(&self) -> Option<TP::Ptr<Self>> {
		self.with_links(|links| links.next.clone())
	}

	fn with_links<U>(&self, f: impl FnOnce(&mut Links<TP>) -> U) -> U {
		TP::with_cell::<Links<TP>, U>(&self.links, f)
	}
}

/// Where [`ConnectionList::link`] inserts a new node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
	/// Immediately before the tail sentinel.
	Back,
	/// Immediately after the head sentinel.
	Front,
}

/// The connection list of one signal (or timer table).
pub struct ConnectionList<TP: ThreadingPolicy> {
	head: TP::Ptr<Node<TP>>,
	tail: TP::Ptr<Node<TP>>,
	lock: TP::Lock,
}

impl<TP: ThreadingPolicy> Debug for ConnectionList<TP> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("ConnectionList")
			.field("len", &self.len())
			.field("lock", &self.lock)
			.finish_non_exhaustive()
	}
}

impl<TP: ThreadingPolicy> Default for ConnectionList<TP> {
	fn default() -> Self {
		Self::new()
	}
}

impl<TP: ThreadingPolicy> ConnectionList<TP> {
	/// Creates an empty list with its own lock.
	#[must_use]
	pub fn new() -> Self {
		let lock = TP::new_lock();
		let thread = TP::thread_tag();
		let head = TP::new_ptr(Node::new(None, lock.clone(), thread, false));
		let tail = TP::new_ptr(Node::new(None, lock.clone(), thread, false));
		head.with_links(|links| links.next = Some(tail.clone()));
		tail.with_links(|links| links.prev = Some(TP::downgrade(&head)));
		Self { head, tail, lock }
	}

	/// The lock shared by this list and all of its nodes.
	#[must_use]
	pub fn lock(&self) -> &TP::Lock {
		&self.lock
	}

	/// Links a new node holding `slot`, owned by the calling thread.
	pub fn link(&self, slot: TP::AnySlot, position: Position, queued: bool) -> TP::Ptr<Node<TP>> {
		self.link_for(slot, position, queued, TP::thread_tag())
	}

	/// Links a new node holding `slot`, owned by `thread`.
	pub fn link_for(
		&self,
		slot: TP::AnySlot,
		position: Position,
		queued: bool,
		thread: TP::ThreadTag,
	) -> TP::Ptr<Node<TP>> {
		let node = TP::new_ptr(Node::new(Some(slot), self.lock.clone(), thread, queued));
		TP::with_lock(&self.lock, || {
			let at = match position {
				Position::Back => self.tail.clone(),
				Position::Front => self.head.next().expect("unreachable"),
			};
			self.link_before(&node, &at);
		});
		node
	}

	/// Links a new node holding `slot` before the first connected node for which `before` returns `true`.
	pub fn link_sorted(
		&self,
		slot: TP::AnySlot,
		before: impl FnMut(&Node<TP>) -> bool,
	) -> TP::Ptr<Node<TP>> {
		let node = TP::new_ptr(Node::new(Some(slot), self.lock.clone(), TP::thread_tag(), false));
		TP::with_lock(&self.lock, || {
			let at = self.find(before);
			self.link_before(&node, &at);
		});
		node
	}

	/// Moves a connected `node` of this list before the first other connected node for which `before` returns `true`.
	///
	/// Unlike disconnecting and connecting again, the node's identity (and so every handle to it) is kept.
	/// Does nothing if `node` isn't connected.
	pub fn reposition(&self, node: &TP::Ptr<Node<TP>>, mut before: impl FnMut(&Node<TP>) -> bool) {
		TP::with_lock(&self.lock, || {
			let Some(prev) = node.with_links(|links| links.prev.clone())
				.and_then(|prev| TP::upgrade(&prev))
			else {
				return;
			};
			let next = node.next().expect("unreachable");

			// Splice out without clearing `prev`, so that the node never appears disconnected.
			next.with_links(|links| links.prev = Some(TP::downgrade(&prev)));
			let this = prev.with_links(|links| mem::replace(&mut links.next, Some(next)));

			let at = self.find(&mut before);
			self.link_before(node, &at);
			drop(this);
		});
	}

	/// Disconnects every node. Safe to call during an emission of this list.
	pub fn clear(&self) {
		TP::with_lock(&self.lock, || {
			let mut current = self.head.next().expect("unreachable");
			while !TP::ptr_eq(&current, &self.tail) {
				// Cursors parked on a cleared node continue directly to the tail.
				let next = current.with_links(|links| {
					links.prev = None;
					mem::replace(&mut links.next, Some(self.tail.clone()))
				})
				.expect("unreachable");
				current = next;
			}
			let first = self.head.with_links(|links| {
				mem::replace(&mut links.next, Some(self.tail.clone()))
			});
			self.tail.with_links(|links| {
				links.prev = Some(TP::downgrade(&self.head));
			});
			drop(first);
		});
	}

	/// Number of connected nodes, including blocked ones.
	#[must_use]
	pub fn len(&self) -> usize {
		TP::with_lock(&self.lock, || {
			let mut count = 0;
			let mut current = self.head.next().expect("unreachable");
			while !TP::ptr_eq(&current, &self.tail) {
				count += 1;
				current = current.next().expect("unreachable");
			}
			count
		})
	}

	/// Whether no node is connected.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		TP::with_lock(&self.lock, || {
			TP::ptr_eq(&self.head.next().expect("unreachable"), &self.tail)
		})
	}

	/// Snapshot of the currently connected nodes, in list order.
	#[must_use]
	pub fn snapshot(&self) -> Vec<TP::Ptr<Node<TP>>> {
		TP::with_lock(&self.lock, || {
			let mut nodes = Vec::new();
			let mut current = self.head.next().expect("unreachable");
			while !TP::ptr_eq(&current, &self.tail) {
				let next = current.next().expect("unreachable");
				nodes.push(current);
				current = next;
			}
			nodes
		})
	}

	/// Starts a live traversal. See [`Cursor`].
	#[must_use]
	pub fn cursor(&self) -> Cursor<'_, TP> {
		Cursor {
			list: self,
			current: self.head.clone(),
		}
	}

	/// Must run under `self.lock`.
	fn find(&self, mut before: impl FnMut(&Node<TP>) -> bool) -> TP::Ptr<Node<TP>> {
		let mut current = self.head.next().expect("unreachable");
		while !TP::ptr_eq(&current, &self.tail) && !before(&*current) {
			current = current.next().expect("unreachable");
		}
		current
	}

	/// Must run under `self.lock`.
	fn link_before(&self, node: &TP::Ptr<Node<TP>>, at: &TP::Ptr<Node<TP>>) {
		let prev = at.with_links(|links| links.prev.clone())
			.and_then(|prev| TP::upgrade(&prev))
			.expect("unreachable");
		node.with_links(|links| {
			links.prev = Some(TP::downgrade(&prev));
			links.next = Some(at.clone());
		});
		at.with_links(|links| links.prev = Some(TP::downgrade(node)));
		let replaced = prev.with_links(|links| mem::replace(&mut links.next, Some(node.clone())));
		drop(replaced);
	}
}

impl<TP: ThreadingPolicy> Drop for ConnectionList<TP> {
	fn drop(&mut self) {
		self.clear();
	}
}

/// Live traversal over the nodes of a [`ConnectionList`] that are connected and unblocked.
///
/// The list's lock is held only while advancing, never between items.
/// There is no snapshot: nodes linked ahead of the cursor during traversal are visited,
/// nodes unlinked ahead of it are skipped, and unlinking the current node doesn't derail it.
pub struct Cursor<'a, TP: ThreadingPolicy> {
	list: &'a ConnectionList<TP>,
	current: TP::Ptr<Node<TP>>,
}

impl<TP: ThreadingPolicy> Debug for Cursor<'_, TP> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Cursor")
			.field("current", &*self.current)
			.finish_non_exhaustive()
	}
}

impl<TP: ThreadingPolicy> Iterator for Cursor<'_, TP> {
	type Item = TP::Ptr<Node<TP>>;

	fn next(&mut self) -> Option<Self::Item> {
		TP::with_lock(&self.list.lock, || loop {
			if TP::ptr_eq(&self.current, &self.list.tail) {
				return None;
			}
			let next = self.current.next().expect("unreachable");
			// May release the last reference to a node disconnected during its own call.
			self.current = next;
			if TP::ptr_eq(&self.current, &self.list.tail) {
				return None;
			}
			let live = self.current.with_links(|links| {
				links.prev.is_some() && links.blocked == 0
			});
			if live {
				return Some(self.current.clone());
			}
		})
	}
}
