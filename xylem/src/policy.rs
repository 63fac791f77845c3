//! Threading policies select, at the type level, how connection lists share and guard their nodes.
//!
//! [`ThreadUnsafe`] uses [`Rc`], [`RefCell`] and no lock at all.
//! [`ThreadSafe`] uses [`Arc`], [`parking_lot::Mutex`] and one [`ReentrantMutex`] shared by a list and all of its nodes.

use std::{
	any::Any,
	cell::RefCell,
	fmt::Debug,
	num::NonZeroU64,
	ops::Deref,
	rc::{self, Rc},
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc, Weak,
	},
};

use parking_lot::{Mutex, ReentrantMutex};

use crate::{context::Current, list::Node, queue};

mod private {
	pub trait Sealed {}
	impl Sealed for super::ThreadUnsafe {}
	impl Sealed for super::ThreadSafe {}
}

/// Type-level choice between lock-free single-threaded and mutex-guarded multi-threaded connection lists.
///
/// This trait is sealed. Its associated items are plumbing for [`ConnectionList`](`crate::list::ConnectionList`).
pub trait ThreadingPolicy: 'static + Sized + Debug + private::Sealed {
	/// Whether lists with this policy may be shared between threads.
	const THREAD_SAFE: bool;

	/// Strong shared pointer.
	type Ptr<T>: Clone + Deref<Target = T>;
	/// Weak counterpart of [`Self::Ptr`].
	type Weak<T>: Clone;
	/// Interior mutability for node state.
	type Cell<T>;
	/// Handle to the lock shared by one list and all of its nodes.
	type Lock: Clone + Debug;
	/// Type-erased slot storage.
	type AnySlot: Clone;
	/// Identifies the thread that created a node.
	type ThreadTag: Copy + Eq + Debug;

	/// Allocates `value` behind a fresh [`Self::Ptr`].
	fn new_ptr<T>(value: T) -> Self::Ptr<T>;
	/// Creates a [`Self::Weak`] for `ptr`.
	fn downgrade<T>(ptr: &Self::Ptr<T>) -> Self::Weak<T>;
	/// Attempts to recover a [`Self::Ptr`] from `weak`.
	fn upgrade<T>(weak: &Self::Weak<T>) -> Option<Self::Ptr<T>>;
	/// Pointer identity.
	fn ptr_eq<T>(a: &Self::Ptr<T>, b: &Self::Ptr<T>) -> bool;
	/// Pointer identity for weak pointers.
	fn weak_ptr_eq<T>(a: &Self::Weak<T>, b: &Self::Weak<T>) -> bool;

	/// Wraps `value` in a [`Self::Cell`].
	fn new_cell<T>(value: T) -> Self::Cell<T>;
	/// Runs `f` with exclusive access to the contents of `cell`.
	///
	/// `f` **must not** access `cell` again.
	fn with_cell<T, U>(cell: &Self::Cell<T>, f: impl FnOnce(&mut T) -> U) -> U;

	/// Creates a fresh lock.
	fn new_lock() -> Self::Lock;
	/// Runs `f` while holding `lock`. Reentrant.
	fn with_lock<U>(lock: &Self::Lock, f: impl FnOnce() -> U) -> U;

	/// Tag of the calling thread.
	fn thread_tag() -> Self::ThreadTag;

	/// Tags `node` for the thread-local emission context.
	#[doc(hidden)]
	fn to_current(node: &Self::Ptr<Node<Self>>) -> Current;
}

/// No locking, no atomics. Lists with this policy are neither [`Send`] nor [`Sync`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadUnsafe {}

/// A [`ReentrantMutex`] shared by each list and its nodes, [`Arc`] links and per-thread affinity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadSafe {}

impl ThreadingPolicy for ThreadUnsafe {
	const THREAD_SAFE: bool = false;

	type Ptr<T> = Rc<T>;
	type Weak<T> = rc::Weak<T>;
	type Cell<T> = RefCell<T>;
	type Lock = ();
	type AnySlot = Rc<dyn Any>;
	type ThreadTag = ();

	fn new_ptr<T>(value: T) -> Self::Ptr<T> {
		Rc::new(value)
	}

	fn downgrade<T>(ptr: &Self::Ptr<T>) -> Self::Weak<T> {
		Rc::downgrade(ptr)
	}

	fn upgrade<T>(weak: &Self::Weak<T>) -> Option<Self::Ptr<T>> {
		weak.upgrade()
	}

	fn ptr_eq<T>(a: &Self::Ptr<T>, b: &Self::Ptr<T>) -> bool {
		Rc::ptr_eq(a, b)
	}

	fn weak_ptr_eq<T>(a: &Self::Weak<T>, b: &Self::Weak<T>) -> bool {
		a.ptr_eq(b)
	}

	fn new_cell<T>(value: T) -> Self::Cell<T> {
		RefCell::new(value)
	}

	fn with_cell<T, U>(cell: &Self::Cell<T>, f: impl FnOnce(&mut T) -> U) -> U {
		f(&mut cell.borrow_mut())
	}

	fn new_lock() -> Self::Lock {}

	fn with_lock<U>(_lock: &Self::Lock, f: impl FnOnce() -> U) -> U {
		f()
	}

	fn thread_tag() -> Self::ThreadTag {}

	fn to_current(node: &Self::Ptr<Node<Self>>) -> Current {
		Current::ThreadUnsafe(Rc::clone(node))
	}
}

impl ThreadingPolicy for ThreadSafe {
	const THREAD_SAFE: bool = true;

	type Ptr<T> = Arc<T>;
	type Weak<T> = Weak<T>;
	type Cell<T> = Mutex<T>;
	type Lock = Arc<ReentrantMutex<()>>;
	type AnySlot = Arc<dyn Any + Send + Sync>;
	type ThreadTag = ThreadKey;

	fn new_ptr<T>(value: T) -> Self::Ptr<T> {
		Arc::new(value)
	}

	fn downgrade<T>(ptr: &Self::Ptr<T>) -> Self::Weak<T> {
		Arc::downgrade(ptr)
	}

	fn upgrade<T>(weak: &Self::Weak<T>) -> Option<Self::Ptr<T>> {
		weak.upgrade()
	}

	fn ptr_eq<T>(a: &Self::Ptr<T>, b: &Self::Ptr<T>) -> bool {
		Arc::ptr_eq(a, b)
	}

	fn weak_ptr_eq<T>(a: &Self::Weak<T>, b: &Self::Weak<T>) -> bool {
		a.ptr_eq(b)
	}

	fn new_cell<T>(value: T) -> Self::Cell<T> {
		Mutex::new(value)
	}

	fn with_cell<T, U>(cell: &Self::Cell<T>, f: impl FnOnce(&mut T) -> U) -> U {
		f(&mut cell.lock())
	}

	fn new_lock() -> Self::Lock {
		Arc::new(ReentrantMutex::new(()))
	}

	fn with_lock<U>(lock: &Self::Lock, f: impl FnOnce() -> U) -> U {
		let _guard = lock.lock();
		f()
	}

	fn thread_tag() -> Self::ThreadTag {
		ThreadKey::current()
	}

	fn to_current(node: &Self::Ptr<Node<Self>>) -> Current {
		Current::ThreadSafe(Arc::clone(node))
	}
}

/// Process-unique identity of a thread, assigned on first use.
///
/// Unlike [`std::thread::ThreadId`], this is [`Ord`] and tied to the thread's pending-call queue,
/// which is opened on first use and purged when the thread exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadKey(NonZeroU64);

static THREAD_COUNTER: AtomicU64 = AtomicU64::new(0);

struct Registration(ThreadKey);

impl Drop for Registration {
	fn drop(&mut self) {
		queue::purge(self.0);
	}
}

impl Registration {
	fn new() -> Self {
		let key = ThreadKey::next();
		queue::register(key);
		Self(key)
	}
}

thread_local! {
	static REGISTRATION: Registration = Registration::new();
}

impl ThreadKey {
	fn next() -> Self {
		Self(
			(THREAD_COUNTER.fetch_add(1, Ordering::Relaxed) + 1)
				.try_into()
				.expect("infallible within reasonable time"),
		)
	}

	/// The calling thread's key.
	///
	/// During thread teardown, after the registration is gone, this returns a fresh key
	/// that can't be enqueued to.
	#[must_use]
	pub fn current() -> Self {
		REGISTRATION
			.try_with(|registration| registration.0)
			.unwrap_or_else(|_| Self::next())
	}
}
