use std::{
	any::TypeId,
	fmt::{self, Debug, Formatter},
	marker::PhantomData,
	mem,
	ops::AddAssign,
	panic::{catch_unwind, AssertUnwindSafe},
	rc::Rc,
	sync::Arc,
};

use futures_channel::oneshot;
use futures_lite::future::block_on;
use tracing::{debug, trace, warn};
use xylem::{
	context,
	list::{ConnectionList, Node, Position},
	policy::{ThreadKey, ThreadSafe, ThreadUnsafe, ThreadingPolicy},
	queue::{self, Outcome},
};

use crate::{
	collector::{Collector, DefaultCollector},
	connection::{ConnectFlags, Connection},
	error::InvocationSlotError,
	tracking::Trackable,
};

/// Type inference helper alias for [`SignalTP`] (using [`ThreadUnsafe`]).
pub type Signal<T, R = (), C = DefaultCollector<R>> = SignalTP<T, R, C, ThreadUnsafe>;

/// Type inference helper alias for [`SignalTP`] (using [`ThreadSafe`]).
pub type ThreadSafeSignal<T, R = (), C = DefaultCollector<R>> = SignalTP<T, R, C, ThreadSafe>;

/// A typed event emitter with any number of independently connected slots.
///
/// Slots receive the emitted argument by reference and return an `R`.
/// Multiple arguments are passed as a tuple.
/// Each emission reduces the returned values with a fresh `C` (see [`Collector`]).
///
/// # Emission
///
/// Slots run in list order: connection order, except that slots connected with
/// [`ConnectFlags::FIRST`] go to the front. The list is traversed live, so slots may connect,
/// disconnect (themselves included), [`clear`](`SignalTP::clear`) and emit again while they run:
///
/// - A slot connected during an emission is reached by it if it was linked behind the running slot.
/// - A slot disconnected before the emission reaches it is skipped.
/// - A panicking slot doesn't stop the emission. The panics are counted and reported as one
///   [`InvocationSlotError`] once every other slot had its turn.
/// - [`abort_emission`](`crate::abort_emission`) skips the rest of the current emission only.
///
/// # Threading
///
/// With [`ThreadSafe`], the signal is [`Send`] and [`Sync`], and the list's lock is never
/// held while a slot runs. Slots connected with [`ConnectFlags::QUEUED`] always run on the
/// thread that connected them: emissions from other threads enqueue the call for that thread's
/// [`dispatch_queued_calls`](`crate::dispatch_queued_calls`). If `R` isn't `()`, the emitting
/// thread waits for that, so that the collector still sees every value in slot order.
pub struct SignalTP<T, R = (), C = DefaultCollector<R>, TP: ThreadingPolicy = ThreadUnsafe> {
	list: ConnectionList<TP>,
	_phantom: PhantomData<fn(&T) -> (R, C)>,
}

struct LocalSlot<T, R>(Box<dyn Fn(&T) -> Option<R>>);

struct SharedSlot<T, R>(Box<dyn Send + Sync + Fn(&T) -> Option<R>>);

/// What delivering one emission to one slot amounted to.
#[derive(Debug)]
enum Delivery<R> {
	/// The slot returned this value.
	Returned(R),
	/// The slot ran but had nothing to contribute, or didn't run because it was disconnected in the meantime.
	Declined,
	/// The call was handed to the slot's own thread and will run later.
	Deferred,
	/// The slot panicked, or its thread went away before running it.
	Failed,
}

/// Delivery of emitted values to the slots of one [`ThreadingPolicy`].
///
/// The bounds on `T` and `R` are what the policy needs to call slots, possibly on other threads.
pub trait Dispatch<T, R>: ThreadingPolicy {
	#[doc(hidden)]
	fn deliver(node: &Self::Ptr<Node<Self>>, args: &T, observe: &mut dyn FnMut(R)) -> bool;
}

fn call<TP: ThreadingPolicy, T, R>(
	node: &TP::Ptr<Node<TP>>,
	slot: &dyn Fn(&T) -> Option<R>,
	args: &T,
) -> Delivery<R> {
	context::with_current::<TP, _>(node, || match catch_unwind(AssertUnwindSafe(|| slot(args))) {
		Ok(Some(value)) => Delivery::Returned(value),
		Ok(None) => Delivery::Declined,
		Err(payload) => {
			debug!(thread_safe = TP::THREAD_SAFE, "slot panicked");
			// The payload's destructor may panic too. Nobody could act on that.
			let _ = catch_unwind(AssertUnwindSafe(move || drop(payload)));
			Delivery::Failed
		}
	})
}

fn collect<R>(delivery: Delivery<R>, observe: &mut dyn FnMut(R)) -> bool {
	match delivery {
		Delivery::Returned(value) => {
			observe(value);
			true
		}
		Delivery::Declined | Delivery::Deferred => true,
		Delivery::Failed => false,
	}
}

impl<T: 'static, R: 'static> Dispatch<T, R> for ThreadUnsafe {
	fn deliver(node: &Rc<Node<Self>>, args: &T, observe: &mut dyn FnMut(R)) -> bool {
		let slot = node
			.slot()
			.and_then(|slot| slot.downcast_ref::<LocalSlot<T, R>>())
			.expect("unreachable");
		collect(call::<Self, _, _>(node, &*slot.0, args), observe)
	}
}

impl<T: 'static + Clone + Send, R: 'static + Send> Dispatch<T, R> for ThreadSafe {
	fn deliver(node: &Arc<Node<Self>>, args: &T, observe: &mut dyn FnMut(R)) -> bool {
		let delivery = if node.is_queued() && node.thread() != ThreadKey::current() {
			defer::<T, R>(node, args)
		} else {
			call::<Self, _, _>(node, &*shared_slot::<T, R>(node).0, args)
		};
		collect(delivery, observe)
	}
}

fn shared_slot<T: 'static, R: 'static>(node: &Node<ThreadSafe>) -> &SharedSlot<T, R> {
	node.slot()
		.and_then(|slot| slot.downcast_ref::<SharedSlot<T, R>>())
		.expect("unreachable")
}

/// Runs a deferred call on the slot's own thread, unless the slot went away or was blocked meanwhile.
fn run_deferred<T: 'static, R: 'static>(node: &Arc<Node<ThreadSafe>>, args: &T) -> Delivery<R> {
	if !node.is_live() {
		return Delivery::Declined;
	}
	// A deferred call is its own emission as far as `abort_emission` is concerned.
	context::abort_scope(|| call::<ThreadSafe, _, _>(node, &*shared_slot::<T, R>(node).0, args))
}

fn defer<T: 'static + Clone + Send, R: 'static + Send>(
	node: &Arc<Node<ThreadSafe>>,
	args: &T,
) -> Delivery<R> {
	let thread = node.thread();
	let node = Arc::clone(node);
	let args = args.clone();

	if TypeId::of::<R>() == TypeId::of::<()>() {
		let enqueued = queue::enqueue(
			thread,
			Box::new(move || match run_deferred::<T, R>(&node, &args) {
				Delivery::Failed => Outcome::Failed,
				_ => Outcome::Completed,
			}),
		);
		if !enqueued {
			warn!(?thread, "deferred call was dropped because its thread exited");
			return Delivery::Failed;
		}
		return Delivery::Deferred;
	}

	let (sender, receiver) = oneshot::channel();
	// If this is rejected, dropping the task cancels the receiver.
	let _ = queue::enqueue(
		thread,
		Box::new(move || {
			// The emitter is blocked on the receiver, so this only fails if it was cancelled.
			let _ = sender.send(run_deferred::<T, R>(&node, &args));
			Outcome::Completed
		}),
	);
	block_on(receiver).unwrap_or_else(|oneshot::Canceled| {
		warn!(?thread, "deferred call was cancelled because its thread exited");
		Delivery::Failed
	})
}

impl<T, R, C, TP: ThreadingPolicy> SignalTP<T, R, C, TP> {
	/// Creates a signal without slots.
	#[must_use]
	pub fn new() -> Self {
		Self {
			list: ConnectionList::new(),
			_phantom: PhantomData,
		}
	}

	/// Number of connected slots, including blocked ones.
	#[must_use]
	pub fn slot_count(&self) -> usize {
		self.list.len()
	}

	/// Whether no slot is connected.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.list.is_empty()
	}

	/// Disconnects every slot.
	///
	/// If this happens during an emission of this signal, that emission skips all remaining slots.
	pub fn clear(&self) {
		self.list.clear();
		trace!(thread_safe = TP::THREAD_SAFE, "signal cleared");
	}

	fn link(&self, slot: TP::AnySlot, flags: ConnectFlags) -> Connection<TP> {
		let position = if flags.first {
			Position::Front
		} else {
			Position::Back
		};
		let node = self.list.link(slot, position, flags.queued);
		trace!(
			thread_safe = TP::THREAD_SAFE,
			first = flags.first,
			queued = flags.queued,
			"slot connected"
		);
		Connection::new(&node)
	}

	/// Calls every live slot with `args` and collects their return values with `C`.
	///
	/// # Errors
	///
	/// Iff any slot panicked. All other slots still ran, but the collected values are lost.
	pub fn invoke(&self, args: &T) -> Result<C::Output, InvocationSlotError>
	where
		C: Collector<R>,
		TP: Dispatch<T, R>,
	{
		self.invoke_with::<C>(args)
	}

	/// Alias of [`SignalTP::invoke`].
	///
	/// # Errors
	///
	/// Iff any slot panicked.
	pub fn emit(&self, args: &T) -> Result<C::Output, InvocationSlotError>
	where
		C: Collector<R>,
		TP: Dispatch<T, R>,
	{
		self.invoke_with::<C>(args)
	}

	/// Like [`SignalTP::invoke`], but collects with `C2` instead of `C`.
	///
	/// # Errors
	///
	/// Iff any slot panicked.
	pub fn invoke_with<C2: Collector<R>>(&self, args: &T) -> Result<C2::Output, InvocationSlotError>
	where
		TP: Dispatch<T, R>,
	{
		let mut collector = C2::default();
		let mut failed = 0;
		context::abort_scope(|| {
			for node in self.list.cursor() {
				if !TP::deliver(&node, args, &mut |value| collector.observe(value)) {
					failed += 1;
				}
				if context::is_aborted() {
					trace!(thread_safe = TP::THREAD_SAFE, "emission stopped early");
					break;
				}
			}
		});
		InvocationSlotError::check(failed)?;
		Ok(collector.finish())
	}
}

/// # Connecting
///
/// See [`ConnectFlags`] for options.
impl<T: 'static, R: 'static, C> SignalTP<T, R, C, ThreadUnsafe> {
	/// Appends `slot`.
	pub fn connect(&self, slot: impl 'static + Fn(&T) -> R) -> Connection {
		self.connect_with(slot, ConnectFlags::NONE)
	}

	/// Connects `slot` with the given options.
	///
	/// # Panics
	///
	/// Iff `flags` includes [`ConnectFlags::QUEUED`], which only [`ThreadSafe`] signals support.
	pub fn connect_with(&self, slot: impl 'static + Fn(&T) -> R, flags: ConnectFlags) -> Connection {
		assert!(
			!flags.queued,
			"Queued connections require a thread-safe signal."
		);
		self.link(
			Rc::new(LocalSlot::<T, R>(Box::new(move |args: &T| Some(slot(args))))),
			flags,
		)
	}

	/// Appends a slot with a different but convertible signature.
	///
	/// The argument is cloned and converted into `A` for each call, and the result is converted into `R`.
	pub fn connect_adapted<A, R1: Into<R>>(&self, slot: impl 'static + Fn(A) -> R1) -> Connection
	where
		T: Clone + Into<A>,
	{
		self.connect(move |args| slot(args.clone().into()).into())
	}

	/// Appends `method`, bound to `instance` without keeping it alive.
	///
	/// Once `instance` is dropped, the slot stops contributing values, but stays connected.
	/// See [`SignalTP::connect_tracked`] for automatic disconnection.
	pub fn connect_weak<I: 'static>(
		&self,
		instance: &Rc<I>,
		method: impl 'static + Fn(&I, &T) -> R,
	) -> Connection {
		let instance = Rc::downgrade(instance);
		self.link(
			Rc::new(LocalSlot::<T, R>(Box::new(move |args: &T| {
				instance.upgrade().map(|instance| method(&*instance, args))
			}))),
			ConnectFlags::NONE,
		)
	}

	/// Appends `method`, bound to `instance`, and disconnects it when `instance` is dropped.
	pub fn connect_tracked<I: 'static + Trackable>(
		&self,
		instance: &Rc<I>,
		method: impl 'static + Fn(&I, &T) -> R,
	) -> Connection {
		self.connect_tracked_with(instance, method, ConnectFlags::NONE)
	}

	/// [`SignalTP::connect_tracked`] with options.
	///
	/// # Panics
	///
	/// Iff `flags` includes [`ConnectFlags::QUEUED`].
	pub fn connect_tracked_with<I: 'static + Trackable>(
		&self,
		instance: &Rc<I>,
		method: impl 'static + Fn(&I, &T) -> R,
		flags: ConnectFlags,
	) -> Connection {
		assert!(
			!flags.queued,
			"Queued connections require a thread-safe signal."
		);
		let weak = Rc::downgrade(instance);
		let connection = self.link(
			Rc::new(LocalSlot::<T, R>(Box::new(move |args: &T| {
				weak.upgrade().map(|instance| method(&*instance, args))
			}))),
			flags,
		);
		instance.tracker().track(connection.clone());
		connection
	}

	/// Exchanges the slots of two signals.
	///
	/// Existing [`Connection`]s follow their slots.
	pub fn swap(&mut self, other: &mut Self) {
		mem::swap(&mut self.list, &mut other.list);
	}
}

/// # Connecting
///
/// See [`ConnectFlags`] for options.
impl<T: 'static, R: 'static, C> SignalTP<T, R, C, ThreadSafe> {
	/// Appends `slot`.
	pub fn connect(&self, slot: impl 'static + Send + Sync + Fn(&T) -> R) -> Connection<ThreadSafe> {
		self.connect_with(slot, ConnectFlags::NONE)
	}

	/// Connects `slot` with the given options.
	pub fn connect_with(
		&self,
		slot: impl 'static + Send + Sync + Fn(&T) -> R,
		flags: ConnectFlags,
	) -> Connection<ThreadSafe> {
		self.link(
			Arc::new(SharedSlot::<T, R>(Box::new(move |args: &T| Some(slot(args))))),
			flags,
		)
	}

	/// Appends a slot with a different but convertible signature.
	///
	/// The argument is cloned and converted into `A` for each call, and the result is converted into `R`.
	pub fn connect_adapted<A, R1: Into<R>>(
		&self,
		slot: impl 'static + Send + Sync + Fn(A) -> R1,
	) -> Connection<ThreadSafe>
	where
		T: Clone + Into<A>,
	{
		self.connect(move |args| slot(args.clone().into()).into())
	}

	/// Appends `method`, bound to `instance` without keeping it alive.
	///
	/// Once `instance` is dropped, the slot stops contributing values, but stays connected.
	/// See [`SignalTP::connect_tracked`] for automatic disconnection.
	pub fn connect_weak<I: 'static + Send + Sync>(
		&self,
		instance: &Arc<I>,
		method: impl 'static + Send + Sync + Fn(&I, &T) -> R,
	) -> Connection<ThreadSafe> {
		let instance = Arc::downgrade(instance);
		self.link(
			Arc::new(SharedSlot::<T, R>(Box::new(move |args: &T| {
				instance.upgrade().map(|instance| method(&*instance, args))
			}))),
			ConnectFlags::NONE,
		)
	}

	/// Appends `method`, bound to `instance`, and disconnects it when `instance` is dropped.
	pub fn connect_tracked<I: 'static + Send + Sync + Trackable<ThreadSafe>>(
		&self,
		instance: &Arc<I>,
		method: impl 'static + Send + Sync + Fn(&I, &T) -> R,
	) -> Connection<ThreadSafe> {
		self.connect_tracked_with(instance, method, ConnectFlags::NONE)
	}

	/// [`SignalTP::connect_tracked`] with options.
	pub fn connect_tracked_with<I: 'static + Send + Sync + Trackable<ThreadSafe>>(
		&self,
		instance: &Arc<I>,
		method: impl 'static + Send + Sync + Fn(&I, &T) -> R,
		flags: ConnectFlags,
	) -> Connection<ThreadSafe> {
		let weak = Arc::downgrade(instance);
		let connection = self.link(
			Arc::new(SharedSlot::<T, R>(Box::new(move |args: &T| {
				weak.upgrade().map(|instance| method(&*instance, args))
			}))),
			flags,
		);
		instance.tracker().track(connection.clone());
		connection
	}
}

impl<T: 'static, R: 'static, C, F: 'static + Fn(&T) -> R> AddAssign<F>
	for SignalTP<T, R, C, ThreadUnsafe>
{
	/// Appends a slot. Keep a [`Connection`] from [`SignalTP::connect`] instead to disconnect it later.
	fn add_assign(&mut self, slot: F) {
		self.connect(slot);
	}
}

impl<T: 'static, R: 'static, C, F: 'static + Send + Sync + Fn(&T) -> R> AddAssign<F>
	for SignalTP<T, R, C, ThreadSafe>
{
	/// Appends a slot. Keep a [`Connection`] from [`SignalTP::connect`] instead to disconnect it later.
	fn add_assign(&mut self, slot: F) {
		self.connect(slot);
	}
}

impl<T, R, C, TP: ThreadingPolicy> Default for SignalTP<T, R, C, TP> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T, R, C, TP: ThreadingPolicy> Clone for SignalTP<T, R, C, TP> {
	/// Creates a signal with the same connected slots, in the same order and with the same
	/// thread affinity. Blocks aren't copied, and the copy's slots are disconnected independently.
	fn clone(&self) -> Self {
		let clone = Self::new();
		let nodes = self.list.snapshot();
		for node in &nodes {
			let _ = clone.list.link_for(
				node.slot().expect("unreachable").clone(),
				Position::Back,
				node.is_queued(),
				node.thread(),
			);
		}
		trace!(thread_safe = TP::THREAD_SAFE, slots = nodes.len(), "signal copied");
		clone
	}
}

impl<T, R, C, TP: ThreadingPolicy> Debug for SignalTP<T, R, C, TP> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("SignalTP")
			.field("thread_safe", &TP::THREAD_SAFE)
			.field("slot_count", &self.slot_count())
			.finish_non_exhaustive()
	}
}
