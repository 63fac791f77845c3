use std::{cell::Cell, mem, rc::Rc};

use tendril::{
	collector::Range, ScopedConnection, ScopedConnections, Signal, Trackable, Tracker,
};
mod _validator;
use _validator::Validator;

#[test]
fn copies_are_independent() {
	let signal = Signal::<i32, i32>::new();
	signal.connect(|x| x + 1);
	let gone = signal.connect(|x| x + 2);
	signal.connect(|x| x + 3);
	gone.disconnect();

	let copy = signal.clone();
	assert_eq!(copy.slot_count(), 2);
	assert_eq!(
		copy.invoke_with::<Range<_>>(&0).unwrap(),
		signal.invoke_with::<Range<_>>(&0).unwrap()
	);

	copy.connect(|x| x + 4);
	assert_eq!(copy.invoke_with::<Range<_>>(&0).unwrap(), [1, 3, 4]);
	assert_eq!(signal.invoke_with::<Range<_>>(&0).unwrap(), [1, 3]);

	copy.clear();
	assert_eq!(signal.slot_count(), 2);
}

#[test]
fn swap_and_take() {
	let mut a = Signal::<(), &str>::new();
	let mut b = Signal::<(), &str>::new();
	let in_a = a.connect(|()| "a");
	b.connect(|()| "b1");
	b.connect(|()| "b2");

	a.swap(&mut b);
	assert_eq!(a.invoke_with::<Range<_>>(&()).unwrap(), ["b1", "b2"]);
	assert_eq!(b.invoke_with::<Range<_>>(&()).unwrap(), ["a"]);

	// Handles follow their slot.
	in_a.disconnect();
	assert!(b.is_empty());

	let taken = mem::take(&mut a);
	assert!(a.is_empty());
	assert_eq!(taken.slot_count(), 2);
}

#[derive(Default)]
struct Owner {
	calls: Cell<usize>,
	tracker: Tracker,
}

impl Trackable for Owner {
	fn tracker(&self) -> &Tracker {
		&self.tracker
	}
}

impl Owner {
	fn on_value(&self, value: &i32) -> i32 {
		self.calls.set(self.calls.get() + 1);
		value * 2
	}
}

#[test]
fn tracked_owner() {
	let first = Signal::<i32, i32>::new();
	let second = Signal::<i32, i32>::new();
	let owner = Rc::new(Owner::default());

	let connection = first.connect_tracked(&owner, Owner::on_value);
	second.connect_tracked(&owner, Owner::on_value);
	first.connect(|x| *x);
	assert_eq!(owner.tracker().len(), 2);

	assert_eq!(first.invoke_with::<Range<_>>(&5).unwrap(), [10, 5]);
	assert_eq!(second.invoke(&5).unwrap(), Some(10));
	assert_eq!(owner.calls.get(), 2);

	drop(owner);
	assert!(!connection.connected());
	assert_eq!(first.slot_count(), 1);
	assert!(second.is_empty());
	assert_eq!(first.invoke_with::<Range<_>>(&5).unwrap(), [5]);
}

#[test]
fn weak_binding() {
	let signal = Signal::<i32, i32>::new();
	let owner = Rc::new(Owner::default());
	let connection = signal.connect_weak(&owner, Owner::on_value);
	signal.connect(|x| *x);

	assert_eq!(signal.invoke_with::<Range<_>>(&1).unwrap(), [2, 1]);

	// Still connected, but there is nothing left to call.
	drop(owner);
	assert!(connection.connected());
	assert_eq!(signal.invoke_with::<Range<_>>(&1).unwrap(), [1]);
}

#[test]
fn scoped_connection() {
	static V: Validator<&str> = Validator::new();

	let signal = Signal::<()>::new();
	{
		let _scoped = ScopedConnection::from(signal.connect(|()| V.push("scoped")));
		signal.emit(&()).unwrap();
		V.expect(["scoped"]);
	}
	signal.emit(&()).unwrap();
	V.expect([]);

	let released = ScopedConnection::from(signal.connect(|()| V.push("released"))).release();
	signal.emit(&()).unwrap();
	V.expect(["released"]);
	assert!(released.disconnect());
}

#[test]
fn scoped_connections() {
	static V: Validator<i32> = Validator::new();

	let signal = Signal::<()>::new();
	let mut connections: ScopedConnections = ScopedConnections::new();
	connections.push(signal.connect(|()| V.push(1)));
	connections += signal.connect(|()| V.push(2));
	connections.extend([signal.connect(|()| V.push(3))]);
	let unscoped = signal.connect(|()| V.push(4));
	assert_eq!(connections.len(), 3);

	signal.emit(&()).unwrap();
	V.expect([1, 2, 3, 4]);

	connections.disconnect();
	assert!(connections.is_empty());
	signal.emit(&()).unwrap();
	V.expect([4]);

	connections.push(signal.connect(|()| V.push(5)));
	drop(connections);
	signal.emit(&()).unwrap();
	V.expect([4]);
	assert!(unscoped.connected());
}

#[test]
fn tracker_prunes_disconnected_handles() {
	let signal = Signal::<i32, i32>::new();
	let owner = Rc::new(Owner::default());

	for _ in 0..10 {
		signal.connect_tracked(&owner, Owner::on_value).disconnect();
	}
	signal.connect_tracked(&owner, Owner::on_value);
	assert_eq!(owner.tracker().len(), 1);

	owner.tracker().disconnect_all();
	assert!(signal.is_empty());
}
