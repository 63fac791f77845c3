use std::{any::Any, rc::Rc, sync::Arc, thread};

use xylem::{
	list::{ConnectionList, Node, Position},
	policy::{ThreadSafe, ThreadUnsafe, ThreadingPolicy},
};

fn local(name: &'static str) -> Rc<dyn Any> {
	Rc::new(name)
}

fn names(list: &ConnectionList<ThreadUnsafe>) -> Vec<&'static str> {
	list.cursor().map(|node| local_name(&node)).collect()
}

fn local_name(node: &Node<ThreadUnsafe>) -> &'static str {
	*node.slot().unwrap().downcast_ref::<&'static str>().unwrap()
}

#[test]
fn positions() {
	let list = ConnectionList::<ThreadUnsafe>::new();
	list.link(local("b"), Position::Back, false);
	list.link(local("a"), Position::Front, false);
	list.link(local("c"), Position::Back, false);

	assert_eq!(names(&list), ["a", "b", "c"]);
	assert_eq!(list.len(), 3);
	assert!(!list.is_empty());
}

#[test]
fn disconnect_is_idempotent() {
	let list = ConnectionList::<ThreadUnsafe>::new();
	let a = list.link(local("a"), Position::Back, false);
	list.link(local("b"), Position::Back, false);

	assert!(a.connected());
	assert!(a.disconnect());
	assert!(!a.disconnect());
	assert!(!a.connected());
	assert_eq!(names(&list), ["b"]);
}

#[test]
fn cursor_survives_unlinking_its_position() {
	let list = ConnectionList::<ThreadUnsafe>::new();
	let a = list.link(local("a"), Position::Back, false);
	let b = list.link(local("b"), Position::Back, false);
	let c = list.link(local("c"), Position::Back, false);
	list.link(local("d"), Position::Back, false);

	let mut cursor = list.cursor();
	assert!(Rc::ptr_eq(&cursor.next().unwrap(), &a));
	let current = cursor.next().unwrap();
	assert!(Rc::ptr_eq(&current, &b));
	drop(current);

	// Unlink the current node and the one after it, then link a new one behind the cursor.
	b.disconnect();
	c.disconnect();
	drop((b, c));
	list.link(local("e"), Position::Back, false);
	list.link(local("before a"), Position::Front, false);

	assert_eq!(cursor.map(|node| local_name(&node)).collect::<Vec<_>>(), ["d", "e"]);
	assert_eq!(names(&list), ["before a", "a", "d", "e"]);
}

#[test]
fn clear_during_traversal() {
	let list = ConnectionList::<ThreadUnsafe>::new();
	let a = list.link(local("a"), Position::Back, false);
	let b = list.link(local("b"), Position::Back, false);

	let mut cursor = list.cursor();
	assert!(cursor.next().is_some());
	list.clear();
	assert!(cursor.next().is_none());
	assert!(!a.connected());
	assert!(!b.connected());
	assert!(list.is_empty());

	list.link(local("c"), Position::Back, false);
	assert_eq!(names(&list), ["c"]);
}

#[test]
fn blocked_nodes_are_skipped() {
	let list = ConnectionList::<ThreadUnsafe>::new();
	let a = list.link(local("a"), Position::Back, false);
	list.link(local("b"), Position::Back, false);

	a.block();
	a.block();
	assert!(a.is_blocked());
	assert!(!a.is_live());
	assert_eq!(names(&list), ["b"]);
	assert_eq!(list.len(), 2);
	assert_eq!(list.snapshot().len(), 2);

	a.unblock();
	assert_eq!(names(&list), ["b"]);
	a.unblock();
	a.unblock();
	assert!(a.is_live());
	assert_eq!(names(&list), ["a", "b"]);
}

#[test]
fn sorted_insertion_and_repositioning() {
	let list = ConnectionList::<ThreadUnsafe>::new();
	let rank = |node: &Node<ThreadUnsafe>| local_name(node).len();
	let sorted = |name: &'static str| {
		list.link_sorted(local(name), |other| local_name(other).len() > name.len())
	};

	let bb = sorted("bb");
	sorted("dddd");
	sorted("a");
	sorted("cc");
	assert_eq!(names(&list), ["a", "bb", "cc", "dddd"]);

	// Moving keeps the node's identity.
	list.reposition(&bb, |other| rank(other) > 3);
	assert_eq!(names(&list), ["a", "cc", "bb", "dddd"]);
	assert!(bb.connected());

	list.reposition(&bb, |_| true);
	assert_eq!(names(&list), ["bb", "a", "cc", "dddd"]);

	bb.disconnect();
	list.reposition(&bb, |_| true);
	assert!(!bb.connected());
	assert_eq!(names(&list), ["a", "cc", "dddd"]);
}

#[test]
fn dropping_the_list_disconnects() {
	let list = ConnectionList::<ThreadUnsafe>::new();
	let a = list.link(local("a"), Position::Back, false);
	drop(list);
	assert!(!a.connected());
	assert!(!a.disconnect());
}

#[test]
fn thread_affinity() {
	let list = Arc::new(ConnectionList::<ThreadSafe>::new());
	let here = ThreadSafe::thread_tag();

	let mine = list.link(Arc::new("here"), Position::Back, true);
	let remote = thread::spawn({
		let list = Arc::clone(&list);
		move || list.link(Arc::new("there"), Position::Back, true)
	})
	.join()
	.unwrap();

	assert_eq!(mine.thread(), here);
	assert_ne!(remote.thread(), here);
	assert!(mine.is_queued());
	assert_eq!(list.len(), 2);

	let copy = ConnectionList::<ThreadSafe>::new();
	let copied = copy.link_for(
		remote.slot().unwrap().clone(),
		Position::Back,
		remote.is_queued(),
		remote.thread(),
	);
	assert_eq!(copied.thread(), remote.thread());
	assert!(Arc::ptr_eq(copied.slot().unwrap(), remote.slot().unwrap()));
}

#[test]
fn concurrent_linking() {
	let list = ConnectionList::<ThreadSafe>::new();
	thread::scope(|scope| {
		for _ in 0..4 {
			scope.spawn(|| {
				for _ in 0..100 {
					let node = list.link(Arc::new(()), Position::Back, false);
					list.link(Arc::new(()), Position::Front, false);
					node.disconnect();
					assert!(list.cursor().count() >= 1);
				}
			});
		}
	});
	assert_eq!(list.len(), 400);
}
