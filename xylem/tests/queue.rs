use std::{
	panic::{self, AssertUnwindSafe},
	rc::Rc,
	sync::mpsc,
	thread,
	time::{Duration, Instant},
};

use xylem::{
	context,
	list::{ConnectionList, Position},
	policy::{ThreadKey, ThreadUnsafe},
	queue::{self, Drained, Outcome},
};
mod _validator;
use _validator::Validator;

#[test]
fn fifo_per_thread() {
	static V: Validator<u32> = Validator::new();

	let here = ThreadKey::current();
	for i in 0..3 {
		assert!(queue::enqueue(
			here,
			Box::new(move || {
				V.push(i);
				Outcome::Completed
			}),
		));
	}
	assert!(queue::enqueue(here, Box::new(|| Outcome::Failed)));
	assert_eq!(queue::pending(here), 4);

	// Other threads only drain their own queue.
	thread::spawn(|| assert_eq!(queue::drain(None), Drained::default()))
		.join()
		.unwrap();
	V.expect([]);

	assert_eq!(
		queue::drain(None),
		Drained {
			ran: 4,
			failed: 1,
			interrupted: false,
		}
	);
	V.expect([0, 1, 2]);
	assert_eq!(queue::pending(here), 0);
}

#[test]
fn deadline_puts_the_rest_back_in_front() {
	static V: Validator<&str> = Validator::new();

	let here = ThreadKey::current();
	let task = |name: &'static str| -> queue::Task {
		Box::new(move || {
			V.push(name);
			thread::sleep(Duration::from_millis(10));
			Outcome::Completed
		})
	};
	assert!(queue::enqueue(here, task("a")));
	assert!(queue::enqueue(here, task("b")));

	let drained = queue::drain(Some(Instant::now()));
	assert!(drained.interrupted);
	assert_eq!(drained.ran, 1);
	V.expect(["a"]);

	assert!(queue::enqueue(here, task("c")));
	assert_eq!(queue::drain(None).ran, 2);
	V.expect(["b", "c"]);
}

#[test]
fn nested_drains_keep_fifo_order() {
	static V: Validator<&str> = Validator::new();

	let here = ThreadKey::current();
	assert!(queue::enqueue(
		here,
		Box::new(|| {
			V.push("a");
			let nested = queue::drain(None);
			assert_eq!(nested.ran, 2);
			Outcome::Completed
		}),
	));
	for name in ["b", "c"] {
		assert!(queue::enqueue(
			here,
			Box::new(move || {
				V.push(name);
				Outcome::Completed
			}),
		));
	}

	assert_eq!(queue::drain(None).ran, 1);
	V.expect(["a", "b", "c"]);
	assert_eq!(queue::pending(here), 0);
}

#[test]
fn exited_threads_reject_and_cancel() {
	let (sender, receiver) = mpsc::channel();
	let (proceed, wait) = mpsc::channel::<()>();
	let worker = thread::spawn(move || {
		sender.send(ThreadKey::current()).unwrap();
		wait.recv().unwrap();
	});
	let there = receiver.recv().unwrap();

	let (cancelled, canary) = mpsc::channel::<()>();
	assert!(queue::enqueue(
		there,
		Box::new(move || {
			let _keep = &cancelled;
			Outcome::Completed
		}),
	));
	assert_eq!(queue::pending(there), 1);

	proceed.send(()).unwrap();
	worker.join().unwrap();

	// Dropping the task dropped the sender.
	assert!(canary.recv().is_err());
	assert_eq!(queue::pending(there), 0);
	assert!(!queue::enqueue(there, Box::new(|| Outcome::Completed)));
}

#[test]
fn keys_are_stable_and_distinct() {
	let here = ThreadKey::current();
	assert_eq!(here, ThreadKey::current());
	let there = thread::spawn(ThreadKey::current).join().unwrap();
	assert_ne!(here, there);
}

#[test]
fn emission_context_nests() {
	let list = ConnectionList::<ThreadUnsafe>::new();
	let outer = list.link(Rc::new("outer"), Position::Back, false);
	let inner = list.link(Rc::new("inner"), Position::Back, false);

	assert!(context::current().is_none());
	assert!(!context::abort_emission());

	context::abort_scope(|| {
		context::with_current::<ThreadUnsafe, _>(&outer, || {
			assert!(context::abort_emission());
			assert!(context::is_aborted());

			context::abort_scope(|| {
				assert!(!context::is_aborted());
				context::with_current::<ThreadUnsafe, _>(&inner, || {
					match context::current() {
						Some(context::Current::ThreadUnsafe(node)) => assert!(Rc::ptr_eq(&node, &inner)),
						current => panic!("unexpected {current:?}"),
					}
				});
			});

			assert!(context::is_aborted());
			match context::current() {
				Some(context::Current::ThreadUnsafe(node)) => assert!(Rc::ptr_eq(&node, &outer)),
				current => panic!("unexpected {current:?}"),
			}
		});
	});

	assert!(!context::is_aborted());
	assert!(context::current().is_none());
}

#[test]
fn context_is_restored_after_panics() {
	let list = ConnectionList::<ThreadUnsafe>::new();
	let node = list.link(Rc::new(()), Position::Back, false);

	let result = panic::catch_unwind(AssertUnwindSafe(|| {
		context::abort_scope(|| {
			context::with_current::<ThreadUnsafe, _>(&node, || {
				context::abort_emission();
				panic!("slot");
			})
		})
	}));
	assert!(result.is_err());
	assert!(context::current().is_none());
	assert!(!context::is_aborted());
}
