#![warn(clippy::pedantic)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]
#![doc = include_str!("../README.md")]
//!
//! # Threading Notes
//!
//! [`Signal`] (using [`ThreadUnsafe`]) is neither [`Send`] nor [`Sync`] and does no locking at all.
//! [`ThreadSafeSignal`] (using [`ThreadSafe`]) is both, and holds its lock only between slot calls.
//!
//! Deferred calls and timers belong to the thread that created them and only run inside that
//! thread's [`dispatch_queued_calls`]. When a thread exits, the calls still waiting for it are
//! cancelled. Emitters blocked on one of them see it as a failed slot.

pub mod collector;
pub use collector::{CollectedExt, Collector, DefaultCollector};

mod connection;
pub use connection::{
	abort_emission, current_connection, ConnectFlags, Connection, CurrentConnection,
	ScopedConnection, ScopedConnections,
};

mod dispatch;
pub use dispatch::{dispatch_queued_calls, queued_call_count};

mod error;
pub use error::{BadResultAccess, InvocationSlotError};

mod signal;
pub use signal::{Dispatch, Signal, SignalTP, ThreadSafeSignal};

#[cfg(feature = "timers")]
mod timer;
#[cfg(feature = "timers")]
pub use timer::{set_interval, set_timeout};

mod tracking;
pub use tracking::{Trackable, Tracker};

pub use xylem::policy::{ThreadSafe, ThreadUnsafe, ThreadingPolicy};

#[doc = include_str!("../README.md")]
mod readme {}
