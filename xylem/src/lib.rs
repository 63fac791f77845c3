#![warn(clippy::pedantic)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]
#![doc = include_str!("../README.md")]
//!
//! # Threading Notes
//!
//! Lists with the [`ThreadSafe`](`policy::ThreadSafe`) policy only ever hold their lock around bookkeeping.
//! Slots are never called while it is held, so they may freely connect to, disconnect from and emit the
//! signal that is calling them, on any thread.

pub mod context;
pub mod list;
pub mod policy;
pub mod queue;

#[doc = include_str!("../README.md")]
mod readme {}
