//! Strategies that reduce the return values of one emission's slots into its result.
//!
//! Each emission creates a fresh collector with [`Default`], feeds it every produced value in
//! slot order with [`Collector::observe`], then calls [`Collector::finish`].

use std::marker::PhantomData;

use crate::error::BadResultAccess;

/// A per-emission accumulator of slot return values.
pub trait Collector<R>: Default {
	/// The emission's result.
	type Output;

	/// Records one slot's return value.
	fn observe(&mut self, value: R);

	/// Produces the emission's result.
	fn finish(self) -> Self::Output;
}

/// The collector signals use unless told otherwise: [`Last`], so that an emission with no slots yields [`None`].
///
/// This applies to `()`-returning signals too, which yield `Some(())` if any slot contributed and
/// [`None`] otherwise. Use [`Discard`] as `C` (or with [`invoke_with`](`crate::SignalTP::invoke_with`))
/// to get a plain `()` instead.
pub type DefaultCollector<R> = Last<R>;

/// Keeps the first value.
#[derive(Debug, Clone)]
pub struct First<R>(Option<R>);

/// Keeps the most recent value.
#[derive(Debug, Clone)]
pub struct Last<R>(Option<R>);

/// Keeps the least value.
#[derive(Debug, Clone)]
pub struct Minimum<R>(Option<R>);

/// Keeps the greatest value.
#[derive(Debug, Clone)]
pub struct Maximum<R>(Option<R>);

/// Keeps every value, in slot order.
#[derive(Debug, Clone)]
pub struct Range<R>(Vec<R>);

/// Drops every value.
#[derive(Debug, Clone, Copy)]
pub struct Discard<R>(PhantomData<fn(R)>);

impl<R> Default for First<R> {
	fn default() -> Self {
		Self(None)
	}
}

impl<R> Default for Last<R> {
	fn default() -> Self {
		Self(None)
	}
}

impl<R> Default for Minimum<R> {
	fn default() -> Self {
		Self(None)
	}
}

impl<R> Default for Maximum<R> {
	fn default() -> Self {
		Self(None)
	}
}

impl<R> Default for Range<R> {
	fn default() -> Self {
		Self(Vec::new())
	}
}

impl<R> Default for Discard<R> {
	fn default() -> Self {
		Self(PhantomData)
	}
}

impl<R> Collector<R> for First<R> {
	type Output = Option<R>;

	fn observe(&mut self, value: R) {
		if self.0.is_none() {
			self.0 = Some(value);
		}
	}

	fn finish(self) -> Self::Output {
		self.0
	}
}

impl<R> Collector<R> for Last<R> {
	type Output = Option<R>;

	fn observe(&mut self, value: R) {
		self.0 = Some(value);
	}

	fn finish(self) -> Self::Output {
		self.0
	}
}

impl<R: PartialOrd> Collector<R> for Minimum<R> {
	type Output = Option<R>;

	fn observe(&mut self, value: R) {
		if self.0.as_ref().is_none_or(|current| value < *current) {
			self.0 = Some(value);
		}
	}

	fn finish(self) -> Self::Output {
		self.0
	}
}

impl<R: PartialOrd> Collector<R> for Maximum<R> {
	type Output = Option<R>;

	fn observe(&mut self, value: R) {
		if self.0.as_ref().is_none_or(|current| value > *current) {
			self.0 = Some(value);
		}
	}

	fn finish(self) -> Self::Output {
		self.0
	}
}

impl<R> Collector<R> for Range<R> {
	type Output = Vec<R>;

	fn observe(&mut self, value: R) {
		self.0.push(value);
	}

	fn finish(self) -> Self::Output {
		self.0
	}
}

impl<R> Collector<R> for Discard<R> {
	type Output = ();

	fn observe(&mut self, _: R) {}

	fn finish(self) -> Self::Output {}
}

/// Checked access to [`Option`] emission results.
pub trait CollectedExt {
	/// The collected value.
	type Value;

	/// The collected value, or [`BadResultAccess`] if no slot produced one.
	///
	/// # Errors
	///
	/// Iff the result is empty.
	fn value(self) -> Result<Self::Value, BadResultAccess>;
}

impl<R> CollectedExt for Option<R> {
	type Value = R;

	fn value(self) -> Result<R, BadResultAccess> {
		self.ok_or(BadResultAccess)
	}
}
