use thiserror::Error;

/// One or more slots panicked during an emission, a timer pass or a drain of deferred calls.
///
/// Every other slot still ran. Which slots failed and why is not preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{failed} slot invocation(s) failed")]
pub struct InvocationSlotError {
	/// How many slot calls failed. Always at least 1.
	pub failed: usize,
}

impl InvocationSlotError {
	pub(crate) fn check(failed: usize) -> Result<(), Self> {
		match failed {
			0 => Ok(()),
			failed => Err(Self { failed }),
		}
	}
}

/// A collected result was read, but no slot contributed a value to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Error)]
#[error("no slot produced a value")]
pub struct BadResultAccess;
