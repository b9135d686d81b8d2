//! Time source used for update timestamps and staleness.

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Monotonic time source.
pub trait Clock: Send + Sync + 'static {
	/// Returns the current instant.
	fn now(&self) -> Instant;
}

/// Wall-clock time via [`Instant::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> Instant {
		Instant::now()
	}
}

/// Manually advanced clock for deterministic staleness tests.
pub struct ManualClock {
	base: Instant,
	offset: Mutex<Duration>,
}

impl ManualClock {
	/// Creates a clock frozen at the current instant.
	pub fn new() -> Self {
		Self {
			base: Instant::now(),
			offset: Mutex::new(Duration::ZERO),
		}
	}

	/// Moves the clock forward.
	pub fn advance(&self, by: Duration) {
		*self.offset.lock() += by;
	}

	/// Total time advanced since construction.
	pub fn elapsed(&self) -> Duration {
		*self.offset.lock()
	}
}

impl Default for ManualClock {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Debug for ManualClock {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ManualClock").field("elapsed", &self.elapsed()).finish()
	}
}

impl Clock for ManualClock {
	fn now(&self) -> Instant {
		self.base + *self.offset.lock()
	}
}
