//! Millisecond time base and timeouts
//!
//! Busy-waits on hardware flags must be bounded. The board provides a
//! millisecond [`Clock`]; [`Timeout`] turns it into a deadline.

/// Monotonic millisecond clock
pub trait Clock {
    /// Milliseconds since an arbitrary fixed point. Must not go backwards.
    fn now_ms(&self) -> u64;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

/// A deadline measured against a [`Clock`]
pub struct Timeout<'a, C: Clock + ?Sized> {
    clock: &'a C,
    deadline: u64,
}

impl<'a, C: Clock + ?Sized> Timeout<'a, C> {
    /// Create a timeout that expires `ms` milliseconds from now
    pub fn from_ms(clock: &'a C, ms: u64) -> Self {
        Self {
            clock,
            deadline: clock.now_ms().saturating_add(ms),
        }
    }

    /// Check whether the deadline has passed
    pub fn is_expired(&self) -> bool {
        self.clock.now_ms() >= self.deadline
    }
}
