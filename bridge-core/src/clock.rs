//! Monotonic time abstraction shared by the generator, muscles, and telemetry.
//!
//! Firmware converts Embassy instants into [`MicrosInstant`]; host tooling and
//! tests drive the same state machines from a virtual clock.

use core::ops::Add;
use core::time::Duration;

/// Trait implemented by monotonic instant wrappers used across the core.
pub trait Monotonic: Copy + Ord {
    /// Returns the saturating duration from `earlier` to `self`.
    fn saturating_duration_since(&self, earlier: Self) -> Duration;
}

/// Microsecond timestamp counted from an arbitrary epoch (boot or session start).
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct MicrosInstant(u64);

impl MicrosInstant {
    /// Timestamp at the epoch.
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn from_micros(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn from_millis(value: u64) -> Self {
        Self(value.saturating_mul(1_000))
    }

    #[must_use]
    pub const fn as_micros(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0 / 1_000
    }
}

impl Add<Duration> for MicrosInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        let micros = u64::try_from(rhs.as_micros()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(micros))
    }
}

impl Monotonic for MicrosInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}
