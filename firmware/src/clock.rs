#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Embassy instants mapped onto the core's microsecond clock.

use bridge_core::clock::MicrosInstant;
use embassy_time::Instant;

#[must_use]
pub fn micros_instant(instant: Instant) -> MicrosInstant {
    MicrosInstant::from_micros(instant.as_micros())
}

/// Current time as seen by the bridge.
#[cfg(target_os = "none")]
#[must_use]
pub fn now() -> MicrosInstant {
    micros_instant(Instant::now())
}
