#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Shared status storage for the firmware target.
//!
//! Lightweight atomics track bridge counters, valve levels, and UART health so
//! the periodic status line can be built without borrowing the bridge itself.

use core::time::Duration;

use bridge_core::bridge::{BridgePhase, BridgeStats};
use bridge_core::clock::MicrosInstant;
use portable_atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};

/// Set once the start sentinel has been seen.
static BRIDGE_RUNNING: AtomicBool = AtomicBool::new(false);
static EVENTS_SENT: AtomicU32 = AtomicU32::new(0);
static EVENTS_DROPPED: AtomicU32 = AtomicU32::new(0);
static COMMANDS_APPLIED: AtomicU32 = AtomicU32::new(0);
static COMMANDS_IGNORED: AtomicU32 = AtomicU32::new(0);
static UART_ERRORS: AtomicU32 = AtomicU32::new(0);
/// Bitmask of energized valves (bit n == channel n).
static VALVE_MASK: AtomicU8 = AtomicU8::new(0);
/// Timestamp (µs, +1) of the last completed bridge tick.
static LAST_TICK_MICROS: AtomicU32 = AtomicU32::new(0);

/// Point-in-time copy of the status atomics.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct StatusSnapshot {
    pub running: bool,
    pub events_sent: u32,
    pub events_dropped: u32,
    pub commands_applied: u32,
    pub commands_ignored: u32,
    pub uart_errors: u32,
    pub valve_mask: u8,
    pub since_last_tick: Option<Duration>,
}

fn encode_micros(micros: u32) -> u32 {
    micros.wrapping_add(1)
}

fn decode_micros(raw: u32) -> Option<u32> {
    if raw == 0 {
        None
    } else {
        Some(raw.wrapping_sub(1))
    }
}

fn truncate_micros(instant: MicrosInstant) -> u32 {
    u32::try_from(instant.as_micros()).unwrap_or(u32::MAX - 1)
}

/// Copies the bridge counters after a tick.
pub fn record_bridge(phase: BridgePhase, stats: &BridgeStats, now: MicrosInstant) {
    BRIDGE_RUNNING.store(phase == BridgePhase::Running, Ordering::Relaxed);
    EVENTS_SENT.store(stats.events_sent, Ordering::Relaxed);
    EVENTS_DROPPED.store(stats.events_dropped, Ordering::Relaxed);
    COMMANDS_APPLIED.store(stats.commands_applied, Ordering::Relaxed);
    COMMANDS_IGNORED.store(stats.commands_ignored, Ordering::Relaxed);
    LAST_TICK_MICROS.store(encode_micros(truncate_micros(now)), Ordering::Relaxed);
}

/// Records the energized state of one valve.
pub fn record_valve(channel: u8, energized: bool) {
    let Some(bit) = 1u8.checked_shl(u32::from(channel)) else {
        return;
    };
    if energized {
        VALVE_MASK.fetch_or(bit, Ordering::Relaxed);
    } else {
        VALVE_MASK.fetch_and(!bit, Ordering::Relaxed);
    }
}

pub fn record_uart_error() {
    UART_ERRORS.fetch_add(1, Ordering::Relaxed);
}

/// Builds a [`StatusSnapshot`] using the stored metrics.
#[must_use]
pub fn snapshot(now: MicrosInstant) -> StatusSnapshot {
    let since_last_tick = decode_micros(LAST_TICK_MICROS.load(Ordering::Relaxed)).map(|stored| {
        let delta = truncate_micros(now).wrapping_sub(stored);
        Duration::from_micros(u64::from(delta))
    });

    StatusSnapshot {
        running: BRIDGE_RUNNING.load(Ordering::Relaxed),
        events_sent: EVENTS_SENT.load(Ordering::Relaxed),
        events_dropped: EVENTS_DROPPED.load(Ordering::Relaxed),
        commands_applied: COMMANDS_APPLIED.load(Ordering::Relaxed),
        commands_ignored: COMMANDS_IGNORED.load(Ordering::Relaxed),
        uart_errors: UART_ERRORS.load(Ordering::Relaxed),
        valve_mask: VALVE_MASK.load(Ordering::Relaxed),
        since_last_tick,
    }
}
