//! Round-trip echo accounting.
//!
//! The transport never detects loss itself. An [`EchoProbe`] sits beside a link
//! whose peer echoes every byte back, hands out probe bytes, and matches the
//! echoes in order to derive loss, corruption, and round-trip latency.

use core::time::Duration;

use heapless::Deque;

use super::START_SENTINEL;
use crate::clock::Monotonic;

/// Number of probes that may be in flight at once.
pub const DEFAULT_PROBE_WINDOW: usize = 16;

/// Aggregated probe results.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ProbeReport {
    pub sent: u32,
    pub echoed: u32,
    pub lost: u32,
    pub corrupted: u32,
    pub unexpected: u32,
    pub total_round_trip: Duration,
    pub max_round_trip: Duration,
}

impl ProbeReport {
    /// Fraction of sent probes that never came back intact.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn loss_rate(&self) -> f32 {
        if self.sent == 0 {
            return 0.0;
        }
        (self.lost + self.corrupted) as f32 / self.sent as f32
    }

    #[must_use]
    pub fn mean_round_trip(&self) -> Option<Duration> {
        if self.echoed == 0 {
            None
        } else {
            Some(self.total_round_trip / self.echoed)
        }
    }
}

/// Classification of a received echo byte.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EchoMatch {
    /// Echo matched an outstanding probe; earlier probes skipped over are lost.
    Matched { round_trip: Duration, skipped: u32 },
    /// Echo matched nothing in flight; the oldest probe is counted as corrupted.
    Corrupted,
    /// Echo arrived with no probe in flight.
    Unexpected,
}

/// Tracks outstanding probe bytes and folds echoes into a [`ProbeReport`].
pub struct EchoProbe<TInstant, const WINDOW: usize = DEFAULT_PROBE_WINDOW>
where
    TInstant: Copy,
{
    outstanding: Deque<(u8, TInstant), WINDOW>,
    next_byte: u8,
    report: ProbeReport,
}

impl<TInstant, const WINDOW: usize> EchoProbe<TInstant, WINDOW>
where
    TInstant: Monotonic,
{
    #[must_use]
    pub const fn new() -> Self {
        Self {
            outstanding: Deque::new(),
            next_byte: 0,
            report: ProbeReport {
                sent: 0,
                echoed: 0,
                lost: 0,
                corrupted: 0,
                unexpected: 0,
                total_round_trip: Duration::ZERO,
                max_round_trip: Duration::ZERO,
            },
        }
    }

    #[must_use]
    pub const fn report(&self) -> &ProbeReport {
        &self.report
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.outstanding.len()
    }

    /// Allocates the next probe byte and marks it sent at `now`.
    ///
    /// Returns `None` while the window is full; call [`Self::expire`] first.
    /// Probe bytes never collide with [`START_SENTINEL`].
    pub fn next_probe(&mut self, now: TInstant) -> Option<u8> {
        let byte = self.next_byte;
        self.outstanding.push_back((byte, now)).ok()?;

        self.next_byte = self.next_byte.wrapping_add(1);
        if self.next_byte == START_SENTINEL {
            self.next_byte = 0;
        }
        self.report.sent = self.report.sent.saturating_add(1);
        Some(byte)
    }

    /// Folds a received echo into the report.
    pub fn record_echo(&mut self, byte: u8, now: TInstant) -> EchoMatch {
        let Some(position) = self.outstanding.iter().position(|(sent, _)| *sent == byte) else {
            if self.outstanding.pop_front().is_some() {
                self.report.corrupted = self.report.corrupted.saturating_add(1);
                return EchoMatch::Corrupted;
            }
            self.report.unexpected = self.report.unexpected.saturating_add(1);
            return EchoMatch::Unexpected;
        };

        let mut skipped = 0u32;
        for _ in 0..position {
            self.outstanding.pop_front();
            skipped += 1;
        }
        self.report.lost = self.report.lost.saturating_add(skipped);

        let round_trip = match self.outstanding.pop_front() {
            Some((_, sent_at)) => now.saturating_duration_since(sent_at),
            None => Duration::ZERO,
        };
        self.report.echoed = self.report.echoed.saturating_add(1);
        self.report.total_round_trip = self.report.total_round_trip.saturating_add(round_trip);
        self.report.max_round_trip = self.report.max_round_trip.max(round_trip);

        EchoMatch::Matched {
            round_trip,
            skipped,
        }
    }

    /// Counts probes older than `timeout` as lost and returns how many expired.
    pub fn expire(&mut self, now: TInstant, timeout: Duration) -> u32 {
        let mut expired = 0u32;
        while let Some((_, sent_at)) = self.outstanding.front() {
            if now.saturating_duration_since(*sent_at) < timeout {
                break;
            }
            self.outstanding.pop_front();
            expired += 1;
        }
        self.report.lost = self.report.lost.saturating_add(expired);
        expired
    }
}

impl<TInstant, const WINDOW: usize> Default for EchoProbe<TInstant, WINDOW>
where
    TInstant: Monotonic,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MicrosInstant;

    fn micros(value: u64) -> MicrosInstant {
        MicrosInstant::from_micros(value)
    }

    #[test]
    fn matched_echo_reports_round_trip() {
        let mut probe = EchoProbe::<MicrosInstant, 4>::new();
        let byte = probe.next_probe(micros(100)).expect("window");

        assert_eq!(
            probe.record_echo(byte, micros(340)),
            EchoMatch::Matched {
                round_trip: Duration::from_micros(240),
                skipped: 0
            }
        );
        assert_eq!(probe.report().echoed, 1);
        assert_eq!(probe.report().mean_round_trip(), Some(Duration::from_micros(240)));
        assert!(probe.report().loss_rate() < f32::EPSILON);
    }

    #[test]
    fn skipped_probes_count_as_lost() {
        let mut probe = EchoProbe::<MicrosInstant, 4>::new();
        let _first = probe.next_probe(micros(0)).expect("window");
        let _second = probe.next_probe(micros(10)).expect("window");
        let third = probe.next_probe(micros(20)).expect("window");

        let outcome = probe.record_echo(third, micros(50));
        assert_eq!(
            outcome,
            EchoMatch::Matched {
                round_trip: Duration::from_micros(30),
                skipped: 2
            }
        );
        assert_eq!(probe.report().lost, 2);
        assert_eq!(probe.in_flight(), 0);
    }

    #[test]
    fn unknown_echo_marks_oldest_probe_corrupted() {
        let mut probe = EchoProbe::<MicrosInstant, 4>::new();
        probe.next_probe(micros(0)).expect("window");

        assert_eq!(probe.record_echo(0xEE, micros(5)), EchoMatch::Corrupted);
        assert_eq!(probe.record_echo(0xEE, micros(6)), EchoMatch::Unexpected);
        assert_eq!(probe.report().corrupted, 1);
        assert_eq!(probe.report().unexpected, 1);
    }

    #[test]
    fn window_limits_outstanding_probes_and_expiry_frees_it() {
        let mut probe = EchoProbe::<MicrosInstant, 2>::new();
        probe.next_probe(micros(0)).expect("window");
        probe.next_probe(micros(1)).expect("window");
        assert!(probe.next_probe(micros(2)).is_none());

        assert_eq!(probe.expire(micros(1_000), Duration::from_micros(500)), 2);
        assert_eq!(probe.report().lost, 2);
        assert!(probe.next_probe(micros(1_001)).is_some());
    }

    #[test]
    fn probe_bytes_skip_start_sentinel() {
        let mut probe = EchoProbe::<MicrosInstant, 1>::new();
        for _ in 0..600 {
            let byte = probe.next_probe(micros(0)).expect("window");
            assert_ne!(byte, START_SENTINEL);
            probe.record_echo(byte, micros(1));
        }
    }
}
