//! Telemetry event catalog and payload structures shared by firmware and host targets.
//!
//! Every spike, pulse edge, operator command, and link fault the bridge handles
//! is recorded into a fixed-size [`HistoryBuf`] ring. Event kinds encode to
//! compact numeric codes so they can be mirrored over a diagnostics channel,
//! and payloads stay `Copy` so records can be drained without allocation.

use core::{fmt, time::Duration};

use heapless::{HistoryBuf, OldestOrdered};

use crate::clock::Monotonic;
use crate::command::IgnoreReason;
use crate::link::LinkError;
use crate::muscle::{ChannelId, CommandOutcome, PressureReading, PulseTransition};
use crate::waveform::{Polarity, SpikeEvent};

/// Monotonic identifier assigned to every record.
pub type EventId = u32;

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 128;

/// Discriminated telemetry events.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TelemetryEventKind {
    SpikeEmitted(Polarity),
    PulseStarted(ChannelId),
    PulseEnded(ChannelId),
    ValveOpened(ChannelId),
    ValveClosed(ChannelId),
    PulsingEnabled(ChannelId),
    PulsingDisabled(ChannelId),
    FrequencyChanged(ChannelId),
    PressureSampled(ChannelId),
    CommandIgnored,
    EventDropped,
    StartHandshake,
    GeneratorStopped,
    Custom(u16),
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEventKind::SpikeEmitted(polarity) => write!(f, "spike {polarity}"),
            TelemetryEventKind::PulseStarted(channel) => write!(f, "pulse-started {channel}"),
            TelemetryEventKind::PulseEnded(channel) => write!(f, "pulse-ended {channel}"),
            TelemetryEventKind::ValveOpened(channel) => write!(f, "valve-opened {channel}"),
            TelemetryEventKind::ValveClosed(channel) => write!(f, "valve-closed {channel}"),
            TelemetryEventKind::PulsingEnabled(channel) => write!(f, "pulsing-enabled {channel}"),
            TelemetryEventKind::PulsingDisabled(channel) => {
                write!(f, "pulsing-disabled {channel}")
            }
            TelemetryEventKind::FrequencyChanged(channel) => {
                write!(f, "frequency-changed {channel}")
            }
            TelemetryEventKind::PressureSampled(channel) => {
                write!(f, "pressure-sampled {channel}")
            }
            TelemetryEventKind::CommandIgnored => f.write_str("command-ignored"),
            TelemetryEventKind::EventDropped => f.write_str("event-dropped"),
            TelemetryEventKind::StartHandshake => f.write_str("start-handshake"),
            TelemetryEventKind::GeneratorStopped => f.write_str("generator-stopped"),
            TelemetryEventKind::Custom(code) => write!(f, "custom({code})"),
        }
    }
}

impl TelemetryEventKind {
    const SPIKE_BASE: u16 = 0x0000;
    const COMMAND_IGNORED_CODE: u16 = 0x0008;
    const EVENT_DROPPED_CODE: u16 = 0x0009;
    const START_HANDSHAKE_CODE: u16 = 0x000A;
    const GENERATOR_STOPPED_CODE: u16 = 0x000B;
    const PULSE_STARTED_BASE: u16 = 0x0100;
    const PULSE_ENDED_BASE: u16 = 0x0200;
    const VALVE_OPENED_BASE: u16 = 0x0300;
    const VALVE_CLOSED_BASE: u16 = 0x0400;
    const PULSING_ENABLED_BASE: u16 = 0x0500;
    const PULSING_DISABLED_BASE: u16 = 0x0600;
    const FREQUENCY_CHANGED_BASE: u16 = 0x0700;
    const PRESSURE_SAMPLED_BASE: u16 = 0x0800;
    const CHANNEL_BLOCK_END: u16 = 0x0900;

    /// Encodes the event into a compact transport-friendly discriminant.
    ///
    /// Channel events carry the channel index in the low byte.
    #[must_use]
    pub fn to_raw(self) -> u16 {
        match self {
            TelemetryEventKind::SpikeEmitted(polarity) => {
                Self::SPIKE_BASE + u16::from(polarity.to_byte())
            }
            TelemetryEventKind::PulseStarted(channel) => {
                Self::PULSE_STARTED_BASE + channel_index(channel)
            }
            TelemetryEventKind::PulseEnded(channel) => {
                Self::PULSE_ENDED_BASE + channel_index(channel)
            }
            TelemetryEventKind::ValveOpened(channel) => {
                Self::VALVE_OPENED_BASE + channel_index(channel)
            }
            TelemetryEventKind::ValveClosed(channel) => {
                Self::VALVE_CLOSED_BASE + channel_index(channel)
            }
            TelemetryEventKind::PulsingEnabled(channel) => {
                Self::PULSING_ENABLED_BASE + channel_index(channel)
            }
            TelemetryEventKind::PulsingDisabled(channel) => {
                Self::PULSING_DISABLED_BASE + channel_index(channel)
            }
            TelemetryEventKind::FrequencyChanged(channel) => {
                Self::FREQUENCY_CHANGED_BASE + channel_index(channel)
            }
            TelemetryEventKind::PressureSampled(channel) => {
                Self::PRESSURE_SAMPLED_BASE + channel_index(channel)
            }
            TelemetryEventKind::CommandIgnored => Self::COMMAND_IGNORED_CODE,
            TelemetryEventKind::EventDropped => Self::EVENT_DROPPED_CODE,
            TelemetryEventKind::StartHandshake => Self::START_HANDSHAKE_CODE,
            TelemetryEventKind::GeneratorStopped => Self::GENERATOR_STOPPED_CODE,
            TelemetryEventKind::Custom(code) => code,
        }
    }

    /// Decodes a raw discriminant, falling back to [`TelemetryEventKind::Custom`].
    #[must_use]
    pub fn from_raw(code: u16) -> Self {
        match code {
            Self::COMMAND_IGNORED_CODE => TelemetryEventKind::CommandIgnored,
            Self::EVENT_DROPPED_CODE => TelemetryEventKind::EventDropped,
            Self::START_HANDSHAKE_CODE => TelemetryEventKind::StartHandshake,
            Self::GENERATOR_STOPPED_CODE => TelemetryEventKind::GeneratorStopped,
            value if value < Self::COMMAND_IGNORED_CODE => {
                let byte = u8::try_from(value - Self::SPIKE_BASE).unwrap_or(u8::MAX);
                Polarity::from_byte(byte).map_or(TelemetryEventKind::Custom(value), |polarity| {
                    TelemetryEventKind::SpikeEmitted(polarity)
                })
            }
            value if (Self::PULSE_STARTED_BASE..Self::CHANNEL_BLOCK_END).contains(&value) => {
                let [block, index] = value.to_be_bytes();
                let channel = ChannelId(index);
                match u16::from(block) << 8 {
                    Self::PULSE_STARTED_BASE => TelemetryEventKind::PulseStarted(channel),
                    Self::PULSE_ENDED_BASE => TelemetryEventKind::PulseEnded(channel),
                    Self::VALVE_OPENED_BASE => TelemetryEventKind::ValveOpened(channel),
                    Self::VALVE_CLOSED_BASE => TelemetryEventKind::ValveClosed(channel),
                    Self::PULSING_ENABLED_BASE => TelemetryEventKind::PulsingEnabled(channel),
                    Self::PULSING_DISABLED_BASE => TelemetryEventKind::PulsingDisabled(channel),
                    Self::FREQUENCY_CHANGED_BASE => TelemetryEventKind::FrequencyChanged(channel),
                    Self::PRESSURE_SAMPLED_BASE => TelemetryEventKind::PressureSampled(channel),
                    _ => TelemetryEventKind::Custom(value),
                }
            }
            other => TelemetryEventKind::Custom(other),
        }
    }
}

/// Payloads carried alongside telemetry events.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TelemetryPayload {
    /// No additional metadata accompanies the event.
    None,
    Spike(SpikeTelemetry),
    Pulse(PulseTelemetry),
    Frequency(FrequencyTelemetry),
    Ignored(IgnoreReason),
    Fault(LinkFaultTelemetry),
    Handshake(HandshakeTelemetry),
    Pressure(PressureTelemetry),
}

impl TelemetryPayload {
    /// Convenience constructor when no payload data is needed.
    #[must_use]
    pub const fn none() -> Self {
        TelemetryPayload::None
    }
}

/// Spike payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SpikeTelemetry {
    pub byte: u8,
    /// Threshold index under the threshold-crossing policy.
    pub step_index: Option<u8>,
    pub elapsed_since_previous: Option<Duration>,
}

/// Pulse edge payload. `held_for` is the on-time of a pulse that just ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PulseTelemetry {
    pub channel: ChannelId,
    pub held_for: Option<Duration>,
}

/// Frequency change payload. Frequencies are stored in millihertz to keep the
/// record `Eq`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FrequencyTelemetry {
    pub millihertz: u32,
    pub peers_updated: u8,
}

impl FrequencyTelemetry {
    #[must_use]
    pub fn new(frequency_hz: f32, peers_updated: u8) -> Self {
        Self {
            millihertz: to_millihertz(frequency_hz),
            peers_updated,
        }
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn frequency_hz(&self) -> f32 {
        self.millihertz as f32 / 1_000.0
    }
}

/// Outgoing-link fault classes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LinkFaultKind {
    FlowControlTimeout,
    Unavailable,
    Transport,
}

impl<E> From<&LinkError<E>> for LinkFaultKind {
    fn from(value: &LinkError<E>) -> Self {
        match value {
            LinkError::FlowControlTimeout => LinkFaultKind::FlowControlTimeout,
            LinkError::Unavailable(_) => LinkFaultKind::Unavailable,
            LinkError::NoDataAvailable | LinkError::Other(_) => LinkFaultKind::Transport,
        }
    }
}

/// Dropped-event payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LinkFaultTelemetry {
    pub fault: LinkFaultKind,
    pub byte: u8,
    pub dropped_total: u32,
}

/// Pressure sample payload in thousandths of a raw ADC count, keeping the
/// record `Eq`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PressureTelemetry {
    pub average_milli: i32,
    pub gradient_milli: i32,
}

impl PressureTelemetry {
    #[must_use]
    pub fn new(reading: PressureReading) -> Self {
        Self {
            average_milli: to_milli(reading.now),
            gradient_milli: to_milli(reading.gradient),
        }
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average(&self) -> f32 {
        self.average_milli as f32 / 1_000.0
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn gradient(&self) -> f32 {
        self.gradient_milli as f32 / 1_000.0
    }
}

/// Start handshake payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HandshakeTelemetry {
    /// Bytes discarded while waiting for the sentinel.
    pub discarded: u32,
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TelemetryRecord<TInstant>
where
    TInstant: Copy,
{
    pub id: EventId,
    pub timestamp: TInstant,
    pub event: TelemetryEventKind,
    pub details: TelemetryPayload,
}

/// Telemetry ring buffer type alias.
pub type TelemetryRing<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY> =
    HistoryBuf<TelemetryRecord<TInstant>, CAPACITY>;

/// Records telemetry events into a fixed-size ring buffer.
pub struct TelemetryRecorder<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY>
where
    TInstant: Copy,
{
    ring: TelemetryRing<TInstant, CAPACITY>,
    last_spike_at: Option<TInstant>,
    next_event_id: EventId,
}

impl<TInstant, const CAPACITY: usize> TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: Monotonic,
{
    /// Creates a new telemetry recorder with an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            last_spike_at: None,
            next_event_id: 0,
        }
    }

    /// Returns an iterator over the recorded telemetry in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, TelemetryRecord<TInstant>> {
        self.ring.oldest_ordered()
    }

    /// Returns the most recent telemetry record, if available.
    #[must_use]
    pub fn latest(&self) -> Option<&TelemetryRecord<TInstant>> {
        self.ring.recent()
    }

    /// Returns the number of records currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns `true` when no telemetry records are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Records with an id at or after `first`, oldest first.
    ///
    /// Ids wrap, so `first` must be within half the id space of the newest record.
    pub fn records_since(
        &self,
        first: EventId,
    ) -> impl Iterator<Item = &TelemetryRecord<TInstant>> {
        self.oldest_first()
            .filter(move |record| record.id.wrapping_sub(first) < EventId::MAX / 2)
    }

    /// Identifier the next record will receive.
    #[must_use]
    pub const fn next_event_id(&self) -> EventId {
        self.next_event_id
    }

    /// Records an emitted spike and the gap since the previous one.
    pub fn record_spike(
        &mut self,
        event: &SpikeEvent<TInstant>,
        step_index: Option<u8>,
    ) -> EventId {
        let elapsed = self
            .last_spike_at
            .map(|previous| event.emitted_at.saturating_duration_since(previous));
        self.last_spike_at = Some(event.emitted_at);

        let payload = TelemetryPayload::Spike(SpikeTelemetry {
            byte: event.to_byte(),
            step_index,
            elapsed_since_previous: elapsed,
        });
        self.record(
            TelemetryEventKind::SpikeEmitted(event.polarity),
            payload,
            event.emitted_at,
        )
    }

    /// Records a pulse edge. `started_at` is used to report the on-time of an ending pulse.
    pub fn record_pulse(
        &mut self,
        channel: ChannelId,
        transition: PulseTransition,
        started_at: Option<TInstant>,
        timestamp: TInstant,
    ) -> EventId {
        let (event, held_for) = match transition {
            PulseTransition::Started => (TelemetryEventKind::PulseStarted(channel), None),
            PulseTransition::Ended => (
                TelemetryEventKind::PulseEnded(channel),
                started_at.map(|start| timestamp.saturating_duration_since(start)),
            ),
        };

        self.record(
            event,
            TelemetryPayload::Pulse(PulseTelemetry { channel, held_for }),
            timestamp,
        )
    }

    /// Records the effect of an operator command on `channel`.
    pub fn record_command(
        &mut self,
        channel: ChannelId,
        outcome: CommandOutcome,
        peers_updated: u8,
        timestamp: TInstant,
    ) -> EventId {
        let (event, payload) = match outcome {
            CommandOutcome::ValveOpened => (
                TelemetryEventKind::ValveOpened(channel),
                TelemetryPayload::None,
            ),
            CommandOutcome::ValveClosed => (
                TelemetryEventKind::ValveClosed(channel),
                TelemetryPayload::None,
            ),
            CommandOutcome::PulsingStopped => (
                TelemetryEventKind::PulsingDisabled(channel),
                TelemetryPayload::None,
            ),
            CommandOutcome::PulsingStarted => (
                TelemetryEventKind::PulsingEnabled(channel),
                TelemetryPayload::None,
            ),
            CommandOutcome::PulsingAt { frequency_hz } => (
                TelemetryEventKind::PulsingEnabled(channel),
                TelemetryPayload::Frequency(FrequencyTelemetry::new(frequency_hz, 0)),
            ),
            CommandOutcome::FrequencySet { frequency_hz } => (
                TelemetryEventKind::FrequencyChanged(channel),
                TelemetryPayload::Frequency(FrequencyTelemetry::new(frequency_hz, peers_updated)),
            ),
            CommandOutcome::Ignored(reason) => {
                return self.record_ignored(reason, timestamp);
            }
        };

        self.record(event, payload, timestamp)
    }

    /// Records input that was dropped without changing state.
    pub fn record_ignored(&mut self, reason: IgnoreReason, timestamp: TInstant) -> EventId {
        self.record(
            TelemetryEventKind::CommandIgnored,
            TelemetryPayload::Ignored(reason),
            timestamp,
        )
    }

    /// Records a spike byte the link refused.
    pub fn record_dropped<E>(
        &mut self,
        error: &LinkError<E>,
        byte: u8,
        dropped_total: u32,
        timestamp: TInstant,
    ) -> EventId {
        let payload = TelemetryPayload::Fault(LinkFaultTelemetry {
            fault: LinkFaultKind::from(error),
            byte,
            dropped_total,
        });
        self.record(TelemetryEventKind::EventDropped, payload, timestamp)
    }

    /// Records an averaged pressure sample and its gradient.
    pub fn record_pressure(
        &mut self,
        channel: ChannelId,
        reading: PressureReading,
        timestamp: TInstant,
    ) -> EventId {
        self.record(
            TelemetryEventKind::PressureSampled(channel),
            TelemetryPayload::Pressure(PressureTelemetry::new(reading)),
            timestamp,
        )
    }

    /// Records receipt of the start sentinel.
    pub fn record_handshake(&mut self, discarded: u32, timestamp: TInstant) -> EventId {
        self.record(
            TelemetryEventKind::StartHandshake,
            TelemetryPayload::Handshake(HandshakeTelemetry { discarded }),
            timestamp,
        )
    }

    /// Records an arbitrary telemetry event with the supplied payload.
    pub fn record(
        &mut self,
        event: TelemetryEventKind,
        payload: TelemetryPayload,
        timestamp: TInstant,
    ) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(TelemetryRecord {
            id,
            timestamp,
            event,
            details: payload,
        });

        id
    }
}

impl<TInstant, const CAPACITY: usize> Default for TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: Monotonic,
{
    fn default() -> Self {
        Self::new()
    }
}

fn channel_index(channel: ChannelId) -> u16 {
    u16::from(channel.0)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_millihertz(frequency_hz: f32) -> u32 {
    let scaled = libm::roundf(frequency_hz * 1_000.0);
    if scaled <= 0.0 {
        0
    } else if scaled >= 4_294_967_040.0 {
        u32::MAX
    } else {
        scaled as u32
    }
}

#[allow(clippy::cast_possible_truncation)]
fn to_milli(value: f32) -> i32 {
    let scaled = libm::roundf(value * 1_000.0);
    if scaled.is_nan() {
        0
    } else if scaled <= -2_147_483_648.0 {
        i32::MIN
    } else if scaled >= 2_147_483_520.0 {
        i32::MAX
    } else {
        scaled as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MicrosInstant;
    use crate::link::UnavailableReason;

    fn micros(value: u64) -> MicrosInstant {
        MicrosInstant::from_micros(value)
    }

    #[test]
    fn event_kind_round_trip() {
        let fixtures = [
            TelemetryEventKind::SpikeEmitted(Polarity::Positive),
            TelemetryEventKind::SpikeEmitted(Polarity::Negative),
            TelemetryEventKind::PulseStarted(ChannelId(0)),
            TelemetryEventKind::PulseEnded(ChannelId(1)),
            TelemetryEventKind::ValveOpened(ChannelId(2)),
            TelemetryEventKind::ValveClosed(ChannelId(0)),
            TelemetryEventKind::PulsingEnabled(ChannelId(1)),
            TelemetryEventKind::PulsingDisabled(ChannelId(1)),
            TelemetryEventKind::FrequencyChanged(ChannelId(3)),
            TelemetryEventKind::PressureSampled(ChannelId(1)),
            TelemetryEventKind::CommandIgnored,
            TelemetryEventKind::EventDropped,
            TelemetryEventKind::StartHandshake,
            TelemetryEventKind::GeneratorStopped,
        ];

        for kind in fixtures {
            assert_eq!(TelemetryEventKind::from_raw(kind.to_raw()), kind);
        }
        assert_eq!(
            TelemetryEventKind::from_raw(0x0005),
            TelemetryEventKind::Custom(0x0005)
        );
        assert_eq!(
            TelemetryEventKind::from_raw(0x0900),
            TelemetryEventKind::Custom(0x0900)
        );
    }

    #[test]
    fn records_elapsed_between_spikes() {
        let mut recorder = TelemetryRecorder::<MicrosInstant>::new();

        let first = SpikeEvent {
            polarity: Polarity::Positive,
            emitted_at: micros(100),
        };
        assert_eq!(recorder.record_spike(&first, None), 0);
        match recorder.latest().copied().expect("record").details {
            TelemetryPayload::Spike(details) => {
                assert_eq!(details.byte, 0x00);
                assert_eq!(details.elapsed_since_previous, None);
            }
            _ => panic!("expected spike payload"),
        }

        let second = SpikeEvent {
            polarity: Polarity::Negative,
            emitted_at: micros(250),
        };
        assert_eq!(recorder.record_spike(&second, Some(2)), 1);
        let record = recorder.latest().copied().expect("record");
        assert_eq!(
            record.event,
            TelemetryEventKind::SpikeEmitted(Polarity::Negative)
        );
        match record.details {
            TelemetryPayload::Spike(details) => {
                assert_eq!(details.byte, 0x01);
                assert_eq!(details.step_index, Some(2));
                let elapsed = details.elapsed_since_previous.expect("missing elapsed");
                assert_eq!(elapsed.as_micros(), 150);
            }
            _ => panic!("expected spike payload"),
        }
    }

    #[test]
    fn pulse_end_reports_on_time() {
        let mut recorder = TelemetryRecorder::<MicrosInstant>::new();
        recorder.record_pulse(
            ChannelId(1),
            PulseTransition::Ended,
            Some(micros(1_000)),
            micros(9_000),
        );

        let record = recorder.latest().copied().expect("record");
        assert_eq!(record.event, TelemetryEventKind::PulseEnded(ChannelId(1)));
        match record.details {
            TelemetryPayload::Pulse(details) => {
                assert_eq!(details.held_for, Some(Duration::from_millis(8)));
            }
            _ => panic!("expected pulse payload"),
        }
    }

    #[test]
    fn frequency_change_is_stored_in_millihertz() {
        let mut recorder = TelemetryRecorder::<MicrosInstant>::new();
        recorder.record_command(
            ChannelId(0),
            CommandOutcome::FrequencySet { frequency_hz: 45.0 },
            1,
            micros(5),
        );

        let record = recorder.latest().copied().expect("record");
        assert_eq!(
            record.event,
            TelemetryEventKind::FrequencyChanged(ChannelId(0))
        );
        match record.details {
            TelemetryPayload::Frequency(details) => {
                assert_eq!(details.millihertz, 45_000);
                assert_eq!(details.peers_updated, 1);
                assert!(libm::fabsf(details.frequency_hz() - 45.0) < f32::EPSILON);
            }
            _ => panic!("expected frequency payload"),
        }
    }

    #[test]
    fn ignored_outcome_records_reason() {
        let mut recorder = TelemetryRecorder::<MicrosInstant>::new();
        recorder.record_command(
            ChannelId(0),
            CommandOutcome::Ignored(IgnoreReason::NonPositiveFrequency),
            0,
            micros(5),
        );

        let record = recorder.latest().copied().expect("record");
        assert_eq!(record.event, TelemetryEventKind::CommandIgnored);
        assert_eq!(
            record.details,
            TelemetryPayload::Ignored(IgnoreReason::NonPositiveFrequency)
        );
    }

    #[test]
    fn dropped_event_classifies_link_error() {
        let mut recorder = TelemetryRecorder::<MicrosInstant>::new();
        let error: LinkError<()> = LinkError::Unavailable(UnavailableReason::DeviceBusy);
        recorder.record_dropped(&error, 0x01, 3, micros(7));

        match recorder.latest().copied().expect("record").details {
            TelemetryPayload::Fault(details) => {
                assert_eq!(details.fault, LinkFaultKind::Unavailable);
                assert_eq!(details.byte, 0x01);
                assert_eq!(details.dropped_total, 3);
            }
            _ => panic!("expected fault payload"),
        }
    }

    #[test]
    fn pressure_sample_keeps_signed_gradient() {
        let mut recorder = TelemetryRecorder::<MicrosInstant>::new();
        let reading = PressureReading {
            now: 1_200.25,
            previous: 1_250.5,
            gradient: -50.25,
        };
        recorder.record_pressure(ChannelId(1), reading, micros(40));

        let record = recorder.latest().copied().expect("record");
        assert_eq!(record.event, TelemetryEventKind::PressureSampled(ChannelId(1)));
        match record.details {
            TelemetryPayload::Pressure(details) => {
                assert_eq!(details.average_milli, 1_200_250);
                assert_eq!(details.gradient_milli, -50_250);
                assert!(libm::fabsf(details.gradient() + 50.25) < 1.0e-3);
            }
            _ => panic!("expected pressure payload"),
        }
    }

    #[test]
    fn ring_keeps_most_recent_records_in_order() {
        let mut recorder = TelemetryRecorder::<MicrosInstant, 4>::new();
        for step in 0..6u64 {
            recorder.record(
                TelemetryEventKind::Custom(0x7000),
                TelemetryPayload::none(),
                micros(step),
            );
        }

        assert_eq!(recorder.len(), 4);
        assert_eq!(recorder.next_event_id(), 6);
        let ids: heapless::Vec<EventId, 4> =
            recorder.oldest_first().map(|record| record.id).collect();
        assert_eq!(ids.as_slice(), &[2, 3, 4, 5]);

        let tail: heapless::Vec<EventId, 4> =
            recorder.records_since(4).map(|record| record.id).collect();
        assert_eq!(tail.as_slice(), &[4, 5]);
    }
}
