//! Fixed-cadence orchestration of generator, link, and muscle channels.
//!
//! One [`Bridge::tick`] call per timer period runs, in order:
//!
//! 1. drain inbound bytes, bounded by the `bytes_available()` count read at tick
//!    entry and by [`BridgeConfig::drain_cap`];
//! 2. decode and dispatch muscle commands, closing stale `G` arguments;
//! 3. poll every muscle channel and, every `pressure_interval` ticks, sample
//!    pressure;
//! 4. sample the generator and write its spike byte to the link.
//!
//! Bytes beyond the cap stay queued in the link and are reported as backlog so
//! a sustained burst cannot stretch a tick. Until the start sentinel arrives
//! (when configured), inbound bytes are discarded and the generator idles.

use core::fmt;
use core::time::Duration;

use heapless::Vec;

use crate::clock::Monotonic;
use crate::command::{CommandDecoder, DEFAULT_ARGUMENT_TIMEOUT, Decoded, MuscleCommand};
use crate::link::{LinkError, START_SENTINEL, SerialLink};
use crate::muscle::{
    ChannelId, CommandOutcome, DEFAULT_GROUP_CAPACITY, Dispatched, MuscleGroup, PressureReading,
    PressureSensor, PulseTransition, ValveDriver,
};
use crate::telemetry::{EventId, TelemetryEventKind, TelemetryPayload, TelemetryRecorder};
use crate::waveform::{EventGenerator, GeneratorState, SpikeEvent, WaveformSample};

/// Default number of inbound bytes consumed per tick.
pub const DEFAULT_DRAIN_CAP: usize = 32;

/// Default pressure sampling cadence, in ticks.
pub const DEFAULT_PRESSURE_INTERVAL: u32 = 10;

/// Command outcomes kept per [`TickReport`]. Counters stay exact beyond this.
pub const MAX_REPORTED_OUTCOMES: usize = 8;

/// What to do when a spike byte cannot be written.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum LinkFaultPolicy {
    /// Count and record the dropped event, keep running.
    #[default]
    DropEvents,
    /// Stop the bridge and surface the error.
    Halt,
}

/// Bridge tuning.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BridgeConfig {
    pub drain_cap: usize,
    pub argument_timeout: Duration,
    /// Ticks between pressure samples; `0` disables sampling.
    pub pressure_interval: u32,
    pub await_start_sentinel: bool,
    pub fault_policy: LinkFaultPolicy,
}

impl BridgeConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            drain_cap: DEFAULT_DRAIN_CAP,
            argument_timeout: DEFAULT_ARGUMENT_TIMEOUT,
            pressure_interval: DEFAULT_PRESSURE_INTERVAL,
            await_start_sentinel: true,
            fault_policy: LinkFaultPolicy::DropEvents,
        }
    }

    #[must_use]
    pub const fn with_drain_cap(mut self, drain_cap: usize) -> Self {
        self.drain_cap = drain_cap;
        self
    }

    #[must_use]
    pub const fn with_pressure_interval(mut self, ticks: u32) -> Self {
        self.pressure_interval = ticks;
        self
    }

    #[must_use]
    pub const fn with_start_sentinel(mut self, await_sentinel: bool) -> Self {
        self.await_start_sentinel = await_sentinel;
        self
    }

    #[must_use]
    pub const fn with_fault_policy(mut self, policy: LinkFaultPolicy) -> Self {
        self.fault_policy = policy;
        self
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors surfaced by [`Bridge::tick`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BridgeError<E = ()> {
    /// Reading the link failed. The bridge stays usable.
    Receive(LinkError<E>),
    /// A spike write failed under [`LinkFaultPolicy::Halt`].
    Transmit(LinkError<E>),
    /// The bridge halted on an earlier tick.
    Halted,
}

impl<E> BridgeError<E> {
    /// Maps the inner transport error type.
    pub fn map_other<F, M>(self, mapper: M) -> BridgeError<F>
    where
        M: FnOnce(E) -> F,
    {
        match self {
            BridgeError::Receive(err) => BridgeError::Receive(err.map_other(mapper)),
            BridgeError::Transmit(err) => BridgeError::Transmit(err.map_other(mapper)),
            BridgeError::Halted => BridgeError::Halted,
        }
    }
}

impl<E> fmt::Display for BridgeError<E>
where
    E: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::Receive(err) => write!(f, "receive failed: {err}"),
            BridgeError::Transmit(err) => write!(f, "event transmit failed: {err}"),
            BridgeError::Halted => f.write_str("bridge halted"),
        }
    }
}

/// Lifecycle of the exchange.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BridgePhase {
    /// Discarding inbound bytes until [`START_SENTINEL`].
    AwaitingStart { discarded: u32 },
    Running,
    Halted,
}

/// Running totals since construction.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct BridgeStats {
    pub ticks: u64,
    pub bytes_drained: u64,
    pub events_sent: u32,
    pub events_dropped: u32,
    pub commands_applied: u32,
    pub commands_ignored: u32,
}

/// Everything that happened during one tick.
#[derive(Clone, Debug, PartialEq)]
pub struct TickReport<TInstant, const N: usize = DEFAULT_GROUP_CAPACITY>
where
    TInstant: Copy,
{
    pub timestamp: TInstant,
    pub drained: usize,
    /// Bytes known to be waiting that this tick did not consume.
    pub backlog: usize,
    pub handshake: bool,
    pub outcomes: Vec<Dispatched, MAX_REPORTED_OUTCOMES>,
    pub transitions: Vec<(ChannelId, PulseTransition), N>,
    pub pressure: Option<Vec<(ChannelId, PressureReading), N>>,
    pub sample: Option<WaveformSample<TInstant>>,
    pub event: Option<SpikeEvent<TInstant>>,
    pub event_sent: bool,
    pub generator_stopped: bool,
}

impl<TInstant, const N: usize> TickReport<TInstant, N>
where
    TInstant: Copy,
{
    fn new(timestamp: TInstant) -> Self {
        Self {
            timestamp,
            drained: 0,
            backlog: 0,
            handshake: false,
            outcomes: Vec::new(),
            transitions: Vec::new(),
            pressure: None,
            sample: None,
            event: None,
            event_sent: false,
            generator_stopped: false,
        }
    }
}

/// Owns one link endpoint, the spike generator, and the local muscle group.
pub struct Bridge<'s, L, V, P, TInstant, const N: usize = DEFAULT_GROUP_CAPACITY>
where
    TInstant: Copy,
{
    link: L,
    generator: EventGenerator<'s, TInstant>,
    muscles: MuscleGroup<V, P, TInstant, N>,
    decoder: CommandDecoder<TInstant>,
    telemetry: TelemetryRecorder<TInstant>,
    config: BridgeConfig,
    phase: BridgePhase,
    muscles_started: bool,
    stop_recorded: bool,
    stats: BridgeStats,
}

impl<'s, L, V, P, TInstant, const N: usize> Bridge<'s, L, V, P, TInstant, N>
where
    L: SerialLink,
    V: ValveDriver,
    P: PressureSensor,
    TInstant: Monotonic,
{
    #[must_use]
    pub fn new(
        link: L,
        generator: EventGenerator<'s, TInstant>,
        muscles: MuscleGroup<V, P, TInstant, N>,
        config: BridgeConfig,
    ) -> Self {
        let phase = if config.await_start_sentinel {
            BridgePhase::AwaitingStart { discarded: 0 }
        } else {
            BridgePhase::Running
        };

        Self {
            link,
            generator,
            muscles,
            decoder: CommandDecoder::new(config.argument_timeout),
            telemetry: TelemetryRecorder::new(),
            config,
            phase,
            muscles_started: false,
            stop_recorded: false,
            stats: BridgeStats::default(),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &BridgeConfig {
        &self.config
    }

    #[must_use]
    pub const fn phase(&self) -> BridgePhase {
        self.phase
    }

    #[must_use]
    pub const fn stats(&self) -> &BridgeStats {
        &self.stats
    }

    #[must_use]
    pub const fn generator(&self) -> &EventGenerator<'s, TInstant> {
        &self.generator
    }

    #[must_use]
    pub const fn muscles(&self) -> &MuscleGroup<V, P, TInstant, N> {
        &self.muscles
    }

    pub fn muscles_mut(&mut self) -> &mut MuscleGroup<V, P, TInstant, N> {
        &mut self.muscles
    }

    #[must_use]
    pub const fn telemetry(&self) -> &TelemetryRecorder<TInstant> {
        &self.telemetry
    }

    #[must_use]
    pub const fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Releases the owned parts, e.g. to reuse the link afterwards.
    pub fn into_parts(
        self,
    ) -> (
        L,
        EventGenerator<'s, TInstant>,
        MuscleGroup<V, P, TInstant, N>,
    ) {
        (self.link, self.generator, self.muscles)
    }

    /// Runs one scheduling period at `now`.
    pub fn tick(
        &mut self,
        now: TInstant,
    ) -> Result<TickReport<TInstant, N>, BridgeError<L::Error>> {
        if self.phase == BridgePhase::Halted {
            return Err(BridgeError::Halted);
        }

        self.stats.ticks = self.stats.ticks.saturating_add(1);
        if !self.muscles_started {
            self.muscles.begin(now);
            self.muscles_started = true;
        }

        let mut report = TickReport::new(now);
        self.drain(now, &mut report)?;

        if let Some(decoded) = self.decoder.poll_timeout(now) {
            self.apply(decoded, now, &mut report);
        }

        self.poll_muscles(now, &mut report);
        self.sample_generator(now, &mut report)?;

        Ok(report)
    }

    fn drain(
        &mut self,
        now: TInstant,
        report: &mut TickReport<TInstant, N>,
    ) -> Result<(), BridgeError<L::Error>> {
        let available = match self.link.bytes_available() {
            Ok(count) => count,
            Err(err) if err.is_no_data() => 0,
            Err(err) => return Err(BridgeError::Receive(err)),
        };

        let budget = available.min(self.config.drain_cap);
        for _ in 0..budget {
            let byte = match self.link.read_byte() {
                Ok(byte) => byte,
                Err(err) if err.is_no_data() => break,
                Err(err) => {
                    report.backlog = available.saturating_sub(report.drained);
                    return Err(BridgeError::Receive(err));
                }
            };
            report.drained += 1;
            self.handle_byte(byte, now, report);
        }

        report.backlog = available.saturating_sub(report.drained);
        self.stats.bytes_drained = self
            .stats
            .bytes_drained
            .saturating_add(u64::try_from(report.drained).unwrap_or(u64::MAX));
        Ok(())
    }

    fn handle_byte(&mut self, byte: u8, now: TInstant, report: &mut TickReport<TInstant, N>) {
        if let BridgePhase::AwaitingStart { discarded } = self.phase {
            if byte == START_SENTINEL {
                self.phase = BridgePhase::Running;
                self.generator.begin(now);
                self.telemetry.record_handshake(discarded, now);
                report.handshake = true;
            } else {
                self.phase = BridgePhase::AwaitingStart {
                    discarded: discarded.saturating_add(1),
                };
            }
            return;
        }

        for decoded in self.decoder.push(byte, now) {
            self.apply(decoded, now, report);
        }
    }

    fn apply(&mut self, decoded: Decoded, now: TInstant, report: &mut TickReport<TInstant, N>) {
        let dispatched = match decoded {
            Decoded::Command(command) => self.dispatch(command, now),
            Decoded::Ignored(reason) => {
                self.telemetry.record_ignored(reason, now);
                Dispatched {
                    channel: None,
                    outcome: CommandOutcome::Ignored(reason),
                    peers_updated: 0,
                }
            }
        };

        if dispatched.outcome.is_ignored() {
            self.stats.commands_ignored = self.stats.commands_ignored.saturating_add(1);
        } else {
            self.stats.commands_applied = self.stats.commands_applied.saturating_add(1);
        }
        let _ = report.outcomes.push(dispatched);
    }

    fn dispatch(&mut self, command: MuscleCommand, now: TInstant) -> Dispatched {
        let dispatched = self.muscles.dispatch(command, now);
        match (dispatched.channel, dispatched.outcome) {
            (Some(channel), outcome) => {
                self.telemetry
                    .record_command(channel, outcome, dispatched.peers_updated, now);
            }
            (None, CommandOutcome::Ignored(reason)) => {
                self.telemetry.record_ignored(reason, now);
            }
            (None, _) => {}
        }
        dispatched
    }

    fn poll_muscles(&mut self, now: TInstant, report: &mut TickReport<TInstant, N>) {
        report.transitions = self.muscles.poll(now);
        for &(channel, transition) in &report.transitions {
            let started_at = self
                .muscles
                .channel(channel)
                .and_then(|muscle| muscle.when_pulse_started());
            self.telemetry
                .record_pulse(channel, transition, started_at, now);
        }

        let interval = u64::from(self.config.pressure_interval);
        if interval != 0 && self.stats.ticks % interval == 0 {
            let readings = self.muscles.update_pressure();
            for &(channel, reading) in &readings {
                self.telemetry.record_pressure(channel, reading, now);
            }
            report.pressure = Some(readings);
        }
    }

    fn sample_generator(
        &mut self,
        now: TInstant,
        report: &mut TickReport<TInstant, N>,
    ) -> Result<(), BridgeError<L::Error>> {
        if self.phase != BridgePhase::Running {
            return Ok(());
        }
        if self.generator.state() == GeneratorState::Idle {
            self.generator.begin(now);
        }

        let Some(outcome) = self.generator.tick(now) else {
            if self.generator.state() == GeneratorState::Stopped && !self.stop_recorded {
                self.stop_recorded = true;
                self.telemetry.record(
                    TelemetryEventKind::GeneratorStopped,
                    TelemetryPayload::none(),
                    now,
                );
                report.generator_stopped = true;
            }
            return Ok(());
        };

        report.sample = Some(outcome.sample());
        let Some(event) = outcome.event else {
            return Ok(());
        };
        report.event = Some(event);
        self.telemetry
            .record_spike(&event, outcome.crossing.map(|crossing| crossing.index));

        match self.link.write_byte(event.to_byte()) {
            Ok(()) => {
                self.stats.events_sent = self.stats.events_sent.saturating_add(1);
                report.event_sent = true;
                Ok(())
            }
            Err(err) => {
                self.stats.events_dropped = self.stats.events_dropped.saturating_add(1);
                self.telemetry
                    .record_dropped(&err, event.to_byte(), self.stats.events_dropped, now);
                match self.config.fault_policy {
                    LinkFaultPolicy::DropEvents => Ok(()),
                    LinkFaultPolicy::Halt => {
                        self.phase = BridgePhase::Halted;
                        Err(BridgeError::Transmit(err))
                    }
                }
            }
        }
    }

    /// Identifier of the most recent telemetry record, if any.
    #[must_use]
    pub fn last_event_id(&self) -> Option<EventId> {
        self.telemetry.latest().map(|record| record.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;

    use crate::clock::MicrosInstant;
    use crate::link::LinkCounters;
    use crate::muscle::{MuscleChannel, MuscleConfig, NoopPressureSensor, NoopValve, PulseState};
    use crate::waveform::{EmissionPolicy, Polarity, StopSignal, WaveformParams};

    /// Link with a scripted inbound queue that records every written byte.
    struct ScriptedLink {
        inbound: heapless::Deque<u8, 128>,
        written: Vec<u8, 512>,
        accept_writes: bool,
        counters: LinkCounters,
    }

    impl ScriptedLink {
        fn new() -> Self {
            Self {
                inbound: heapless::Deque::new(),
                written: Vec::new(),
                accept_writes: true,
                counters: LinkCounters::new(),
            }
        }

        fn feed(&mut self, bytes: &[u8]) {
            for &byte in bytes {
                self.inbound.push_back(byte).expect("inbound capacity");
            }
        }
    }

    impl SerialLink for ScriptedLink {
        type Error = Infallible;

        fn write_byte(&mut self, byte: u8) -> Result<(), LinkError<Self::Error>> {
            if !self.accept_writes {
                return Err(LinkError::FlowControlTimeout);
            }
            self.written.push(byte).expect("write capacity");
            self.counters.record_written(1);
            Ok(())
        }

        fn bytes_available(&mut self) -> Result<usize, LinkError<Self::Error>> {
            Ok(self.inbound.len())
        }

        fn read_byte(&mut self) -> Result<u8, LinkError<Self::Error>> {
            let byte = self.inbound.pop_front().ok_or(LinkError::NoDataAvailable)?;
            self.counters.record_read(1);
            Ok(byte)
        }

        fn counters(&self) -> LinkCounters {
            self.counters
        }
    }

    type TestBridge<'s> = Bridge<'s, ScriptedLink, NoopValve, NoopPressureSensor, MicrosInstant>;

    fn millis(value: u64) -> MicrosInstant {
        MicrosInstant::from_millis(value)
    }

    fn muscles() -> MuscleGroup<NoopValve, NoopPressureSensor, MicrosInstant> {
        let mut group = MuscleGroup::new();
        for name in ["left", "right"] {
            let channel =
                MuscleChannel::new(name, NoopValve, NoopPressureSensor, MuscleConfig::default())
                    .expect("default muscle config");
            group.push(channel).expect("group capacity");
        }
        group
    }

    fn bridge(stop: &StopSignal, config: BridgeConfig) -> TestBridge<'_> {
        let generator = EventGenerator::configure(
            WaveformParams::new(50.0, 1.0, 0.0, None),
            EmissionPolicy::default(),
            stop,
        )
        .expect("generator config");
        Bridge::new(ScriptedLink::new(), generator, muscles(), config)
    }

    #[test]
    fn discards_input_until_start_sentinel() {
        let stop = StopSignal::new();
        let mut bridge = bridge(&stop, BridgeConfig::new());
        bridge.link_mut().feed(b"OO");

        let report = bridge.tick(millis(1)).expect("tick");
        assert_eq!(report.drained, 2);
        assert!(report.outcomes.is_empty());
        assert!(report.sample.is_none());
        assert_eq!(bridge.phase(), BridgePhase::AwaitingStart { discarded: 2 });

        bridge.link_mut().feed(&[START_SENTINEL, b'O']);
        let report = bridge.tick(millis(2)).expect("tick");
        assert!(report.handshake);
        assert_eq!(bridge.phase(), BridgePhase::Running);
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].outcome, CommandOutcome::ValveOpened);
        assert!(report.sample.is_some());
        assert!(bridge.generator().is_running());
    }

    #[test]
    fn drain_is_capped_and_remainder_carried_over() {
        let stop = StopSignal::new();
        let config = BridgeConfig::new()
            .with_start_sentinel(false)
            .with_drain_cap(4);
        let mut bridge = bridge(&stop, config);
        bridge.link_mut().feed(b"xxxxxxxxxx");

        let first = bridge.tick(millis(1)).expect("tick");
        assert_eq!(first.drained, 4);
        assert_eq!(first.backlog, 6);

        let second = bridge.tick(millis(2)).expect("tick");
        assert_eq!(second.drained, 4);
        assert_eq!(second.backlog, 2);

        let third = bridge.tick(millis(3)).expect("tick");
        assert_eq!(third.drained, 2);
        assert_eq!(third.backlog, 0);
        assert_eq!(bridge.stats().commands_ignored, 10);
        assert_eq!(bridge.stats().bytes_drained, 10);
    }

    #[test]
    fn full_drain_leaves_no_backlog() {
        let stop = StopSignal::new();
        let mut bridge = bridge(&stop, BridgeConfig::new().with_start_sentinel(false));
        bridge.link_mut().feed(b"P");
        let report = bridge.tick(millis(1)).expect("tick");
        assert_eq!(report.drained, 1);
        assert_eq!(report.backlog, 0);
    }

    #[test]
    fn frequency_command_reaches_whole_group() {
        let stop = StopSignal::new();
        let mut bridge = bridge(&stop, BridgeConfig::new().with_start_sentinel(false));
        bridge.link_mut().feed(b"FG45\n");

        let report = bridge.tick(millis(1)).expect("tick");
        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(
            report.outcomes[1].outcome,
            CommandOutcome::FrequencySet { frequency_hz: 45.0 }
        );
        assert_eq!(report.outcomes[1].peers_updated, 1);

        for (_, channel) in bridge.muscles().iter() {
            assert!(libm::fabsf(channel.pulse_frequency_hz() - 45.0) < f32::EPSILON);
        }
        let target = bridge.muscles().channel(ChannelId(0)).expect("target");
        assert!(target.is_pulsing_enabled());
    }

    #[test]
    fn pending_argument_closes_after_timeout() {
        let stop = StopSignal::new();
        let mut bridge = bridge(&stop, BridgeConfig::new().with_start_sentinel(false));
        bridge.link_mut().feed(b"G60");
        let report = bridge.tick(millis(1)).expect("tick");
        assert!(report.outcomes.is_empty());

        let report = bridge.tick(millis(500)).expect("tick");
        assert!(report.outcomes.is_empty());

        let report = bridge.tick(millis(1_001)).expect("tick");
        assert_eq!(
            report.outcomes[0].outcome,
            CommandOutcome::FrequencySet { frequency_hz: 60.0 }
        );
    }

    #[test]
    fn spikes_are_written_and_recorded() {
        let stop = StopSignal::new();
        let mut bridge = bridge(&stop, BridgeConfig::new().with_start_sentinel(false));

        for step in 0..=500 {
            bridge.tick(millis(step)).expect("tick");
        }

        let written = bridge.link().written.len();
        assert!(written > 0);
        assert_eq!(u32::try_from(written).expect("fits"), bridge.stats().events_sent);
        let positive = Polarity::Positive.to_byte();
        assert!(bridge.link().written.iter().all(|&byte| byte == positive));
        assert!(bridge.telemetry().oldest_first().any(|record| {
            record.event == TelemetryEventKind::SpikeEmitted(Polarity::Positive)
        }));
    }

    #[test]
    fn drop_policy_keeps_running_on_write_failure() {
        let stop = StopSignal::new();
        let mut bridge = bridge(&stop, BridgeConfig::new().with_start_sentinel(false));
        bridge.link_mut().accept_writes = false;

        for step in 0..=200 {
            bridge.tick(millis(step)).expect("drop policy never fails");
        }
        assert!(bridge.stats().events_dropped > 0);
        assert_eq!(bridge.stats().events_sent, 0);
        assert_eq!(bridge.phase(), BridgePhase::Running);
    }

    #[test]
    fn halt_policy_stops_on_first_write_failure() {
        let stop = StopSignal::new();
        let config = BridgeConfig::new()
            .with_start_sentinel(false)
            .with_fault_policy(LinkFaultPolicy::Halt);
        let mut bridge = bridge(&stop, config);
        bridge.link_mut().accept_writes = false;

        let mut failure = None;
        for step in 0..=200 {
            if let Err(err) = bridge.tick(millis(step)) {
                failure = Some(err);
                break;
            }
        }

        assert_eq!(
            failure,
            Some(BridgeError::Transmit(LinkError::FlowControlTimeout))
        );
        assert_eq!(bridge.phase(), BridgePhase::Halted);
        assert_eq!(bridge.tick(millis(300)), Err(BridgeError::Halted));
    }

    #[test]
    fn stop_signal_is_observed_at_next_tick() {
        let stop = StopSignal::new();
        let mut bridge = bridge(&stop, BridgeConfig::new().with_start_sentinel(false));
        bridge.tick(millis(0)).expect("tick");

        stop.request();
        let report = bridge.tick(millis(1)).expect("tick");
        assert!(report.generator_stopped);
        assert!(report.sample.is_none());
        assert_eq!(
            bridge.telemetry().latest().map(|record| record.event),
            Some(TelemetryEventKind::GeneratorStopped)
        );
    }

    #[test]
    fn muscles_pulse_while_generator_waits() {
        let stop = StopSignal::new();
        let mut bridge = bridge(&stop, BridgeConfig::new());
        bridge.tick(millis(0)).expect("tick");
        bridge
            .muscles_mut()
            .dispatch(MuscleCommand::StartAtCurrentFrequency, millis(0));

        let mut started = false;
        for step in 1..=40 {
            let report = bridge.tick(millis(step)).expect("tick");
            started |= report
                .transitions
                .contains(&(ChannelId(0), PulseTransition::Started));
        }

        assert!(started);
        assert!(matches!(bridge.phase(), BridgePhase::AwaitingStart { .. }));
        let channel = bridge.muscles().channel(ChannelId(0)).expect("channel");
        assert_ne!(channel.state(), PulseState::Closed);
    }

    #[test]
    fn pressure_sampled_on_interval() {
        let stop = StopSignal::new();
        let config = BridgeConfig::new()
            .with_start_sentinel(false)
            .with_pressure_interval(3);
        let mut bridge = bridge(&stop, config);

        let sampled: Vec<bool, 6> = (1..=6)
            .map(|step| {
                bridge
                    .tick(millis(step))
                    .expect("tick")
                    .pressure
                    .is_some()
            })
            .collect();
        assert_eq!(sampled.as_slice(), &[false, false, true, false, false, true]);

        let sampled_at: Vec<(ChannelId, u64), 8> = bridge
            .telemetry()
            .oldest_first()
            .filter_map(|record| match record.event {
                TelemetryEventKind::PressureSampled(channel) => {
                    assert!(matches!(record.details, TelemetryPayload::Pressure(_)));
                    Some((channel, record.timestamp.as_millis()))
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            sampled_at.as_slice(),
            &[
                (ChannelId(0), 3),
                (ChannelId(1), 3),
                (ChannelId(0), 6),
                (ChannelId(1), 6),
            ]
        );
    }
}
