//! Pneumatic muscle channel state machine and channel group.
//!
//! Each channel drives one solenoid valve and samples one pressure sensor. The
//! pulse schedule is a fixed on-time `dt_on` plus an off-time derived from the
//! configured pulse frequency, evaluated once per [`MuscleChannel::poll`].
//!
//! Pressure sampling is independent of the pulse schedule. The gradient is
//! exposed for monitoring only and never feeds back into pulse timing.

use core::fmt;
use core::time::Duration;

use heapless::Vec;

use crate::clock::Monotonic;
use crate::command::{IgnoreReason, MuscleCommand};

/// Valve on-time used by the muscle boards.
pub const DEFAULT_PULSE_ON: Duration = Duration::from_millis(8);

/// Pulse frequency applied at power-up.
pub const DEFAULT_PULSE_FREQUENCY_HZ: f32 = 30.0;

/// Number of sensor reads averaged per pressure sample.
pub const PRESSURE_SAMPLE_COUNT: u8 = 30;

/// Channel capacity of the default group.
pub const DEFAULT_GROUP_CAPACITY: usize = 2;

/// Output that opens (energizes) or closes a valve.
pub trait ValveDriver {
    fn set_energized(&mut self, energized: bool);
}

/// Raw pressure sensor input.
pub trait PressureSensor {
    /// Performs one conversion and returns the raw reading.
    fn read_raw(&mut self) -> u16;
}

/// Valve driver that discards every request. Useful for host simulations.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct NoopValve;

impl ValveDriver for NoopValve {
    fn set_energized(&mut self, _energized: bool) {}
}

/// Sensor that always reports zero.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct NoopPressureSensor;

impl PressureSensor for NoopPressureSensor {
    fn read_raw(&mut self) -> u16 {
        0
    }
}

/// Static configuration for a muscle channel.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MuscleConfig {
    pub dt_on: Duration,
    pub initial_frequency_hz: f32,
    pub pressure_samples: u8,
}

impl MuscleConfig {
    #[must_use]
    pub const fn new(dt_on: Duration, initial_frequency_hz: f32) -> Self {
        Self {
            dt_on,
            initial_frequency_hz,
            pressure_samples: PRESSURE_SAMPLE_COUNT,
        }
    }

    #[must_use]
    pub const fn with_pressure_samples(mut self, samples: u8) -> Self {
        self.pressure_samples = samples;
        self
    }

    /// Highest frequency whose period still fits the on-time.
    #[must_use]
    pub fn max_frequency_hz(&self) -> f32 {
        1.0 / self.dt_on.as_secs_f32()
    }
}

impl Default for MuscleConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PULSE_ON, DEFAULT_PULSE_FREQUENCY_HZ)
    }
}

/// Pulse schedule state.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PulseState {
    /// Valve off, no pulse in progress.
    Closed,
    /// Pulsing enabled, valve off, waiting for `dt_off`.
    PulsingOff,
    /// Pulsing enabled, valve energized, waiting for `dt_on`.
    PulsingOn,
}

impl fmt::Display for PulseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PulseState::Closed => f.write_str("closed"),
            PulseState::PulsingOff => f.write_str("pulsing-off"),
            PulseState::PulsingOn => f.write_str("pulsing-on"),
        }
    }
}

/// Edge reported by [`MuscleChannel::poll`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PulseTransition {
    Started,
    Ended,
}

/// Rejected pulse frequency.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FrequencyError {
    NonPositive,
    ExceedsDutyLimit,
}

impl fmt::Display for FrequencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrequencyError::NonPositive => f.write_str("pulse frequency must be positive"),
            FrequencyError::ExceedsDutyLimit => {
                f.write_str("pulse period shorter than the valve on-time")
            }
        }
    }
}

impl From<FrequencyError> for IgnoreReason {
    fn from(value: FrequencyError) -> Self {
        match value {
            FrequencyError::NonPositive => IgnoreReason::NonPositiveFrequency,
            FrequencyError::ExceedsDutyLimit => IgnoreReason::FrequencyAboveLimit,
        }
    }
}

/// Result of applying a command to a channel, with the operator response text
/// as its [`fmt::Display`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum CommandOutcome {
    ValveOpened,
    ValveClosed,
    PulsingStopped,
    PulsingStarted,
    PulsingAt { frequency_hz: f32 },
    FrequencySet { frequency_hz: f32 },
    Ignored(IgnoreReason),
}

impl CommandOutcome {
    #[must_use]
    pub const fn is_ignored(&self) -> bool {
        matches!(self, CommandOutcome::Ignored(_))
    }
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandOutcome::ValveOpened => f.write_str("Valve opened."),
            CommandOutcome::ValveClosed => f.write_str("Valve closed."),
            CommandOutcome::PulsingStopped => f.write_str("Pulsing stopped and valve closed."),
            CommandOutcome::PulsingStarted => f.write_str("Pulsing started."),
            CommandOutcome::PulsingAt { frequency_hz } => {
                write!(f, "Pulsing at {frequency_hz} Hz.")
            }
            CommandOutcome::FrequencySet { frequency_hz } => {
                write!(f, "Pulse frequency set to {frequency_hz} Hz.")
            }
            CommandOutcome::Ignored(reason) => write!(f, "Ignored: {reason}."),
        }
    }
}

/// Averaged pressure with the change since the previous sample.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct PressureReading {
    pub now: f32,
    pub previous: f32,
    pub gradient: f32,
}

/// One valve plus its pressure sensor.
pub struct MuscleChannel<V, P, TInstant>
where
    TInstant: Copy,
{
    name: &'static str,
    valve: V,
    sensor: P,
    config: MuscleConfig,
    state: PulseState,
    pulsing_enabled: bool,
    valve_energized: bool,
    valve_override: bool,
    frequency_hz: f32,
    dt_off: Duration,
    initial_dt_off: Duration,
    when_pulse_started: Option<TInstant>,
    when_pulse_ended: Option<TInstant>,
    pressure: PressureReading,
}

impl<V, P, TInstant> MuscleChannel<V, P, TInstant>
where
    V: ValveDriver,
    P: PressureSensor,
    TInstant: Monotonic,
{
    /// Creates a closed channel. Fails when the initial frequency is unusable.
    pub fn new(
        name: &'static str,
        valve: V,
        sensor: P,
        config: MuscleConfig,
    ) -> Result<Self, FrequencyError> {
        let dt_off = off_interval(config.dt_on, config.initial_frequency_hz)?;

        Ok(Self {
            name,
            valve,
            sensor,
            config,
            state: PulseState::Closed,
            pulsing_enabled: false,
            valve_energized: false,
            valve_override: false,
            frequency_hz: config.initial_frequency_hz,
            dt_off,
            initial_dt_off: dt_off,
            when_pulse_started: None,
            when_pulse_ended: None,
            pressure: PressureReading::default(),
        })
    }

    /// Drives the valve closed, restores the configured frequency, stamps the
    /// pulse clock, and takes a first pressure sample against a zeroed history.
    pub fn begin(&mut self, now: TInstant) -> PressureReading {
        self.drive_valve(false);
        self.state = PulseState::Closed;
        self.pulsing_enabled = false;
        self.valve_override = false;
        self.frequency_hz = self.config.initial_frequency_hz;
        self.dt_off = self.initial_dt_off;
        self.when_pulse_started = Some(now);
        self.when_pulse_ended = Some(now);
        self.pressure = PressureReading::default();
        self.update_pressure()
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub const fn config(&self) -> &MuscleConfig {
        &self.config
    }

    #[must_use]
    pub const fn state(&self) -> PulseState {
        self.state
    }

    #[must_use]
    pub const fn is_pulsing_enabled(&self) -> bool {
        self.pulsing_enabled
    }

    #[must_use]
    pub const fn is_pulse_active(&self) -> bool {
        matches!(self.state, PulseState::PulsingOn)
    }

    #[must_use]
    pub const fn valve_energized(&self) -> bool {
        self.valve_energized
    }

    /// `true` while a manual `Open` holds the valve outside the pulse schedule.
    #[must_use]
    pub const fn valve_override(&self) -> bool {
        self.valve_override
    }

    #[must_use]
    pub const fn pulse_frequency_hz(&self) -> f32 {
        self.frequency_hz
    }

    #[must_use]
    pub const fn dt_on(&self) -> Duration {
        self.config.dt_on
    }

    #[must_use]
    pub const fn dt_off(&self) -> Duration {
        self.dt_off
    }

    /// Off-time in fractional milliseconds.
    #[must_use]
    pub fn dt_off_ms(&self) -> f32 {
        self.dt_off.as_secs_f32() * 1_000.0
    }

    #[must_use]
    pub const fn when_pulse_started(&self) -> Option<TInstant> {
        self.when_pulse_started
    }

    #[must_use]
    pub const fn when_pulse_ended(&self) -> Option<TInstant> {
        self.when_pulse_ended
    }

    #[must_use]
    pub const fn pressure(&self) -> PressureReading {
        self.pressure
    }

    /// Sets the pulse frequency and recomputes `dt_off`.
    ///
    /// Leaves the channel untouched when the frequency is rejected.
    pub fn set_pulse_frequency(&mut self, frequency_hz: f32) -> Result<(), FrequencyError> {
        self.dt_off = off_interval(self.config.dt_on, frequency_hz)?;
        self.frequency_hz = frequency_hz;
        Ok(())
    }

    /// Evaluates the pulse schedule once.
    pub fn poll(&mut self, now: TInstant) -> Option<PulseTransition> {
        match self.state {
            PulseState::PulsingOn => {
                if elapsed_since(self.when_pulse_started, now) > self.config.dt_on {
                    self.end_pulse(now);
                    return Some(PulseTransition::Ended);
                }
                None
            }
            PulseState::Closed | PulseState::PulsingOff => {
                if self.pulsing_enabled && elapsed_since(self.when_pulse_ended, now) >= self.dt_off
                {
                    self.start_pulse(now);
                    return Some(PulseTransition::Started);
                }
                None
            }
        }
    }

    /// Averages the configured number of sensor reads and shifts the
    /// previous sample.
    pub fn update_pressure(&mut self) -> PressureReading {
        let samples = self.config.pressure_samples.max(1);
        let mut total = 0u32;
        for _ in 0..samples {
            total += u32::from(self.sensor.read_raw());
        }

        #[allow(clippy::cast_precision_loss)]
        let average = total as f32 / f32::from(samples);
        self.pressure = PressureReading {
            now: average,
            previous: self.pressure.now,
            gradient: average - self.pressure.now,
        };
        self.pressure
    }

    /// Applies a command to this channel only.
    ///
    /// Frequency broadcast to peers is handled by [`MuscleGroup::dispatch`].
    pub fn handle_command(&mut self, command: MuscleCommand, now: TInstant) -> CommandOutcome {
        match command {
            MuscleCommand::Open => {
                self.valve_override = true;
                self.drive_valve(true);
                CommandOutcome::ValveOpened
            }
            MuscleCommand::Close => {
                self.valve_override = false;
                if self.is_pulse_active() {
                    self.end_pulse(now);
                } else {
                    self.drive_valve(false);
                }
                CommandOutcome::ValveClosed
            }
            MuscleCommand::TogglePulsing => {
                if self.pulsing_enabled {
                    self.disable_pulsing(now);
                    CommandOutcome::PulsingStopped
                } else {
                    self.pulsing_enabled = true;
                    CommandOutcome::PulsingStarted
                }
            }
            MuscleCommand::StartAtCurrentFrequency => {
                self.pulsing_enabled = true;
                CommandOutcome::PulsingAt {
                    frequency_hz: self.frequency_hz,
                }
            }
            MuscleCommand::SetFrequency(value) => {
                let applied = frequency_from_argument(value).and_then(|frequency_hz| {
                    self.set_pulse_frequency(frequency_hz)
                        .map(|()| frequency_hz)
                });
                match applied {
                    Ok(frequency_hz) => CommandOutcome::FrequencySet { frequency_hz },
                    Err(err) => CommandOutcome::Ignored(err.into()),
                }
            }
        }
    }

    fn disable_pulsing(&mut self, now: TInstant) {
        self.pulsing_enabled = false;
        self.valve_override = false;
        if self.is_pulse_active() {
            self.when_pulse_ended = Some(now);
        }
        self.state = PulseState::Closed;
        self.drive_valve(false);
    }

    fn start_pulse(&mut self, now: TInstant) {
        self.drive_valve(true);
        self.when_pulse_started = Some(now);
        self.state = PulseState::PulsingOn;
    }

    fn end_pulse(&mut self, now: TInstant) {
        self.valve_override = false;
        self.drive_valve(false);
        self.when_pulse_ended = Some(now);
        self.state = PulseState::PulsingOff;
    }

    fn drive_valve(&mut self, energized: bool) {
        self.valve.set_energized(energized);
        self.valve_energized = energized;
    }
}

fn elapsed_since<TInstant>(since: Option<TInstant>, now: TInstant) -> Duration
where
    TInstant: Monotonic,
{
    since.map_or(Duration::MAX, |at| now.saturating_duration_since(at))
}

fn off_interval(dt_on: Duration, frequency_hz: f32) -> Result<Duration, FrequencyError> {
    if frequency_hz.is_nan() || frequency_hz <= 0.0 {
        return Err(FrequencyError::NonPositive);
    }
    let period = Duration::try_from_secs_f64(1.0 / f64::from(frequency_hz))
        .map_err(|_| FrequencyError::NonPositive)?;
    period
        .checked_sub(dt_on)
        .ok_or(FrequencyError::ExceedsDutyLimit)
}

#[allow(clippy::cast_precision_loss)]
fn frequency_from_argument(value: i32) -> Result<f32, FrequencyError> {
    if value <= 0 {
        return Err(FrequencyError::NonPositive);
    }
    Ok(value as f32)
}

/// Index of a channel inside a [`MuscleGroup`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ChannelId(pub u8);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

/// Error returned when a group has no room for another channel.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct GroupFull;

impl fmt::Display for GroupFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("muscle group is full")
    }
}

/// Result of routing one command through a [`MuscleGroup`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Dispatched {
    pub channel: Option<ChannelId>,
    pub outcome: CommandOutcome,
    /// Peers whose frequency followed a successful `SetFrequency`.
    pub peers_updated: u8,
}

/// Channels that share one command stream.
///
/// Commands go to the target channel. An accepted `SetFrequency` is then
/// applied to every other member so the group pulses at a common cadence.
pub struct MuscleGroup<V, P, TInstant, const N: usize = DEFAULT_GROUP_CAPACITY>
where
    TInstant: Copy,
{
    channels: Vec<MuscleChannel<V, P, TInstant>, N>,
    target: u8,
}

impl<V, P, TInstant, const N: usize> MuscleGroup<V, P, TInstant, N>
where
    V: ValveDriver,
    P: PressureSensor,
    TInstant: Monotonic,
{
    #[must_use]
    pub const fn new() -> Self {
        Self {
            channels: Vec::new(),
            target: 0,
        }
    }

    /// Adds a channel and returns its id.
    pub fn push(&mut self, channel: MuscleChannel<V, P, TInstant>) -> Result<ChannelId, GroupFull> {
        let id = u8::try_from(self.channels.len()).map_err(|_| GroupFull)?;
        self.channels.push(channel).map_err(|_| GroupFull)?;
        Ok(ChannelId(id))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    #[must_use]
    pub fn channel(&self, id: ChannelId) -> Option<&MuscleChannel<V, P, TInstant>> {
        self.channels.get(usize::from(id.0))
    }

    pub fn channel_mut(&mut self, id: ChannelId) -> Option<&mut MuscleChannel<V, P, TInstant>> {
        self.channels.get_mut(usize::from(id.0))
    }

    #[must_use]
    pub fn iter(&self) -> impl Iterator<Item = (ChannelId, &MuscleChannel<V, P, TInstant>)> {
        self.channels
            .iter()
            .zip(0u8..)
            .map(|(channel, index)| (ChannelId(index), channel))
    }

    #[must_use]
    pub const fn target(&self) -> ChannelId {
        ChannelId(self.target)
    }

    /// Selects the channel that receives non-broadcast commands.
    pub fn set_target(&mut self, id: ChannelId) -> bool {
        if usize::from(id.0) < self.channels.len() {
            self.target = id.0;
            true
        } else {
            false
        }
    }

    /// Begins every channel.
    pub fn begin(&mut self, now: TInstant) {
        for channel in &mut self.channels {
            channel.begin(now);
        }
    }

    /// Routes a command to the target and broadcasts accepted frequencies.
    pub fn dispatch(&mut self, command: MuscleCommand, now: TInstant) -> Dispatched {
        let target = self.target;
        let Some(channel) = self.channels.get_mut(usize::from(target)) else {
            return Dispatched {
                channel: None,
                outcome: CommandOutcome::Ignored(IgnoreReason::NoTargetChannel),
                peers_updated: 0,
            };
        };

        let outcome = channel.handle_command(command, now);
        let mut peers_updated = 0u8;
        if let CommandOutcome::FrequencySet { frequency_hz } = outcome {
            for (index, peer) in self.channels.iter_mut().enumerate() {
                if index != usize::from(target) && peer.set_pulse_frequency(frequency_hz).is_ok() {
                    peers_updated = peers_updated.saturating_add(1);
                }
            }
        }

        Dispatched {
            channel: Some(ChannelId(target)),
            outcome,
            peers_updated,
        }
    }

    /// Polls every channel and returns the transitions that fired.
    pub fn poll(&mut self, now: TInstant) -> Vec<(ChannelId, PulseTransition), N> {
        let mut transitions = Vec::new();
        for (channel, index) in self.channels.iter_mut().zip(0u8..) {
            if let Some(transition) = channel.poll(now) {
                let _ = transitions.push((ChannelId(index), transition));
            }
        }
        transitions
    }

    /// Samples pressure on every channel.
    pub fn update_pressure(&mut self) -> Vec<(ChannelId, PressureReading), N> {
        let mut readings = Vec::new();
        for (channel, index) in self.channels.iter_mut().zip(0u8..) {
            let _ = readings.push((ChannelId(index), channel.update_pressure()));
        }
        readings
    }
}

impl<V, P, TInstant, const N: usize> Default for MuscleGroup<V, P, TInstant, N>
where
    V: ValveDriver,
    P: PressureSensor,
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

    #[derive(Default)]
    struct RecordingValve {
        writes: Vec<bool, 64>,
    }

    impl ValveDriver for &mut RecordingValve {
        fn set_energized(&mut self, energized: bool) {
            let _ = self.writes.push(energized);
        }
    }

    struct RampSensor {
        next: u16,
    }

    impl PressureSensor for RampSensor {
        fn read_raw(&mut self) -> u16 {
            let value = self.next;
            self.next += 1;
            value
        }
    }

    type TestChannel = MuscleChannel<NoopValve, NoopPressureSensor, MicrosInstant>;

    fn millis(value: u64) -> MicrosInstant {
        MicrosInstant::from_millis(value)
    }

    fn channel() -> TestChannel {
        let mut channel = MuscleChannel::new(
            "left",
            NoopValve,
            NoopPressureSensor,
            MuscleConfig::default(),
        )
        .expect("default config");
        channel.begin(millis(0));
        channel
    }

    #[test]
    fn default_frequency_leaves_expected_off_time() {
        let channel = channel();
        assert_eq!(channel.dt_on(), Duration::from_millis(8));
        assert!(libm::fabsf(channel.dt_off_ms() - (1_000.0 / 30.0 - 8.0)) < 1.0e-3);
        assert_eq!(channel.state(), PulseState::Closed);
        assert!(!channel.valve_energized());
    }

    #[test]
    fn new_rejects_unusable_initial_frequency() {
        let config = MuscleConfig::new(DEFAULT_PULSE_ON, 500.0);
        assert_eq!(
            TestChannel::new("x", NoopValve, NoopPressureSensor, config).err(),
            Some(FrequencyError::ExceedsDutyLimit)
        );
    }

    #[test]
    fn pulse_cycle_follows_on_and_off_times() {
        let mut channel = channel();
        channel
            .set_pulse_frequency(50.0)
            .expect("20 ms period fits 8 ms on-time");
        assert_eq!(channel.dt_off(), Duration::from_millis(12));

        assert_eq!(
            channel.handle_command(MuscleCommand::TogglePulsing, millis(0)),
            CommandOutcome::PulsingStarted
        );

        // Off-time is measured from begin().
        assert_eq!(channel.poll(millis(11)), None);
        assert_eq!(channel.poll(millis(12)), Some(PulseTransition::Started));
        assert!(channel.valve_energized());
        assert_eq!(channel.state(), PulseState::PulsingOn);

        // Strictly longer than dt_on before the pulse ends.
        assert_eq!(channel.poll(millis(20)), None);
        assert_eq!(channel.poll(millis(21)), Some(PulseTransition::Ended));
        assert!(!channel.valve_energized());
        assert_eq!(channel.state(), PulseState::PulsingOff);
        assert_eq!(channel.when_pulse_ended(), Some(millis(21)));

        assert_eq!(channel.poll(millis(32)), None);
        assert_eq!(channel.poll(millis(33)), Some(PulseTransition::Started));
    }

    #[test]
    fn disabling_pulsing_closes_valve_immediately() {
        let mut channel = channel();
        channel.handle_command(MuscleCommand::StartAtCurrentFrequency, millis(0));
        let start = millis(30);
        assert_eq!(channel.poll(start), Some(PulseTransition::Started));

        assert_eq!(
            channel.handle_command(MuscleCommand::TogglePulsing, millis(32)),
            CommandOutcome::PulsingStopped
        );
        assert_eq!(channel.state(), PulseState::Closed);
        assert!(!channel.valve_energized());
        assert_eq!(channel.when_pulse_ended(), Some(millis(32)));
        assert_eq!(channel.poll(millis(500)), None);
    }

    #[test]
    fn manual_open_overrides_until_close() {
        let mut channel = channel();
        assert_eq!(
            channel.handle_command(MuscleCommand::Open, millis(1)),
            CommandOutcome::ValveOpened
        );
        assert!(channel.valve_energized());
        assert!(channel.valve_override());
        assert_eq!(channel.state(), PulseState::Closed);

        assert_eq!(
            channel.handle_command(MuscleCommand::Close, millis(2)),
            CommandOutcome::ValveClosed
        );
        assert!(!channel.valve_energized());
        assert!(!channel.valve_override());
    }

    #[test]
    fn close_during_pulse_ends_it_early() {
        let mut channel = channel();
        channel.handle_command(MuscleCommand::StartAtCurrentFrequency, millis(0));
        channel.poll(millis(30));
        assert!(channel.is_pulse_active());

        channel.handle_command(MuscleCommand::Close, millis(33));
        assert_eq!(channel.state(), PulseState::PulsingOff);
        assert!(channel.is_pulsing_enabled());
        assert_eq!(channel.when_pulse_ended(), Some(millis(33)));
    }

    #[test]
    fn invalid_frequency_leaves_state_untouched() {
        let mut channel = channel();
        let before = channel.dt_off();

        assert_eq!(
            channel.handle_command(MuscleCommand::SetFrequency(0), millis(1)),
            CommandOutcome::Ignored(IgnoreReason::NonPositiveFrequency)
        );
        assert_eq!(
            channel.handle_command(MuscleCommand::SetFrequency(-4), millis(1)),
            CommandOutcome::Ignored(IgnoreReason::NonPositiveFrequency)
        );
        assert_eq!(
            channel.handle_command(MuscleCommand::SetFrequency(126), millis(1)),
            CommandOutcome::Ignored(IgnoreReason::FrequencyAboveLimit)
        );
        assert_eq!(channel.dt_off(), before);
        let drift = channel.pulse_frequency_hz() - DEFAULT_PULSE_FREQUENCY_HZ;
        assert!(libm::fabsf(drift) < f32::EPSILON);
    }

    #[test]
    fn duty_limit_frequency_has_zero_off_time() {
        let mut channel = channel();
        channel
            .set_pulse_frequency(125.0)
            .expect("period equals on-time");
        assert_eq!(channel.dt_off(), Duration::ZERO);
        assert!(libm::fabsf(MuscleConfig::default().max_frequency_hz() - 125.0) < 1.0e-3);
    }

    #[test]
    fn pressure_is_averaged_and_gradient_tracks_change() {
        let mut channel = MuscleChannel::<_, _, MicrosInstant>::new(
            "ramp",
            NoopValve,
            RampSensor { next: 0 },
            MuscleConfig::default().with_pressure_samples(4),
        )
        .expect("config");

        let first = channel.update_pressure();
        assert!(libm::fabsf(first.now - 1.5) < f32::EPSILON);
        assert!(libm::fabsf(first.gradient - 1.5) < f32::EPSILON);

        let second = channel.update_pressure();
        assert!(libm::fabsf(second.now - 5.5) < f32::EPSILON);
        assert!(libm::fabsf(second.previous - 1.5) < f32::EPSILON);
        assert!(libm::fabsf(second.gradient - 4.0) < f32::EPSILON);
    }

    #[test]
    fn begin_restarts_pressure_history_and_frequency() {
        let mut channel = MuscleChannel::<_, _, MicrosInstant>::new(
            "ramp",
            NoopValve,
            RampSensor { next: 0 },
            MuscleConfig::default().with_pressure_samples(4),
        )
        .expect("config");

        channel.begin(millis(0));
        channel.set_pulse_frequency(50.0).expect("within duty limit");
        channel.update_pressure();

        // Reads 8..=11 average to 9.5 with nothing before them.
        let restarted = channel.begin(millis(100));
        assert!(libm::fabsf(restarted.now - 9.5) < f32::EPSILON);
        assert!(libm::fabsf(restarted.previous) < f32::EPSILON);
        assert!(libm::fabsf(restarted.gradient - 9.5) < f32::EPSILON);
        let drift = channel.pulse_frequency_hz() - DEFAULT_PULSE_FREQUENCY_HZ;
        assert!(libm::fabsf(drift) < f32::EPSILON);
        assert_eq!(
            channel.dt_off(),
            MuscleChannel::<_, _, MicrosInstant>::new(
                "fresh",
                NoopValve,
                NoopPressureSensor,
                MuscleConfig::default(),
            )
            .expect("config")
            .dt_off()
        );
    }

    #[test]
    fn valve_driver_sees_every_write() {
        let mut valve = RecordingValve::default();
        {
            let mut channel = MuscleChannel::<_, _, MicrosInstant>::new(
                "rec",
                &mut valve,
                NoopPressureSensor,
                MuscleConfig::default(),
            )
            .expect("config");
            channel.begin(millis(0));
            channel.handle_command(MuscleCommand::Open, millis(1));
            channel.handle_command(MuscleCommand::Close, millis(2));
        }
        assert_eq!(valve.writes.as_slice(), &[false, true, false]);
    }

    #[test]
    fn outcomes_render_operator_text() {
        let mut text = heapless::String::<48>::new();
        core::fmt::write(
            &mut text,
            format_args!("{}", CommandOutcome::FrequencySet { frequency_hz: 45.0 }),
        )
        .expect("fmt");
        assert_eq!(text.as_str(), "Pulse frequency set to 45 Hz.");
    }

    #[test]
    fn group_broadcasts_accepted_frequency() {
        let mut group = MuscleGroup::<NoopValve, NoopPressureSensor, MicrosInstant, 2>::new();
        group.push(channel()).expect("room");
        group.push(channel()).expect("room");

        let dispatched = group.dispatch(MuscleCommand::SetFrequency(40), millis(5));
        assert_eq!(dispatched.channel, Some(ChannelId(0)));
        assert_eq!(dispatched.peers_updated, 1);
        for (_, member) in group.iter() {
            assert!(libm::fabsf(member.pulse_frequency_hz() - 40.0) < f32::EPSILON);
        }

        let rejected = group.dispatch(MuscleCommand::SetFrequency(0), millis(6));
        assert!(rejected.outcome.is_ignored());
        assert_eq!(rejected.peers_updated, 0);
    }

    #[test]
    fn group_routes_non_broadcast_commands_to_target_only() {
        let mut group = MuscleGroup::<NoopValve, NoopPressureSensor, MicrosInstant, 2>::new();
        group.push(channel()).expect("room");
        let right = group.push(channel()).expect("room");
        assert!(group.set_target(right));
        assert!(!group.set_target(ChannelId(7)));

        group.dispatch(MuscleCommand::Open, millis(1));
        assert!(!group.channel(ChannelId(0)).expect("left").valve_energized());
        assert!(group.channel(right).expect("right").valve_energized());
    }

    #[test]
    fn empty_group_ignores_commands() {
        let mut group = MuscleGroup::<NoopValve, NoopPressureSensor, MicrosInstant, 1>::new();
        let dispatched = group.dispatch(MuscleCommand::Open, millis(0));
        assert_eq!(dispatched.channel, None);
        assert_eq!(
            dispatched.outcome,
            CommandOutcome::Ignored(IgnoreReason::NoTargetChannel)
        );
    }

    #[test]
    fn full_group_rejects_push() {
        let mut group = MuscleGroup::<NoopValve, NoopPressureSensor, MicrosInstant, 1>::new();
        group.push(channel()).expect("room");
        assert_eq!(group.push(channel()), Err(GroupFull));
    }
}
