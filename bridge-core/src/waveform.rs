//! Sine-driven spike generator.
//!
//! The generator samples `A·sin(ω·t + φ)` once per tick and decides whether the
//! current sample produces a spike. Spike density follows the instantaneous
//! magnitude of the waveform through one of two [`EmissionPolicy`] variants.
//! Each emitted [`SpikeEvent`] carries only its polarity; the receiver infers
//! timing from arrival order.
//!
//! The periodic sampler is the only writer of generator state. Other contexts
//! may only raise the shared [`StopSignal`], which the generator observes at the
//! next tick boundary.

use core::cmp::Ordering as CmpOrdering;
use core::f32::consts::TAU;
use core::fmt;
use core::time::Duration;

use portable_atomic::{AtomicBool, Ordering};

use crate::clock::Monotonic;

/// Sampling period used by the firmware ticker and the host simulator.
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(1);

/// Minimum spacing between inverse-magnitude spikes.
pub const DEFAULT_FLOOR_INTERVAL: Duration = Duration::from_millis(5);

/// Fraction of a step treated as "at the threshold" to absorb sampling error
/// at the waveform peak.
const THRESHOLD_TOLERANCE: f32 = 1.0e-3;

/// Waveform magnitudes at or below this value never produce inverse-magnitude spikes.
const MAGNITUDE_EPSILON: f32 = 1.0e-6;

/// Configuration field rejected by [`EventGenerator::configure`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Parameter {
    Amplitude,
    Frequency,
    PhaseShift,
    FloorInterval,
    ThresholdSteps,
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Parameter::Amplitude => "amplitude",
            Parameter::Frequency => "frequency",
            Parameter::PhaseShift => "phase shift",
            Parameter::FloorInterval => "floor interval",
            Parameter::ThresholdSteps => "threshold steps",
        };
        f.write_str(label)
    }
}

/// Errors surfaced while configuring a generator.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum GeneratorError {
    InvalidParameter(Parameter),
}

impl fmt::Display for GeneratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeneratorError::InvalidParameter(parameter) => {
                write!(f, "invalid waveform parameter: {parameter}")
            }
        }
    }
}

/// Shape of the sampled sine wave.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct WaveformParams {
    amplitude: f32,
    frequency_hz: f32,
    phase_shift: f32,
    duration: Option<Duration>,
}

impl WaveformParams {
    /// Creates waveform parameters. A `duration` of `None` runs until stopped.
    #[must_use]
    pub const fn new(
        amplitude: f32,
        frequency_hz: f32,
        phase_shift: f32,
        duration: Option<Duration>,
    ) -> Self {
        Self {
            amplitude,
            frequency_hz,
            phase_shift,
            duration,
        }
    }

    #[must_use]
    pub const fn amplitude(&self) -> f32 {
        self.amplitude
    }

    #[must_use]
    pub const fn frequency_hz(&self) -> f32 {
        self.frequency_hz
    }

    #[must_use]
    pub const fn phase_shift(&self) -> f32 {
        self.phase_shift
    }

    #[must_use]
    pub const fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Returns ω = 2π·f in radians per second.
    #[must_use]
    pub fn angular_frequency(&self) -> f32 {
        TAU * self.frequency_hz
    }

    /// Evaluates the waveform `elapsed` after the generator started.
    #[must_use]
    pub fn value_at(&self, elapsed: Duration) -> f32 {
        self.amplitude * libm::sinf(self.phase_at(elapsed))
    }

    /// Phase angle `ω·t + φ` with whole cycles removed before narrowing to `f32`,
    /// so unbounded runs keep sub-millisecond resolution.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn phase_at(&self, elapsed: Duration) -> f32 {
        let frequency = f64::from(self.frequency_hz);
        let whole = elapsed.as_secs() as f64 * frequency;
        let partial = f64::from(elapsed.subsec_nanos()) * 1.0e-9 * frequency;
        let cycles = (whole - libm::floor(whole)) + partial;
        let fraction = cycles - libm::floor(cycles);
        TAU * fraction as f32 + self.phase_shift
    }

    fn validate(&self) -> Result<(), GeneratorError> {
        if !self.amplitude.is_finite() || self.amplitude <= 0.0 {
            return Err(GeneratorError::InvalidParameter(Parameter::Amplitude));
        }
        if !self.frequency_hz.is_finite() || self.frequency_hz <= 0.0 {
            return Err(GeneratorError::InvalidParameter(Parameter::Frequency));
        }
        if !self.phase_shift.is_finite() {
            return Err(GeneratorError::InvalidParameter(Parameter::PhaseShift));
        }
        Ok(())
    }
}

/// Rule deciding when a waveform sample becomes a spike.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EmissionPolicy {
    /// Emit once `|1/y|` seconds have passed since the previous spike, never
    /// sooner than `floor`.
    InverseMagnitude { floor: Duration },
    /// Split `[0, amplitude]` into `steps` bands and emit on every band
    /// boundary crossed, rising or falling.
    ThresholdCrossing { steps: u8 },
}

impl EmissionPolicy {
    #[must_use]
    pub const fn inverse_magnitude(floor: Duration) -> Self {
        EmissionPolicy::InverseMagnitude { floor }
    }

    #[must_use]
    pub const fn threshold_crossing(steps: u8) -> Self {
        EmissionPolicy::ThresholdCrossing { steps }
    }

    fn validate(&self) -> Result<(), GeneratorError> {
        match self {
            EmissionPolicy::InverseMagnitude { floor } if floor.is_zero() => {
                Err(GeneratorError::InvalidParameter(Parameter::FloorInterval))
            }
            EmissionPolicy::ThresholdCrossing { steps: 0 } => {
                Err(GeneratorError::InvalidParameter(Parameter::ThresholdSteps))
            }
            _ => Ok(()),
        }
    }
}

impl Default for EmissionPolicy {
    fn default() -> Self {
        Self::inverse_magnitude(DEFAULT_FLOOR_INTERVAL)
    }
}

/// Logical channel a spike is emitted on, derived from the waveform sign.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Polarity {
    /// Waveform above zero.
    Positive,
    /// Waveform at or below zero.
    Negative,
}

impl Polarity {
    const POSITIVE_CODE: u8 = 0x00;
    const NEGATIVE_CODE: u8 = 0x01;

    #[must_use]
    pub fn from_value(value: f32) -> Self {
        if value > 0.0 {
            Polarity::Positive
        } else {
            Polarity::Negative
        }
    }

    /// Encodes the polarity as the single byte placed on the wire.
    #[must_use]
    pub const fn to_byte(self) -> u8 {
        match self {
            Polarity::Positive => Self::POSITIVE_CODE,
            Polarity::Negative => Self::NEGATIVE_CODE,
        }
    }

    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            Self::POSITIVE_CODE => Some(Polarity::Positive),
            Self::NEGATIVE_CODE => Some(Polarity::Negative),
            _ => None,
        }
    }
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Polarity::Positive => f.write_str("positive"),
            Polarity::Negative => f.write_str("negative"),
        }
    }
}

/// Spike produced by a generator tick.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SpikeEvent<TInstant>
where
    TInstant: Copy,
{
    pub polarity: Polarity,
    pub emitted_at: TInstant,
}

impl<TInstant> SpikeEvent<TInstant>
where
    TInstant: Copy,
{
    #[must_use]
    pub const fn to_byte(&self) -> u8 {
        self.polarity.to_byte()
    }
}

/// Direction of a threshold crossing.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CrossingDirection {
    Rising,
    Falling,
}

/// Threshold boundary crossed on a tick (threshold-crossing policy only).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Crossing {
    /// Zero-based threshold index; threshold `k` sits at `(k + 1)·A/steps`.
    pub index: u8,
    pub direction: CrossingDirection,
}

/// `(timestamp, value, emitted)` triple handed to sample dumpers.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct WaveformSample<TInstant>
where
    TInstant: Copy,
{
    pub timestamp: TInstant,
    pub value: f32,
    pub emitted: bool,
}

/// Result of a single generator tick.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TickOutcome<TInstant>
where
    TInstant: Copy,
{
    pub timestamp: TInstant,
    pub elapsed: Duration,
    pub value: f32,
    pub event: Option<SpikeEvent<TInstant>>,
    pub crossing: Option<Crossing>,
}

impl<TInstant> TickOutcome<TInstant>
where
    TInstant: Copy,
{
    #[must_use]
    pub fn sample(&self) -> WaveformSample<TInstant> {
        WaveformSample {
            timestamp: self.timestamp,
            value: self.value,
            emitted: self.event.is_some(),
        }
    }
}

/// Cooperative stop request shared between the sampler and other contexts.
///
/// Raising the signal is the only mutation other contexts may perform on a
/// running generator.
#[derive(Debug, Default)]
pub struct StopSignal {
    requested: AtomicBool,
}

impl StopSignal {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            requested: AtomicBool::new(false),
        }
    }

    /// Requests that the generator stop at its next tick.
    pub fn request(&self) {
        self.requested.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

/// Lifecycle of a generator. There is no way back from `Stopped`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum GeneratorState<TInstant> {
    Idle,
    Running { started_at: TInstant },
    Stopped,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct InverseMagnitude {
    floor: Duration,
    last_event: Duration,
}

impl InverseMagnitude {
    fn observe(&mut self, elapsed: Duration, value: f32) -> bool {
        let since = elapsed.saturating_sub(self.last_event);
        if since <= self.floor {
            return false;
        }

        let magnitude = libm::fabsf(value);
        if magnitude <= MAGNITUDE_EPSILON {
            return false;
        }

        if since.as_secs_f32() > magnitude.recip() {
            self.last_event = elapsed;
            true
        } else {
            false
        }
    }
}

/// Band tracker for the threshold-crossing policy.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ThresholdTracker {
    steps: u8,
    step_size: f32,
    level: u8,
}

impl ThresholdTracker {
    /// Creates a tracker for `steps` equal bands spanning `[0, amplitude]`.
    #[must_use]
    pub fn new(amplitude: f32, steps: u8) -> Self {
        let steps = steps.max(1);
        Self {
            steps,
            step_size: amplitude / f32::from(steps),
            level: 0,
        }
    }

    /// Index of the highest threshold currently crossed, within `[0, steps - 1]`.
    #[must_use]
    pub fn step_index(&self) -> Option<u8> {
        self.level.checked_sub(1)
    }

    /// Moves one band toward the magnitude of `value`, reporting the crossing.
    pub fn observe(&mut self, value: f32) -> Option<Crossing> {
        let target = self.target_level(libm::fabsf(value));
        match target.cmp(&self.level) {
            CmpOrdering::Greater => {
                self.level += 1;
                Some(Crossing {
                    index: self.level - 1,
                    direction: CrossingDirection::Rising,
                })
            }
            CmpOrdering::Less => {
                self.level -= 1;
                Some(Crossing {
                    index: self.level,
                    direction: CrossingDirection::Falling,
                })
            }
            CmpOrdering::Equal => None,
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn target_level(&self, magnitude: f32) -> u8 {
        let bands = libm::floorf(magnitude / self.step_size + THRESHOLD_TOLERANCE);
        if bands <= 0.0 {
            0
        } else if bands >= f32::from(self.steps) {
            self.steps
        } else {
            bands as u8
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum PolicyState {
    InverseMagnitude(InverseMagnitude),
    Threshold(ThresholdTracker),
}

impl PolicyState {
    fn new(policy: EmissionPolicy, amplitude: f32) -> Self {
        match policy {
            EmissionPolicy::InverseMagnitude { floor } => {
                PolicyState::InverseMagnitude(InverseMagnitude {
                    floor,
                    last_event: Duration::ZERO,
                })
            }
            EmissionPolicy::ThresholdCrossing { steps } => {
                PolicyState::Threshold(ThresholdTracker::new(amplitude, steps))
            }
        }
    }

    fn observe(&mut self, elapsed: Duration, value: f32) -> (bool, Option<Crossing>) {
        match self {
            PolicyState::InverseMagnitude(state) => (state.observe(elapsed, value), None),
            PolicyState::Threshold(tracker) => {
                let crossing = tracker.observe(value);
                (crossing.is_some(), crossing)
            }
        }
    }
}

/// Converts a sampled sine wave into a sparse, non-restartable spike stream.
pub struct EventGenerator<'s, TInstant>
where
    TInstant: Copy,
{
    params: WaveformParams,
    policy: EmissionPolicy,
    policy_state: PolicyState,
    stop: &'s StopSignal,
    state: GeneratorState<TInstant>,
    last_event_at: Option<TInstant>,
}

impl<'s, TInstant> EventGenerator<'s, TInstant>
where
    TInstant: Monotonic,
{
    /// Validates the configuration and returns an idle generator.
    pub fn configure(
        params: WaveformParams,
        policy: EmissionPolicy,
        stop: &'s StopSignal,
    ) -> Result<Self, GeneratorError> {
        params.validate()?;
        policy.validate()?;

        Ok(Self {
            params,
            policy,
            policy_state: PolicyState::new(policy, params.amplitude),
            stop,
            state: GeneratorState::Idle,
            last_event_at: None,
        })
    }

    #[must_use]
    pub const fn params(&self) -> &WaveformParams {
        &self.params
    }

    #[must_use]
    pub const fn policy(&self) -> EmissionPolicy {
        self.policy
    }

    #[must_use]
    pub const fn state(&self) -> GeneratorState<TInstant> {
        self.state
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self.state, GeneratorState::Running { .. })
    }

    /// Timestamp of the most recent spike.
    #[must_use]
    pub const fn last_event_at(&self) -> Option<TInstant> {
        self.last_event_at
    }

    /// Current threshold index when the threshold-crossing policy is active.
    #[must_use]
    pub fn step_index(&self) -> Option<u8> {
        match &self.policy_state {
            PolicyState::Threshold(tracker) => tracker.step_index(),
            PolicyState::InverseMagnitude(_) => None,
        }
    }

    /// Starts sampling. Returns `false` when already running or stopped.
    pub fn begin(&mut self, now: TInstant) -> bool {
        match self.state {
            GeneratorState::Idle => {
                self.state = GeneratorState::Running { started_at: now };
                true
            }
            GeneratorState::Running { .. } | GeneratorState::Stopped => false,
        }
    }

    /// Stops the generator from the sampling context.
    pub fn stop(&mut self) {
        self.stop.request();
        self.state = GeneratorState::Stopped;
    }

    /// Samples the waveform at `now` and applies the emission policy.
    ///
    /// Returns `None` when the generator is idle, stopped, or has just run past
    /// its configured duration. A tick landing exactly on the duration is still
    /// sampled.
    pub fn tick(&mut self, now: TInstant) -> Option<TickOutcome<TInstant>> {
        let GeneratorState::Running { started_at } = self.state else {
            return None;
        };

        if self.stop.is_requested() {
            self.state = GeneratorState::Stopped;
            return None;
        }

        let elapsed = now.saturating_duration_since(started_at);
        if self.params.duration.is_some_and(|limit| elapsed > limit) {
            self.state = GeneratorState::Stopped;
            return None;
        }

        let value = self.params.value_at(elapsed);
        let (emit, crossing) = self.policy_state.observe(elapsed, value);

        let event = if emit {
            self.last_event_at = Some(now);
            Some(SpikeEvent {
                polarity: Polarity::from_value(value),
                emitted_at: now,
            })
        } else {
            None
        };

        Some(TickOutcome {
            timestamp: now,
            elapsed,
            value,
            event,
            crossing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MicrosInstant;

    fn millis(value: u64) -> MicrosInstant {
        MicrosInstant::from_millis(value)
    }

    #[test]
    fn configure_rejects_non_positive_amplitude_and_frequency() {
        let stop = StopSignal::new();
        let policy = EmissionPolicy::default();

        let zero_amplitude = WaveformParams::new(0.0, 1.0, 0.0, None);
        assert_eq!(
            EventGenerator::<MicrosInstant>::configure(zero_amplitude, policy, &stop).err(),
            Some(GeneratorError::InvalidParameter(Parameter::Amplitude))
        );

        let negative_frequency = WaveformParams::new(1.0, -2.0, 0.0, None);
        assert_eq!(
            EventGenerator::<MicrosInstant>::configure(negative_frequency, policy, &stop).err(),
            Some(GeneratorError::InvalidParameter(Parameter::Frequency))
        );

        let nan_phase = WaveformParams::new(1.0, 1.0, f32::NAN, None);
        assert_eq!(
            EventGenerator::<MicrosInstant>::configure(nan_phase, policy, &stop).err(),
            Some(GeneratorError::InvalidParameter(Parameter::PhaseShift))
        );
    }

    #[test]
    fn configure_requires_explicit_floor_and_steps() {
        let stop = StopSignal::new();
        let params = WaveformParams::new(1.0, 1.0, 0.0, None);

        assert_eq!(
            EventGenerator::<MicrosInstant>::configure(
                params,
                EmissionPolicy::inverse_magnitude(Duration::ZERO),
                &stop
            )
            .err(),
            Some(GeneratorError::InvalidParameter(Parameter::FloorInterval))
        );
        assert_eq!(
            EventGenerator::<MicrosInstant>::configure(
                params,
                EmissionPolicy::threshold_crossing(0),
                &stop
            )
            .err(),
            Some(GeneratorError::InvalidParameter(Parameter::ThresholdSteps))
        );
    }

    #[test]
    fn tick_is_noop_until_begin_and_after_stop() {
        let stop = StopSignal::new();
        let params = WaveformParams::new(10.0, 1.0, 0.0, None);
        let mut generator =
            EventGenerator::configure(params, EmissionPolicy::default(), &stop).expect("config");

        assert!(generator.tick(millis(1)).is_none());
        assert!(generator.begin(millis(0)));
        assert!(!generator.begin(millis(5)));
        assert!(generator.tick(millis(1)).is_some());

        generator.stop();
        assert!(generator.tick(millis(2)).is_none());
        assert!(!generator.begin(millis(3)));
        assert_eq!(generator.state(), GeneratorState::Stopped);
    }

    #[test]
    fn external_stop_request_takes_effect_on_next_tick() {
        let stop = StopSignal::new();
        let params = WaveformParams::new(10.0, 1.0, 0.0, None);
        let mut generator =
            EventGenerator::configure(params, EmissionPolicy::default(), &stop).expect("config");
        generator.begin(millis(0));

        assert!(generator.tick(millis(1)).is_some());
        stop.request();
        assert!(generator.tick(millis(2)).is_none());
        assert!(!generator.is_running());
    }

    #[test]
    fn finite_duration_stops_generator() {
        let stop = StopSignal::new();
        let params = WaveformParams::new(10.0, 1.0, 0.0, Some(Duration::from_millis(3)));
        let mut generator =
            EventGenerator::configure(params, EmissionPolicy::default(), &stop).expect("config");
        generator.begin(millis(0));

        assert!(generator.tick(millis(2)).is_some());
        assert!(generator.tick(millis(3)).is_some());
        assert!(generator.tick(millis(4)).is_none());
        assert_eq!(generator.state(), GeneratorState::Stopped);
    }

    #[test]
    fn waveform_value_follows_phase_shift() {
        let params = WaveformParams::new(2.0, 1.0, core::f32::consts::FRAC_PI_2, None);

        assert!(libm::fabsf(params.value_at(Duration::ZERO) - 2.0) < 1.0e-5);
        assert!(libm::fabsf(params.value_at(Duration::from_millis(500)) + 2.0) < 1.0e-4);
    }

    #[test]
    fn waveform_keeps_resolution_after_a_day() {
        let params = WaveformParams::new(50.0, 1.0, 0.0, None);
        let base = Duration::from_secs(86_400);

        let mut previous = None;
        for ms in 0..1_000u64 {
            let elapsed = base + Duration::from_millis(ms);
            let value = params.value_at(elapsed);
            #[allow(clippy::cast_precision_loss)]
            let expected = 50.0 * libm::sin(core::f64::consts::TAU * ms as f64 / 1_000.0);
            #[allow(clippy::cast_possible_truncation)]
            let error = libm::fabsf(value - expected as f32);
            assert!(error < 1.0e-2, "{ms} ms: got {value}, expected {expected}");
            assert_ne!(Some(value), previous, "{ms} ms repeats the previous sample");
            previous = Some(value);
        }
    }

    #[test]
    fn non_integer_period_does_not_drift() {
        let params = WaveformParams::new(1.0, 3.0, 0.0, None);
        // 3 Hz over 10^6 s is a whole number of cycles.
        let elapsed = Duration::from_secs(1_000_000) + Duration::from_micros(83_333);
        let value = params.value_at(elapsed);
        assert!(libm::fabsf(value - 1.0) < 1.0e-3, "got {value}");
    }

    #[test]
    fn zero_sample_maps_to_negative_polarity() {
        assert_eq!(Polarity::from_value(0.0), Polarity::Negative);
        assert_eq!(Polarity::from_value(-0.0), Polarity::Negative);
        assert_eq!(Polarity::from_value(f32::MIN_POSITIVE), Polarity::Positive);
    }

    #[test]
    fn inverse_magnitude_respects_floor_near_peak() {
        let stop = StopSignal::new();
        let floor = Duration::from_millis(5);
        let params = WaveformParams::new(1_000.0, 1.0, 0.0, None);
        let mut generator =
            EventGenerator::configure(params, EmissionPolicy::inverse_magnitude(floor), &stop)
                .expect("config");
        generator.begin(millis(0));

        let mut previous: Option<MicrosInstant> = None;
        for ms in 1..1_000 {
            let outcome = generator.tick(millis(ms)).expect("running");
            if let Some(event) = outcome.event {
                if let Some(prior) = previous {
                    assert!(event.emitted_at.saturating_duration_since(prior) > floor);
                }
                previous = Some(event.emitted_at);
            }
        }
        assert!(previous.is_some());
    }

    #[test]
    fn threshold_tracker_reports_rising_and_falling_crossings() {
        let mut tracker = ThresholdTracker::new(1.0, 2);

        assert_eq!(tracker.observe(0.1), None);
        assert_eq!(
            tracker.observe(0.6),
            Some(Crossing {
                index: 0,
                direction: CrossingDirection::Rising
            })
        );
        assert_eq!(tracker.step_index(), Some(0));
        assert_eq!(
            tracker.observe(-1.0),
            Some(Crossing {
                index: 1,
                direction: CrossingDirection::Rising
            })
        );
        assert_eq!(tracker.step_index(), Some(1));
        assert_eq!(
            tracker.observe(0.0),
            Some(Crossing {
                index: 1,
                direction: CrossingDirection::Falling
            })
        );
        assert_eq!(
            tracker.observe(0.0),
            Some(Crossing {
                index: 0,
                direction: CrossingDirection::Falling
            })
        );
        assert_eq!(tracker.step_index(), None);
        assert_eq!(tracker.observe(0.0), None);
    }

    #[test]
    fn polarity_byte_round_trip() {
        assert_eq!(Polarity::from_value(0.5).to_byte(), 0x00);
        assert_eq!(Polarity::from_value(-0.5).to_byte(), 0x01);
        assert_eq!(Polarity::from_byte(0x01), Some(Polarity::Negative));
        assert_eq!(Polarity::from_byte(b'O'), None);
    }
}
