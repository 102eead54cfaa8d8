use std::thread;
use std::time::Duration;

use bridge_core::bridge::{Bridge, BridgeConfig, BridgeStats};
use bridge_core::clock::{MicrosInstant, Monotonic};
use bridge_core::command::MuscleCommand;
use bridge_core::link::sim::{FaultModel, SimulatedWire};
use bridge_core::link::{
    EchoProbe, LinkConfig, LinkError, ProbeReport, START_SENTINEL, SerialLink,
};
use bridge_core::muscle::{
    MuscleChannel, MuscleConfig, MuscleGroup, NoopPressureSensor, NoopValve, PulseTransition,
};
use bridge_core::telemetry::{EventId, TelemetryPayload, TelemetryRecord};
use bridge_core::waveform::{EmissionPolicy, EventGenerator, Polarity, StopSignal, WaveformParams};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::HostError;
use crate::link::HostClock;

/// Names of the two channels every simulated board carries.
pub const SIMULATED_CHANNELS: [&str; 2] = ["left", "right"];

/// Depth of each direction of the simulated wire.
const SIMULATED_FIFO_DEPTH: usize = 256;

/// Largest chunk pulled from a link per poll.
const READ_CHUNK: usize = 64;

pub const HELP_TOPICS: &[(&str, &str)] = &[
    ("start", "start                 - send the start sentinel (0xFF)"),
    ("o", "o                     - open the target valve"),
    ("c", "c                     - close the target valve"),
    ("p", "p                     - toggle pulsing on the target channel"),
    ("f", "f                     - start pulsing at the current frequency"),
    ("g", "g <hz>                - set the pulse frequency on every channel"),
    ("help", "help                  - show this list"),
];

/// Time source for the host loops.
///
/// Wall-clock runs sleep between polls; simulated runs advance a virtual
/// instant instead so they finish immediately and repeat exactly.
pub trait Pacer {
    fn now(&self) -> MicrosInstant;
    fn wait(&mut self, period: Duration);
}

/// Real time, backed by [`HostClock`] and `thread::sleep`.
pub struct WallPacer {
    clock: HostClock,
}

impl WallPacer {
    #[must_use]
    pub fn start() -> Self {
        Self {
            clock: HostClock::start(),
        }
    }
}

impl Pacer for WallPacer {
    fn now(&self) -> MicrosInstant {
        self.clock.now()
    }

    fn wait(&mut self, period: Duration) {
        thread::sleep(period);
    }
}

/// Deterministic clock that jumps forward on every wait.
#[derive(Copy, Clone, Debug, Default)]
pub struct VirtualPacer {
    now: MicrosInstant,
}

impl Pacer for VirtualPacer {
    fn now(&self) -> MicrosInstant {
        self.now
    }

    fn wait(&mut self, period: Duration) {
        self.now = self.now + period;
    }
}

/// Parameters for [`run_simulation`].
#[derive(Clone, Debug)]
pub struct SimulationOptions {
    pub params: WaveformParams,
    pub policy: EmissionPolicy,
    pub bridge: BridgeConfig,
    pub link: LinkConfig,
    pub faults: FaultModel,
    /// Bytes the simulated peer sends right after the start sentinel.
    pub peer_script: Vec<u8>,
    pub tick: Duration,
    pub max_ticks: u64,
}

impl SimulationOptions {
    #[must_use]
    pub fn new(params: WaveformParams, policy: EmissionPolicy) -> Self {
        let max_ticks = params
            .duration()
            .map_or(10_000, |duration| ticks_for(duration, Duration::from_millis(1)) + 100);
        Self {
            params,
            policy,
            bridge: BridgeConfig::new(),
            link: LinkConfig::default(),
            faults: FaultModel::NONE,
            peer_script: Vec::new(),
            tick: Duration::from_millis(1),
            max_ticks,
        }
    }

    #[must_use]
    pub fn with_peer_script(mut self, script: Vec<u8>) -> Self {
        self.peer_script = script;
        self
    }

    #[must_use]
    pub fn with_faults(mut self, faults: FaultModel) -> Self {
        self.faults = faults;
        self
    }

    #[must_use]
    pub fn with_bridge(mut self, bridge: BridgeConfig) -> Self {
        self.bridge = bridge;
        self
    }
}

/// What the peer observed and what the bridge recorded.
#[derive(Clone, Debug, Default)]
pub struct SimulationSummary {
    pub ticks: u64,
    pub stats: BridgeStats,
    pub positive_spikes: u32,
    pub negative_spikes: u32,
    /// Bytes that arrived at the peer but are not a polarity code.
    pub garbled: u32,
    pub pulses_started: u32,
    pub frequencies: Vec<(&'static str, f32)>,
    pub generator_stopped: bool,
    pub telemetry: Vec<String>,
}

impl SimulationSummary {
    #[must_use]
    pub fn spikes_received(&self) -> u32 {
        self.positive_spikes + self.negative_spikes
    }
}

/// Runs a complete bridge against an in-memory peer on a virtual clock.
pub fn run_simulation(options: &SimulationOptions) -> Result<SimulationSummary, HostError> {
    let wire = SimulatedWire::<SIMULATED_FIFO_DEPTH>::new(options.faults)?;
    let (near, mut peer) = wire.endpoints(options.link)?;

    let stop = StopSignal::new();
    let generator = EventGenerator::configure(options.params, options.policy, &stop)?;
    let mut bridge = Bridge::new(near, generator, simulated_muscles()?, options.bridge);

    peer.write_byte(START_SENTINEL)?;
    peer.write_bytes(&options.peer_script)?;

    let mut pacer = VirtualPacer::default();
    let mut summary = SimulationSummary::default();
    let mut next_record: EventId = 0;
    let mut buffer = [0u8; READ_CHUNK];

    for _ in 0..options.max_ticks {
        let report = bridge.tick(pacer.now())?;
        summary.ticks += 1;
        let started = report
            .transitions
            .iter()
            .filter(|(_, transition)| *transition == PulseTransition::Started)
            .count();
        summary.pulses_started += u32::try_from(started).unwrap_or(u32::MAX);
        for dispatched in &report.outcomes {
            info!(channel = ?dispatched.channel, "{}", dispatched.outcome);
        }

        for record in bridge.telemetry().records_since(next_record) {
            let line = describe_record(record);
            debug!("{line}");
            summary.telemetry.push(line);
        }
        next_record = bridge.telemetry().next_event_id();

        loop {
            let received = peer.read_into(&mut buffer)?;
            if received == 0 {
                break;
            }
            for &byte in &buffer[..received] {
                match Polarity::from_byte(byte) {
                    Some(Polarity::Positive) => summary.positive_spikes += 1,
                    Some(Polarity::Negative) => summary.negative_spikes += 1,
                    None => summary.garbled += 1,
                }
            }
        }

        if report.generator_stopped {
            summary.generator_stopped = true;
            break;
        }
        pacer.wait(options.tick);
    }

    summary.stats = *bridge.stats();
    summary.frequencies = bridge
        .muscles()
        .iter()
        .map(|(_, channel)| (channel.name(), channel.pulse_frequency_hz()))
        .collect();
    Ok(summary)
}

type SimulatedGroup = MuscleGroup<NoopValve, NoopPressureSensor, MicrosInstant>;

fn simulated_muscles() -> Result<SimulatedGroup, HostError> {
    let mut group = MuscleGroup::new();
    for name in SIMULATED_CHANNELS {
        let channel =
            MuscleChannel::new(name, NoopValve, NoopPressureSensor, MuscleConfig::default())?;
        group.push(channel)?;
    }
    Ok(group)
}

/// Sends `trials` probes through `link` and folds the echoes.
///
/// The peer must echo every byte. Probes still outstanding `timeout` after
/// the last one was sent count as lost.
pub fn run_probe<L, C>(
    link: &mut L,
    pacer: &mut C,
    trials: u32,
    spacing: Duration,
    timeout: Duration,
) -> Result<ProbeReport, LinkError<L::Error>>
where
    L: SerialLink,
    C: Pacer,
{
    let mut probe = EchoProbe::<MicrosInstant>::new();
    let mut buffer = [0u8; READ_CHUNK];

    for _ in 0..trials {
        let now = pacer.now();
        probe.expire(now, timeout);
        match probe.next_probe(now) {
            Some(byte) => link.write_byte(byte)?,
            None => warn!("probe window full, skipping trial"),
        }
        pacer.wait(spacing);
        collect_echoes(link, pacer, &mut probe, &mut buffer)?;
    }

    pacer.wait(timeout);
    collect_echoes(link, pacer, &mut probe, &mut buffer)?;
    probe.expire(pacer.now(), timeout);
    Ok(*probe.report())
}

fn collect_echoes<L, C>(
    link: &mut L,
    pacer: &C,
    probe: &mut EchoProbe<MicrosInstant>,
    buffer: &mut [u8],
) -> Result<(), LinkError<L::Error>>
where
    L: SerialLink,
    C: Pacer,
{
    loop {
        let received = link.read_into(buffer)?;
        if received == 0 {
            return Ok(());
        }
        let now = pacer.now();
        for &byte in &buffer[..received] {
            probe.record_echo(byte, now);
        }
    }
}

/// Settings for [`run_relay`].
#[derive(Copy, Clone, Debug)]
pub struct RelayOptions {
    /// Send every received byte straight back.
    pub echo: bool,
    /// Stop after this many bytes.
    pub limit: Option<u64>,
    /// Stop once nothing arrived for this long.
    pub idle_timeout: Option<Duration>,
    pub poll_period: Duration,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            echo: false,
            limit: None,
            idle_timeout: None,
            poll_period: Duration::from_millis(1),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RelayStats {
    pub positive: u64,
    pub negative: u64,
    pub unknown: u64,
    pub echoed: u64,
}

impl RelayStats {
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.positive + self.negative + self.unknown
    }
}

/// Opens the exchange with the start sentinel, then streams spike bytes.
pub fn run_relay<L, C>(
    link: &mut L,
    pacer: &mut C,
    options: RelayOptions,
) -> Result<RelayStats, LinkError<L::Error>>
where
    L: SerialLink,
    C: Pacer,
{
    link.write_byte(START_SENTINEL)?;
    info!("start sentinel sent");

    let mut stats = RelayStats::default();
    let mut buffer = [0u8; READ_CHUNK];
    let mut last_activity = pacer.now();

    loop {
        if options.limit.is_some_and(|limit| stats.total() >= limit) {
            return Ok(stats);
        }

        let received = link.read_into(&mut buffer)?;
        let now = pacer.now();
        if received == 0 {
            if options
                .idle_timeout
                .is_some_and(|idle| now.saturating_duration_since(last_activity) >= idle)
            {
                info!("link idle, stopping relay");
                return Ok(stats);
            }
            pacer.wait(options.poll_period);
            continue;
        }

        last_activity = now;
        for &byte in &buffer[..received] {
            match Polarity::from_byte(byte) {
                Some(Polarity::Positive) => stats.positive += 1,
                Some(Polarity::Negative) => stats.negative += 1,
                None => {
                    stats.unknown += 1;
                    warn!(byte, "unexpected byte on event stream");
                }
            }
            if options.echo {
                match link.write_byte(byte) {
                    Ok(()) => stats.echoed += 1,
                    Err(LinkError::FlowControlTimeout) => warn!(byte, "echo dropped, CTS held"),
                    Err(err) => return Err(err),
                }
            }
            if options.limit.is_some_and(|limit| stats.total() >= limit) {
                break;
            }
        }
    }
}

/// Operator console input.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConsoleInput {
    Empty,
    Help,
    Send(Vec<u8>),
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum ConsoleError {
    #[error("unknown command `{0}`; type `help` for a list")]
    UnknownToken(String),
    #[error("`g` needs a frequency in Hz")]
    MissingFrequency,
    #[error("`{0}` is not a whole number of Hz")]
    BadFrequency(String),
}

/// Translates one console line into the bytes sent to the board.
///
/// Tokens are whitespace separated and case-insensitive. `g45` and `g 45`
/// are both accepted.
pub fn parse_console_line(line: &str) -> Result<ConsoleInput, ConsoleError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(ConsoleInput::Empty);
    }
    if trimmed.eq_ignore_ascii_case("help") {
        return Ok(ConsoleInput::Help);
    }

    let mut bytes = Vec::new();
    let mut tokens = trimmed.split_whitespace();
    while let Some(token) = tokens.next() {
        if token.eq_ignore_ascii_case("start") {
            bytes.push(START_SENTINEL);
            continue;
        }

        let mut chars = token.chars();
        let Some(head) = chars.next().map(|c| c.to_ascii_uppercase()) else {
            continue;
        };
        let rest = chars.as_str();
        let command = match u8::try_from(head) {
            Ok(MuscleCommand::SET_FREQUENCY_CODE) => {
                let argument = if rest.is_empty() {
                    tokens.next().ok_or(ConsoleError::MissingFrequency)?
                } else {
                    rest
                };
                let hz = argument
                    .parse::<i32>()
                    .map_err(|_| ConsoleError::BadFrequency(argument.to_string()))?;
                MuscleCommand::SetFrequency(hz)
            }
            Ok(code) if rest.is_empty() => MuscleCommand::from_code(code)
                .ok_or_else(|| ConsoleError::UnknownToken(token.to_string()))?,
            _ => return Err(ConsoleError::UnknownToken(token.to_string())),
        };
        bytes.extend_from_slice(&command.encode());
    }

    Ok(ConsoleInput::Send(bytes))
}

#[must_use]
pub fn help_lines() -> Vec<String> {
    HELP_TOPICS
        .iter()
        .map(|(_, text)| (*text).to_string())
        .collect()
}

/// One-line rendering of a telemetry record.
#[must_use]
pub fn describe_record(record: &TelemetryRecord<MicrosInstant>) -> String {
    let head = format!(
        "[+{:>6} ms] #{:<5} {}",
        record.timestamp.as_millis(),
        record.id,
        record.event
    );
    let details = match record.details {
        TelemetryPayload::None => String::new(),
        TelemetryPayload::Spike(spike) => {
            let mut text = format!(" byte=0x{:02x}", spike.byte);
            if let Some(step) = spike.step_index {
                text.push_str(&format!(" step={step}"));
            }
            if let Some(gap) = spike.elapsed_since_previous {
                text.push_str(&format!(" gap={}", format_duration_short(gap)));
            }
            text
        }
        TelemetryPayload::Pulse(pulse) => match pulse.held_for {
            Some(held) => format!(" held={}", format_duration_short(held)),
            None => String::new(),
        },
        TelemetryPayload::Frequency(frequency) => format!(
            " {:.1} Hz peers={}",
            frequency.frequency_hz(),
            frequency.peers_updated
        ),
        TelemetryPayload::Ignored(reason) => format!(" {reason}"),
        TelemetryPayload::Fault(fault) => format!(
            " {:?} byte=0x{:02x} dropped={}",
            fault.fault, fault.byte, fault.dropped_total
        ),
        TelemetryPayload::Handshake(handshake) => {
            format!(" discarded={}", handshake.discarded)
        }
        TelemetryPayload::Pressure(pressure) => format!(
            " avg={:.1} grad={:+.1}",
            pressure.average(),
            pressure.gradient()
        ),
    };
    head + &details
}

fn ticks_for(duration: Duration, tick: Duration) -> u64 {
    let ticks = duration.as_micros() / tick.as_micros().max(1);
    u64::try_from(ticks).unwrap_or(u64::MAX)
}

fn format_duration_short(duration: Duration) -> String {
    if duration.as_secs() == 0 {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{:.3}s", duration.as_secs_f64())
    }
}
