//! Host tooling for the spike to muscle bridge.
//!
//! ```bash
//! # End-to-end run against a simulated peer
//! muscle-bridge simulate --commands "f g45"
//!
//! # Echo self-test against a board running the loopback firmware
//! muscle-bridge --port /dev/ttyUSB0 probe --trials 10000
//!
//! # Open the exchange and stream spike bytes
//! muscle-bridge --port /dev/ttyUSB0 relay --echo
//!
//! # Type muscle commands by hand
//! muscle-bridge --port /dev/ttyUSB0 console
//! ```

mod error;
mod link;
mod session;

use std::io::{self, BufRead, Write};
use std::time::Duration;

use bridge_core::bridge::BridgeConfig;
use bridge_core::link::sim::{FaultModel, LoopbackLink};
use bridge_core::link::{DEFAULT_BAUD_RATE, LinkConfig, ProbeReport, SerialLink};
use bridge_core::waveform::{EmissionPolicy, Polarity, WaveformParams};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

use error::HostError;
use link::SerialPortLink;
use session::{
    ConsoleInput, RelayOptions, SimulationOptions, VirtualPacer, WallPacer, help_lines,
    parse_console_line, run_probe, run_relay, run_simulation,
};

#[derive(Parser, Debug)]
#[command(name = "muscle-bridge")]
#[command(author, version, about = "Spike to pneumatic muscle bridge tooling", long_about = None)]
struct Cli {
    /// Logging verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Serial port path (e.g. /dev/ttyUSB0 or COM3)
    #[arg(short, long, global = true)]
    port: Option<String>,

    /// Link baud rate
    #[arg(short, long, global = true, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum PolicyArg {
    /// Emit faster as the waveform grows
    Inverse,
    /// Emit when the waveform crosses an amplitude step
    Threshold,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the bridge against a simulated peer on a virtual clock
    Simulate(SimulateArgs),

    /// Measure loss and round trip against an echoing peer
    Probe(ProbeArgs),

    /// Send the start sentinel and stream spike bytes from the board
    Relay {
        /// Echo every received byte back
        #[arg(long)]
        echo: bool,

        /// Stop after this many bytes
        #[arg(long)]
        count: Option<u64>,

        /// Stop after this many idle milliseconds
        #[arg(long)]
        idle_ms: Option<u64>,
    },

    /// Type muscle commands and send them to the board
    Console,

    /// List serial ports
    Ports,
}

#[derive(clap::Args, Debug)]
struct SimulateArgs {
    /// Waveform amplitude
    #[arg(long, default_value_t = 50.0)]
    amplitude: f32,

    /// Waveform frequency in Hz
    #[arg(long, default_value_t = 1.0)]
    frequency: f32,

    /// Phase shift in radians
    #[arg(long, default_value_t = 0.0)]
    phase: f32,

    /// Generator run time in milliseconds
    #[arg(long, default_value_t = 2_000)]
    duration_ms: u64,

    #[arg(long, value_enum, default_value_t = PolicyArg::Inverse)]
    policy: PolicyArg,

    /// Minimum spacing for the inverse policy, in milliseconds
    #[arg(long, default_value_t = 5)]
    floor_ms: u64,

    /// Amplitude steps for the threshold policy
    #[arg(long, default_value_t = 4)]
    steps: u8,

    /// Most inbound bytes handled per tick
    #[arg(long, default_value_t = 32)]
    drain_cap: usize,

    /// Console-style commands the peer sends after the start sentinel
    #[arg(long, default_value = "")]
    commands: String,

    #[command(flatten)]
    faults: FaultArgs,

    /// Print every telemetry record
    #[arg(long)]
    telemetry: bool,
}

impl SimulateArgs {
    fn options(&self) -> SimulationOptions {
        let params = WaveformParams::new(
            self.amplitude,
            self.frequency,
            self.phase,
            Some(Duration::from_millis(self.duration_ms)),
        );
        let policy = match self.policy {
            PolicyArg::Inverse => {
                EmissionPolicy::inverse_magnitude(Duration::from_millis(self.floor_ms))
            }
            PolicyArg::Threshold => EmissionPolicy::threshold_crossing(self.steps),
        };
        let script = match parse_console_line(&self.commands) {
            Ok(ConsoleInput::Send(bytes)) => bytes,
            Ok(_) => Vec::new(),
            Err(err) => {
                warn!("ignoring peer commands: {err}");
                Vec::new()
            }
        };

        SimulationOptions::new(params, policy)
            .with_peer_script(script)
            .with_faults(self.faults.model())
            .with_bridge(BridgeConfig::new().with_drain_cap(self.drain_cap))
    }
}

#[derive(clap::Args, Debug)]
struct ProbeArgs {
    #[arg(long, default_value_t = 1_000)]
    trials: u32,

    /// Gap between probes in microseconds
    #[arg(long, default_value_t = 1_000)]
    spacing_us: u64,

    /// Echo timeout in milliseconds
    #[arg(long, default_value_t = 100)]
    timeout_ms: u64,

    /// Use the in-memory loopback instead of a port
    #[arg(long)]
    loopback: bool,

    #[command(flatten)]
    faults: FaultArgs,
}

#[derive(clap::Args, Debug, Copy, Clone)]
struct FaultArgs {
    /// Probability of dropping a byte on the simulated wire
    #[arg(long, default_value_t = 0.0)]
    drop_rate: f64,

    /// Probability of flipping a bit on the simulated wire
    #[arg(long, default_value_t = 0.0)]
    flip_rate: f64,

    /// Seed for the fault generator
    #[arg(long, default_value_t = 1)]
    seed: u64,
}

impl FaultArgs {
    fn model(self) -> FaultModel {
        FaultModel::new(self.drop_rate, self.flip_rate, self.seed)
    }
}

fn main() -> Result<(), HostError> {
    let cli = Cli::parse();

    let log_level = cli
        .log_level
        .parse::<Level>()
        .map_err(|_| HostError::LogLevel(cli.log_level.clone()))?;
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("muscle-bridge v{}", env!("CARGO_PKG_VERSION"));

    let link_config = LinkConfig::new(cli.baud);
    match cli.command {
        Commands::Simulate(args) => simulate(&args.options(), args.telemetry),
        Commands::Probe(args) => probe(&args, cli.port.as_deref(), link_config),
        Commands::Relay {
            echo,
            count,
            idle_ms,
        } => {
            let mut link = open_port(cli.port.as_deref(), "relay", link_config)?;
            let options = RelayOptions {
                echo,
                limit: count,
                idle_timeout: idle_ms.map(Duration::from_millis),
                ..RelayOptions::default()
            };
            let stats = run_relay(&mut link, &mut WallPacer::start(), options)?;
            println!(
                "received {} bytes: {} positive, {} negative, {} unknown, {} echoed",
                stats.total(),
                stats.positive,
                stats.negative,
                stats.unknown,
                stats.echoed
            );
            Ok(())
        }
        Commands::Console => {
            let mut link = open_port(cli.port.as_deref(), "console", link_config)?;
            console(&mut link)
        }
        Commands::Ports => {
            for port in SerialPortLink::list_ports() {
                println!("{port}");
            }
            Ok(())
        }
    }
}

fn open_port(
    port: Option<&str>,
    command: &'static str,
    config: LinkConfig,
) -> Result<SerialPortLink, HostError> {
    let path = port.ok_or(HostError::MissingPort(command))?;
    Ok(SerialPortLink::open(path, config)?)
}

fn probe(args: &ProbeArgs, port: Option<&str>, config: LinkConfig) -> Result<(), HostError> {
    let spacing = Duration::from_micros(args.spacing_us);
    let timeout = Duration::from_millis(args.timeout_ms);
    let report = if args.loopback {
        let mut link = LoopbackLink::<64>::open(config, args.faults.model())?;
        let mut pacer = VirtualPacer::default();
        run_probe(&mut link, &mut pacer, args.trials, spacing, timeout)?
    } else {
        let mut link = open_port(port, "probe", config)?;
        run_probe(&mut link, &mut WallPacer::start(), args.trials, spacing, timeout)?
    };
    print_probe(&report);
    Ok(())
}

fn simulate(options: &SimulationOptions, show_telemetry: bool) -> Result<(), HostError> {
    let summary = run_simulation(options)?;
    if show_telemetry {
        for line in &summary.telemetry {
            println!("{line}");
        }
    }

    println!(
        "{} ticks, generator {}",
        summary.ticks,
        if summary.generator_stopped {
            "stopped"
        } else {
            "still running"
        }
    );
    println!(
        "peer received {} spikes ({} positive, {} negative, {} garbled)",
        summary.spikes_received(),
        summary.positive_spikes,
        summary.negative_spikes,
        summary.garbled
    );
    println!(
        "bridge: {} sent, {} dropped, {} commands applied, {} ignored, {} bytes drained",
        summary.stats.events_sent,
        summary.stats.events_dropped,
        summary.stats.commands_applied,
        summary.stats.commands_ignored,
        summary.stats.bytes_drained
    );
    println!("{} pulses started", summary.pulses_started);
    for (name, hz) in &summary.frequencies {
        println!("  {name}: {hz:.1} Hz");
    }
    Ok(())
}

fn print_probe(report: &ProbeReport) {
    println!(
        "sent {} echoed {} lost {} corrupted {} unexpected {}",
        report.sent, report.echoed, report.lost, report.corrupted, report.unexpected
    );
    println!("loss rate {:.4}", report.loss_rate());
    match report.mean_round_trip() {
        Some(mean) => println!(
            "round trip mean {} us, max {} us",
            mean.as_micros(),
            report.max_round_trip.as_micros()
        ),
        None => println!("no echoes received"),
    }
}

fn console(link: &mut SerialPortLink) -> Result<(), HostError> {
    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut line = String::new();

    writeln!(
        writer,
        "Muscle console ready. Type `help` for commands or `exit` to quit."
    )?;

    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if should_terminate(trimmed) {
            writeln!(writer, "Session closed.")?;
            break;
        }

        match parse_console_line(trimmed) {
            Ok(ConsoleInput::Empty) => {}
            Ok(ConsoleInput::Help) => {
                for help in help_lines() {
                    writeln!(writer, "{help}")?;
                }
            }
            Ok(ConsoleInput::Send(bytes)) => {
                link.write_bytes(&bytes)?;
                writeln!(writer, "sent {} bytes", bytes.len())?;
            }
            Err(err) => writeln!(writer, "{err}")?,
        }

        let (positive, negative) = drain_spikes(link)?;
        if positive + negative > 0 {
            writeln!(writer, "rx: {positive} positive, {negative} negative")?;
        }
    }

    Ok(())
}

fn drain_spikes(link: &mut SerialPortLink) -> Result<(usize, usize), HostError> {
    let mut buffer = [0u8; 64];
    let mut positive = 0;
    let mut negative = 0;
    loop {
        let received = link.read_into(&mut buffer)?;
        if received == 0 {
            return Ok((positive, negative));
        }
        for &byte in &buffer[..received] {
            match Polarity::from_byte(byte) {
                Some(Polarity::Positive) => positive += 1,
                Some(Polarity::Negative) => negative += 1,
                None => warn!(byte, "unexpected byte from board"),
            }
        }
    }
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}
