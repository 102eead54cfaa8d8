//! Point-to-point byte transport contract.
//!
//! A [`SerialLink`] moves single bytes between two fixed endpoints over a UART
//! configured for 8N1 framing with RTS/CTS hardware flow control. The transport
//! preserves order and nothing else: there is no retransmission, checksum, or
//! sequence number. Loss and latency are measured from the outside with
//! [`EchoProbe`].
//!
//! Firmware implements the trait on top of Embassy channels fed by the UART
//! task, the host tooling implements it on a `serialport` handle, and
//! [`sim`] provides in-memory wires with injectable faults for tests.

use core::fmt;
use core::time::Duration;

mod probe;
pub mod sim;

pub use probe::{EchoMatch, EchoProbe, ProbeReport};

/// Byte that opens the data exchange after both endpoints are up.
pub const START_SENTINEL: u8 = 0xFF;

/// Pattern used by the loopback self-test.
pub const LOOPBACK_TEST_PATTERN: [u8; 8] = [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE, 0xBA, 0xBE];

/// Highest baud rate the UART peers are rated for.
pub const MAX_BAUD_RATE: u32 = 1_000_000;

/// Baud rates accepted by [`LinkConfig::validate`].
pub const SUPPORTED_BAUD_RATES: [u32; 9] = [
    9_600, 19_200, 38_400, 57_600, 115_200, 230_400, 460_800, 921_600, MAX_BAUD_RATE,
];

/// Baud rate used when none is configured.
pub const DEFAULT_BAUD_RATE: u32 = MAX_BAUD_RATE;

/// How long a write may wait on a deasserted CTS before giving up.
pub const DEFAULT_FLOW_CONTROL_BUDGET: Duration = Duration::from_millis(10);

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DataBits {
    Seven,
    Eight,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Parity {
    None,
    Even,
    Odd,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StopBits {
    One,
    Two,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FlowControl {
    None,
    RtsCts,
}

/// Character framing plus handshake selection.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FrameFormat {
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
}

impl FrameFormat {
    /// 8 data bits, no parity, 1 stop bit, RTS/CTS.
    pub const STANDARD: Self = Self {
        data_bits: DataBits::Eight,
        parity: Parity::None,
        stop_bits: StopBits::One,
        flow_control: FlowControl::RtsCts,
    };
}

impl Default for FrameFormat {
    fn default() -> Self {
        Self::STANDARD
    }
}

impl fmt::Display for FrameFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bits = match self.data_bits {
            DataBits::Seven => '7',
            DataBits::Eight => '8',
        };
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Even => 'E',
            Parity::Odd => 'O',
        };
        let stop = match self.stop_bits {
            StopBits::One => '1',
            StopBits::Two => '2',
        };
        let handshake = match self.flow_control {
            FlowControl::None => "",
            FlowControl::RtsCts => " rts/cts",
        };
        write!(f, "{bits}{parity}{stop}{handshake}")
    }
}

/// Behaviour of [`SerialLink::read_byte`] when nothing has arrived.
///
/// * `NonBlocking` fails immediately with [`LinkError::NoDataAvailable`]; callers
///   poll [`SerialLink::bytes_available`] first.
/// * `Blocking` waits up to `timeout` for a byte and then fails the same way.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum ReadMode {
    #[default]
    NonBlocking,
    Blocking { timeout: Duration },
}

/// Configuration applied when a link is opened.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LinkConfig {
    pub baud_rate: u32,
    pub frame: FrameFormat,
    pub read_mode: ReadMode,
    pub flow_control_budget: Duration,
}

impl LinkConfig {
    #[must_use]
    pub const fn new(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            frame: FrameFormat::STANDARD,
            read_mode: ReadMode::NonBlocking,
            flow_control_budget: DEFAULT_FLOW_CONTROL_BUDGET,
        }
    }

    #[must_use]
    pub const fn with_read_mode(mut self, read_mode: ReadMode) -> Self {
        self.read_mode = read_mode;
        self
    }

    #[must_use]
    pub const fn with_frame(mut self, frame: FrameFormat) -> Self {
        self.frame = frame;
        self
    }

    /// Rejects baud rates and frame formats the peers cannot run.
    pub fn validate(&self) -> Result<(), UnavailableReason> {
        if !SUPPORTED_BAUD_RATES.contains(&self.baud_rate) {
            return Err(UnavailableReason::UnsupportedBaud(self.baud_rate));
        }
        if self.frame != FrameFormat::STANDARD {
            return Err(UnavailableReason::UnsupportedFrame(self.frame));
        }
        Ok(())
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BAUD_RATE)
    }
}

/// Why a link could not be opened or configured.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum UnavailableReason {
    UnsupportedBaud(u32),
    UnsupportedFrame(FrameFormat),
    DeviceNotFound,
    DeviceBusy,
    ConfigurationRejected,
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnavailableReason::UnsupportedBaud(baud) => write!(f, "unsupported baud rate {baud}"),
            UnavailableReason::UnsupportedFrame(frame) => {
                write!(f, "unsupported frame format {frame}")
            }
            UnavailableReason::DeviceNotFound => f.write_str("device not found"),
            UnavailableReason::DeviceBusy => f.write_str("device busy"),
            UnavailableReason::ConfigurationRejected => {
                f.write_str("device rejected configuration")
            }
        }
    }
}

/// Errors surfaced by [`SerialLink`] implementations.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LinkError<E = ()> {
    /// The device could not be opened or configured. Fatal for the endpoint.
    Unavailable(UnavailableReason),
    /// No byte was queued (or arrived before the blocking timeout).
    NoDataAvailable,
    /// The peer held CTS deasserted for longer than the flow-control budget.
    FlowControlTimeout,
    /// Transport-specific failure.
    Other(E),
}

impl<E> LinkError<E> {
    /// Maps the inner error type.
    pub fn map_other<F, M>(self, mapper: M) -> LinkError<F>
    where
        M: FnOnce(E) -> F,
    {
        match self {
            LinkError::Unavailable(reason) => LinkError::Unavailable(reason),
            LinkError::NoDataAvailable => LinkError::NoDataAvailable,
            LinkError::FlowControlTimeout => LinkError::FlowControlTimeout,
            LinkError::Other(err) => LinkError::Other(mapper(err)),
        }
    }

    /// Returns `true` for the ordinary "nothing to read" condition.
    pub const fn is_no_data(&self) -> bool {
        matches!(self, LinkError::NoDataAvailable)
    }
}

impl<E> fmt::Display for LinkError<E>
where
    E: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::Unavailable(reason) => write!(f, "link unavailable: {reason}"),
            LinkError::NoDataAvailable => f.write_str("no data available"),
            LinkError::FlowControlTimeout => f.write_str("flow control timeout (CTS deasserted)"),
            LinkError::Other(err) => write!(f, "transport error: {err:?}"),
        }
    }
}

/// Running byte counts in both directions.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct LinkCounters {
    pub bytes_written: u64,
    pub bytes_read: u64,
}

impl LinkCounters {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bytes_written: 0,
            bytes_read: 0,
        }
    }

    pub fn record_written(&mut self, count: usize) {
        self.bytes_written = self.bytes_written.saturating_add(widen(count));
    }

    pub fn record_read(&mut self, count: usize) {
        self.bytes_read = self.bytes_read.saturating_add(widen(count));
    }
}

fn widen(count: usize) -> u64 {
    u64::try_from(count).unwrap_or(u64::MAX)
}

/// Duplex, order-preserving byte channel with hardware flow control.
pub trait SerialLink {
    /// Transport-specific error type.
    type Error;

    /// Queues one byte for transmission.
    ///
    /// Success means the local hardware accepted the byte, not that the peer
    /// received it.
    fn write_byte(&mut self, byte: u8) -> Result<(), LinkError<Self::Error>>;

    /// Queues every byte of `bytes` in order, stopping at the first failure.
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), LinkError<Self::Error>> {
        for &byte in bytes {
            self.write_byte(byte)?;
        }
        Ok(())
    }

    /// Returns the number of received bytes that can be read without waiting.
    fn bytes_available(&mut self) -> Result<usize, LinkError<Self::Error>>;

    /// Reads one byte according to the configured [`ReadMode`].
    fn read_byte(&mut self) -> Result<u8, LinkError<Self::Error>>;

    /// Reads up to `buffer.len()` of the bytes already available.
    fn read_into(&mut self, buffer: &mut [u8]) -> Result<usize, LinkError<Self::Error>> {
        let available = self.bytes_available()?.min(buffer.len());
        for slot in buffer.iter_mut().take(available) {
            *slot = self.read_byte()?;
        }
        Ok(available)
    }

    /// Byte counts observed since the link was opened.
    fn counters(&self) -> LinkCounters;
}
