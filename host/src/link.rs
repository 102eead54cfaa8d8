//! `serialport`-backed [`SerialLink`] for talking to a real actuator board.

use std::fmt;
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use bridge_core::clock::MicrosInstant;
use bridge_core::link::{
    LinkConfig, LinkCounters, LinkError, ReadMode, SerialLink, UnavailableReason,
};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, trace};

/// Serial port configured for 8N1 with RTS/CTS handshaking.
pub struct SerialPortLink {
    port: Box<dyn SerialPort>,
    config: LinkConfig,
    timeout: Duration,
    counters: LinkCounters,
}

impl SerialPortLink {
    /// Opens `path` with the framing and baud rate in `config`.
    pub fn open(path: &str, config: LinkConfig) -> Result<Self, LinkError<serialport::Error>> {
        config.validate().map_err(LinkError::Unavailable)?;

        let timeout = config.flow_control_budget;
        let port = serialport::new(path, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::Hardware)
            .timeout(timeout)
            .open()
            .map_err(classify_open_error)?;

        debug!(port = path, baud = config.baud_rate, frame = %config.frame, "serial link open");

        Ok(Self {
            port,
            config,
            timeout,
            counters: LinkCounters::new(),
        })
    }

    /// Names of the serial ports the OS reports.
    #[must_use]
    pub fn list_ports() -> Vec<String> {
        serialport::available_ports()
            .map(|ports| ports.into_iter().map(|port| port.port_name).collect())
            .unwrap_or_default()
    }

    fn apply_timeout(&mut self, timeout: Duration) -> Result<(), LinkError<serialport::Error>> {
        if self.timeout != timeout {
            self.port.set_timeout(timeout).map_err(LinkError::Other)?;
            self.timeout = timeout;
        }
        Ok(())
    }

    fn read_timeout(&self) -> Duration {
        match self.config.read_mode {
            ReadMode::NonBlocking => self.config.flow_control_budget,
            ReadMode::Blocking { timeout } => timeout,
        }
    }
}

impl SerialLink for SerialPortLink {
    type Error = serialport::Error;

    fn write_byte(&mut self, byte: u8) -> Result<(), LinkError<Self::Error>> {
        self.write_bytes(&[byte])
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), LinkError<Self::Error>> {
        self.apply_timeout(self.config.flow_control_budget)?;
        self.port.write_all(bytes).map_err(classify_write_error)?;
        self.counters.record_written(bytes.len());
        trace!(bytes = %HexBytes(bytes), "tx");
        Ok(())
    }

    fn bytes_available(&mut self) -> Result<usize, LinkError<Self::Error>> {
        let waiting = self.port.bytes_to_read().map_err(LinkError::Other)?;
        Ok(usize::try_from(waiting).unwrap_or(usize::MAX))
    }

    fn read_byte(&mut self) -> Result<u8, LinkError<Self::Error>> {
        if self.config.read_mode == ReadMode::NonBlocking && self.bytes_available()? == 0 {
            return Err(LinkError::NoDataAvailable);
        }

        let mut byte = [0u8; 1];
        if self.read_into_port(&mut byte)? == 0 {
            return Err(LinkError::NoDataAvailable);
        }
        Ok(byte[0])
    }

    fn read_into(&mut self, buffer: &mut [u8]) -> Result<usize, LinkError<Self::Error>> {
        let available = self.bytes_available()?.min(buffer.len());
        if available == 0 {
            return Ok(0);
        }
        self.read_into_port(&mut buffer[..available])
    }

    fn counters(&self) -> LinkCounters {
        self.counters
    }
}

impl SerialPortLink {
    fn read_into_port(&mut self, buffer: &mut [u8]) -> Result<usize, LinkError<serialport::Error>> {
        self.apply_timeout(self.read_timeout())?;
        match self.port.read(buffer) {
            Ok(count) => {
                self.counters.record_read(count);
                trace!(bytes = %HexBytes(&buffer[..count]), "rx");
                Ok(count)
            }
            Err(err) if err.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(err) => Err(LinkError::Other(err.into())),
        }
    }
}

fn classify_open_error(err: serialport::Error) -> LinkError<serialport::Error> {
    match err.kind() {
        serialport::ErrorKind::NoDevice => LinkError::Unavailable(UnavailableReason::DeviceNotFound),
        serialport::ErrorKind::InvalidInput => {
            LinkError::Unavailable(UnavailableReason::ConfigurationRejected)
        }
        serialport::ErrorKind::Io(io::ErrorKind::NotFound) => {
            LinkError::Unavailable(UnavailableReason::DeviceNotFound)
        }
        serialport::ErrorKind::Io(io::ErrorKind::PermissionDenied | io::ErrorKind::ResourceBusy) => {
            LinkError::Unavailable(UnavailableReason::DeviceBusy)
        }
        _ => LinkError::Other(err),
    }
}

fn classify_write_error(err: io::Error) -> LinkError<serialport::Error> {
    if err.kind() == io::ErrorKind::TimedOut {
        LinkError::FlowControlTimeout
    } else {
        LinkError::Other(err.into())
    }
}

/// Space-separated hex rendering for trace output.
pub struct HexBytes<'a>(pub &'a [u8]);

impl fmt::Display for HexBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, byte) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Wall clock mapped onto [`MicrosInstant`] from a session origin.
#[derive(Copy, Clone, Debug)]
pub struct HostClock {
    origin: Instant,
}

impl HostClock {
    #[must_use]
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    #[must_use]
    pub fn now(&self) -> MicrosInstant {
        let elapsed = self.origin.elapsed().as_micros();
        MicrosInstant::from_micros(u64::try_from(elapsed).unwrap_or(u64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_bytes_are_space_separated() {
        assert_eq!(HexBytes(&[0xff, 0x00, 0x47]).to_string(), "ff 00 47");
        assert_eq!(HexBytes(&[]).to_string(), "");
    }

    #[test]
    fn missing_device_is_reported_unavailable() {
        let err = serialport::Error::new(serialport::ErrorKind::NoDevice, "gone");
        assert!(matches!(
            classify_open_error(err),
            LinkError::Unavailable(UnavailableReason::DeviceNotFound)
        ));
    }

    #[test]
    fn write_timeout_means_cts_held_off() {
        let err = io::Error::from(io::ErrorKind::TimedOut);
        assert!(matches!(
            classify_write_error(err),
            LinkError::FlowControlTimeout
        ));
    }

    #[test]
    fn unsupported_baud_is_rejected_before_opening() {
        let result = SerialPortLink::open("/dev/null-bridge", LinkConfig::new(12_345));
        assert!(matches!(
            result,
            Err(LinkError::Unavailable(UnavailableReason::UnsupportedBaud(12_345)))
        ));
    }

    #[test]
    fn host_clock_is_monotonic() {
        let clock = HostClock::start();
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }
}
