#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Byte queues between the UART task and the bridge task.
//!
//! The UART task owns the `BufferedUart` and shuttles bytes through two
//! bounded channels. The bridge task sees them as a [`SerialLink`] through
//! [`QueueLink`], which never awaits: a full transmit queue means the peer has
//! held CTS long enough to back the UART up, so the write fails with
//! [`LinkError::FlowControlTimeout`] and the bridge applies its fault policy.

use core::convert::Infallible;

use bridge_core::link::{LinkCounters, LinkError, SerialLink};
use embassy_sync::channel::{Channel, Receiver, Sender, TryReceiveError, TrySendError};

#[cfg(not(target_os = "none"))]
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
#[cfg(target_os = "none")]
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;

#[cfg(target_os = "none")]
type LinkMutex = ThreadModeRawMutex;
#[cfg(not(target_os = "none"))]
type LinkMutex = NoopRawMutex;

/// Inbound bytes buffered between UART reads and bridge ticks.
pub const RX_QUEUE_DEPTH: usize = 256;

/// Outbound bytes buffered while the UART waits on CTS.
pub const TX_QUEUE_DEPTH: usize = 64;

pub type RxChannel = Channel<LinkMutex, u8, RX_QUEUE_DEPTH>;
pub type TxChannel = Channel<LinkMutex, u8, TX_QUEUE_DEPTH>;

/// Producer half used by the UART receive loop.
pub type RxSender<'a> = Sender<'a, LinkMutex, u8, RX_QUEUE_DEPTH>;

/// Consumer half used by the UART transmit loop.
pub type TxReceiver<'a> = Receiver<'a, LinkMutex, u8, TX_QUEUE_DEPTH>;

/// Both directions of the UART byte stream.
pub struct UartQueues {
    rx: RxChannel,
    tx: TxChannel,
}

impl UartQueues {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            rx: Channel::new(),
            tx: Channel::new(),
        }
    }

    #[must_use]
    pub fn rx_sender(&self) -> RxSender<'_> {
        self.rx.sender()
    }

    #[must_use]
    pub fn tx_receiver(&self) -> TxReceiver<'_> {
        self.tx.receiver()
    }

    /// Bridge-side view of the queues.
    #[must_use]
    pub fn link(&self) -> QueueLink<'_> {
        QueueLink {
            queues: self,
            counters: LinkCounters::new(),
        }
    }
}

impl Default for UartQueues {
    fn default() -> Self {
        Self::new()
    }
}

/// Non-blocking [`SerialLink`] over [`UartQueues`].
pub struct QueueLink<'a> {
    queues: &'a UartQueues,
    counters: LinkCounters,
}

impl SerialLink for QueueLink<'_> {
    type Error = Infallible;

    fn write_byte(&mut self, byte: u8) -> Result<(), LinkError<Self::Error>> {
        match self.queues.tx.try_send(byte) {
            Ok(()) => {
                self.counters.record_written(1);
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(LinkError::FlowControlTimeout),
        }
    }

    fn bytes_available(&mut self) -> Result<usize, LinkError<Self::Error>> {
        Ok(self.queues.rx.len())
    }

    fn read_byte(&mut self) -> Result<u8, LinkError<Self::Error>> {
        match self.queues.rx.try_receive() {
            Ok(byte) => {
                self.counters.record_read(1);
                Ok(byte)
            }
            Err(TryReceiveError::Empty) => Err(LinkError::NoDataAvailable),
        }
    }

    fn counters(&self) -> LinkCounters {
        self.counters
    }
}
