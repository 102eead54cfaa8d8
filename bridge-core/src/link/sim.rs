//! In-memory links with injectable byte faults.
//!
//! [`LoopbackLink`] echoes every written byte back to its own receive side, the
//! way a jumpered UART does during bring-up. [`SimulatedWire`] joins two
//! [`WireEndpoint`]s back to back for end-to-end bridge sessions. Both model CTS
//! as "the receiving FIFO has room" and never block: a write that would wait on
//! flow control fails with [`LinkError::FlowControlTimeout`] straight away, and
//! a blocking read fails with [`LinkError::NoDataAvailable`] since no byte can
//! arrive while the single simulation thread is waiting.

use core::cell::RefCell;
use core::convert::Infallible;
use core::fmt;

use heapless::Deque;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::{LinkConfig, LinkCounters, LinkError, SerialLink};

/// Receive FIFO depth of the simulated UART peers.
pub const DEFAULT_FIFO_DEPTH: usize = 64;

/// Seed used when a fault model does not provide one.
pub const DEFAULT_FAULT_SEED: u64 = 0x5EED_CAFE;

/// Probability that a transmitted byte is dropped or has one bit flipped.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FaultModel {
    pub drop_rate: f64,
    pub flip_rate: f64,
    pub seed: u64,
}

impl FaultModel {
    /// Lossless wire.
    pub const NONE: Self = Self {
        drop_rate: 0.0,
        flip_rate: 0.0,
        seed: DEFAULT_FAULT_SEED,
    };

    #[must_use]
    pub const fn new(drop_rate: f64, flip_rate: f64, seed: u64) -> Self {
        Self {
            drop_rate,
            flip_rate,
            seed,
        }
    }

    /// Returns `true` when both rates are probabilities.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        (0.0..=1.0).contains(&self.drop_rate) && (0.0..=1.0).contains(&self.flip_rate)
    }

    #[must_use]
    pub fn is_lossless(&self) -> bool {
        self.drop_rate <= 0.0 && self.flip_rate <= 0.0
    }
}

impl Default for FaultModel {
    fn default() -> Self {
        Self::NONE
    }
}

/// Error raised when a fault model carries rates outside `[0, 1]`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct InvalidFaultModel;

impl fmt::Display for InvalidFaultModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("fault rates must lie within [0, 1]")
    }
}

/// Counts of faults injected so far.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct FaultCounters {
    pub dropped: u64,
    pub flipped: u64,
}

/// One direction of a simulated wire: a bounded FIFO plus fault injection.
struct Lane<const DEPTH: usize> {
    fifo: Deque<u8, DEPTH>,
    model: FaultModel,
    rng: ChaCha8Rng,
    faults: FaultCounters,
    receiver_ready: bool,
}

impl<const DEPTH: usize> Lane<DEPTH> {
    fn new(model: FaultModel, seed_offset: u64) -> Self {
        Self {
            fifo: Deque::new(),
            model,
            rng: ChaCha8Rng::seed_from_u64(model.seed.wrapping_add(seed_offset)),
            faults: FaultCounters::default(),
            receiver_ready: true,
        }
    }

    fn clear_to_send(&self) -> bool {
        self.receiver_ready && !self.fifo.is_full()
    }

    fn transmit(&mut self, byte: u8) -> Result<(), LinkError<Infallible>> {
        if !self.clear_to_send() {
            return Err(LinkError::FlowControlTimeout);
        }

        if self.model.drop_rate > 0.0 && self.rng.random_bool(self.model.drop_rate) {
            self.faults.dropped += 1;
            return Ok(());
        }

        let mut delivered = byte;
        if self.model.flip_rate > 0.0 && self.rng.random_bool(self.model.flip_rate) {
            let bit: u8 = self.rng.random_range(0..8);
            delivered ^= 1 << bit;
            self.faults.flipped += 1;
        }

        self.fifo
            .push_back(delivered)
            .map_err(|_| LinkError::FlowControlTimeout)
    }

    fn receive(&mut self) -> Option<u8> {
        self.fifo.pop_front()
    }

    fn len(&self) -> usize {
        self.fifo.len()
    }
}

/// UART with TX jumpered to RX.
pub struct LoopbackLink<const DEPTH: usize = DEFAULT_FIFO_DEPTH> {
    lane: Lane<DEPTH>,
    config: LinkConfig,
    counters: LinkCounters,
}

impl<const DEPTH: usize> LoopbackLink<DEPTH> {
    /// Opens a loopback link after validating the configuration and fault model.
    pub fn open(
        config: LinkConfig,
        faults: FaultModel,
    ) -> Result<Self, LinkError<InvalidFaultModel>> {
        config.validate().map_err(LinkError::Unavailable)?;
        if !faults.is_valid() {
            return Err(LinkError::Other(InvalidFaultModel));
        }

        Ok(Self {
            lane: Lane::new(faults, 0),
            config,
            counters: LinkCounters::new(),
        })
    }

    #[must_use]
    pub const fn config(&self) -> &LinkConfig {
        &self.config
    }

    #[must_use]
    pub fn faults(&self) -> FaultCounters {
        self.lane.faults
    }

    /// Simulates the receiver raising (`true`) or dropping (`false`) RTS.
    pub fn set_receiver_ready(&mut self, ready: bool) {
        self.lane.receiver_ready = ready;
    }
}

impl<const DEPTH: usize> SerialLink for LoopbackLink<DEPTH> {
    type Error = Infallible;

    fn write_byte(&mut self, byte: u8) -> Result<(), LinkError<Self::Error>> {
        self.lane.transmit(byte)?;
        self.counters.record_written(1);
        Ok(())
    }

    fn bytes_available(&mut self) -> Result<usize, LinkError<Self::Error>> {
        Ok(self.lane.len())
    }

    fn read_byte(&mut self) -> Result<u8, LinkError<Self::Error>> {
        let byte = self.lane.receive().ok_or(LinkError::NoDataAvailable)?;
        self.counters.record_read(1);
        Ok(byte)
    }

    fn counters(&self) -> LinkCounters {
        self.counters
    }
}

/// Two lanes wired back to back.
pub struct SimulatedWire<const DEPTH: usize = DEFAULT_FIFO_DEPTH> {
    a_to_b: RefCell<Lane<DEPTH>>,
    b_to_a: RefCell<Lane<DEPTH>>,
}

impl<const DEPTH: usize> SimulatedWire<DEPTH> {
    /// Creates a wire applying `faults` independently to both directions.
    pub fn new(faults: FaultModel) -> Result<Self, InvalidFaultModel> {
        if !faults.is_valid() {
            return Err(InvalidFaultModel);
        }

        Ok(Self {
            a_to_b: RefCell::new(Lane::new(faults, 0)),
            b_to_a: RefCell::new(Lane::new(faults, 1)),
        })
    }

    /// Returns the two ends of the wire, both configured with `config`.
    pub fn endpoints(
        &self,
        config: LinkConfig,
    ) -> Result<(WireEndpoint<'_, DEPTH>, WireEndpoint<'_, DEPTH>), LinkError<Infallible>> {
        config.validate().map_err(LinkError::Unavailable)?;

        Ok((
            WireEndpoint {
                tx: &self.a_to_b,
                rx: &self.b_to_a,
                counters: LinkCounters::new(),
            },
            WireEndpoint {
                tx: &self.b_to_a,
                rx: &self.a_to_b,
                counters: LinkCounters::new(),
            },
        ))
    }

    /// Faults injected on the A → B direction.
    #[must_use]
    pub fn faults_a_to_b(&self) -> FaultCounters {
        self.a_to_b.borrow().faults
    }

    /// Faults injected on the B → A direction.
    #[must_use]
    pub fn faults_b_to_a(&self) -> FaultCounters {
        self.b_to_a.borrow().faults
    }
}

/// One end of a [`SimulatedWire`].
pub struct WireEndpoint<'w, const DEPTH: usize = DEFAULT_FIFO_DEPTH> {
    tx: &'w RefCell<Lane<DEPTH>>,
    rx: &'w RefCell<Lane<DEPTH>>,
    counters: LinkCounters,
}

impl<const DEPTH: usize> WireEndpoint<'_, DEPTH> {
    /// Simulates this end raising or dropping RTS toward its peer.
    pub fn set_receiver_ready(&mut self, ready: bool) {
        self.rx.borrow_mut().receiver_ready = ready;
    }
}

impl<const DEPTH: usize> SerialLink for WireEndpoint<'_, DEPTH> {
    type Error = Infallible;

    fn write_byte(&mut self, byte: u8) -> Result<(), LinkError<Self::Error>> {
        self.tx.borrow_mut().transmit(byte)?;
        self.counters.record_written(1);
        Ok(())
    }

    fn bytes_available(&mut self) -> Result<usize, LinkError<Self::Error>> {
        Ok(self.rx.borrow().len())
    }

    fn read_byte(&mut self) -> Result<u8, LinkError<Self::Error>> {
        let byte = self
            .rx
            .borrow_mut()
            .receive()
            .ok_or(LinkError::NoDataAvailable)?;
        self.counters.record_read(1);
        Ok(byte)
    }

    fn counters(&self) -> LinkCounters {
        self.counters
    }
}
