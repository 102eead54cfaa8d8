use std::convert::Infallible;
use std::io;

use bridge_core::bridge::BridgeError;
use bridge_core::link::LinkError;
use bridge_core::link::sim::InvalidFaultModel;
use bridge_core::muscle::{FrequencyError, GroupFull};
use bridge_core::waveform::GeneratorError;
use thiserror::Error;

/// Failures surfaced by the host commands.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Link(LinkError<serialport::Error>),

    #[error("simulated {0}")]
    Simulated(BridgeError<Infallible>),

    #[error("invalid waveform: {0}")]
    Waveform(GeneratorError),

    #[error("invalid muscle configuration: {0}")]
    Muscle(FrequencyError),

    #[error("muscle group is full")]
    GroupFull,

    #[error("{0}")]
    FaultModel(InvalidFaultModel),

    #[error("loopback {0}")]
    Loopback(LinkError<InvalidFaultModel>),

    #[error("failed to install log subscriber: {0}")]
    Logging(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("--port is required for `{0}`")]
    MissingPort(&'static str),

    #[error("unknown log level `{0}`")]
    LogLevel(String),
}

impl From<LinkError<serialport::Error>> for HostError {
    fn from(value: LinkError<serialport::Error>) -> Self {
        HostError::Link(value)
    }
}

impl From<LinkError<Infallible>> for HostError {
    fn from(value: LinkError<Infallible>) -> Self {
        HostError::Simulated(BridgeError::Receive(value))
    }
}

impl From<LinkError<InvalidFaultModel>> for HostError {
    fn from(value: LinkError<InvalidFaultModel>) -> Self {
        HostError::Loopback(value)
    }
}

impl From<BridgeError<Infallible>> for HostError {
    fn from(value: BridgeError<Infallible>) -> Self {
        HostError::Simulated(value)
    }
}

impl From<GeneratorError> for HostError {
    fn from(value: GeneratorError) -> Self {
        HostError::Waveform(value)
    }
}

impl From<FrequencyError> for HostError {
    fn from(value: FrequencyError) -> Self {
        HostError::Muscle(value)
    }
}

impl From<GroupFull> for HostError {
    fn from(_: GroupFull) -> Self {
        HostError::GroupFull
    }
}

impl From<InvalidFaultModel> for HostError {
    fn from(value: InvalidFaultModel) -> Self {
        HostError::FaultModel(value)
    }
}
