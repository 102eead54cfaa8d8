//! Muscle command set and the streaming decoder feeding it.
//!
//! Commands arrive as single ASCII characters on the same link that carries
//! spike bytes. `G` is followed by a base-10 integer read from the stream; the
//! argument ends at the first non-digit byte, an explicit [`CommandDecoder::finish`],
//! or after [`DEFAULT_ARGUMENT_TIMEOUT`] without a new byte. Anything the
//! decoder does not recognise is reported as ignored and otherwise dropped.

use core::fmt::{self, Write as _};
use core::time::Duration;

use heapless::{String, Vec};
use winnow::ascii::dec_int;
use winnow::error::ContextError;
use winnow::prelude::*;

use crate::clock::Monotonic;

/// Matches the stream timeout used by the serial integer parser on the muscle board.
pub const DEFAULT_ARGUMENT_TIMEOUT: Duration = Duration::from_secs(1);

/// Sign plus the digits of `i32::MIN`.
const MAX_ARGUMENT_LEN: usize = 11;

/// Longest encoded command: `G` followed by a signed 32-bit integer.
pub const MAX_ENCODED_COMMAND_LEN: usize = 1 + MAX_ARGUMENT_LEN;

/// Commands understood by a muscle channel.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MuscleCommand {
    /// `O`: force the valve open without touching the pulse schedule.
    Open,
    /// `C`: force the valve closed.
    Close,
    /// `P`: enable pulsing, or disable it and close the valve.
    TogglePulsing,
    /// `F`: enable pulsing at the configured frequency.
    StartAtCurrentFrequency,
    /// `G<int>`: set the pulse frequency in hertz and broadcast it to the group.
    SetFrequency(i32),
}

impl MuscleCommand {
    pub const OPEN_CODE: u8 = b'O';
    pub const CLOSE_CODE: u8 = b'C';
    pub const TOGGLE_CODE: u8 = b'P';
    pub const START_CODE: u8 = b'F';
    pub const SET_FREQUENCY_CODE: u8 = b'G';

    /// Decodes a command that takes no argument.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            Self::OPEN_CODE => Some(MuscleCommand::Open),
            Self::CLOSE_CODE => Some(MuscleCommand::Close),
            Self::TOGGLE_CODE => Some(MuscleCommand::TogglePulsing),
            Self::START_CODE => Some(MuscleCommand::StartAtCurrentFrequency),
            _ => None,
        }
    }

    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            MuscleCommand::Open => Self::OPEN_CODE,
            MuscleCommand::Close => Self::CLOSE_CODE,
            MuscleCommand::TogglePulsing => Self::TOGGLE_CODE,
            MuscleCommand::StartAtCurrentFrequency => Self::START_CODE,
            MuscleCommand::SetFrequency(_) => Self::SET_FREQUENCY_CODE,
        }
    }

    /// Encodes the command as it travels on the wire.
    ///
    /// `SetFrequency` gains a trailing newline so the receiver can close the
    /// argument without waiting for the timeout.
    #[must_use]
    pub fn encode(self) -> Vec<u8, { MAX_ENCODED_COMMAND_LEN + 1 }> {
        let mut text = String::<{ MAX_ENCODED_COMMAND_LEN + 1 }>::new();
        let _ = match self {
            MuscleCommand::SetFrequency(hz) => writeln!(text, "G{hz}"),
            other => write!(text, "{}", char::from(other.code())),
        };
        text.into_bytes()
    }
}

impl fmt::Display for MuscleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MuscleCommand::Open => f.write_str("open"),
            MuscleCommand::Close => f.write_str("close"),
            MuscleCommand::TogglePulsing => f.write_str("toggle-pulsing"),
            MuscleCommand::StartAtCurrentFrequency => f.write_str("start"),
            MuscleCommand::SetFrequency(hz) => write!(f, "set-frequency {hz}"),
        }
    }
}

/// Why input was dropped without changing any state.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IgnoreReason {
    UnknownByte(u8),
    MissingArgument,
    MalformedArgument,
    NonPositiveFrequency,
    FrequencyAboveLimit,
    NoTargetChannel,
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IgnoreReason::UnknownByte(byte) => write!(f, "unknown byte 0x{byte:02X}"),
            IgnoreReason::MissingArgument => f.write_str("missing frequency argument"),
            IgnoreReason::MalformedArgument => f.write_str("malformed frequency argument"),
            IgnoreReason::NonPositiveFrequency => f.write_str("frequency must be positive"),
            IgnoreReason::FrequencyAboveLimit => f.write_str("frequency exceeds duty limit"),
            IgnoreReason::NoTargetChannel => f.write_str("no channel to address"),
        }
    }
}

/// Output of the decoder for a single input byte.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Decoded {
    Command(MuscleCommand),
    Ignored(IgnoreReason),
}

/// A terminating byte can close a pending argument and start a new command.
pub type DecodedBatch = Vec<Decoded, 2>;

#[derive(Clone, Debug, Eq, PartialEq)]
struct PendingArgument<TInstant> {
    text: Vec<u8, MAX_ARGUMENT_LEN>,
    has_digits: bool,
    overflowed: bool,
    last_activity: TInstant,
}

/// Turns the raw command stream into [`MuscleCommand`]s.
pub struct CommandDecoder<TInstant>
where
    TInstant: Copy,
{
    pending: Option<PendingArgument<TInstant>>,
    argument_timeout: Duration,
}

impl<TInstant> CommandDecoder<TInstant>
where
    TInstant: Monotonic,
{
    #[must_use]
    pub const fn new(argument_timeout: Duration) -> Self {
        Self {
            pending: None,
            argument_timeout,
        }
    }

    /// Returns `true` while a `G` argument is being collected.
    #[must_use]
    pub const fn is_collecting(&self) -> bool {
        self.pending.is_some()
    }

    /// Feeds one byte received at `now`.
    pub fn push(&mut self, byte: u8, now: TInstant) -> DecodedBatch {
        let mut batch = DecodedBatch::new();

        if let Some(pending) = self.pending.as_mut() {
            pending.last_activity = now;
            match byte {
                b'0'..=b'9' => {
                    pending.has_digits = true;
                    if pending.text.push(byte).is_err() {
                        pending.overflowed = true;
                    }
                    return batch;
                }
                b' ' | b'\t' if pending.text.is_empty() => return batch,
                b'-' | b'+' if pending.text.is_empty() => {
                    let _ = pending.text.push(byte);
                    return batch;
                }
                b'\r' | b'\n' => {
                    if let Some(decoded) = self.finish() {
                        let _ = batch.push(decoded);
                    }
                    return batch;
                }
                _ => {
                    if let Some(decoded) = self.finish() {
                        let _ = batch.push(decoded);
                    }
                }
            }
        }

        if byte == MuscleCommand::SET_FREQUENCY_CODE {
            self.pending = Some(PendingArgument {
                text: Vec::new(),
                has_digits: false,
                overflowed: false,
                last_activity: now,
            });
        } else if let Some(command) = MuscleCommand::from_code(byte) {
            let _ = batch.push(Decoded::Command(command));
        } else if is_separator(byte) {
            // Line endings from terminal-style senders.
        } else {
            let _ = batch.push(Decoded::Ignored(IgnoreReason::UnknownByte(byte)));
        }

        batch
    }

    /// Closes a pending argument once the stream has been idle for the timeout.
    pub fn poll_timeout(&mut self, now: TInstant) -> Option<Decoded> {
        let pending = self.pending.as_ref()?;
        if now.saturating_duration_since(pending.last_activity) < self.argument_timeout {
            return None;
        }
        self.finish()
    }

    /// Closes a pending argument immediately.
    pub fn finish(&mut self) -> Option<Decoded> {
        let pending = self.pending.take()?;
        if !pending.has_digits {
            return Some(Decoded::Ignored(IgnoreReason::MissingArgument));
        }
        if pending.overflowed {
            return Some(Decoded::Ignored(IgnoreReason::MalformedArgument));
        }

        Some(match parse_argument(&pending.text) {
            Some(value) => Decoded::Command(MuscleCommand::SetFrequency(value)),
            None => Decoded::Ignored(IgnoreReason::MalformedArgument),
        })
    }

    /// Drops any partially received argument.
    pub fn reset(&mut self) {
        self.pending = None;
    }
}

impl<TInstant> Default for CommandDecoder<TInstant>
where
    TInstant: Monotonic,
{
    fn default() -> Self {
        Self::new(DEFAULT_ARGUMENT_TIMEOUT)
    }
}

const fn is_separator(byte: u8) -> bool {
    matches!(byte, b'\r' | b'\n' | b' ' | b'\t')
}

fn parse_argument(text: &[u8]) -> Option<i32> {
    dec_int::<&[u8], i32, ContextError>.parse(text).ok()
}
