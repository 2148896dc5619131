use std::fmt;
use std::io;
use std::path::PathBuf;

use scmi_wire::{FrameError, Header, MessageType};

/// Transport-level failures.
///
/// None of these is a protocol status: a platform answering with a negative
/// status is a successful transport call.
#[derive(Debug)]
pub enum TransportError {
    /// A mailbox channel could not be opened.
    Open { path: PathBuf, source: io::Error },
    /// Reading or writing a channel failed.
    Io(io::Error),
    /// No response arrived before the poll deadline.
    PollTimeout { timeout_ms: u64 },
    /// `poll` itself returned an error.
    Poll(io::Error),
    /// The channel held a buffer that does not decode.
    Frame(FrameError),
    /// More parameters than fit in one message.
    TooManyParameters { count: usize, max: usize },
    /// The response answers a different command.
    HeaderMismatch { sent: Header, received: Header },
    /// A message of the wrong kind arrived on the platform-to-agent channel.
    UnexpectedMessageType {
        expected: MessageType,
        received: MessageType,
    },
    /// Two platform handlers claim the same protocol id.
    DuplicateHandler(u8),
    /// `wait_for_*` was called with nothing queued and no channel to wait on.
    NothingPending(MessageType),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open { path, source } => {
                write!(f, "failed to open {}: {}", path.display(), source)
            }
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::PollTimeout { timeout_ms } => {
                write!(f, "no response within {} ms", timeout_ms)
            }
            Self::Poll(e) => write!(f, "poll failed: {}", e),
            Self::Frame(e) => write!(f, "frame error: {}", e),
            Self::TooManyParameters { count, max } => {
                write!(f, "{} parameters exceed the limit of {}", count, max)
            }
            Self::HeaderMismatch { sent, received } => {
                write!(f, "response header mismatch: sent [{}], got [{}]", sent, received)
            }
            Self::UnexpectedMessageType { expected, received } => {
                write!(f, "expected a {}, received a {}", expected, received)
            }
            Self::DuplicateHandler(id) => {
                write!(f, "protocol {:#04x} already has a handler", id)
            }
            Self::NothingPending(kind) => write!(f, "no pending {}", kind),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Open { source, .. } => Some(source),
            Self::Io(e) | Self::Poll(e) => Some(e),
            Self::Frame(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FrameError> for TransportError {
    fn from(e: FrameError) -> Self {
        Self::Frame(e)
    }
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
