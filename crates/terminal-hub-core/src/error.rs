//! Stream and transport errors.

use std::io;

use thiserror::Error;

/// Failure of the RPC channel itself, as opposed to an outcome the hub
/// reported.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection lost: {0}")]
    ConnectionLost(String),
    #[error("Hub returned an error: {0}")]
    Remote(String),
    #[error("Malformed reply: {0}")]
    Malformed(String),
    #[error("Connection desynchronized by an abandoned call")]
    Desynchronized,
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof => Self::ConnectionLost(e.to_string()),
            _ => Self::Io(e.to_string()),
        }
    }
}

/// Stream-level error returned by every terminal stream operation.
///
/// Variants that carry a byte count report how much of the operation
/// completed before the error; those bytes have already been copied.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StreamError {
    #[error("io: read/write on closed pipe")]
    ClosedPipe,
    #[error("end of stream after {read} bytes")]
    EndOfStream { read: usize },
    #[error("unexpected end of stream")]
    UnexpectedEndOfStream,
    #[error("short write: {written} of {requested} bytes accepted")]
    ShortWrite { written: usize, requested: usize },
    #[error("agent not registered")]
    AgentNotRegistered,
    #[error("session already closed")]
    AlreadyClosed,
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("deadline exceeded")]
    Timeout,
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
}

impl StreamError {
    /// Bytes transferred before the error, if the error carries a count.
    #[must_use]
    pub const fn transferred(&self) -> usize {
        match self {
            Self::EndOfStream { read } => *read,
            Self::ShortWrite { written, .. } => *written,
            _ => 0,
        }
    }

    /// Whether this is a clean end of stream.
    #[must_use]
    pub const fn is_eof(&self) -> bool {
        matches!(self, Self::EndOfStream { .. })
    }

    /// Shorthand for `ProtocolViolation`.
    pub fn violation(msg: impl Into<String>) -> Self {
        Self::ProtocolViolation(msg.into())
    }
}

impl From<StreamError> for io::Error {
    fn from(e: StreamError) -> Self {
        let kind = match &e {
            StreamError::ClosedPipe => io::ErrorKind::BrokenPipe,
            StreamError::EndOfStream { .. } | StreamError::UnexpectedEndOfStream => {
                io::ErrorKind::UnexpectedEof
            }
            StreamError::ShortWrite { .. } => io::ErrorKind::WriteZero,
            StreamError::AgentNotRegistered | StreamError::AlreadyClosed => {
                io::ErrorKind::NotConnected
            }
            StreamError::ProtocolViolation(_) => io::ErrorKind::InvalidData,
            StreamError::Timeout => io::ErrorKind::TimedOut,
            StreamError::Transport(_) => io::ErrorKind::Other,
        };
        Self::new(kind, e)
    }
}
