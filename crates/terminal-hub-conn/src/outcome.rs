//! Outcome code translation.
//!
//! Maps the hub's per-call result codes onto stream semantics. Every
//! function is pure and total: codes outside the declared set, or declared
//! codes that make no sense for the operation, become `ProtocolViolation`.

use terminal_hub_core::{Outcome, StreamError};

fn decode(code: i32, op: &str) -> Result<Outcome, StreamError> {
    Outcome::from_code(code)
        .ok_or_else(|| StreamError::violation(format!("undeclared outcome code {code} for {op}")))
}

fn unexpected(outcome: Outcome, op: &str) -> StreamError {
    StreamError::violation(format!("unexpected outcome {outcome} for {op}"))
}

/// Translate a register reply into the session id to store.
///
/// # Errors
/// `AgentNotRegistered` when the hub refuses the agent, `ProtocolViolation`
/// for an empty id or any other code.
pub fn register_result(code: i32, session_id: String) -> Result<String, StreamError> {
    match decode(code, "register")? {
        Outcome::Ok if session_id.is_empty() => {
            Err(StreamError::violation("register succeeded without a session id"))
        }
        Outcome::Ok => Ok(session_id),
        Outcome::Error => Err(StreamError::AgentNotRegistered),
        other => Err(unexpected(other, "register")),
    }
}

/// Translate a read reply, given the number of bytes already copied into
/// the caller's buffer.
///
/// # Errors
/// `EndOfStream` carries `copied`; the other stream errors report zero
/// bytes.
pub fn read_result(code: i32, copied: usize) -> Result<usize, StreamError> {
    match decode(code, "read")? {
        Outcome::Ok => Ok(copied),
        Outcome::Eof => Err(StreamError::EndOfStream { read: copied }),
        Outcome::UnexpectedEof => Err(StreamError::UnexpectedEndOfStream),
        Outcome::ClosedPipe => Err(StreamError::ClosedPipe),
        other => Err(unexpected(other, "read")),
    }
}

/// Whether a read outcome delivers payload bytes to the caller.
#[must_use]
pub fn read_delivers_data(code: i32) -> bool {
    matches!(Outcome::from_code(code), Some(Outcome::Ok | Outcome::Eof))
}

/// Translate a write reply. `accepted` is clamped to `requested`.
///
/// A short-write code that nonetheless accounts for every byte is a
/// complete write.
///
/// # Errors
/// `ShortWrite` for the short-write code, or for any unrecognized code when
/// fewer bytes than requested were accepted.
pub fn write_result(code: i32, accepted: usize, requested: usize) -> Result<usize, StreamError> {
    let accepted = accepted.min(requested);
    let short = StreamError::ShortWrite {
        written: accepted,
        requested,
    };
    match Outcome::from_code(code) {
        Some(Outcome::Ok) => Ok(accepted),
        Some(Outcome::ShortWrite) if accepted < requested => Err(short),
        Some(Outcome::ShortWrite) => Ok(accepted),
        Some(Outcome::ClosedPipe) => Err(StreamError::ClosedPipe),
        _ if accepted < requested => Err(short),
        Some(other) => Err(unexpected(other, "write")),
        None => Err(StreamError::violation(format!(
            "undeclared outcome code {code} for write"
        ))),
    }
}

/// Translate a close reply.
///
/// # Errors
/// `ProtocolViolation` for anything but `OK`.
pub fn close_result(code: i32) -> Result<(), StreamError> {
    match decode(code, "close")? {
        Outcome::Ok => Ok(()),
        other => Err(unexpected(other, "close")),
    }
}
