//! Hub service messages.
//!
//! Outcome codes travel as raw integers so that a value this build does not
//! know about still decodes and can be reported as a protocol violation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Result code carried by every hub response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Outcome {
    Ok = 0,
    Eof = 1,
    UnexpectedEof = 2,
    ClosedPipe = 3,
    ShortWrite = 4,
    Error = 5,
}

impl Outcome {
    /// Every declared outcome, in wire order.
    pub const ALL: [Self; 6] = [
        Self::Ok,
        Self::Eof,
        Self::UnexpectedEof,
        Self::ClosedPipe,
        Self::ShortWrite,
        Self::Error,
    ];

    /// Decode a raw wire code, returning `None` for undeclared values.
    #[must_use]
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|o| o.code() == code)
    }

    /// The raw wire value.
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }
}

impl From<Outcome> for i32 {
    fn from(outcome: Outcome) -> Self {
        outcome.code()
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Ok => "OK",
            Self::Eof => "EOF",
            Self::UnexpectedEof => "UNEXPECTED_EOF",
            Self::ClosedPipe => "CLOSED_PIPE",
            Self::ShortWrite => "SHORT_WRITE",
            Self::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Session registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub agent_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterResponse {
    #[serde(default)]
    pub session_id: String,
    pub code: i32,
}

/// Ask the hub for up to `size` bytes of the session's input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadRequest {
    pub session_id: String,
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadResponse {
    #[serde(default, with = "base64_bytes")]
    pub data: Vec<u8>,
    /// Number of meaningful bytes at the front of `data`.
    #[serde(default)]
    pub size: u32,
    pub code: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteRequest {
    pub session_id: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResponse {
    /// Bytes the hub accepted.
    #[serde(default)]
    pub size: u32,
    pub code: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseRequest {
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseResponse {
    pub code: i32,
}

/// Terminal window dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSize {
    pub cols: u16,
    pub rows: u16,
}

impl Default for WindowSize {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

/// Bootstrap registration of a terminal, answered with the address the agent
/// should dial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalRegisterRequest {
    pub terminal_id: String,
    pub agent_id: String,
    /// Address the agent advertises for itself.
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<WindowSize>,
}

impl TerminalRegisterRequest {
    /// Build a request with a fresh terminal id.
    #[must_use]
    pub fn new(
        agent_id: impl Into<String>,
        address: impl Into<String>,
        window: Option<WindowSize>,
    ) -> Self {
        Self {
            terminal_id: Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            address: address.into(),
            window,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalRegisterResponse {
    pub host: String,
    pub port: u16,
}

/// Serde adapter encoding byte payloads as standard base64 strings.
pub mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    /// # Errors
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(data))
    }

    /// # Errors
    /// Fails on invalid base64.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64.decode(encoded).map_err(D::Error::custom)
    }
}
