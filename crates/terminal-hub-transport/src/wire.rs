//! Line-delimited JSON framing for hub calls.
//!
//! Every request line carries a call `id` that the hub echoes in its reply,
//! so replies to abandoned calls can be told apart from the current one.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use terminal_hub_core::{
    TransportError,
    protocol::{
        CloseRequest, CloseResponse, ReadRequest, ReadResponse, RegisterRequest,
        RegisterResponse, TerminalRegisterRequest, TerminalRegisterResponse, WriteRequest,
        WriteResponse,
    },
};

/// Call from agent to hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum HubRequest {
    Register(RegisterRequest),
    Read(ReadRequest),
    Write(WriteRequest),
    Close(CloseRequest),
    RegisterTerminal(TerminalRegisterRequest),
}

/// Reply from hub to agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubReply {
    Register(RegisterResponse),
    Read(ReadResponse),
    Write(WriteResponse),
    Close(CloseResponse),
    RegisterTerminal(TerminalRegisterResponse),
    /// The hub could not process the call at all.
    Error { message: String },
}

impl HubRequest {
    #[must_use]
    pub const fn method(&self) -> &'static str {
        match self {
            Self::Register(_) => "register",
            Self::Read(_) => "read",
            Self::Write(_) => "write",
            Self::Close(_) => "close",
            Self::RegisterTerminal(_) => "register_terminal",
        }
    }
}

impl HubReply {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Register(_) => "register",
            Self::Read(_) => "read",
            Self::Write(_) => "write",
            Self::Close(_) => "close",
            Self::RegisterTerminal(_) => "register_terminal",
            Self::Error { .. } => "error",
        }
    }
}

/// A request line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFrame {
    pub id: u64,
    #[serde(flatten)]
    pub request: HubRequest,
}

impl RequestFrame {
    #[must_use]
    pub const fn new(id: u64, request: HubRequest) -> Self {
        Self { id, request }
    }

    /// Encode as a single newline-terminated line.
    ///
    /// # Errors
    /// Returns `Malformed` if serialization fails.
    pub fn to_line(&self) -> Result<String, TransportError> {
        encode_line(self)
    }

    /// Decode one line, with or without its terminator.
    ///
    /// # Errors
    /// Returns `Malformed` for anything that is not a request.
    pub fn from_line(line: &str) -> Result<Self, TransportError> {
        decode_line(line)
    }
}

/// A reply line.
///
/// `id` is absent only when the hub could not read the request it is
/// answering, which is then taken to be the current call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(flatten)]
    pub reply: HubReply,
}

impl ReplyFrame {
    #[must_use]
    pub const fn new(id: u64, reply: HubReply) -> Self {
        Self {
            id: Some(id),
            reply,
        }
    }

    /// Whether this reply answers call `id`.
    #[must_use]
    pub fn answers(&self, id: u64) -> bool {
        self.id.is_none_or(|got| got == id)
    }

    /// Encode as a single newline-terminated line.
    ///
    /// # Errors
    /// Returns `Malformed` if serialization fails.
    pub fn to_line(&self) -> Result<String, TransportError> {
        encode_line(self)
    }

    /// Decode one line, with or without its terminator.
    ///
    /// # Errors
    /// Returns `Malformed` for anything that is not a reply.
    pub fn from_line(line: &str) -> Result<Self, TransportError> {
        decode_line(line)
    }
}

fn decode_line<T: DeserializeOwned>(line: &str) -> Result<T, TransportError> {
    serde_json::from_str(line.trim_end()).map_err(|e| TransportError::Malformed(e.to_string()))
}

fn encode_line<T: Serialize>(msg: &T) -> Result<String, TransportError> {
    let mut line =
        serde_json::to_string(msg).map_err(|e| TransportError::Malformed(e.to_string()))?;
    line.push('\n');
    Ok(line)
}
