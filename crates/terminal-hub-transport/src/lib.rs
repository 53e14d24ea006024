//! Transport layer for hub-tunneled terminals.
//!
//! Provides:
//! - Wire framing (one JSON message per line, base64 payloads)
//! - `JsonLineClient` - Hub client over a single TCP connection
//! - `TcpTerminalStream` - Direct socket stream for bootstrap-assigned addresses

pub mod client;
pub mod tcp;
pub mod wire;

pub use client::JsonLineClient;
pub use tcp::TcpTerminalStream;
pub use wire::{HubReply, HubRequest, ReplyFrame, RequestFrame};
