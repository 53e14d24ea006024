//! Core abstractions for terminals tunneled through a hub.
//!
//! This crate provides the shared building blocks:
//! - `protocol` - Request/response types and the `Outcome` code enumeration
//! - `StreamError` - Stream-level error taxonomy
//! - `ConnConfig` - Options for constructing a stream adapter
//! - `HubClient`, `TerminalRegistry` and `TerminalStream` traits

pub mod config;
pub mod error;
pub mod protocol;
pub mod traits;

pub use config::ConnConfig;
pub use error::{StreamError, TransportError};
pub use protocol::Outcome;
pub use traits::{HubClient, TerminalRegistry, TerminalStream};
